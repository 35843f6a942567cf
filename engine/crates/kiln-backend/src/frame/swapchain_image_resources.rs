use std::rc::Rc;

use kiln_gfx::commands::semaphore::GfxSemaphore;
use kiln_gfx::foundation::device::GfxDevice;

/// 交换链图像环中的一个槽位：一次 acquire -> present 周期使用的两个信号量
pub struct SwapchainImageResources {
    /// acquire 完成时 signal，提交时在 color attachment output 阶段等待
    pub image_acquired: GfxSemaphore,
    /// 提交完成时 signal，present 时等待
    pub render_finished: GfxSemaphore,
}

impl SwapchainImageResources {
    pub fn new(device: Rc<GfxDevice>, slot: usize) -> Self {
        Self {
            image_acquired: GfxSemaphore::new(device.clone(), &format!("image-acquired-{slot}")),
            render_finished: GfxSemaphore::new(device, &format!("render-finished-{slot}")),
        }
    }

    pub fn destroy(self) {
        self.image_acquired.destroy();
        self.render_finished.destroy();
    }
}
