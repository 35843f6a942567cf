use std::rc::Rc;

use ash::vk;

use crate::commands::command_buffer::GfxCommandBuffer;
use crate::commands::command_pool::GfxCommandPool;
use crate::commands::command_queue::GfxCommandQueue;
use crate::commands::fence::GfxFence;
use crate::commands::submit_info::GfxSubmitInfo;
use crate::error::GfxResult;
use crate::foundation::device::GfxDevice;

/// 录制一个一次性的 command buffer，提交后同步等待执行完成
///
/// 用于交换链创建后的 layout 转换，以及纹理、buffer 的上传
pub fn one_time_exec<R>(
    device: &Rc<GfxDevice>,
    queue: &GfxCommandQueue,
    debug_name: &str,
    f: impl FnOnce(&GfxCommandBuffer) -> R,
) -> GfxResult<R> {
    let _span = tracy_client::span!("one_time_exec");

    let pool = GfxCommandPool::new(
        device.clone(),
        queue.queue_family_index(),
        vk::CommandPoolCreateFlags::TRANSIENT,
        &format!("{debug_name}-pool"),
    );
    let fence = GfxFence::new(device.clone(), false, &format!("{debug_name}-fence"));

    let result = (|| -> GfxResult<R> {
        let cmds = pool.allocate_command_buffers(1, debug_name);
        let cmd = &cmds[0];
        cmd.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;
        let ret = f(cmd);
        cmd.end()?;

        queue.submit(&[GfxSubmitInfo::new(&[cmd])], Some(&fence))?;
        fence.wait()?;
        Ok(ret)
    })();

    fence.destroy();
    pool.destroy();
    result
}
