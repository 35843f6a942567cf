use std::ffi::c_char;
use std::rc::Rc;

use ash::vk;

use crate::commands::command_queue::GfxCommandQueue;
use crate::error::GfxResult;
use crate::foundation::debug_messenger::GfxDebugMsger;
use crate::foundation::device::GfxDevice;
use crate::foundation::instance::GfxInstance;
use crate::foundation::mem_allocator::GfxMemAllocator;
use crate::foundation::physical_device::GfxPhysicalDevice;
use crate::swapchain::surface::GfxSurface;

/// 由平台层提供的 surface 创建回调
pub type CreateSurfaceFn<'a> = dyn Fn(&ash::Entry, &ash::Instance) -> GfxResult<vk::SurfaceKHR> + 'a;

/// Vulkan 核心对象的集合：entry、instance、物理设备、逻辑设备、内存分配器以及队列
///
/// 销毁顺序：allocator -> device -> debug messenger -> instance
pub struct GfxCore {
    pub entry: ash::Entry,
    pub instance: GfxInstance,
    debug_msger: Option<GfxDebugMsger>,

    pub physical_device: GfxPhysicalDevice,
    device: Rc<GfxDevice>,
    allocator: Rc<GfxMemAllocator>,

    pub graphics_queue: GfxCommandQueue,
    pub present_queue: GfxCommandQueue,
}

// 创建与销毁
impl GfxCore {
    /// 物理设备的选择依赖 surface，因此 surface 和 core 一起创建
    pub fn new(
        entry: ash::Entry,
        app_name: &str,
        platform_exts: &[*const c_char],
        validation: bool,
        create_surface: &CreateSurfaceFn<'_>,
    ) -> GfxResult<(Self, GfxSurface)> {
        let _span = tracy_client::span!("GfxCore::new");

        let instance = GfxInstance::new(&entry, app_name, platform_exts, validation)?;
        let debug_msger = if instance.validation_enabled() {
            Some(GfxDebugMsger::new(&entry, instance.ash_instance())?)
        } else {
            None
        };

        let surface_handle = create_surface(&entry, instance.ash_instance())?;
        let surface = GfxSurface::from_handle(&entry, instance.ash_instance(), surface_handle);

        let physical_device = GfxPhysicalDevice::select(instance.ash_instance(), surface.pf(), surface.handle())?;
        let device = Rc::new(GfxDevice::new(instance.ash_instance(), &physical_device, debug_msger.is_some())?);
        let allocator = Rc::new(GfxMemAllocator::new(&instance, &device, &physical_device)?);

        let graphics_queue = GfxCommandQueue::new(device.clone(), physical_device.graphics_queue_family(), "graphics");
        let present_queue = GfxCommandQueue::new(device.clone(), physical_device.present_queue_family(), "present");

        let core = Self {
            entry,
            instance,
            debug_msger,
            physical_device,
            device,
            allocator,
            graphics_queue,
            present_queue,
        };
        Ok((core, surface))
    }

    /// 重新创建 surface，例如 surface lost 之后
    pub fn create_surface(&self, create_surface: &CreateSurfaceFn<'_>) -> GfxResult<GfxSurface> {
        let handle = create_surface(&self.entry, self.instance.ash_instance())?;
        Ok(GfxSurface::from_handle(&self.entry, self.instance.ash_instance(), handle))
    }

    /// 调用者需要保证所有 GPU 对象都已经销毁
    pub fn destroy(self) {
        let Self {
            instance,
            debug_msger,
            device,
            allocator,
            graphics_queue,
            present_queue,
            ..
        } = self;

        debug_assert_eq!(Rc::strong_count(&allocator), 1, "memory allocator is still referenced");
        drop(allocator);

        drop(graphics_queue);
        drop(present_queue);
        device.destroy();
        debug_assert_eq!(Rc::strong_count(&device), 1, "device is still referenced");
        drop(device);

        drop(debug_msger);
        instance.destroy();
    }
}

// getters
impl GfxCore {
    #[inline]
    pub fn device(&self) -> &Rc<GfxDevice> {
        &self.device
    }

    #[inline]
    pub fn allocator(&self) -> &Rc<GfxMemAllocator> {
        &self.allocator
    }
}
