use std::rc::Rc;

use ash::vk;
use ash::vk::Handle;
use itertools::Itertools;

use crate::commands::command_queue::GfxCommandQueue;
use crate::commands::semaphore::GfxSemaphore;
use crate::error::{GfxResult, VkResultExt};
use crate::foundation::device::GfxDevice;
use crate::resources::image_view::GfxImageView;
use crate::swapchain::surface::GfxSurface;

/// acquire / present 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapchainStatus {
    Ok,
    /// 仍然可用，但与 surface 不再完全匹配
    Suboptimal,
    OutOfDate,
    SurfaceLost,
    Failed(vk::Result),
}

impl SwapchainStatus {
    fn from_error(result: vk::Result) -> Self {
        match result {
            vk::Result::ERROR_OUT_OF_DATE_KHR => Self::OutOfDate,
            vk::Result::ERROR_SURFACE_LOST_KHR => Self::SurfaceLost,
            result => Self::Failed(result),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GfxSwapchainCreateInfo {
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
    pub graphics_queue_family: u32,
    pub present_queue_family: u32,
}

pub struct GfxSwapchain {
    handle: vk::SwapchainKHR,

    images: Vec<vk::Image>,
    image_views: Vec<GfxImageView>,
    current_image: u32,

    info: GfxSwapchainCreateInfo,
    device: Rc<GfxDevice>,
}

// new & init
impl GfxSwapchain {
    /// `old_swapchain` 会作为 `oldSwapchain` 传入，新的交换链创建完成后销毁
    pub fn new(
        device: Rc<GfxDevice>,
        surface: &GfxSurface,
        info: GfxSwapchainCreateInfo,
        old_swapchain: Option<GfxSwapchain>,
    ) -> GfxResult<Self> {
        let _span = tracy_client::span!("GfxSwapchain::new");

        let queue_families = [info.graphics_queue_family, info.present_queue_family];
        let mut create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface.handle())
            .min_image_count(info.image_count)
            .image_format(info.surface_format.format)
            .image_color_space(info.surface_format.color_space)
            .image_extent(info.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
            .pre_transform(info.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(info.present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain.as_ref().map_or(vk::SwapchainKHR::null(), |old| old.handle));
        create_info = if info.graphics_queue_family != info.present_queue_family {
            create_info.image_sharing_mode(vk::SharingMode::CONCURRENT).queue_family_indices(&queue_families)
        } else {
            create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        };

        let handle = unsafe { device.swapchain.create_swapchain(&create_info, None).vk_context("vkCreateSwapchainKHR") };
        // 无论成功与否，旧的交换链都不再需要
        if let Some(old) = old_swapchain {
            old.destroy();
        }
        let handle = handle?;
        device.set_object_debug_name(handle, "main");

        let images = unsafe { device.swapchain.get_swapchain_images(handle).vk_context("vkGetSwapchainImagesKHR")? };
        let image_views = images
            .iter()
            .enumerate()
            .map(|(idx, image)| {
                GfxImageView::new_2d(
                    device.clone(),
                    *image,
                    info.surface_format.format,
                    vk::ImageAspectFlags::COLOR,
                    1,
                    &format!("swapchain-{idx}"),
                )
            })
            .collect_vec();

        log::info!(
            "swapchain created: {} images, extent {}x{}, format {:?}/{:?}, present mode {:?}",
            images.len(),
            info.extent.width,
            info.extent.height,
            info.surface_format.format,
            info.surface_format.color_space,
            info.present_mode,
        );

        Ok(Self {
            handle,
            images,
            image_views,
            current_image: 0,
            info,
            device,
        })
    }
}

// getters
impl GfxSwapchain {
    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.handle
    }

    #[inline]
    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    #[inline]
    pub fn image_views(&self) -> &[GfxImageView] {
        &self.image_views
    }

    #[inline]
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    #[inline]
    pub fn current_image_index(&self) -> usize {
        self.current_image as usize
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.info.extent
    }

    #[inline]
    pub fn surface_format(&self) -> vk::SurfaceFormatKHR {
        self.info.surface_format
    }

    #[inline]
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.info.present_mode
    }
}

// update
impl GfxSwapchain {
    /// 不设超时
    pub fn acquire_next_image(&mut self, semaphore: &GfxSemaphore) -> SwapchainStatus {
        let _span = tracy_client::span!("GfxSwapchain::acquire_next_image");
        let result = unsafe {
            self.device.swapchain.acquire_next_image(self.handle, u64::MAX, semaphore.handle(), vk::Fence::null())
        };

        match result {
            Ok((image_index, suboptimal)) => {
                self.current_image = image_index;
                if suboptimal {
                    log::warn!("swapchain acquire image {} is suboptimal", image_index);
                    SwapchainStatus::Suboptimal
                } else {
                    SwapchainStatus::Ok
                }
            }
            Err(e) => {
                log::warn!("failed to acquire next swapchain image: {:?}", e);
                SwapchainStatus::from_error(e)
            }
        }
    }

    pub fn present_image(&self, queue: &GfxCommandQueue, wait_semaphore: &GfxSemaphore) -> SwapchainStatus {
        let _span = tracy_client::span!("GfxSwapchain::present_image");
        let wait_semaphores = [wait_semaphore.handle()];
        let image_indices = [self.current_image];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .image_indices(&image_indices)
            .swapchains(std::slice::from_ref(&self.handle));

        let result = unsafe { self.device.swapchain.queue_present(queue.handle(), &present_info) };
        match result {
            Ok(false) => SwapchainStatus::Ok,
            Ok(true) => {
                log::warn!("swapchain present image {} is suboptimal", self.current_image);
                SwapchainStatus::Suboptimal
            }
            Err(e) => {
                log::warn!("failed to present swapchain image: {:?}", e);
                SwapchainStatus::from_error(e)
            }
        }
    }
}

// destroy
impl GfxSwapchain {
    pub fn destroy(mut self) {
        for view in std::mem::take(&mut self.image_views) {
            view.destroy();
        }
        unsafe {
            self.device.swapchain.destroy_swapchain(self.handle, None);
        }
        self.handle = vk::SwapchainKHR::null();
    }
}
impl Drop for GfxSwapchain {
    fn drop(&mut self) {
        debug_assert!(self.handle.is_null(), "GfxSwapchain must be destroyed before being dropped.");
    }
}
