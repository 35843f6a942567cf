//! 交换链及其派生对象的生命周期
//!
//! 交换链、帧资源环、depth/MSAA 目标、render pass、framebuffer 以及默认纹理都随交换链一起
//! 创建和销毁；core、surface、pipeline 注册表、回收通道则跨越重建。
//!
//! out-of-date、surface lost、窗口尺寸变化都在这里就地恢复，上层看到的只有 `bool` 结果。
//! 恢复过程可能嵌套，由 [`RecoveryGuard`] 限制深度。

use std::rc::Rc;

use ash::vk;
use itertools::Itertools;
use kiln_gfx::commands::submit_info::GfxSubmitInfo;
use kiln_gfx::error::{GfxError, GfxResult, VkResultExt};
use kiln_gfx::fatal::{FatalError, handle_unrecoverable_error};
use kiln_gfx::foundation::device::GfxDevice;
use kiln_gfx::foundation::gfx_core::GfxCore;
use kiln_gfx::foundation::mem_allocator::GfxMemAllocator;
use kiln_gfx::foundation::physical_device::{GfxPhysicalDevice, clamp_sample_count};
use kiln_gfx::render_pass::description::{default_framebuffer_attachments, default_render_pass};
use kiln_gfx::render_pass::render_pass::GfxRenderPass;
use kiln_gfx::resources::framebuffer::GfxFramebuffer;
use kiln_gfx::resources::image::GfxImage;
use kiln_gfx::swapchain::render_swapchain::{GfxSwapchain, GfxSwapchainCreateInfo, SwapchainStatus};
use kiln_gfx::swapchain::selection::{calculate_extent, choose_present_mode, choose_surface_format, desired_image_count};
use kiln_gfx::swapchain::surface::GfxSurface;
use kiln_gfx::utilities::format::find_depth_format;
use kiln_gfx::utilities::one_time::one_time_exec;
use kiln_render_interface::config::BackendConfig;
use kiln_render_interface::frame_counter::FrameCounter;
use kiln_render_interface::pipeline_desc::GraphicsPipelineDesc;
use kiln_render_interface::pipeline_settings::{DefaultRendererSettings, MAX_FRAMES_IN_FLIGHT};
use kiln_render_interface::platform::PlatformAdapter;
use kiln_render_interface::shader_loader::ShaderLoader;
use kiln_render_interface::swap_interval::SwapInterval;

use crate::buffering::{BufferingMechanism, FrameSlot};
use crate::frame::frame_resources::FrameResources;
use crate::frame::retirement::{Retire, RetiredObject, RetirementQueue};
use crate::frame::swapchain_image_resources::SwapchainImageResources;
pub use crate::frame_loop::AcquireResult;
use crate::frame_loop::{self, PresentTarget};
use crate::pipeline_registry::{LivePass, PipelineId, PipelineRegistry};
use crate::recovery::{RecoveryGuard, RecoveryReason, RecoveryState};
use crate::texture::{TextureRegion, record_image_upload};
use crate::throttle::SkipFrameThrottle;
use crate::vulkan_pipeline::{BackendPipeline, VulkanPipelineBuilder};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// surface 存在，但是交换链还没有创建成功
    Uninitialized,
    Active,
    /// surface 已经销毁，等待重新创建
    Lost,
    Recreating,
}

fn lifecycle_state(recovery: RecoveryState, has_surface: bool, has_targets: bool) -> LifecycleState {
    match (recovery, has_surface, has_targets) {
        (RecoveryState::Recreating { .. }, _, _) => LifecycleState::Recreating,
        (_, false, _) => LifecycleState::Lost,
        (_, true, false) => LifecycleState::Uninitialized,
        (_, true, true) => LifecycleState::Active,
    }
}

/// 根据 swap interval 选择 present mode
///
/// 没有匹配的模式时退回 FIFO，同时 interval 改写为 `Vsync`；连 FIFO 都不支持时返回错误
fn resolve_present_mode(
    available: &[vk::PresentModeKHR],
    interval: SwapInterval,
) -> GfxResult<(vk::PresentModeKHR, SwapInterval)> {
    if let Some(mode) = choose_present_mode(available, interval.present_mode_candidates()) {
        return Ok((mode, interval));
    }
    if !available.contains(&vk::PresentModeKHR::FIFO) {
        return Err(GfxError::FifoUnsupported);
    }
    log::warn!("no present mode supports swap interval `{}`, fall back to FIFO", interval);
    Ok((vk::PresentModeKHR::FIFO, SwapInterval::Vsync))
}

/// 覆盖整个 extent 的 viewport
pub(crate) fn full_viewport(extent: vk::Extent2D, min_depth: f32, max_depth: f32) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth,
        max_depth,
    }
}

fn default_clear_values() -> [vk::ClearValue; 2] {
    [
        vk::ClearValue {
            color: vk::ClearColorValue {
                float32: DefaultRendererSettings::CLEAR_COLOR,
            },
        },
        vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
        },
    ]
}

/// 队列等待失败时，设备丢失等错误直接交给致命错误处理
fn check_idle(result: GfxResult<()>, call: &'static str) {
    match result {
        Ok(()) => {}
        Err(e) if e.is_fatal() => handle_unrecoverable_error(FatalError::from_gfx(call, e)),
        Err(e) => log::error!("{call} failed: {e}"),
    }
}

/// 随交换链一起创建、销毁的对象
struct SwapchainTargets {
    buffering: BufferingMechanism<FrameResources, SwapchainImageResources>,
    depth: GfxImage,
    msaa_color: Option<GfxImage>,
    render_pass: GfxRenderPass,
    framebuffers: Vec<GfxFramebuffer>,
    /// 2x2 的全 0 纹理，`bind_textures` 中缺省的纹理使用它
    default_texture: Option<GfxImage>,
}

impl SwapchainTargets {
    /// 调用者保证 GPU 已经空闲
    fn destroy(self) {
        if let Some(texture) = self.default_texture {
            texture.destroy();
        }
        self.buffering.destroy(SwapchainImageResources::destroy);
        self.framebuffers.into_iter().for_each(GfxFramebuffer::destroy);
        self.depth.destroy();
        if let Some(color) = self.msaa_color {
            color.destroy();
        }
        self.render_pass.destroy();
    }
}

/// 录制命令所需的、当前帧的全部状态
pub struct FrameContext<'a> {
    pub frame: &'a mut FrameResources,
    pub pipelines: &'a PipelineRegistry<VulkanPipelineBuilder>,
    pub physical_device: &'a GfxPhysicalDevice,
    pub device: &'a Rc<GfxDevice>,
    pub default_texture_view: vk::ImageView,
    pub extent: vk::Extent2D,
    pub frame_num: u64,
    pub render_pass_started: bool,
}

pub struct SwapchainLifecycleManager {
    platform: Rc<dyn PlatformAdapter>,

    surface: Option<GfxSurface>,
    swapchain: Option<GfxSwapchain>,
    targets: Option<SwapchainTargets>,

    pipelines: PipelineRegistry<VulkanPipelineBuilder>,
    retirement: RetirementQueue<RetiredObject>,

    recovery: RecoveryGuard,
    throttle: SkipFrameThrottle,
    frame_counter: FrameCounter,

    swap_interval: SwapInterval,
    msaa_samples: vk::SampleCountFlags,
    depth_format: vk::Format,
    render_pass_started: bool,

    /// 最后销毁
    core: GfxCore,
}

// new & init
impl SwapchainLifecycleManager {
    /// 创建 core 以及第一个交换链
    ///
    /// 交换链创建失败不会返回错误，之后的 flip 会再次尝试
    pub fn new(
        config: &BackendConfig,
        platform: Rc<dyn PlatformAdapter>,
        shader_loader: Box<dyn ShaderLoader>,
    ) -> GfxResult<Self> {
        let _span = tracy_client::span!("SwapchainLifecycleManager::new");

        let entry = platform.load_entry()?;
        let extensions = platform.required_instance_extensions()?;
        let create_surface =
            |entry: &ash::Entry, instance: &ash::Instance| platform.create_surface(entry, instance);
        let (core, surface) =
            GfxCore::new(entry, &config.app_name, &extensions, config.validation, &create_surface)?;

        let pdevice = &core.physical_device;
        log::info!("using GPU: {}", pdevice.device_name());

        let depth_format = find_depth_format(
            core.instance.ash_instance(),
            pdevice.vk_handle(),
            DefaultRendererSettings::DEPTH_FORMAT_CANDIDATES,
        )
        .or_fatal("find_depth_format");
        let msaa_samples = clamp_sample_count(config.msaa_samples, pdevice.max_usable_sample_count());
        if msaa_samples.as_raw() != config.msaa_samples.max(1) {
            log::warn!("requested {}x MSAA, using {:?}", config.msaa_samples, msaa_samples);
        }

        let builder = VulkanPipelineBuilder::new(
            core.device().clone(),
            shader_loader,
            pdevice.features().sampler_anisotropy == vk::TRUE,
        );

        let mut manager = Self {
            platform: platform.clone(),
            surface: Some(surface),
            swapchain: None,
            targets: None,
            pipelines: PipelineRegistry::new(builder),
            retirement: RetirementQueue::new(),
            recovery: RecoveryGuard::default(),
            throttle: SkipFrameThrottle::default(),
            frame_counter: FrameCounter::default(),
            swap_interval: config.swap_interval,
            msaa_samples,
            depth_format,
            render_pass_started: false,
            core,
        };
        if !manager.create_swapchain() {
            log::error!("failed to create the initial swapchain");
        }
        Ok(manager)
    }
}

// getters
impl SwapchainLifecycleManager {
    #[inline]
    pub fn device(&self) -> &Rc<GfxDevice> {
        self.core.device()
    }

    #[inline]
    pub fn allocator(&self) -> &Rc<GfxMemAllocator> {
        self.core.allocator()
    }

    #[inline]
    pub fn physical_device(&self) -> &GfxPhysicalDevice {
        &self.core.physical_device
    }

    /// 被丢弃的 buffer、纹理从这里进入延迟销毁
    #[inline]
    pub fn retirement_sender(&self) -> crossbeam_channel::Sender<RetiredObject> {
        self.retirement.sender()
    }

    #[inline]
    pub fn frame_num(&self) -> u64 {
        self.frame_counter.frame_num()
    }

    #[inline]
    pub fn msaa_samples(&self) -> vk::SampleCountFlags {
        self.msaa_samples
    }

    #[inline]
    pub fn is_render_pass_started(&self) -> bool {
        self.render_pass_started
    }

    pub fn extent(&self) -> Option<vk::Extent2D> {
        self.swapchain.as_ref().map(GfxSwapchain::extent)
    }

    /// 由实际使用的 present mode 推导，可能与请求的不同
    pub fn swap_interval(&self) -> SwapInterval {
        self.swapchain
            .as_ref()
            .map_or(self.swap_interval, |swapchain| SwapInterval::from_present_mode(swapchain.present_mode()))
    }

    pub fn state(&self) -> LifecycleState {
        lifecycle_state(self.recovery.state(), self.surface.is_some(), self.targets.is_some())
    }

    /// 窗口最小化时为 false
    pub fn should_draw(&self) -> bool {
        let drawable = self.platform.drawable_size();
        drawable.width > 0 && drawable.height > 0
    }

    #[inline]
    pub fn pipeline(&self, id: PipelineId) -> Option<&BackendPipeline> {
        self.pipelines.get(id)
    }

    fn live_pass(&self) -> Option<LivePass> {
        let targets = self.targets.as_ref()?;
        Some(LivePass {
            render_pass: targets.render_pass.handle(),
            compat: targets.render_pass.compat().clone(),
            samples: self.msaa_samples,
        })
    }

    /// 交换链不可用，或者 copy 命令不在录制状态时返回 None
    pub fn frame_context(&mut self) -> Option<FrameContext<'_>> {
        let extent = self.swapchain.as_ref()?.extent();
        let targets = self.targets.as_mut()?;
        let default_texture_view = targets.default_texture.as_ref().map_or(vk::ImageView::null(), GfxImage::view);
        let frame = targets.buffering.recording_frame_mut()?;

        Some(FrameContext {
            frame,
            pipelines: &self.pipelines,
            physical_device: &self.core.physical_device,
            device: self.core.device(),
            default_texture_view,
            extent,
            frame_num: self.frame_counter.frame_num(),
            render_pass_started: self.render_pass_started,
        })
    }
}

// 交换链的创建与销毁
impl SwapchainLifecycleManager {
    /// 创建交换链以及所有派生对象，最后 acquire 第一张图像
    fn create_swapchain(&mut self) -> bool {
        let _span = tracy_client::span!("SwapchainLifecycleManager::create_swapchain");

        let device = self.core.device().clone();
        let allocator = self.core.allocator().clone();
        let pdevice = &self.core.physical_device;
        let graphics_family = pdevice.graphics_queue_family();

        let Some(surface) = self.surface.as_ref() else {
            log::error!("cannot create swapchain without a surface");
            return false;
        };
        let support = match surface.query_support(pdevice.vk_handle()) {
            Ok(support) => support,
            Err(GfxError::SurfaceLost) => return frame_loop::handle_surface_lost(self),
            Err(e) if e.is_fatal() => handle_unrecoverable_error(FatalError::from_gfx("query_support", e)),
            Err(e) => {
                log::error!("failed to query surface support: {e}");
                return false;
            }
        };
        support.log();

        let (present_mode, swap_interval) =
            resolve_present_mode(&support.present_modes, self.swap_interval).or_fatal("create_swapchain");
        self.swap_interval = swap_interval;

        let Some(surface_format) =
            choose_surface_format(&support.formats, DefaultRendererSettings::SURFACE_FORMAT_CANDIDATES)
        else {
            log::error!("surface reports no formats");
            return false;
        };
        let extent = calculate_extent(&support.capabilities, self.platform.drawable_size());

        let info = GfxSwapchainCreateInfo {
            surface_format,
            present_mode,
            extent,
            image_count: desired_image_count(&support.capabilities),
            pre_transform: support.capabilities.current_transform,
            graphics_queue_family: graphics_family,
            present_queue_family: pdevice.present_queue_family(),
        };
        let swapchain = match GfxSwapchain::new(device.clone(), surface, info, self.swapchain.take()) {
            Ok(swapchain) => swapchain,
            Err(GfxError::SurfaceLost) => return frame_loop::handle_surface_lost(self),
            Err(e) if e.is_fatal() => handle_unrecoverable_error(FatalError::from_gfx("vkCreateSwapchainKHR", e)),
            Err(e) => {
                log::error!("failed to create swapchain: {e}");
                return false;
            }
        };

        let frames = (0..MAX_FRAMES_IN_FLIGHT)
            .map(|slot| FrameResources::new(device.clone(), allocator.clone(), graphics_family, slot))
            .collect::<GfxResult<Vec<_>>>()
            .or_fatal("FrameResources::new");
        let image_slots =
            (0..swapchain.image_count()).map(|slot| SwapchainImageResources::new(device.clone(), slot)).collect_vec();
        let buffering =
            BufferingMechanism::init(frames, image_slots, self.retirement.receiver()).or_fatal("vkResetFences");

        let samples = self.msaa_samples;
        let msaa_color = (samples != vk::SampleCountFlags::TYPE_1).then(|| {
            GfxImage::new_attachment(
                device.clone(),
                allocator.clone(),
                extent,
                surface_format.format,
                samples,
                "msaa-color",
            )
        });
        let depth = GfxImage::new_attachment(device.clone(), allocator.clone(), extent, self.depth_format, samples, "depth");
        self.transition_attachments(&depth, msaa_color.as_ref()).or_fatal("transition_attachments");

        let render_pass = GfxRenderPass::new(
            device.clone(),
            &default_render_pass(surface_format.format, self.depth_format, samples),
            "main",
        );
        let framebuffers = swapchain
            .image_views()
            .iter()
            .enumerate()
            .map(|(idx, view)| {
                let attachments =
                    default_framebuffer_attachments(view.handle(), depth.view(), msaa_color.as_ref().map(GfxImage::view));
                GfxFramebuffer::new(device.clone(), render_pass.handle(), &attachments, extent, &format!("main-{idx}"))
            })
            .collect_vec();

        self.swapchain = Some(swapchain);
        self.targets = Some(SwapchainTargets {
            buffering,
            depth,
            msaa_color,
            render_pass,
            framebuffers,
            default_texture: None,
        });

        match frame_loop::acquire(self) {
            AcquireResult::Success => {}
            AcquireResult::RecoveredFromError => return true,
            AcquireResult::UnhandledFailure => return false,
        }

        self.create_default_texture();
        true
    }

    /// depth 以及 MSAA color 在 render pass 中的 initial layout 不是 UNDEFINED，需要先转换一次
    fn transition_attachments(&self, depth: &GfxImage, msaa_color: Option<&GfxImage>) -> GfxResult<()> {
        let barrier = |image: &GfxImage, dst_access: vk::AccessFlags, new_layout: vk::ImageLayout| {
            vk::ImageMemoryBarrier::default()
                .src_access_mask(vk::AccessFlags::empty())
                .dst_access_mask(dst_access)
                .old_layout(vk::ImageLayout::UNDEFINED)
                .new_layout(new_layout)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(image.handle())
                .subresource_range(
                    vk::ImageSubresourceRange::default()
                        .aspect_mask(image.aspect())
                        .level_count(1)
                        .layer_count(1),
                )
        };

        let mut barriers = vec![barrier(
            depth,
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        )];
        if let Some(color) = msaa_color {
            barriers.push(barrier(
                color,
                vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            ));
        }

        one_time_exec(self.core.device(), &self.core.graphics_queue, "attachment-layout", |cmd| {
            cmd.pipeline_barrier(
                vk::PipelineStageFlags::ALL_COMMANDS,
                vk::PipelineStageFlags::ALL_COMMANDS,
                &[],
                &[],
                &barriers,
            );
        })
    }

    /// 在当前帧的 copy 命令中上传 2x2 的全 0 纹理
    fn create_default_texture(&mut self) {
        let optimal_alignment = self.core.physical_device.limits().optimal_buffer_copy_offset_alignment;
        let texture = GfxImage::new_texture(
            self.core.device().clone(),
            self.core.allocator().clone(),
            vk::Extent2D { width: 2, height: 2 },
            vk::Format::R8G8B8A8_UNORM,
            1,
            "default-texture",
        );

        let Some(targets) = self.targets.as_mut() else {
            texture.destroy();
            return;
        };
        record_image_upload(
            targets.buffering.current_frame_mut(),
            &texture,
            4,
            optimal_alignment,
            TextureRegion::whole_level(texture.extent(), 0),
            vk::ImageLayout::UNDEFINED,
            &[0; 16],
        );
        targets.default_texture = Some(texture);
    }

    fn wait_idle(&self) {
        let _span = tracy_client::span!("wait idle");
        check_idle(self.core.graphics_queue.wait_idle(), "vkQueueWaitIdle");
        if self.core.present_queue.queue_family_index() != self.core.graphics_queue.queue_family_index() {
            check_idle(self.core.present_queue.wait_idle(), "vkQueueWaitIdle");
        }
        check_idle(self.core.device().wait_idle(), "vkDeviceWaitIdle");
    }

    /// 等待 GPU 空闲后销毁所有交换链相关的对象；`destroy_swapchain` 为 false 时保留交换链，
    /// 作为下一次创建的 `oldSwapchain`
    fn destroy_swapchain_specific(&mut self, destroy_swapchain: bool) {
        let _span = tracy_client::span!("SwapchainLifecycleManager::destroy_swapchain_specific");

        self.wait_idle();
        self.render_pass_started = false;
        if let Some(targets) = self.targets.take() {
            targets.destroy();
        }
        if destroy_swapchain {
            if let Some(swapchain) = self.swapchain.take() {
                swapchain.destroy();
            }
        }
    }
}

// 恢复
impl SwapchainLifecycleManager {
    /// 重建交换链并按需重建 pipeline
    pub fn recreate(&mut self, reason: RecoveryReason) -> bool {
        let _span = tracy_client::span!("SwapchainLifecycleManager::recreate");
        frame_loop::recreate(self, reason)
    }

    /// 销毁并重建 surface 以及交换链；队列族发生变化或者 surface 无法创建时不会返回
    pub fn handle_surface_lost(&mut self) -> bool {
        let _span = tracy_client::span!("SwapchainLifecycleManager::handle_surface_lost");
        frame_loop::handle_surface_lost(self)
    }

    /// 在当前图像槽位的信号量上 acquire 下一张图像
    pub fn acquire_next_swapchain_image(&mut self) -> AcquireResult {
        let _span = tracy_client::span!("SwapchainLifecycleManager::acquire_next_swapchain_image");
        frame_loop::acquire(self)
    }

    fn rebuild_pipelines(&mut self) -> bool {
        let Some(live) = self.live_pass() else {
            return false;
        };
        match self.pipelines.rebuild_if_necessary(&live) {
            Ok(_) => true,
            Err(e) => {
                log::error!("failed to rebuild pipelines: {e}");
                false
            }
        }
    }

    /// 切换 present mode；没有匹配的模式时返回 false，不做任何修改
    pub fn set_swap_interval(&mut self, interval: SwapInterval) -> bool {
        let Some(surface) = self.surface.as_ref() else {
            return false;
        };
        let present_modes = match surface.query_support(self.core.physical_device.vk_handle()) {
            Ok(support) => support.present_modes,
            Err(e) => {
                log::error!("failed to query present modes: {e}");
                return false;
            }
        };
        let Some(mode) = choose_present_mode(&present_modes, interval.present_mode_candidates()) else {
            log::warn!("swap interval `{interval}` is not supported by the surface");
            return false;
        };

        self.swap_interval = interval;
        match self.swapchain.as_ref() {
            None => true,
            Some(swapchain) if swapchain.present_mode() == mode => true,
            Some(_) => self.recreate(RecoveryReason::SwapIntervalChanged),
        }
    }

    /// 只记录日志，交换链在下一次 flip 检查尺寸时重建
    pub fn handle_window_size_change(&self, width: u32, height: u32) {
        log::debug!("window size changed to {width}x{height}");
    }
}

// 帧循环
impl SwapchainLifecycleManager {
    /// 根据描述创建 pipeline，相同描述只创建一次
    pub fn build_pipeline(&mut self, desc: &GraphicsPipelineDesc) -> GfxResult<PipelineId> {
        let live = self.live_pass().ok_or(GfxError::OutOfDate)?;
        self.pipelines.build(desc, &live)
    }

    /// 开始主 render pass；窗口最小化时不开始
    pub fn begin_render_pass(&mut self) -> bool {
        if self.render_pass_started {
            return true;
        }
        if !self.should_draw() {
            return false;
        }
        let (Some(swapchain), Some(targets)) = (self.swapchain.as_ref(), self.targets.as_mut()) else {
            return false;
        };
        if !targets.buffering.current_frame().is_copy_recording() {
            return false;
        }

        let extent = swapchain.extent();
        let framebuffer = targets.framebuffers[swapchain.current_image_index()].handle();
        let render_pass = targets.render_pass.handle();
        let cmd = &targets.buffering.current_frame().cmd_draw;

        cmd.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT).or_fatal("vkBeginCommandBuffer");
        cmd.begin_render_pass(render_pass, framebuffer, extent, &default_clear_values());
        cmd.set_viewport(full_viewport(extent, 0.0, 1.0));
        cmd.set_scissor(vk::Rect2D {
            offset: vk::Offset2D::default(),
            extent,
        });

        self.render_pass_started = true;
        true
    }

    /// 结束本帧：提交、present、切换到下一个帧槽位并 acquire 下一张图像
    pub fn flip(&mut self) {
        let _span = tracy_client::span!("SwapchainLifecycleManager::flip");

        self.frame_counter.next_frame();
        let render_pass_started = std::mem::take(&mut self.render_pass_started);
        frame_loop::flip(self, render_pass_started);
    }
}

impl PresentTarget for SwapchainLifecycleManager {
    fn drawable_size(&self) -> vk::Extent2D {
        self.platform.drawable_size()
    }

    fn swapchain_extent(&self) -> Option<vk::Extent2D> {
        self.targets.as_ref()?;
        self.extent()
    }

    fn is_copy_recording(&self) -> bool {
        self.targets.as_ref().is_some_and(|targets| targets.buffering.current_frame().is_copy_recording())
    }

    fn end_recording(&mut self, render_pass_started: bool) {
        let Some(targets) = self.targets.as_mut() else {
            return;
        };
        let frame = targets.buffering.current_frame_mut();
        if render_pass_started {
            frame.cmd_draw.end_render_pass();
            frame.cmd_draw.end().or_fatal("vkEndCommandBuffer");
        }
        frame.end_copy().or_fatal("vkEndCommandBuffer");
        frame.finish_host_writes().or_fatal("vmaFlushAllocation");
    }

    fn submit_copy(&mut self, consume_acquired: bool) {
        let Some(targets) = self.targets.as_mut() else {
            return;
        };
        let (frame, image_slot) = targets.buffering.current_slots_mut();
        let mut submit = GfxSubmitInfo::new(&[&frame.cmd_copy]);
        if consume_acquired {
            submit = submit.wait(&image_slot.image_acquired, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT);
        }
        self.core.graphics_queue.submit(&[submit], Some(frame.previous_submission())).or_fatal("vkQueueSubmit");
    }

    fn submit_and_present(&mut self) -> SwapchainStatus {
        let (Some(swapchain), Some(targets)) = (self.swapchain.as_ref(), self.targets.as_mut()) else {
            return SwapchainStatus::OutOfDate;
        };
        let (frame, image_slot) = targets.buffering.current_slots_mut();
        let submit = GfxSubmitInfo::new(&[&frame.cmd_copy, &frame.cmd_draw])
            .wait(&image_slot.image_acquired, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .signal(&image_slot.render_finished);
        self.core.graphics_queue.submit(&[submit], Some(frame.previous_submission())).or_fatal("vkQueueSubmit");

        swapchain.present_image(&self.core.present_queue, &image_slot.render_finished)
    }

    fn acquire_image(&mut self) -> SwapchainStatus {
        let (Some(swapchain), Some(targets)) = (self.swapchain.as_mut(), self.targets.as_ref()) else {
            return SwapchainStatus::OutOfDate;
        };
        swapchain.acquire_next_image(&targets.buffering.current_image_slot().image_acquired)
    }

    fn advance_frame(&mut self, skip_acquire_new_image: bool) {
        if let Some(targets) = self.targets.as_mut() {
            targets.buffering.swap(skip_acquire_new_image).or_fatal("BufferingMechanism::swap");
        }
    }

    fn begin_copy(&mut self) {
        if let Some(targets) = self.targets.as_mut() {
            targets.buffering.current_frame_mut().begin_copy().or_fatal("vkBeginCommandBuffer");
        }
    }

    fn recovery_guard(&mut self) -> &mut RecoveryGuard {
        &mut self.recovery
    }

    fn rebuild_swapchain(&mut self) -> bool {
        self.destroy_swapchain_specific(false);
        self.create_swapchain() && self.rebuild_pipelines()
    }

    fn rebuild_surface(&mut self) -> bool {
        self.destroy_swapchain_specific(true);
        self.surface = None;

        let platform = self.platform.clone();
        let create_surface =
            |entry: &ash::Entry, instance: &ash::Instance| platform.create_surface(entry, instance);
        let surface = match self.core.create_surface(&create_surface) {
            Ok(surface) => surface,
            Err(e) => handle_unrecoverable_error(FatalError::surface_creation(e)),
        };

        let pdevice = &self.core.physical_device;
        let families = GfxPhysicalDevice::find_queue_families(
            self.core.instance.ash_instance(),
            surface.pf(),
            surface.handle(),
            pdevice.vk_handle(),
        );
        let (old_graphics, old_present) = (pdevice.graphics_queue_family(), pdevice.present_queue_family());
        match families {
            Some((graphics, present)) if graphics == old_graphics && present == old_present => {}
            other => {
                let (new_graphics, new_present) = other.unwrap_or((vk::QUEUE_FAMILY_IGNORED, vk::QUEUE_FAMILY_IGNORED));
                handle_unrecoverable_error(FatalError::from_gfx(
                    "handle_surface_lost",
                    GfxError::QueueFamilyMismatch {
                        old_graphics,
                        new_graphics,
                        old_present,
                        new_present,
                    },
                ));
            }
        }

        self.surface = Some(surface);
        self.create_swapchain() && self.rebuild_pipelines()
    }

    fn throttle_wait(&mut self) {
        self.throttle.wait();
    }

    fn throttle_reset(&mut self) {
        self.throttle.reset();
    }
}

// destroy
impl SwapchainLifecycleManager {
    /// 上层的 buffer、纹理需要在此之前全部 drop
    pub fn destroy(mut self) {
        let _span = tracy_client::span!("SwapchainLifecycleManager::destroy");

        self.destroy_swapchain_specific(true);
        let Self {
            surface,
            pipelines,
            retirement,
            core,
            ..
        } = self;

        pipelines.destroy();
        for object in retirement.drain() {
            object.retire();
        }
        drop(surface);
        core.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_present_mode() {
        let all = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::FIFO_RELAXED];
        assert_eq!(
            resolve_present_mode(&all, SwapInterval::Immediate).unwrap(),
            (vk::PresentModeKHR::MAILBOX, SwapInterval::Immediate)
        );
        assert_eq!(
            resolve_present_mode(&all, SwapInterval::AdaptiveVsync).unwrap(),
            (vk::PresentModeKHR::FIFO_RELAXED, SwapInterval::AdaptiveVsync)
        );
    }

    #[test]
    fn test_present_mode_falls_back_to_fifo() {
        let fifo_only = [vk::PresentModeKHR::FIFO];
        assert_eq!(
            resolve_present_mode(&fifo_only, SwapInterval::Immediate).unwrap(),
            (vk::PresentModeKHR::FIFO, SwapInterval::Vsync)
        );

        let no_fifo = [vk::PresentModeKHR::MAILBOX];
        assert!(matches!(resolve_present_mode(&no_fifo, SwapInterval::Vsync), Err(GfxError::FifoUnsupported)));
    }

    #[test]
    fn test_lifecycle_state() {
        let recreating = RecoveryState::Recreating {
            reason: RecoveryReason::OutOfDate,
            depth: 1,
        };
        assert_eq!(lifecycle_state(recreating, true, false), LifecycleState::Recreating);
        assert_eq!(lifecycle_state(RecoveryState::Active, false, false), LifecycleState::Lost);
        assert_eq!(lifecycle_state(RecoveryState::Active, true, false), LifecycleState::Uninitialized);
        assert_eq!(lifecycle_state(RecoveryState::Active, true, true), LifecycleState::Active);
    }

    #[test]
    fn test_full_viewport() {
        let viewport = full_viewport(vk::Extent2D { width: 800, height: 600 }, 0.0, 1.0);
        assert_eq!((viewport.x, viewport.y), (0.0, 0.0));
        assert_eq!((viewport.width, viewport.height), (800.0, 600.0));
        assert_eq!((viewport.min_depth, viewport.max_depth), (0.0, 1.0));
    }

    #[test]
    fn test_clear_values() {
        let clears = default_clear_values();
        unsafe {
            assert_eq!(clears[0].color.float32, DefaultRendererSettings::CLEAR_COLOR);
            assert_eq!(clears[1].depth_stencil.depth, 1.0);
            assert_eq!(clears[1].depth_stencil.stencil, 0);
        }
    }
}
