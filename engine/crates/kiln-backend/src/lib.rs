//! Vulkan 渲染后端
//!
//! - [`buffering`]：`MAX_FRAMES_IN_FLIGHT` 个帧资源组成的环，以及交换链图像的信号量环
//! - [`swapchain_lifecycle`]：交换链的创建、销毁、重建以及错误恢复
//! - [`frame_loop`]：flip 与 acquire 的控制流，以及出错时的恢复路径
//! - [`pipeline_registry`]：按创建参数缓存 pipeline，render pass 不兼容时重建
//! - [`backend`]：面向上层的绘制接口
//!
//! 所有类型都只能在提交线程上使用。

pub mod backend;
pub mod buffer;
pub mod buffering;
pub mod frame;
pub mod frame_loop;
pub mod pipeline_registry;
pub mod recovery;
pub mod swapchain_lifecycle;
pub mod texture;
pub mod throttle;
pub mod vulkan_pipeline;
