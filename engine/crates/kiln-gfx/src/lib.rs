//! Vulkan GFX 抽象层
//!
//! 提供对 Vulkan API 的封装，包括设备管理、同步原语、命令缓冲、块分配器、描述符池、
//! render pass 兼容性判断以及交换链。
//!
//! 与单例不同，所有 Vulkan 对象通过 `Rc<GfxDevice>` 注入，生命周期由持有者显式控制。

pub mod allocator;
pub mod commands;
pub mod descriptors;
pub mod error;
pub mod fatal;
pub mod foundation;
pub mod pipelines;
pub mod render_pass;
pub mod resources;
pub mod swapchain;
pub mod utilities;
