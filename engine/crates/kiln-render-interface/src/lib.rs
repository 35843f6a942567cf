//! 渲染后端的接口层
//!
//! - [`pipeline_settings`]：编译期常量
//! - [`config`]：运行时配置 `BackendConfig`
//! - [`platform`] / [`shader_loader`]：后端依赖的外部协作者
//! - [`pipeline_desc`]：上层描述 pipeline 所使用的抽象类型

pub mod config;
pub mod frame_counter;
pub mod pipeline_desc;
pub mod pipeline_settings;
pub mod platform;
pub mod shader_loader;
pub mod swap_interval;
