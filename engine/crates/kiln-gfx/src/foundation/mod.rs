pub mod gfx_core;
pub mod debug_messenger;
pub mod device;
pub mod instance;
pub mod mem_allocator;
pub mod physical_device;
