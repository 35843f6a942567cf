pub mod descriptor_pools;
pub mod descriptor_set_layout;
