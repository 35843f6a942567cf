pub mod compat;
pub mod description;
#[allow(clippy::module_inception)]
pub mod render_pass;
