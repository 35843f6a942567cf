pub mod format;
pub mod one_time;
