pub mod files;
pub mod global_config;
