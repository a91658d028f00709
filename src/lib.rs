#[macro_use]
extern crate lazy_static;

pub mod cloud_functions;
pub mod error;
pub mod logger;
pub mod orchestrator;
pub mod paths;
pub mod provisioner;
pub mod retry;
pub mod shell_tools;
pub mod utils;
pub mod verify;

pub use error::LifecycleError;
pub use orchestrator::Lifecycle;
