pub mod clock;
pub mod config;
pub mod db;
pub mod http_error;
pub mod kernel;
pub mod plugins;
pub mod rate_limit;

pub use crate::kernel::*;
pub use crate::db::*;
