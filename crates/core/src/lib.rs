pub mod config;
pub mod error;
pub mod offer;
pub mod task;

pub use config::Config;
pub use error::*;
pub use offer::*;
pub use task::*;
