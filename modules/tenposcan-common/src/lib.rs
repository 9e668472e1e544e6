pub mod config;
pub mod error;
pub mod quality;
pub mod region;
pub mod types;

pub use config::Config;
pub use error::{FetchError, TenposcanError};
pub use quality::*;
pub use types::*;
