pub mod cancel;
pub mod config;
pub mod error;
pub mod time;

pub use cancel::{CancellationSource, CancellationToken};
pub use config::Config;
pub use error::*;
