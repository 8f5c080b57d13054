pub mod error;
pub mod forecast;
pub mod inbox;
pub mod processor;
pub mod service;

pub use error::ServiceError;
pub use forecast::HttpForecastClient;
pub use inbox::Inbox;
pub use processor::ResultsFileProcessor;
pub use service::{ResultsService, ShutdownReport};
