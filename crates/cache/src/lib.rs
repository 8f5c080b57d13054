pub mod error;
pub mod key;
pub mod refresher;
pub mod store;
pub mod weather;

pub use error::CacheError;
pub use key::cache_key;
pub use refresher::{Clock, PeriodicRefresher, RefreshSchedule, TickOutcome, UpstreamSource};
pub use store::{CacheStore, MemoryCache};
pub use weather::{Weather, WeatherResult, WEATHER_KEY_PREFIX};
