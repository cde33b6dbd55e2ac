pub mod config;
pub mod error;
pub mod event;
pub mod logging;
pub mod retry;
pub mod traits;
pub mod types;

pub use config::AppConfig;
pub use error::{DatabaseErrorKind, Result, TenderError};
pub use event::EventBus;
pub use retry::RetryPolicy;
pub use types::*;
