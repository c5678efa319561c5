pub mod config;
pub mod error;
pub mod event;
pub mod traits;
pub mod transcript;
pub mod types;

pub use config::AppConfig;
pub use error::{ErrorKind, Result, SwitchyardError};
pub use event::EventBus;
pub use transcript::Transcript;
pub use types::*;
