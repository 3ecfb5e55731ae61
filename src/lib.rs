pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use adapters::{HttpKernelClient, HttpOrderSource, LocalStorage};
pub use config::BridgeConfig;
#[cfg(feature = "cli")]
pub use config::CliArgs;

pub use core::{DispatchCoordinator, DispatchEngine, DispatchSettings, TickSummary};
pub use utils::error::{BridgeError, Result};
