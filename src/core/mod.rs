pub mod coordinator;
pub mod engine;
pub mod ledger;
pub mod transform;

pub use crate::domain::ports::{ConfigProvider, KernelClient, OrderSource, Storage};
pub use crate::utils::error::Result;
pub use coordinator::{DispatchCoordinator, DispatchSettings, TickSummary};
pub use engine::DispatchEngine;
pub use ledger::DispatchState;
