//! webwatchd: probe a web endpoint, restart its service when it stops
//! answering, and tell an operator what happened.

pub mod clock;
pub mod config;
pub mod control;
pub mod cycle;
pub mod install;
pub mod notify;
pub mod probe;
pub mod signals;
pub mod watcher;

pub use config::{LoadedConfig, WatchConfig};
pub use cycle::{CycleOutcome, CyclePhase, WatchCycle};
pub use watcher::Watcher;
