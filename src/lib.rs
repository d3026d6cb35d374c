//! # Network-health stats engine
//!
//! Harvests participant scores, tick counts and revenue samples from three
//! backends and keeps a fixed set of status items in an output channel up to
//! date, editing them in place every cycle.
//!
//! ## Module Organization
//!
//! - `sources` - document store, tick socket and bus adapters
//! - `snapshot` - atomically swapped feed snapshots
//! - `stats` - min/max band, quorum revenue, tick histogram
//! - `render` - text of every published item
//! - `presentation` - output channel trait, sync protocol, Discord adapter
//! - `scheduler` / `tasks` - the render loop and its per-metric tasks
//! - `transfer` - validated, serialized transfer submissions
//! - `config` - environment configuration

pub mod config;
pub mod errors;
pub mod presentation;
pub mod render;
pub mod scheduler;
pub mod snapshot;
pub mod sources;
pub mod stats;
pub mod tasks;
pub mod transfer;

pub use config::{ConfigError, StatsConfig, TickSource, TransferConfig};
pub use errors::{SourceError, SyncError};
pub use scheduler::{CycleReport, MetricTask, Scheduler};
pub use snapshot::FeedSnapshots;
