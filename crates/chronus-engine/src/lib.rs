//! Chronus engine: the fault-tolerant, live-patchable audio runtime.
//!
//! Two worker slots render the same patch in lockstep; the output feed
//! reads whichever slot is active; the supervisor rebuilds graphs in the
//! standby and swaps slots at block boundaries — the same mechanism serves
//! live re-patching and crash failover.
//!
//! # Pieces
//!
//! - [`EngineConfig`] - env-var tunables (`BUFFER_SIZE`, `NUM_BUFFERS`, ...)
//! - [`Supervisor`] - slots, command broadcast, patch dispatch, commit
//!   orchestration, monitor/failover
//! - [`OutputFeed`] - the device callback body; also drivable directly by
//!   tests
//! - [`StatusHandle`] / [`StatusSnapshot`] - lock-free observable state
//!
//! # Wiring
//!
//! ```rust,ignore
//! let config = EngineConfig::from_env()?;
//! let (mut supervisor, mut feed) = Supervisor::new(config, ModuleRegistry::with_builtins())?;
//!
//! // Device thread:
//! backend.build_output_stream(&stream_config, Box::new(move |out| {
//!     feed.fill(out, channels);
//! }), ...)?;
//!
//! // Control thread:
//! loop {
//!     supervisor.monitor()?;
//!     // drain control requests, broadcast commands, queue patches...
//! }
//! ```

pub mod config;
pub mod error;
pub mod feed;
pub mod slot;
pub mod status;
pub mod supervisor;
pub mod worker;

pub use config::EngineConfig;
pub use error::{ConfigError, EngineError};
pub use feed::{ConsumerSwap, OutputFeed};
pub use slot::{Slot, SlotShared, WorkerFlags};
pub use status::{SlotSnapshot, StatusCounters, StatusHandle, StatusSnapshot};
pub use supervisor::{CommitOutcome, MONITOR_PERIOD, Supervisor};
