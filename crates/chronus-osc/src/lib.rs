//! OSC control transport for the chronus runtime.
//!
//! A UDP server thread decodes OSC packets, validates them against the
//! canonical namespace, and forwards typed [`ControlRequest`]s to the
//! control loop. It never touches the audio path: parameter and gate
//! messages become command records the supervisor broadcasts, patch
//! messages become patch-queue operations, and the two query addresses
//! (`/engine/schema`, `/engine/status`) are answered directly over UDP
//! with JSON snapshots.
//!
//! Canonical namespace (`id` matches `[a-z0-9_]{1,16}`):
//!
//! | address                         | effect                         |
//! |---------------------------------|--------------------------------|
//! | `/mod/<id>/<param> <value>`     | set parameter target           |
//! | `/gate/<id> <0\|1>`             | set gate                       |
//! | `/patch/create <id> <type>`     | standby patch edit             |
//! | `/patch/connect <src> <dst>`    | standby patch edit             |
//! | `/patch/disconnect <src> <dst>` | standby patch edit             |
//! | `/patch/delete <id>`            | standby patch edit             |
//! | `/patch/commit`                 | prime standby, stage switch    |
//! | `/patch/abort`                  | discard standby patch          |
//! | `/engine/schema`                | JSON schema snapshot (reply)   |
//! | `/engine/status`                | JSON counter snapshot (reply)  |
//!
//! Malformed messages are counted and dropped (`malformed_messages` in the
//! status snapshot) and never reach the engine.

pub mod namespace;
pub mod server;

pub use namespace::{ControlRequest, ParseError, Parsed, Query, parse_message};
pub use server::OscServer;

/// OSC transport failures.
#[derive(Debug, thiserror::Error)]
pub enum OscError {
    /// Could not bind the UDP socket.
    #[error("bind {addr} failed: {source}")]
    Bind {
        /// Address we tried to bind.
        addr: String,
        /// Underlying socket error.
        source: std::io::Error,
    },

    /// Socket configuration failed.
    #[error("socket setup failed: {0}")]
    Socket(std::io::Error),
}
