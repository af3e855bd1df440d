//! Engine error types and process exit codes.

use chronus_transport::TransportError;

/// Top-level engine failures.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Bad runtime configuration (env vars or flags).
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Ring or queue construction failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The audio device could not be opened or died.
    #[error("audio device error: {0}")]
    Device(String),

    /// The supervisor reached a state it cannot recover from.
    #[error("unrecoverable supervisor state: {0}")]
    Unrecoverable(String),
}

impl EngineError {
    /// Process exit code for this failure class: 2 for initialization
    /// failures, 3 for unrecoverable supervisor state.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Transport(_) | Self::Device(_) => 2,
            Self::Unrecoverable(_) => 3,
        }
    }
}

/// A configuration value failed to load or validate.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable did not parse as its expected type.
    #[error("invalid value for {name}: {value:?}")]
    BadValue {
        /// Variable name.
        name: &'static str,
        /// Offending value.
        value: String,
    },

    /// A parsed value is outside its accepted range.
    #[error("{name} = {value} out of range ({detail})")]
    OutOfRange {
        /// Variable name.
        name: &'static str,
        /// Parsed value.
        value: i64,
        /// Human-readable constraint.
        detail: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_match_contract() {
        let config = EngineError::Config(ConfigError::BadValue {
            name: "BUFFER_SIZE",
            value: "bogus".into(),
        });
        assert_eq!(config.exit_code(), 2);
        assert_eq!(EngineError::Device("gone".into()).exit_code(), 2);
        assert_eq!(
            EngineError::Unrecoverable("both slots dead".into()).exit_code(),
            3
        );
    }
}
