//! CLI error type. Every variant maps to one of the three documented
//! exit codes in `main`'s `run` dispatch: validation/logic failure (1)
//! or invalid invocation/fixture (2).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("fixture error: {0}")]
    Fixture(#[from] domino_config::ConfigError),

    #[error("io error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("resolve refused: {0:?}")]
    Refused(domino_core::domain::Refusal),
}

impl CliError {
    /// 1 for a refused/failed operation, 2 for anything that means the
    /// invocation or fixture itself was bad.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Refused(_) => 1,
            CliError::Fixture(_) | CliError::Io { .. } => 2,
        }
    }
}

pub type Result<T> = std::result::Result<T, CliError>;
