use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("settings layering error: {0}")]
    Settings(#[from] config::ConfigError),
    #[error("fixture {path}: missing required header line (expected \"{expected}\")")]
    MissingHeader { path: String, expected: String },
    #[error("fixture {path}: header \"{found}\" does not match expected \"{expected}\"")]
    WrongHeader {
        path: String,
        expected: String,
        found: String,
    },
    #[error("fixture {path}:{line}: malformed key=value entry {text:?}")]
    MalformedLine {
        path: String,
        line: usize,
        text: String,
    },
    #[error("fixture {path}:{line}: key {key} value {value:?} does not parse as {expected}")]
    BadValue {
        path: String,
        line: usize,
        key: String,
        value: String,
        expected: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, ConfigError>;
