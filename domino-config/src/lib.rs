#![warn(clippy::all)]
#![warn(rust_2018_idioms)]

//! # Domino Config
//!
//! Two unrelated but adjacent concerns: [`settings`] layers process
//! configuration (defaults < file < `DOMINO_*` env, same precedence the
//! wider workspace uses for its own config layer), while [`fixture`]
//! parses and writes the plain-text `key=value` fixture format the CLI
//! tools read and write.

pub mod error;
pub mod fixture;
pub mod settings;

pub use error::{ConfigError, Result};
pub use fixture::{Fixture, FixtureWriter};
pub use settings::{load_settings, BudgetSettings, LoggingSettings, Settings, WorldSettings};
