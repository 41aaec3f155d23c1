//! Typed construction/serialization errors. Subsystem-level refusals
//! (budget exhaustion, missing store, policy block, ...) are reported as
//! values through `QueryMeta`/result structs, never through this type.
//! `DomainError` exists only for the handful of paths that are genuinely
//! exceptional: malformed serialized containers and registry
//! misconfiguration.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("TLV frame truncated: need {needed} bytes, have {available}")]
    TruncatedFrame { needed: usize, available: usize },

    #[error("unknown subsystem tag 0x{0:04x}")]
    UnknownTag(u32),

    #[error("no tag registered for subsystem {0:?}")]
    UnmappedSubsystem(crate::registry::SubsystemId),

    #[error("unrecognized world-file magic")]
    BadMagic,

    #[error("unsupported world-file version {0}")]
    UnsupportedVersion(u16),

    #[error("subsystem payload length mismatch: declared {declared}, actual {actual}")]
    PayloadLengthMismatch { declared: u32, actual: u32 },
}

pub type Result<T> = std::result::Result<T, DomainError>;
