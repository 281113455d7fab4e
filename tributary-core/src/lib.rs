//! Tributary Core - Strongly-typed identifiers, label sets and entries.
//!
//! This crate provides the types every other Tributary crate speaks in:
//! tenant and stream identifiers, fingerprints, timestamps, log entries,
//! push requests and the label-set canonicalizer.
//!
//! # Design Principles
//!
//! - **Strongly-typed IDs**: a `StreamId` cannot be confused with a `Fingerprint`
//! - **Canonical label sets**: equality never depends on declaration order
//! - **Explicit limits**: every tenant-facing resource has a bounded maximum
//! - **No unsafe code**

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod entry;
mod error;
mod labels;
mod limits;
mod types;

pub use entry::{Entry, PushRequest, StreamPush, Timestamp};
pub use error::{Error, Result};
pub use labels::{
    canonicalize, parse_canonical, parse_labels, Canonical, FingerprintAlgorithm, Label, LabelSet,
};
pub use limits::TenantLimits;
pub use types::{Fingerprint, StreamId, TenantId};
