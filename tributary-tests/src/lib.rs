//! Tributary Tests - integration tests for the ingest write path.
//!
//! Unit tests live inline in each crate. This crate exercises the crates
//! together through the public API:
//!
//! ## Test Organization
//!
//! - `collision_tests`: distinct label sets sharing a fingerprint
//! - `concurrency_tests`: many writers across many streams of one tenant
//! - `cut_policy_tests`: sync-period and capacity cuts over randomized input
//! - `limiter_tests`: per-tenant stream limits and replica share
//! - `registry_tests`: tenant instances, cancellation and shutdown
//!
//! **Support Modules**:
//! - `scenarios`: label fixtures, entry generators and seeds
//!
//! ## Naming Conventions
//!
//! - Integration tests: `test_<component>_<scenario>`
//! - Unit tests: Inline in each crate under `#[cfg(test)]`

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod scenarios;

#[cfg(test)]
mod cut_policy_tests;
#[cfg(test)]
mod registry_tests;
