//! # API Route Modules
//!
//! - `certificates` — batch commit, revocation, verification, artifact
//!   export and issuance statistics.
//! - `metrics` — request and reconciliation counters for operators.

pub mod certificates;
pub mod metrics;
