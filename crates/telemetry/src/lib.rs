//! Structured logging bootstrap for the gateway.
//!
//! Metrics/traces export is outside this spec's core (spec.md §1: "the
//! outer CORS/auth/request-logging middleware" and structured logging
//! itself are named as external collaborators) but the ambient logging
//! idiom — `logforth` dispatch to a UTC-timestamped stderr layout, driven
//! by an env-style filter string — is carried regardless, per the
//! ambient-stack rule.

#![deny(missing_docs)]

mod logger;

pub use logger::init;
