//! Quota accounting, key quarantine, and load-balanced key selection for
//! the multi-key gateway (spec.md §4.4-§4.6).
//!
//! The gateway never owns credentials: every API key it ever sees arrives
//! on a single request and is represented here only as its
//! [`hash::key_hash`] everywhere except the balancer's selection and
//! outcome-recording paths, which briefly hold the raw key on its way to
//! the upstream call.

#![deny(missing_docs)]

mod balancer;
mod blacklist;
mod error;
mod hash;
mod log_store;
mod quota;

pub use balancer::{ApiKeyCandidate, Balancer, BalancerError, CallOutcome, FallbackReason, SelectedKey};
pub use blacklist::{BlacklistEntry, BlacklistManager, BlacklistReason, BlacklistStore, InMemoryBlacklistStore};
pub use error::StorageError;
pub use hash::key_hash;
pub use log_store::{InMemoryRequestLogStore, RequestLogRecord, RequestLogStore, WindowUsage};
pub use quota::{QuotaDecision, QuotaManager, QuotaRejectionReason};
