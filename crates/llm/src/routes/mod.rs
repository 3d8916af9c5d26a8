//! Per-dialect route handlers (spec.md §6). Each module owns one wire
//! dialect's validate → encode → select-key → call → decode sequence,
//! built on the shared plumbing in [`crate::adapter`] and
//! [`crate::upstream_client`].

pub mod claude;
pub mod gemini;
pub mod openai;
