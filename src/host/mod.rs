//! Host-facing contract for native shell integration.
//!
//! The native app drives the notification service over newline-delimited
//! JSON: it forwards content payloads, triggers resyncs, and reads the
//! diagnostics projections.

pub mod contract;
pub mod handler;
pub mod stdio;
