//! Integration tests for folio-ws.
//!
//! These tests drive the dispatcher against a scripted execution service:
//! - Round-trips and channel reuse
//! - Reconnect-and-resend on disconnect
//! - Suggestion follow-up and reply timeouts

pub mod common;
