//! Network infrastructure.
//!
//! # Sub-modules
//!
//! - **`multiplex`** – The single-port front end: many named serial devices
//!   served to many clients over the length-prefixed protocol, with
//!   per-connection subscriptions.
//!
//! Per-node raw TCP listeners are part of `application::node`; they are
//! plain byte proxies and need no protocol handling.

pub mod multiplex;

pub use multiplex::MultiplexServer;
