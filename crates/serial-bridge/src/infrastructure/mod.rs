//! Infrastructure layer for the bridge.
//!
//! Contains OS-facing adapters: serial ports, the multiplex network front
//! end, configuration storage, event sinks, the host control surface and
//! runtime assembly from configuration.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `bridge_core`, but MUST NOT be imported by the `application` layer
//! (test modules excepted).

pub mod control;
pub mod events;
pub mod network;
pub mod runtime;
pub mod serial;
pub mod storage;
