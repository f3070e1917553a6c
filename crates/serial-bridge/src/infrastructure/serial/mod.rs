//! Serial port adapters.
//!
//! - **`system`** – Real ports through the `serialport` crate.
//! - **`mock`** – In-memory ports for tests; shipped in the library so
//!   integration tests and downstream hosts can use them.

pub mod mock;
pub mod system;

pub use mock::{MockPortHandle, MockPortOpener};
pub use system::SystemPortOpener;
