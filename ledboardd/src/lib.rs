//! ledboardd
//!
//! Board communication coordinator: discovers attached LED boards in the
//! background and runs foreground board commands without ever letting the
//! two touch a serial port at the same time.

pub mod communication;
pub mod config;

#[cfg(test)]
pub mod test_utils;

pub use communication::{BoardEvent, CommandKind, Communicator, EventFilter};
pub use config::RuntimeConfig;
