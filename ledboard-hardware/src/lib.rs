//! ledboard-hardware
//!
//! Hardware abstraction crate that contains board discovery, the low-level
//! serial driver and the board protocol. The communication daemon only talks
//! to boards through the traits exported here.
//!
//! Public API:
//! - `discovery::DiscoverySource` / `SerialDiscovery`: list attached boards
//! - `session::BoardSession` / `SessionFactory`: per-port board operations
//! - `board_api::BoardApi`: board protocol over a `SerialTransport`
//! - `serial_driver::SerialDriver`: low-level serial I/O driver

pub mod board_api;
pub mod discovery;
pub mod serial_driver;
pub mod session;

pub use board_api::BoardApi;
pub use discovery::{DiscoverySource, SerialDiscovery};
pub use serial_driver::{SerialDriver, SerialTransport};
pub use session::{BoardSession, SerialSessionFactory, SessionFactory};
