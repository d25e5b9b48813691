//! Shared code for the canopentool crates
//!
//! Contains the CAN message types, the CANopen frame codec (NMT, heartbeat,
//! SDO), and the SocketCAN transport used by `canopentool-client` and the
//! `canopentool` binary.

pub mod messages;
pub mod node_id;
pub mod sdo;
pub mod traits;

mod socketcan;

pub use socketcan::{open_socketcan, OpenError, ReceiveError, SocketCanReceiver, SocketCanSender};

pub use node_id::NodeId;

pub use messages::{CanId, CanMessage};

// Re-exported so callers can build receive filters without depending on the
// socketcan crate directly.
pub use ::socketcan::CanFilter;
