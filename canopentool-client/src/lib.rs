//! A client library for operating CANopen nodes over a CAN bus
//!
//! The crate provides the state machines behind the `canopentool` binary:
//!
//! - An [SDO client](SdoClient) for reading/writing a node's object
//!   dictionary via its SDO server (expedited download, expedited and
//!   segmented upload)
//! - An [NMT issuer](NmtMaster) for commanding node state transitions
//! - A [heartbeat monitor engine](monitor::Monitor) which tracks per-node
//!   liveness and bus traffic from received frames and classifies each node
//!   for display
//!
//! Everything is display- and transport-agnostic; the binary supplies the
//! socketcan transport from `canopentool-common` and the terminal rendering.
#![warn(missing_docs, missing_debug_implementations)]

pub mod monitor;
mod nmt_master;
mod sdo_client;

pub use canopentool_common as common;

pub use nmt_master::{NmtMaster, NmtSendError, NMT_ANY_NODE};
pub use sdo_client::{sdo_response_filter, RawAbortCode, SdoClient, SdoClientError, UploadData};
