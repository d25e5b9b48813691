//! Command-line tool for CANopen networks
//!
//! One binary, `canopentool`, covering three jobs: issuing NMT state
//! commands, reading and writing object-dictionary entries via SDO, and a
//! live terminal dashboard of per-node heartbeat state and bus traffic.
//!
//! The tool can also be installed as hard or soft links named `nmt`,
//! `sdo-upload`, `sdo-read`, `sdo-download`, or `sdo-write`; the link name
//! selects the subcommand.

pub mod command;
pub mod monitor_ui;
pub mod num;
pub mod permissions;
pub mod presence;
