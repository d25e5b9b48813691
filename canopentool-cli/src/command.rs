//! Command line definitions and dispatch helpers

use std::ffi::OsString;
use std::path::Path;
use std::str::FromStr;

use clap::{Args, Parser, Subcommand, ValueEnum};

use canopentool_client::common::messages::NmtCommandSpecifier;
use canopentool_client::common::sdo::SdoValueType;
use canopentool_client::common::NodeId;

use crate::num;

#[derive(Debug, Parser)]
#[command(name = "canopentool", about = "The Swiss Army Knife for CANopen networks")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Send an NMT state command to a node, or to all nodes
    Nmt(NmtArgs),
    /// Read an object from a node's dictionary via SDO
    #[command(name = "sdo-upload", visible_alias = "sdo-read")]
    SdoUpload(SdoUploadArgs),
    /// Write an object in a node's dictionary via SDO
    #[command(name = "sdo-download", visible_alias = "sdo-write")]
    SdoDownload(SdoDownloadArgs),
    /// Show a live dashboard of node heartbeats and bus traffic
    Monitor(MonitorArgs),
}

#[derive(Debug, Args)]
pub struct NmtArgs {
    /// The CAN interface to use (e.g. 'can0')
    pub interface: String,
    /// The state transition to command
    pub action: NmtAction,
    /// The node ID to command. Omit, or use '0' or 'all', to broadcast.
    pub node: Option<NmtNodeArg>,
}

#[derive(Clone, Copy, Debug, PartialEq, ValueEnum)]
pub enum NmtAction {
    Start,
    Stop,
    Preop,
    ResetNode,
    ResetComm,
}

impl From<NmtAction> for NmtCommandSpecifier {
    fn from(action: NmtAction) -> Self {
        match action {
            NmtAction::Start => NmtCommandSpecifier::Start,
            NmtAction::Stop => NmtCommandSpecifier::Stop,
            NmtAction::Preop => NmtCommandSpecifier::EnterPreOp,
            NmtAction::ResetNode => NmtCommandSpecifier::ResetNode,
            NmtAction::ResetComm => NmtCommandSpecifier::ResetComm,
        }
    }
}

/// Specifies a node to apply an NMT command
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NmtNodeArg {
    All,
    Specific(NodeId),
}

impl NmtNodeArg {
    pub fn raw(&self) -> u8 {
        match self {
            Self::All => 0,
            Self::Specific(id) => id.raw(),
        }
    }
}

impl FromStr for NmtNodeArg {
    type Err = &'static str;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        match num::parse_base0(s) {
            Ok(0) => Ok(Self::All),
            Ok(value) => u8::try_from(value)
                .ok()
                .and_then(|v| NodeId::new(v).ok())
                .map(Self::Specific)
                .ok_or("Node ID must be between 0 and 127"),
            Err(_) => Err("Must specify a node ID, or 'all' to broadcast"),
        }
    }
}

#[derive(Debug, Args)]
pub struct SdoUploadArgs {
    /// The CAN interface to use (e.g. 'can0')
    pub interface: String,
    /// The ID of the node to read from
    #[arg(value_parser = num::parse_node_id)]
    pub node_id: NodeId,
    /// The object index to read
    #[arg(value_parser = num::parse_index)]
    pub index: u16,
    /// The sub object to read
    #[arg(value_parser = num::parse_subindex)]
    pub sub: u8,
}

#[derive(Debug, Args)]
pub struct SdoDownloadArgs {
    /// The CAN interface to use (e.g. 'can0')
    pub interface: String,
    /// The ID of the node to write to
    #[arg(value_parser = num::parse_node_id)]
    pub node_id: NodeId,
    /// The object index to write
    #[arg(value_parser = num::parse_index)]
    pub index: u16,
    /// The sub object to write
    #[arg(value_parser = num::parse_subindex)]
    pub sub: u8,
    /// The value to write
    #[arg(value_parser = num::parse_value)]
    pub data: u32,
    /// The scalar type of the value; omit to send all four bytes without a
    /// size indication
    #[arg(ignore_case = true)]
    pub ty: Option<SdoDataType>,
}

#[derive(Clone, Copy, Debug, PartialEq, ValueEnum)]
#[value(rename_all = "UPPER")]
pub enum SdoDataType {
    U8,
    I8,
    U16,
    I16,
    U24,
    I24,
    U32,
    I32,
}

impl From<SdoDataType> for SdoValueType {
    fn from(ty: SdoDataType) -> Self {
        match ty {
            SdoDataType::U8 => SdoValueType::U8,
            SdoDataType::I8 => SdoValueType::I8,
            SdoDataType::U16 => SdoValueType::U16,
            SdoDataType::I16 => SdoValueType::I16,
            SdoDataType::U24 => SdoValueType::U24,
            SdoDataType::I24 => SdoValueType::I24,
            SdoDataType::U32 => SdoValueType::U32,
            SdoDataType::I32 => SdoValueType::I32,
        }
    }
}

#[derive(Debug, Args)]
pub struct MonitorArgs {
    /// The CAN interface to watch (e.g. 'can0')
    pub interface: String,
}

/// Link basenames that select a subcommand
const LINK_COMMANDS: &[&str] = &["nmt", "sdo-upload", "sdo-read", "sdo-download", "sdo-write"];

/// All names which must not be mistaken for a bare interface argument
const SUBCOMMANDS: &[&str] = &[
    "nmt",
    "sdo-upload",
    "sdo-read",
    "sdo-download",
    "sdo-write",
    "monitor",
    "help",
];

/// Rewrite raw process arguments for parsing
///
/// Two affordances on top of the plain subcommand grammar: invoking the tool
/// through a link named after a subcommand selects that subcommand, and a
/// single argument that is not a subcommand is taken as an interface name for
/// the monitor.
pub fn effective_args(mut args: Vec<OsString>) -> Vec<OsString> {
    let basename = args
        .first()
        .map(|p| {
            Path::new(p)
                .file_name()
                .unwrap_or_default()
                .to_string_lossy()
                .to_ascii_lowercase()
        })
        .unwrap_or_default();
    if LINK_COMMANDS.contains(&basename.as_str()) {
        args.insert(1, basename.into());
        return args;
    }
    if args.len() == 2 {
        let arg = args[1].to_string_lossy();
        if !arg.starts_with('-') && !SUBCOMMANDS.contains(&arg.as_ref()) {
            args.insert(1, "monitor".into());
        }
    }
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<OsString> {
        list.iter().map(OsString::from).collect()
    }

    #[test]
    fn test_link_basename_selects_subcommand() {
        assert_eq!(
            args(&["/usr/bin/nmt", "nmt", "can0", "start", "5"]),
            effective_args(args(&["/usr/bin/nmt", "can0", "start", "5"]))
        );
        assert_eq!(
            args(&["./sdo-read", "sdo-read", "can0", "5", "0x1000", "0"]),
            effective_args(args(&["./sdo-read", "can0", "5", "0x1000", "0"]))
        );
        assert_eq!(
            args(&["SDO-WRITE", "sdo-write", "can0", "5", "0x1000", "0", "1"]),
            effective_args(args(&["SDO-WRITE", "can0", "5", "0x1000", "0", "1"]))
        );
    }

    #[test]
    fn test_bare_interface_runs_monitor() {
        assert_eq!(
            args(&["canopentool", "monitor", "can0"]),
            effective_args(args(&["canopentool", "can0"]))
        );
        // Explicit subcommands and flags are left alone
        assert_eq!(
            args(&["canopentool", "monitor", "can0"]),
            effective_args(args(&["canopentool", "monitor", "can0"]))
        );
        assert_eq!(
            args(&["canopentool", "--help"]),
            effective_args(args(&["canopentool", "--help"]))
        );
        assert_eq!(
            args(&["canopentool", "nmt"]),
            effective_args(args(&["canopentool", "nmt"]))
        );
    }

    #[test]
    fn test_nmt_parsing() {
        let cli = Cli::try_parse_from(["canopentool", "nmt", "can0", "preop", "0x10"]).unwrap();
        match cli.command {
            Commands::Nmt(nmt) => {
                assert_eq!("can0", nmt.interface);
                assert_eq!(NmtAction::Preop, nmt.action);
                assert_eq!(16, nmt.node.unwrap().raw());
            }
            _ => panic!("wrong command"),
        }

        let cli = Cli::try_parse_from(["canopentool", "nmt", "can0", "reset-node"]).unwrap();
        match cli.command {
            Commands::Nmt(nmt) => assert_eq!(None, nmt.node),
            _ => panic!("wrong command"),
        }

        let cli = Cli::try_parse_from(["canopentool", "nmt", "can0", "stop", "all"]).unwrap();
        match cli.command {
            Commands::Nmt(nmt) => assert_eq!(0, nmt.node.unwrap().raw()),
            _ => panic!("wrong command"),
        }

        assert!(Cli::try_parse_from(["canopentool", "nmt", "can0", "stop", "128"]).is_err());
        assert!(Cli::try_parse_from(["canopentool", "nmt", "can0", "explode"]).is_err());
    }

    #[test]
    fn test_sdo_parsing() {
        let cli =
            Cli::try_parse_from(["canopentool", "sdo-upload", "can0", "2", "0x6040", "00"]).unwrap();
        match cli.command {
            Commands::SdoUpload(sdo) => {
                assert_eq!(2, sdo.node_id.raw());
                assert_eq!(0x6040, sdo.index);
                assert_eq!(0, sdo.sub);
            }
            _ => panic!("wrong command"),
        }

        let cli = Cli::try_parse_from([
            "canopentool",
            "sdo-download",
            "can0",
            "2",
            "0x6040",
            "0",
            "0x0F",
            "u16",
        ])
        .unwrap();
        match cli.command {
            Commands::SdoDownload(sdo) => {
                assert_eq!(0x0F, sdo.data);
                assert_eq!(Some(SdoDataType::U16), sdo.ty);
            }
            _ => panic!("wrong command"),
        }

        // Aliases work, the type is optional, node 0 is rejected for SDO
        assert!(
            Cli::try_parse_from(["canopentool", "sdo-read", "can0", "2", "0x6040", "0"]).is_ok()
        );
        assert!(Cli::try_parse_from([
            "canopentool",
            "sdo-write",
            "can0",
            "2",
            "0x6040",
            "0",
            "15"
        ])
        .is_ok());
        assert!(
            Cli::try_parse_from(["canopentool", "sdo-upload", "can0", "0", "0x6040", "0"]).is_err()
        );
        assert!(Cli::try_parse_from([
            "canopentool",
            "sdo-upload",
            "can0",
            "2",
            "0x10000",
            "0"
        ])
        .is_err());
        assert!(Cli::try_parse_from([
            "canopentool",
            "sdo-upload",
            "can0",
            "2",
            "0x6040",
            "0x100"
        ])
        .is_err());
    }
}
