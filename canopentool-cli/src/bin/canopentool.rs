//! The canopentool binary
//!
//! Dispatches to NMT, SDO, or the heartbeat monitor based on the subcommand
//! or the basename of the invoking link, and maps every outcome to an exit
//! code: 0 on success, non-zero on any reported failure.

use std::env;
use std::io::Write;
use std::process::ExitCode;

use clap::{CommandFactory, Parser};
use snafu::{ResultExt, Snafu};

use canopentool_cli::command::{self, Cli, Commands};
use canopentool_cli::{monitor_ui, permissions};
use canopentool_client::common::sdo::{AbortCode, SdoValueType};
use canopentool_client::common::{open_socketcan, OpenError};
use canopentool_client::{
    sdo_response_filter, NmtMaster, NmtSendError, SdoClient, SdoClientError, UploadData,
    NMT_ANY_NODE,
};

#[derive(Debug, Snafu)]
enum CliError {
    #[snafu(transparent)]
    Permission {
        source: permissions::PermissionError,
    },
    #[snafu(transparent)]
    Transport { source: OpenError },
    #[snafu(transparent)]
    Nmt { source: NmtSendError },
    #[snafu(transparent)]
    Sdo { source: SdoClientError },
    #[snafu(transparent)]
    Monitor { source: monitor_ui::MonitorUiError },
    #[snafu(display("failed writing to stdout: {source}"))]
    Stdout { source: std::io::Error },
    #[snafu(display("interrupted"))]
    Interrupted,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    env_logger::init();

    let args = command::effective_args(env::args_os().collect());
    if args.len() == 1 {
        Cli::command().print_help().ok();
        return ExitCode::SUCCESS;
    }
    let cli = Cli::parse_from(args);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Nmt(args) => {
            permissions::ensure_may_change_state()?;
            let (sender, _receiver) = open_socketcan(&args.interface, None)?;
            let mut nmt = NmtMaster::new(sender);
            let node = args.node.map(|n| n.raw()).unwrap_or(NMT_ANY_NODE);
            nmt.send(args.action.into(), node).await?;
        }
        Commands::SdoUpload(args) => {
            let filters = [sdo_response_filter(args.node_id)];
            let (sender, receiver) = open_socketcan(&args.interface, Some(&filters))?;
            let mut client = SdoClient::new_std(args.node_id, sender, receiver);

            let outcome = tokio::select! {
                outcome = client.upload(args.index, args.sub) => Some(outcome),
                _ = tokio::signal::ctrl_c() => None,
            };
            match outcome {
                Some(outcome) => print_upload(&outcome?).context(StdoutSnafu)?,
                None => {
                    // Cancelled mid-transaction: abort so the server does not
                    // stall waiting for the next request
                    client
                        .abort(args.index, args.sub, AbortCode::GeneralError)
                        .await
                        .ok();
                    return InterruptedSnafu.fail();
                }
            }
        }
        Commands::SdoDownload(args) => {
            permissions::ensure_may_change_state()?;
            let filters = [sdo_response_filter(args.node_id)];
            let (sender, receiver) = open_socketcan(&args.interface, Some(&filters))?;
            let mut client = SdoClient::new_std(args.node_id, sender, receiver);
            let ty = args
                .ty
                .map(SdoValueType::from)
                .unwrap_or(SdoValueType::Unspecified);

            let outcome = tokio::select! {
                outcome = client.download(args.index, args.sub, args.data, ty) => Some(outcome),
                _ = tokio::signal::ctrl_c() => None,
            };
            match outcome {
                Some(outcome) => outcome?,
                None => {
                    client
                        .abort(args.index, args.sub, AbortCode::GeneralError)
                        .await
                        .ok();
                    return InterruptedSnafu.fail();
                }
            }
        }
        Commands::Monitor(args) => monitor_ui::run(&args.interface).await?,
    }
    Ok(())
}

/// Print an upload payload to stdout with a single trailing newline
///
/// Expedited responses are scalars and print as hex; segmented responses are
/// raw byte streams and print as-is.
fn print_upload(data: &UploadData) -> std::io::Result<()> {
    match data {
        UploadData::Expedited(bytes) => {
            let mut value: u32 = 0;
            for (i, byte) in bytes.iter().enumerate() {
                value |= (*byte as u32) << (8 * i);
            }
            println!("0x{value:X}");
        }
        UploadData::Segmented(bytes) => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(bytes)?;
            stdout.write_all(b"\n")?;
            stdout.flush()?;
        }
    }
    Ok(())
}
