//! Simple interface for sending NMT commands to a bus

use snafu::Snafu;

use canopentool_common::{
    messages::{NmtCommand, NmtCommandSpecifier},
    traits::AsyncCanSender,
};

/// The NMT target address which broadcasts to all nodes
pub const NMT_ANY_NODE: u8 = 0;

/// Error returned when an NMT command could not be transmitted
#[derive(Debug, Snafu)]
#[snafu(display("error sending NMT command"))]
pub struct NmtSendError;

/// Issues NMT state change commands
///
/// NMT is fire-and-forget: no response is awaited.
#[derive(Debug)]
pub struct NmtMaster<S> {
    sender: S,
}

impl<S: AsyncCanSender> NmtMaster<S> {
    /// Create a new NmtMaster
    pub fn new(sender: S) -> Self {
        Self { sender }
    }

    /// Send an NMT command
    ///
    /// # Arguments
    ///
    /// - `cs`: The state transition to command
    /// - `node`: The node ID to command, or [`NMT_ANY_NODE`] to broadcast
    pub async fn send(&mut self, cs: NmtCommandSpecifier, node: u8) -> Result<(), NmtSendError> {
        let message = NmtCommand { cs, node };
        self.sender
            .send(message.into())
            .await
            .map_err(|_| NmtSendError)?;
        Ok(())
    }
}
