//! Common traits

use crate::messages::CanMessage;

/// Error returned when a message could not be sent
///
/// Carries the message back to the caller.
#[derive(Clone, Copy, Debug)]
pub struct CanSendError(pub CanMessage);

/// An async CAN sender trait
pub trait AsyncCanSender: Send {
    /// Send a message to the bus
    fn send(
        &mut self,
        msg: CanMessage,
    ) -> impl core::future::Future<Output = Result<(), CanSendError>>;
}

/// An async CAN receiver trait
pub trait AsyncCanReceiver: Send {
    /// The error type returned by recv
    type Error: core::fmt::Debug + Send;

    /// Receive the next message from the bus
    ///
    /// Blocks until a message arrives; callers bound the wait externally
    /// (with a timeout or a select).
    fn recv(
        &mut self,
    ) -> impl core::future::Future<Output = Result<CanMessage, Self::Error>> + Send;
}
