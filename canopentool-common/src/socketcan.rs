use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::messages::{CanId, CanMessage};
use crate::traits::{AsyncCanReceiver, AsyncCanSender, CanSendError};
use snafu::{ResultExt, Snafu};

use socketcan::{CanError, CanFilter, CanFrame, CanSocket, EmbeddedFrame, Socket, SocketOptions};
use tokio::io::unix::AsyncFd;

fn embedded_id_to_can_id(id: socketcan::Id) -> CanId {
    match id {
        socketcan::Id::Standard(id) => CanId::std(id.as_raw()),
        socketcan::Id::Extended(id) => CanId::extended(id.as_raw()),
    }
}

fn can_id_to_embedded_id(id: CanId) -> socketcan::Id {
    match id {
        CanId::Extended(id) => socketcan::ExtendedId::new(id).unwrap().into(),
        CanId::Std(id) => socketcan::StandardId::new(id).unwrap().into(),
    }
}

fn socketcan_frame_to_message(frame: socketcan::CanFrame) -> Result<CanMessage, CanError> {
    let id = embedded_id_to_can_id(frame.id());

    match frame {
        CanFrame::Data(frame) => Ok(CanMessage::new(id, frame.data())),
        CanFrame::Remote(_) => Ok(CanMessage::new(id, &[])),
        CanFrame::Error(frame) => Err(frame.into_error()),
    }
}

fn message_to_socketcan_frame(msg: &CanMessage) -> socketcan::CanFrame {
    let id = can_id_to_embedded_id(msg.id());
    socketcan::CanFrame::new(id, msg.data()).unwrap()
}

// Not exposed by the libc crate; value is from Linux's asm-generic/sockios.h.
const SIOCGSTAMP: libc::c_ulong = 0x8906;

/// Read the kernel reception timestamp of the last frame read from the socket
///
/// The kernel stamps frames on arrival, so this reflects when the frame hit
/// the interface rather than when the application got around to reading it.
fn frame_timestamp(fd: RawFd) -> io::Result<SystemTime> {
    let mut tv = libc::timeval {
        tv_sec: 0,
        tv_usec: 0,
    };
    // SAFETY: SIOCGSTAMP writes one struct timeval behind the passed pointer
    let rc = unsafe { libc::ioctl(fd, SIOCGSTAMP, &mut tv) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(UNIX_EPOCH + Duration::new(tv.tv_sec as u64, tv.tv_usec as u32 * 1_000))
}

/// Map a purely numeric interface argument to a kernel interface name
///
/// Interface "3" means the third CAN interface, i.e. "can2". Anything
/// non-numeric is passed through untouched.
pub fn resolve_interface_name(name: &str) -> String {
    if !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit()) {
        let ordinal: u64 = name.parse().unwrap_or(0);
        format!("can{}", ordinal.saturating_sub(1))
    } else {
        name.to_string()
    }
}

/// Error opening a CAN interface
#[derive(Debug, Snafu)]
pub enum OpenError {
    /// The socket could not be created or bound to the interface
    #[snafu(display("failed to open CAN interface {interface}: {source}"))]
    Open {
        /// The resolved interface name
        interface: String,
        /// The underlying OS error
        source: io::Error,
    },
    /// The socket was opened but could not be configured
    #[snafu(display("failed to configure CAN interface {interface}: {source}"))]
    Configure {
        /// The resolved interface name
        interface: String,
        /// The underlying OS error
        source: io::Error,
    },
}

/// Error receiving from a CAN socket
#[derive(Debug, Snafu)]
pub enum ReceiveError {
    /// An I/O error on the socket
    #[snafu(display("error reading from CAN socket: {source}"))]
    Io {
        /// The underlying OS error
        source: io::Error,
    },
    /// An error frame was delivered by the bus
    #[snafu(display("CAN error frame received: {source}"))]
    Can {
        /// The decoded bus error
        source: CanError,
    },
}

/// A socketcan-based CAN message receiver
///
/// Multiple receivers can share the same underlying socket through the Arc.
#[derive(Debug, Clone)]
pub struct SocketCanReceiver {
    socket: Arc<AsyncFd<CanSocket>>,
}

impl SocketCanReceiver {
    /// Receive the next frame along with its kernel reception timestamp
    pub async fn recv_timestamped(&mut self) -> Result<(CanMessage, SystemTime), ReceiveError> {
        loop {
            let mut guard = self.socket.readable().await.context(IoSnafu)?;
            match guard.try_io(|inner| inner.get_ref().read_frame()) {
                Ok(Ok(frame)) => {
                    let timestamp = frame_timestamp(self.socket.get_ref().as_raw_fd())
                        .context(IoSnafu)?;
                    let msg = socketcan_frame_to_message(frame).context(CanSnafu)?;
                    return Ok((msg, timestamp));
                }
                Ok(Err(e)) => return Err(e).context(IoSnafu),
                Err(_would_block) => continue,
            }
        }
    }
}

impl AsyncCanReceiver for SocketCanReceiver {
    type Error = ReceiveError;

    async fn recv(&mut self) -> Result<CanMessage, ReceiveError> {
        let (msg, _) = self.recv_timestamped().await?;
        Ok(msg)
    }
}

/// A socketcan-based CAN message sender
///
/// Multiple senders can share the same underlying socket through the Arc.
#[derive(Debug, Clone)]
pub struct SocketCanSender {
    socket: Arc<AsyncFd<CanSocket>>,
}

impl AsyncCanSender for SocketCanSender {
    async fn send(&mut self, msg: CanMessage) -> Result<(), CanSendError> {
        let frame = message_to_socketcan_frame(&msg);
        loop {
            let mut guard = match self.socket.writable().await {
                Ok(guard) => guard,
                Err(_) => return Err(CanSendError(msg)),
            };
            match guard.try_io(|inner| inner.get_ref().write_frame(&frame)) {
                Ok(Ok(())) => return Ok(()),
                Ok(Err(_)) => return Err(CanSendError(msg)),
                Err(_would_block) => continue,
            }
        }
    }
}

/// Open a socketcan device and split it into a sender and receiver object
///
/// # Arguments
/// * `device` - The name of the socketcan device to open, e.g. "vcan0" or
///   "can0". A purely numeric name selects the Nth CAN interface.
/// * `filters` - Optional receive filters to install on the socket.
///
/// The receiver does not see frames written through the sender, since both
/// halves share one socket and the kernel does not loop a socket's own
/// transmissions back to it.
///
/// Must be called from within a tokio runtime.
pub fn open_socketcan<S: AsRef<str>>(
    device: S,
    filters: Option<&[CanFilter]>,
) -> Result<(SocketCanSender, SocketCanReceiver), OpenError> {
    let interface = resolve_interface_name(device.as_ref());
    let socket = CanSocket::open(&interface).with_context(|_| OpenSnafu {
        interface: interface.clone(),
    })?;
    if let Some(filters) = filters {
        socket.set_filters(filters).with_context(|_| ConfigureSnafu {
            interface: interface.clone(),
        })?;
    }
    socket
        .set_nonblocking(true)
        .with_context(|_| ConfigureSnafu {
            interface: interface.clone(),
        })?;
    let socket = Arc::new(AsyncFd::new(socket).with_context(|_| ConfigureSnafu {
        interface: interface.clone(),
    })?);
    let receiver = SocketCanReceiver {
        socket: socket.clone(),
    };
    let sender = SocketCanSender { socket };
    Ok((sender, receiver))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_interface_names_are_rewritten() {
        assert_eq!("can0", resolve_interface_name("1"));
        assert_eq!("can2", resolve_interface_name("3"));
        assert_eq!("can0", resolve_interface_name("can0"));
        assert_eq!("vcan1", resolve_interface_name("vcan1"));
        assert_eq!("", resolve_interface_name(""));
    }
}
