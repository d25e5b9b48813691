use std::time::Duration;

use snafu::Snafu;

use canopentool_common::{
    messages::{CanId, SDO_REQ_BASE, SDO_RESP_BASE},
    sdo::{AbortCode, SdoRequest, SdoResponse, SdoValueType},
    traits::{AsyncCanReceiver, AsyncCanSender},
    CanFilter, NodeId,
};

/// Budget for each wait on a server response
const RESPONSE_TIMEOUT: Duration = Duration::from_millis(200);

/// A wrapper around the AbortCode enum to allow for unknown values
///
/// Although the library should "know" all the abort codes, it is possible to
/// receive other values and this allows those to be captured and exposed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawAbortCode {
    /// A recognized abort code
    Valid(AbortCode),
    /// An unrecognized abort code
    Unknown(u32),
}

impl RawAbortCode {
    /// The raw 32-bit code
    pub fn code(&self) -> u32 {
        match self {
            RawAbortCode::Valid(code) => *code as u32,
            RawAbortCode::Unknown(code) => *code,
        }
    }

    /// The operator-facing description of the code
    pub fn description(&self) -> &'static str {
        match self {
            RawAbortCode::Valid(code) => code.description(),
            RawAbortCode::Unknown(_) => "Unknown",
        }
    }
}

impl std::fmt::Display for RawAbortCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:08X} ({})", self.code(), self.description())
    }
}

impl From<u32> for RawAbortCode {
    fn from(value: u32) -> Self {
        match AbortCode::try_from(value) {
            Ok(code) => Self::Valid(code),
            Err(_) => Self::Unknown(value),
        }
    }
}

/// Error returned by [`SdoClient`] methods
///
/// The non-transport variants are the terminal states of a transaction:
/// server abort, protocol timeout, or a response from the wrong phase.
#[derive(Clone, Debug, PartialEq, Snafu)]
pub enum SdoClientError {
    /// No matching server frame arrived within the response budget
    #[snafu(display("SDO timeout"))]
    Timeout,
    /// Received a response on the reply ID that could not be interpreted
    #[snafu(display("malformed SDO response"))]
    MalformedResponse,
    /// Received a valid response, but from the wrong protocol phase
    #[snafu(display("unexpected SDO response while awaiting {expecting}"))]
    WrongPhase {
        /// The type of response which was expected
        expecting: &'static str,
    },
    /// Received an abort from the node
    #[snafu(display("SDO error {abort_code}"))]
    ServerAbort {
        /// Index of the SDO access which was aborted
        index: u16,
        /// Sub index of the SDO access which was aborted
        sub: u8,
        /// Reason for the abort
        abort_code: RawAbortCode,
    },
    /// Failed to write a message to the socket
    #[snafu(display("error sending CAN message"))]
    SocketSendFailed,
    /// The socket failed while awaiting a response
    #[snafu(display("error reading from CAN socket"))]
    SocketReceiveFailed,
}

type Result<T> = std::result::Result<T, SdoClientError>;

/// The payload of a completed SDO upload
///
/// Expedited and segmented transfers are presented differently to the
/// operator: expedited responses carry a little-endian scalar, segmented
/// responses an arbitrary byte stream.
#[derive(Clone, Debug, PartialEq)]
pub enum UploadData {
    /// 1 to 4 value bytes from an expedited response, LSB first
    Expedited(Vec<u8>),
    /// The reassembled byte stream of a segmented transfer
    Segmented(Vec<u8>),
}

impl UploadData {
    /// The payload bytes, regardless of transfer mode
    pub fn bytes(&self) -> &[u8] {
        match self {
            UploadData::Expedited(bytes) => bytes,
            UploadData::Segmented(bytes) => bytes,
        }
    }
}

/// Build a receive filter matching the SDO reply ID for a node
///
/// Passing this to `open_socketcan` keeps unrelated bus traffic out of the
/// client's receive queue.
pub fn sdo_response_filter(node: NodeId) -> CanFilter {
    CanFilter::new(SDO_RESP_BASE as u32 + node.raw() as u32, 0x7FF)
}

/// Convenience macro for expecting a particular variant of a response and
/// erroring on abort or unexpected variant
macro_rules! match_response {
    ($resp: ident, $expecting: literal, $($match:pat => $code : expr),*) => {
        match $resp {
            $($match => $code),*
            SdoResponse::Abort {
                index,
                sub,
                abort_code,
            } => {
                return ServerAbortSnafu {
                    index,
                    sub,
                    abort_code,
                }
                .fail()
            }
            _ => {
                return WrongPhaseSnafu {
                    expecting: $expecting,
                }
                .fail()
            }
        }
    };
}

#[derive(Debug)]
/// A client for accessing a node's SDO server
///
/// A single transaction is in flight at a time: requests go out on
/// `0x600 + node`, and replies are matched on `0x580 + node`.
pub struct SdoClient<S, R> {
    req_cob_id: CanId,
    resp_cob_id: CanId,
    sender: S,
    receiver: R,
}

impl<S: AsyncCanSender, R: AsyncCanReceiver> SdoClient<S, R> {
    /// Create a new SdoClient for a node's default SDO server
    pub fn new_std(node: NodeId, sender: S, receiver: R) -> Self {
        Self {
            req_cob_id: CanId::Std(SDO_REQ_BASE + node.raw() as u16),
            resp_cob_id: CanId::Std(SDO_RESP_BASE + node.raw() as u16),
            sender,
            receiver,
        }
    }

    /// Write a scalar value to a sub-object on the SDO server
    ///
    /// This is always an expedited transfer; `ty` selects how many of the
    /// four data bytes carry the value and whether the size is indicated.
    pub async fn download(
        &mut self,
        index: u16,
        sub: u8,
        value: u32,
        ty: SdoValueType,
    ) -> Result<()> {
        let msg =
            SdoRequest::expedited_download(index, sub, value, ty).to_can_message(self.req_cob_id);
        self.sender
            .send(msg)
            .await
            .map_err(|_| SocketSendFailedSnafu.build())?;

        let resp = self.wait_for_matching_response(index, sub).await?;
        if let SdoResponse::ConfirmDownloadSegment { .. } = resp {
            // The server believes a segmented download is in progress. Abort
            // rather than leaving it waiting for segments.
            self.send_abort(index, sub, AbortCode::GeneralError).await.ok();
            return WrongPhaseSnafu {
                expecting: "ConfirmDownload",
            }
            .fail();
        }
        match_response!(
            resp,
            "ConfirmDownload",
            SdoResponse::ConfirmDownload { .. } => {
                Ok(())
            }
        )
    }

    /// Read a sub-object from the SDO server
    ///
    /// Handles both expedited and segmented server responses.
    pub async fn upload(&mut self, index: u16, sub: u8) -> Result<UploadData> {
        let msg = SdoRequest::initiate_upload(index, sub).to_can_message(self.req_cob_id);
        self.sender
            .send(msg)
            .await
            .map_err(|_| SocketSendFailedSnafu.build())?;

        let resp = self.wait_for_matching_response(index, sub).await?;

        let mut read_buf = Vec::new();
        let expedited = match_response!(
            resp,
            "ConfirmUpload",
            SdoResponse::ConfirmUpload { n, e, s, data, .. } => {
                if e {
                    // With the size bit clear, all four bytes are data
                    let len = if s { 4 - n as usize } else { 4 };
                    read_buf.extend_from_slice(&data[0..len]);
                }
                e
            }
        );

        if expedited {
            return Ok(UploadData::Expedited(read_buf));
        }

        // Segmented: request segments until the server signals completion.
        // The next toggle always complements the one the server reported.
        let mut toggle = false;
        loop {
            let msg = SdoRequest::upload_segment_request(toggle).to_can_message(self.req_cob_id);
            self.sender
                .send(msg)
                .await
                .map_err(|_| SocketSendFailedSnafu.build())?;

            let resp = self.wait_for_matching_response(index, sub).await?;
            match_response!(
                resp,
                "UploadSegment",
                SdoResponse::UploadSegment { t, n, c, data } => {
                    read_buf.extend_from_slice(&data[0..7 - n as usize]);
                    if c {
                        break;
                    }
                    toggle = !t;
                }
            );
        }
        Ok(UploadData::Segmented(read_buf))
    }

    /// Abort the transaction identified by (index, sub)
    ///
    /// Used by callers that cancel an in-flight transfer, so the server does
    /// not stall waiting for the next request.
    pub async fn abort(&mut self, index: u16, sub: u8, code: AbortCode) -> Result<()> {
        self.send_abort(index, sub, code).await
    }

    async fn send_abort(&mut self, index: u16, sub: u8, code: AbortCode) -> Result<()> {
        let msg = SdoRequest::abort(index, sub, code).to_can_message(self.req_cob_id);
        self.sender
            .send(msg)
            .await
            .map_err(|_| SocketSendFailedSnafu.build())
    }

    /// Wait for the next response belonging to this transaction
    ///
    /// Frames with the wrong ID or DLC, and responses echoing a different
    /// object, are discarded without refreshing the time budget. A timeout
    /// aborts the transaction on the wire before reporting.
    async fn wait_for_matching_response(&mut self, index: u16, sub: u8) -> Result<SdoResponse> {
        let wait_until = tokio::time::Instant::now() + RESPONSE_TIMEOUT;
        loop {
            match tokio::time::timeout_at(wait_until, self.receiver.recv()).await {
                // Err indicates the timeout elapsed
                Err(_) => {
                    self.send_abort(index, sub, AbortCode::SdoTimeout).await.ok();
                    return TimeoutSnafu.fail();
                }
                Ok(Ok(msg)) => {
                    if msg.id() != self.resp_cob_id || msg.dlc != 8 {
                        continue;
                    }
                    let resp: SdoResponse = match msg.try_into() {
                        Ok(resp) => resp,
                        Err(_) => return MalformedResponseSnafu.fail(),
                    };
                    if response_matches(&resp, index, sub) {
                        return Ok(resp);
                    }
                }
                // Recv returned an error
                Ok(Err(e)) => {
                    log::error!("Error reading from socket: {e:?}");
                    return SocketReceiveFailedSnafu.fail();
                }
            }
        }
    }
}

/// Check whether a response belongs to the transaction on (index, sub)
///
/// Segment responses carry no object address and always match.
fn response_matches(resp: &SdoResponse, index: u16, sub: u8) -> bool {
    match resp {
        SdoResponse::ConfirmUpload {
            index: i, sub: s, ..
        }
        | SdoResponse::ConfirmDownload { index: i, sub: s }
        | SdoResponse::Abort {
            index: i, sub: s, ..
        } => (*i, *s) == (index, sub),
        SdoResponse::UploadSegment { .. } | SdoResponse::ConfirmDownloadSegment { .. } => true,
    }
}
