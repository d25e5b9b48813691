//! Common SDO implementation
//!
//! Defines messages, command-byte layout, and abort codes for the SDO
//! protocol. Only the services used by an SDO client are covered: expedited
//! download, expedited and segmented upload, and abort. Block transfers are
//! not supported.
use int_enum::IntEnum;

use crate::messages::{CanId, CanMessage};

/// Specifies the possible server command specifier (SCS) values in SDO response packets
enum ServerCommand {
    SegmentUpload = 0,
    SegmentDownload = 1,
    Upload = 2,
    Download = 3,
    Abort = 4,
}

impl TryFrom<u8> for ServerCommand {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use ServerCommand::*;
        match value {
            0 => Ok(SegmentUpload),
            1 => Ok(SegmentDownload),
            2 => Ok(Upload),
            3 => Ok(Download),
            4 => Ok(Abort),
            _ => Err(()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
#[repr(u8)]
enum ClientCommand {
    InitiateDownload = 1,
    InitiateUpload = 2,
    ReqUploadSegment = 3,
    Abort = 4,
}

impl TryFrom<u8> for ClientCommand {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use ClientCommand::*;
        match value {
            1 => Ok(InitiateDownload),
            2 => Ok(InitiateUpload),
            3 => Ok(ReqUploadSegment),
            4 => Ok(Abort),
            _ => Err(()),
        }
    }
}

/// SDO Abort Code
///
/// Defines the various reasons an SDO transfer can be aborted
#[derive(Clone, Copy, Debug, PartialEq, IntEnum)]
#[repr(u32)]
pub enum AbortCode {
    /// Toggle bit not alternated
    ToggleNotAlternated = 0x0503_0000,
    /// SDO protocol timed out
    SdoTimeout = 0x0504_0000,
    /// Client/server command specifier not valid or unknown
    InvalidCommandSpecifier = 0x0504_0001,
    /// Invalid block size (block mode only)
    InvalidBlockSize = 0x0504_0002,
    /// Invalid sequence number (block mode only)
    InvalidSequenceNumber = 0x0504_0003,
    /// CRC Error (block mode only)
    CrcError = 0x0504_0004,
    /// Out of memory
    OutOfMemory = 0x0504_0005,
    /// Unsupported access to an object
    UnsupportedAccess = 0x0601_0000,
    /// Attempt to read a write only object
    WriteOnly = 0x0601_0001,
    /// Attempt to write a read only object
    ReadOnly = 0x0601_0002,
    /// Object does not exist in the dictionary
    NoSuchObject = 0x0602_0000,
    /// Object cannot be mapped to the PDO
    UnallowedPdo = 0x0604_0041,
    /// The number and length of objects would exceed PDO length
    PdoTooLong = 0x0604_0042,
    /// General parameter incompatibility
    IncompatibleParameter = 0x0604_0043,
    /// General internal incompatibility in the device
    InternalIncompatibility = 0x0604_0047,
    /// Access failed due to hardware error
    HardwareError = 0x0606_0000,
    /// Data type does not match, length of service parameter does not match
    DataTypeMismatch = 0x0607_0010,
    /// Data type does not match, length of service parameter too high
    DataTypeMismatchLengthHigh = 0x0607_0012,
    /// Data type does not match, length of service parameter too low
    DataTypeMismatchLengthLow = 0x0607_0013,
    /// Sub-index does not exist
    NoSuchSubIndex = 0x0609_0011,
    /// Invalid value for parameter (download only)
    InvalidValue = 0x0609_0030,
    /// Value of parameter too high (download only)
    ValueTooHigh = 0x0609_0031,
    /// Value of parameter too low (download only)
    ValueTooLow = 0x0609_0032,
    /// Maximum value is less than minimum value
    MaxLessThanMin = 0x0609_0036,
    /// Resource isn't available
    ResourceNotAvailable = 0x060A_0023,
    /// General error
    GeneralError = 0x0800_0000,
    /// Data cannot be transferred or stored to the application
    CantStore = 0x0800_0020,
    /// Data cannot be transferred or stored to the application because of local control
    CantStoreLocalControl = 0x0800_0021,
    /// Data cannot be transferred or stored to the application because of the device state
    CantStoreDeviceState = 0x0800_0022,
    /// No object dictionary is present
    NoObjectDict = 0x0800_0023,
    /// No data available
    NoData = 0x0800_0024,
}

impl AbortCode {
    /// The operator-facing description for this abort code
    pub fn description(&self) -> &'static str {
        use AbortCode::*;
        match self {
            ToggleNotAlternated => "Toggle bit not alternated.",
            SdoTimeout => "SDO protocol timed out.",
            InvalidCommandSpecifier => "Client/server command specifier not valid or unknown.",
            InvalidBlockSize => "Invalid block size (block mode only).",
            InvalidSequenceNumber => "Invalid sequence number (block mode only).",
            CrcError => "CRC error (block mode only).",
            OutOfMemory => "Out of memory.",
            UnsupportedAccess => "Unsupported access to an object.",
            WriteOnly => "Attempt to read a write only object.",
            ReadOnly => "Attempt to write a read only object.",
            NoSuchObject => "Object does not exist in the object dictionary.",
            UnallowedPdo => "Object cannot be mapped to the PDO.",
            PdoTooLong => {
                "The number and length of the objects to be mapped would exceed PDO length."
            }
            IncompatibleParameter => "General parameter incompatibility reason.",
            InternalIncompatibility => "General internal incompatibility in the device.",
            HardwareError => "Access failed due to an hardware error.",
            DataTypeMismatch => {
                "Data type does not match, length of service parameter does not match"
            }
            DataTypeMismatchLengthHigh => {
                "Data type does not match, length of service parameter too high"
            }
            DataTypeMismatchLengthLow => {
                "Data type does not match, length of service parameter too low"
            }
            NoSuchSubIndex => "Sub-index does not exist.",
            InvalidValue => "Invalid value for parameter (download only).",
            ValueTooHigh => "Value of parameter written too high (download only).",
            ValueTooLow => "Value of parameter written too low (download only).",
            MaxLessThanMin => "Maximum value is less than minimum value.",
            ResourceNotAvailable => "Resource not available: SDO connection",
            GeneralError => "General error",
            CantStore => "Data cannot be transferred or stored to the application.",
            CantStoreLocalControl => {
                "Data cannot be transferred or stored to the application because of local control."
            }
            CantStoreDeviceState => {
                "Data cannot be transferred or stored to the application because of the present \
                 device state."
            }
            NoObjectDict => {
                "Object dictionary dynamic generation fails or no object dictionary is present \
                 (e.g. object dictionary is generated from file and generation fails because of \
                 an file error)."
            }
            NoData => "No data available",
        }
    }
}

/// The scalar type of an expedited download value
///
/// Selects how many of the four data bytes carry the value, and with it the
/// n/e/s bits of the initiate frame. `Unspecified` sends all four data bytes
/// without indicating a size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum SdoValueType {
    U8,
    I8,
    U16,
    I16,
    U24,
    I24,
    U32,
    I32,
    Unspecified,
}

impl SdoValueType {
    /// The number of value bytes in the expedited payload, or None when the
    /// size is not indicated
    pub fn size(&self) -> Option<usize> {
        use SdoValueType::*;
        match self {
            U8 | I8 => Some(1),
            U16 | I16 => Some(2),
            U24 | I24 => Some(3),
            U32 | I32 => Some(4),
            Unspecified => None,
        }
    }
}

/// An SDO Request
///
/// This represents the request messages which can be sent from client to server
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SdoRequest {
    /// Begin an expedited download, writing data to an object on the server
    InitiateDownload {
        /// Number of unused bytes in data
        n: u8,
        /// Expedited
        e: bool,
        /// size valid
        s: bool,
        /// Object index
        index: u16,
        /// Object sub-index
        sub: u8,
        /// data (value on expedited, size when e=0 and s=1)
        data: [u8; 4],
    },
    /// Begin an upload of data from an object on the server
    InitiateUpload {
        /// The requested object index
        index: u16,
        /// The requested sub object
        sub: u8,
    },
    /// Request the next segment in an upload
    ReqUploadSegment {
        /// Toggle flag
        t: bool,
    },
    /// Sent by client to abort an ongoing transaction
    Abort {
        /// The object index of the active transaction
        index: u16,
        /// The sub object of the active transaction
        sub: u8,
        /// The abort reason
        abort_code: u32,
    },
}

impl SdoRequest {
    /// Create an abort message
    pub fn abort(index: u16, sub: u8, abort_code: AbortCode) -> Self {
        SdoRequest::Abort {
            index,
            sub,
            abort_code: abort_code as u32,
        }
    }

    /// Create an expedited download message
    ///
    /// The value is encoded LSB-first into the data bytes selected by `ty`;
    /// the remaining bytes stay zero.
    pub fn expedited_download(index: u16, sub: u8, value: u32, ty: SdoValueType) -> Self {
        let mut data = [0u8; 4];
        match ty.size() {
            Some(size) => {
                data[..size].copy_from_slice(&value.to_le_bytes()[..size]);
                SdoRequest::InitiateDownload {
                    n: (4 - size) as u8,
                    e: true,
                    s: true,
                    index,
                    sub,
                    data,
                }
            }
            None => SdoRequest::InitiateDownload {
                n: 0,
                e: true,
                s: false,
                index,
                sub,
                data: value.to_le_bytes(),
            },
        }
    }

    /// Create an `InitiateUpload` request
    pub fn initiate_upload(index: u16, sub: u8) -> Self {
        SdoRequest::InitiateUpload { index, sub }
    }

    /// Create a `ReqUploadSegment` request
    pub fn upload_segment_request(toggle: bool) -> Self {
        SdoRequest::ReqUploadSegment { t: toggle }
    }

    /// Convert the request to message payload bytes
    pub fn to_bytes(self) -> [u8; 8] {
        let mut payload = [0; 8];

        match self {
            SdoRequest::InitiateDownload {
                n,
                e,
                s,
                index,
                sub,
                data,
            } => {
                payload[0] = ((ClientCommand::InitiateDownload as u8) << 5)
                    | ((n & 0x3) << 2)
                    | ((e as u8) << 1)
                    | s as u8;
                payload[1] = (index & 0xff) as u8;
                payload[2] = (index >> 8) as u8;
                payload[3] = sub;
                payload[4..8].copy_from_slice(&data);
            }
            SdoRequest::InitiateUpload { index, sub } => {
                payload[0] = (ClientCommand::InitiateUpload as u8) << 5;
                payload[1] = (index & 0xff) as u8;
                payload[2] = (index >> 8) as u8;
                payload[3] = sub;
            }
            SdoRequest::ReqUploadSegment { t } => {
                payload[0] = ((ClientCommand::ReqUploadSegment as u8) << 5) | ((t as u8) << 4);
            }
            SdoRequest::Abort {
                index,
                sub,
                abort_code,
            } => {
                payload[0] = (ClientCommand::Abort as u8) << 5;
                payload[1] = (index & 0xff) as u8;
                payload[2] = (index >> 8) as u8;
                payload[3] = sub;
                payload[4..8].copy_from_slice(&abort_code.to_le_bytes());
            }
        }
        payload
    }

    /// Convert the request to a CanMessage using the provided COB ID
    pub fn to_can_message(self, id: CanId) -> CanMessage {
        let payload = self.to_bytes();
        CanMessage::new(id, &payload)
    }
}

impl TryFrom<&[u8]> for SdoRequest {
    type Error = AbortCode;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        if value.len() < 8 {
            return Err(AbortCode::DataTypeMismatchLengthLow);
        }
        let ccs = value[0] >> 5;
        let ccs: ClientCommand = match ccs.try_into() {
            Ok(ccs) => ccs,
            Err(_) => return Err(AbortCode::InvalidCommandSpecifier),
        };

        match ccs {
            ClientCommand::InitiateDownload => {
                let n = (value[0] >> 2) & 0x3;
                let e = (value[0] & (1 << 1)) != 0;
                let s = (value[0] & (1 << 0)) != 0;
                let index = value[1] as u16 | ((value[2] as u16) << 8);
                let sub = value[3];
                let data = value[4..8].try_into().unwrap();
                Ok(SdoRequest::InitiateDownload {
                    n,
                    e,
                    s,
                    index,
                    sub,
                    data,
                })
            }
            ClientCommand::InitiateUpload => {
                let index = value[1] as u16 | ((value[2] as u16) << 8);
                let sub = value[3];
                Ok(SdoRequest::InitiateUpload { index, sub })
            }
            ClientCommand::ReqUploadSegment => {
                let t = ((value[0] >> 4) & 1) != 0;
                Ok(SdoRequest::ReqUploadSegment { t })
            }
            ClientCommand::Abort => {
                let index = value[1] as u16 | ((value[2] as u16) << 8);
                let sub = value[3];
                let abort_code = u32::from_le_bytes(value[4..8].try_into().unwrap());
                Ok(SdoRequest::Abort {
                    index,
                    sub,
                    abort_code,
                })
            }
        }
    }
}

/// Represents a response from SDO server to client
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum SdoResponse {
    /// Response to an [`SdoRequest::InitiateUpload`]
    ConfirmUpload {
        /// Number of unused bytes in data
        n: u8,
        /// Expedited flag
        e: bool,
        /// size flag
        s: bool,
        /// The index of the object being uploaded
        index: u16,
        /// The sub object being uploaded
        sub: u8,
        /// Value if e=1, or size if s=1
        data: [u8; 4],
    },
    /// Send an upload segment
    UploadSegment {
        /// The toggle bit
        t: bool,
        /// The number of unused bytes in data
        n: u8,
        /// Flag indicating this is the final segment
        c: bool,
        /// object data
        data: [u8; 7],
    },
    /// Response to a [`SdoRequest::InitiateDownload`]
    ConfirmDownload {
        /// The index of the object to be written to
        index: u16,
        /// The sub object to be written to
        sub: u8,
    },
    /// Acknowledgement for a download segment
    ///
    /// This client never sends download segments, so receiving one means the
    /// server is in a different phase than the client.
    ConfirmDownloadSegment {
        /// Toggle flag
        t: bool,
    },
    /// Sent by server to abort an ongoing transaction
    Abort {
        /// Object index of the active transfer
        index: u16,
        /// Sub object of the active transfer
        sub: u8,
        /// Abort reason
        abort_code: u32,
    },
}

impl TryFrom<CanMessage> for SdoResponse {
    type Error = ();
    fn try_from(msg: CanMessage) -> Result<Self, Self::Error> {
        let scs = msg.data[0] >> 5;
        let command: ServerCommand = scs.try_into()?;
        match command {
            ServerCommand::SegmentUpload => {
                let t = (msg.data[0] & (1 << 4)) != 0;
                let n = (msg.data[0] >> 1) & 7;
                let c = (msg.data[0] & (1 << 0)) != 0;
                let data: [u8; 7] = msg.data[1..8].try_into().unwrap();

                Ok(SdoResponse::UploadSegment { t, n, c, data })
            }
            ServerCommand::SegmentDownload => {
                let t = (msg.data[0] & (1 << 4)) != 0;
                Ok(SdoResponse::ConfirmDownloadSegment { t })
            }
            ServerCommand::Upload => {
                let n = (msg.data[0] >> 2) & 0x3;
                let e = (msg.data[0] & (1 << 1)) != 0;
                let s = (msg.data[0] & (1 << 0)) != 0;
                let index = u16::from_le_bytes(msg.data[1..3].try_into().unwrap());
                let sub = msg.data[3];
                let data: [u8; 4] = msg.data[4..8].try_into().unwrap();
                Ok(SdoResponse::ConfirmUpload {
                    n,
                    e,
                    s,
                    index,
                    sub,
                    data,
                })
            }
            ServerCommand::Download => {
                let index = u16::from_le_bytes(msg.data[1..3].try_into().unwrap());
                let sub = msg.data[3];
                Ok(SdoResponse::ConfirmDownload { index, sub })
            }
            ServerCommand::Abort => {
                let index = u16::from_le_bytes(msg.data[1..3].try_into().unwrap());
                let sub = msg.data[3];
                let abort_code = u32::from_le_bytes(msg.data[4..8].try_into().unwrap());
                Ok(SdoResponse::Abort {
                    index,
                    sub,
                    abort_code,
                })
            }
        }
    }
}

impl SdoResponse {
    /// Create a `ConfirmUpload` response for an expedited upload
    pub fn expedited_upload(index: u16, sub: u8, data: &[u8]) -> SdoResponse {
        if data.is_empty() || data.len() > 4 {
            panic!("Expedited uploads carry 1 to 4 bytes");
        }

        let mut msg_data = [0; 4];
        msg_data[0..data.len()].copy_from_slice(data);

        SdoResponse::ConfirmUpload {
            index,
            sub,
            e: true,
            s: true,
            n: 4 - data.len() as u8,
            data: msg_data,
        }
    }

    /// Create a `ConfirmUpload` response for a segmented upload
    pub fn upload_acknowledge(index: u16, sub: u8, size: Option<u32>) -> SdoResponse {
        SdoResponse::ConfirmUpload {
            n: 0,
            e: false,
            s: size.is_some(),
            index,
            sub,
            data: size.unwrap_or(0).to_le_bytes(),
        }
    }

    /// Create an `UploadSegment` response
    pub fn upload_segment(t: bool, c: bool, data: &[u8]) -> SdoResponse {
        let n = (7 - data.len()) as u8;
        let mut buf = [0; 7];
        buf[0..data.len()].copy_from_slice(data);
        SdoResponse::UploadSegment { t, n, c, data: buf }
    }

    /// Create a `ConfirmDownload` response
    pub fn download_acknowledge(index: u16, sub: u8) -> SdoResponse {
        SdoResponse::ConfirmDownload { index, sub }
    }

    /// Create a `ConfirmDownloadSegment` response
    pub fn download_segment_acknowledge(t: bool) -> SdoResponse {
        SdoResponse::ConfirmDownloadSegment { t }
    }

    /// Create an abort response
    pub fn abort(index: u16, sub: u8, abort_code: AbortCode) -> SdoResponse {
        let abort_code = abort_code as u32;
        SdoResponse::Abort {
            index,
            sub,
            abort_code,
        }
    }

    /// Convert the response to a [CanMessage] using the provided COB ID
    pub fn to_can_message(self, id: CanId) -> CanMessage {
        let mut payload = [0; 8];

        match self {
            SdoResponse::ConfirmUpload {
                n,
                e,
                s,
                index,
                sub,
                data,
            } => {
                payload[0] = ((ServerCommand::Upload as u8) << 5)
                    | ((n & 0x3) << 2)
                    | ((e as u8) << 1)
                    | (s as u8);
                payload[1] = (index & 0xff) as u8;
                payload[2] = (index >> 8) as u8;
                payload[3] = sub;
                payload[4..8].copy_from_slice(&data);
            }
            SdoResponse::ConfirmDownload { index, sub } => {
                payload[0] = (ServerCommand::Download as u8) << 5;
                payload[1] = (index & 0xff) as u8;
                payload[2] = (index >> 8) as u8;
                payload[3] = sub;
            }
            SdoResponse::UploadSegment { t, n, c, data } => {
                payload[0] = ((ServerCommand::SegmentUpload as u8) << 5)
                    | ((t as u8) << 4)
                    | ((n & 0x7) << 1)
                    | c as u8;
                payload[1..8].copy_from_slice(&data);
            }
            SdoResponse::ConfirmDownloadSegment { t } => {
                payload[0] = ((ServerCommand::SegmentDownload as u8) << 5) | ((t as u8) << 4);
            }
            SdoResponse::Abort {
                index,
                sub,
                abort_code,
            } => {
                payload[0] = (ServerCommand::Abort as u8) << 5;
                payload[1] = (index & 0xff) as u8;
                payload[2] = (index >> 8) as u8;
                payload[3] = sub;
                payload[4..8].copy_from_slice(&abort_code.to_le_bytes());
            }
        }
        CanMessage::new(id, &payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expedited_download_encoding_per_type() {
        // cs=1, e=1, s=1, n = 4 - size
        let cases: [(SdoValueType, u8, usize); 8] = [
            (SdoValueType::U32, 0x23, 4),
            (SdoValueType::I32, 0x23, 4),
            (SdoValueType::U24, 0x27, 3),
            (SdoValueType::I24, 0x27, 3),
            (SdoValueType::U16, 0x2B, 2),
            (SdoValueType::I16, 0x2B, 2),
            (SdoValueType::U8, 0x2F, 1),
            (SdoValueType::I8, 0x2F, 1),
        ];
        for (ty, cmd, size) in cases {
            let bytes = SdoRequest::expedited_download(0x6040, 0, 0xAABBCCDD, ty).to_bytes();
            assert_eq!(cmd, bytes[0], "command byte for {ty:?}");
            assert_eq!([0x40, 0x60, 0x00], bytes[1..4], "object for {ty:?}");
            let mut expected = [0u8; 4];
            expected[..size].copy_from_slice(&0xAABBCCDDu32.to_le_bytes()[..size]);
            assert_eq!(expected, bytes[4..8], "data for {ty:?}");
        }

        // Unspecified indicates no size: e=1, s=0, n=0, all four bytes sent
        let bytes =
            SdoRequest::expedited_download(0x6040, 0, 0xAABBCCDD, SdoValueType::Unspecified)
                .to_bytes();
        assert_eq!(0x22, bytes[0]);
        assert_eq!(0xAABBCCDDu32.to_le_bytes(), bytes[4..8]);
    }

    #[test]
    fn test_expedited_download_wire_bytes() {
        // 16-bit write of 0x000F to 0x6040sub0
        let msg = SdoRequest::expedited_download(0x6040, 0, 0x000F, SdoValueType::U16)
            .to_can_message(CanId::Std(0x602));
        assert_eq!(CanId::Std(0x602), msg.id());
        assert_eq!(8, msg.dlc);
        assert_eq!(
            [0x2B, 0x40, 0x60, 0x00, 0x0F, 0x00, 0x00, 0x00],
            msg.data
        );
    }

    #[test]
    fn test_expedited_download_is_deterministic() {
        let a = SdoRequest::expedited_download(0x1017, 2, 500, SdoValueType::U16).to_bytes();
        let b = SdoRequest::expedited_download(0x1017, 2, 500, SdoValueType::U16).to_bytes();
        assert_eq!(a, b);
    }

    #[test]
    fn test_initiate_upload_encoding() {
        let bytes = SdoRequest::initiate_upload(0x1000, 0).to_bytes();
        assert_eq!([0x40, 0x00, 0x10, 0x00, 0x00, 0x00, 0x00, 0x00], bytes);
    }

    #[test]
    fn test_upload_segment_request_toggle() {
        assert_eq!(0x60, SdoRequest::upload_segment_request(false).to_bytes()[0]);
        assert_eq!(0x70, SdoRequest::upload_segment_request(true).to_bytes()[0]);
    }

    #[test]
    fn test_abort_encoding() {
        let bytes = SdoRequest::abort(0x6040, 0, AbortCode::SdoTimeout).to_bytes();
        assert_eq!(0x80, bytes[0]);
        // index is little-endian, same as initiate frames
        assert_eq!([0x40, 0x60, 0x00], bytes[1..4]);
        assert_eq!([0x00, 0x00, 0x04, 0x05], bytes[4..8]);
    }

    #[test]
    fn test_request_round_trip() {
        let requests = [
            SdoRequest::expedited_download(0x2000, 3, 0x1234, SdoValueType::U16),
            SdoRequest::expedited_download(0x2000, 3, 0xDEADBEEF, SdoValueType::Unspecified),
            SdoRequest::initiate_upload(0xFFFF, 0xFF),
            SdoRequest::upload_segment_request(true),
            SdoRequest::abort(0x1234, 0x56, AbortCode::GeneralError),
        ];
        for req in requests {
            let bytes = req.to_bytes();
            assert_eq!(req, SdoRequest::try_from(&bytes[..]).unwrap());
        }
    }

    #[test]
    fn test_expedited_payload_round_trip() {
        // Encoding then decoding recovers the low k bytes for each size
        for (ty, k) in [
            (SdoValueType::U8, 1usize),
            (SdoValueType::U16, 2),
            (SdoValueType::U24, 3),
            (SdoValueType::U32, 4),
        ] {
            let value = 0xA1B2C3D4u32;
            let bytes = SdoRequest::expedited_download(0x2000, 1, value, ty).to_bytes();
            let decoded = SdoRequest::try_from(&bytes[..]).unwrap();
            match decoded {
                SdoRequest::InitiateDownload { n, e, s, data, .. } => {
                    assert!(e && s);
                    assert_eq!((4 - k) as u8, n);
                    assert_eq!(value.to_le_bytes()[..k], data[..k]);
                    assert!(data[k..].iter().all(|b| *b == 0));
                }
                _ => panic!("wrong variant"),
            }
        }
    }

    #[test]
    fn test_response_decoding() {
        // Expedited upload response: 32-bit value 0x00020192
        let msg = CanMessage::new(
            CanId::Std(0x585),
            &[0x43, 0x00, 0x10, 0x00, 0x92, 0x01, 0x02, 0x00],
        );
        assert_eq!(
            SdoResponse::ConfirmUpload {
                n: 0,
                e: true,
                s: true,
                index: 0x1000,
                sub: 0,
                data: [0x92, 0x01, 0x02, 0x00]
            },
            msg.try_into().unwrap()
        );

        // Segment response with n=4, c=1, t=1
        let msg = CanMessage::new(
            CanId::Std(0x585),
            &[0x19, b'o', b'r', b'!', 0, 0, 0, 0],
        );
        assert_eq!(
            SdoResponse::UploadSegment {
                t: true,
                n: 4,
                c: true,
                data: [b'o', b'r', b'!', 0, 0, 0, 0]
            },
            msg.try_into().unwrap()
        );

        // Server abort
        let msg = CanMessage::new(
            CanId::Std(0x582),
            &[0x80, 0x40, 0x60, 0x00, 0x11, 0x00, 0x09, 0x06],
        );
        assert_eq!(
            SdoResponse::Abort {
                index: 0x6040,
                sub: 0,
                abort_code: 0x06090011
            },
            msg.try_into().unwrap()
        );
    }

    #[test]
    fn test_response_constructors_round_trip() {
        let responses = [
            SdoResponse::expedited_upload(0x1000, 0, &[0x92, 0x01, 0x02, 0x00]),
            SdoResponse::upload_acknowledge(0x1008, 0, Some(10)),
            SdoResponse::upload_segment(false, false, b"Hello W"),
            SdoResponse::download_acknowledge(0x6040, 0),
            SdoResponse::download_segment_acknowledge(true),
            SdoResponse::abort(0x6040, 0, AbortCode::NoSuchSubIndex),
        ];
        for resp in responses {
            let msg = resp.to_can_message(CanId::Std(0x582));
            assert_eq!(resp, SdoResponse::try_from(msg).unwrap());
        }
    }

    #[test]
    fn test_abort_code_descriptions() {
        assert_eq!(
            "Sub-index does not exist.",
            AbortCode::NoSuchSubIndex.description()
        );
        assert_eq!("SDO protocol timed out.", AbortCode::SdoTimeout.description());
        assert_eq!("General error", AbortCode::GeneralError.description());
        assert_eq!(
            AbortCode::NoSuchSubIndex,
            AbortCode::try_from(0x06090011u32).unwrap()
        );
        assert!(AbortCode::try_from(0x12345678u32).is_err());
    }
}
