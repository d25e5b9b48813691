//! Message definitions

use snafu::Snafu;

/// An 11-bit or 29-bit CAN identifier
///
/// The CANopen services handled by this tool only use standard 11-bit
/// identifiers, but extended frames may still appear on a shared bus and have
/// to be representable so they can be counted and ignored.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CanId {
    /// An extended 29-bit identifier
    Extended(u32),
    /// A std 11-bit identifier
    Std(u16),
}

impl CanId {
    /// Create a new extended ID
    pub const fn extended(id: u32) -> CanId {
        CanId::Extended(id)
    }

    /// Create a new standard ID
    pub const fn std(id: u16) -> CanId {
        CanId::Std(id)
    }

    /// Get the raw ID as a u32
    pub fn raw(&self) -> u32 {
        match self {
            CanId::Extended(id) => *id,
            CanId::Std(id) => *id as u32,
        }
    }

    /// Returns true if this ID is an extended ID
    pub fn is_extended(&self) -> bool {
        matches!(self, CanId::Extended(_))
    }
}

const MAX_DATA_LENGTH: usize = 8;

/// The highest valid CANopen node ID
pub const MAX_NODE_ID: u8 = 127;

/// A struct to contain a CAN message
#[derive(Clone, Copy, Debug)]
pub struct CanMessage {
    /// The data payload of the message
    ///
    /// Note, some bytes may be unused. Check dlc.
    pub data: [u8; MAX_DATA_LENGTH],
    /// The length of the data payload
    pub dlc: u8,
    /// The id of this message
    pub id: CanId,
}

impl Default for CanMessage {
    fn default() -> Self {
        Self {
            data: [0; MAX_DATA_LENGTH],
            dlc: 0,
            id: CanId::Std(0),
        }
    }
}

impl CanMessage {
    /// Create a new CAN message
    ///
    /// Panics if `data` is longer than 8 bytes.
    pub fn new(id: CanId, data: &[u8]) -> Self {
        let dlc = data.len() as u8;
        if dlc > MAX_DATA_LENGTH as u8 {
            panic!(
                "Data length exceeds maximum size of {} bytes",
                MAX_DATA_LENGTH
            );
        }
        let mut buf = [0u8; MAX_DATA_LENGTH];
        buf[0..dlc as usize].copy_from_slice(data);

        Self { id, dlc, data: buf }
    }

    /// Get the id of the message
    pub fn id(&self) -> CanId {
        self.id
    }

    /// Get a slice containing the data payload
    pub fn data(&self) -> &[u8] {
        &self.data[0..self.dlc as usize]
    }
}

/// The NMT state transition command specifier
#[derive(Copy, Clone, Debug, PartialEq)]
#[repr(u8)]
pub enum NmtCommandSpecifier {
    /// Indicates device should transition to the Operational state
    Start = 1,
    /// Indicates device should transition to the Stopped state
    Stop = 2,
    /// Indicates device should transition to the PreOperational state
    EnterPreOp = 128,
    /// Indicates device should perform an application reset
    ResetNode = 129,
    /// Indicates device should perform a communications reset
    ResetComm = 130,
}

impl NmtCommandSpecifier {
    /// Create an NmtCommandSpecifier from the byte value transmitted in the message
    pub fn from_byte(b: u8) -> Result<Self, MessageError> {
        match b {
            1 => Ok(Self::Start),
            2 => Ok(Self::Stop),
            128 => Ok(Self::EnterPreOp),
            129 => Ok(Self::ResetNode),
            130 => Ok(Self::ResetComm),
            _ => Err(MessageError::InvalidField),
        }
    }
}

/// The COB ID used for sending NMT commands
pub const NMT_CMD_ID: CanId = CanId::Std(0);
/// The COB ID used for heartbeat messages (node ID is added)
pub const HEARTBEAT_ID: u16 = 0x700;
/// The base ID for sending SDO requests (server node ID is added)
pub const SDO_REQ_BASE: u16 = 0x600;
/// The base ID for SDO responses (server node ID is added)
pub const SDO_RESP_BASE: u16 = 0x580;

/// An NmtCommand message
#[derive(Clone, Copy, Debug)]
pub struct NmtCommand {
    /// Specifies the type of command
    pub cs: NmtCommandSpecifier,
    /// Indicates the node it applies to. A node of 0 indicates a broadcast
    /// command to all nodes.
    pub node: u8,
}

impl TryFrom<CanMessage> for NmtCommand {
    type Error = MessageError;

    fn try_from(msg: CanMessage) -> Result<Self, Self::Error> {
        let payload = msg.data();
        if msg.id() != NMT_CMD_ID {
            Err(MessageError::UnexpectedId {
                cob_id: msg.id(),
                expected: NMT_CMD_ID,
            })
        } else if payload.len() >= 2 {
            let cmd = NmtCommandSpecifier::from_byte(payload[0])?;
            let node = payload[1];
            Ok(NmtCommand { cs: cmd, node })
        } else {
            Err(MessageError::MessageTooShort)
        }
    }
}

impl From<NmtCommand> for CanMessage {
    fn from(cmd: NmtCommand) -> Self {
        let mut msg = CanMessage {
            id: NMT_CMD_ID,
            dlc: 2,
            ..Default::default()
        };
        msg.data[0] = cmd.cs as u8;
        msg.data[1] = cmd.node;
        msg
    }
}

/// Possible NMT states for a node
#[derive(Copy, Clone, Debug, PartialEq)]
#[repr(u8)]
pub enum NmtState {
    /// Bootup
    ///
    /// A node never remains in this state, as all nodes should transition
    /// automatically into PreOperational
    Bootup = 0,
    /// Node has been stopped
    Stopped = 4,
    /// Normal operational state
    Operational = 5,
    /// Node is awaiting command to enter operation
    PreOperational = 127,
}

impl core::fmt::Display for NmtState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            NmtState::Bootup => write!(f, "Bootup"),
            NmtState::Stopped => write!(f, "Stopped"),
            NmtState::Operational => write!(f, "Operational"),
            NmtState::PreOperational => write!(f, "PreOperational"),
        }
    }
}

#[derive(Clone, Copy, Debug)]
/// An error for [`NmtState::try_from()`]
pub struct InvalidNmtStateError(pub u8);

impl TryFrom<u8> for NmtState {
    type Error = InvalidNmtStateError;

    /// Attempt to convert a u8 to an NmtState enum
    ///
    /// Fails with InvalidNmtStateError if value is not a known state
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use NmtState::*;
        match value {
            x if x == Bootup as u8 => Ok(Bootup),
            x if x == Stopped as u8 => Ok(Stopped),
            x if x == Operational as u8 => Ok(Operational),
            x if x == PreOperational as u8 => Ok(PreOperational),
            _ => Err(InvalidNmtStateError(value)),
        }
    }
}

/// A Heartbeat message
///
/// The state byte is kept raw rather than decoded to [`NmtState`]: the monitor
/// has to display nodes reporting unknown states, not drop their heartbeats.
#[derive(Clone, Copy, Debug)]
pub struct Heartbeat {
    /// The ID of the node transmitting the heartbeat
    pub node: u8,
    /// A toggle value which is flipped on every heartbeat
    pub toggle: bool,
    /// The reported NMT state, low 7 bits of the payload byte
    pub state: u8,
}

impl TryFrom<CanMessage> for Heartbeat {
    type Error = MessageError;

    fn try_from(msg: CanMessage) -> Result<Self, Self::Error> {
        let cob_id = msg.id();
        let node = (cob_id.raw() & 0x7f) as u8;
        if cob_id.is_extended() || cob_id.raw() & !0x7f != HEARTBEAT_ID as u32 || node == 0 {
            return Err(MessageError::UnrecognizedId { cob_id });
        }
        if msg.data().is_empty() {
            return Err(MessageError::MessageTooShort);
        }
        Ok(Heartbeat {
            node,
            toggle: (msg.data[0] & (1 << 7)) != 0,
            state: msg.data[0] & 0x7f,
        })
    }
}

impl From<Heartbeat> for CanMessage {
    fn from(value: Heartbeat) -> Self {
        let mut msg = CanMessage {
            id: CanId::Std(HEARTBEAT_ID | value.node as u16),
            dlc: 1,
            ..Default::default()
        };
        msg.data[0] = value.state & 0x7f;
        if value.toggle {
            msg.data[0] |= 1 << 7;
        }
        msg
    }
}

/// Traffic accounting classes for received frames
///
/// Classification is by identifier range and does not partition the ID space:
/// a frame may match no class at all.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameClass {
    /// An NMT command frame (COB ID 0)
    Nmt,
    /// A process data object
    Pdo,
    /// An SDO request or response
    Sdo,
    /// A node heartbeat (counted with NMT traffic)
    Heartbeat,
}

/// Classify a frame for traffic accounting
pub fn classify_frame(msg: &CanMessage) -> Option<FrameClass> {
    if msg.id().is_extended() {
        return None;
    }
    match msg.id().raw() {
        0x000 => Some(FrameClass::Nmt),
        0x181..=0x57f => Some(FrameClass::Pdo),
        0x581..=0x67f => Some(FrameClass::Sdo),
        0x701..=0x77f if msg.dlc == 1 => Some(FrameClass::Heartbeat),
        _ => None,
    }
}

/// An error for problems converting CanMessages to CANopen types
#[derive(Debug, Clone, Copy, PartialEq, Snafu)]
pub enum MessageError {
    /// Not enough bytes were present in the message
    MessageTooShort,
    /// The message ID was not the expected value
    #[snafu(display("Unexpected message ID found: {cob_id:?}, expected: {expected:?}"))]
    UnexpectedId {
        /// Received ID
        cob_id: CanId,
        /// Expected ID
        expected: CanId,
    },
    /// A field in the message contained an unallowed value for that field
    InvalidField,
    /// The COB ID of the message does not correspond to the expected service
    UnrecognizedId {
        /// The unrecognized COB
        cob_id: CanId,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nmt_command_round_trip() {
        let msg: CanMessage = NmtCommand {
            cs: NmtCommandSpecifier::EnterPreOp,
            node: 0x20,
        }
        .into();
        assert_eq!(CanId::Std(0), msg.id());
        assert_eq!(&[128, 0x20], msg.data());

        let decoded = NmtCommand::try_from(msg).unwrap();
        assert_eq!(NmtCommandSpecifier::EnterPreOp, decoded.cs);
        assert_eq!(0x20, decoded.node);
    }

    #[test]
    fn test_nmt_broadcast_encodes_node_zero() {
        let msg: CanMessage = NmtCommand {
            cs: NmtCommandSpecifier::ResetNode,
            node: 0,
        }
        .into();
        assert_eq!(2, msg.dlc);
        assert_eq!(&[129, 0], msg.data());
    }

    #[test]
    fn test_heartbeat_decode() {
        let msg = CanMessage::new(CanId::Std(0x705), &[0x7f]);
        let hb = Heartbeat::try_from(msg).unwrap();
        assert_eq!(5, hb.node);
        assert_eq!(127, hb.state);
        assert!(!hb.toggle);

        // toggle bit is masked out of the state
        let msg = CanMessage::new(CanId::Std(0x77f), &[0x85]);
        let hb = Heartbeat::try_from(msg).unwrap();
        assert_eq!(127, hb.node);
        assert_eq!(5, hb.state);
        assert!(hb.toggle);
    }

    #[test]
    fn test_heartbeat_rejects_foreign_ids() {
        assert!(Heartbeat::try_from(CanMessage::new(CanId::Std(0x700), &[0])).is_err());
        assert!(Heartbeat::try_from(CanMessage::new(CanId::Std(0x605), &[0])).is_err());
        assert!(Heartbeat::try_from(CanMessage::new(CanId::Extended(0x705), &[0])).is_err());
    }

    #[test]
    fn test_unknown_heartbeat_state_is_preserved() {
        let msg = CanMessage::new(CanId::Std(0x701), &[3]);
        let hb = Heartbeat::try_from(msg).unwrap();
        assert_eq!(3, hb.state);
    }

    #[test]
    fn test_classification_ranges() {
        let std_frame = |id, dlc: usize| CanMessage::new(CanId::Std(id), &vec![0u8; dlc]);

        assert_eq!(Some(FrameClass::Nmt), classify_frame(&std_frame(0x000, 2)));

        // PDO band is 0x181..=0x57f
        assert_eq!(None, classify_frame(&std_frame(0x180, 8)));
        assert_eq!(Some(FrameClass::Pdo), classify_frame(&std_frame(0x181, 8)));
        assert_eq!(Some(FrameClass::Pdo), classify_frame(&std_frame(0x57f, 8)));
        assert_eq!(None, classify_frame(&std_frame(0x580, 8)));

        // SDO band is 0x581..=0x67f
        assert_eq!(Some(FrameClass::Sdo), classify_frame(&std_frame(0x581, 8)));
        assert_eq!(Some(FrameClass::Sdo), classify_frame(&std_frame(0x67f, 8)));
        assert_eq!(None, classify_frame(&std_frame(0x680, 8)));

        // Heartbeats require DLC 1
        assert_eq!(None, classify_frame(&std_frame(0x700, 1)));
        assert_eq!(
            Some(FrameClass::Heartbeat),
            classify_frame(&std_frame(0x701, 1))
        );
        assert_eq!(
            Some(FrameClass::Heartbeat),
            classify_frame(&std_frame(0x77f, 1))
        );
        assert_eq!(None, classify_frame(&std_frame(0x701, 8)));

        assert_eq!(None, classify_frame(&CanMessage::new(CanId::Extended(0x181), &[0; 8])));
    }
}
