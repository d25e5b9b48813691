//! Node ID validation

use crate::messages::MAX_NODE_ID;

/// The ID of a single CANopen node, in the range 1..=127
///
/// The broadcast address 0 is not a `NodeId`; it only exists as an NMT target
/// and is represented separately by the NMT command's node byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeId(u8);

impl NodeId {
    /// Create a NodeId, failing if the value is out of range
    pub fn new(value: u8) -> Result<Self, InvalidNodeIdError> {
        if (1..=MAX_NODE_ID).contains(&value) {
            Ok(NodeId(value))
        } else {
            Err(InvalidNodeIdError)
        }
    }

    /// Get the raw ID value
    pub fn raw(&self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for NodeId {
    type Error = InvalidNodeIdError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        NodeId::new(value)
    }
}

impl From<NodeId> for u8 {
    fn from(value: NodeId) -> Self {
        value.raw()
    }
}

impl core::fmt::Display for NodeId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error returned when a value is not a valid node ID
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidNodeIdError;

impl core::fmt::Display for InvalidNodeIdError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Invalid node ID")
    }
}

impl core::error::Error for InvalidNodeIdError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_range() {
        assert!(NodeId::new(0).is_err());
        assert_eq!(1, NodeId::new(1).unwrap().raw());
        assert_eq!(127, NodeId::new(127).unwrap().raw());
        assert!(NodeId::new(128).is_err());
        assert!(NodeId::new(255).is_err());
    }
}
