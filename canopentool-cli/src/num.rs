//! Numeric argument parsing
//!
//! All numeric command arguments accept the strtol base-0 forms: decimal,
//! hexadecimal with a `0x` prefix, and octal with a leading `0`.

use canopentool_client::common::NodeId;

/// Parse a number in base-0 notation
pub fn parse_base0(s: &str) -> Result<u64, String> {
    let t = s.trim();
    let (digits, radix) = if let Some(hex) = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X"))
    {
        (hex, 16)
    } else if t.len() > 1 && t.starts_with('0') {
        (&t[1..], 8)
    } else {
        (t, 10)
    };
    u64::from_str_radix(digits, radix).map_err(|e| e.to_string())
}

/// Parse a node ID in the range 1..=127
pub fn parse_node_id(s: &str) -> Result<NodeId, String> {
    parse_base0(s)
        .ok()
        .and_then(|v| u8::try_from(v).ok())
        .and_then(|v| NodeId::new(v).ok())
        .ok_or_else(|| "illegal node id".to_string())
}

/// Parse an object dictionary index (16 bit)
pub fn parse_index(s: &str) -> Result<u16, String> {
    parse_base0(s)
        .ok()
        .and_then(|v| u16::try_from(v).ok())
        .ok_or_else(|| "illegal CANopen index".to_string())
}

/// Parse an object dictionary subindex (8 bit)
pub fn parse_subindex(s: &str) -> Result<u8, String> {
    parse_base0(s)
        .ok()
        .and_then(|v| u8::try_from(v).ok())
        .ok_or_else(|| "illegal CANopen subindex".to_string())
}

/// Parse a 32-bit download value
pub fn parse_value(s: &str) -> Result<u32, String> {
    parse_base0(s)
        .ok()
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| "illegal value".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base0_radix_detection() {
        assert_eq!(Ok(42), parse_base0("42"));
        assert_eq!(Ok(0x6040), parse_base0("0x6040"));
        assert_eq!(Ok(0x6040), parse_base0("0X6040"));
        assert_eq!(Ok(8), parse_base0("010"));
        assert_eq!(Ok(0), parse_base0("0"));
        assert!(parse_base0("").is_err());
        assert!(parse_base0("0x").is_err());
        assert!(parse_base0("-5").is_err());
        assert!(parse_base0("08").is_err());
        assert!(parse_base0("canopen").is_err());
    }

    #[test]
    fn test_node_id_bounds() {
        assert!(parse_node_id("0").is_err());
        assert_eq!(1, parse_node_id("1").unwrap().raw());
        assert_eq!(127, parse_node_id("127").unwrap().raw());
        assert_eq!(127, parse_node_id("0x7F").unwrap().raw());
        assert!(parse_node_id("128").is_err());
        assert_eq!("illegal node id", parse_node_id("128").unwrap_err());
    }

    #[test]
    fn test_index_and_subindex_bounds() {
        assert_eq!(Ok(0xFFFF), parse_index("0xFFFF"));
        assert!(parse_index("0x10000").is_err());
        assert_eq!(Ok(0xFF), parse_subindex("0xFF"));
        assert!(parse_subindex("0x100").is_err());
        assert_eq!(Ok(0), parse_subindex("0"));
    }

    #[test]
    fn test_value_bounds() {
        assert_eq!(Ok(0xFFFF_FFFF), parse_value("0xFFFFFFFF"));
        assert!(parse_value("0x100000000").is_err());
    }
}
