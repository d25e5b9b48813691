//! Capability check for state-changing commands
//!
//! NMT and SDO downloads change remote state, so they are gated behind root
//! or an explicit escape hatch in the environment. This is a policy
//! affordance against accidents, not a security boundary.

use snafu::Snafu;

const UNLOCK_VARIABLE: &str = "UNLOCK_DANGEROUS_THINGS";
const UNLOCK_PASSPHRASE: &str = "I am the master of my fate: I am the captain of my soul.";

/// Error returned when the caller may not change remote state
#[derive(Debug, Snafu)]
#[snafu(display("sorry, only root can do that."))]
pub struct PermissionError;

/// Check that the user may issue state-changing commands
///
/// Passes for root, or when [`UNLOCK_VARIABLE`] holds the passphrase
/// (compared case-insensitively).
pub fn ensure_may_change_state() -> Result<(), PermissionError> {
    // SAFETY: getuid cannot fail and touches no memory
    let user_is_root = unsafe { libc::getuid() } == 0;

    let user_has_unlocked = std::env::var(UNLOCK_VARIABLE)
        .map(|value| value.eq_ignore_ascii_case(UNLOCK_PASSPHRASE))
        .unwrap_or(false);

    if user_is_root || user_has_unlocked {
        Ok(())
    } else {
        PermissionSnafu.fail()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_denial_message() {
        assert_eq!("sorry, only root can do that.", PermissionError.to_string());
    }
}
