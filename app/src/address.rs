use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::{WalletError, WalletResult};

/// Stellar account ids: 56 characters, `G` followed by base32 upper-case.
pub const ADDRESS_LENGTH: usize = 56;

/// Characters kept on each side by [`format_address`] by default.
pub const DEFAULT_DISPLAY_CHARS: usize = 8;

static ADDRESS_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^G[A-Z2-7]{55}$").expect("address pattern is valid"));

pub fn is_valid_address(address: &str) -> bool {
    ADDRESS_PATTERN.is_match(address)
}

/// Validate an account id. Only used for display and user input; a
/// session may carry any address the wallet returned.
pub fn validate_address(address: &str) -> WalletResult<()> {
    if address.is_empty() {
        return Err(WalletError::ValidationError(
            "Address cannot be empty".to_string(),
        ));
    }

    if address.len() != ADDRESS_LENGTH {
        return Err(WalletError::InvalidAddress(format!(
            "Address must be {} characters, got {}",
            ADDRESS_LENGTH,
            address.len()
        )));
    }

    if !is_valid_address(address) {
        return Err(WalletError::InvalidAddress(
            "Address format is invalid".to_string(),
        ));
    }

    Ok(())
}

/// Shorten a valid address to `head...tail`; anything else is returned as is.
pub fn format_address(address: &str, chars: usize) -> String {
    if !is_valid_address(address) || address.len() <= chars.saturating_mul(2) {
        return address.to_string();
    }

    // Valid addresses are ASCII, so byte slicing is on char boundaries.
    let head = &address[..chars];
    let tail = &address[address.len() - chars..];
    format!("{}...{}", head, tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> String {
        format!("G{}", "A".repeat(55))
    }

    #[test]
    fn accepts_well_formed_addresses() {
        assert!(is_valid_address(&sample()));
        assert!(is_valid_address(
            "GBRPYHIL2CI3FNQ4BXLFMNDLFJUNPU2HY3ZMFSHONUCEOASW7QC7OX2H"
        ));
        assert!(validate_address(&sample()).is_ok());
    }

    #[test]
    fn rejects_malformed_addresses() {
        assert!(!is_valid_address(""));
        assert!(!is_valid_address(&format!("S{}", "A".repeat(55))));
        assert!(!is_valid_address(&format!("G{}", "a".repeat(55))));
        assert!(!is_valid_address(&format!("G{}", "1".repeat(55))));
        assert!(!is_valid_address(&sample()[..55]));

        assert!(matches!(
            validate_address(""),
            Err(WalletError::ValidationError(_))
        ));
        assert!(matches!(
            validate_address("GSHORT"),
            Err(WalletError::InvalidAddress(_))
        ));
    }

    #[test]
    fn formats_valid_addresses_only() {
        let address = "GBRPYHIL2CI3FNQ4BXLFMNDLFJUNPU2HY3ZMFSHONUCEOASW7QC7OX2H";
        assert_eq!(
            format_address(address, DEFAULT_DISPLAY_CHARS),
            "GBRPYHIL...7QC7OX2H"
        );
        assert_eq!(format_address(address, 4), "GBRP...OX2H");
        assert_eq!(format_address("not-an-address", 4), "not-an-address");
        assert_eq!(format_address(address, 40), address);
    }
}
