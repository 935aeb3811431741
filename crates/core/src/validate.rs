//! Request input validation.
//!
//! Wallet addresses are `0x`-prefixed 20-byte hex strings (case preserved,
//! zero address rejected). Gamer tags are 3-20 characters of
//! `[A-Za-z0-9_]`.

use thiserror::Error;

const GAMER_TAG_MIN_LEN: usize = 3;
const GAMER_TAG_MAX_LEN: usize = 20;
const WALLET_ADDRESS_LEN: usize = 42;

/// A single-field validation failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{field}: {reason}")]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: String,
}

impl ValidationError {
    fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

pub fn validate_wallet_address(wallet_address: &str) -> Result<(), ValidationError> {
    let field = "wallet_address";

    if !wallet_address.starts_with("0x") {
        return Err(ValidationError::new(field, "must be prefixed with '0x'"));
    }

    let hex = &wallet_address[2..];
    if wallet_address.len() != WALLET_ADDRESS_LEN || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ValidationError::new(field, "not a valid hex address"));
    }

    if hex.chars().all(|c| c == '0') {
        return Err(ValidationError::new(field, "must not be a zero address"));
    }

    Ok(())
}

pub fn validate_gamer_tag(gamer_tag: &str) -> Result<(), ValidationError> {
    let field = "gamer_tag";

    if gamer_tag.len() < GAMER_TAG_MIN_LEN {
        return Err(ValidationError::new(
            field,
            format!("must be at least {GAMER_TAG_MIN_LEN} characters long"),
        ));
    }

    if gamer_tag.len() > GAMER_TAG_MAX_LEN {
        return Err(ValidationError::new(
            field,
            format!("must be at most {GAMER_TAG_MAX_LEN} characters long"),
        ));
    }

    if !gamer_tag
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(ValidationError::new(
            field,
            "can only contain alphanumeric characters and underscores",
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_well_formed_wallet_addresses() {
        assert!(validate_wallet_address("0xA0Cf024D03D05803b0f5D80b4D6DE9AD31fcBc44").is_ok());
        assert!(validate_wallet_address("0xa0cf024d03d05803b0f5d80b4d6de9ad31fcbc44").is_ok());
    }

    #[test]
    fn rejects_malformed_wallet_addresses() {
        // missing prefix
        assert!(validate_wallet_address("A0Cf024D03D05803b0f5D80b4D6DE9AD31fcBc44").is_err());
        // too short
        assert!(validate_wallet_address("0xA0Cf024D").is_err());
        // non-hex characters
        assert!(validate_wallet_address("0xZZCf024D03D05803b0f5D80b4D6DE9AD31fcBc44").is_err());
        // zero address
        assert!(validate_wallet_address("0x0000000000000000000000000000000000000000").is_err());
        assert!(validate_wallet_address("").is_err());
    }

    #[test]
    fn accepts_well_formed_gamer_tags() {
        assert!(validate_gamer_tag("abc").is_ok());
        assert!(validate_gamer_tag("Player_One99").is_ok());
        assert!(validate_gamer_tag("a".repeat(20).as_str()).is_ok());
    }

    #[test]
    fn rejects_malformed_gamer_tags() {
        assert!(validate_gamer_tag("ab").is_err());
        assert!(validate_gamer_tag("a".repeat(21).as_str()).is_err());
        assert!(validate_gamer_tag("has space").is_err());
        assert!(validate_gamer_tag("héllo").is_err());
        assert!(validate_gamer_tag("").is_err());
    }
}
