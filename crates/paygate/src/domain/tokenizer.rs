//! Card tokenization.
//!
//! HMAC-SHA256 over the canonical JSON form of the card fields
//! (`{"cardNumber":..,"expiry":..,"cvv":..}`), keyed by a server secret and
//! hex encoded. Deterministic and one-way: a stand-in for a processor token,
//! not a vault lookup.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;

use crate::domain::config::ConfigError;
use crate::domain::types::CardInput;

type HmacSha256 = Hmac<Sha256>;

/// Non-reversible card token (64 hex chars).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CardToken(String);

impl CardToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CardToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Keyed tokenizer. Built once at startup; a missing secret is a startup
/// failure, never a per-request one.
#[derive(Clone)]
pub struct Tokenizer {
    mac: HmacSha256,
}

impl Tokenizer {
    pub fn new(secret: Option<&str>) -> Result<Self, ConfigError> {
        let secret = secret
            .filter(|s| !s.trim().is_empty())
            .ok_or(ConfigError::MissingTokenizerSecret)?;

        let mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| ConfigError::Invalid(format!("tokenizer key: {}", e)))?;

        Ok(Self { mac })
    }

    pub fn tokenize(&self, card: &CardInput) -> CardToken {
        let mut mac = self.mac.clone();
        mac.update(&canonical_bytes(card));
        CardToken(hex::encode(mac.finalize().into_bytes()))
    }
}

impl fmt::Debug for Tokenizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Tokenizer { secret: <redacted> }")
    }
}

/// One-shot form: fails with [`ConfigError::MissingTokenizerSecret`] when no
/// secret is configured.
pub fn tokenize(card: &CardInput, secret: Option<&str>) -> Result<CardToken, ConfigError> {
    Ok(Tokenizer::new(secret)?.tokenize(card))
}

fn canonical_bytes(card: &CardInput) -> Vec<u8> {
    // Field order is fixed by the struct definition.
    serde_json::to_vec(card).unwrap_or_else(|_| {
        format!("{}|{}|{}", card.card_number, card.expiry, card.cvv).into_bytes()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card() -> CardInput {
        CardInput {
            card_number: "4111111111111111".into(),
            expiry: "12/29".into(),
            cvv: "123".into(),
        }
    }

    #[test]
    fn test_deterministic() {
        let tokenizer = Tokenizer::new(Some("secret")).unwrap();
        assert_eq!(tokenizer.tokenize(&card()), tokenizer.tokenize(&card()));
        assert_eq!(tokenizer.tokenize(&card()).as_str().len(), 64);
    }

    #[test]
    fn test_secret_changes_token() {
        let a = tokenize(&card(), Some("secret-a")).unwrap();
        let b = tokenize(&card(), Some("secret-b")).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_card_change_changes_token() {
        let tokenizer = Tokenizer::new(Some("secret")).unwrap();
        let mut other = card();
        other.cvv = "124".into();
        assert_ne!(tokenizer.tokenize(&card()), tokenizer.tokenize(&other));
    }

    #[test]
    fn test_missing_secret_is_configuration_error() {
        assert_eq!(
            tokenize(&card(), None).unwrap_err(),
            ConfigError::MissingTokenizerSecret
        );
        assert_eq!(
            Tokenizer::new(Some("")).unwrap_err(),
            ConfigError::MissingTokenizerSecret
        );
    }

    #[test]
    fn test_matches_reference_hmac() {
        // HMAC-SHA256("key", "{\"cardNumber\":\"4111111111111111\",\"expiry\":\"12/29\",\"cvv\":\"123\"}")
        let mut mac = HmacSha256::new_from_slice(b"key").unwrap();
        mac.update(br#"{"cardNumber":"4111111111111111","expiry":"12/29","cvv":"123"}"#);
        let expected = hex::encode(mac.finalize().into_bytes());

        let token = tokenize(&card(), Some("key")).unwrap();
        assert_eq!(token.as_str(), expected);
        assert!(!token.as_str().contains("4111"));
    }
}
