//! Payment form sanitization and validation.
//!
//! Pure functions: no network, no storage. Rules run in a fixed order and the
//! first failing rule decides the rejection reason:
//!
//! missing fields → email → amount → card number → expiry → cvv

use rust_decimal::Decimal;
use std::str::FromStr;

use crate::domain::error::ValidationError;
use crate::domain::types::{CardInput, RawSubmission, ValidatedSubmission};

/// Cap applied to free-text fields after tag stripping and trimming.
pub const MAX_FIELD_LEN: usize = 255;

/// Required card number length after separators are removed.
pub const CARD_NUMBER_DIGITS: usize = 16;

/// Validator for untrusted payment submissions.
#[derive(Debug, Clone, Copy, Default)]
pub struct InputValidator;

impl InputValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validate and sanitize a raw submission.
    pub fn validate(&self, raw: &RawSubmission) -> Result<ValidatedSubmission, ValidationError> {
        // Presence
        let email = present(raw.email.as_deref()).ok_or(ValidationError::MissingFields)?;
        let name = present(raw.name.as_deref()).ok_or(ValidationError::MissingFields)?;
        let role = present(raw.role.as_deref()).ok_or(ValidationError::MissingFields)?;
        let amount = raw
            .amount
            .as_ref()
            .filter(|v| !is_blank_value(v))
            .ok_or(ValidationError::MissingFields)?;
        let card = raw.card_details.as_ref().ok_or(ValidationError::MissingFields)?;
        let card_number =
            present(card.card_number.as_deref()).ok_or(ValidationError::MissingFields)?;
        let expiry = present(card.expiry.as_deref()).ok_or(ValidationError::MissingFields)?;
        let cvv = present(card.cvv.as_deref()).ok_or(ValidationError::MissingFields)?;

        let email = sanitize(email);
        let name = sanitize(name);
        let role = sanitize(role);

        if !is_valid_email(&email) {
            return Err(ValidationError::InvalidEmail);
        }

        let amount = parse_amount(amount).ok_or(ValidationError::InvalidAmount)?;

        let card_number = normalize_card_number(card_number)?;

        if !is_valid_expiry(expiry) {
            return Err(ValidationError::InvalidExpiry);
        }

        if !is_valid_cvv(cvv) {
            return Err(ValidationError::InvalidCvv);
        }

        Ok(ValidatedSubmission {
            email,
            name,
            role,
            amount,
            card: CardInput {
                card_number,
                expiry: expiry.to_string(),
                cvv: cvv.to_string(),
            },
        })
    }
}

// =============================================================================
// SANITIZATION
// =============================================================================

/// Strip HTML-like tags, trim, and cap at [`MAX_FIELD_LEN`] characters.
pub fn sanitize(input: &str) -> String {
    strip_tags(input)
        .trim()
        .chars()
        .take(MAX_FIELD_LEN)
        .collect()
}

/// Remove every `<...>` run. A `<` without a closing `>` is kept.
fn strip_tags(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(open) = rest.find('<') {
        out.push_str(&rest[..open]);
        match rest[open..].find('>') {
            Some(close) => rest = &rest[open + close + 1..],
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

// =============================================================================
// FIELD RULES
// =============================================================================

fn present(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

fn is_blank_value(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => true,
        serde_json::Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// `local@domain.tld`: no whitespace, exactly one `@`, and a dot in the
/// domain part with something on both sides.
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    domain
        .char_indices()
        .any(|(i, c)| c == '.' && i > 0 && i + 1 < domain.len())
}

/// Parse a JSON number or numeric string into a strictly positive decimal.
pub fn parse_amount(value: &serde_json::Value) -> Option<Decimal> {
    let text = match value {
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => s.trim().to_string(),
        _ => return None,
    };

    let amount = Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()?;

    (amount > Decimal::ZERO).then(|| amount.normalize())
}

/// Strip spaces and dashes, then require exactly 16 ASCII digits.
fn normalize_card_number(raw: &str) -> Result<String, ValidationError> {
    let digits: String = raw.chars().filter(|c| *c != ' ' && *c != '-').collect();
    if digits.len() == CARD_NUMBER_DIGITS && digits.bytes().all(|b| b.is_ascii_digit()) {
        Ok(digits)
    } else {
        Err(ValidationError::InvalidCardNumber)
    }
}

/// `MM/YY` with month 01-12.
pub fn is_valid_expiry(expiry: &str) -> bool {
    let bytes = expiry.as_bytes();
    if bytes.len() != 5 || bytes[2] != b'/' {
        return false;
    }
    let all_digits = [0, 1, 3, 4].iter().all(|&i| bytes[i].is_ascii_digit());
    if !all_digits {
        return false;
    }
    let month = (bytes[0] - b'0') * 10 + (bytes[1] - b'0');
    (1..=12).contains(&month)
}

pub fn is_valid_cvv(cvv: &str) -> bool {
    cvv.len() == 3 && cvv.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::RawCardDetails;
    use proptest::prelude::*;
    use serde_json::json;

    fn valid_raw() -> RawSubmission {
        RawSubmission {
            email: Some("a@b.com".into()),
            name: Some("Ada Lovelace".into()),
            role: Some("customer".into()),
            amount: Some(json!(10)),
            card_details: Some(RawCardDetails {
                card_number: Some("4111111111111111".into()),
                expiry: Some("12/29".into()),
                cvv: Some("123".into()),
            }),
        }
    }

    fn validate(raw: &RawSubmission) -> Result<ValidatedSubmission, ValidationError> {
        InputValidator::new().validate(raw)
    }

    #[test]
    fn test_valid_submission() {
        let validated = validate(&valid_raw()).unwrap();
        assert_eq!(validated.email, "a@b.com");
        assert_eq!(validated.amount, Decimal::from(10));
        assert_eq!(validated.card.card_number, "4111111111111111");
    }

    #[test]
    fn test_missing_fields() {
        let mut raw = valid_raw();
        raw.name = None;
        assert_eq!(validate(&raw), Err(ValidationError::MissingFields));

        let mut raw = valid_raw();
        raw.email = Some(String::new());
        assert_eq!(validate(&raw), Err(ValidationError::MissingFields));

        let mut raw = valid_raw();
        raw.amount = Some(serde_json::Value::Null);
        assert_eq!(validate(&raw), Err(ValidationError::MissingFields));

        let mut raw = valid_raw();
        raw.card_details = None;
        assert_eq!(validate(&raw), Err(ValidationError::MissingFields));

        let mut raw = valid_raw();
        if let Some(card) = raw.card_details.as_mut() {
            card.cvv = None;
        }
        assert_eq!(validate(&raw), Err(ValidationError::MissingFields));
    }

    #[test]
    fn test_first_failing_rule_wins() {
        let mut raw = valid_raw();
        raw.email = Some("not-an-email".into());
        raw.amount = Some(json!(-5));
        if let Some(card) = raw.card_details.as_mut() {
            card.card_number = Some("123".into());
        }
        assert_eq!(validate(&raw), Err(ValidationError::InvalidEmail));

        raw.email = Some("a@b.com".into());
        assert_eq!(validate(&raw), Err(ValidationError::InvalidAmount));

        raw.amount = Some(json!("12.50"));
        assert_eq!(validate(&raw), Err(ValidationError::InvalidCardNumber));
    }

    #[test]
    fn test_sanitize_strips_tags_and_caps_length() {
        assert_eq!(sanitize("  <b>Ada</b> Lovelace "), "Ada Lovelace");
        assert_eq!(sanitize("<script>alert(1)</script>admin"), "alert(1)admin");
        assert_eq!(sanitize("a < b"), "a < b");
        assert_eq!(sanitize(&"x".repeat(400)).chars().count(), MAX_FIELD_LEN);
    }

    #[test]
    fn test_email_sanitized_before_check() {
        let mut raw = valid_raw();
        raw.email = Some(" <i>a@b.com</i> ".into());
        assert_eq!(validate(&raw).unwrap().email, "a@b.com");
    }

    #[test]
    fn test_email_shapes() {
        assert!(is_valid_email("a@b.com"));
        assert!(is_valid_email("first.last@sub.example.org"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("a@.com"));
        assert!(!is_valid_email("a@b."));
        assert!(!is_valid_email("@b.com"));
        assert!(!is_valid_email("a@@b.com"));
        assert!(!is_valid_email("a b@c.com"));
    }

    #[test]
    fn test_amounts() {
        assert_eq!(parse_amount(&json!(10)), Some(Decimal::from(10)));
        assert_eq!(parse_amount(&json!("10.50")), Some(Decimal::new(105, 1)));
        assert_eq!(parse_amount(&json!(0)), None);
        assert_eq!(parse_amount(&json!(-1)), None);
        assert_eq!(parse_amount(&json!("abc")), None);
        assert_eq!(parse_amount(&json!(true)), None);
    }

    #[test]
    fn test_card_number_separators() {
        assert_eq!(
            normalize_card_number("4111 1111-1111 1111"),
            Ok("4111111111111111".to_string())
        );
        assert_eq!(
            normalize_card_number("411111111111111a"),
            Err(ValidationError::InvalidCardNumber)
        );
        assert_eq!(
            normalize_card_number("123"),
            Err(ValidationError::InvalidCardNumber)
        );
    }

    #[test]
    fn test_expiry_and_cvv() {
        assert!(is_valid_expiry("01/30"));
        assert!(is_valid_expiry("12/29"));
        assert!(!is_valid_expiry("00/29"));
        assert!(!is_valid_expiry("13/29"));
        assert!(!is_valid_expiry("1/29"));
        assert!(!is_valid_expiry("12-29"));

        assert!(is_valid_cvv("007"));
        assert!(!is_valid_cvv("12"));
        assert!(!is_valid_cvv("1234"));
        assert!(!is_valid_cvv("12a"));
    }

    proptest! {
        #[test]
        fn prop_any_sixteen_digits_accepted(number in "[0-9]{16}") {
            let mut raw = valid_raw();
            if let Some(card) = raw.card_details.as_mut() {
                card.card_number = Some(number.clone());
            }
            prop_assert_eq!(validate(&raw).unwrap().card.card_number, number);
        }

        #[test]
        fn prop_wrong_length_rejected(number in "[0-9]{1,15}|[0-9]{17,24}") {
            let mut raw = valid_raw();
            if let Some(card) = raw.card_details.as_mut() {
                card.card_number = Some(number);
            }
            prop_assert_eq!(validate(&raw), Err(ValidationError::InvalidCardNumber));
        }

        #[test]
        fn prop_sanitized_output_has_no_tags(input in ".{0,300}") {
            let cleaned = sanitize(&input);
            prop_assert!(cleaned.chars().count() <= MAX_FIELD_LEN);
            let tag_left = cleaned
                .find('<')
                .is_some_and(|open| cleaned[open..].contains('>'));
            prop_assert!(!tag_left);
        }
    }
}
