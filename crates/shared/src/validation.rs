//! Common validation utilities.

use validator::ValidationError;

/// SIM slot numbers a gateway exposes.
pub const SLOT_NUMBERS: [i16; 2] = [1, 2];

/// Maximum length of a dialable phone number.
const MAX_PHONE_LENGTH: usize = 20;

/// Validates that a phone number is dialable: an optional leading `+` followed by
/// 3 to 20 digits, spaces or dashes.
pub fn validate_phone_number(phone: &str) -> Result<(), ValidationError> {
    let trimmed = phone.trim();
    let body = trimmed.strip_prefix('+').unwrap_or(trimmed);
    let digits = body.chars().filter(|c| c.is_ascii_digit()).count();

    let well_formed = !body.is_empty()
        && body
            .chars()
            .all(|c| c.is_ascii_digit() || c == ' ' || c == '-')
        && (3..=MAX_PHONE_LENGTH).contains(&digits);

    if well_formed {
        Ok(())
    } else {
        let mut err = ValidationError::new("phone_format");
        err.message = Some("Phone number must contain 3 to 20 digits".into());
        Err(err)
    }
}

/// Validates that a slot number addresses one of the two SIM bays.
pub fn validate_slot_number(slot: i64) -> Result<(), ValidationError> {
    if SLOT_NUMBERS.iter().any(|s| i64::from(*s) == slot) {
        Ok(())
    } else {
        let mut err = ValidationError::new("slot_range");
        err.message = Some("Slot must be 1 or 2".into());
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_phone_number() {
        assert!(validate_phone_number("+10000000000").is_ok());
        assert!(validate_phone_number("10086").is_ok());
        assert!(validate_phone_number("138-0013-8000").is_ok());
        assert!(validate_phone_number("+86 138 0013 8000").is_ok());
    }

    #[test]
    fn test_validate_phone_number_rejects_garbage() {
        assert!(validate_phone_number("").is_err());
        assert!(validate_phone_number("+").is_err());
        assert!(validate_phone_number("12").is_err());
        assert!(validate_phone_number("call-me").is_err());
        assert!(validate_phone_number("123456789012345678901").is_err());
    }

    #[test]
    fn test_validate_phone_number_error_message() {
        let err = validate_phone_number("abc").unwrap_err();
        assert_eq!(
            err.message.unwrap().to_string(),
            "Phone number must contain 3 to 20 digits"
        );
    }

    #[test]
    fn test_validate_slot_number() {
        assert!(validate_slot_number(1).is_ok());
        assert!(validate_slot_number(2).is_ok());
        assert!(validate_slot_number(0).is_err());
        assert!(validate_slot_number(3).is_err());
        assert!(validate_slot_number(-1).is_err());
    }
}
