//! Request validation
//!
//! Create/update payloads implement [`RequestValidation`]; handlers call
//! `req.validate()?` before touching the database.

use crate::error::ApiError;

pub trait RequestValidation {
    fn validate(&self) -> Result<(), ApiError>;
}

/// Fail with a validation error unless `$predicate` holds.
///
/// ```ignore
/// validate_field!(self.quantity, self.quantity >= 1, "quantity must be at least 1");
/// ```
#[macro_export]
macro_rules! validate_field {
    ($field:expr, $predicate:expr, $message:expr) => {
        if !$predicate {
            return Err($crate::error::ApiError::validation($message));
        }
    };
}

/// Non-blank string
#[macro_export]
macro_rules! validate_required {
    ($field:expr, $message:expr) => {
        $crate::validate_field!($field, !$field.trim().is_empty(), $message);
    };
}

/// String length in characters, inclusive bounds
#[macro_export]
macro_rules! validate_length {
    ($field:expr, $min:expr, $max:expr, $message:expr) => {
        let len = $field.chars().count();
        $crate::validate_field!($field, len >= $min && len <= $max, $message);
    };
}

/// Basic shape check only
#[macro_export]
macro_rules! validate_email {
    ($field:expr, $message:expr) => {
        $crate::validate_field!($field, $field.contains('@') && $field.contains('.'), $message);
    };
}

/// Inclusive numeric range
#[macro_export]
macro_rules! validate_range {
    ($field:expr, $min:expr, $max:expr, $message:expr) => {
        $crate::validate_field!($field, $field >= $min && $field <= $max, $message);
    };
}

/// Membership in a fixed set of string values
#[macro_export]
macro_rules! validate_one_of {
    ($field:expr, $allowed:expr, $message:expr) => {
        $crate::validate_field!($field, $allowed.contains(&$field.as_str()), $message);
    };
}

/// Optional fields: validate only when present.
pub fn validate_optional<T>(
    value: &Option<T>,
    check: impl FnOnce(&T) -> Result<(), ApiError>,
) -> Result<(), ApiError> {
    match value {
        Some(v) => check(v),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaffSignup {
        full_name: String,
        email: String,
        years_of_practice: i32,
        language: String,
    }

    impl RequestValidation for StaffSignup {
        fn validate(&self) -> Result<(), ApiError> {
            validate_required!(self.full_name, "full_name is required");
            validate_length!(self.full_name, 2, 100, "full_name must be 2-100 characters");
            validate_email!(self.email, "email is not a valid address");
            validate_range!(self.years_of_practice, 0, 70, "years_of_practice is out of range");
            validate_one_of!(self.language, ["en", "fr", "sw"], "language must be en, fr or sw");
            Ok(())
        }
    }

    fn signup() -> StaffSignup {
        StaffSignup {
            full_name: "Wanjiru Kamau".to_string(),
            email: "wanjiru@chelal.test".to_string(),
            years_of_practice: 6,
            language: "sw".to_string(),
        }
    }

    fn rejection(req: StaffSignup) -> String {
        req.validate().unwrap_err().to_string()
    }

    #[test]
    fn complete_signup_passes() {
        assert!(signup().validate().is_ok());
    }

    #[test]
    fn whitespace_name_counts_as_missing() {
        let msg = rejection(StaffSignup { full_name: "   ".into(), ..signup() });
        assert_eq!(msg, "full_name is required");
    }

    #[test]
    fn each_rule_reports_its_own_message() {
        assert_eq!(
            rejection(StaffSignup { email: "wanjiru".into(), ..signup() }),
            "email is not a valid address"
        );
        assert_eq!(
            rejection(StaffSignup { years_of_practice: 71, ..signup() }),
            "years_of_practice is out of range"
        );
        assert_eq!(
            rejection(StaffSignup { language: "de".into(), ..signup() }),
            "language must be en, fr or sw"
        );
    }

    #[test]
    fn absent_optional_fields_are_not_checked() {
        let positive = |v: &i32| {
            if *v > 0 {
                Ok(())
            } else {
                Err(ApiError::validation("must be positive"))
            }
        };
        assert!(validate_optional(&None, positive).is_ok());
        assert!(validate_optional(&Some(3), positive).is_ok());
        assert!(validate_optional(&Some(0), positive).is_err());
    }
}
