//! Password policy of an identity directory

use crate::error::{AppError, Result};
use chrono::Duration;
use serde_json::{json, Value};
use validator::Validate;

/// Lowest minimum length any directory in this stack may declare
pub const MIN_PASSWORD_LENGTH_FLOOR: u32 = 8;

const MAX_TEMP_PASSWORD_VALIDITY_DAYS: i64 = 365;

/// Password policy configuration
#[derive(Debug, Clone, PartialEq, Validate)]
pub struct PasswordPolicy {
    /// Minimum password length
    #[validate(range(min = 8, max = 99))]
    pub min_length: u32,
    pub require_lowercase: bool,
    pub require_uppercase: bool,
    pub require_digits: bool,
    pub require_symbols: bool,
    /// How long an administrator-issued temporary password stays usable
    pub temp_password_validity: Duration,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: MIN_PASSWORD_LENGTH_FLOOR,
            require_lowercase: true,
            require_uppercase: true,
            require_digits: true,
            require_symbols: true,
            temp_password_validity: Duration::days(7),
        }
    }
}

impl PasswordPolicy {
    /// Check the policy itself: length floor, all four character classes,
    /// and a temporary-password validity of whole days up to a year.
    pub fn check(&self) -> Result<()> {
        self.validate()
            .map_err(|e| AppError::invalid("password_policy", e))?;

        let missing: Vec<&str> = [
            ("require_lowercase", self.require_lowercase),
            ("require_uppercase", self.require_uppercase),
            ("require_digits", self.require_digits),
            ("require_symbols", self.require_symbols),
        ]
        .into_iter()
        .filter(|(_, required)| !required)
        .map(|(name, _)| name)
        .collect();
        if !missing.is_empty() {
            return Err(AppError::invalid(
                "password_policy",
                format!("character classes must all be required, missing: {}", missing.join(", ")),
            ));
        }

        let validity = self.temp_password_validity;
        if validity < Duration::zero() || validity != Duration::days(validity.num_days()) {
            return Err(AppError::invalid(
                "password_policy.temp_password_validity",
                format!("must be a whole number of days (received {}s)", validity.num_seconds()),
            ));
        }
        if validity.num_days() > MAX_TEMP_PASSWORD_VALIDITY_DAYS {
            return Err(AppError::invalid(
                "password_policy.temp_password_validity",
                format!(
                    "cannot be greater than {} days (received {})",
                    MAX_TEMP_PASSWORD_VALIDITY_DAYS,
                    validity.num_days()
                ),
            ));
        }
        Ok(())
    }

    pub(crate) fn render(&self) -> Value {
        json!({
            "PasswordPolicy": {
                "MinimumLength": self.min_length,
                "RequireLowercase": self.require_lowercase,
                "RequireUppercase": self.require_uppercase,
                "RequireNumbers": self.require_digits,
                "RequireSymbols": self.require_symbols,
                "TemporaryPasswordValidityDays": self.temp_password_validity.num_days(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_password_policy_default() {
        let policy = PasswordPolicy::default();
        assert_eq!(policy.min_length, 8);
        assert!(policy.require_uppercase);
        assert!(policy.require_lowercase);
        assert!(policy.require_digits);
        assert!(policy.require_symbols);
        assert!(policy.check().is_ok());
    }

    #[rstest]
    #[case(7)]
    #[case(0)]
    #[case(100)]
    fn test_min_length_out_of_range_rejected(#[case] min_length: u32) {
        let policy = PasswordPolicy {
            min_length,
            ..Default::default()
        };
        let err = policy.check().unwrap_err();
        assert!(err.to_string().contains("min_length"));
    }

    #[rstest]
    #[case::lowercase(PasswordPolicy { require_lowercase: false, ..Default::default() }, "require_lowercase")]
    #[case::uppercase(PasswordPolicy { require_uppercase: false, ..Default::default() }, "require_uppercase")]
    #[case::digits(PasswordPolicy { require_digits: false, ..Default::default() }, "require_digits")]
    #[case::symbols(PasswordPolicy { require_symbols: false, ..Default::default() }, "require_symbols")]
    fn test_missing_character_class_rejected(#[case] policy: PasswordPolicy, #[case] field: &str) {
        let err = policy.check().unwrap_err();
        assert!(err.to_string().contains(field));
    }

    #[test]
    fn test_temp_password_validity_must_be_whole_days() {
        let policy = PasswordPolicy {
            temp_password_validity: Duration::hours(36),
            ..Default::default()
        };
        assert!(policy.check().is_err());
    }

    #[test]
    fn test_temp_password_validity_capped_at_a_year() {
        let policy = PasswordPolicy {
            temp_password_validity: Duration::days(366),
            ..Default::default()
        };
        let err = policy.check().unwrap_err();
        assert!(err.to_string().contains("365"));
    }

    #[test]
    fn test_render() {
        let policy = PasswordPolicy {
            temp_password_validity: Duration::days(3),
            ..Default::default()
        };
        let rendered = policy.render();
        assert_eq!(rendered["PasswordPolicy"]["MinimumLength"], 8);
        assert_eq!(rendered["PasswordPolicy"]["RequireNumbers"], true);
        assert_eq!(rendered["PasswordPolicy"]["TemporaryPasswordValidityDays"], 3);
    }
}
