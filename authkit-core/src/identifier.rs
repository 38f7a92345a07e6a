//! User identifiers and local input validation.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::AuthError;

/// Expected length of a verification code.
pub const VERIFICATION_CODE_LENGTH: usize = 6;

const PHONE_MIN_DIGITS: usize = 2;
const PHONE_MAX_DIGITS: usize = 15;

/// How a user is addressed: by email or by phone number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdentifierKind {
    /// An email address.
    Email,
    /// A phone number in international form.
    Phone,
}

/// Connection type used by the code-dispatch endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum ConnectionType {
    /// Code delivered by email.
    Email,
    /// Code delivered by SMS.
    Sms,
}

/// A user-supplied identifier plus its classified type.
///
/// The kind drives both the validation rule applied before any network call
/// and the endpoint/parameter selection on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifier {
    /// The classified identifier type.
    pub kind: IdentifierKind,
    /// The raw identifier value.
    pub value: String,
}

impl Identifier {
    /// Creates an email identifier.
    #[must_use]
    pub fn email(value: impl Into<String>) -> Self {
        Self {
            kind: IdentifierKind::Email,
            value: value.into(),
        }
    }

    /// Creates a phone identifier.
    #[must_use]
    pub fn phone(value: impl Into<String>) -> Self {
        Self {
            kind: IdentifierKind::Phone,
            value: value.into(),
        }
    }

    /// Checks the identifier against its type-specific syntactic rule.
    ///
    /// This is a local check; it is always performed before a network
    /// round-trip is attempted.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidEmail`] or [`AuthError::InvalidPhoneNumber`].
    pub fn validate(&self) -> Result<(), AuthError> {
        match self.kind {
            IdentifierKind::Email if is_valid_email(&self.value) => Ok(()),
            IdentifierKind::Email => Err(AuthError::InvalidEmail),
            IdentifierKind::Phone if is_valid_phone(&self.value) => Ok(()),
            IdentifierKind::Phone => Err(AuthError::InvalidPhoneNumber),
        }
    }

    /// The connection type matching this identifier.
    #[must_use]
    pub const fn connection(&self) -> ConnectionType {
        match self.kind {
            IdentifierKind::Email => ConnectionType::Email,
            IdentifierKind::Phone => ConnectionType::Sms,
        }
    }
}

/// Whether `input` is a well-formed email address: exactly one `@`, a
/// restricted atom charset in the local part, and a dot-separated domain
/// with non-empty labels.
#[must_use]
pub fn is_valid_email(input: &str) -> bool {
    let Some((local, domain)) = input.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    if !local
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '%' | '+' | '-'))
    {
        return false;
    }
    if !domain.contains('.') {
        return false;
    }
    domain.split('.').all(|label| {
        !label.is_empty()
            && label
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}

/// Whether `input` is a well-formed phone number: a `+` prefix followed by
/// digits only, within length bounds.
#[must_use]
pub fn is_valid_phone(input: &str) -> bool {
    let Some(digits) = input.strip_prefix('+') else {
        return false;
    };
    (PHONE_MIN_DIGITS..=PHONE_MAX_DIGITS).contains(&digits.len())
        && digits.chars().all(|c| c.is_ascii_digit())
}

/// Whether `input` is a well-formed verification code: exactly six numeric
/// digits.
#[must_use]
pub fn is_valid_verification_code(input: &str) -> bool {
    let code = input.trim();
    code.len() == VERIFICATION_CODE_LENGTH && code.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("", false; "empty")]
    #[test_case("sdkgmail.com", false; "missing at sign")]
    #[test_case("me@workd@gmail.com", false; "more than one at sign")]
    #[test_case("me_work@gmailcom", false; "missing dot in domain")]
    #[test_case("me.work@gmailcom", false; "dot only before the at sign")]
    #[test_case("mework@gmai.l.com", true; "multiple dots after the at sign")]
    #[test_case("me.work@gmail.com", true; "dot before and after the at sign")]
    #[test_case("mework43@gmail.com", true; "alphanumeric")]
    #[test_case("me_work@gmail.", false; "nothing after the last dot")]
    #[test_case("me_work@.com", false; "nothing before the first domain dot")]
    #[test_case("me#work@gmail.com", false; "hash in local part")]
    #[test_case("me?work@gmail.com", false; "question mark in local part")]
    #[test_case("me&work@gmail.com", false; "ampersand in local part")]
    fn test_email_rule(input: &str, expected: bool) {
        assert_eq!(is_valid_email(input), expected);
    }

    #[test_case("", false; "empty")]
    #[test_case("48398230", false; "prefix identifier missing")]
    #[test_case("+", false; "too short")]
    #[test_case("+7342b23", false; "non digit after prefix")]
    #[test_case("+47523980", true; "correct format")]
    #[test_case("+1234567890123456", false; "too long")]
    fn test_phone_rule(input: &str, expected: bool) {
        assert_eq!(is_valid_phone(input), expected);
    }

    #[test_case("", false; "empty")]
    #[test_case("aaadfc", false; "not a number")]
    #[test_case("a111e1", false; "mixed")]
    #[test_case("01234", false; "too short")]
    #[test_case("0123456", false; "too long")]
    #[test_case("012345", true; "six digits")]
    #[test_case(" 012345 ", true; "six digits padded")]
    fn test_code_rule(input: &str, expected: bool) {
        assert_eq!(is_valid_verification_code(input), expected);
    }

    #[test]
    fn test_validate_maps_to_typed_errors() {
        assert_eq!(
            Identifier::email("not-an-email").validate(),
            Err(AuthError::InvalidEmail)
        );
        assert_eq!(
            Identifier::phone("12345").validate(),
            Err(AuthError::InvalidPhoneNumber)
        );
        assert_eq!(Identifier::email("a@b.com").validate(), Ok(()));
        assert_eq!(Identifier::phone("+4712345678").validate(), Ok(()));
    }

    #[test]
    fn test_connection_type_wire_names() {
        assert_eq!(Identifier::email("a@b.com").connection().to_string(), "email");
        assert_eq!(Identifier::phone("+47").connection().to_string(), "sms");
    }
}
