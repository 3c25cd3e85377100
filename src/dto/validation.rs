//! Validation helpers for DTOs.

use validator::ValidationError;

/// Minimum number of characters of a username once surrounding whitespace is removed.
pub const MIN_USERNAME_CHARS: usize = 2;

/// Validates that a username keeps at least [`MIN_USERNAME_CHARS`] characters after trimming.
///
/// # Examples
///
/// ```ignore
/// validate_username("Ada")   // Ok
/// validate_username(" A  ")  // Err - one character once trimmed
/// ```
pub fn validate_username(name: &str) -> Result<(), ValidationError> {
    if name.trim().chars().count() < MIN_USERNAME_CHARS {
        let mut err = ValidationError::new("username_length");
        err.message = Some(
            format!("Username must be at least {MIN_USERNAME_CHARS} characters long").into(),
        );
        return Err(err);
    }
    Ok(())
}

/// Validates that a free-text field is not only whitespace.
pub fn validate_not_blank(text: &str) -> Result<(), ValidationError> {
    if text.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("Value must not be blank".into());
        return Err(err);
    }
    Ok(())
}
