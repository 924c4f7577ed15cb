//! Validation helpers for DTOs.

use validator::ValidationError;

/// Largest page accepted by list endpoints and slash commands.
pub const MAX_PAGE_SIZE: usize = 100;

/// Parses the optional size argument of a slash command (`/leaderboard 5`).
///
/// Blank text means "use the default"; anything else must be an integer in
/// `1..=MAX_PAGE_SIZE`.
///
/// # Examples
///
/// ```ignore
/// validate_limit_text("")    // Ok(None)
/// validate_limit_text(" 5 ") // Ok(Some(5))
/// validate_limit_text("0")   // Err - out of range
/// validate_limit_text("ten") // Err - not a number
/// ```
pub fn validate_limit_text(text: &str) -> Result<Option<usize>, ValidationError> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }

    let Ok(limit) = text.parse::<usize>() else {
        let mut err = ValidationError::new("limit_format");
        err.message = Some(format!("`{text}` is not a number").into());
        return Err(err);
    };

    if !(1..=MAX_PAGE_SIZE).contains(&limit) {
        let mut err = ValidationError::new("limit_range");
        err.message = Some(format!("limit must be between 1 and {MAX_PAGE_SIZE}").into());
        return Err(err);
    }

    Ok(Some(limit))
}
