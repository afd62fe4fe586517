//! TTL duration grammar: `<n>h`, `<n>d` or `<n>w`.

use chrono::Duration;

use crate::error::{Error, Result};

/// Parses a TTL duration such as `7d`, `36h` or `2w`.
///
/// # Errors
///
/// Returns [`Error::InvalidDuration`] for anything else.
pub fn parse_duration(raw: &str) -> Result<Duration> {
    let trimmed = raw.trim();
    let invalid = || Error::InvalidDuration(raw.to_string());

    let unit = trimmed.chars().last().ok_or_else(invalid)?;
    let digits = &trimmed[..trimmed.len() - unit.len_utf8()];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let count = i64::from(digits.parse::<u32>().map_err(|_| invalid())?);

    match unit.to_ascii_lowercase() {
        'h' => Ok(Duration::hours(count)),
        'd' => Ok(Duration::days(count)),
        'w' => Ok(Duration::weeks(count)),
        _ => Err(invalid()),
    }
}

/// Renders a duration in the largest unit that divides it evenly.
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let hours = duration.num_hours();
    if hours != 0 && hours % (24 * 7) == 0 {
        format!("{}w", hours / (24 * 7))
    } else if hours % 24 == 0 {
        format!("{}d", hours / 24)
    } else {
        format!("{hours}h")
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_units() {
        assert_eq!(parse_duration("7d").unwrap(), Duration::days(7));
        assert_eq!(parse_duration("36h").unwrap(), Duration::hours(36));
        assert_eq!(parse_duration("2w").unwrap(), Duration::weeks(2));
        assert_eq!(parse_duration(" 21D ").unwrap(), Duration::days(21));
        assert_eq!(parse_duration("0d").unwrap(), Duration::zero());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for raw in ["", "d", "7", "7m", "-1d", "1.5d", "7 d", "99999999999d", "7é"] {
            assert!(parse_duration(raw).is_err(), "{raw:?} should be rejected");
        }
    }

    #[test]
    fn test_format() {
        assert_eq!(format_duration(Duration::days(7)), "1w");
        assert_eq!(format_duration(Duration::days(8)), "8d");
        assert_eq!(format_duration(Duration::hours(36)), "36h");
    }
}
