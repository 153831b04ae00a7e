use std::time::Duration;

use super::RegistryError;

const HOUR: u64 = 60 * 60;
const DAY: u64 = 24 * HOUR;
const MONTH: u64 = 30 * DAY;
const YEAR: u64 = 365 * DAY;

/// Parse `<n><unit>`: `h` hours, `d` days, `m` 30-day months, `a` 365-day
/// years. Case-insensitive, surrounding whitespace ignored, `n` >= 1.
pub fn parse_duration(token: &str) -> Result<Duration, RegistryError> {
    let invalid = || RegistryError::InvalidDuration {
        token: token.to_string(),
    };

    let normalized = token.trim().to_ascii_lowercase();
    let mut chars = normalized.chars();
    let unit = chars.next_back().ok_or_else(invalid)?;
    let magnitude = chars.as_str();

    if magnitude.is_empty() || !magnitude.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let n: u64 = magnitude.parse().map_err(|_| invalid())?;
    if n == 0 {
        return Err(invalid());
    }

    let unit_secs = match unit {
        'h' => HOUR,
        'd' => DAY,
        'm' => MONTH,
        'a' => YEAR,
        _ => return Err(invalid()),
    };
    n.checked_mul(unit_secs)
        .map(Duration::from_secs)
        .ok_or_else(invalid)
}
