//! Token lifetime parsing and display.
//!
//! The login endpoint reports `expiresIn` either as a number of seconds or as
//! a short duration string such as `"15m"`. Everything here works in
//! milliseconds because expiry timestamps are persisted as epoch millis.

use serde_json::Value;

/// Lifetime assumed when the server does not say (30 minutes).
pub const DEFAULT_TOKEN_LIFETIME_MS: i64 = 30 * 60 * 1000;

const SECOND_MS: i64 = 1000;
const MINUTE_MS: i64 = 60 * SECOND_MS;
const HOUR_MS: i64 = 60 * MINUTE_MS;
const DAY_MS: i64 = 24 * HOUR_MS;

/// Convert an `expiresIn` value to a lifetime in milliseconds.
///
/// Numbers are seconds. Strings are `<n>s`, `<n>m`, `<n>h` or `<n>d`; a
/// string without a recognised unit is read as seconds. Anything else falls
/// back to [`DEFAULT_TOKEN_LIFETIME_MS`].
///
/// ```
/// use serde_json::json;
/// use tasty_bites_core::parse_expires_in;
///
/// assert_eq!(parse_expires_in(&json!(900)), 900_000);
/// assert_eq!(parse_expires_in(&json!("15m")), 900_000);
/// assert_eq!(parse_expires_in(&json!("2h")), 7_200_000);
/// assert_eq!(parse_expires_in(&json!(null)), 1_800_000);
/// ```
#[must_use]
pub fn parse_expires_in(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| {
                #[allow(clippy::cast_possible_truncation)]
                n.as_f64().map(|f| f as i64)
            })
            .map_or(DEFAULT_TOKEN_LIFETIME_MS, |secs| secs.saturating_mul(SECOND_MS)),
        Value::String(s) => parse_duration_str(s.trim()).unwrap_or(DEFAULT_TOKEN_LIFETIME_MS),
        _ => DEFAULT_TOKEN_LIFETIME_MS,
    }
}

fn parse_duration_str(s: &str) -> Option<i64> {
    let unit = s.chars().last()?;
    let body = s.get(..s.len() - unit.len_utf8())?;
    let (digits, scale) = match unit.to_ascii_lowercase() {
        's' => (body, SECOND_MS),
        'm' => (body, MINUTE_MS),
        'h' => (body, HOUR_MS),
        'd' => (body, DAY_MS),
        _ => (s, SECOND_MS),
    };
    digits.trim().parse::<i64>().ok().map(|n| n.saturating_mul(scale))
}

/// Human-readable remaining lifetime, e.g. `"1h 5m"`.
///
/// ```
/// use tasty_bites_core::format_remaining;
///
/// assert_eq!(format_remaining(0), "Expired");
/// assert_eq!(format_remaining(30_000), "Less than 1m");
/// assert_eq!(format_remaining(4 * 60_000), "4m");
/// assert_eq!(format_remaining(65 * 60_000), "1h 5m");
/// assert_eq!(format_remaining(26 * 60 * 60_000), "1d 2h");
/// ```
#[must_use]
pub fn format_remaining(remaining_ms: i64) -> String {
    if remaining_ms <= 0 {
        return "Expired".to_string();
    }

    let minutes = remaining_ms / MINUTE_MS;
    let hours = minutes / 60;
    let days = hours / 24;

    if days > 0 {
        format!("{days}d {}h", hours % 24)
    } else if hours > 0 {
        format!("{hours}h {}m", minutes % 60)
    } else if minutes > 0 {
        format!("{minutes}m")
    } else {
        "Less than 1m".to_string()
    }
}
