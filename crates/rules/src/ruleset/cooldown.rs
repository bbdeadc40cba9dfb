use std::time::Duration;

/// Parse a human-readable duration string into a [`Duration`].
///
/// Supports components: `Xd` (days), `Xh` (hours), `Xm` (minutes), `Xs` (seconds).
/// Components can be combined: "2h30m", "1d12h", "90s". A bare number is
/// seconds. Returns `None` if the string is empty or unparseable.
pub fn parse_cooldown(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    let mut total_secs: u64 = 0;
    let mut digits = String::new();
    let mut found_unit = false;

    for ch in s.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            continue;
        }
        let n: u64 = digits.parse().ok()?;
        digits.clear();
        let unit = match ch {
            'd' => 86_400,
            'h' => 3_600,
            'm' => 60,
            's' => 1,
            _ => return None,
        };
        total_secs = total_secs.checked_add(n.checked_mul(unit)?)?;
        found_unit = true;
    }

    if !digits.is_empty() {
        // "30m15" is ambiguous.
        if found_unit {
            return None;
        }
        total_secs = digits.parse().ok()?;
    }

    Some(Duration::from_secs(total_secs))
}
