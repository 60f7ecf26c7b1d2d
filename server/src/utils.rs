use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

// Current wall clock in milliseconds since the Unix epoch
pub fn server_time_ms() -> u64 {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis();
    millis.min(u64::MAX as u128) as u64
}

/// Trims `raw` and caps it at `max` characters.
///
/// Returns `None` when nothing is left after trimming.
pub fn trim_and_cap(raw: &str, max: usize) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let capped: String = trimmed.chars().take(max).collect();
    Some(capped.trim_end().to_string())
}

// Converts a monotonic deadline into wall-clock milliseconds for clients
pub fn deadline_to_wall_ms(deadline: Instant, now: Instant, server_time: u64) -> u64 {
    let remaining = deadline.saturating_duration_since(now).as_millis();
    server_time.saturating_add(remaining.min(u64::MAX as u128) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_time_advances() {
        let first = server_time_ms();
        std::thread::sleep(Duration::from_millis(2));
        assert!(server_time_ms() > first);
    }

    #[test]
    fn test_trim_and_cap() {
        assert_eq!(trim_and_cap("  alpha ", 32), Some("alpha".to_string()));
        assert_eq!(trim_and_cap("abcdef", 3), Some("abc".to_string()));
        // Cut lands on a space
        assert_eq!(trim_and_cap("ab cd", 3), Some("ab".to_string()));
        assert_eq!(trim_and_cap("héllo", 2), Some("hé".to_string()));
        assert_eq!(trim_and_cap(" \t ", 8), None);
    }

    #[test]
    fn test_deadline_in_future() {
        let now = Instant::now();
        let deadline = now + Duration::from_millis(3_000);
        assert_eq!(deadline_to_wall_ms(deadline, now, 10_000), 13_000);
    }

    #[test]
    fn test_deadline_in_past_clamps_to_now() {
        let now = Instant::now() + Duration::from_secs(5);
        let deadline = now - Duration::from_secs(1);
        assert_eq!(deadline_to_wall_ms(deadline, now, 10_000), 10_000);
    }
}
