//! Timestamps used in stash labels and config backup names.

/// Current UTC time as `YYYYMMDDhhmmss`.
pub fn compact_timestamp() -> String {
    let now = time::OffsetDateTime::now_utc();
    time::format_description::parse("[year][month][day][hour][minute][second]")
        .ok()
        .and_then(|format| now.format(&format).ok())
        .unwrap_or_else(|| now.unix_timestamp().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_is_fourteen_digits() {
        let stamp = compact_timestamp();
        assert_eq!(stamp.len(), 14);
        assert!(stamp.chars().all(|c| c.is_ascii_digit()));
    }
}
