use std::time::{SystemTime, UNIX_EPOCH};

use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use uuid::Uuid;

use crate::DomainResult;
use crate::error::DomainError;

pub fn uuid_v7_without_dashes() -> String {
    Uuid::now_v7().simple().to_string()
}

pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

pub fn format_ms_rfc3339(epoch_ms: i64) -> String {
    let fallback = OffsetDateTime::from_unix_timestamp(0).unwrap_or(OffsetDateTime::UNIX_EPOCH);
    let value =
        OffsetDateTime::from_unix_timestamp_nanos(epoch_ms as i128 * 1_000_000).unwrap_or(fallback);
    value
        .format(&Rfc3339)
        .unwrap_or("1970-01-01T00:00:00Z".to_string())
}

pub fn parse_rfc3339_ms(field: &str, value: &str) -> DomainResult<i64> {
    let datetime = OffsetDateTime::parse(value.trim(), &Rfc3339).map_err(|_| {
        DomainError::Validation(format!("{field} must be an RFC 3339 timestamp"))
    })?;
    Ok((datetime.unix_timestamp_nanos() / 1_000_000) as i64)
}

pub fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc3339_round_trips_through_epoch_ms() {
        let ms = parse_rfc3339_ms("meet_time", "2030-05-01T12:30:00Z").unwrap();
        assert_eq!(ms, 1_903_869_000_000);
        assert_eq!(format_ms_rfc3339(ms), "2030-05-01T12:30:00Z");
    }

    #[test]
    fn parse_rfc3339_rejects_free_text() {
        let err = parse_rfc3339_ms("meet_time", "next tuesday").unwrap_err();
        assert!(matches!(err, DomainError::Validation(message) if message.contains("meet_time")));
    }

    #[test]
    fn non_blank_trims_whitespace() {
        assert_eq!(non_blank(Some("  library  ")), Some("library"));
        assert_eq!(non_blank(Some("   ")), None);
        assert_eq!(non_blank(None), None);
    }
}
