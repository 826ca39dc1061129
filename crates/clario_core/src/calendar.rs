use crate::error::AppError;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, UtcOffset};

pub fn local_offset() -> UtcOffset {
    UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC)
}

/// Offset used to cut timestamps into calendar days: the configured one, else local.
pub fn resolve_offset(configured: Option<&str>) -> Result<UtcOffset, AppError> {
    match configured {
        Some(raw) if !raw.trim().is_empty() => parse_utc_offset(raw),
        _ => Ok(local_offset()),
    }
}

pub fn parse_utc_offset(raw: &str) -> Result<UtcOffset, AppError> {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("z") || trimmed.eq_ignore_ascii_case("utc") {
        return Ok(UtcOffset::UTC);
    }

    let format = format_description!("[offset_hour sign:mandatory]:[offset_minute]");
    UtcOffset::parse(trimmed, &format)
        .map_err(|_| AppError::invalid_input(format!("utc offset must look like +HH:MM, got '{trimmed}'")))
}

pub fn parse_timestamp(raw: &str) -> Result<OffsetDateTime, AppError> {
    OffsetDateTime::parse(raw.trim(), &Rfc3339)
        .map_err(|_| AppError::invalid_input("datetime must be RFC3339"))
}

pub fn format_timestamp(value: OffsetDateTime) -> Result<String, AppError> {
    value
        .to_offset(UtcOffset::UTC)
        .format(&Rfc3339)
        .map_err(|err| AppError::invalid_data(err.to_string()))
}

pub fn day_of(value: OffsetDateTime, offset: UtcOffset) -> Date {
    value.to_offset(offset).date()
}

pub fn now_in(offset: UtcOffset) -> OffsetDateTime {
    OffsetDateTime::now_utc().to_offset(offset)
}
