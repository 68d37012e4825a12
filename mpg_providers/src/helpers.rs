use chrono::{DateTime, FixedOffset, NaiveDateTime, Offset, TimeZone, Utc};
use log::*;
use mpg_engine::traits::ProviderError;

/// Both networks report local times in China Standard Time
const CST_OFFSET_SECS: i32 = 8 * 3600;

pub fn request_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(e.to_string())
    } else if e.is_decode() {
        ProviderError::MalformedResponse(e.to_string())
    } else {
        ProviderError::Network(e.to_string())
    }
}

pub fn http_client(timeout: std::time::Duration) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ProviderError::Configuration(format!("Could not build HTTP client. {e}")))
}

pub fn cst() -> FixedOffset {
    FixedOffset::east_opt(CST_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

/// Parses `yyyy-MM-dd HH:mm:ss` in China Standard Time
pub fn parse_cst_time(s: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map_err(|e| warn!("🪪️ Ignoring unparseable provider time '{s}'. {e}"))
        .ok()?;
    cst().from_local_datetime(&naive).single().map(|t| t.with_timezone(&Utc))
}

pub fn format_cst_time(t: &DateTime<Utc>) -> String {
    t.with_timezone(&cst()).format("%Y-%m-%d %H:%M:%S").to_string()
}
