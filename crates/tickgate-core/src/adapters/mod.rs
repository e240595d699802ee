//! Provider adapters.
//!
//! One module per upstream. Each adapter builds its provider's wire requests,
//! surfaces failures in a form the classifier can tag, and normalizes
//! responses into the common record shapes.

pub mod alphavantage;
pub mod eastmoney;
pub mod finnhub;
pub mod sina;
pub mod tiingo;
pub mod twelvedata;

pub use alphavantage::AlphaVantageAdapter;
pub use eastmoney::EastMoneyAdapter;
pub use finnhub::FinnhubAdapter;
pub use sina::SinaAdapter;
pub use tiingo::TiingoAdapter;
pub use twelvedata::TwelveDataAdapter;

use time::format_description::FormatItem;
use time::macros::format_description;
use time::{Date, Duration, OffsetDateTime};

use crate::http_client::{HttpClient, HttpRequest, HttpResponse};
use crate::provider::SourceError;
use crate::source::ProviderId;

const DATE_FORMAT: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");

/// Execute a request and fold transport/non-2xx failures into `SourceError`.
pub(crate) async fn send_checked(
    http: &dyn HttpClient,
    provider: ProviderId,
    request: HttpRequest,
) -> Result<HttpResponse, SourceError> {
    let response = http
        .execute(request)
        .await
        .map_err(|error| SourceError::transport(provider, error))?;

    if !response.is_success() {
        return Err(SourceError::http(provider, response.status, &response.body));
    }

    Ok(response)
}

/// Lenient numeric parsing for string-typed upstream payloads.
///
/// Handles surrounding whitespace and trailing `%` signs; `None`-style
/// placeholders fail to parse and are dropped by the caller.
pub(crate) fn parse_f64(raw: &str) -> Option<f64> {
    raw.trim().trim_end_matches('%').parse::<f64>().ok()
}

pub(crate) fn date_to_unix(date: &str) -> Option<i64> {
    let parsed = Date::parse(date.trim(), &DATE_FORMAT).ok()?;
    Some(parsed.midnight().assume_utc().unix_timestamp())
}

pub(crate) fn today() -> String {
    format_date(OffsetDateTime::now_utc().date())
}

pub(crate) fn days_ago(days: i64) -> String {
    format_date((OffsetDateTime::now_utc() - Duration::days(days)).date())
}

fn format_date(date: Date) -> String {
    date.format(&DATE_FORMAT)
        .expect("calendar dates always format")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_percent_and_plain_numbers() {
        assert_eq!(parse_f64(" 1.23% "), Some(1.23));
        assert_eq!(parse_f64("150.25"), Some(150.25));
        assert_eq!(parse_f64("None"), None);
        assert_eq!(parse_f64(""), None);
    }

    #[test]
    fn dates_convert_to_unix_midnight() {
        assert_eq!(date_to_unix("2024-01-01"), Some(1_704_067_200));
        assert_eq!(date_to_unix("not-a-date"), None);
    }
}
