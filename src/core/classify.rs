//! Maps raw transport failures onto the fixed [`ErrorKind`] taxonomy.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::error::{ClassifiedError, ErrorKind, TransportError};

/// Deterministically classifies a transport failure.
///
/// | Condition                         | Kind                 | Retryable |
/// |-----------------------------------|----------------------|-----------|
/// | timeout / abort                   | `Timeout`            | yes       |
/// | connection failure                | `ConnectionReset`    | yes       |
/// | 503 or "maintenance" in the body  | `ServiceUnavailable` | yes       |
/// | 429                               | `RateLimited`        | yes       |
/// | 401 / 403                         | `AuthError`          | no        |
/// | 408                               | `Timeout`            | yes       |
/// | other 4xx                         | `ClientError`        | no        |
/// | anything else                     | `Unknown`            | yes       |
#[must_use]
pub fn classify(error: &TransportError) -> ClassifiedError {
    match error {
        TransportError::Timeout | TransportError::Aborted => {
            ClassifiedError::new(ErrorKind::Timeout, error.to_string())
        }
        TransportError::Connect(msg) => {
            if mentions_maintenance(msg) {
                ClassifiedError::new(ErrorKind::ServiceUnavailable, msg.clone())
            } else {
                ClassifiedError::new(ErrorKind::ConnectionReset, msg.clone())
            }
        }
        TransportError::Status {
            status,
            retry_after,
            body,
        } => classify_status(*status, *retry_after, body.as_deref()),
        TransportError::Other(msg) => {
            let kind = if mentions_maintenance(msg) {
                ErrorKind::ServiceUnavailable
            } else {
                ErrorKind::Unknown
            };
            ClassifiedError::new(kind, msg.clone())
        }
    }
}

fn classify_status(status: u16, retry_after: Option<Duration>, body: Option<&str>) -> ClassifiedError {
    let body_mentions_maintenance = body.is_some_and(mentions_maintenance);
    let message = format!("server responded with status {status}");

    let err = match status {
        503 => ClassifiedError::new(ErrorKind::ServiceUnavailable, message),
        429 => ClassifiedError::new(ErrorKind::RateLimited, message)
            .with_retry_after(retry_after.or_else(|| body.and_then(retry_after_from_body))),
        401 | 403 => ClassifiedError::new(ErrorKind::AuthError, message),
        408 => ClassifiedError::new(ErrorKind::Timeout, message),
        _ if body_mentions_maintenance => {
            ClassifiedError::new(ErrorKind::ServiceUnavailable, message)
        }
        400..=499 => ClassifiedError::new(ErrorKind::ClientError, message),
        _ => ClassifiedError::new(ErrorKind::Unknown, message),
    };
    err.with_status(status)
}

fn mentions_maintenance(text: &str) -> bool {
    text.to_ascii_lowercase().contains("maintenance")
}

/// Parses a `Retry-After` header value: delta-seconds or an HTTP-date.
#[must_use]
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    parse_retry_after_at(value, Utc::now())
}

fn parse_retry_after_at(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let when = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    // A date in the past means "now".
    Some((when - now).to_std().unwrap_or(Duration::ZERO))
}

/// Rate-limited APIs often put the hint in the JSON body instead of a header.
fn retry_after_from_body(body: &str) -> Option<Duration> {
    let v: Value = serde_json::from_str(body).ok()?;
    let hint = v
        .get("retry_after")
        .or_else(|| v.get("retryAfter"))
        .or_else(|| v.get("error").and_then(|e| e.get("retry_after")))?;
    match hint {
        Value::Number(n) => n.as_f64().filter(|s| *s >= 0.0).map(Duration::from_secs_f64),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|s| *s >= 0.0).map(Duration::from_secs_f64),
        _ => None,
    }
}
