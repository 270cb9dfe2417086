//! What each enrichment-API status code means.

use serde_json::Value;

use refinery_shared::Record;

/// Stored in place of a payload when a lookup produced nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorPayload {
    pub error_message: String,
    /// `None` when no response was ever received.
    pub status_code: Option<u16>,
}

impl ErrorPayload {
    /// The table entry for `status`.
    pub fn for_status(status: u16) -> Self {
        let message = match status {
            400 => "Bad Request: the request was malformed or missing a parameter",
            401 => "Unauthorized: invalid API key",
            402 => "Payment Required: over plan quota",
            404 => "Not Found: no record matches the lookup",
            422 => "Unprocessable Entity: invalid parameters",
            429 => "Too Many Requests: rate limited",
            500 => "Internal Server Error",
            502 => "Bad Gateway",
            503 => "Service Unavailable",
            504 => "Gateway Timeout",
            _ => "unknown",
        };
        Self {
            error_message: message.to_string(),
            status_code: Some(status),
        }
    }

    /// For failures with no HTTP status (transport errors, bad config).
    pub fn unknown(message: impl Into<String>) -> Self {
        Self {
            error_message: message.into(),
            status_code: None,
        }
    }

    /// `{"error_message": .., "status_code": <code or "unknown">}`
    pub fn to_record(&self) -> Record {
        let mut record = Record::new();
        record.insert(
            "error_message".into(),
            Value::String(self.error_message.clone()),
        );
        record.insert(
            "status_code".into(),
            self.status_code
                .map_or_else(|| Value::String("unknown".into()), Value::from),
        );
        record
    }
}

/// Statuses worth another attempt: queued (202), rate limited, server errors.
pub fn is_retryable(status: u16) -> bool {
    status == 202 || status == 429 || (500..600).contains(&status)
}
