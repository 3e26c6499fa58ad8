use serde::Deserialize;

/// Error body returned by the dashboard API (`{ "status": "error", "message": ... }`).
#[derive(Debug, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    /// The main error message
    pub message: String,
    /// Optional additional details about the error
    #[serde(default)]
    pub details: Option<String>,
}

impl ErrorResponse {
    /// Extracts a structured error from a raw response body, if it has one.
    #[must_use]
    pub fn from_body(body: &str) -> Option<Self> {
        serde_json::from_str(body).ok()
    }
}

impl std::fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.details {
            Some(details) => write!(f, "{}: {}", self.message, details),
            None => write!(f, "{}", self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_body_reads_details() {
        let error = ErrorResponse::from_body(
            r#"{"message":"Send failed","details":"WhatsApp window closed"}"#,
        )
        .expect("structured body");
        assert_eq!(error.details.as_deref(), Some("WhatsApp window closed"));
    }

    #[test]
    fn test_from_body_ignores_extra_fields() {
        let error = ErrorResponse::from_body(r#"{"status":"error","message":"Contact not found"}"#)
            .expect("structured body");
        assert_eq!(
            error,
            ErrorResponse {
                message: "Contact not found".into(),
                details: None,
            }
        );
    }

    #[test]
    fn test_from_body_rejects_plain_text() {
        assert!(ErrorResponse::from_body("Bad Gateway").is_none());
    }

    #[test]
    fn test_error_response_display() {
        let plain = ErrorResponse::from_body(r#"{"message":"Simple error"}"#).unwrap();
        assert_eq!(plain.to_string(), "Simple error");

        let detailed =
            ErrorResponse::from_body(r#"{"message":"Main error","details":"Additional info"}"#)
                .unwrap();
        assert_eq!(detailed.to_string(), "Main error: Additional info");
    }
}
