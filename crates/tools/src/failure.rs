//! Classify tool failures into coarse kinds with a suggestion the agent
//! can embed in its reply.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    ValidationError,
    ApiError,
    Unknown,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailureContext {
    pub kind: FailureKind,
    pub suggestion: String,
}

/// Map a raw tool error message to a failure kind and a human-friendly
/// suggestion.
pub fn classify_failure(error: &str) -> FailureContext {
    let lowered = error.to_lowercase();

    let kind = if lowered.contains("timeout") || lowered.contains("timed out") {
        FailureKind::Timeout
    } else if lowered.contains("invalid input") || lowered.contains("schema") {
        FailureKind::ValidationError
    } else if lowered.contains("http")
        || lowered.contains("unavailable")
        || lowered.contains("status")
        || lowered.contains("connection")
    {
        FailureKind::ApiError
    } else {
        FailureKind::Unknown
    };

    let suggestion = match kind {
        FailureKind::Timeout => {
            "The system is taking longer than usual. Let the customer know you are \
             still checking and will follow up shortly."
        }
        FailureKind::ValidationError => {
            "Some details look incomplete or malformed. Ask the customer to confirm \
             the exact order number or reference."
        }
        FailureKind::ApiError => {
            "A backend system is temporarily unavailable. Apologize briefly and offer \
             to retry or follow up."
        }
        FailureKind::Unknown => {
            "Something unexpected went wrong. Offer an alternative or a human \
             follow-up rather than guessing."
        }
    };

    FailureContext {
        kind,
        suggestion: suggestion.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_common_messages() {
        assert_eq!(classify_failure("timeout: handler exceeded 15s").kind, FailureKind::Timeout);
        assert_eq!(
            classify_failure("invalid input: /order_no: 42 is not of type string").kind,
            FailureKind::ValidationError
        );
        assert_eq!(
            classify_failure("HTTP: oms returned status 503").kind,
            FailureKind::ApiError
        );
        assert_eq!(
            classify_failure("oms is temporarily unavailable").kind,
            FailureKind::ApiError
        );
        assert_eq!(classify_failure("something odd").kind, FailureKind::Unknown);
    }

    #[test]
    fn suggestion_is_never_empty() {
        for msg in ["timeout", "schema", "http 500", "???"] {
            assert!(!classify_failure(msg).suggestion.is_empty());
        }
    }
}
