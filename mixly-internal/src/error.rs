use std::fmt::{Debug, Display};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::OnceCell;

/// Controls whether to include raw provider responses in error output
///
/// When true, `ProviderResponse` errors render the raw response body in logs and in
/// error response bodies. This can expose model output verbatim, so it is off by default.
static DEBUG: OnceCell<bool> = OnceCell::const_new();

pub fn set_debug(debug: bool) -> Result<(), Error> {
    DEBUG.set(debug).map_err(|_| {
        Error::new(ErrorDetails::Config {
            message: "Failed to set debug mode".to_string(),
        })
    })
}

fn debug_enabled() -> bool {
    *DEBUG.get().unwrap_or(&false)
}

/// Chooses between a `Debug` or `Display` representation based on the gateway-level `DEBUG` flag.
pub struct DisplayOrDebugGateway<T: Debug + Display> {
    val: T,
}

impl<T: Debug + Display> DisplayOrDebugGateway<T> {
    pub fn new(val: T) -> Self {
        Self { val }
    }
}

impl<T: Debug + Display> Display for DisplayOrDebugGateway<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if debug_enabled() {
            write!(f, "{:?}", self.val)
        } else {
            write!(f, "{}", self.val)
        }
    }
}

/// A single field-level problem found while validating a request body.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, PartialEq)]
// As long as the struct member is private, we force people to use the `new` method and log the error.
// We box `ErrorDetails` per the `clippy::result_large_err` lint
pub struct Error(Box<ErrorDetails>);

impl Error {
    pub fn new(details: ErrorDetails) -> Self {
        details.log();
        Error(Box::new(details))
    }

    pub fn new_without_logging(details: ErrorDetails) -> Self {
        Error(Box::new(details))
    }

    pub fn status_code(&self) -> StatusCode {
        self.0.status_code()
    }

    pub fn get_details(&self) -> &ErrorDetails {
        &self.0
    }

    pub fn get_owned_details(self) -> ErrorDetails {
        *self.0
    }

    pub fn log(&self) {
        self.0.log();
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

impl std::error::Error for Error {}

impl From<ErrorDetails> for Error {
    fn from(details: ErrorDetails) -> Self {
        Error::new(details)
    }
}

#[derive(Debug, PartialEq)]
pub enum ErrorDetails {
    AppState {
        message: String,
    },
    Config {
        message: String,
    },
    InternalError {
        message: String,
    },
    InvalidRequest {
        message: String,
    },
    JsonRequest {
        message: String,
    },
    /// The request body was well-formed JSON but failed field validation
    Validation {
        violations: Vec<FieldViolation>,
    },
    PaymentMethodUnsupported {
        payment_method: String,
    },
    PaymentNotCompleted {
        uid: String,
    },
    /// Wraps whatever made a premium grant fail after payment was accepted
    PremiumUpgradeFailed {
        message: String,
    },
    /// The suggestion provider could not be reached or answered with a failure
    ProviderFailure {
        provider_type: String,
        message: String,
        status_code: Option<StatusCode>,
    },
    /// The suggestion provider answered, but not with a usable suggestion
    ProviderResponse {
        provider_type: String,
        message: String,
        raw_response: Option<String>,
    },
    RouteNotFound {
        path: String,
        method: String,
    },
    Serialization {
        message: String,
    },
    StorageUnavailable {
        backend: String,
        message: String,
    },
    UsageRecordNotFound {
        uid: String,
    },
}

impl ErrorDetails {
    /// Defines the error level for logging this error
    fn level(&self) -> tracing::Level {
        match self {
            ErrorDetails::AppState { .. } => tracing::Level::ERROR,
            ErrorDetails::Config { .. } => tracing::Level::ERROR,
            ErrorDetails::InternalError { .. } => tracing::Level::ERROR,
            ErrorDetails::InvalidRequest { .. } => tracing::Level::WARN,
            ErrorDetails::JsonRequest { .. } => tracing::Level::WARN,
            ErrorDetails::Validation { .. } => tracing::Level::WARN,
            ErrorDetails::PaymentMethodUnsupported { .. } => tracing::Level::WARN,
            ErrorDetails::PaymentNotCompleted { .. } => tracing::Level::WARN,
            ErrorDetails::PremiumUpgradeFailed { .. } => tracing::Level::ERROR,
            ErrorDetails::ProviderFailure { .. } => tracing::Level::ERROR,
            ErrorDetails::ProviderResponse { .. } => tracing::Level::ERROR,
            ErrorDetails::RouteNotFound { .. } => tracing::Level::WARN,
            ErrorDetails::Serialization { .. } => tracing::Level::ERROR,
            ErrorDetails::StorageUnavailable { .. } => tracing::Level::ERROR,
            ErrorDetails::UsageRecordNotFound { .. } => tracing::Level::ERROR,
        }
    }

    /// Defines the HTTP status code for responses involving this error
    fn status_code(&self) -> StatusCode {
        match self {
            ErrorDetails::AppState { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorDetails::Config { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorDetails::InternalError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorDetails::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            ErrorDetails::JsonRequest { .. } => StatusCode::BAD_REQUEST,
            ErrorDetails::Validation { .. } => StatusCode::BAD_REQUEST,
            ErrorDetails::PaymentMethodUnsupported { .. } => StatusCode::BAD_REQUEST,
            ErrorDetails::PaymentNotCompleted { .. } => StatusCode::PAYMENT_REQUIRED,
            ErrorDetails::PremiumUpgradeFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorDetails::ProviderFailure { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorDetails::ProviderResponse { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorDetails::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            ErrorDetails::Serialization { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorDetails::StorageUnavailable { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorDetails::UsageRecordNotFound { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Log the error using the `tracing` library
    pub fn log(&self) {
        match self.level() {
            tracing::Level::ERROR => tracing::error!("{self}"),
            tracing::Level::WARN => tracing::warn!("{self}"),
            tracing::Level::INFO => tracing::info!("{self}"),
            tracing::Level::DEBUG => tracing::debug!("{self}"),
            tracing::Level::TRACE => tracing::trace!("{self}"),
        }
    }
}

impl std::fmt::Display for ErrorDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorDetails::AppState { message } => {
                write!(f, "Error initializing AppState: {message}")
            }
            ErrorDetails::Config { message } => write!(f, "{message}"),
            ErrorDetails::InternalError { message } => write!(f, "Internal error: {message}"),
            ErrorDetails::InvalidRequest { message } => write!(f, "{message}"),
            ErrorDetails::JsonRequest { message } => write!(f, "{message}"),
            ErrorDetails::Validation { violations } => {
                let fields = violations
                    .iter()
                    .map(|v| format!("`{}`: {}", v.field, v.message))
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "Invalid request data: {fields}")
            }
            ErrorDetails::PaymentMethodUnsupported { payment_method } => write!(
                f,
                "{payment_method} integration not yet configured. Please try again later."
            ),
            ErrorDetails::PaymentNotCompleted { uid } => {
                write!(f, "Payment was not completed for user `{uid}`")
            }
            ErrorDetails::PremiumUpgradeFailed { message } => {
                write!(f, "Failed to grant premium: {message}")
            }
            ErrorDetails::ProviderFailure {
                provider_type,
                message,
                status_code,
            } => match status_code {
                Some(status) => write!(
                    f,
                    "Suggestion provider `{provider_type}` failed with status {status}: {message}"
                ),
                None => write!(f, "Suggestion provider `{provider_type}` failed: {message}"),
            },
            ErrorDetails::ProviderResponse {
                provider_type,
                message,
                raw_response,
            } => {
                write!(
                    f,
                    "Suggestion provider `{provider_type}` returned an unusable response: {message}"
                )?;
                if debug_enabled() {
                    if let Some(raw_response) = raw_response {
                        write!(f, "\nRaw response: {raw_response}")?;
                    }
                }
                Ok(())
            }
            ErrorDetails::RouteNotFound { path, method } => {
                write!(f, "Route not found: {method} {path}")
            }
            ErrorDetails::Serialization { message } => write!(f, "{message}"),
            ErrorDetails::StorageUnavailable { backend, message } => {
                write!(f, "Usage record storage `{backend}` is unavailable: {message}")
            }
            ErrorDetails::UsageRecordNotFound { uid } => {
                write!(f, "Usage record not found for uid `{uid}`")
            }
        }
    }
}

impl Error {
    /// Builds the status code and JSON body returned to HTTP clients.
    ///
    /// Provider and storage failures are reported with a generic, actionable message;
    /// the detailed cause has already been logged when the error was constructed.
    pub fn to_response_json(&self) -> (StatusCode, Value) {
        let body = match self.get_details() {
            ErrorDetails::Validation { violations } => json!({
                "error": "Invalid request data",
                "details": violations,
            }),
            ErrorDetails::ProviderFailure { .. } | ErrorDetails::ProviderResponse { .. } => {
                json!({"error": "Failed to get cocktail suggestion. Please try again."})
            }
            ErrorDetails::StorageUnavailable { .. } | ErrorDetails::UsageRecordNotFound { .. } => {
                json!({"error": "Failed to process request. Please try again."})
            }
            ErrorDetails::PremiumUpgradeFailed { .. } => {
                json!({"error": "Failed to process premium upgrade. Please try again."})
            }
            _ => json!({"error": self.to_string()}),
        };
        (self.status_code(), body)
    }
}

impl IntoResponse for Error {
    /// Log the error and convert it into an Axum response
    fn into_response(self) -> Response {
        let (status_code, body) = self.to_response_json();
        (status_code, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_response() {
        let error = Error::new(ErrorDetails::Validation {
            violations: vec![
                FieldViolation::new("mood", "Please select a mood"),
                FieldViolation::new("uid", "User ID is required"),
            ],
        });

        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(error.get_details().level(), tracing::Level::WARN);

        let (status, body) = error.to_response_json();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid request data");
        assert_eq!(body["details"][0]["field"], "mood");
        assert_eq!(body["details"][1]["message"], "User ID is required");
    }

    #[test]
    fn test_validation_error_display() {
        let details = ErrorDetails::Validation {
            violations: vec![FieldViolation::new("liquor", "Please select a liquor type")],
        };
        assert_eq!(
            format!("{details}"),
            "Invalid request data: `liquor`: Please select a liquor type"
        );
    }

    #[test]
    fn test_provider_errors_hide_details_from_clients() {
        let error = Error::new(ErrorDetails::ProviderResponse {
            provider_type: "openai".to_string(),
            message: "missing field `garnish`".to_string(),
            raw_response: Some("{\"drinkName\": \"Negroni\"}".to_string()),
        });

        let (status, body) = error.to_response_json();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body,
            json!({"error": "Failed to get cocktail suggestion. Please try again."})
        );
    }

    #[test]
    fn test_payment_errors() {
        let unsupported = Error::new(ErrorDetails::PaymentMethodUnsupported {
            payment_method: "Stripe".to_string(),
        });
        assert_eq!(unsupported.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            unsupported.to_string(),
            "Stripe integration not yet configured. Please try again later."
        );

        let not_completed = Error::new(ErrorDetails::PaymentNotCompleted {
            uid: "u1".to_string(),
        });
        assert_eq!(not_completed.status_code(), StatusCode::PAYMENT_REQUIRED);
    }

    #[test]
    fn test_error_into_response() {
        let error = Error::new(ErrorDetails::RouteNotFound {
            path: "/nope".to_string(),
            method: "GET".to_string(),
        });

        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
