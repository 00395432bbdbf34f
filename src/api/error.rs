use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use crate::secrets::SecretsError;

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    ServiceUnavailable(String),
    Internal(String),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let (error_kind, message) = match self {
            ApiError::NotFound(msg) => ("not_found", msg),
            ApiError::ServiceUnavailable(msg) => ("service_unavailable", msg),
            ApiError::Internal(msg) => ("internal_error", msg),
        };

        (status, Json(ErrorBody { error: error_kind, message })).into_response()
    }
}

impl From<SecretsError> for ApiError {
    fn from(err: SecretsError) -> Self {
        let message = err.to_string();
        match err {
            SecretsError::SecretNotFound { .. } | SecretsError::FieldNotFound { .. } => {
                ApiError::NotFound(message)
            }
            SecretsError::BackendUnavailable { .. }
            | SecretsError::Subscription { .. }
            | SecretsError::Timeout { .. } => ApiError::ServiceUnavailable(message),
            SecretsError::Decode { .. } => ApiError::Internal(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secrets_error_status_mapping() {
        let cases = [
            (SecretsError::secret_not_found("db"), StatusCode::NOT_FOUND),
            (SecretsError::field_not_found("db", "password"), StatusCode::NOT_FOUND),
            (SecretsError::backend_unavailable("refused"), StatusCode::SERVICE_UNAVAILABLE),
            (SecretsError::timeout("get secret 'db'", 50), StatusCode::SERVICE_UNAVAILABLE),
            (SecretsError::subscription("watch refused"), StatusCode::SERVICE_UNAVAILABLE),
            (SecretsError::decode("password", "invalid base64"), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, expected) in cases {
            let response = ApiError::from(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }
}
