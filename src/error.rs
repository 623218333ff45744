//! Error handler for kycgate.

use axum::extract::rejection::JsonRejection;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use sqlx::Error as SQLxError;
use thiserror::Error;
use validator::ValidationErrors;

use crate::storage::StorageError;
use crate::user::Category;

pub type Result<T> = std::result::Result<T, ServerError>;

/// Enum representing server-side errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("validation error occurred")]
    Validation(#[from] ValidationErrors),

    #[error(transparent)]
    Axum(#[from] JsonRejection),

    #[error("SQL request failed: {0}")]
    Sql(#[from] SQLxError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Your {0} is waiting for review, please wait for the result")]
    RecordPendingReview(Category),

    #[error(
        "Today's certification has exceeded the limit, please try again tomorrow, or contact support and ask the reason for the failure"
    )]
    DailyAttemptLimitExceeded,

    #[error("The nickname is exists, please change another nickname")]
    DuplicateNickname,

    #[error("The phone_number is exists, please change another phone_number")]
    DuplicatePhone,

    #[error(
        "The passport number is exists, please change another passport number"
    )]
    DuplicateIdNumber,

    #[error("This IP address is already bound to another account")]
    DuplicateIpBinding,

    #[error("Your {0} is not waiting for review")]
    NotPendingReview(Category),

    #[error("The email validate code is not correct")]
    InvalidEmailCode,

    #[error("user not found")]
    UserNotFound,

    #[error("client IP address cannot be resolved")]
    MissingClientIp,

    #[error("missing or invalid credentials")]
    Unauthorized,
}

impl ServerError {
    /// Stable code clients use to localize the message.
    pub fn code(&self) -> &'static str {
        match self {
            ServerError::Validation(_) | ServerError::Axum(_) => "validation_error",
            ServerError::Sql(_) => "internal_error",
            ServerError::Storage(err) if err.is_transient() => "storage_unavailable",
            ServerError::Storage(_) => "invalid_image",
            ServerError::RecordPendingReview(_) => "record_pending_review",
            ServerError::DailyAttemptLimitExceeded => "daily_attempt_limit_exceeded",
            ServerError::DuplicateNickname => "duplicate_nickname",
            ServerError::DuplicatePhone => "duplicate_phone",
            ServerError::DuplicateIdNumber => "duplicate_id_number",
            ServerError::DuplicateIpBinding => "duplicate_ip_binding",
            ServerError::NotPendingReview(_) => "not_pending_review",
            ServerError::InvalidEmailCode => "invalid_email_code",
            ServerError::UserNotFound => "user_not_found",
            ServerError::MissingClientIp => "missing_client_ip",
            ServerError::Unauthorized => "unauthorized",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ServerError::Validation(_)
            | ServerError::Axum(_)
            | ServerError::MissingClientIp
            | ServerError::InvalidEmailCode => StatusCode::BAD_REQUEST,
            ServerError::Sql(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::Storage(err) if err.is_transient() => {
                StatusCode::SERVICE_UNAVAILABLE
            },
            ServerError::Storage(_) => StatusCode::BAD_REQUEST,
            ServerError::RecordPendingReview(_)
            | ServerError::DuplicateNickname
            | ServerError::DuplicatePhone
            | ServerError::DuplicateIdNumber
            | ServerError::DuplicateIpBinding
            | ServerError::NotPendingReview(_) => StatusCode::CONFLICT,
            ServerError::DailyAttemptLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            ServerError::UserNotFound => StatusCode::NOT_FOUND,
            ServerError::Unauthorized => StatusCode::UNAUTHORIZED,
        }
    }
}

/// Structure for detailed error responses.
#[derive(Debug, Serialize)]
pub struct ResponseError {
    r#type: Option<String>,
    title: String,
    status: u16,
    detail: String,
    instance: Option<String>,
    errors: Option<Vec<FieldError>>,
}

impl ResponseError {
    /// Update error status code.
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code.as_u16();
        self
    }

    /// Update `type` field.
    pub fn kind(mut self, kind: &str) -> Self {
        self.r#type = Some(kind.into());
        self
    }

    /// Update `title` field.
    pub fn title(mut self, title: &str) -> Self {
        self.title = title.into();
        self
    }

    /// Add detailed error.
    pub fn details(mut self, description: &str) -> Self {
        self.detail = description.into();
        self
    }

    /// Automatically add errors field.
    pub fn errors(mut self, errors: &ValidationErrors) -> Self {
        self.errors = Some(parse_validation_errors(errors));
        self
    }

    /// Transform [`ResponseError`] into axum [`Response`].
    pub fn into_response(self) -> std::result::Result<Response, axum::http::Error> {
        if let Ok(body) = serde_json::to_string(&self) {
            Response::builder()
                .status(self.status)
                .header(header::CONTENT_TYPE, "application/problem+json")
                .body(body.into())
        } else {
            Ok(internal_server_error())
        }
    }
}

impl Default for ResponseError {
    fn default() -> Self {
        Self {
            r#type: None,
            title: "Internal server error.".to_owned(),
            status: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            detail: String::default(),
            instance: None,
            errors: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct FieldError {
    field: String,
    message: String,
}

fn parse_validation_errors(errors: &ValidationErrors) -> Vec<FieldError> {
    errors
        .field_errors()
        .iter()
        .flat_map(|(field, issues)| {
            issues.iter().map(move |issue| FieldError {
                field: field.to_string(),
                message: issue.to_string(),
            })
        })
        .collect()
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let response = ResponseError::default()
            .kind(self.code())
            .title(&self.to_string())
            .status(self.status());

        let response = match &self {
            ServerError::Validation(validation_errors) => response
                .title("There were validation errors with your request.")
                .errors(validation_errors),

            ServerError::Axum(err) => response
                .title("There were validation errors with your request.")
                .details(&err.body_text()),

            ServerError::Storage(err) if err.is_transient() => {
                tracing::error!(%err, "blob storage failed");
                response
                    .title("Service temporarily unavailable, please retry.")
            },

            ServerError::Storage(err) => response
                .title("Image is not a valid inline image.")
                .details(&err.to_string()),

            ServerError::Sql(err) => {
                tracing::error!(%err, "server returned 500 status");
                ResponseError::default().kind(self.code())
            },

            _ => response,
        };

        response
            .into_response()
            .unwrap_or_else(|_| internal_server_error())
    }
}

fn internal_server_error() -> Response {
    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .header(header::CONTENT_TYPE, "application/problem+json")
        .body(
            serde_json::json!({
                "type": null,
                "title": "Internal server error.",
                "status": StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
                "detail": null,
                "instance": null,
                "errors": null,
            })
            .to_string()
            .into(),
        )
        .unwrap_or_else(|_| Response::new("Internal server error".into()))
}

#[cfg(test)]
mod tests {
    use http_body_util::BodyExt;
    use validator::ValidationError;

    use super::*;

    async fn body(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_duplicate_is_conflict_with_code() {
        let response = ServerError::DuplicatePhone.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let body = body(response).await;
        assert_eq!(body["type"], "duplicate_phone");
        assert_eq!(body["status"], 409);
        assert_eq!(
            body["title"],
            "The phone_number is exists, please change another phone_number"
        );
    }

    #[tokio::test]
    async fn test_throttle_and_pending_statuses() {
        assert_eq!(
            ServerError::DailyAttemptLimitExceeded.into_response().status(),
            StatusCode::TOO_MANY_REQUESTS
        );

        let response =
            ServerError::RecordPendingReview(Category::Identity).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(
            body(response).await["title"],
            "Your identity is waiting for review, please wait for the result"
        );
    }

    #[tokio::test]
    async fn test_validation_errors_are_listed() {
        let mut errors = ValidationErrors::new();
        errors.add(
            "nickname",
            ValidationError::new("length")
                .with_message("Nickname must be 2 to 50 characters long.".into()),
        );

        let response = ServerError::Validation(errors).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body(response).await;
        assert_eq!(body["type"], "validation_error");
        assert_eq!(body["errors"][0]["field"], "nickname");
    }

    #[tokio::test]
    async fn test_storage_failure_is_transient() {
        let err = StorageError::Io(std::io::Error::other("disk full"));
        let response = ServerError::Storage(err).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body(response).await["type"], "storage_unavailable");

        let response = ServerError::Storage(StorageError::Malformed).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
