//! Verify the email address of the caller.

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};

use crate::router::Valid;
use crate::user::User;
use crate::verification::email::{EmailCodeCheck, EmailCodeRequest};
use crate::{AppState, ServerError};

/// Mail a one-time code.
pub async fn send_code(
    State(state): State<AppState>,
    Valid(body): Valid<EmailCodeRequest>,
) -> Result<StatusCode, ServerError> {
    state.email.send_code(&body.email).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Check the code and save the address.
pub async fn verify(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Valid(body): Valid<EmailCodeCheck>,
) -> Result<Json<User>, ServerError> {
    let user = state.email.verify(user.id, &body.email, body.code).await?;
    Ok(Json(user))
}

#[cfg(test)]
mod tests {
    use axum::http::Method;
    use serde_json::json;

    use super::*;
    use crate::router::tests::{json as read_json, state_with_mailer};
    use crate::{app, make_request};

    const EMAIL: &str = "alice@example.com";

    async fn post(
        state: &AppState,
        path: &str,
        body: serde_json::Value,
    ) -> axum::response::Response {
        make_request(
            app(state.clone()),
            Method::POST,
            path,
            &[("x-user-id", "1")],
            body.to_string(),
        )
        .await
    }

    fn users() -> [User; 1] {
        [User {
            id: 1,
            ..Default::default()
        }]
    }

    #[tokio::test]
    async fn test_verify_email() {
        let (state, store, mailer) = state_with_mailer(users());

        let response =
            post(&state, "/users/@me/email/code", json!({ "email": EMAIL })).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let code = mailer.last_code(EMAIL).unwrap();

        let response = post(
            &state,
            "/users/@me/email/verify",
            json!({ "email": EMAIL, "code": code }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_json(response).await["email"], EMAIL);

        let user = store.user(1).await.unwrap();
        assert_eq!(user.email.as_deref(), Some(EMAIL));
        assert!(user.email_verified_at.is_some());
    }

    #[tokio::test]
    async fn test_wrong_code_is_rejected() {
        let (state, store, mailer) = state_with_mailer(users());
        post(&state, "/users/@me/email/code", json!({ "email": EMAIL })).await;
        let code = mailer.last_code(EMAIL).unwrap();
        let wrong = if code == 999_999 { 100_000 } else { code + 1 };

        let response = post(
            &state,
            "/users/@me/email/verify",
            json!({ "email": EMAIL, "code": wrong }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(read_json(response).await["type"], "invalid_email_code");
        assert_eq!(store.user(1).await.unwrap().email, None);
    }

    #[tokio::test]
    async fn test_code_never_sent() {
        let (state, _, _) = state_with_mailer(users());

        let response = post(
            &state,
            "/users/@me/email/verify",
            json!({ "email": EMAIL, "code": 123456 }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(read_json(response).await["type"], "invalid_email_code");
    }

    #[tokio::test]
    async fn test_invalid_email() {
        let (state, _, mailer) = state_with_mailer(users());

        let response =
            post(&state, "/users/@me/email/code", json!({ "email": "alice" })).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(read_json(response).await["type"], "validation_error");
        assert!(mailer.sent().is_empty());
    }
}
