//! Reviewer HTTP API.

use axum::extract::{Path, Request, State};
use axum::response::Response;
use axum::routing::post;
use axum::{Json, Router, middleware};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::router::Valid;
use crate::user::User;
use crate::verification::{DocumentVerdicts, Verdict};
use crate::{AppState, ServerError};

const REVIEW_TOKEN_HEADER: &str = "x-review-token";

/// Reject callers without the configured reviewer secret.
async fn guard(
    State(state): State<AppState>,
    req: Request,
    next: middleware::Next,
) -> Result<Response, ServerError> {
    let expected = state
        .config
        .gateway
        .review_token
        .as_deref()
        .ok_or(ServerError::Unauthorized)?;
    let provided = req
        .headers()
        .get(REVIEW_TOKEN_HEADER)
        .and_then(|header| header.to_str().ok());

    if provided != Some(expected) {
        return Err(ServerError::Unauthorized);
    }

    Ok(next.run(req).await)
}

#[derive(Debug, Validate, Serialize, Deserialize)]
pub struct ProfileReview {
    verdict: Verdict,
}

#[derive(Debug, Validate, Serialize, Deserialize)]
pub struct IdentityReview {
    id_front_img: Verdict,
    id_reverse_img: Verdict,
    self_photo_img: Verdict,
}

async fn profile(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Valid(body): Valid<ProfileReview>,
) -> Result<Json<User>, ServerError> {
    let user = state.workflow.review_profile(user_id, body.verdict).await?;
    Ok(Json(user))
}

async fn identity(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Valid(body): Valid<IdentityReview>,
) -> Result<Json<User>, ServerError> {
    let verdicts = DocumentVerdicts {
        id_front_img: body.id_front_img,
        id_reverse_img: body.id_reverse_img,
        self_photo_img: body.self_photo_img,
    };

    let user = state.workflow.review_identity(user_id, verdicts).await?;
    Ok(Json(user))
}

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        // `POST /review/:ID/profile` goes to `profile`.
        .route("/{user_id}/profile", post(profile))
        // `POST /review/:ID/identity` goes to `identity`.
        .route("/{user_id}/identity", post(identity))
        .route_layer(middleware::from_fn_with_state(state, guard))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    use crate::router::tests::{REVIEW_TOKEN, json as read_json, state};
    use crate::user::{ReviewStatus, User};
    use crate::{app, make_request};

    fn pending() -> User {
        User {
            id: 1,
            profile_status: ReviewStatus::Waiting,
            identity_status: ReviewStatus::Waiting,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_review_token_is_required() {
        let (state, store) = state([pending()]);

        for headers in [&[][..], &[("x-review-token", "guess")][..]] {
            let response = make_request(
                app(state.clone()),
                Method::POST,
                "/review/1/profile",
                headers,
                json!({ "verdict": "approve" }).to_string(),
            )
            .await;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }

        assert_eq!(
            store.user(1).await.unwrap().profile_status,
            ReviewStatus::Waiting
        );
    }

    #[tokio::test]
    async fn test_reject_profile() {
        let (state, store) = state([pending()]);

        let response = make_request(
            app(state.clone()),
            Method::POST,
            "/review/1/profile",
            &[("x-review-token", REVIEW_TOKEN)],
            json!({ "verdict": "reject" }).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_json(response).await["profile_status"], "Failed");

        let user = store.user(1).await.unwrap();
        assert_eq!(user.profile_error_count_today, 1);

        // Nothing left to review.
        let response = make_request(
            app(state),
            Method::POST,
            "/review/1/profile",
            &[("x-review-token", REVIEW_TOKEN)],
            json!({ "verdict": "approve" }).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(read_json(response).await["type"], "not_pending_review");
    }

    #[tokio::test]
    async fn test_approve_identity() {
        let (state, _) = state([pending()]);

        let response = make_request(
            app(state),
            Method::POST,
            "/review/1/identity",
            &[("x-review-token", REVIEW_TOKEN)],
            json!({
                "id_front_img": "approve",
                "id_reverse_img": "approve",
                "self_photo_img": "approve",
            })
            .to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = read_json(response).await;
        assert_eq!(body["identity_status"], "OK");
        assert_eq!(body["self_photo_img_status"], "OK");
        assert_eq!(body["identity_verified_at"], "2024-05-10T12:00:00");
    }
}
