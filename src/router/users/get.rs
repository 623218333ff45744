//! Get verification state of the current user.

use axum::extract::State;
use axum::{Extension, Json};

use crate::AppState;
use crate::user::User;

pub async fn handler(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Json<User> {
    state.presence.mark_online(user.id).await;
    Json(user)
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};

    use crate::router::tests::{json, state};
    use crate::user::{ReviewStatus, User};
    use crate::{app, make_request};

    #[tokio::test]
    async fn test_get_marks_online() {
        let (state, _) = state([User {
            id: 7,
            nickname: Some("alice".into()),
            profile_status: ReviewStatus::Ok,
            ..Default::default()
        }]);
        assert!(!state.presence.is_online(7).await);

        let response = make_request(
            app(state.clone()),
            Method::GET,
            "/users/@me",
            &[("x-user-id", "7")],
            String::default(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = json(response).await;
        assert_eq!(body["nickname"], "alice");
        assert_eq!(body["profile_status"], "OK");
        assert_eq!(body["identity_status"], "Init");

        assert!(state.presence.is_online(7).await);
    }
}
