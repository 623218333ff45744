//! Upload one image ahead of a submission.

use axum::extract::State;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::router::Valid;
use crate::storage::{AssetKind, is_inline_image};
use crate::user::User;
use crate::{AppState, ServerError};

fn inline_image(value: &str) -> Result<(), ValidationError> {
    if is_inline_image(value) {
        Ok(())
    } else {
        Err(ValidationError::new("inline_image"))
    }
}

#[derive(Debug, Validate, Serialize, Deserialize)]
pub struct Body {
    r#type: AssetKind,
    #[validate(custom(function = "inline_image", message = "File must be an inline image."))]
    file: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Response {
    url: String,
}

pub async fn handler(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Valid(body): Valid<Body>,
) -> Result<Json<Response>, ServerError> {
    let url = state.storage.store(&body.file, body.r#type).await?;
    tracing::debug!(user_id = user.id, kind = body.r#type.as_str(), "image uploaded");

    Ok(Json(Response { url }))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    use crate::router::tests::{json as read_json, state};
    use crate::user::User;
    use crate::{app, make_request};

    #[tokio::test]
    async fn test_upload() {
        let (state, _) = state([User {
            id: 1,
            ..Default::default()
        }]);

        let response = make_request(
            app(state.clone()),
            Method::POST,
            "/users/@me/upload",
            &[("x-user-id", "1")],
            json!({ "type": "id_front_img", "file": "data:image/png;base64,iVBORw0KGgo=" })
                .to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            read_json(response).await["url"],
            "https://cdn.test/id_front_img/1.png"
        );

        let response = make_request(
            app(state),
            Method::POST,
            "/users/@me/upload",
            &[("x-user-id", "1")],
            json!({ "type": "avatar", "file": "https://cdn.test/avatar/1.png" })
                .to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
