//! Users-related HTTP API.
mod email;
mod get;
mod identity;
mod presence;
mod profile;
mod upload;

use axum::extract::{Request, State};
use axum::response::Response;
use axum::routing::{get, post, put};
use axum::{Router, middleware};

use crate::user::User;
use crate::{AppState, ServerError};

/// Load the user the authentication gateway vouched for.
async fn auth(
    State(state): State<AppState>,
    mut req: Request,
    next: middleware::Next,
) -> Result<Response, ServerError> {
    let user_id = req
        .headers()
        .get(state.config.gateway.identity_header.as_str())
        .and_then(|header| header.to_str().ok())
        .and_then(|id| id.trim().parse::<i64>().ok())
        .ok_or(ServerError::Unauthorized)?;

    let user = state.workflow.user(user_id).await?;

    req.extensions_mut().insert::<User>(user);
    Ok(next.run(req).await)
}

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        // `GET /users/@me` goes to `get`.
        .route("/@me", get(get::handler))
        // `PUT /users/@me/profile` goes to `profile`.
        .route("/@me/profile", put(profile::handler))
        // `PUT /users/@me/identity` goes to `identity`.
        .route("/@me/identity", put(identity::handler))
        // `POST /users/@me/upload` goes to `upload`.
        .route("/@me/upload", post(upload::handler))
        // `POST /users/@me/email/code` goes to `email::send_code`.
        .route("/@me/email/code", post(email::send_code))
        // `POST /users/@me/email/verify` goes to `email::verify`.
        .route("/@me/email/verify", post(email::verify))
        .route_layer(middleware::from_fn_with_state(state, auth))
        // `GET /users/:ID/presence` goes to `presence`. Public.
        .route("/{user_id}/presence", get(presence::handler))
}
