//! Submit a new public profile.

use axum::extract::State;
use axum::{Extension, Json};
use serde::Serialize;

use crate::router::Valid;
use crate::user::User;
use crate::verification::ProfileSubmission;
use crate::verification::evaluator::ProfileOutcome;
use crate::{AppState, ServerError};

#[derive(Debug, Serialize)]
pub struct Response {
    status: ProfileOutcome,
}

pub async fn handler(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Valid(body): Valid<ProfileSubmission>,
) -> Result<Json<Response>, ServerError> {
    let status = state.workflow.submit_profile(user.id, body).await?;
    Ok(Json(Response { status }))
}
