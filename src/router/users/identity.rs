//! Submit identity (KYC) documents.

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Serialize;

use crate::router::Valid;
use crate::router::client_ip::ClientIp;
use crate::user::{ReviewStatus, User};
use crate::verification::IdentitySubmission;
use crate::{AppState, ServerError};

#[derive(Debug, Serialize)]
pub struct Response {
    status: ReviewStatus,
}

pub async fn handler(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    ClientIp(ip): ClientIp,
    Valid(body): Valid<IdentitySubmission>,
) -> Result<(StatusCode, Json<Response>), ServerError> {
    state
        .workflow
        .submit_identity(user.id, body, &ip.to_string())
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(Response {
            status: ReviewStatus::Waiting,
        }),
    ))
}
