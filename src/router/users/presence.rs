use axum::Json;
use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};

use crate::AppState;

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct Response {
    online: bool,
}

pub async fn handler(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Json<Response> {
    Json(Response {
        online: state.presence.is_online(user_id).await,
    })
}
