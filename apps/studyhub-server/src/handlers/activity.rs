use axum::extract::State;
use axum::Json;
use studyhub_storage::GroupId;
use uuid::Uuid;

use super::{ActivityView, PageQuery};
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::extract::{ValidPath, ValidQuery};
use crate::server::AppState;

/// A group's activity feed, newest first. Members only.
pub async fn group_activity(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ValidPath(id): ValidPath<Uuid>,
    ValidQuery(page): ValidQuery<PageQuery>,
) -> Result<Json<Vec<ActivityView>>, ApiError> {
    let entries = state
        .engine
        .group_activity(&user_id, &GroupId(id), page.into())
        .await?;
    Ok(Json(entries.into_iter().map(Into::into).collect()))
}
