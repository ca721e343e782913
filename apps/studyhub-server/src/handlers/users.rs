use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use studyhub_storage::UpdateProfileParams;
use validator::Validate;

use super::{ActivityView, PageQuery, RequestView, UserView};
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::extract::{ValidJson, ValidQuery};
use crate::server::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 50))]
    pub name: Option<String>,
    #[validate(length(max = 500))]
    pub bio: Option<String>,
    #[validate(length(max = 200))]
    pub github_url: Option<String>,
    #[validate(length(max = 200))]
    pub blog_url: Option<String>,
}

pub async fn me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<UserView>, ApiError> {
    let user = state.engine.get_user(&user_id).await?;
    Ok(Json(user.into()))
}

pub async fn update_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ValidJson(req): ValidJson<UpdateProfileRequest>,
) -> Result<Json<UserView>, ApiError> {
    let user = state
        .engine
        .update_profile(
            &user_id,
            UpdateProfileParams {
                name: req.name,
                bio: req.bio,
                github_url: req.github_url,
                blog_url: req.blog_url,
            },
        )
        .await?;
    Ok(Json(user.into()))
}

pub async fn my_activity(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ValidQuery(page): ValidQuery<PageQuery>,
) -> Result<Json<Vec<ActivityView>>, ApiError> {
    let entries = state.engine.my_activity(&user_id, page.into()).await?;
    Ok(Json(entries.into_iter().map(Into::into).collect()))
}

pub async fn my_requests(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Vec<RequestView>>, ApiError> {
    let requests = state.engine.list_my_requests(&user_id).await?;
    Ok(Json(requests.into_iter().map(Into::into).collect()))
}
