use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use studyhub_membership::NewGroup;
use studyhub_storage::{GroupId, GroupPurpose, GroupSummary, UpdateGroupParams, UserId};
use uuid::Uuid;
use validator::Validate;

use super::{parse_enum, GroupView, MemberView};
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::extract::{ValidJson, ValidPath};
use crate::server::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateGroupRequest {
    #[validate(length(min = 2, max = 50))]
    pub name: String,
    #[validate(length(max = 500))]
    pub description: Option<String>,
    pub purpose: String,
    #[validate(range(min = 2, max = 10))]
    pub max_members: u32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateGroupRequest {
    #[validate(length(max = 500))]
    pub description: Option<String>,
    pub purpose: Option<String>,
    #[validate(range(min = 2, max = 10))]
    pub max_members: Option<u32>,
}

pub async fn create(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ValidJson(req): ValidJson<CreateGroupRequest>,
) -> Result<(StatusCode, Json<GroupView>), ApiError> {
    let purpose: GroupPurpose = parse_enum("purpose", &req.purpose)?;
    let group = state
        .engine
        .create_group(
            &user_id,
            NewGroup {
                name: req.name,
                description: req.description,
                purpose,
                max_members: req.max_members,
            },
        )
        .await?;

    // The leader is the only member of a new group.
    let summary = GroupSummary {
        group,
        member_count: 1,
    };
    Ok((StatusCode::CREATED, Json(summary.into())))
}

pub async fn list(
    State(state): State<AppState>,
    _user: AuthUser,
) -> Result<Json<Vec<GroupView>>, ApiError> {
    let groups = state.engine.list_groups().await?;
    Ok(Json(groups.into_iter().map(Into::into).collect()))
}

pub async fn get(
    State(state): State<AppState>,
    _user: AuthUser,
    ValidPath(id): ValidPath<Uuid>,
) -> Result<Json<GroupView>, ApiError> {
    let summary = state.engine.get_group(&GroupId(id)).await?;
    Ok(Json(summary.into()))
}

pub async fn update(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ValidPath(id): ValidPath<Uuid>,
    ValidJson(req): ValidJson<UpdateGroupRequest>,
) -> Result<Json<GroupView>, ApiError> {
    let purpose = req
        .purpose
        .as_deref()
        .map(|p| parse_enum::<GroupPurpose>("purpose", p))
        .transpose()?;
    let group_id = GroupId(id);
    state
        .engine
        .update_group(
            &user_id,
            &group_id,
            UpdateGroupParams {
                description: req.description,
                purpose,
                max_members: req.max_members,
            },
        )
        .await?;
    let summary = state.engine.get_group(&group_id).await?;
    Ok(Json(summary.into()))
}

pub async fn deactivate(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ValidPath(id): ValidPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.engine.deactivate_group(&user_id, &GroupId(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn members(
    State(state): State<AppState>,
    _user: AuthUser,
    ValidPath(id): ValidPath<Uuid>,
) -> Result<Json<Vec<MemberView>>, ApiError> {
    let group_id = GroupId(id);
    let summary = state.engine.get_group(&group_id).await?;
    let members = state.engine.list_members(&group_id).await?;
    let leader = summary.group.leader_id.0;
    Ok(Json(
        members
            .into_iter()
            .map(|m| MemberView::new(m, leader))
            .collect(),
    ))
}

pub async fn leave(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ValidPath(id): ValidPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.engine.leave_group(&user_id, &GroupId(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn remove_member(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ValidPath((id, target)): ValidPath<(Uuid, Uuid)>,
) -> Result<StatusCode, ApiError> {
    state
        .engine
        .remove_member(&user_id, &GroupId(id), &UserId(target))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
