use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use studyhub_membership::NewNotice;
use studyhub_storage::{GroupId, NoticeId, NoticeKind, UpdateNoticeParams};
use uuid::Uuid;
use validator::Validate;

use super::{parse_enum, NoticeView};
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::extract::{ValidJson, ValidPath};
use crate::server::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateNoticeRequest {
    pub kind: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub title: String,
    #[validate(length(min = 1, max = 5000))]
    pub content: String,
    #[serde(default)]
    pub pinned: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateNoticeRequest {
    pub kind: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 5000))]
    pub content: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PinRequest {
    pub pinned: bool,
}

fn kind(value: Option<&str>) -> Result<Option<NoticeKind>, ApiError> {
    value.map(|k| parse_enum("kind", k)).transpose()
}

pub async fn list(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ValidPath(id): ValidPath<Uuid>,
) -> Result<Json<Vec<NoticeView>>, ApiError> {
    let notices = state.engine.list_notices(&user_id, &GroupId(id)).await?;
    Ok(Json(notices.into_iter().map(Into::into).collect()))
}

pub async fn create(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ValidPath(id): ValidPath<Uuid>,
    ValidJson(req): ValidJson<CreateNoticeRequest>,
) -> Result<(StatusCode, Json<NoticeView>), ApiError> {
    let notice = state
        .engine
        .create_notice(
            &user_id,
            &GroupId(id),
            NewNotice {
                kind: kind(req.kind.as_deref())?.unwrap_or(NoticeKind::General),
                title: req.title,
                content: req.content,
                pinned: req.pinned,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(notice.into())))
}

pub async fn update(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ValidPath((id, notice_id)): ValidPath<(Uuid, Uuid)>,
    ValidJson(req): ValidJson<UpdateNoticeRequest>,
) -> Result<Json<NoticeView>, ApiError> {
    let notice = state
        .engine
        .update_notice(
            &user_id,
            &GroupId(id),
            &NoticeId(notice_id),
            UpdateNoticeParams {
                kind: kind(req.kind.as_deref())?,
                title: req.title,
                content: req.content,
            },
        )
        .await?;
    Ok(Json(notice.into()))
}

pub async fn delete(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ValidPath((id, notice_id)): ValidPath<(Uuid, Uuid)>,
) -> Result<StatusCode, ApiError> {
    state
        .engine
        .delete_notice(&user_id, &GroupId(id), &NoticeId(notice_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Leader only.
pub async fn pin(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ValidPath((id, notice_id)): ValidPath<(Uuid, Uuid)>,
    ValidJson(req): ValidJson<PinRequest>,
) -> Result<Json<NoticeView>, ApiError> {
    let notice = state
        .engine
        .set_notice_pinned(&user_id, &GroupId(id), &NoticeId(notice_id), req.pinned)
        .await?;
    Ok(Json(notice.into()))
}
