use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use studyhub_membership::Decision;
use studyhub_storage::{GroupId, RequestId, RequestStatus};
use uuid::Uuid;
use validator::Validate;

use super::{parse_enum, RequestView};
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::extract::{ValidJson, ValidPath, ValidQuery};
use crate::metrics::record_decision;
use crate::server::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct SendRequestBody {
    #[validate(length(min = 10, max = 500))]
    pub message: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RespondBody {
    pub action: Decision,
    #[validate(length(max = 500))]
    pub response_message: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ListRequestsQuery {
    pub status: Option<String>,
}

pub async fn send(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ValidPath(id): ValidPath<Uuid>,
    ValidJson(body): ValidJson<SendRequestBody>,
) -> Result<(StatusCode, Json<RequestView>), ApiError> {
    let request = state
        .engine
        .send_join_request(&user_id, &GroupId(id), &body.message)
        .await?;
    Ok((StatusCode::CREATED, Json(request.into())))
}

/// Leader only.
pub async fn list(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ValidPath(id): ValidPath<Uuid>,
    ValidQuery(query): ValidQuery<ListRequestsQuery>,
) -> Result<Json<Vec<RequestView>>, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(|s| parse_enum::<RequestStatus>("status", s))
        .transpose()?;
    let requests = state
        .engine
        .list_group_requests(&user_id, &GroupId(id), status)
        .await?;
    Ok(Json(requests.into_iter().map(Into::into).collect()))
}

pub async fn respond(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ValidPath((id, request_id)): ValidPath<(Uuid, Uuid)>,
    ValidJson(body): ValidJson<RespondBody>,
) -> Result<Json<RequestView>, ApiError> {
    let result = state
        .engine
        .respond_to_request(
            &user_id,
            &GroupId(id),
            &RequestId(request_id),
            body.action,
            body.response_message.as_deref(),
        )
        .await;

    match result {
        Ok(request) => {
            record_decision(body.action.as_str());
            Ok(Json(request.into()))
        }
        Err(e) => {
            record_decision(e.code());
            Err(e.into())
        }
    }
}
