//! Join request workflow over HTTP.

use axum::http::StatusCode;
use serde_json::json;

use super::common::*;

#[tokio::test]
async fn request_approve_flow() {
    let app = TestApp::new().await;
    let leader = app.signup("lee").await;
    let applicant = app.signup("ari").await;
    let group_id = app.create_group(&leader, "Algorithms", 3).await;
    let requests_uri = format!("/api/groups/{group_id}/requests");

    let (status, body) = app
        .post(&requests_uri, &applicant, json!({ "message": "too short" }))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "VALIDATION_FAILED");

    let (status, body) = app
        .post(
            &requests_uri,
            &applicant,
            json!({ "message": "I am working through CLRS." }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["status"], "PENDING");
    let request_id = body["id"].as_str().unwrap().to_string();

    let (status, body) = app
        .post(
            &requests_uri,
            &applicant,
            json!({ "message": "I am working through CLRS." }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "DUPLICATE_PENDING_REQUEST");

    let (status, body) = app.get("/api/users/me/requests", &applicant).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    // the applicant cannot see the group's queue
    let (status, body) = app.get(&requests_uri, &applicant).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "NOT_LEADER");

    let (status, body) = app
        .get(&format!("{requests_uri}?status=pending"), &leader)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["id"], request_id.as_str());

    let respond_uri = format!("{requests_uri}/{request_id}/respond");
    let (status, body) = app
        .post(&respond_uri, &applicant, json!({ "action": "approve" }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "NOT_LEADER");

    let (status, body) = app
        .post(
            &respond_uri,
            &leader,
            json!({ "action": "approve", "response_message": "welcome" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "APPROVED");
    assert_eq!(body["response_message"], "welcome");

    let (status, body) = app
        .post(&respond_uri, &leader, json!({ "action": "reject" }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "REQUEST_ALREADY_PROCESSED");

    let (_, body) = app.get(&format!("/api/groups/{group_id}"), &leader).await;
    assert_eq!(body["member_count"], 2);
}

#[tokio::test]
async fn respond_rejects_unknown_actions() {
    let app = TestApp::new().await;
    let leader = app.signup("lee").await;
    let applicant = app.signup("ari").await;
    let group_id = app.create_group(&leader, "Graphs", 3).await;

    let (_, body) = app
        .post(
            &format!("/api/groups/{group_id}/requests"),
            &applicant,
            json!({ "message": "Graphs are my favourite." }),
        )
        .await;
    let request_id = body["id"].as_str().unwrap();

    let (status, body) = app
        .post(
            &format!("/api/groups/{group_id}/requests/{request_id}/respond"),
            &leader,
            json!({ "action": "maybe" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "VALIDATION_FAILED");
}

#[tokio::test]
async fn full_group_and_self_request() {
    let app = TestApp::new().await;
    let leader = app.signup("lee").await;
    let a = app.signup("ana").await;
    let b = app.signup("ben").await;
    let group_id = app.create_group(&leader, "Pair", 2).await;
    let requests_uri = format!("/api/groups/{group_id}/requests");

    let (status, body) = app
        .post(
            &requests_uri,
            &leader,
            json!({ "message": "Letting myself in again." }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "SELF_REQUEST_TO_OWN_GROUP");

    // both ask while there is room, only one approval fits
    let (_, ra) = app
        .post(&requests_uri, &a, json!({ "message": "Ana would like to join." }))
        .await;
    let (_, rb) = app
        .post(&requests_uri, &b, json!({ "message": "Ben would like to join." }))
        .await;

    let (status, _) = app
        .post(
            &format!("{requests_uri}/{}/respond", ra["id"].as_str().unwrap()),
            &leader,
            json!({ "action": "approve" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .post(
            &format!("{requests_uri}/{}/respond", rb["id"].as_str().unwrap()),
            &leader,
            json!({ "action": "approve" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "GROUP_FULL");

    // rejecting still works when full
    let (status, body) = app
        .post(
            &format!("{requests_uri}/{}/respond", rb["id"].as_str().unwrap()),
            &leader,
            json!({ "action": "reject" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "REJECTED");
}
