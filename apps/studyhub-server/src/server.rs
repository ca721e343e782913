use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post, put};
use axum::{middleware, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use studyhub_crypto::PasswordHashing;
use studyhub_membership::MembershipEngine;
use tower_http::trace::TraceLayer;

use crate::auth::TokenKeys;
use crate::backend::StoreBackend;
use crate::config::ServerConfig;
use crate::handlers;
use crate::metrics::track_http;

pub type Engine = MembershipEngine<StoreBackend>;

#[derive(Clone)]
pub struct AppState {
    pub engine: Engine,
    pub passwords: PasswordHashing,
    pub tokens: Arc<TokenKeys>,
    pub metrics: PrometheusHandle,
}

impl AppState {
    pub fn new(
        backend: StoreBackend,
        config: &ServerConfig,
        passwords: PasswordHashing,
        metrics: PrometheusHandle,
    ) -> Self {
        Self {
            engine: MembershipEngine::new(Arc::new(backend)),
            passwords,
            tokens: Arc::new(TokenKeys::new(
                config.jwt_secret.as_bytes(),
                config.token_ttl(),
            )),
            metrics,
        }
    }
}

/// The public JSON API plus `/metrics`.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/auth/register", post(handlers::auth::register))
        .route("/auth/login", post(handlers::auth::login))
        .route(
            "/users/me",
            get(handlers::users::me).patch(handlers::users::update_me),
        )
        .route("/users/me/activity", get(handlers::users::my_activity))
        .route("/users/me/requests", get(handlers::users::my_requests))
        .route(
            "/groups",
            get(handlers::groups::list).post(handlers::groups::create),
        )
        .route(
            "/groups/{id}",
            get(handlers::groups::get)
                .patch(handlers::groups::update)
                .delete(handlers::groups::deactivate),
        )
        .route("/groups/{id}/members", get(handlers::groups::members))
        .route(
            "/groups/{id}/members/{user_id}",
            axum::routing::delete(handlers::groups::remove_member),
        )
        .route("/groups/{id}/leave", post(handlers::groups::leave))
        .route(
            "/groups/{id}/requests",
            get(handlers::requests::list).post(handlers::requests::send),
        )
        .route(
            "/groups/{id}/requests/{request_id}/respond",
            post(handlers::requests::respond),
        )
        .route(
            "/groups/{id}/notices",
            get(handlers::notices::list).post(handlers::notices::create),
        )
        .route(
            "/groups/{id}/notices/{notice_id}",
            axum::routing::patch(handlers::notices::update).delete(handlers::notices::delete),
        )
        .route(
            "/groups/{id}/notices/{notice_id}/pin",
            put(handlers::notices::pin),
        )
        .route("/groups/{id}/activity", get(handlers::activity::group_activity));

    Router::new()
        .nest("/api", api)
        .route("/metrics", get(render_metrics))
        .route_layer(middleware::from_fn(track_http))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn render_metrics(State(state): State<AppState>) -> String {
    state.metrics.render()
}
