//! Admin API: inspect queues, manage delegation and trigger handoffs.

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::lifecycle::Supervisor;

/// State shared by admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub supervisor: Arc<Supervisor>,
    pub api_key: Arc<str>,
}

impl AdminState {
    pub fn new(supervisor: Arc<Supervisor>, api_key: &str) -> Self {
        Self {
            supervisor,
            api_key: Arc::from(api_key),
        }
    }
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/queues", get(get_queues))
        .route(
            "/admin/delegations",
            get(get_delegations).post(set_delegation).delete(clear_delegation),
        )
        .route("/admin/handoff", post(handoff))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}
