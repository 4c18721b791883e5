pub mod routes;

use std::sync::Arc;

use axum::Router;

use crate::runs::service::RunService;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<RunService>,
}

pub fn create_app(state: AppState) -> Router {
    routes::build_router(state)
}
