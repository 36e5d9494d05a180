use axum::routing::{get, post};
use axum::Router;

pub mod files;
pub mod reconcile;
pub mod uploaders;

use crate::ServiceState;

pub fn router(state: ServiceState) -> Router<ServiceState> {
    Router::new()
        .nest("/files", files::router(state.clone()))
        .route("/reconcile", post(reconcile::handler))
        .route("/uploaders", post(uploaders::add_handler))
        .route(
            "/uploaders/:address",
            get(uploaders::check_handler).delete(uploaders::remove_handler),
        )
        .with_state(state)
}
