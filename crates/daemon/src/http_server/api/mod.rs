use axum::Router;

pub mod client;
mod error;
mod identity;
pub mod v0;

pub use error::HandlerError;
pub use identity::{Identity, IDENTITY_HEADER};

use crate::ServiceState;

pub fn router(state: ServiceState) -> Router<ServiceState> {
    Router::new()
        .nest("/v0", v0::router(state.clone()))
        .with_state(state)
}
