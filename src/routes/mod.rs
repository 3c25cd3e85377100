use axum::{Json, Router, extract::rejection::JsonRejection};
use axum_valid::{Valid, ValidRejection};

use crate::state::SharedState;

pub mod assistant;
pub mod docs;
pub mod health;
pub mod levels;
pub mod user;
pub mod validate;

/// JSON body validated with `validator`; handlers turn the rejection into an [`AppError`](crate::error::AppError).
pub type ValidJson<T> = Result<Valid<Json<T>>, ValidRejection<JsonRejection>>;

/// Compose the API, health and documentation trees, then bind the shared state.
pub fn router(state: SharedState) -> Router<()> {
    Router::new()
        .merge(health::router())
        .merge(user::router())
        .merge(validate::router())
        .merge(assistant::router())
        .merge(levels::router())
        .merge(docs::router())
        .with_state(state)
}
