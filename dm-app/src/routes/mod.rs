pub mod health;
pub mod status;
pub mod webhook;

use axum::Router;

pub fn router() -> Router {
    Router::new()
        .merge(health::router())
        .merge(webhook::router())
        .merge(status::router())
}
