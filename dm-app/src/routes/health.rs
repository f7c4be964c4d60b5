use axum::routing::get;

pub fn router() -> axum::Router {
    axum::Router::new().route("/ping", get(ping))
}

async fn ping() -> &'static str {
    "pong"
}
