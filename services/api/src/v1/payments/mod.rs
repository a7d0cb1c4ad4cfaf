use axum::{routing::post, Router};

use crate::AppState;

mod webhook;

pub fn router() -> Router<AppState> {
    Router::new().route("/webhook", post(webhook::handler))
}
