use axum::{routing::post, Router};

use crate::AppState;

mod generate;

pub fn router() -> Router<AppState> {
    Router::new().route("/generate", post(generate::handler))
}
