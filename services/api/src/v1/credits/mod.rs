use axum::{
    routing::{get, post},
    Router,
};

use crate::AppState;

mod adjust;
mod balance;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(balance::handler))
}

pub fn admin_router() -> Router<AppState> {
    Router::new().route("/credits", post(adjust::handler))
}
