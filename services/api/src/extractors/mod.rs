mod auth;
mod client_ip;

pub use auth::{require_admin, require_webhook_secret, AuthenticatedUser};
pub use client_ip::ClientIp;
