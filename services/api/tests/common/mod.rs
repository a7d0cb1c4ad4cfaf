#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::Response,
    Router,
};
use credit_ledger::{CreditLedger, MemoryCreditStore};
use rate_limiter::{LimiterCategory, MemoryStore, RateLimitConfig, RateLimiters};
use serde_json::{json, Value};
use songcraft_api::music::{GenerationRequest, MusicApiError, MusicGenerator};
use songcraft_api::AppState;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;
use uuid::Uuid;

pub const ADMIN_TOKEN: &str = "admin-test-token";
pub const WEBHOOK_SECRET: &str = "whsec_test";

/// Music API double: replays queued outcomes, then succeeds.
#[derive(Default)]
pub struct StubMusic {
    outcomes: Mutex<Vec<Result<Value, MusicApiError>>>,
    pub calls: Mutex<Vec<GenerationRequest>>,
}

impl StubMusic {
    pub fn fail_next(&self, err: MusicApiError) {
        self.outcomes.lock().unwrap().push(Err(err));
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl MusicGenerator for StubMusic {
    async fn generate(&self, request: &GenerationRequest) -> Result<Value, MusicApiError> {
        self.calls.lock().unwrap().push(request.clone());
        let queued = {
            let mut outcomes = self.outcomes.lock().unwrap();
            if outcomes.is_empty() {
                None
            } else {
                Some(outcomes.remove(0))
            }
        };
        queued.unwrap_or_else(|| Ok(json!({ "id": "song_123", "status": "complete", "audioUrl": "https://cdn.example/song_123.mp3" })))
    }
}

/// In-process app over in-memory stores.
pub struct TestApp {
    pub router: Router,
    pub credits: Arc<MemoryCreditStore>,
    pub limiter_store: Arc<MemoryStore>,
    pub music: Arc<StubMusic>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_limits(HashMap::new())
    }

    pub fn with_limits(overrides: HashMap<LimiterCategory, RateLimitConfig>) -> Self {
        let credits = Arc::new(MemoryCreditStore::new());
        let limiter_store = Arc::new(MemoryStore::new());
        let music = Arc::new(StubMusic::default());

        let state = AppState {
            ledger: CreditLedger::new(credits.clone()),
            rate_limiters: RateLimiters::with_configs(limiter_store.clone(), overrides),
            music: music.clone(),
            admin_token: Some(ADMIN_TOKEN.to_string()),
            webhook_secret: Some(WEBHOOK_SECRET.to_string()),
        };

        Self {
            router: songcraft_api::router(state),
            credits,
            limiter_store,
            music,
        }
    }

    pub fn with_limit(category: LimiterCategory, max_requests: u32, window: Duration) -> Self {
        let mut overrides = HashMap::new();
        overrides.insert(category, RateLimitConfig::new(max_requests, window));
        Self::with_limits(overrides)
    }

    /// Creates a profile and returns its id.
    pub fn user_with_balance(&self, credits: i32) -> Uuid {
        let user_id = Uuid::new_v4();
        self.credits.insert_profile(user_id, credits);
        user_id
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible")
    }

    pub async fn get_balance(&self, user_id: Uuid) -> Response {
        let request = Request::get("/v1/credits")
            .header("x-user-id", user_id.to_string())
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    pub async fn payment_webhook(&self, payload: Value, ip: &str) -> Response {
        let request = Request::post("/v1/payments/webhook")
            .header("content-type", "application/json")
            .header("x-webhook-secret", WEBHOOK_SECRET)
            .header("x-forwarded-for", ip)
            .body(Body::from(payload.to_string()))
            .unwrap();
        self.send(request).await
    }

    pub async fn admin_adjust(&self, payload: Value) -> Response {
        let request = Request::post("/v1/admin/credits")
            .header("content-type", "application/json")
            .header("authorization", format!("Bearer {}", ADMIN_TOKEN))
            .header("x-forwarded-for", "198.51.100.10")
            .body(Body::from(payload.to_string()))
            .unwrap();
        self.send(request).await
    }

    pub async fn generate(&self, user_id: Uuid, payload: Value) -> Response {
        let request = Request::post("/v1/music/generate")
            .header("content-type", "application/json")
            .header("x-user-id", user_id.to_string())
            .body(Body::from(payload.to_string()))
            .unwrap();
        self.send(request).await
    }

    pub async fn balance_of(&self, user_id: Uuid) -> i32 {
        let response = self.get_balance(user_id).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        body["creditsRemaining"].as_i64().expect("creditsRemaining") as i32
    }
}

pub async fn json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("Failed to read body");
    serde_json::from_slice(&bytes).expect("Failed to parse JSON response")
}

/// Asserts the rate limit headers are present and returns `Retry-After`, if any.
pub fn assert_rate_limit_headers(response: &Response) -> Option<u64> {
    let headers = response.headers();
    assert!(headers.contains_key("x-ratelimit-limit"), "Missing X-RateLimit-Limit header");
    assert!(headers.contains_key("x-ratelimit-remaining"), "Missing X-RateLimit-Remaining header");
    assert!(headers.contains_key("x-ratelimit-reset"), "Missing X-RateLimit-Reset header");

    headers
        .get("retry-after")
        .map(|value| value.to_str().unwrap().parse().unwrap())
}

pub struct TestData;

impl TestData {
    pub fn payment(payment_id: &str, user_id: Uuid, credits: i32) -> Value {
        json!({
            "paymentId": payment_id,
            "userId": user_id.to_string(),
            "credits": credits,
        })
    }

    pub fn unique_payment_id() -> String {
        format!("cs_test_{}", &Uuid::new_v4().simple().to_string()[..16])
    }

    pub fn song() -> Value {
        json!({
            "lyrics": "Verse one, the kettle sings\nChorus: morning brings us everything",
            "style": "acoustic pop",
            "title": "Morning Song",
        })
    }
}
