mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use common::*;
use credit_ledger::{AdjustmentContext, AdjustmentReason};
use serde_json::json;
use songcraft_api::music::MusicApiError;

#[tokio::test]
async fn test_health_check() {
    let app = TestApp::new();
    let response = app
        .send(Request::get("/health").body(Body::empty()).unwrap())
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
}

/// Balance 0 + a 10 credit payment → old 0, new 10.
#[tokio::test]
async fn test_payment_webhook_credits_user() {
    let app = TestApp::new();
    let user = app.user_with_balance(0);
    let payment_id = TestData::unique_payment_id();

    let response = app
        .payment_webhook(TestData::payment(&payment_id, user, 10), "203.0.113.1")
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["duplicate"], false);
    assert_eq!(body["oldBalance"], 0);
    assert_eq!(body["newBalance"], 10);

    assert_eq!(app.balance_of(user).await, 10);

    let audit = app.credits.audit_log();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].reason, AdjustmentReason::PaymentProcessed);
    assert_eq!(audit[0].reference.as_deref(), Some(payment_id.as_str()));
}

/// A redelivered callback is acknowledged but does not credit twice.
#[tokio::test]
async fn test_duplicate_payment_webhook_is_ignored() {
    let app = TestApp::new();
    let user = app.user_with_balance(0);
    let payment_id = TestData::unique_payment_id();

    let first = app
        .payment_webhook(TestData::payment(&payment_id, user, 10), "203.0.113.1")
        .await;
    assert_eq!(first.status(), StatusCode::OK);

    let retry = app
        .payment_webhook(TestData::payment(&payment_id, user, 10), "203.0.113.1")
        .await;
    assert_eq!(retry.status(), StatusCode::OK);
    let body = json_body(retry).await;
    assert_eq!(body["duplicate"], true);

    assert_eq!(app.balance_of(user).await, 10);
    assert_eq!(app.credits.audit_log().len(), 1);
}

/// A failed credit records nothing, so the processor's retry can land.
#[tokio::test]
async fn test_failed_credit_leaves_payment_unprocessed() {
    let app = TestApp::new();
    let user = app.user_with_balance(2);
    let payment_id = TestData::unique_payment_id();

    app.credits.set_unavailable(true);
    let response = app
        .payment_webhook(TestData::payment(&payment_id, user, 5), "203.0.113.1")
        .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!app.credits.is_payment_processed(&payment_id));

    app.credits.set_unavailable(false);
    assert_eq!(app.balance_of(user).await, 2);

    let retry = app
        .payment_webhook(TestData::payment(&payment_id, user, 5), "203.0.113.1")
        .await;
    assert_eq!(retry.status(), StatusCode::OK);
    assert_eq!(app.balance_of(user).await, 7);
}

#[tokio::test]
async fn test_webhook_for_unknown_user_is_not_found() {
    let app = TestApp::new();
    let stranger = uuid::Uuid::new_v4();
    let payment_id = TestData::unique_payment_id();

    let response = app
        .payment_webhook(TestData::payment(&payment_id, stranger, 5), "203.0.113.1")
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(!app.credits.is_payment_processed(&payment_id));
}

#[tokio::test]
async fn test_webhook_requires_secret() {
    let app = TestApp::new();
    let user = app.user_with_balance(0);

    let request = Request::post("/v1/payments/webhook")
        .header("content-type", "application/json")
        .header("x-webhook-secret", "wrong")
        .body(Body::from(TestData::payment("cs_x", user, 10).to_string()))
        .unwrap();
    let response = app.send(request).await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(app.balance_of(user).await, 0);
}

/// Dedupe lives in the payment path only: a plain adjustment carrying the
/// same reference still applies, while a redelivered webhook does not.
#[tokio::test]
async fn test_only_payment_path_dedupes() {
    let app = TestApp::new();
    let user = app.user_with_balance(0);
    let payment_id = TestData::unique_payment_id();

    app.payment_webhook(TestData::payment(&payment_id, user, 3), "203.0.113.1")
        .await;
    assert!(app.credits.is_payment_processed(&payment_id));

    let ledger = credit_ledger::CreditLedger::new(app.credits.clone());
    let ctx = AdjustmentContext::default().with_reference(payment_id.clone());
    ledger
        .adjust_credits(&user.to_string(), 3, AdjustmentReason::PaymentProcessed, &ctx)
        .await
        .unwrap();
    assert_eq!(app.balance_of(user).await, 6);

    let redelivered = app
        .payment_webhook(TestData::payment(&payment_id, user, 3), "203.0.113.1")
        .await;
    assert_eq!(json_body(redelivered).await["duplicate"], true);
    assert_eq!(app.balance_of(user).await, 6);
}

#[tokio::test]
async fn test_admin_grant_and_deduction() {
    let app = TestApp::new();
    let user = app.user_with_balance(3);

    let response = app
        .admin_adjust(json!({ "userId": user.to_string(), "amount": 7, "reference": "support-481" }))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["oldBalance"], 3);
    assert_eq!(body["newBalance"], 10);
    assert_eq!(body["change"], 7);

    let response = app
        .admin_adjust(json!({ "userId": user.to_string(), "amount": -4 }))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["newBalance"], 6);

    let audit = app.credits.audit_log();
    assert_eq!(audit.len(), 2);
    assert_eq!(audit[0].reason, AdjustmentReason::AdminGrant);
    assert_eq!(audit[0].reference.as_deref(), Some("support-481"));
    assert_eq!(audit[1].reason, AdjustmentReason::AdminDeduction);
}

/// A debit larger than the balance fails and leaves the balance untouched.
#[tokio::test]
async fn test_admin_overdraft_rejected() {
    let app = TestApp::new();
    let user = app.user_with_balance(3);

    let response = app
        .admin_adjust(json!({ "userId": user.to_string(), "amount": -5 }))
        .await;
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);

    assert_eq!(app.balance_of(user).await, 3);
    assert!(app.credits.audit_log().is_empty());
}

#[tokio::test]
async fn test_admin_requires_token() {
    let app = TestApp::new();
    let user = app.user_with_balance(3);

    let request = Request::post("/v1/admin/credits")
        .header("content-type", "application/json")
        .body(Body::from(json!({ "userId": user.to_string(), "amount": 5 }).to_string()))
        .unwrap();
    assert_eq!(app.send(request).await.status(), StatusCode::UNAUTHORIZED);

    let request = Request::post("/v1/admin/credits")
        .header("content-type", "application/json")
        .header("authorization", "Bearer not-the-token")
        .body(Body::from(json!({ "userId": user.to_string(), "amount": 5 }).to_string()))
        .unwrap();
    assert_eq!(app.send(request).await.status(), StatusCode::FORBIDDEN);

    assert_eq!(app.balance_of(user).await, 3);
}

/// Concurrent webhooks for distinct payments all land: B + 10 + 10.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_payments_do_not_lose_updates() {
    let app = TestApp::new();
    let user = app.user_with_balance(5);

    let first = TestData::payment(&TestData::unique_payment_id(), user, 10);
    let second = TestData::payment(&TestData::unique_payment_id(), user, 10);
    let (a, b) = tokio::join!(
        app.payment_webhook(first, "203.0.113.1"),
        app.payment_webhook(second, "203.0.113.2"),
    );
    assert_eq!(a.status(), StatusCode::OK);
    assert_eq!(b.status(), StatusCode::OK);

    assert_eq!(app.balance_of(user).await, 25);
}

#[tokio::test]
async fn test_generation_charges_one_credit() {
    let app = TestApp::new();
    let user = app.user_with_balance(2);

    let response = app.generate(user, TestData::song()).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["creditsRemaining"], 1);
    assert_eq!(body["generation"]["id"], "song_123");
    assert_eq!(app.balance_of(user).await, 1);

    let calls = app.music.calls.lock().unwrap();
    assert_eq!(calls[0].style.as_deref(), Some("acoustic pop"));
}

#[tokio::test]
async fn test_generation_without_credits_is_refused() {
    let app = TestApp::new();
    let user = app.user_with_balance(0);

    let response = app.generate(user, TestData::song()).await;
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    assert_eq!(app.music.call_count(), 0);
    assert_eq!(app.balance_of(user).await, 0);
}

/// Upstream failure refunds the credit and surfaces the upstream status.
#[tokio::test]
async fn test_failed_generation_is_refunded() {
    let app = TestApp::new();
    let user = app.user_with_balance(4);
    app.music.fail_next(MusicApiError::Upstream {
        status: 422,
        message: "lyrics contain unsupported characters".to_string(),
    });

    let response = app.generate(user, TestData::song()).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = json_body(response).await;
    assert!(body["error"].as_str().unwrap().contains("unsupported characters"));

    assert_eq!(app.balance_of(user).await, 4);

    let reasons: Vec<_> = app.credits.audit_log().iter().map(|r| r.reason).collect();
    assert_eq!(
        reasons,
        vec![AdjustmentReason::MusicGeneration, AdjustmentReason::GenerationRefund]
    );
}

#[tokio::test]
async fn test_busy_music_service_maps_to_unavailable() {
    let app = TestApp::new();
    let user = app.user_with_balance(1);
    app.music.fail_next(MusicApiError::RateLimited { attempts: 4 });

    let response = app.generate(user, TestData::song()).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(app.balance_of(user).await, 1);
}
