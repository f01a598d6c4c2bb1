#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use tower::ServiceExt;

use masjid_donations::db::{self, DbPool};
use masjid_donations::payments::stripe::{parse_event, verify_signature};
use masjid_donations::payments::{
    CreateCustomer, HostedSession, PaymentProvider, ProviderError, ProviderSubscription,
    SessionParams, WebhookEvent,
};
use masjid_donations::{api_router, AppState};

pub const WEBHOOK_SECRET: &str = "whsec_test123secret456";
pub const ADMIN_TOKEN: &str = "test-admin-token";

/// Stand-in provider: canned customer/session/subscription responses, real
/// signature verification against the test webhook secret.
pub struct FakeProvider {
    counter: AtomicUsize,
}

impl FakeProvider {
    pub fn new() -> Self {
        FakeProvider {
            counter: AtomicUsize::new(0),
        }
    }

    fn next(&self) -> usize {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[async_trait]
impl PaymentProvider for FakeProvider {
    async fn create_customer(&self, _req: &CreateCustomer) -> Result<String, ProviderError> {
        Ok(format!("cus_test_{}", self.next()))
    }

    async fn create_one_time_session(
        &self,
        _params: &SessionParams,
    ) -> Result<HostedSession, ProviderError> {
        let n = self.next();
        Ok(HostedSession {
            id: format!("cs_test_{}", n),
            url: format!("https://checkout.example.com/pay/cs_test_{}", n),
        })
    }

    async fn create_subscription_session(
        &self,
        _params: &SessionParams,
    ) -> Result<HostedSession, ProviderError> {
        let n = self.next();
        Ok(HostedSession {
            id: format!("cs_test_{}", n),
            url: format!("https://checkout.example.com/pay/cs_test_{}", n),
        })
    }

    async fn retrieve_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<ProviderSubscription, ProviderError> {
        let now = Utc::now();
        Ok(ProviderSubscription {
            id: subscription_id.to_string(),
            price_id: Some("price_test_monthly".to_string()),
            status: "active".to_string(),
            current_period_start: Some(now),
            current_period_end: Some(now + Duration::days(30)),
        })
    }

    fn verify_event(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<WebhookEvent, ProviderError> {
        verify_signature(
            payload,
            signature_header,
            WEBHOOK_SECRET,
            Utc::now().timestamp(),
        )?;
        parse_event(payload)
    }
}

pub struct TestApp {
    pub router: Router,
    pub db: DbPool,
}

pub fn test_app() -> TestApp {
    let path = std::env::temp_dir().join(format!("masjid-test-{}.db", uuid::Uuid::new_v4()));
    let db = db::init_pool_at(path.to_str().expect("utf-8 path")).expect("test pool");
    let state = AppState {
        db: db.clone(),
        provider: Arc::new(FakeProvider::new()),
        admin_token: ADMIN_TOKEN.to_string(),
    };
    TestApp {
        router: api_router(state),
        db,
    }
}

/// Computes the `t=<unix>,v1=<hex>` header the webhook endpoint expects.
pub fn sign_payload(payload: &[u8]) -> String {
    let ts = Utc::now().timestamp();
    let mut mac =
        Hmac::<Sha256>::new_from_slice(WEBHOOK_SECRET.as_bytes()).expect("hmac key");
    mac.update(format!("{}.", ts).as_bytes());
    mac.update(payload);
    format!("t={},v1={}", ts, hex::encode(mac.finalize().into_bytes()))
}

pub async fn post_json(router: &Router, path: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request");
    let response = router.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

/// Delivers a correctly signed webhook event.
pub async fn post_webhook(router: &Router, event: &Value) -> StatusCode {
    let payload = event.to_string();
    let signature = sign_payload(payload.as_bytes());
    post_webhook_raw(router, payload.as_bytes(), Some(&signature)).await
}

pub async fn post_webhook_raw(
    router: &Router,
    payload: &[u8],
    signature: Option<&str>,
) -> StatusCode {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/webhooks/stripe")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(sig) = signature {
        builder = builder.header("stripe-signature", sig);
    }
    let request = builder
        .body(Body::from(payload.to_vec()))
        .expect("request");
    let response = router.clone().oneshot(request).await.expect("response");
    response.status()
}

pub async fn get_with_token(
    router: &Router,
    path: &str,
    token: Option<&str>,
) -> (StatusCode, Vec<u8>) {
    let mut builder = Request::builder().method("GET").uri(path);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = builder.body(Body::empty()).expect("request");
    let response = router.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    (status, bytes.to_vec())
}

pub fn checkout_body(
    amount: i64,
    fund_type: &str,
    is_recurring: bool,
    gift_aid: bool,
    email: &str,
) -> Value {
    let donor = if gift_aid {
        json!({
            "fullName": "Aisha Khan",
            "email": email,
            "addressLine1": "12 High Street",
            "city": "Birmingham",
            "postcode": "B12 9QR",
        })
    } else {
        json!({
            "fullName": "Aisha Khan",
            "email": email,
        })
    };
    json!({
        "amount": amount,
        "fundType": fund_type,
        "isRecurring": is_recurring,
        "giftAid": gift_aid,
        "donor": donor,
        "successUrl": "https://example.org/donate/success",
        "cancelUrl": "https://example.org/donate/cancelled",
    })
}

/// Pulls the metadata bag stored on the pending donation, as the provider
/// would echo it back inside its webhook payloads.
pub async fn stored_metadata(db: &DbPool, session_id: &str) -> Value {
    let donation = db::find_donation_by_session(db, session_id)
        .await
        .expect("query")
        .expect("donation for session");
    serde_json::from_str(donation.metadata.as_deref().expect("metadata json")).expect("valid json")
}

pub fn checkout_completed_event(
    event_id: &str,
    session_id: &str,
    payment_intent: Option<&str>,
    subscription: Option<&str>,
    metadata: Value,
) -> Value {
    json!({
        "id": event_id,
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "id": session_id,
                "payment_intent": payment_intent,
                "subscription": subscription,
                "metadata": metadata,
            }
        }
    })
}

pub fn invoice_paid_event(
    event_id: &str,
    invoice_id: &str,
    subscription_id: &str,
    payment_intent: Option<&str>,
    amount_paid: i64,
    billing_reason: &str,
) -> Value {
    json!({
        "id": event_id,
        "type": "invoice.payment_succeeded",
        "data": {
            "object": {
                "id": invoice_id,
                "subscription": subscription_id,
                "billing_reason": billing_reason,
                "payment_intent": payment_intent,
                "amount_paid": amount_paid,
            }
        }
    })
}
