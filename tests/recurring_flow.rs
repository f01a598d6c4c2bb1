mod common;

use axum::http::StatusCode;
use masjid_donations::db::{self, models::DonationStatus};
use serde_json::json;

use common::{
    checkout_body, checkout_completed_event, invoice_paid_event, post_json, post_webhook,
    stored_metadata, test_app,
};

#[tokio::test]
async fn recurring_gift_aid_flow_records_subscription_and_renewals() {
    let app = test_app();

    let (status, body) = post_json(
        &app.router,
        "/api/donations/create-checkout-session",
        checkout_body(2000, "building_fund", true, true, "yusuf@example.com"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let session_id = body["sessionId"].as_str().expect("sessionId").to_string();

    // Exactly one declaration, captured at checkout time.
    let donor = db::get_donor_by_email(&app.db, "yusuf@example.com")
        .await
        .expect("query")
        .expect("donor");
    assert!(donor.gift_aid_eligible);
    let declarations = db::list_declarations_for_donor(&app.db, &donor.id)
        .await
        .expect("query");
    assert_eq!(declarations.len(), 1);
    assert_eq!(declarations[0].postcode, "B12 9QR");

    // Initial payment arrives.
    let metadata = stored_metadata(&app.db, &session_id).await;
    let event = checkout_completed_event(
        "evt_sub_1",
        &session_id,
        Some("pi_first"),
        Some("sub_test_1"),
        metadata,
    );
    assert_eq!(post_webhook(&app.router, &event).await, StatusCode::OK);

    let subscription = db::get_subscription(&app.db, "sub_test_1")
        .await
        .expect("query")
        .expect("subscription");
    assert_eq!(subscription.status, "active");
    assert_eq!(subscription.amount, 2000);
    assert_eq!(subscription.fund_type, "building_fund");
    assert!(subscription.gift_aid_eligible);
    assert_eq!(subscription.interval, "month");

    let first = db::find_donation_by_session(&app.db, &session_id)
        .await
        .expect("query")
        .expect("donation");
    assert_eq!(first.status, DonationStatus::Completed);
    assert!(first.is_recurring);
    assert_eq!(first.gift_aid_amount, 500); // 25% of 2000

    // Replay of the completion event: still one subscription, one declaration.
    assert_eq!(post_webhook(&app.router, &event).await, StatusCode::OK);
    let subs = db::list_subscriptions(&app.db, None).await.expect("query");
    assert_eq!(subs.len(), 1);
    let declarations = db::list_declarations_for_donor(&app.db, &donor.id)
        .await
        .expect("query");
    assert_eq!(declarations.len(), 1);

    // A month later the renewal invoice lands.
    let renewal = invoice_paid_event(
        "evt_renew_1",
        "in_renew_1",
        "sub_test_1",
        Some("pi_renew_1"),
        2000,
        "subscription_cycle",
    );
    assert_eq!(post_webhook(&app.router, &renewal).await, StatusCode::OK);

    let renewal_donation = db::find_donation_by_payment_intent(&app.db, "pi_renew_1")
        .await
        .expect("query")
        .expect("renewal donation");
    assert_eq!(renewal_donation.status, DonationStatus::Completed);
    assert!(renewal_donation.is_recurring);
    assert_eq!(renewal_donation.amount, 2000);
    assert_eq!(renewal_donation.gift_aid_amount, 500);
    assert_eq!(
        renewal_donation.stripe_subscription_id.as_deref(),
        Some("sub_test_1")
    );
    // Renewals never write donor or declaration rows.
    let declarations = db::list_declarations_for_donor(&app.db, &donor.id)
        .await
        .expect("query");
    assert_eq!(declarations.len(), 1);

    // Redelivered renewal collapses on the invoice-reference uniqueness.
    assert_eq!(post_webhook(&app.router, &renewal).await, StatusCode::OK);
    let (_, total) = db::list_donations(&app.db, &db::DonationFilter::default())
        .await
        .expect("query");
    assert_eq!(total, 2);
}

#[tokio::test]
async fn first_invoice_of_subscription_is_not_double_counted() {
    let app = test_app();

    let (_, body) = post_json(
        &app.router,
        "/api/donations/create-checkout-session",
        checkout_body(1500, "education", true, false, "maryam@example.com"),
    )
    .await;
    let session_id = body["sessionId"].as_str().expect("sessionId").to_string();

    let metadata = stored_metadata(&app.db, &session_id).await;
    let completed = checkout_completed_event(
        "evt_sub_2",
        &session_id,
        Some("pi_initial"),
        Some("sub_test_2"),
        metadata,
    );
    assert_eq!(post_webhook(&app.router, &completed).await, StatusCode::OK);

    // The subscription's first invoice is reported with a creation reason;
    // the checkout-completed branch already covered it.
    let first_invoice = invoice_paid_event(
        "evt_inv_1",
        "in_initial_1",
        "sub_test_2",
        Some("pi_initial_invoice"),
        1500,
        "subscription_create",
    );
    assert_eq!(post_webhook(&app.router, &first_invoice).await, StatusCode::OK);

    let (_, total) = db::list_donations(&app.db, &db::DonationFilter::default())
        .await
        .expect("query");
    assert_eq!(total, 1);
}

#[tokio::test]
async fn subscription_lifecycle_updates_and_cancellation() {
    let app = test_app();

    let (_, body) = post_json(
        &app.router,
        "/api/donations/create-checkout-session",
        checkout_body(3000, "general", true, false, "omar@example.com"),
    )
    .await;
    let session_id = body["sessionId"].as_str().expect("sessionId").to_string();
    let metadata = stored_metadata(&app.db, &session_id).await;
    let completed = checkout_completed_event(
        "evt_sub_3",
        &session_id,
        Some("pi_sub3"),
        Some("sub_test_3"),
        metadata,
    );
    assert_eq!(post_webhook(&app.router, &completed).await, StatusCode::OK);

    let updated = json!({
        "id": "evt_upd_1",
        "type": "customer.subscription.updated",
        "data": {
            "object": {
                "id": "sub_test_3",
                "status": "past_due",
                "current_period_start": 1767225600_i64,
                "current_period_end": 1769904000_i64,
            }
        }
    });
    assert_eq!(post_webhook(&app.router, &updated).await, StatusCode::OK);
    let sub = db::get_subscription(&app.db, "sub_test_3")
        .await
        .expect("query")
        .expect("subscription");
    assert_eq!(sub.status, "past_due");
    assert!(sub.current_period_end.is_some());

    let deleted = json!({
        "id": "evt_del_1",
        "type": "customer.subscription.deleted",
        "data": {
            "object": {
                "id": "sub_test_3",
                "status": "canceled",
                "current_period_start": null,
                "current_period_end": null,
            }
        }
    });
    assert_eq!(post_webhook(&app.router, &deleted).await, StatusCode::OK);
    let sub = db::get_subscription(&app.db, "sub_test_3")
        .await
        .expect("query")
        .expect("subscription");
    assert_eq!(sub.status, "cancelled");
    assert!(sub.cancelled_at.is_some());
}

#[tokio::test]
async fn renewal_without_payment_reference_is_recorded_once() {
    let app = test_app();

    let (_, body) = post_json(
        &app.router,
        "/api/donations/create-checkout-session",
        checkout_body(2000, "general", true, false, "khadija@example.com"),
    )
    .await;
    let session_id = body["sessionId"].as_str().expect("sessionId").to_string();
    let metadata = stored_metadata(&app.db, &session_id).await;
    let completed = checkout_completed_event(
        "evt_sub_4",
        &session_id,
        Some("pi_sub4"),
        Some("sub_test_4"),
        metadata,
    );
    assert_eq!(post_webhook(&app.router, &completed).await, StatusCode::OK);

    // Credit-balance renewals carry no payment intent; the invoice reference
    // must carry the dedupe on its own.
    let renewal = invoice_paid_event(
        "evt_renew_cb",
        "in_credit_1",
        "sub_test_4",
        None,
        2000,
        "subscription_cycle",
    );
    assert_eq!(post_webhook(&app.router, &renewal).await, StatusCode::OK);
    assert_eq!(post_webhook(&app.router, &renewal).await, StatusCode::OK);

    let (donations, total) = db::list_donations(&app.db, &db::DonationFilter::default())
        .await
        .expect("query");
    assert_eq!(total, 2);
    let recorded = donations
        .iter()
        .find(|d| d.stripe_invoice_id.as_deref() == Some("in_credit_1"))
        .expect("renewal donation");
    assert_eq!(recorded.status, DonationStatus::Completed);
    assert!(recorded.stripe_payment_intent_id.is_none());
}

#[tokio::test]
async fn renewal_for_unknown_subscription_is_acknowledged() {
    let app = test_app();
    let renewal = invoice_paid_event(
        "evt_orphan",
        "in_orphan_1",
        "sub_unknown",
        Some("pi_orphan"),
        999,
        "subscription_cycle",
    );
    assert_eq!(post_webhook(&app.router, &renewal).await, StatusCode::OK);
    let (_, total) = db::list_donations(&app.db, &db::DonationFilter::default())
        .await
        .expect("query");
    assert_eq!(total, 0);
}
