mod common;

use axum::http::StatusCode;
use rust_decimal_macros::dec;
use sea_orm::ConnectionTrait;
use serde_json::json;

use common::{start_checkout, TestApp};
use storefront_api::entities::product::ProductSize;

#[tokio::test]
async fn create_session_snapshots_cart_into_metadata() {
    let app = TestApp::spawn().await;
    let user_id = app.seed_user("shopper@example.com").await;
    let product = app.seed_product("Classic Tee", dec!(19.99)).await;
    app.seed_cart_item(user_id, product.id, ProductSize::Medium, 2)
        .await;
    let token = app.token_for(user_id, "shopper@example.com");

    let session_id = start_checkout(&app, &token).await;

    let session = app.gateway.session(&session_id).unwrap();
    assert_eq!(session.metadata.get("userId").unwrap(), &user_id.to_string());
    assert_eq!(session.metadata.get("serverTotalCents").unwrap(), "3998");
    assert!(session.metadata.get("cartItems").unwrap().contains("Classic Tee"));
    assert!(session.metadata.get("shipping").unwrap().contains("Austin"));

    // The response carries the redirect URL and the server total.
    let (status, body) = app
        .request(
            "POST",
            "/api/v1/payments/create-checkout-session",
            Some(&token),
            Some(json!({
                "shipping": {
                    "name": "Jordan Doe",
                    "address": "1 Main St",
                    "city": "Austin",
                    "postal_code": "78701",
                    "country": "US"
                }
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["url"].as_str().unwrap().starts_with("https://pay.test/"));
    assert_eq!(body["amount"], "39.98");

    // The pending payment row is visible through the status endpoint.
    let (status, body) = app
        .request(
            "GET",
            &format!("/api/v1/payments/status/{}", session_id),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "pending");
}

#[tokio::test]
async fn deleted_products_are_excluded_from_the_session() {
    let app = TestApp::spawn().await;
    let user_id = app.seed_user("shopper@example.com").await;
    let kept = app.seed_product("Classic Tee", dec!(19.99)).await;
    let doomed = app.seed_product("Discontinued Cap", dec!(12.00)).await;
    app.seed_cart_item(user_id, kept.id, ProductSize::Medium, 1)
        .await;
    app.seed_cart_item(user_id, doomed.id, ProductSize::Small, 1)
        .await;

    use sea_orm::EntityTrait;
    storefront_api::entities::product::Entity::delete_by_id(doomed.id)
        .exec(&*app.db)
        .await
        .unwrap();

    let token = app.token_for(user_id, "shopper@example.com");
    let session_id = start_checkout(&app, &token).await;

    let session = app.gateway.session(&session_id).unwrap();
    assert_eq!(session.metadata.get("serverTotalCents").unwrap(), "1999");
    let snapshot = session.metadata.get("cartItems").unwrap();
    assert!(snapshot.contains("Classic Tee"));
    assert!(!snapshot.contains("Discontinued Cap"));
}

#[tokio::test]
async fn create_session_rejects_empty_cart() {
    let app = TestApp::spawn().await;
    let user_id = app.seed_user("shopper@example.com").await;
    let token = app.token_for(user_id, "shopper@example.com");

    let (status, body) = app
        .request(
            "POST",
            "/api/v1/payments/create-checkout-session",
            Some(&token),
            Some(json!({
                "shipping": {
                    "name": "Jordan Doe",
                    "address": "1 Main St",
                    "city": "Austin",
                    "postal_code": "78701",
                    "country": "US"
                }
            })),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("Cart is empty"));
}

#[tokio::test]
async fn create_session_rejects_blank_shipping_fields() {
    let app = TestApp::spawn().await;
    let user_id = app.seed_user("shopper@example.com").await;
    let token = app.token_for(user_id, "shopper@example.com");

    let (status, _) = app
        .request(
            "POST",
            "/api/v1/payments/create-checkout-session",
            Some(&token),
            Some(json!({
                "shipping": {
                    "name": "",
                    "address": "1 Main St",
                    "city": "Austin",
                    "postal_code": "78701",
                    "country": "US"
                }
            })),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn completing_unpaid_session_returns_402_with_gateway_status() {
    let app = TestApp::spawn().await;
    let user_id = app.seed_user("shopper@example.com").await;
    let product = app.seed_product("Classic Tee", dec!(19.99)).await;
    app.seed_cart_item(user_id, product.id, ProductSize::Medium, 1)
        .await;
    let token = app.token_for(user_id, "shopper@example.com");

    let session_id = start_checkout(&app, &token).await;

    let (status, body) = app
        .request(
            "POST",
            "/api/v1/payments/complete-checkout",
            Some(&token),
            Some(json!({ "session_id": session_id })),
        )
        .await;

    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(
        body["message"],
        "Payment not completed. Status: unpaid"
    );
}

#[tokio::test]
async fn paid_session_creates_order_and_clears_cart() {
    let app = TestApp::spawn().await;
    let user_id = app.seed_user("shopper@example.com").await;
    let product = app.seed_product("Hoodie", dec!(50.00)).await;
    app.seed_cart_item(user_id, product.id, ProductSize::Large, 1)
        .await;
    let token = app.token_for(user_id, "shopper@example.com");

    let session_id = start_checkout(&app, &token).await;
    app.gateway.mark_paid(&session_id);

    let (status, body) = app
        .request(
            "POST",
            "/api/v1/payments/complete-checkout",
            Some(&token),
            Some(json!({ "session_id": session_id })),
        )
        .await;

    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["already_processed"], false);
    assert_eq!(body["cart_cleared"], true);
    assert_eq!(body["order"]["checkout_session_id"], session_id.as_str());
    assert_eq!(body["order"]["status"], "confirmed");
    assert_eq!(body["items"].as_array().unwrap().len(), 1);
    assert_eq!(body["items"][0]["name"], "Hoodie");
    assert_eq!(body["payment"]["status"], "paid");
    assert!(body["order"]["order_number"]
        .as_str()
        .unwrap()
        .starts_with("ORD-"));

    // Cart is empty afterwards.
    let (status, cart) = app.request("GET", "/api/v1/cart", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(cart["items"].as_array().unwrap().is_empty());

    // Confirmation mail went to the account address.
    let sent = app.mailer.sent_to.lock().unwrap();
    assert_eq!(sent.as_slice(), ["shopper@example.com"]);
}

#[tokio::test]
async fn completion_is_idempotent_per_session() {
    let app = TestApp::spawn().await;
    let user_id = app.seed_user("shopper@example.com").await;
    let product = app.seed_product("Hoodie", dec!(50.00)).await;
    app.seed_cart_item(user_id, product.id, ProductSize::Large, 1)
        .await;
    let token = app.token_for(user_id, "shopper@example.com");

    let session_id = start_checkout(&app, &token).await;
    app.gateway.mark_paid(&session_id);

    let (first_status, first) = app
        .request(
            "POST",
            "/api/v1/payments/complete-checkout",
            Some(&token),
            Some(json!({ "session_id": session_id })),
        )
        .await;
    assert_eq!(first_status, StatusCode::CREATED);

    let (second_status, second) = app
        .request(
            "POST",
            "/api/v1/payments/complete-checkout",
            Some(&token),
            Some(json!({ "session_id": session_id })),
        )
        .await;

    assert_eq!(second_status, StatusCode::OK);
    assert_eq!(second["already_processed"], true);
    assert_eq!(second["message"], "Order already processed");
    assert_eq!(second["order"]["id"], first["order"]["id"]);

    // Only one order exists for the user.
    let (_, orders) = app.request("GET", "/api/v1/orders", Some(&token), None).await;
    assert_eq!(orders.as_array().unwrap().len(), 1);

    // Exactly one confirmation mail.
    assert_eq!(app.mailer.sent_to.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn losing_a_completion_race_resolves_to_the_winning_order() {
    let app = TestApp::spawn().await;
    let user_id = app.seed_user("shopper@example.com").await;
    let product = app.seed_product("Hoodie", dec!(50.00)).await;
    app.seed_cart_item(user_id, product.id, ProductSize::Large, 1)
        .await;
    let token = app.token_for(user_id, "shopper@example.com");

    let session_id = start_checkout(&app, &token).await;
    app.gateway.mark_paid(&session_id);
    // A rival completion commits its order between this request's
    // idempotency pre-check and its own insert, so the insert hits the
    // unique index on the session id.
    app.gateway.race_with(app.db.clone(), user_id, "ORD-RIVAL001");

    let (status, body) = app
        .request(
            "POST",
            "/api/v1/payments/complete-checkout",
            Some(&token),
            Some(json!({ "session_id": session_id })),
        )
        .await;

    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["already_processed"], true);
    assert_eq!(body["order"]["order_number"], "ORD-RIVAL001");

    // The winner's order is the only one for the session.
    let (_, orders) = app.request("GET", "/api/v1/orders", Some(&token), None).await;
    assert_eq!(orders.as_array().unwrap().len(), 1);
    assert_eq!(orders[0]["order_number"], "ORD-RIVAL001");

    // The loser never sends a second confirmation mail.
    assert!(app.mailer.sent_to.lock().unwrap().is_empty());
}

#[tokio::test]
async fn session_owned_by_another_user_is_forbidden() {
    let app = TestApp::spawn().await;
    let owner = app.seed_user("owner@example.com").await;
    let intruder = app.seed_user("intruder@example.com").await;
    let product = app.seed_product("Hoodie", dec!(50.00)).await;
    app.seed_cart_item(owner, product.id, ProductSize::Large, 1)
        .await;

    let owner_token = app.token_for(owner, "owner@example.com");
    let intruder_token = app.token_for(intruder, "intruder@example.com");

    let session_id = start_checkout(&app, &owner_token).await;
    app.gateway.mark_paid(&session_id);

    let (status, _) = app
        .request(
            "POST",
            "/api/v1/payments/complete-checkout",
            Some(&intruder_token),
            Some(json!({ "session_id": session_id })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn unknown_session_returns_not_found() {
    let app = TestApp::spawn().await;
    let user_id = app.seed_user("shopper@example.com").await;
    let token = app.token_for(user_id, "shopper@example.com");

    let (status, _) = app
        .request(
            "POST",
            "/api/v1/payments/complete-checkout",
            Some(&token),
            Some(json!({ "session_id": "cs_missing" })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn gateway_total_overrides_recorded_total() {
    let app = TestApp::spawn().await;
    let user_id = app.seed_user("shopper@example.com").await;
    let product = app.seed_product("Hoodie", dec!(50.00)).await;
    app.seed_cart_item(user_id, product.id, ProductSize::Large, 1)
        .await;
    let token = app.token_for(user_id, "shopper@example.com");

    let session_id = start_checkout(&app, &token).await;
    app.gateway.mark_paid(&session_id);
    // Gateway settled a different amount (e.g. shipping and tax added
    // by the hosted page).
    app.gateway.set_amount_total(&session_id, 6099);

    let (status, body) = app
        .request(
            "POST",
            "/api/v1/payments/complete-checkout",
            Some(&token),
            Some(json!({ "session_id": session_id })),
        )
        .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["order"]["total_amount"], "60.99");
    assert_eq!(body["payment"]["amount"], "60.99");
}

#[tokio::test]
async fn email_failure_does_not_fail_checkout() {
    let app = TestApp::spawn().await;
    let user_id = app.seed_user("shopper@example.com").await;
    let product = app.seed_product("Hoodie", dec!(50.00)).await;
    app.seed_cart_item(user_id, product.id, ProductSize::Large, 1)
        .await;
    let token = app.token_for(user_id, "shopper@example.com");

    let session_id = start_checkout(&app, &token).await;
    app.gateway.mark_paid(&session_id);
    app.mailer
        .fail
        .store(true, std::sync::atomic::Ordering::SeqCst);

    let (status, body) = app
        .request(
            "POST",
            "/api/v1/payments/complete-checkout",
            Some(&token),
            Some(json!({ "session_id": session_id })),
        )
        .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["cart_cleared"], true);
}

#[tokio::test]
async fn cart_clear_failure_still_completes_checkout() {
    let app = TestApp::spawn().await;
    let user_id = app.seed_user("shopper@example.com").await;
    let product = app.seed_product("Hoodie", dec!(50.00)).await;
    app.seed_cart_item(user_id, product.id, ProductSize::Large, 1)
        .await;
    let token = app.token_for(user_id, "shopper@example.com");

    let session_id = start_checkout(&app, &token).await;
    app.gateway.mark_paid(&session_id);

    // Break the cart table out from under the service.
    app.db
        .execute_unprepared("DROP TABLE cart_items")
        .await
        .unwrap();

    let (status, body) = app
        .request(
            "POST",
            "/api/v1/payments/complete-checkout",
            Some(&token),
            Some(json!({ "session_id": session_id })),
        )
        .await;

    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["cart_cleared"], false);
    assert_eq!(body["already_processed"], false);
}

#[tokio::test]
async fn payment_status_refreshes_pending_sessions() {
    let app = TestApp::spawn().await;
    let user_id = app.seed_user("shopper@example.com").await;
    let product = app.seed_product("Hoodie", dec!(50.00)).await;
    app.seed_cart_item(user_id, product.id, ProductSize::Large, 1)
        .await;
    let token = app.token_for(user_id, "shopper@example.com");

    let session_id = start_checkout(&app, &token).await;
    app.gateway.mark_paid(&session_id);

    // No completion call yet; the status endpoint refreshes from the
    // gateway and flips the local row.
    let (status, body) = app
        .request(
            "GET",
            &format!("/api/v1/payments/status/{}", session_id),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "paid");
    assert!(body["order_id"].is_null());
}

#[tokio::test]
async fn payment_status_hides_other_users_sessions() {
    let app = TestApp::spawn().await;
    let owner = app.seed_user("owner@example.com").await;
    let intruder = app.seed_user("intruder@example.com").await;
    let product = app.seed_product("Hoodie", dec!(50.00)).await;
    app.seed_cart_item(owner, product.id, ProductSize::Large, 1)
        .await;

    let owner_token = app.token_for(owner, "owner@example.com");
    let session_id = start_checkout(&app, &owner_token).await;

    let intruder_token = app.token_for(intruder, "intruder@example.com");
    let (status, _) = app
        .request(
            "GET",
            &format!("/api/v1/payments/status/{}", session_id),
            Some(&intruder_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn checkout_requires_authentication() {
    let app = TestApp::spawn().await;

    let (status, _) = app
        .request(
            "POST",
            "/api/v1/payments/complete-checkout",
            None,
            Some(json!({ "session_id": "cs_x" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
