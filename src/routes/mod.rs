pub mod admin;
pub mod auth;
pub mod health;
pub mod orders;
pub mod payments;

use actix_web::web;

use crate::error::AppError;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .error_handler(|err, _req| AppError::Validation(err.to_string()).into()),
    )
    .app_data(
        web::QueryConfig::default()
            .error_handler(|err, _req| AppError::Validation(err.to_string()).into()),
    )
    .service(
        web::scope("/api/v1")
            .service(health::health_check)
            .configure(auth::auth_routes)
            .configure(orders::order_routes)
            .configure(payments::payment_routes)
            .configure(admin::admin_routes),
    );
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use actix_web::cookie::Cookie;
    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use serde_json::{json, Value};

    use super::*;
    use crate::test_support::{self, FakeGateway};
    use crate::utils::jwt::PrincipalKind;

    fn refresh_cookie_of(resp: &actix_web::dev::ServiceResponse) -> Cookie<'static> {
        resp.response()
            .cookies()
            .find(|c| c.name() == auth::REFRESH_COOKIE)
            .map(|c| c.into_owned())
            .expect("refresh cookie set")
    }

    #[actix_web::test]
    async fn test_login_me_refresh_flow() {
        let db = test_support::setup_db().await;
        test_support::create_user(&db, "alice", test_support::PASSWORD).await;
        let state = test_support::app_state(db, None);
        let app = test::init_service(App::new().app_data(web::Data::new(state)).configure(configure_routes)).await;

        let req = test::TestRequest::post()
            .uri("/api/v1/auth/login")
            .insert_header(("User-Agent", test_support::USER_AGENT))
            .set_json(json!({"username": "alice", "password": test_support::PASSWORD}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let first_cookie = refresh_cookie_of(&resp);
        assert!(first_cookie.http_only().unwrap_or(false));
        assert_eq!(first_cookie.path(), Some("/"));
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["token_type"], "bearer");
        assert_eq!(body["expires_in"], 15 * 60);
        let access = body["access_token"].as_str().unwrap().to_string();

        let req = test::TestRequest::get()
            .uri("/api/v1/auth/me")
            .insert_header(("Authorization", format!("Bearer {access}")))
            .to_request();
        let me: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(me["username"], "alice");
        assert!(me.get("hashed_password").is_none());

        let req = test::TestRequest::post()
            .uri("/api/v1/auth/refresh")
            .insert_header(("User-Agent", test_support::USER_AGENT))
            .cookie(first_cookie.clone())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let second_cookie = refresh_cookie_of(&resp);
        assert_ne!(second_cookie.value(), first_cookie.value());
        assert_eq!(
            second_cookie.max_age().map(|age| age.whole_seconds()),
            Some(chrono::Duration::days(30).num_seconds())
        );
        let body: Value = test::read_body_json(resp).await;
        let new_access = body["access_token"].as_str().unwrap().to_string();

        let req = test::TestRequest::get()
            .uri("/api/v1/auth/me")
            .insert_header(("Authorization", format!("Bearer {new_access}")))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

        // the rotated-out token is dead
        let req = test::TestRequest::post()
            .uri("/api/v1/auth/refresh")
            .cookie(first_cookie)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert!(resp.headers().contains_key("www-authenticate"));

        let req = test::TestRequest::get()
            .uri("/api/v1/auth/sessions")
            .insert_header(("Authorization", format!("Bearer {new_access}")))
            .cookie(second_cookie)
            .to_request();
        let sessions: Value = test::call_and_read_body_json(&app, req).await;
        let sessions = sessions.as_array().unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0]["is_current"], true);
        assert_eq!(sessions[0]["browser"], "Firefox 120.0");
    }

    #[actix_web::test]
    async fn test_protected_routes_require_matching_principal() {
        let db = test_support::setup_db().await;
        let state = test_support::app_state(db.clone(), None);
        let tokens = state.tokens.clone();
        let user = test_support::create_user(&db, "alice", test_support::PASSWORD).await;
        let app = test::init_service(App::new().app_data(web::Data::new(state)).configure(configure_routes)).await;

        let req = test::TestRequest::get().uri("/api/v1/orders/").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);

        let user_token = test_support::access_token(&tokens, user.id, "alice", PrincipalKind::User);
        let req = test::TestRequest::get()
            .uri("/api/v1/admin/users/")
            .insert_header(("Authorization", format!("Bearer {user_token}")))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::post()
            .uri("/api/v1/auth/login")
            .set_json(json!({"username": "alice", "password": "wrong-password"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["message"], "Incorrect username or password");
    }

    #[actix_web::test]
    async fn test_cash_on_delivery_order() {
        let db = test_support::setup_db().await;
        let state = test_support::app_state(db.clone(), None);
        let tokens = state.tokens.clone();
        let user = test_support::create_user(&db, "alice", test_support::PASSWORD).await;
        let product = test_support::create_product(&db, "Mug", 5000).await;
        let app = test::init_service(App::new().app_data(web::Data::new(state)).configure(configure_routes)).await;
        let bearer = format!("Bearer {}", test_support::access_token(&tokens, user.id, "alice", PrincipalKind::User));

        let req = test::TestRequest::post()
            .uri("/api/v1/orders/")
            .insert_header(("Authorization", bearer.clone()))
            .set_json(json!({
                "shipping_address": "221B Baker Street",
                "payment_method": "cash_on_delivery",
                "items": [{"product_id": product.id, "quantity": 2}]
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let order: Value = test::read_body_json(resp).await;
        assert_eq!(order["total_amount"], "100.00");
        assert_eq!(order["payment_status"], "pending");
        assert_eq!(order["status"], "pending");
        assert_eq!(order["order_items"][0]["price"], "50.00");

        let req = test::TestRequest::get()
            .uri("/api/v1/orders/")
            .insert_header(("Authorization", bearer.clone()))
            .to_request();
        let orders: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(orders.as_array().unwrap().len(), 1);

        let req = test::TestRequest::post()
            .uri("/api/v1/orders/")
            .insert_header(("Authorization", bearer))
            .set_json(json!({
                "shipping_address": "221B Baker Street",
                "payment_method": "cash_on_delivery",
                "items": []
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["code"], "EMPTY_ORDER");
    }

    #[actix_web::test]
    async fn test_razorpay_checkout() {
        let db = test_support::setup_db().await;
        let gateway = Arc::new(FakeGateway::new());
        let state = test_support::app_state(db.clone(), Some(gateway.clone()));
        let tokens = state.tokens.clone();
        let user = test_support::create_user(&db, "alice", test_support::PASSWORD).await;
        let product = test_support::create_product(&db, "Mug", 5000).await;
        let app = test::init_service(App::new().app_data(web::Data::new(state)).configure(configure_routes)).await;
        let bearer = format!("Bearer {}", test_support::access_token(&tokens, user.id, "alice", PrincipalKind::User));

        let req = test::TestRequest::post()
            .uri("/api/v1/orders/")
            .insert_header(("Authorization", bearer.clone()))
            .set_json(json!({
                "shipping_address": "221B Baker Street",
                "payment_method": "razorpay",
                "items": [{"product_id": product.id, "quantity": 1}]
            }))
            .to_request();
        let order: Value = test::call_and_read_body_json(&app, req).await;
        let order_id = order["id"].as_i64().unwrap();

        let req = test::TestRequest::post()
            .uri("/api/v1/payments/razorpay/order")
            .insert_header(("Authorization", bearer.clone()))
            .set_json(json!({"order_id": order_id}))
            .to_request();
        let intent: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(intent["key_id"], test_support::GATEWAY_KEY_ID);
        assert_eq!(intent["amount"], 5000);
        assert_eq!(intent["currency"], "INR");
        let provider_order_id = intent["provider_order_id"].as_str().unwrap().to_string();

        let req = test::TestRequest::post()
            .uri("/api/v1/payments/razorpay/verify")
            .insert_header(("Authorization", bearer.clone()))
            .set_json(json!({
                "order_id": order_id,
                "razorpay_order_id": provider_order_id,
                "razorpay_payment_id": "pay_123",
                "razorpay_signature": "00ff"
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::post()
            .uri("/api/v1/payments/razorpay/verify")
            .insert_header(("Authorization", bearer.clone()))
            .set_json(json!({
                "order_id": order_id,
                "razorpay_order_id": provider_order_id,
                "razorpay_payment_id": "pay_123",
                "razorpay_signature": test_support::sign(&provider_order_id, "pay_123")
            }))
            .to_request();
        let verified: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(verified["order"]["payment_status"], "paid");
        assert_eq!(verified["order"]["status"], "processing");

        let req = test::TestRequest::post()
            .uri("/api/v1/payments/stripe/order")
            .insert_header(("Authorization", bearer))
            .set_json(json!({"order_id": order_id}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
        assert_eq!(gateway.orders_created(), 1);
    }

    #[actix_web::test]
    async fn test_payments_disabled_without_credentials() {
        let db = test_support::setup_db().await;
        let state = test_support::app_state(db.clone(), None);
        let tokens = state.tokens.clone();
        let user = test_support::create_user(&db, "alice", test_support::PASSWORD).await;
        let app = test::init_service(App::new().app_data(web::Data::new(state)).configure(configure_routes)).await;

        let req = test::TestRequest::post()
            .uri("/api/v1/payments/razorpay/order")
            .insert_header((
                "Authorization",
                format!("Bearer {}", test_support::access_token(&tokens, user.id, "alice", PrincipalKind::User)),
            ))
            .set_json(json!({"order_id": 1}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[actix_web::test]
    async fn test_admin_manages_orders_and_users() {
        let db = test_support::setup_db().await;
        let state = test_support::app_state(db.clone(), None);
        let tokens = state.tokens.clone();
        let admin = test_support::create_admin(&db, "root").await;
        let user = test_support::create_user(&db, "alice", test_support::PASSWORD).await;
        let product = test_support::create_product(&db, "Mug", 5000).await;
        let app = test::init_service(App::new().app_data(web::Data::new(state)).configure(configure_routes)).await;
        let admin_bearer =
            format!("Bearer {}", test_support::access_token(&tokens, admin.id, "root", PrincipalKind::Admin));
        let user_bearer =
            format!("Bearer {}", test_support::access_token(&tokens, user.id, "alice", PrincipalKind::User));

        let req = test::TestRequest::post()
            .uri("/api/v1/orders/")
            .insert_header(("Authorization", user_bearer.clone()))
            .set_json(json!({
                "shipping_address": "221B Baker Street",
                "payment_method": "cash_on_delivery",
                "items": [{"product_id": product.id, "quantity": 1}]
            }))
            .to_request();
        let order: Value = test::call_and_read_body_json(&app, req).await;

        let req = test::TestRequest::put()
            .uri(&format!("/api/v1/admin/orders/{}", order["id"]))
            .insert_header(("Authorization", admin_bearer.clone()))
            .set_json(json!({"status": "shipped"}))
            .to_request();
        let updated: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(updated["status"], "shipped");
        assert_eq!(updated["payment_status"], "pending");

        let req = test::TestRequest::patch()
            .uri(&format!("/api/v1/admin/users/{}", user.id))
            .insert_header(("Authorization", admin_bearer))
            .set_json(json!({"is_active": false}))
            .to_request();
        let patched: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(patched["is_active"], false);

        let req = test::TestRequest::get()
            .uri("/api/v1/auth/me")
            .insert_header(("Authorization", user_bearer))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }
}
