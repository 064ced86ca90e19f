use std::sync::Arc;

use actix_web::{http::StatusCode, test, web, App};
use serde_json::{json, Value};
use tricount::auth::PasswordHasher;
use tricount::dto::{GroupBalancesResponse, GroupResponse, SettlementResponse, UserResponse};
use tricount::routes;
use tricount::service::Service;
use tricount::settlement::Tolerance;
use tricount::store::MemoryStore;

fn service() -> Service {
    Service::new(
        Arc::new(MemoryStore::new()),
        PasswordHasher::new("test-secret").unwrap(),
        Tolerance::default(),
    )
}

macro_rules! send {
    ($app:expr, $request:expr $(,)?) => {
        test::call_service($app, $request.to_request())
    };
}

#[actix_web::test]
async fn a_group_is_settled_over_http() {
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(service()))
            .configure(routes::configure),
    )
    .await;

    let mut users = Vec::new();
    for name in ["Ann", "Bob", "Cid"] {
        let response = send!(
            &app,
            test::TestRequest::post().uri("/api/users").set_json(json!({
                "name": name,
                "email": format!("{}@example.org", name.to_lowercase()),
                "password": "password",
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let body: Value = test::read_body_json(response).await;
        assert!(body.get("password_hash").is_none());
        let user: UserResponse = serde_json::from_value(body).unwrap();
        assert!(user.active);
        users.push(user);
    }
    let ids: Vec<&str> = users.iter().map(|user| user.id.as_str()).collect();

    let response = send!(
        &app,
        test::TestRequest::post()
            .uri("/api/groups")
            .set_json(json!({ "name": "Ski trip", "user_ids": ids })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let group: GroupResponse = test::read_body_json(response).await;
    assert_eq!(group.users.len(), 3);

    let response = send!(
        &app,
        test::TestRequest::post().uri("/api/expenses").set_json(json!({
            "description": "chalet",
            "amount": 90.0,
            "payer_id": ids[0],
            "beneficiary_ids": ids,
            "group_id": group.id,
        })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let expense: Value = test::read_body_json(response).await;
    assert_eq!(expense["status"], "pending");

    let response = send!(
        &app,
        test::TestRequest::get().uri(&format!("/api/groups/{}/balances", group.id)),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let balances: GroupBalancesResponse = test::read_body_json(response).await;
    assert!((balances.balances[ids[0]] - 60.0).abs() < 1e-9);

    let response = send!(
        &app,
        test::TestRequest::post().uri(&format!("/api/settlements/calculate/{}", group.id)),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let settlements: Vec<SettlementResponse> = test::read_body_json(response).await;
    assert_eq!(settlements.len(), 2);
    assert!(settlements
        .iter()
        .all(|s| s.creditor_id == ids[0] && s.amount == 30.0));

    let response = send!(
        &app,
        test::TestRequest::get().uri(&format!("/api/settlements/user/{}/balance", ids[0])),
    )
    .await;
    let balance: Value = test::read_body_json(response).await;
    assert_eq!(balance["balance"], 60.0);

    let response = send!(
        &app,
        test::TestRequest::get().uri(&format!("/api/expenses/group/{}/beneficiary/{}", group.id, ids[2])),
    )
    .await;
    let expenses: Vec<Value> = test::read_body_json(response).await;
    assert_eq!(expenses.len(), 1);

    let response = send!(
        &app,
        test::TestRequest::delete().uri(&format!("/api/settlements/group/{}", group.id)),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[actix_web::test]
async fn errors_carry_status_and_message() {
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(service()))
            .configure(routes::configure),
    )
    .await;

    let response = send!(&app, test::TestRequest::get().uri("/api/groups/missing")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: Value = test::read_body_json(response).await;
    assert_eq!(body["status"], 404);
    assert!(body["error"].as_str().unwrap().contains("missing"));

    let response = send!(
        &app,
        test::TestRequest::post().uri("/api/users").set_json(json!({
            "name": "Ann",
            "email": "not-an-email",
            "password": "password",
        })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = send!(
        &app,
        test::TestRequest::post().uri("/api/settlements/calculate/missing"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn expense_status_and_lookup_routes() {
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(service()))
            .configure(routes::configure),
    )
    .await;

    let response = send!(
        &app,
        test::TestRequest::post().uri("/api/users").set_json(json!({
            "name": "Ann",
            "email": "ann@example.org",
            "password": "password",
        })),
    )
    .await;
    let ann: UserResponse = test::read_body_json(response).await;

    let response = send!(&app, test::TestRequest::get().uri("/api/users/email/ann@example.org")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send!(
        &app,
        test::TestRequest::patch()
            .uri(&format!("/api/users/{}/active", ann.id))
            .set_json(json!({ "active": false })),
    )
    .await;
    let updated: UserResponse = test::read_body_json(response).await;
    assert!(!updated.active);

    let response = send!(
        &app,
        test::TestRequest::post()
            .uri("/api/groups")
            .set_json(json!({ "name": "Flat", "user_ids": [ann.id] })),
    )
    .await;
    let group: GroupResponse = test::read_body_json(response).await;

    let response = send!(
        &app,
        test::TestRequest::post().uri("/api/expenses").set_json(json!({
            "amount": 12.5,
            "payer_id": ann.id,
            "beneficiary_ids": [ann.id],
            "group_id": group.id,
        })),
    )
    .await;
    let expense: Value = test::read_body_json(response).await;
    let expense_id = expense["id"].as_str().unwrap().to_string();

    let response = send!(
        &app,
        test::TestRequest::patch()
            .uri(&format!("/api/expenses/{expense_id}/status"))
            .set_json(json!({ "status": "validated" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send!(&app, test::TestRequest::get().uri("/api/expenses/status/validated")).await;
    let validated: Vec<Value> = test::read_body_json(response).await;
    assert_eq!(validated.len(), 1);

    let response = send!(
        &app,
        test::TestRequest::delete().uri(&format!("/api/expenses/{expense_id}")),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = send!(
        &app,
        test::TestRequest::delete().uri(&format!("/api/expenses/{expense_id}")),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn malformed_requests_get_a_json_error() {
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(service()))
            .configure(routes::configure),
    )
    .await;

    let response = send!(&app, test::TestRequest::get().uri("/api/expenses/status/bogus")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(response).await;
    assert_eq!(body["status"], 400);
    assert!(body["error"].as_str().unwrap().contains("invalid path"));

    let response = send!(
        &app,
        test::TestRequest::post()
            .uri("/api/expenses")
            .set_json(json!({ "amount": "x" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(response).await;
    assert_eq!(body["status"], 400);
    assert!(body["error"].as_str().unwrap().contains("invalid request body"));

    let response = send!(
        &app,
        test::TestRequest::patch()
            .uri("/api/users/anyone/active")
            .insert_header(("content-type", "application/json"))
            .set_payload("{not json"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(response).await;
    assert_eq!(body["status"], 400);
}
