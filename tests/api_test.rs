mod helpers;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use helpers::{PropertyBuilder, TestApp, UserBuilder};
use rentdesk::storage;
use serde_json::{json, Value};

/// Owner with one listing, a tenant, and tokens for both.
struct Fixture {
    app: TestApp,
    owner_token: String,
    tenant_token: String,
    property_id: i64,
}

async fn fixture() -> Fixture {
    let app = TestApp::new().await;
    let owner = UserBuilder::new("owner@example.com").owner().create(app.db()).await;
    let tenant = UserBuilder::new("a@b.com").create(app.db()).await;
    let property = PropertyBuilder::new(owner.id).create(app.db()).await;

    Fixture {
        owner_token: app.token_for(&owner),
        tenant_token: app.token_for(&tenant),
        property_id: property.id as i64,
        app,
    }
}

async fn book(f: &Fixture, when: &str) -> Value {
    let resp = f
        .app
        .post(
            &format!("/api/visits/book?propertyId={}", f.property_id),
            Some(&f.tenant_token),
            json!({"tenantName": "Ann", "tenantEmail": "a@b.com", "visitDateTime": when}),
        )
        .await;
    assert_eq!(resp.status, StatusCode::OK, "{:?}", resp.body);
    resp.body
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_register_login_and_me() {
    let app = TestApp::new().await;

    let resp = app
        .post(
            "/api/auth/register",
            None,
            json!({"name": "Olga", "email": "Olga@Example.com", "password": "pw"}),
        )
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.body["user"]["role"], "OWNER");
    assert_eq!(resp.body["user"]["email"], "olga@example.com");
    assert!(resp.body["user"].get("passwordHash").is_none());

    let resp = app
        .post(
            "/api/auth/login",
            None,
            json!({"email": "olga@example.com", "password": "pw"}),
        )
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    let token = resp.body["token"].as_str().unwrap().to_string();

    let me = app.get("/api/auth/me", Some(&token)).await;
    assert_eq!(me.status, StatusCode::OK);
    assert_eq!(me.body["name"], "Olga");
}

#[tokio::test]
async fn test_register_rejects_duplicates_and_privileged_roles() {
    let app = TestApp::new().await;
    let body = json!({"name": "T", "email": "t@example.com", "password": "pw", "role": "TENANT"});

    assert_eq!(app.post("/api/auth/register", None, body.clone()).await.status, StatusCode::OK);

    let dup = app.post("/api/auth/register", None, body).await;
    assert_eq!(dup.status, StatusCode::BAD_REQUEST);
    assert_eq!(dup.body, json!({"error": "Email already exists"}));

    let admin = app
        .post(
            "/api/auth/register",
            None,
            json!({"name": "X", "email": "x@example.com", "password": "pw", "role": "ADMIN"}),
        )
        .await;
    assert_eq!(admin.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_bad_credentials_and_missing_token() {
    let app = TestApp::new().await;
    UserBuilder::new("u@example.com").create(app.db()).await;

    let resp = app
        .post(
            "/api/auth/login",
            None,
            json!({"email": "u@example.com", "password": "nope"}),
        )
        .await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
    assert_eq!(resp.body, json!({"error": "Invalid credentials"}));

    assert_eq!(app.get("/api/visits", None).await.status, StatusCode::UNAUTHORIZED);
    assert_eq!(
        app.get("/api/visits", Some("garbage")).await.status,
        StatusCode::UNAUTHORIZED
    );
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_property_listing_and_search_are_public() {
    let app = TestApp::new().await;
    let owner = UserBuilder::new("o@example.com").owner().create(app.db()).await;
    PropertyBuilder::new(owner.id).in_city("Paris").priced(900.0).create(app.db()).await;
    PropertyBuilder::new(owner.id)
        .in_city("Lyon")
        .of_type(storage::PropertyType::Villa)
        .priced(4000.0)
        .create(app.db())
        .await;

    let by_city = app.get("/api/properties?city=%20paris%20", None).await;
    assert_eq!(by_city.status, StatusCode::OK);
    assert_eq!(by_city.body.as_array().unwrap().len(), 1);

    let all = app.get("/api/properties", None).await;
    assert_eq!(all.body.as_array().unwrap().len(), 2);

    let search = app
        .get("/api/properties/search?type=VILLA&min=1000", None)
        .await;
    assert_eq!(search.status, StatusCode::OK);
    let found = search.body.as_array().unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0]["city"], "Lyon");
    assert_eq!(found[0]["type"], "VILLA");

    assert_eq!(app.get("/api/properties/999", None).await.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_property_create_is_role_gated() {
    let f = fixture().await;
    let listing = json!({
        "title": "Cottage", "description": "", "address": "Lane 3",
        "city": "York", "price": 800.0, "type": "HOUSE"
    });

    let as_tenant = f.app.post("/api/properties", Some(&f.tenant_token), listing.clone()).await;
    assert_eq!(as_tenant.status, StatusCode::FORBIDDEN);

    let as_owner = f.app.post("/api/properties", Some(&f.owner_token), listing.clone()).await;
    assert_eq!(as_owner.status, StatusCode::OK);
    assert_eq!(as_owner.body["ownerEmail"], "owner@example.com");
    assert_eq!(as_owner.body["ownerName"], "owner");
    assert_eq!(as_owner.body["available"], true);

    let for_someone_else = f
        .app
        .post("/api/properties?ownerId=999", Some(&f.owner_token), listing.clone())
        .await;
    assert_eq!(for_someone_else.status, StatusCode::FORBIDDEN);

    let admin = UserBuilder::new("root@example.com").admin().create(f.app.db()).await;
    let owner = storage::get_user_by_email(f.app.db(), "owner@example.com")
        .await
        .unwrap()
        .unwrap();
    let on_behalf = f
        .app
        .post(
            &format!("/api/properties?ownerId={}", owner.id),
            Some(&f.app.token_for(&admin)),
            listing,
        )
        .await;
    assert_eq!(on_behalf.status, StatusCode::OK);
    assert_eq!(on_behalf.body["ownerId"], owner.id);
}

#[tokio::test]
async fn test_only_owner_or_admin_may_edit() {
    let f = fixture().await;
    let intruder = UserBuilder::new("other@example.com").owner().create(f.app.db()).await;
    let update = json!({
        "title": "Renamed", "address": "12 Canal St", "city": "Amsterdam",
        "price": 1600.0, "type": "APARTMENT"
    });
    let uri = format!("/api/properties/{}", f.property_id);

    let resp = f.app.put(&uri, Some(&f.app.token_for(&intruder)), Some(update.clone())).await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);

    let resp = f.app.put(&uri, Some(&f.owner_token), Some(update.clone())).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.body["title"], "Renamed");

    let resp = f
        .app
        .put("/api/properties/4242", Some(&f.owner_token), Some(update))
        .await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_property_removes_visits_and_leases() {
    let f = fixture().await;
    let visit = book(&f, "2025-01-10T14:00").await;
    let lease = f
        .app
        .post(
            &format!("/api/leases?propertyId={}", f.property_id),
            Some(&f.tenant_token),
            json!({"tenantName": "Ann", "startDate": "2025-02-01", "endDate": "2026-01-31", "monthlyRent": 1500.0}),
        )
        .await;
    assert_eq!(lease.status, StatusCode::OK);

    let uri = format!("/api/properties/{}", f.property_id);
    assert_eq!(f.app.delete(&uri, Some(&f.tenant_token)).await.status, StatusCode::FORBIDDEN);
    assert_eq!(f.app.delete(&uri, Some(&f.owner_token)).await.status, StatusCode::NO_CONTENT);

    let visit_uri = format!("/api/visits/{}", visit["id"]);
    let lease_uri = format!("/api/leases/{}", lease.body["id"]);
    assert_eq!(f.app.get(&visit_uri, Some(&f.owner_token)).await.status, StatusCode::NOT_FOUND);
    assert_eq!(f.app.get(&lease_uri, Some(&f.owner_token)).await.status, StatusCode::NOT_FOUND);
    assert_eq!(f.app.get(&uri, None).await.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_admin_toggle() {
    let f = fixture().await;
    let admin = UserBuilder::new("root@example.com").admin().create(f.app.db()).await;
    let uri = format!("/api/admin/properties/{}/toggle", f.property_id);

    assert_eq!(f.app.put(&uri, Some(&f.owner_token), None).await.status, StatusCode::FORBIDDEN);

    let resp = f.app.put(&uri, Some(&f.app.token_for(&admin)), None).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.body["available"], false);

    let listing = f.app.get("/api/admin/properties", Some(&f.tenant_token)).await;
    assert_eq!(listing.status, StatusCode::OK);
    assert_eq!(listing.body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_image_upload_is_served_back() {
    let f = fixture().await;
    let boundary = "rentdeskboundary";
    let body = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"front.PNG\"\r\nContent-Type: image/png\r\n\r\nPNGDATA\r\n--{boundary}--\r\n"
    );
    let request = Request::builder()
        .method(Method::POST)
        .uri(format!("/api/properties/{}/images", f.property_id))
        .header(header::AUTHORIZATION, format!("Bearer {}", f.owner_token))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap();

    let resp = f.app.send(request).await;
    assert_eq!(resp.status, StatusCode::OK, "{:?}", resp.body);
    let url = resp.body["imageUrls"][0].as_str().unwrap().to_string();
    assert!(url.starts_with("/uploads/") && url.ends_with(".png"));

    let served = f.app.get(&url, None).await;
    assert_eq!(served.status, StatusCode::OK);
    assert_eq!(served.body, Value::String("PNGDATA".into()));
}

#[tokio::test]
async fn test_image_upload_with_empty_part_changes_nothing() {
    let f = fixture().await;
    let boundary = "rentdeskboundary";
    let body = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"one.png\"\r\nContent-Type: image/png\r\n\r\nPNGDATA\r\n\
         --{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"two.png\"\r\nContent-Type: image/png\r\n\r\n\r\n\
         --{boundary}--\r\n"
    );
    let request = Request::builder()
        .method(Method::POST)
        .uri(format!("/api/properties/{}/images", f.property_id))
        .header(header::AUTHORIZATION, format!("Bearer {}", f.owner_token))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap();

    let resp = f.app.send(request).await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST, "{:?}", resp.body);
    assert_eq!(resp.body["error"], "Uploaded file is empty");

    let property = f
        .app
        .get(&format!("/api/properties/{}", f.property_id), None)
        .await;
    assert_eq!(property.body["imageUrls"], json!([]));

    let stored = std::fs::read_dir(f.app.uploads.path())
        .map(|entries| entries.count())
        .unwrap_or(0);
    assert_eq!(stored, 0);
}

// ---------------------------------------------------------------------------
// Visits
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_visit_reschedule_accept_flow() {
    let f = fixture().await;
    let visit = book(&f, "2025-01-10T14:00").await;
    assert_eq!(visit["status"], "PENDING");
    assert_eq!(visit["rescheduleStatus"], "NONE");
    assert_eq!(visit["visitDateTime"], "2025-01-10T14:00:00");
    assert_eq!(visit["proposedDateTime"], Value::Null);

    let id = &visit["id"];
    let requested = f
        .app
        .put(
            &format!("/api/visits/{id}/reschedule?proposedDateTime=2025-01-12T10:00"),
            Some(&f.owner_token),
            None,
        )
        .await;
    assert_eq!(requested.status, StatusCode::OK);
    assert_eq!(requested.body["rescheduleStatus"], "REQUESTED");
    assert_eq!(requested.body["proposedDateTime"], "2025-01-12T10:00:00");

    let accepted = f
        .app
        .put(
            &format!("/api/visits/{id}/reschedule/decision?decision=ACCEPTED"),
            Some(&f.tenant_token),
            None,
        )
        .await;
    assert_eq!(accepted.status, StatusCode::OK);
    assert_eq!(accepted.body["visitDateTime"], "2025-01-12T10:00:00");
    assert_eq!(accepted.body["proposedDateTime"], Value::Null);
    assert_eq!(accepted.body["rescheduleStatus"], "ACCEPTED");
}

#[tokio::test]
async fn test_reschedule_bad_input_is_rejected_without_change() {
    let f = fixture().await;
    let visit = book(&f, "2025-01-10T14:00").await;
    let id = &visit["id"];

    let bad_time = f
        .app
        .put(
            &format!("/api/visits/{id}/reschedule?proposedDateTime=next-week"),
            Some(&f.owner_token),
            None,
        )
        .await;
    assert_eq!(bad_time.status, StatusCode::BAD_REQUEST);

    let no_proposal = f
        .app
        .put(
            &format!("/api/visits/{id}/reschedule/decision?decision=accepted"),
            Some(&f.tenant_token),
            None,
        )
        .await;
    assert_eq!(no_proposal.status, StatusCode::BAD_REQUEST);

    let unknown = f
        .app
        .put(
            &format!("/api/visits/{id}/reschedule/decision?decision=MAYBE"),
            Some(&f.tenant_token),
            None,
        )
        .await;
    assert_eq!(unknown.status, StatusCode::BAD_REQUEST);

    let after = f.app.get(&format!("/api/visits/{id}"), Some(&f.tenant_token)).await;
    assert_eq!(after.body, visit);
}

#[tokio::test]
async fn test_visit_scopes_are_enforced() {
    let f = fixture().await;
    let visit = book(&f, "2025-01-10T14:00").await;
    let id = &visit["id"];
    let stranger = UserBuilder::new("stranger@example.com").create(f.app.db()).await;
    let stranger_token = f.app.token_for(&stranger);

    // tenant cannot use owner endpoints
    for uri in [
        format!("/api/visits/{id}/status?value=DONE"),
        format!("/api/visits/{id}/reschedule?proposedDateTime=2025-01-12T10:00"),
    ] {
        assert_eq!(
            f.app.put(&uri, Some(&f.tenant_token), None).await.status,
            StatusCode::FORBIDDEN,
            "{uri}"
        );
    }

    // owner cannot use tenant endpoints
    for uri in [
        format!("/api/visits/{id}/tenant-status?value=CANCELLED"),
        format!("/api/visits/{id}/reschedule/decision?decision=DECLINED"),
    ] {
        assert_eq!(
            f.app.put(&uri, Some(&f.owner_token), None).await.status,
            StatusCode::FORBIDDEN,
            "{uri}"
        );
    }

    assert_eq!(
        f.app.get(&format!("/api/visits/{id}"), Some(&stranger_token)).await.status,
        StatusCode::FORBIDDEN
    );

    // not found wins over forbidden
    assert_eq!(
        f.app
            .put("/api/visits/9999/status?value=DONE", Some(&f.tenant_token), None)
            .await
            .status,
        StatusCode::NOT_FOUND
    );

    let done = f
        .app
        .put(&format!("/api/visits/{id}/status?value=DONE"), Some(&f.owner_token), None)
        .await;
    assert_eq!(done.body["status"], "DONE");

    let tenant_set = f
        .app
        .put(
            &format!("/api/visits/{id}/tenant-status?value=CANCELLED"),
            Some(&f.tenant_token),
            None,
        )
        .await;
    assert_eq!(tenant_set.body["status"], "CANCELLED");
}

#[tokio::test]
async fn test_booking_missing_property_is_bad_request() {
    let f = fixture().await;
    let resp = f
        .app
        .post(
            "/api/visits/book?propertyId=9999",
            Some(&f.tenant_token),
            json!({"tenantName": "Ann", "visitDateTime": "2025-01-10T14:00"}),
        )
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_visit_listing_per_role() {
    let f = fixture().await;
    book(&f, "2025-01-10T14:00").await;
    book(&f, "2025-01-11T09:00").await;

    let tenant_view = f.app.get("/api/visits", Some(&f.tenant_token)).await;
    assert_eq!(tenant_view.body.as_array().unwrap().len(), 2);

    let owner_view = f.app.get("/api/visits", Some(&f.owner_token)).await;
    assert_eq!(owner_view.body.as_array().unwrap().len(), 2);
    assert_eq!(owner_view.body[0]["propertyTitle"], "Sunny flat");

    let other = UserBuilder::new("other@example.com").owner().create(f.app.db()).await;
    let other_view = f.app.get("/api/visits", Some(&f.app.token_for(&other))).await;
    assert_eq!(other_view.body, json!([]));
}

#[tokio::test]
async fn test_visit_thread() {
    let f = fixture().await;
    let visit = book(&f, "2025-01-10T14:00").await;
    let uri = format!("/api/visits/{}/messages", visit["id"]);

    let empty = f.app.post(&uri, Some(&f.tenant_token), json!({"message": "   "})).await;
    assert_eq!(empty.status, StatusCode::BAD_REQUEST);
    assert_eq!(empty.body, json!({"error": "Empty message"}));

    let first = f.app.post(&uri, Some(&f.tenant_token), json!({"message": " Is 2pm ok? "})).await;
    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(first.body["senderRole"], "TENANT");
    assert_eq!(first.body["message"], "Is 2pm ok?");

    let reply = f.app.post(&uri, Some(&f.owner_token), json!({"message": "Yes"})).await;
    assert_eq!(reply.body["senderRole"], "OWNER");

    let thread = f.app.get(&uri, Some(&f.owner_token)).await;
    let messages: Vec<_> = thread
        .body
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["message"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(messages, vec!["Is 2pm ok?", "Yes"]);

    let stranger = UserBuilder::new("s@example.com").create(f.app.db()).await;
    let denied = f.app.get(&uri, Some(&f.app.token_for(&stranger))).await;
    assert_eq!(denied.status, StatusCode::FORBIDDEN);
}

// ---------------------------------------------------------------------------
// Leases
// ---------------------------------------------------------------------------

async fn create_lease(f: &Fixture) -> Value {
    let resp = f
        .app
        .post(
            &format!("/api/leases?propertyId={}", f.property_id),
            Some(&f.tenant_token),
            json!({"tenantName": "Ann", "startDate": "2025-02-01", "endDate": "2026-01-31", "monthlyRent": 1500.0}),
        )
        .await;
    assert_eq!(resp.status, StatusCode::OK, "{:?}", resp.body);
    resp.body
}

#[tokio::test]
async fn test_lease_status_checks_in_order() {
    let f = fixture().await;
    let lease = create_lease(&f).await;
    assert_eq!(lease["status"], "DRAFT");
    assert_eq!(lease["tenantEmail"], "a@b.com");
    let id = &lease["id"];

    // role gate before existence
    let tenant = f
        .app
        .put("/api/leases/9999/status?value=APPROVED", Some(&f.tenant_token), None)
        .await;
    assert_eq!(tenant.status, StatusCode::FORBIDDEN);

    let missing = f
        .app
        .put("/api/leases/9999/status?value=APPROVED", Some(&f.owner_token), None)
        .await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);

    let other = UserBuilder::new("other@example.com").owner().create(f.app.db()).await;
    let not_theirs = f
        .app
        .put(
            &format!("/api/leases/{id}/status?value=APPROVED"),
            Some(&f.app.token_for(&other)),
            None,
        )
        .await;
    assert_eq!(not_theirs.status, StatusCode::FORBIDDEN);

    let invalid = f
        .app
        .put(&format!("/api/leases/{id}/status?value=SIGNED"), Some(&f.owner_token), None)
        .await;
    assert_eq!(invalid.status, StatusCode::BAD_REQUEST);

    let approved = f
        .app
        .put(&format!("/api/leases/{id}/status?value=%20approved%20"), Some(&f.owner_token), None)
        .await;
    assert_eq!(approved.status, StatusCode::OK);
    assert_eq!(approved.body["status"], "APPROVED");
}

#[tokio::test]
async fn test_lease_validation_and_thread() {
    let f = fixture().await;

    let inverted = f
        .app
        .post(
            &format!("/api/leases?propertyId={}", f.property_id),
            Some(&f.tenant_token),
            json!({"tenantName": "Ann", "startDate": "2025-06-01", "endDate": "2025-01-01", "monthlyRent": 10.0}),
        )
        .await;
    assert_eq!(inverted.status, StatusCode::BAD_REQUEST);

    let missing = f
        .app
        .post(
            "/api/leases?propertyId=9999",
            Some(&f.tenant_token),
            json!({"tenantName": "Ann", "startDate": "2025-01-01", "endDate": "2025-06-01", "monthlyRent": 10.0}),
        )
        .await;
    assert_eq!(missing.status, StatusCode::BAD_REQUEST);

    let lease = create_lease(&f).await;
    let uri = format!("/api/leases/{}/messages", lease["id"]);
    let admin = UserBuilder::new("root@example.com").admin().create(f.app.db()).await;

    let posted = f
        .app
        .post(&uri, Some(&f.app.token_for(&admin)), json!({"message": "Reviewed"}))
        .await;
    assert_eq!(posted.status, StatusCode::OK);
    assert_eq!(posted.body["senderRole"], "ADMIN");

    let thread = f.app.get(&uri, Some(&f.tenant_token)).await;
    assert_eq!(thread.body.as_array().unwrap().len(), 1);

    let listed = f.app.get("/api/leases", Some(&f.owner_token)).await;
    assert_eq!(listed.body.as_array().unwrap().len(), 1);
    assert_eq!(listed.body[0]["ownerEmail"], "owner@example.com");
}

// ---------------------------------------------------------------------------
// Plumbing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_health_and_security_headers() {
    let app = TestApp::new().await;
    let resp = app.get("/healthz", None).await;

    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.body, Value::String("ok".into()));
    assert_eq!(resp.headers["x-frame-options"], "DENY");
    assert_eq!(resp.headers["x-content-type-options"], "nosniff");
}
