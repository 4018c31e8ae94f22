use crate::authz::{self, Principal, Role, Scope};
use crate::errors::DeskError;
use crate::reschedule::{parse_date_time, Decision};
use crate::serde_helpers::deserialize_date_time;
use crate::settings::Settings;
use crate::storage::{
    self, ChatMessage, Lease, LeaseStatus, NewLease, NewUser, NewVisit, Property, PropertyInput,
    PropertySearch, PropertyType, User, Visit,
};
use crate::tokens::TokenManager;
use crate::uploads::{UploadStore, PUBLIC_PREFIX};
use axum::body::Body;
use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::http::{header, HeaderName, HeaderValue, Method, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{NaiveDate, NaiveDateTime};
use miette::IntoDiagnostic;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Multipart framing allowance on top of the configured upload size.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub db: DatabaseConnection,
    pub tokens: TokenManager,
    pub uploads: UploadStore,
}

impl AppState {
    pub fn new(settings: Settings, db: DatabaseConnection) -> Self {
        Self {
            tokens: TokenManager::new(&settings.auth),
            uploads: UploadStore::new(&settings.uploads),
            settings: Arc::new(settings),
            db,
        }
    }
}

// Security headers middleware
async fn security_headers(request: Request<Body>, next: Next) -> impl IntoResponse {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    // X-Frame-Options: Prevent clickjacking
    headers.insert(
        HeaderName::from_static("x-frame-options"),
        HeaderValue::from_static("DENY"),
    );

    // X-Content-Type-Options: Prevent MIME sniffing
    headers.insert(
        HeaderName::from_static("x-content-type-options"),
        HeaderValue::from_static("nosniff"),
    );

    // JSON API plus uploaded images; nothing else is ever rendered
    headers.insert(
        HeaderName::from_static("content-security-policy"),
        HeaderValue::from_static("default-src 'none'; img-src 'self'; frame-ancestors 'none'"),
    );

    headers.insert(
        HeaderName::from_static("referrer-policy"),
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );

    response
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    if origins.iter().any(|o| o == "*") {
        return base.allow_origin(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "ignoring unparsable CORS origin");
                None
            }
        })
        .collect();

    base.allow_origin(AllowOrigin::list(parsed))
        .allow_credentials(true)
}

/// Full application router, used by `serve` and by in-process tests.
pub fn build_router(state: AppState) -> Router {
    let upload_limit = state.uploads.max_bytes() + MULTIPART_OVERHEAD;

    let api = Router::new()
        // auth
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/me", get(me))
        // properties
        .route("/properties", get(properties_by_city).post(create_property))
        .route("/properties/search", get(search_properties))
        .route(
            "/properties/{id}",
            get(get_property).put(update_property).delete(delete_property),
        )
        .route(
            "/properties/{id}/images",
            post(upload_property_image).layer(DefaultBodyLimit::max(upload_limit)),
        )
        // admin
        .route("/admin/properties", get(admin_list_properties))
        .route("/admin/properties/{id}/toggle", put(admin_toggle_property))
        // visits
        .route("/visits", get(list_visits))
        .route("/visits/book", post(book_visit))
        .route("/visits/{id}", get(get_visit))
        .route("/visits/{id}/status", put(update_visit_status))
        .route("/visits/{id}/tenant-status", put(update_visit_tenant_status))
        .route("/visits/{id}/reschedule", put(request_reschedule))
        .route("/visits/{id}/reschedule/decision", put(decide_reschedule))
        .route(
            "/visits/{id}/messages",
            get(list_visit_messages).post(post_visit_message),
        )
        // leases
        .route("/leases", get(list_leases).post(create_lease))
        .route("/leases/{id}", get(get_lease))
        .route("/leases/{id}/status", put(update_lease_status))
        .route(
            "/leases/{id}/messages",
            get(list_lease_messages).post(post_lease_message),
        );

    Router::new()
        .nest("/api", api)
        .route("/healthz", get(health))
        .nest_service(PUBLIC_PREFIX, ServeDir::new(state.uploads.dir()))
        .layer(middleware::from_fn(security_headers))
        .layer(cors_layer(&state.settings.cors.allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(settings: Settings, db: DatabaseConnection) -> miette::Result<()> {
    let state = AppState::new(settings, db);
    state.uploads.ensure_dir().await?;

    let addr: SocketAddr = format!(
        "{}:{}",
        state.settings.server.host, state.settings.server.port
    )
    .parse()
    .map_err(|e| miette::miette!("bad listen addr: {e}"))?;

    let router = build_router(state);

    tracing::info!(%addr, "API listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .into_diagnostic()?;
    axum::serve(listener, router).await.into_diagnostic()?;
    Ok(())
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// The stored account behind a token. A token for a deleted account is refused.
async fn current_user(state: &AppState, principal: &Principal) -> Result<User, DeskError> {
    storage::get_user_by_email(&state.db, &principal.email)
        .await?
        .ok_or_else(|| DeskError::Unauthorized("Unknown user".into()))
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    name: String,
    email: String,
    password: String,
    #[serde(default)]
    role: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct AuthResponse {
    token: String,
    user: User,
}

/// Self-service sign-up. Only OWNER and TENANT accounts can be created here.
async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<AuthResponse>, DeskError> {
    let role = match req.role.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
        None => Role::Owner,
        Some(raw) => match raw.parse::<Role>().map_err(DeskError::BadRequest)? {
            role @ (Role::Owner | Role::Tenant) => role,
            Role::Admin | Role::Agent => {
                return Err(DeskError::BadRequest(format!(
                    "Role {raw} cannot be self-assigned"
                )))
            }
        },
    };

    let user = storage::create_user(
        &state.db,
        NewUser {
            name: req.name,
            email: req.email,
            password: req.password,
            role,
        },
    )
    .await?;

    let token = state.tokens.issue(&user.email, user.role)?;
    Ok(Json(AuthResponse { token, user }))
}

async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, DeskError> {
    let user = storage::verify_user_password(&state.db, &req.email, &req.password)
        .await?
        .ok_or_else(|| {
            tracing::warn!(email = %storage::normalize_email(&req.email), "failed login");
            DeskError::Unauthorized("Invalid credentials".into())
        })?;

    let token = state.tokens.issue(&user.email, user.role)?;
    tracing::info!(user_id = user.id, "login");
    Ok(Json(AuthResponse { token, user }))
}

async fn me(State(state): State<AppState>, principal: Principal) -> Result<Json<User>, DeskError> {
    Ok(Json(current_user(&state, &principal).await?))
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CityQuery {
    city: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    city: Option<String>,
    #[serde(rename = "type")]
    property_type: Option<PropertyType>,
    min: Option<f64>,
    max: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OwnerQuery {
    owner_id: Option<i32>,
}

async fn properties_by_city(
    State(state): State<AppState>,
    Query(q): Query<CityQuery>,
) -> Result<Json<Vec<Property>>, DeskError> {
    let properties = match q.city.as_deref().filter(|c| !c.trim().is_empty()) {
        Some(city) => storage::properties_by_city(&state.db, city).await?,
        None => storage::list_properties(&state.db).await?,
    };
    Ok(Json(properties))
}

async fn search_properties(
    State(state): State<AppState>,
    Query(q): Query<SearchQuery>,
) -> Result<Json<Vec<Property>>, DeskError> {
    let search = PropertySearch {
        city: q.city,
        property_type: q.property_type,
        min_price: q.min,
        max_price: q.max,
    };
    Ok(Json(storage::search_properties(&state.db, &search).await?))
}

async fn get_property(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<Property>, DeskError> {
    storage::get_property(&state.db, id)
        .await?
        .map(Json)
        .ok_or_else(|| DeskError::NotFound("Property not found".into()))
}

/// Owners list for themselves; admins may list on behalf of any owner.
async fn create_property(
    State(state): State<AppState>,
    principal: Principal,
    Query(q): Query<OwnerQuery>,
    Json(input): Json<PropertyInput>,
) -> Result<Json<Property>, DeskError> {
    authz::require_role(&principal, &[Role::Admin, Role::Owner])?;
    let caller = current_user(&state, &principal).await?;

    let owner_id = match (principal.role, q.owner_id) {
        (Role::Admin, Some(owner_id)) => owner_id,
        (_, None) => caller.id,
        (_, Some(owner_id)) if owner_id == caller.id => owner_id,
        (_, Some(_)) => {
            return Err(DeskError::Forbidden(
                "Owners may only list properties for themselves".into(),
            ))
        }
    };

    Ok(Json(storage::create_property(&state.db, owner_id, input).await?))
}

async fn owned_property(
    state: &AppState,
    principal: &Principal,
    id: i32,
) -> Result<Property, DeskError> {
    let property = storage::get_property(&state.db, id)
        .await?
        .ok_or_else(|| DeskError::NotFound("Property not found".into()))?;
    authz::authorize(principal, Scope::Owner, &property.parties())?;
    Ok(property)
}

async fn update_property(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i32>,
    Json(input): Json<PropertyInput>,
) -> Result<Json<Property>, DeskError> {
    owned_property(&state, &principal, id).await?;
    Ok(Json(storage::update_property(&state.db, id, input).await?))
}

async fn delete_property(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i32>,
) -> Result<StatusCode, DeskError> {
    owned_property(&state, &principal, id).await?;
    storage::delete_property(&state.db, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Every file part of the multipart body is stored and appended. Parts are
/// all read and checked before anything is written, and a failed write
/// leaves neither files nor urls behind.
async fn upload_property_image(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i32>,
    mut multipart: Multipart,
) -> Result<Json<Property>, DeskError> {
    owned_property(&state, &principal, id).await?;

    let mut parts = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| DeskError::BadRequest(format!("Malformed upload: {e}")))?
    {
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let bytes = field
            .bytes()
            .await
            .map_err(|e| DeskError::BadRequest(format!("Malformed upload: {e}")))?;
        state.uploads.check(&bytes)?;
        parts.push((file_name, bytes));
    }
    if parts.is_empty() {
        return Err(DeskError::BadRequest("No file in upload".into()));
    }

    let mut urls = Vec::with_capacity(parts.len());
    for (file_name, bytes) in &parts {
        match state.uploads.save(Some(file_name), bytes).await {
            Ok(url) => urls.push(url),
            Err(e) => {
                state.uploads.discard(&urls).await;
                return Err(e);
            }
        }
    }

    match storage::add_property_images(&state.db, id, &urls).await {
        Ok(property) => Ok(Json(property)),
        Err(e) => {
            state.uploads.discard(&urls).await;
            Err(e)
        }
    }
}

async fn admin_list_properties(
    State(state): State<AppState>,
    _principal: Principal,
) -> Result<Json<Vec<Property>>, DeskError> {
    Ok(Json(storage::list_properties(&state.db).await?))
}

async fn admin_toggle_property(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i32>,
) -> Result<Json<Property>, DeskError> {
    authz::require_role(&principal, &[Role::Admin])?;
    Ok(Json(storage::toggle_availability(&state.db, id).await?))
}

// ---------------------------------------------------------------------------
// Visits
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PropertyIdQuery {
    property_id: i32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BookVisitRequest {
    #[serde(default)]
    tenant_name: String,
    #[serde(default)]
    tenant_email: Option<String>,
    #[serde(deserialize_with = "deserialize_date_time")]
    visit_date_time: NaiveDateTime,
}

#[derive(Debug, Deserialize)]
struct ValueQuery {
    value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RescheduleQuery {
    proposed_date_time: String,
}

#[derive(Debug, Deserialize)]
struct DecisionQuery {
    decision: String,
}

#[derive(Debug, Deserialize)]
struct MessageRequest {
    #[serde(default)]
    message: String,
}

fn tenant_email_or_caller(given: Option<String>, principal: &Principal) -> String {
    given
        .filter(|e| !e.trim().is_empty())
        .unwrap_or_else(|| principal.email.clone())
}

async fn book_visit(
    State(state): State<AppState>,
    principal: Principal,
    Query(q): Query<PropertyIdQuery>,
    Json(req): Json<BookVisitRequest>,
) -> Result<Json<Visit>, DeskError> {
    let input = NewVisit {
        tenant_name: req.tenant_name,
        tenant_email: tenant_email_or_caller(req.tenant_email, &principal),
        visit_date_time: req.visit_date_time,
    };
    Ok(Json(storage::book_visit(&state.db, q.property_id, input).await?))
}

async fn list_visits(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Json<Vec<Visit>>, DeskError> {
    Ok(Json(storage::list_visits_for(&state.db, &principal).await?))
}

/// Load a visit (404) and check the caller's scope on it (403).
async fn scoped_visit(
    state: &AppState,
    principal: &Principal,
    id: i32,
    scope: Scope,
) -> Result<Visit, DeskError> {
    let visit = storage::get_visit(&state.db, id)
        .await?
        .ok_or_else(|| DeskError::NotFound("Visit not found".into()))?;
    authz::authorize(principal, scope, &visit.parties())?;
    Ok(visit)
}

async fn get_visit(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i32>,
) -> Result<Json<Visit>, DeskError> {
    Ok(Json(scoped_visit(&state, &principal, id, Scope::Participant).await?))
}

async fn update_visit_status(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i32>,
    Query(q): Query<ValueQuery>,
) -> Result<Json<Visit>, DeskError> {
    scoped_visit(&state, &principal, id, Scope::Owner).await?;
    Ok(Json(storage::update_visit_status(&state.db, id, &q.value).await?))
}

async fn update_visit_tenant_status(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i32>,
    Query(q): Query<ValueQuery>,
) -> Result<Json<Visit>, DeskError> {
    scoped_visit(&state, &principal, id, Scope::Tenant).await?;
    Ok(Json(storage::update_visit_status(&state.db, id, &q.value).await?))
}

async fn request_reschedule(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i32>,
    Query(q): Query<RescheduleQuery>,
) -> Result<Json<Visit>, DeskError> {
    scoped_visit(&state, &principal, id, Scope::Owner).await?;
    let proposed = parse_date_time(&q.proposed_date_time)?;
    Ok(Json(storage::request_reschedule(&state.db, id, proposed).await?))
}

async fn decide_reschedule(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i32>,
    Query(q): Query<DecisionQuery>,
) -> Result<Json<Visit>, DeskError> {
    scoped_visit(&state, &principal, id, Scope::Tenant).await?;
    let decision = q.decision.parse::<Decision>()?;
    Ok(Json(storage::decide_reschedule(&state.db, id, decision).await?))
}

async fn list_visit_messages(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i32>,
) -> Result<Json<Vec<ChatMessage>>, DeskError> {
    scoped_visit(&state, &principal, id, Scope::Participant).await?;
    Ok(Json(storage::list_visit_messages(&state.db, id).await?))
}

async fn post_visit_message(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i32>,
    Json(req): Json<MessageRequest>,
) -> Result<Json<ChatMessage>, DeskError> {
    let visit = scoped_visit(&state, &principal, id, Scope::Participant).await?;
    let sender = authz::sender_role(&principal, &visit.parties());
    Ok(Json(
        storage::post_visit_message(&state.db, id, sender, &req.message).await?,
    ))
}

// ---------------------------------------------------------------------------
// Leases
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateLeaseRequest {
    #[serde(default)]
    tenant_name: String,
    #[serde(default)]
    tenant_email: Option<String>,
    start_date: NaiveDate,
    end_date: NaiveDate,
    monthly_rent: f64,
}

async fn create_lease(
    State(state): State<AppState>,
    principal: Principal,
    Query(q): Query<PropertyIdQuery>,
    Json(req): Json<CreateLeaseRequest>,
) -> Result<Json<Lease>, DeskError> {
    let input = NewLease {
        tenant_name: req.tenant_name,
        tenant_email: tenant_email_or_caller(req.tenant_email, &principal),
        start_date: req.start_date,
        end_date: req.end_date,
        monthly_rent: req.monthly_rent,
    };
    Ok(Json(storage::create_lease(&state.db, q.property_id, input).await?))
}

async fn list_leases(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Json<Vec<Lease>>, DeskError> {
    Ok(Json(storage::list_leases_for(&state.db, &principal).await?))
}

async fn scoped_lease(
    state: &AppState,
    principal: &Principal,
    id: i32,
    scope: Scope,
) -> Result<Lease, DeskError> {
    let lease = storage::get_lease(&state.db, id)
        .await?
        .ok_or_else(|| DeskError::NotFound("Lease not found".into()))?;
    authz::authorize(principal, scope, &lease.parties())?;
    Ok(lease)
}

async fn get_lease(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i32>,
) -> Result<Json<Lease>, DeskError> {
    Ok(Json(scoped_lease(&state, &principal, id, Scope::Participant).await?))
}

/// Role gate first, then existence, then ownership, then the value.
async fn update_lease_status(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i32>,
    Query(q): Query<ValueQuery>,
) -> Result<Json<Lease>, DeskError> {
    authz::require_role(&principal, &[Role::Admin, Role::Owner])?;
    scoped_lease(&state, &principal, id, Scope::Owner).await?;
    let status = q.value.parse::<LeaseStatus>()?;
    Ok(Json(storage::update_lease_status(&state.db, id, status).await?))
}

async fn list_lease_messages(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i32>,
) -> Result<Json<Vec<ChatMessage>>, DeskError> {
    scoped_lease(&state, &principal, id, Scope::Participant).await?;
    Ok(Json(storage::list_lease_messages(&state.db, id).await?))
}

async fn post_lease_message(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i32>,
    Json(req): Json<MessageRequest>,
) -> Result<Json<ChatMessage>, DeskError> {
    let lease = scoped_lease(&state, &principal, id, Scope::Participant).await?;
    let sender = authz::sender_role(&principal, &lease.parties());
    Ok(Json(
        storage::post_lease_message(&state.db, id, sender, &req.message).await?,
    ))
}
