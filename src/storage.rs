use crate::authz::{Parties, Principal, Role, SenderRole};
use crate::entities;
use crate::errors::DeskError;
use crate::reschedule::{Decision, RescheduleStatus, Schedule};
use crate::serde_helpers::{serialize_date_time, serialize_opt_date_time};
use crate::settings::Database as DbCfg;
use chrono::{NaiveDate, NaiveDateTime, Timelike, Utc};
use migration::{Migrator, MigratorTrait};
use sea_orm::sea_query::{Expr, Func};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, Database, DatabaseConnection,
    EntityTrait, IntoActiveModel, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

/// Longest chat message accepted, in characters.
pub const MAX_MESSAGE_LEN: usize = 2000;

pub const VISIT_STATUS_PENDING: &str = "PENDING";

// ---------------------------------------------------------------------------
// Domain types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i32,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub role: Role,
    pub created_at: i64,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PropertyType {
    House,
    Apartment,
    Villa,
    Rent,
    Sale,
}

impl PropertyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyType::House => "HOUSE",
            PropertyType::Apartment => "APARTMENT",
            PropertyType::Villa => "VILLA",
            PropertyType::Rent => "RENT",
            PropertyType::Sale => "SALE",
        }
    }
}

impl FromStr for PropertyType {
    type Err = DeskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "HOUSE" => Ok(PropertyType::House),
            "APARTMENT" => Ok(PropertyType::Apartment),
            "VILLA" => Ok(PropertyType::Villa),
            "RENT" => Ok(PropertyType::Rent),
            "SALE" => Ok(PropertyType::Sale),
            _ => Err(DeskError::BadRequest(format!("Unknown property type `{s}`"))),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Property {
    pub id: i32,
    pub title: String,
    pub description: String,
    pub address: String,
    pub city: String,
    pub price: f64,
    #[serde(rename = "type")]
    pub property_type: PropertyType,
    pub available: bool,
    pub image_urls: Vec<String>,
    pub owner_id: Option<i32>,
    pub owner_email: Option<String>,
    pub owner_name: Option<String>,
    pub created_at: i64,
}

impl Property {
    pub fn parties(&self) -> Parties {
        Parties::property(self.owner_email.clone())
    }
}

/// Editable listing fields, used for create and full update.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyInput {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub address: String,
    pub city: String,
    pub price: f64,
    #[serde(rename = "type")]
    pub property_type: PropertyType,
    #[serde(default)]
    pub available: Option<bool>,
}

impl PropertyInput {
    fn validate(&self) -> Result<(), DeskError> {
        if self.title.trim().is_empty() {
            return Err(DeskError::BadRequest("Title is required".into()));
        }
        if self.city.trim().is_empty() {
            return Err(DeskError::BadRequest("City is required".into()));
        }
        if self.description.chars().count() > MAX_MESSAGE_LEN {
            return Err(DeskError::BadRequest(format!(
                "Description exceeds {MAX_MESSAGE_LEN} characters"
            )));
        }
        if !self.price.is_finite() || self.price < 0.0 {
            return Err(DeskError::BadRequest("Price must be a non-negative number".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct PropertySearch {
    pub city: Option<String>,
    pub property_type: Option<PropertyType>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Visit {
    pub id: i32,
    pub property_id: i32,
    pub property_title: String,
    pub owner_email: Option<String>,
    pub tenant_name: String,
    pub tenant_email: String,
    #[serde(serialize_with = "serialize_date_time")]
    pub visit_date_time: NaiveDateTime,
    pub status: String,
    #[serde(serialize_with = "serialize_opt_date_time")]
    pub proposed_date_time: Option<NaiveDateTime>,
    pub reschedule_status: RescheduleStatus,
}

impl Visit {
    pub fn parties(&self) -> Parties {
        Parties::booking(self.owner_email.clone(), self.tenant_email.clone())
    }
}

#[derive(Debug, Clone)]
pub struct NewVisit {
    pub tenant_name: String,
    pub tenant_email: String,
    pub visit_date_time: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeaseStatus {
    Draft,
    Approved,
    Rejected,
}

impl LeaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeaseStatus::Draft => "DRAFT",
            LeaseStatus::Approved => "APPROVED",
            LeaseStatus::Rejected => "REJECTED",
        }
    }
}

impl fmt::Display for LeaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeaseStatus {
    type Err = DeskError;

    /// Trimmed and upper-cased before matching.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DRAFT" => Ok(LeaseStatus::Draft),
            "APPROVED" => Ok(LeaseStatus::Approved),
            "REJECTED" => Ok(LeaseStatus::Rejected),
            _ => Err(DeskError::BadRequest(format!(
                "Invalid lease status `{s}` (expected DRAFT, APPROVED or REJECTED)"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Lease {
    pub id: i32,
    pub property_id: i32,
    pub property_title: String,
    pub owner_email: Option<String>,
    pub tenant_name: String,
    pub tenant_email: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub monthly_rent: f64,
    pub status: LeaseStatus,
}

impl Lease {
    pub fn parties(&self) -> Parties {
        Parties::booking(self.owner_email.clone(), self.tenant_email.clone())
    }
}

#[derive(Debug, Clone)]
pub struct NewLease {
    pub tenant_name: String,
    pub tenant_email: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub monthly_rent: f64,
}

/// One entry of a visit or lease thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: i32,
    pub sender_role: SenderRole,
    pub message: String,
    #[serde(serialize_with = "serialize_date_time")]
    pub created_at: NaiveDateTime,
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// Connect and bring the schema up to date.
pub async fn init(cfg: &DbCfg) -> Result<DatabaseConnection, DeskError> {
    let db = Database::connect(&cfg.url).await?;
    Migrator::up(&db, None).await?;
    tracing::info!("database schema is up to date");
    Ok(db)
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn now_seconds() -> NaiveDateTime {
    let now = Utc::now().naive_utc();
    now.with_nanosecond(0).unwrap_or(now)
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

fn hash_password(password: &str) -> Result<String, DeskError> {
    use argon2::password_hash::{rand_core::OsRng, SaltString};
    use argon2::{Argon2, PasswordHasher};

    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| DeskError::Other(format!("Password hashing failed: {}", e)))?
        .to_string())
}

fn password_matches(password: &str, hash: &str) -> Result<bool, DeskError> {
    use argon2::{Argon2, PasswordHash, PasswordVerifier};

    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| DeskError::Other(format!("Invalid password hash: {}", e)))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

fn user_from_model(model: entities::user::Model) -> Result<User, DeskError> {
    let role = model
        .role
        .parse::<Role>()
        .map_err(|e| DeskError::Other(format!("user {}: {}", model.id, e)))?;
    Ok(User {
        id: model.id,
        name: model.name,
        email: model.email,
        password_hash: model.password_hash,
        role,
        created_at: model.created_at,
    })
}

pub async fn create_user(db: &DatabaseConnection, input: NewUser) -> Result<User, DeskError> {
    let email = normalize_email(&input.email);
    if email.is_empty() || !email.contains('@') {
        return Err(DeskError::BadRequest("A valid email is required".into()));
    }
    if input.password.is_empty() {
        return Err(DeskError::BadRequest("Password is required".into()));
    }
    if get_user_by_email(db, &email).await?.is_some() {
        return Err(DeskError::BadRequest("Email already exists".into()));
    }

    let created_at = Utc::now().timestamp();
    let password_hash = hash_password(&input.password)?;

    let user = entities::user::ActiveModel {
        name: Set(input.name.trim().to_string()),
        email: Set(email),
        password_hash: Set(password_hash),
        role: Set(input.role.as_str().to_string()),
        created_at: Set(created_at),
        ..Default::default()
    };

    let model = user.insert(db).await?;
    tracing::info!(user_id = model.id, role = %input.role, "created user");
    user_from_model(model)
}

pub async fn get_user_by_email(
    db: &DatabaseConnection,
    email: &str,
) -> Result<Option<User>, DeskError> {
    use entities::user::{Column, Entity};

    Entity::find()
        .filter(Column::Email.eq(normalize_email(email)))
        .one(db)
        .await?
        .map(user_from_model)
        .transpose()
}

pub async fn get_user_by_id(db: &DatabaseConnection, id: i32) -> Result<Option<User>, DeskError> {
    entities::User::find_by_id(id)
        .one(db)
        .await?
        .map(user_from_model)
        .transpose()
}

/// Returns the user when `password` matches, `None` otherwise.
pub async fn verify_user_password(
    db: &DatabaseConnection,
    email: &str,
    password: &str,
) -> Result<Option<User>, DeskError> {
    let user = match get_user_by_email(db, email).await? {
        Some(u) => u,
        None => return Ok(None),
    };

    if password_matches(password, &user.password_hash)? {
        Ok(Some(user))
    } else {
        Ok(None)
    }
}

/// Update name, role and, when given, password of an existing user.
pub async fn update_user(
    db: &DatabaseConnection,
    id: i32,
    name: &str,
    role: Role,
    password: Option<&str>,
) -> Result<User, DeskError> {
    let model = entities::User::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| DeskError::NotFound("User not found".into()))?;

    let mut active = model.into_active_model();
    active.name = Set(name.trim().to_string());
    active.role = Set(role.as_str().to_string());
    if let Some(password) = password {
        active.password_hash = Set(hash_password(password)?);
    }

    user_from_model(active.update(db).await?)
}

pub fn user_password_matches(user: &User, password: &str) -> Result<bool, DeskError> {
    password_matches(password, &user.password_hash)
}

/// Make sure an ADMIN account exists for `email`. Returns true if one was created.
pub async fn ensure_admin(
    db: &DatabaseConnection,
    email: &str,
    password: &str,
) -> Result<bool, DeskError> {
    match get_user_by_email(db, email).await? {
        Some(user) if user.role == Role::Admin => Ok(false),
        Some(user) => {
            tracing::warn!(user_id = user.id, "promoting bootstrap account to ADMIN");
            update_user(db, user.id, &user.name, Role::Admin, None).await?;
            Ok(false)
        }
        None => {
            create_user(
                db,
                NewUser {
                    name: "Administrator".into(),
                    email: email.to_string(),
                    password: password.to_string(),
                    role: Role::Admin,
                },
            )
            .await?;
            Ok(true)
        }
    }
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct OwnerRef {
    email: String,
    name: String,
}

async fn owner_refs<C: ConnectionTrait>(
    db: &C,
    owner_ids: impl IntoIterator<Item = i32>,
) -> Result<HashMap<i32, OwnerRef>, DeskError> {
    use entities::user::{Column, Entity};

    let ids: HashSet<i32> = owner_ids.into_iter().collect();
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    Ok(Entity::find()
        .filter(Column::Id.is_in(ids))
        .all(db)
        .await?
        .into_iter()
        .map(|u| {
            (
                u.id,
                OwnerRef {
                    email: u.email,
                    name: u.name,
                },
            )
        })
        .collect())
}

fn property_from_model(
    model: entities::property::Model,
    owners: &HashMap<i32, OwnerRef>,
) -> Result<Property, DeskError> {
    let property_type = model.property_type.parse::<PropertyType>()?;
    let image_urls: Vec<String> = serde_json::from_str(&model.image_urls)?;
    let owner = model.owner_id.and_then(|id| owners.get(&id));
    Ok(Property {
        id: model.id,
        owner_email: owner.map(|o| o.email.clone()),
        owner_name: owner.map(|o| o.name.clone()),
        title: model.title,
        description: model.description,
        address: model.address,
        city: model.city,
        price: model.price,
        property_type,
        available: model.available,
        image_urls,
        owner_id: model.owner_id,
        created_at: model.created_at,
    })
}

async fn properties_from_models(
    db: &DatabaseConnection,
    models: Vec<entities::property::Model>,
) -> Result<Vec<Property>, DeskError> {
    let owners = owner_refs(db, models.iter().filter_map(|m| m.owner_id)).await?;
    models
        .into_iter()
        .map(|m| property_from_model(m, &owners))
        .collect()
}

async fn property_with_owner(
    db: &DatabaseConnection,
    model: entities::property::Model,
) -> Result<Property, DeskError> {
    let owners = owner_refs(db, model.owner_id).await?;
    property_from_model(model, &owners)
}

pub async fn create_property(
    db: &DatabaseConnection,
    owner_id: i32,
    input: PropertyInput,
) -> Result<Property, DeskError> {
    input.validate()?;
    if get_user_by_id(db, owner_id).await?.is_none() {
        return Err(DeskError::BadRequest("Owner not found".into()));
    }

    let property = entities::property::ActiveModel {
        title: Set(input.title.trim().to_string()),
        description: Set(input.description),
        address: Set(input.address.trim().to_string()),
        city: Set(input.city.trim().to_string()),
        price: Set(input.price),
        property_type: Set(input.property_type.as_str().to_string()),
        available: Set(input.available.unwrap_or(true)),
        owner_id: Set(Some(owner_id)),
        created_at: Set(Utc::now().timestamp()),
        image_urls: Set("[]".to_string()),
        ..Default::default()
    };

    let model = property.insert(db).await?;
    tracing::info!(property_id = model.id, owner_id, "created property");
    property_with_owner(db, model).await
}

pub async fn get_property(db: &DatabaseConnection, id: i32) -> Result<Option<Property>, DeskError> {
    match entities::Property::find_by_id(id).one(db).await? {
        Some(model) => Ok(Some(property_with_owner(db, model).await?)),
        None => Ok(None),
    }
}

pub async fn list_properties(db: &DatabaseConnection) -> Result<Vec<Property>, DeskError> {
    use entities::property::{Column, Entity};

    let models = Entity::find().order_by_asc(Column::Id).all(db).await?;
    properties_from_models(db, models).await
}

fn city_matches(city: &str) -> sea_orm::sea_query::SimpleExpr {
    use entities::property::Column;

    Expr::expr(Func::lower(Expr::col(Column::City))).eq(city.trim().to_lowercase())
}

/// Properties in `city`, compared trimmed and case-insensitively.
pub async fn properties_by_city(
    db: &DatabaseConnection,
    city: &str,
) -> Result<Vec<Property>, DeskError> {
    use entities::property::{Column, Entity};

    let models = Entity::find()
        .filter(city_matches(city))
        .order_by_asc(Column::Id)
        .all(db)
        .await?;
    properties_from_models(db, models).await
}

pub async fn search_properties(
    db: &DatabaseConnection,
    search: &PropertySearch,
) -> Result<Vec<Property>, DeskError> {
    use entities::property::{Column, Entity};

    let mut cond = Condition::all();
    if let Some(city) = search.city.as_deref().filter(|c| !c.trim().is_empty()) {
        cond = cond.add(city_matches(city));
    }
    if let Some(property_type) = search.property_type {
        cond = cond.add(Column::PropertyType.eq(property_type.as_str()));
    }
    if let Some(min) = search.min_price {
        cond = cond.add(Column::Price.gte(min));
    }
    if let Some(max) = search.max_price {
        cond = cond.add(Column::Price.lte(max));
    }

    let models = Entity::find()
        .filter(cond)
        .order_by_asc(Column::Id)
        .all(db)
        .await?;
    properties_from_models(db, models).await
}

async fn property_model(
    db: &DatabaseConnection,
    id: i32,
) -> Result<entities::property::Model, DeskError> {
    entities::Property::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| DeskError::NotFound("Property not found".into()))
}

/// Replace the editable fields. Owner and images are kept; a missing
/// `available` resets to true, as on create.
pub async fn update_property(
    db: &DatabaseConnection,
    id: i32,
    input: PropertyInput,
) -> Result<Property, DeskError> {
    input.validate()?;
    let model = property_model(db, id).await?;
    
    let mut active = model.into_active_model();
    active.title = Set(input.title.trim().to_string());
    active.description = Set(input.description);
    active.address = Set(input.address.trim().to_string());
    active.city = Set(input.city.trim().to_string());
    active.price = Set(input.price);
    active.property_type = Set(input.property_type.as_str().to_string());
    active.available = Set(input.available.unwrap_or(true));

    let model = active.update(db).await?;
    property_with_owner(db, model).await
}

/// Delete a property with its visits, leases and their threads.
/// Returns false when no such property exists.
pub async fn delete_property(db: &DatabaseConnection, id: i32) -> Result<bool, DeskError> {
    use entities::{lease, lease_message, visit, visit_message};

    let txn = db.begin().await?;

    if entities::Property::find_by_id(id).one(&txn).await?.is_none() {
        return Ok(false);
    }

    let visit_ids: Vec<i32> = visit::Entity::find()
        .filter(visit::Column::PropertyId.eq(id))
        .all(&txn)
        .await?
        .into_iter()
        .map(|v| v.id)
        .collect();
    let lease_ids: Vec<i32> = lease::Entity::find()
        .filter(lease::Column::PropertyId.eq(id))
        .all(&txn)
        .await?
        .into_iter()
        .map(|l| l.id)
        .collect();

    if !visit_ids.is_empty() {
        visit_message::Entity::delete_many()
            .filter(visit_message::Column::VisitId.is_in(visit_ids.clone()))
            .exec(&txn)
            .await?;
    }
    if !lease_ids.is_empty() {
        lease_message::Entity::delete_many()
            .filter(lease_message::Column::LeaseId.is_in(lease_ids.clone()))
            .exec(&txn)
            .await?;
    }
    visit::Entity::delete_many()
        .filter(visit::Column::PropertyId.eq(id))
        .exec(&txn)
        .await?;
    lease::Entity::delete_many()
        .filter(lease::Column::PropertyId.eq(id))
        .exec(&txn)
        .await?;
    entities::Property::delete_by_id(id).exec(&txn).await?;

    txn.commit().await?;

    tracing::info!(
        property_id = id,
        visits = visit_ids.len(),
        leases = lease_ids.len(),
        "deleted property"
    );
    Ok(true)
}

pub async fn toggle_availability(db: &DatabaseConnection, id: i32) -> Result<Property, DeskError> {
    let model = property_model(db, id).await?;
    let available = !model.available;

    let mut active = model.into_active_model();
    active.available = Set(available);

    let model = active.update(db).await?;
    tracing::info!(property_id = id, available, "toggled availability");
    property_with_owner(db, model).await
}

/// Append `new_urls` to the property's images in a single update.
pub async fn add_property_images(
    db: &DatabaseConnection,
    id: i32,
    new_urls: &[String],
) -> Result<Property, DeskError> {
    let model = property_model(db, id).await?;
    let mut urls: Vec<String> = serde_json::from_str(&model.image_urls)?;
    urls.extend(new_urls.iter().cloned());

    let mut active = model.into_active_model();
    active.image_urls = Set(serde_json::to_string(&urls)?);

    let model = active.update(db).await?;
    property_with_owner(db, model).await
}

// ---------------------------------------------------------------------------
// Booking context shared by visits and leases
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct PropertyRef {
    title: String,
    owner_email: Option<String>,
}

async fn property_refs(
    db: &DatabaseConnection,
    property_ids: impl IntoIterator<Item = i32>,
) -> Result<HashMap<i32, PropertyRef>, DeskError> {
    use entities::property::{Column, Entity};

    let ids: HashSet<i32> = property_ids.into_iter().collect();
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let models = Entity::find().filter(Column::Id.is_in(ids)).all(db).await?;
    let owners = owner_refs(db, models.iter().filter_map(|m| m.owner_id)).await?;

    Ok(models
        .into_iter()
        .map(|m| {
            let owner_email = m
                .owner_id
                .and_then(|id| owners.get(&id))
                .map(|o| o.email.clone());
            (
                m.id,
                PropertyRef {
                    title: m.title,
                    owner_email,
                },
            )
        })
        .collect())
}

/// Ids of the properties owned by the user with `email`.
async fn owned_property_ids(db: &DatabaseConnection, email: &str) -> Result<Vec<i32>, DeskError> {
    use entities::property::{Column, Entity};

    let Some(user) = get_user_by_email(db, email).await? else {
        return Ok(Vec::new());
    };
    Ok(Entity::find()
        .filter(Column::OwnerId.eq(user.id))
        .all(db)
        .await?
        .into_iter()
        .map(|p| p.id)
        .collect())
}

fn tenant_fields(name: &str, email: &str) -> Result<(String, String), DeskError> {
    let name = name.trim().to_string();
    let email = normalize_email(email);
    if name.is_empty() {
        return Err(DeskError::BadRequest("Tenant name is required".into()));
    }
    if email.is_empty() || !email.contains('@') {
        return Err(DeskError::BadRequest("A valid tenant email is required".into()));
    }
    Ok((name, email))
}

// ---------------------------------------------------------------------------
// Visits
// ---------------------------------------------------------------------------

fn visit_from_model(
    model: entities::visit::Model,
    refs: &HashMap<i32, PropertyRef>,
) -> Result<Visit, DeskError> {
    let reschedule_status = model.reschedule_status.parse::<RescheduleStatus>()?;
    let property = refs.get(&model.property_id);
    Ok(Visit {
        id: model.id,
        property_id: model.property_id,
        property_title: property.map(|p| p.title.clone()).unwrap_or_default(),
        owner_email: property.and_then(|p| p.owner_email.clone()),
        tenant_name: model.tenant_name,
        tenant_email: model.tenant_email,
        visit_date_time: model.visit_date_time,
        status: model.status,
        proposed_date_time: model.proposed_date_time,
        reschedule_status,
    })
}

async fn visits_from_models(
    db: &DatabaseConnection,
    models: Vec<entities::visit::Model>,
) -> Result<Vec<Visit>, DeskError> {
    let refs = property_refs(db, models.iter().map(|m| m.property_id)).await?;
    models
        .into_iter()
        .map(|m| visit_from_model(m, &refs))
        .collect()
}

async fn visit_view(db: &DatabaseConnection, model: entities::visit::Model) -> Result<Visit, DeskError> {
    let refs = property_refs(db, [model.property_id]).await?;
    visit_from_model(model, &refs)
}

async fn visit_model(db: &DatabaseConnection, id: i32) -> Result<entities::visit::Model, DeskError> {
    entities::Visit::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| DeskError::NotFound("Visit not found".into()))
}

/// Book a visit in `PENDING` with no reschedule in progress.
pub async fn book_visit(
    db: &DatabaseConnection,
    property_id: i32,
    input: NewVisit,
) -> Result<Visit, DeskError> {
    if entities::Property::find_by_id(property_id).one(db).await?.is_none() {
        return Err(DeskError::BadRequest("Property not found".into()));
    }
    let (tenant_name, tenant_email) = tenant_fields(&input.tenant_name, &input.tenant_email)?;

    let visit = entities::visit::ActiveModel {
        property_id: Set(property_id),
        tenant_name: Set(tenant_name),
        tenant_email: Set(tenant_email),
        visit_date_time: Set(input.visit_date_time),
        status: Set(VISIT_STATUS_PENDING.to_string()),
        proposed_date_time: Set(None),
        reschedule_status: Set(RescheduleStatus::None.as_str().to_string()),
        ..Default::default()
    };

    let model = visit.insert(db).await?;
    tracing::info!(visit_id = model.id, property_id, "booked visit");
    visit_view(db, model).await
}

pub async fn get_visit(db: &DatabaseConnection, id: i32) -> Result<Option<Visit>, DeskError> {
    match entities::Visit::find_by_id(id).one(db).await? {
        Some(model) => Ok(Some(visit_view(db, model).await?)),
        None => Ok(None),
    }
}

/// Visits visible to `principal`: all for admins, those on owned
/// properties for owners, their own for tenants, none for agents.
pub async fn list_visits_for(
    db: &DatabaseConnection,
    principal: &Principal,
) -> Result<Vec<Visit>, DeskError> {
    use entities::visit::{Column, Entity};

    let query = Entity::find().order_by_asc(Column::VisitDateTime).order_by_asc(Column::Id);
    let models = match principal.role {
        Role::Admin => query.all(db).await?,
        Role::Owner => {
            let ids = owned_property_ids(db, &principal.email).await?;
            if ids.is_empty() {
                return Ok(Vec::new());
            }
            query.filter(Column::PropertyId.is_in(ids)).all(db).await?
        }
        Role::Tenant => {
            query
                .filter(Column::TenantEmail.eq(normalize_email(&principal.email)))
                .all(db)
                .await?
        }
        Role::Agent => return Ok(Vec::new()),
    };
    visits_from_models(db, models).await
}

/// Store `value` as the visit's status, verbatim.
pub async fn update_visit_status(
    db: &DatabaseConnection,
    id: i32,
    value: &str,
) -> Result<Visit, DeskError> {
    let mut active = visit_model(db, id).await?.into_active_model();
    active.status = Set(value.to_string());

    let model = active.update(db).await?;
    tracing::info!(visit_id = id, status = %model.status, "updated visit status");
    visit_view(db, model).await
}

fn schedule_of(model: &entities::visit::Model) -> Result<Schedule, DeskError> {
    Ok(Schedule {
        visit_date_time: model.visit_date_time,
        proposed_date_time: model.proposed_date_time,
        status: model.reschedule_status.parse()?,
    })
}

async fn save_schedule(
    db: &DatabaseConnection,
    model: entities::visit::Model,
    schedule: Schedule,
) -> Result<Visit, DeskError> {
    let mut active = model.into_active_model();
    active.visit_date_time = Set(schedule.visit_date_time);
    active.proposed_date_time = Set(schedule.proposed_date_time);
    active.reschedule_status = Set(schedule.status.as_str().to_string());

    let model = active.update(db).await?;
    visit_view(db, model).await
}

/// Owner proposes a new time for the visit.
pub async fn request_reschedule(
    db: &DatabaseConnection,
    id: i32,
    proposed: NaiveDateTime,
) -> Result<Visit, DeskError> {
    let model = visit_model(db, id).await?;
    let mut schedule = schedule_of(&model)?;
    schedule.request(proposed);

    tracing::info!(visit_id = id, %proposed, "reschedule requested");
    save_schedule(db, model, schedule).await
}

/// Tenant accepts or declines the pending proposal. Nothing is written on error.
pub async fn decide_reschedule(
    db: &DatabaseConnection,
    id: i32,
    decision: Decision,
) -> Result<Visit, DeskError> {
    let model = visit_model(db, id).await?;
    let mut schedule = schedule_of(&model)?;
    schedule.decide(decision)?;

    tracing::info!(visit_id = id, status = %schedule.status, "reschedule decided");
    save_schedule(db, model, schedule).await
}

// ---------------------------------------------------------------------------
// Leases
// ---------------------------------------------------------------------------

fn lease_from_model(
    model: entities::lease::Model,
    refs: &HashMap<i32, PropertyRef>,
) -> Result<Lease, DeskError> {
    let status = model.status.parse::<LeaseStatus>()?;
    let property = refs.get(&model.property_id);
    Ok(Lease {
        id: model.id,
        property_id: model.property_id,
        property_title: property.map(|p| p.title.clone()).unwrap_or_default(),
        owner_email: property.and_then(|p| p.owner_email.clone()),
        tenant_name: model.tenant_name,
        tenant_email: model.tenant_email,
        start_date: model.start_date,
        end_date: model.end_date,
        monthly_rent: model.monthly_rent,
        status,
    })
}

async fn lease_view(db: &DatabaseConnection, model: entities::lease::Model) -> Result<Lease, DeskError> {
    let refs = property_refs(db, [model.property_id]).await?;
    lease_from_model(model, &refs)
}

/// Create a lease in `DRAFT`.
pub async fn create_lease(
    db: &DatabaseConnection,
    property_id: i32,
    input: NewLease,
) -> Result<Lease, DeskError> {
    if entities::Property::find_by_id(property_id).one(db).await?.is_none() {
        return Err(DeskError::BadRequest("Property not found".into()));
    }
    let (tenant_name, tenant_email) = tenant_fields(&input.tenant_name, &input.tenant_email)?;
    if input.end_date < input.start_date {
        return Err(DeskError::BadRequest("End date is before start date".into()));
    }
    if !input.monthly_rent.is_finite() || input.monthly_rent < 0.0 {
        return Err(DeskError::BadRequest("Monthly rent must be a non-negative number".into()));
    }

    let lease = entities::lease::ActiveModel {
        property_id: Set(property_id),
        tenant_name: Set(tenant_name),
        tenant_email: Set(tenant_email),
        start_date: Set(input.start_date),
        end_date: Set(input.end_date),
        monthly_rent: Set(input.monthly_rent),
        status: Set(LeaseStatus::Draft.as_str().to_string()),
        ..Default::default()
    };

    let model = lease.insert(db).await?;
    tracing::info!(lease_id = model.id, property_id, "created lease");
    lease_view(db, model).await
}

pub async fn get_lease(db: &DatabaseConnection, id: i32) -> Result<Option<Lease>, DeskError> {
    match entities::Lease::find_by_id(id).one(db).await? {
        Some(model) => Ok(Some(lease_view(db, model).await?)),
        None => Ok(None),
    }
}

/// Same visibility rules as [`list_visits_for`].
pub async fn list_leases_for(
    db: &DatabaseConnection,
    principal: &Principal,
) -> Result<Vec<Lease>, DeskError> {
    use entities::lease::{Column, Entity};

    let query = Entity::find().order_by_asc(Column::Id);
    let models = match principal.role {
        Role::Admin => query.all(db).await?,
        Role::Owner => {
            let ids = owned_property_ids(db, &principal.email).await?;
            if ids.is_empty() {
                return Ok(Vec::new());
            }
            query.filter(Column::PropertyId.is_in(ids)).all(db).await?
        }
        Role::Tenant => {
            query
                .filter(Column::TenantEmail.eq(normalize_email(&principal.email)))
                .all(db)
                .await?
        }
        Role::Agent => return Ok(Vec::new()),
    };

    let refs = property_refs(db, models.iter().map(|m| m.property_id)).await?;
    models
        .into_iter()
        .map(|m| lease_from_model(m, &refs))
        .collect()
}

pub async fn update_lease_status(
    db: &DatabaseConnection,
    id: i32,
    status: LeaseStatus,
) -> Result<Lease, DeskError> {
    let model = entities::Lease::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| DeskError::NotFound("Lease not found".into()))?;

    let mut active = model.into_active_model();
    active.status = Set(status.as_str().to_string());

    let model = active.update(db).await?;
    tracing::info!(lease_id = id, %status, "updated lease status");
    lease_view(db, model).await
}

// ---------------------------------------------------------------------------
// Message threads
// ---------------------------------------------------------------------------

/// Trim and bound a chat message.
pub fn normalize_message(text: &str) -> Result<String, DeskError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(DeskError::BadRequest("Empty message".into()));
    }
    if trimmed.chars().count() > MAX_MESSAGE_LEN {
        return Err(DeskError::BadRequest(format!(
            "Message exceeds {MAX_MESSAGE_LEN} characters"
        )));
    }
    Ok(trimmed.to_string())
}

fn sender_role_of(raw: &str) -> Result<SenderRole, DeskError> {
    raw.parse::<SenderRole>().map_err(DeskError::Other)
}

pub async fn post_visit_message(
    db: &DatabaseConnection,
    visit_id: i32,
    sender: SenderRole,
    text: &str,
) -> Result<ChatMessage, DeskError> {
    let message = normalize_message(text)?;
    let model = entities::visit_message::ActiveModel {
        visit_id: Set(visit_id),
        sender_role: Set(sender.as_str().to_string()),
        message: Set(message),
        created_at: Set(now_seconds()),
        ..Default::default()
    }
    .insert(db)
    .await?;

    Ok(ChatMessage {
        id: model.id,
        sender_role: sender,
        message: model.message,
        created_at: model.created_at,
    })
}

/// Thread of a visit, oldest first.
pub async fn list_visit_messages(
    db: &DatabaseConnection,
    visit_id: i32,
) -> Result<Vec<ChatMessage>, DeskError> {
    use entities::visit_message::{Column, Entity};

    Entity::find()
        .filter(Column::VisitId.eq(visit_id))
        .order_by_asc(Column::CreatedAt)
        .order_by_asc(Column::Id)
        .all(db)
        .await?
        .into_iter()
        .map(|m| {
            Ok(ChatMessage {
                id: m.id,
                sender_role: sender_role_of(&m.sender_role)?,
                message: m.message,
                created_at: m.created_at,
            })
        })
        .collect()
}

pub async fn post_lease_message(
    db: &DatabaseConnection,
    lease_id: i32,
    sender: SenderRole,
    text: &str,
) -> Result<ChatMessage, DeskError> {
    let message = normalize_message(text)?;
    let model = entities::lease_message::ActiveModel {
        lease_id: Set(lease_id),
        sender_role: Set(sender.as_str().to_string()),
        message: Set(message),
        created_at: Set(now_seconds()),
        ..Default::default()
    }
    .insert(db)
    .await?;

    Ok(ChatMessage {
        id: model.id,
        sender_role: sender,
        message: model.message,
        created_at: model.created_at,
    })
}

/// Thread of a lease, oldest first.
pub async fn list_lease_messages(
    db: &DatabaseConnection,
    lease_id: i32,
) -> Result<Vec<ChatMessage>, DeskError> {
    use entities::lease_message::{Column, Entity};

    Entity::find()
        .filter(Column::LeaseId.eq(lease_id))
        .order_by_asc(Column::CreatedAt)
        .order_by_asc(Column::Id)
        .all(db)
        .await?
        .into_iter()
        .map(|m| {
            Ok(ChatMessage {
                id: m.id,
                sender_role: sender_role_of(&m.sender_role)?,
                message: m.message,
                created_at: m.created_at,
            })
        })
        .collect()
}
