use rentdesk::authz::Role;
use rentdesk::storage::{self, NewUser, Property, PropertyInput, PropertyType, User};
use sea_orm::DatabaseConnection;

/// Builder for creating test users
pub struct UserBuilder {
    name: String,
    email: String,
    password: String,
    role: Role,
}

impl UserBuilder {
    pub fn new(email: &str) -> Self {
        Self {
            name: email.split('@').next().unwrap_or("user").to_string(),
            email: email.to_string(),
            password: "password123".to_string(),
            role: Role::Tenant,
        }
    }

    pub fn with_password(mut self, password: &str) -> Self {
        self.password = password.to_string();
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    pub fn owner(self) -> Self {
        self.role(Role::Owner)
    }

    pub fn admin(self) -> Self {
        self.role(Role::Admin)
    }

    pub async fn create(self, db: &DatabaseConnection) -> User {
        storage::create_user(
            db,
            NewUser {
                name: self.name,
                email: self.email,
                password: self.password,
                role: self.role,
            },
        )
        .await
        .expect("Failed to create test user")
    }
}

/// Builder for creating test listings
pub struct PropertyBuilder {
    owner_id: i32,
    input: PropertyInput,
}

impl PropertyBuilder {
    pub fn new(owner_id: i32) -> Self {
        Self {
            owner_id,
            input: PropertyInput {
                title: "Sunny flat".to_string(),
                description: "Two rooms, balcony".to_string(),
                address: "12 Canal St".to_string(),
                city: "Amsterdam".to_string(),
                price: 1500.0,
                property_type: PropertyType::Apartment,
                available: None,
            },
        }
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.input.title = title.to_string();
        self
    }

    pub fn in_city(mut self, city: &str) -> Self {
        self.input.city = city.to_string();
        self
    }

    pub fn priced(mut self, price: f64) -> Self {
        self.input.price = price;
        self
    }

    pub fn of_type(mut self, property_type: PropertyType) -> Self {
        self.input.property_type = property_type;
        self
    }

    pub async fn create(self, db: &DatabaseConnection) -> Property {
        storage::create_property(db, self.owner_id, self.input)
            .await
            .expect("Failed to create test property")
    }
}
