use crate::authz::Role;
use crate::storage::{self, NewUser};
use miette::{IntoDiagnostic, Result};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use std::fs;

/// User definition from JSON file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserDefinition {
    /// Display name
    pub name: String,
    /// Login email (unique identifier)
    pub email: String,
    /// Plain text password (will be hashed)
    pub password: String,
    /// Account role; any of ADMIN, OWNER, TENANT, AGENT
    #[serde(default = "default_role")]
    pub role: Role,
}

fn default_role() -> Role {
    Role::Tenant
}

/// Root structure of the users JSON file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsersFile {
    pub users: Vec<UserDefinition>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncSummary {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
}

/// Sync users from a JSON file to the database (idempotent)
pub async fn sync_users_from_file(db: &DatabaseConnection, file_path: &str) -> Result<SyncSummary> {
    tracing::info!("Loading users from {}", file_path);

    let content = fs::read_to_string(file_path)
        .into_diagnostic()
        .map_err(|e| miette::miette!("Failed to read users file at '{}': {}", file_path, e))?;

    let users_file: UsersFile = serde_json::from_str(&content)
        .into_diagnostic()
        .map_err(|e| {
            miette::miette!(
                "Failed to parse users JSON file: {}\n\nExpected format:\n{{\n  \"users\": [\n    {{\n      \"name\": \"Alice\",\n      \"email\": \"alice@example.com\",\n      \"password\": \"secure-password\",\n      \"role\": \"OWNER\"\n    }}\n  ]\n}}",
                e
            )
        })?;

    tracing::info!("Found {} user(s) in file", users_file.users.len());

    let mut summary = SyncSummary::default();
    for user_def in users_file.users {
        match sync_user(db, &user_def).await? {
            SyncResult::Created => summary.created += 1,
            SyncResult::Updated => summary.updated += 1,
            SyncResult::Unchanged => summary.unchanged += 1,
        }
    }

    tracing::info!(
        "User sync complete: {} created, {} updated, {} unchanged",
        summary.created,
        summary.updated,
        summary.unchanged
    );

    Ok(summary)
}

#[derive(Debug)]
enum SyncResult {
    Created,
    Updated,
    Unchanged,
}

/// Sync a single user (idempotent)
async fn sync_user(db: &DatabaseConnection, user_def: &UserDefinition) -> Result<SyncResult> {
    let existing = storage::get_user_by_email(db, &user_def.email)
        .await
        .into_diagnostic()?;

    let result = match existing {
        None => {
            tracing::info!("Creating user: {}", user_def.email);
            storage::create_user(
                db,
                NewUser {
                    name: user_def.name.clone(),
                    email: user_def.email.clone(),
                    password: user_def.password.clone(),
                    role: user_def.role,
                },
            )
            .await
            .into_diagnostic()?;

            SyncResult::Created
        }
        Some(existing_user) => {
            let name_matches = existing_user.name == user_def.name.trim();
            let role_matches = existing_user.role == user_def.role;
            let password_matches =
                storage::user_password_matches(&existing_user, &user_def.password)
                    .into_diagnostic()?;

            if !name_matches || !role_matches || !password_matches {
                tracing::info!("Updating user: {}", user_def.email);
                storage::update_user(
                    db,
                    existing_user.id,
                    &user_def.name,
                    user_def.role,
                    (!password_matches).then_some(user_def.password.as_str()),
                )
                .await
                .into_diagnostic()?;

                SyncResult::Updated
            } else {
                SyncResult::Unchanged
            }
        }
    };

    Ok(result)
}
