use clap::Parser;
use miette::{IntoDiagnostic, Result};
use rentdesk::{settings, storage, user_sync, web};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "rentdesk",
    version,
    about = "Property rental management backend"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Sync users from a JSON file, then exit
    #[arg(long, value_name = "FILE")]
    sync_users: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // logging
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    // load settings
    let settings = settings::Settings::load(&cli.config)?;
    tracing::info!(?settings, "Loaded configuration");
    if settings.uses_dev_secret() {
        tracing::warn!("auth.jwt_secret is the built-in development secret; set RENTDESK__AUTH__JWT_SECRET in production");
    }

    // init storage (database + migrations)
    let db = storage::init(&settings.database).await?;

    if let Some(path) = cli.sync_users.as_deref() {
        user_sync::sync_users_from_file(&db, path).await?;
        return Ok(());
    }

    ensure_bootstrap_admin(&settings, &db).await?;

    // start web server
    web::serve(settings, db).await?;
    Ok(())
}

async fn ensure_bootstrap_admin(
    settings: &settings::Settings,
    db: &sea_orm::DatabaseConnection,
) -> Result<()> {
    let Some((email, password)) = settings.bootstrap_admin() else {
        return Ok(());
    };
    if storage::ensure_admin(db, email, password)
        .await
        .into_diagnostic()?
    {
        tracing::info!(%email, "Created bootstrap admin user");
    }
    Ok(())
}
