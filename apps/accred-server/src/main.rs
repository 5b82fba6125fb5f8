mod auth;
mod config;
mod email;
mod error;
mod handlers;
mod metrics;
mod server;
#[cfg(test)]
mod tests;

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use accred_storage::{
    CreateInviteParams, CreateUserParams, InstitutionId, Role, Store, StoreError,
};
use accred_store_sqlite::SqliteStore;

use config::ServerConfig;
use server::{hash_token, new_invite_token, AppServer};

// ────────────────────────────────────── CLI Types ──────────────────────────────────────

#[derive(Parser)]
#[command(name = "accred-server")]
#[command(about = "Accred server CLI for administration and serving")]
struct Cli {
    /// Database URL (sqlite://path/to/db.db?mode=rwc)
    #[arg(
        long,
        global = true,
        env = "DATABASE_URL",
        default_value = "sqlite://accred.db?mode=rwc"
    )]
    database_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the REST server
    Serve {
        /// Server address
        #[arg(long, default_value = "0.0.0.0:8080")]
        addr: String,
    },
    /// Administrative account commands
    Admin {
        #[command(subcommand)]
        admin_cmd: AdminCommand,
    },
    /// Invite management commands
    Invite {
        #[command(subcommand)]
        invite_cmd: InviteCommand,
    },
}

#[derive(Subcommand)]
enum AdminCommand {
    /// Create a platform administrator (for bootstrapping)
    Create {
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        password: String,
    },
}

#[derive(Subcommand)]
enum InviteCommand {
    /// Create a new invite token
    Create {
        /// Email address the invite is for
        #[arg(long)]
        email: String,
        /// Role granted on acceptance
        #[arg(long, default_value = "STUDENT")]
        role: String,
        /// Institution the role is scoped to (for institution roles)
        #[arg(long)]
        institution: Option<Uuid>,
        /// Email of the administrator issuing the invite
        #[arg(long)]
        created_by: String,
        /// Expiration in days
        #[arg(long, default_value = "7")]
        expires_days: i64,
        /// Output only the token (for scripts)
        #[arg(long)]
        plain: bool,
    },
    /// List invites with their derived status
    List,
    /// Revoke an unused invite
    Revoke {
        /// Invite token to revoke
        token: String,
    },
}

// ────────────────────────────────────── Serve ──────────────────────────────────────

async fn healthz() -> &'static str {
    "OK"
}

async fn readyz(State(server): State<Arc<AppServer>>) -> Result<&'static str, StatusCode> {
    // Any answer from the store, including "no such row", proves the
    // database is reachable.
    match server.store.get_user_by_email("readiness@probe.invalid").await {
        Ok(_) | Err(StoreError::NotFound) => Ok("OK"),
        Err(_) => Err(StatusCode::SERVICE_UNAVAILABLE),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
}

async fn serve(store: Arc<dyn Store>, addr: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::from_env()?;

    let mailer = match &config.email {
        Some(email_config) => Some(email::create_provider(email_config)?),
        None => None,
    };

    let metrics_handle = metrics::init_metrics();
    let server = Arc::new(AppServer::new(store, config, mailer));

    let app = handlers::api_router(server.clone()).merge(
        Router::new()
            .route("/healthz", get(healthz))
            .route("/readyz", get(readyz))
            .route(
                "/metrics",
                get(move || {
                    let handle = metrics_handle.clone();
                    async move { handle.render() }
                }),
            )
            .with_state(server),
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "accred-server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("shutdown complete");
    Ok(())
}

// ────────────────────────────────────── CLI commands ──────────────────────────────────────

async fn admin_create(
    store: Arc<dyn Store>,
    email: String,
    name: String,
    password: String,
) -> Result<(), Box<dyn std::error::Error>> {
    let password_hash = auth::hash_password(&password)?;
    let user = store
        .create_user(&CreateUserParams {
            email,
            display_name: name,
            password_hash,
            role: Role::PlatformAdmin,
            institution_id: None,
        })
        .await?;
    println!("Created platform admin {} ({})", user.email, user.id.0);
    Ok(())
}

async fn invite_create(
    store: Arc<dyn Store>,
    email: String,
    role: String,
    institution: Option<Uuid>,
    created_by: String,
    expires_days: i64,
    plain: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let role: Role = role.parse()?;
    let institution_id = institution.map(InstitutionId);
    if role.is_institution_scoped() && institution_id.is_none() {
        return Err(format!("role {} requires --institution", role.as_str()).into());
    }

    let issuer = store.get_user_by_email(&created_by).await?;
    let token = new_invite_token();
    let invite = store
        .create_invite(&CreateInviteParams {
            token_hash: hash_token(&token),
            email,
            role,
            institution_id,
            expires_at: Utc::now() + Duration::days(expires_days),
            created_by: issuer.id,
        })
        .await?;

    if plain {
        println!("{}", token);
    } else {
        println!("Invite created for {}", invite.email);
        println!("  token:   {}", token);
        println!("  role:    {}", invite.role.as_str());
        println!("  expires: {}", invite.expires_at.to_rfc3339());
    }
    Ok(())
}

async fn invite_list(store: Arc<dyn Store>) -> Result<(), Box<dyn std::error::Error>> {
    let now = Utc::now();
    for invite in store.list_invites(None).await? {
        println!(
            "{}  {:<10} {:<20} {} (expires {})",
            invite.id.0,
            invite.status(now).as_str(),
            invite.role.as_str(),
            invite.email,
            invite.expires_at.to_rfc3339()
        );
    }
    Ok(())
}

async fn invite_revoke(
    store: Arc<dyn Store>,
    token: String,
) -> Result<(), Box<dyn std::error::Error>> {
    let invite = store.get_invite_by_token(&hash_token(&token)).await?;
    store.delete_invite(&invite.id).await?;
    println!("Revoked invite for {}", invite.email);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let store: Arc<dyn Store> = Arc::new(SqliteStore::open(&cli.database_url).await?);

    match cli.command {
        Command::Serve { addr } => serve(store, &addr).await,
        Command::Admin { admin_cmd } => match admin_cmd {
            AdminCommand::Create {
                email,
                name,
                password,
            } => admin_create(store, email, name, password).await,
        },
        Command::Invite { invite_cmd } => match invite_cmd {
            InviteCommand::Create {
                email,
                role,
                institution,
                created_by,
                expires_days,
                plain,
            } => invite_create(store, email, role, institution, created_by, expires_days, plain).await,
            InviteCommand::List => invite_list(store).await,
            InviteCommand::Revoke { token } => invite_revoke(store, token).await,
        },
    }
}
