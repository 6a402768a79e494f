use std::sync::Arc;

use clap::{Parser, Subcommand};
use gatekeeper::authz::{AuthzEngine, EnforcerFactory, PermissionRule};
use gatekeeper::object::WebhookEventStatus;
use gatekeeper::webhook::{HttpWebhookSender, WebhookWorker};
use gatekeeper::{settings, storage};
use migration::MigratorTrait;
use miette::{IntoDiagnostic, Result};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "gatekeeper",
    version,
    about = "Permission enforcement and webhook delivery"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the webhook delivery worker until Ctrl-C
    Worker,

    /// Reset matching webhook events and deliver them again
    ReplayWebhooks {
        #[arg(long, default_value = "")]
        owner: String,
        #[arg(long, default_value = "")]
        organization: String,
        /// Webhook id (`owner/name`)
        #[arg(long, default_value = "")]
        webhook: String,
        /// pending, success, failed or retrying
        #[arg(long)]
        status: Option<String>,
    },

    /// Evaluate one request against a permission
    Enforce {
        /// Permission id (`owner/name`)
        #[arg(long)]
        permission: String,
        v0: String,
        v1: String,
        v2: String,
        v3: Option<String>,
    },
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

    // init storage (database)
    let db = storage::init(&settings.database).await?;
    migration::Migrator::up(&db, None).await.into_diagnostic()?;

    match cli.command {
        Command::Worker => {
            let sender = HttpWebhookSender::new(settings.webhook.request_timeout())?;
            let worker = WebhookWorker::new(db, Arc::new(sender), settings.webhook.clone());
            let handle = worker.start();

            tokio::signal::ctrl_c().await.into_diagnostic()?;
            tracing::info!("Shutting down webhook worker");
            worker.stop();
            if let Some(handle) = handle {
                handle.await.into_diagnostic()?;
            }
        }
        Command::ReplayWebhooks {
            owner,
            organization,
            webhook,
            status,
        } => {
            let status = status
                .map(|s| s.parse::<WebhookEventStatus>())
                .transpose()?;
            let sender = HttpWebhookSender::new(settings.webhook.request_timeout())?;
            let worker = WebhookWorker::new(db, Arc::new(sender), settings.webhook.clone());
            let count = worker
                .replay_webhook_events(&owner, &organization, &webhook, status)
                .await?;
            println!("{}", count);
        }
        Command::Enforce {
            permission,
            v0,
            v1,
            v2,
            v3,
        } => {
            let engine = AuthzEngine::new(EnforcerFactory::new(db, &settings.policy));
            let mut rule = PermissionRule::request(&permission, &v0, &v1, &v2);
            if let Some(v3) = v3 {
                rule = rule.with_v3(&v3);
            }
            let allowed = engine.enforce(&rule).await?;
            println!("{}", allowed);
        }
    }
    Ok(())
}
