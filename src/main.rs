use std::sync::Arc;

use anyhow::Context;
use secrecy::ExposeSecret;

use denpa_inspector::config::WorkerConfig;
use denpa_inspector::llm::create_provider;
use denpa_inspector::logging;
use denpa_inspector::notify::{LogNotifier, Notifier, SmtpNotifier};
use denpa_inspector::pipeline::{Classifier, Inspector};
use denpa_inspector::server;
use denpa_inspector::store::{InspectionStore, LibSqlStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    let config = WorkerConfig::from_env().context("Invalid configuration")?;
    logging::init("denpa-inspector", config.log_dir.as_deref());

    eprintln!("🔎 Denpa Inspector v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {} ({:?})", config.llm.model, config.llm.backend);
    eprintln!("   Invoke: http://0.0.0.0:{}/invoke", config.port);

    // ── Database ─────────────────────────────────────────────────────────
    let auth_token = config
        .database_auth_token
        .as_ref()
        .map(|t| t.expose_secret().to_string());
    let libsql = LibSqlStore::open(&config.database_url, auth_token.as_deref())
        .await
        .with_context(|| format!("Failed to open database at {}", config.database_url))?;
    if config.init_schema {
        libsql.ensure_schema().await.context("Failed to create tables")?;
        eprintln!("   Schema: ensured");
    }
    let store: Arc<dyn InspectionStore> = Arc::new(libsql);

    // ── Classifier ───────────────────────────────────────────────────────
    let llm = create_provider(&config.llm)?;
    let classifier = Classifier::new(llm).with_max_tokens(config.max_tokens);

    // ── Notifications ────────────────────────────────────────────────────
    let notifier: Arc<dyn Notifier> = match &config.email {
        Some(email) => {
            eprintln!(
                "   Alerts: e-mail via {} to {}",
                email.smtp_host,
                email.recipients.join(", ")
            );
            Arc::new(SmtpNotifier::new(email)?)
        }
        None => {
            eprintln!("   Alerts: log only (NOTIFY_SMTP_HOST not set)");
            Arc::new(LogNotifier)
        }
    };

    let inspector = Arc::new(Inspector::new(
        store,
        classifier,
        notifier,
        &config.review_base_url,
    ));

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.port))?;
    tracing::info!(port = config.port, "Inspector listening");
    axum::serve(listener, server::routes(inspector)).await?;

    Ok(())
}
