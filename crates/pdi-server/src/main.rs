#![forbid(unsafe_code)]

use pdi_server::{
    build_router, spawn_background_sweeps, validate_startup_config_contract, AppState, HttpMailer,
    MailConfig, Notifier, ServerConfig,
};
use pdi_store::StorageLayout;
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn env_bool(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .and_then(|v| match v.as_str() {
            "1" | "true" | "TRUE" | "yes" | "YES" => Some(true),
            "0" | "false" | "FALSE" | "no" | "NO" => Some(false),
            _ => None,
        })
        .unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_u32(name: &str, default: u32) -> u32 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(default)
}

fn env_duration_ms(name: &str, default_ms: u64) -> Duration {
    Duration::from_millis(env_u64(name, default_ms))
}

fn env_duration_secs(name: &str, default_secs: u64) -> Duration {
    Duration::from_secs(env_u64(name, default_secs))
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("register SIGTERM");
        let mut sigint = signal(SignalKind::interrupt()).expect("register SIGINT");
        tokio::select! {
            _ = sigterm.recv() => {}
            _ = sigint.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if env_bool("PDI_LOG_JSON", true) {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), String> {
    init_tracing();

    let bind_addr = env::var("PDI_BIND").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let storage_root = pdi_core::resolve_storage_root();

    let mail = MailConfig {
        enabled: env_bool("PDI_MAIL_ENABLED", false),
        gateway_url: env::var("PDI_MAIL_GATEWAY_URL").ok(),
        from_address: env::var("PDI_MAIL_FROM")
            .unwrap_or_else(|_| MailConfig::default().from_address),
        to_address: env::var("PDI_MAIL_TO").unwrap_or_else(|_| MailConfig::default().to_address),
        subject_prefix: env::var("PDI_MAIL_SUBJECT_PREFIX")
            .unwrap_or_else(|_| MailConfig::default().subject_prefix),
        send_timeout: env_duration_ms("PDI_MAIL_TIMEOUT_MS", 30_000),
    };
    let max_upload_bytes = env_u64("PDI_MAX_UPLOAD_BYTES", 20 * 1024 * 1024);
    let config = ServerConfig {
        max_upload_bytes,
        max_body_bytes: (max_upload_bytes as usize) + 1024 * 1024,
        thumbnail_max_px: env_u32("PDI_THUMBNAIL_MAX_PX", 300),
        lock_timeout: env_duration_ms("PDI_LOCK_TIMEOUT_MS", 2000),
        active_draft_ttl: env_duration_secs("PDI_ACTIVE_DRAFT_TTL_SECS", 259_200),
        archived_draft_ttl: env_duration_secs("PDI_ARCHIVED_DRAFT_TTL_SECS", 15_552_000),
        sweep_interval: env_duration_secs("PDI_SWEEP_INTERVAL_SECS", 3600),
        mail,
    };
    validate_startup_config_contract(&config)?;

    let layout = StorageLayout::new(storage_root.clone())
        .map_err(|e| format!("storage root {} unusable: {e}", storage_root.display()))?;
    let notifier: Arc<dyn Notifier> = Arc::new(HttpMailer::new(config.mail.clone())?);
    let state = AppState::new(layout, config, notifier);
    spawn_background_sweeps(&state);
    let app = build_router(state);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| format!("bind {bind_addr} failed: {e}"))?;
    info!(addr = %bind_addr, root = %storage_root.display(), "pdi-server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown_signal())
        .await
        .map_err(|e| format!("server failed: {e}"))
}
