use serde::Serialize;
use std::time::Duration;

pub const CONFIG_SCHEMA_VERSION: &str = "1";

pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 20 * 1024 * 1024;
pub const DEFAULT_THUMBNAIL_MAX_PX: u32 = 300;

#[derive(Debug, Clone, Serialize)]
pub struct MailConfig {
    pub enabled: bool,
    /// HTTP mail gateway endpoint; required when `enabled`.
    pub gateway_url: Option<String>,
    pub from_address: String,
    pub to_address: String,
    pub subject_prefix: String,
    pub send_timeout: Duration,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            gateway_url: None,
            from_address: "noreply@example.com".to_string(),
            to_address: "pdi-reports@example.com".to_string(),
            subject_prefix: "Pre-Delivery Inspection".to_string(),
            send_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerConfig {
    pub max_upload_bytes: u64,
    /// Request body ceiling; must accommodate the upload limit plus the
    /// multipart framing around it.
    pub max_body_bytes: usize,
    pub thumbnail_max_px: u32,
    pub lock_timeout: Duration,
    pub active_draft_ttl: Duration,
    pub archived_draft_ttl: Duration,
    pub sweep_interval: Duration,
    pub mail: MailConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            max_body_bytes: (DEFAULT_MAX_UPLOAD_BYTES as usize) + 1024 * 1024,
            thumbnail_max_px: DEFAULT_THUMBNAIL_MAX_PX,
            lock_timeout: Duration::from_secs(2),
            active_draft_ttl: Duration::from_secs(259_200),
            archived_draft_ttl: Duration::from_secs(15_552_000),
            sweep_interval: Duration::from_secs(3600),
            mail: MailConfig::default(),
        }
    }
}

pub fn validate_startup_config_contract(cfg: &ServerConfig) -> Result<(), String> {
    if cfg.max_upload_bytes == 0 {
        return Err("max_upload_bytes must be > 0".to_string());
    }
    if (cfg.max_body_bytes as u64) < cfg.max_upload_bytes {
        return Err("max_body_bytes must be >= max_upload_bytes".to_string());
    }
    if cfg.thumbnail_max_px < 16 {
        return Err("thumbnail_max_px must be >= 16".to_string());
    }
    if cfg.lock_timeout.is_zero() {
        return Err("lock_timeout must be > 0".to_string());
    }
    if cfg.sweep_interval.is_zero() {
        return Err("sweep_interval must be > 0".to_string());
    }
    if cfg.archived_draft_ttl < cfg.active_draft_ttl {
        return Err("archived_draft_ttl must be >= active_draft_ttl".to_string());
    }
    if cfg.mail.enabled {
        if cfg
            .mail
            .gateway_url
            .as_deref()
            .is_none_or(|u| u.trim().is_empty())
        {
            return Err("mail.enabled=true requires a non-empty mail gateway url".to_string());
        }
        if cfg.mail.send_timeout.is_zero() {
            return Err("mail send_timeout must be > 0".to_string());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_passes_the_startup_contract() {
        validate_startup_config_contract(&ServerConfig::default()).expect("valid default");
    }

    #[test]
    fn startup_config_validation_enforces_body_vs_upload_order() {
        let cfg = ServerConfig {
            max_body_bytes: 1024,
            ..ServerConfig::default()
        };
        let err = validate_startup_config_contract(&cfg).expect_err("body < upload");
        assert!(err.contains("max_body_bytes"));
    }

    #[test]
    fn startup_config_validation_requires_gateway_when_mail_enabled() {
        let cfg = ServerConfig {
            mail: MailConfig {
                enabled: true,
                gateway_url: None,
                ..MailConfig::default()
            },
            ..ServerConfig::default()
        };
        let err = validate_startup_config_contract(&cfg).expect_err("missing gateway");
        assert!(err.contains("gateway"));

        let cfg = ServerConfig {
            mail: MailConfig {
                enabled: true,
                gateway_url: Some("  ".to_string()),
                ..MailConfig::default()
            },
            ..ServerConfig::default()
        };
        assert!(validate_startup_config_contract(&cfg).is_err());
    }

    #[test]
    fn startup_config_validation_rejects_inverted_retention_windows() {
        let cfg = ServerConfig {
            active_draft_ttl: Duration::from_secs(100),
            archived_draft_ttl: Duration::from_secs(10),
            ..ServerConfig::default()
        };
        let err = validate_startup_config_contract(&cfg).expect_err("inverted ttls");
        assert!(err.contains("archived_draft_ttl"));
    }
}
