use crate::config::MailConfig;
use async_trait::async_trait;
use base64::Engine;
use serde_json::json;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::info;

/// Everything the delivery email needs besides the PDF itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportMeta {
    pub booking_id: String,
    pub customer_name: String,
    pub pdf_file_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    /// Delivery was never attempted: nothing left the process, so the
    /// caller must keep the report on disk.
    NotAttempted(String),
    /// The gateway was contacted but delivery failed.
    Delivery(String),
}

impl Display for NotifyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAttempted(msg) => write!(f, "delivery not attempted: {msg}"),
            Self::Delivery(msg) => write!(f, "delivery failed: {msg}"),
        }
    }
}

impl std::error::Error for NotifyError {}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, pdf_path: &Path, meta: &ReportMeta) -> Result<(), NotifyError>;
}

/// Posts the report as a base64 attachment to an HTTP mail gateway.
pub struct HttpMailer {
    client: reqwest::Client,
    config: MailConfig,
}

impl HttpMailer {
    pub fn new(config: MailConfig) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .timeout(config.send_timeout)
            .build()
            .map_err(|e| format!("mail client construction failed: {e}"))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl Notifier for HttpMailer {
    async fn send(&self, pdf_path: &Path, meta: &ReportMeta) -> Result<(), NotifyError> {
        if !self.config.enabled {
            return Err(NotifyError::NotAttempted("mail is disabled".to_string()));
        }
        let Some(gateway) = self.config.gateway_url.as_deref() else {
            return Err(NotifyError::NotAttempted(
                "no mail gateway configured".to_string(),
            ));
        };
        let pdf = tokio::fs::read(pdf_path).await.map_err(|e| {
            NotifyError::NotAttempted(format!("report file unreadable: {e}"))
        })?;

        let payload = json!({
            "from": self.config.from_address,
            "to": self.config.to_address,
            "subject": format!("{}: booking {}", self.config.subject_prefix, meta.booking_id),
            "booking_id": meta.booking_id,
            "customer_name": meta.customer_name,
            "attachment": {
                "filename": meta.pdf_file_name,
                "content_type": "application/pdf",
                "data": base64::engine::general_purpose::STANDARD.encode(&pdf),
            }
        });

        let response = self
            .client
            .post(gateway)
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotifyError::Delivery(e.to_string()))?;
        if !response.status().is_success() {
            return Err(NotifyError::Delivery(format!(
                "mail gateway returned {}",
                response.status()
            )));
        }
        info!(booking_id = %meta.booking_id, "report delivered");
        Ok(())
    }
}

/// Test double capturing every send; optionally fails each call with a
/// preconfigured error.
#[derive(Default)]
pub struct FakeNotifier {
    pub sent: Mutex<Vec<(PathBuf, ReportMeta)>>,
    pub fail_with: Mutex<Option<NotifyError>>,
}

#[async_trait]
impl Notifier for FakeNotifier {
    async fn send(&self, pdf_path: &Path, meta: &ReportMeta) -> Result<(), NotifyError> {
        if let Some(err) = self.fail_with.lock().await.clone() {
            return Err(err);
        }
        if !pdf_path.is_file() {
            return Err(NotifyError::NotAttempted(
                "report file unreadable".to_string(),
            ));
        }
        self.sent
            .lock()
            .await
            .push((pdf_path.to_path_buf(), meta.clone()));
        Ok(())
    }
}
