use anyhow::Context as _;
use async_trait::async_trait;
use serde::Serialize;

pub const DEFAULT_EMAILJS_API_URL: &str = "https://api.emailjs.com/api/v1.0/email/send";

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_notification(
        &self,
        to_email: &str,
        novel_title: &str,
        unread_count: u32,
    ) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailJsConfig {
    pub service_id: String,
    pub template_id: String,
    pub public_key: String,
    pub private_key: String,
    pub api_url: String,
}

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    service_id: &'a str,
    template_id: &'a str,
    user_id: &'a str,
    #[serde(rename = "accessToken")]
    access_token: &'a str,
    template_params: TemplateParams<'a>,
}

#[derive(Debug, Serialize)]
struct TemplateParams<'a> {
    to_email: &'a str,
    novel_name: &'a str,
    chapter_count: u32,
}

/// Sends through the EmailJS REST API using a service/template pair.
#[derive(Debug, Clone)]
pub struct EmailJsNotifier {
    client: reqwest::Client,
    config: EmailJsConfig,
}

impl EmailJsNotifier {
    pub fn new(config: EmailJsConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(20))
            .build()
            .context("build email http client")?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl Notifier for EmailJsNotifier {
    async fn send_notification(
        &self,
        to_email: &str,
        novel_title: &str,
        unread_count: u32,
    ) -> anyhow::Result<()> {
        let body = SendRequest {
            service_id: &self.config.service_id,
            template_id: &self.config.template_id,
            user_id: &self.config.public_key,
            access_token: &self.config.private_key,
            template_params: TemplateParams {
                to_email,
                novel_name: novel_title,
                chapter_count: unread_count,
            },
        };

        let response = self
            .client
            .post(&self.config.api_url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("POST {}", self.config.api_url))?;

        let status = response.status();
        if !status.is_success() {
            let raw = response.text().await.unwrap_or_default();
            anyhow::bail!("email api error ({status}): {}", raw.trim());
        }
        Ok(())
    }
}
