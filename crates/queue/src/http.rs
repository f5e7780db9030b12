//! HTTP gateway: notifications and identity-provider role sync over `reqwest`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, Url};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, instrument};

use providers::Channel;

use crate::gateway::{NotificationGateway, RoleMembershipSync};
use crate::QueueError;

/// Endpoints of the remote services. Any of them may be left out; jobs
/// needing a missing one fail with [`QueueError::NotConfigured`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
    /// Portal receiving webservice notifications.
    pub portal_url: Option<String>,
    /// SMS relay.
    pub sms_url: Option<String>,
    /// Identity provider holding role memberships.
    pub idp_url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            portal_url: None,
            sms_url: None,
            idp_url: None,
            timeout_secs: 10,
        }
    }
}

pub struct HttpGateway {
    client: Client,
    settings: GatewaySettings,
}

impl HttpGateway {
    pub fn new(settings: GatewaySettings) -> Result<Self, QueueError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(settings.timeout_secs))
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Self { client, settings })
    }

    fn endpoint(
        base: Option<&str>,
        what: &'static str,
        segments: &[&str],
    ) -> Result<Url, QueueError> {
        let base = base.ok_or(QueueError::NotConfigured(what))?;
        let mut url = Url::parse(base)
            .map_err(|e| QueueError::Rejected(format!("invalid {what} url {base}: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| QueueError::Rejected(format!("{what} url {base} cannot take a path")))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn members_url(&self, role_id: &str, name_id: &str) -> Result<Url, QueueError> {
        Self::endpoint(
            self.settings.idp_url.as_deref(),
            "role sync",
            &["api", "roles", role_id, "members", name_id, ""],
        )
    }

    async fn call(&self, method: Method, url: Url, body: Option<Value>) -> Result<(), QueueError> {
        let mut request = self.client.request(method, url.clone());
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await?;
        let status = response.status();
        debug!(%url, status = status.as_u16(), "gateway answered");
        if !status.is_success() {
            return Err(QueueError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationGateway for HttpGateway {
    #[instrument(skip(self, body, metadata), fields(recipients = recipients.len()))]
    async fn send(
        &self,
        channel: Channel,
        recipients: &[String],
        body: &str,
        metadata: &Value,
    ) -> Result<(), QueueError> {
        match channel {
            Channel::Sms => {
                let url = Self::endpoint(self.settings.sms_url.as_deref(), "sms", &[])?;
                let payload = json!({ "message": body, "to": recipients });
                self.call(Method::POST, url, Some(payload)).await
            }
            Channel::Webservice => {
                let url = Self::endpoint(
                    self.settings.portal_url.as_deref(),
                    "notification",
                    &["api", "notification", "add", ""],
                )?;
                let summary = metadata
                    .get("title")
                    .and_then(Value::as_str)
                    .unwrap_or(body);
                let payload = json!({
                    "summary": summary,
                    "body": body,
                    "name_ids": recipients,
                    "origin": metadata.get("workflow_id"),
                });
                self.call(Method::POST, url, Some(payload)).await
            }
        }
    }
}

#[async_trait]
impl RoleMembershipSync for HttpGateway {
    #[instrument(skip(self))]
    async fn add_member(&self, role_id: &str, name_id: &str) -> Result<(), QueueError> {
        let url = self.members_url(role_id, name_id)?;
        self.call(Method::POST, url, None).await
    }

    #[instrument(skip(self))]
    async fn remove_member(&self, role_id: &str, name_id: &str) -> Result<(), QueueError> {
        let url = self.members_url(role_id, name_id)?;
        self.call(Method::DELETE, url, None).await
    }
}
