//! Microsoft Graph mail transport.
//!
//! Sends as the configured mailbox using an Azure AD application with the
//! client credentials flow. The application needs the `Mail.Send`
//! application permission.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::mailer::{MailError, Mailer, OutgoingMail};
use crate::config::Config;

const GRAPH_ROOT: &str = "https://graph.microsoft.com/v1.0";
const LOGIN_ROOT: &str = "https://login.microsoftonline.com";
const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    #[serde(default)]
    expires_in: i64,
    error_description: Option<String>,
}

struct CachedToken {
    value: String,
    expires_at: i64,
}

/// Sends mail through `POST /users/{from}/sendMail`.
pub struct GraphMailer {
    client: Client,
    tenant_id: String,
    client_id: String,
    client_secret: String,
    token: Mutex<Option<CachedToken>>,
}

impl GraphMailer {
    pub fn from_config(config: &Config) -> Result<Self, MailError> {
        let missing: Vec<&str> = [
            ("client_id", &config.client_id),
            ("tenant_id", &config.tenant_id),
            ("client_secret", &config.client_secret),
        ]
        .into_iter()
        .filter(|(_, v)| v.trim().is_empty())
        .map(|(k, _)| k)
        .collect();
        if !missing.is_empty() {
            return Err(MailError::NotConfigured(format!(
                "{} not set in config",
                missing.join(", ")
            )));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout))
            .build()?;

        Ok(Self {
            client,
            tenant_id: config.tenant_id.trim().to_string(),
            client_id: config.client_id.trim().to_string(),
            client_secret: config.client_secret.trim().to_string(),
            token: Mutex::new(None),
        })
    }

    async fn access_token(&self) -> Result<String, MailError> {
        let mut cached = self.token.lock().await;
        let now = Utc::now().timestamp();
        if let Some(token) = cached.as_ref().filter(|t| t.expires_at - 60 > now) {
            return Ok(token.value.clone());
        }

        let url = format!("{}/{}/oauth2/v2.0/token", LOGIN_ROOT, self.tenant_id);
        debug!("Requesting Graph token for tenant {}", self.tenant_id);
        let response = self
            .client
            .post(&url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("scope", GRAPH_SCOPE),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await?;

        let token: TokenResponse = response.json().await?;
        let value = token.access_token.ok_or_else(|| {
            MailError::Auth(
                token
                    .error_description
                    .unwrap_or_else(|| "no access token returned".to_string()),
            )
        })?;

        *cached = Some(CachedToken {
            value: value.clone(),
            expires_at: now + token.expires_in,
        });
        Ok(value)
    }
}

#[async_trait]
impl Mailer for GraphMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        mail.validate()?;
        let token = self.access_token().await?;

        let url = format!(
            "{}/users/{}/sendMail",
            GRAPH_ROOT,
            urlencoding::encode(mail.from.trim())
        );
        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&graph_payload(mail))
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::ACCEPTED {
            let body = response.text().await.unwrap_or_default();
            return Err(MailError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        info!(to = %mail.to.join(", "), subject = %mail.subject, "Email sent");
        Ok(())
    }
}

fn recipients(addresses: &[String]) -> Vec<Value> {
    addresses
        .iter()
        .map(|a| json!({ "emailAddress": { "address": a.trim() } }))
        .collect()
}

/// Request body for `sendMail`.
fn graph_payload(mail: &OutgoingMail) -> Value {
    json!({
        "message": {
            "subject": mail.subject,
            "body": {
                "contentType": "HTML",
                "content": mail.html_body,
            },
            "toRecipients": recipients(&mail.to),
            "ccRecipients": recipients(&mail.cc),
        },
        "saveToSentItems": true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_shape() {
        let mut mail = OutgoingMail::new("gis@city.gov", " engineer@city.gov ", "Done", "<p>hi</p>");
        mail.cc.push("pw@city.gov".to_string());

        let payload = graph_payload(&mail);
        assert_eq!(payload["message"]["subject"], "Done");
        assert_eq!(payload["message"]["body"]["contentType"], "HTML");
        assert_eq!(
            payload["message"]["toRecipients"][0]["emailAddress"]["address"],
            "engineer@city.gov"
        );
        assert_eq!(
            payload["message"]["ccRecipients"][0]["emailAddress"]["address"],
            "pw@city.gov"
        );
        assert_eq!(payload["saveToSentItems"], true);
    }

    #[test]
    fn test_from_config_requires_credentials() {
        let config = Config {
            client_id: "cid".to_string(),
            ..Default::default()
        };
        match GraphMailer::from_config(&config) {
            Err(MailError::NotConfigured(msg)) => {
                assert_eq!(msg, "tenant_id, client_secret not set in config")
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("expected missing credentials to fail"),
        }
    }

    #[test]
    fn test_token_response_error() {
        let token: TokenResponse = serde_json::from_str(
            r#"{"error": "invalid_client", "error_description": "AADSTS7000215: Invalid client secret provided."}"#,
        )
        .unwrap();
        assert!(token.access_token.is_none());
        assert!(token.error_description.unwrap().starts_with("AADSTS7000215"));
    }
}
