use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::env;

const DEFAULT_ENDPOINT: &str = "https://fra.cloud.appwrite.io/v1";
const PROJECT_HEADER: &str = "x-appwrite-project";
const SESSION_HEADER: &str = "x-appwrite-session";

/// Client for the hosted identity provider. Account and session records are
/// opaque pass-throughs; the provider owns their lifecycle.
#[derive(Debug, Clone)]
pub struct AppwriteClient {
    client: Client,
    endpoint: String,
    project_id: String,
}

#[async_trait]
pub trait IdentityApi: Send + Sync {
    async fn create_account(&self, email: &str, password: &str) -> Result<Identity>;
    async fn create_session(&self, email: &str, password: &str) -> Result<Session>;
    async fn current_identity(&self, session_secret: &str) -> Result<Identity>;
    async fn delete_session(&self, session_secret: &str) -> Result<()>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    #[serde(rename = "$id")]
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub name: String,
}

/// Returned on login. `secret` is what the caller presents on subsequent
/// requests to act as this session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    #[serde(rename = "$id")]
    pub id: String,
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "providerUid", default)]
    pub provider_uid: String,
    #[serde(default)]
    pub secret: String,
}

impl AppwriteClient {
    pub fn from_env() -> Result<Self> {
        let project_id =
            env::var("APPWRITE_PROJECT_ID").context("APPWRITE_PROJECT_ID not set")?;
        let endpoint =
            env::var("APPWRITE_ENDPOINT").unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string());
        Ok(Self {
            client: Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            project_id,
        })
    }

    async fn send_json<T: for<'de> Deserialize<'de>>(&self, req: RequestBuilder) -> Result<T> {
        let res = req
            .header(PROJECT_HEADER, &self.project_id)
            .send()
            .await
            .context("request failed")?;
        let status = res.status();
        let text = res.text().await.context("reading body failed")?;
        if !status.is_success() {
            return Err(anyhow!("{}", provider_message(&text, status)));
        }
        let parsed: T = serde_json::from_str(&text).context("JSON parse failed")?;
        Ok(parsed)
    }
}

#[async_trait]
impl IdentityApi for AppwriteClient {
    async fn create_account(&self, email: &str, password: &str) -> Result<Identity> {
        let url = format!("{}/account", self.endpoint);
        // "unique()" asks the provider to mint the user id server-side.
        let body = json!({ "userId": "unique()", "email": email, "password": password });
        self.send_json(self.client.post(&url).json(&body)).await
    }

    async fn create_session(&self, email: &str, password: &str) -> Result<Session> {
        let url = format!("{}/account/sessions/email", self.endpoint);
        let body = json!({ "email": email, "password": password });
        self.send_json(self.client.post(&url).json(&body)).await
    }

    async fn current_identity(&self, session_secret: &str) -> Result<Identity> {
        let url = format!("{}/account", self.endpoint);
        self.send_json(self.client.get(&url).header(SESSION_HEADER, session_secret))
            .await
    }

    async fn delete_session(&self, session_secret: &str) -> Result<()> {
        let url = format!("{}/account/sessions/current", self.endpoint);
        let res = self
            .client
            .delete(&url)
            .header(PROJECT_HEADER, &self.project_id)
            .header(SESSION_HEADER, session_secret)
            .send()
            .await
            .context("request failed")?;
        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(anyhow!("{}", provider_message(&text, status)));
        }
        Ok(())
    }
}

/// The provider reports failures as `{"message": ...}`; surface that message
/// verbatim, with the status as a fallback for non-JSON bodies.
fn provider_message(body: &str, status: StatusCode) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("message")
                .and_then(|m| m.as_str())
                .map(|s| s.to_string())
        })
        .unwrap_or_else(|| format!("identity service returned {status}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn provider_message_is_extracted_from_error_envelope() {
        let body = r#"{"message":"Invalid credentials. Please check the email and password.","code":401,"type":"user_invalid_credentials"}"#;
        assert_eq!(
            provider_message(body, StatusCode::UNAUTHORIZED),
            "Invalid credentials. Please check the email and password."
        );
    }

    #[test]
    fn provider_message_falls_back_to_status_for_opaque_bodies() {
        assert_eq!(
            provider_message("<html>bad gateway</html>", StatusCode::BAD_GATEWAY),
            "identity service returned 502 Bad Gateway"
        );
    }

    #[test]
    fn identity_parses_dollar_prefixed_id() {
        let identity: Identity = serde_json::from_value(json!({
            "$id": "usr_1",
            "$createdAt": "2025-05-01T10:00:00.000+00:00",
            "email": "ada@example.com",
            "name": "Ada",
            "status": true
        }))
        .expect("identity deserialize");
        assert_eq!(identity.id, "usr_1");
        assert_eq!(identity.email, "ada@example.com");
    }

    #[test]
    fn session_keeps_secret_and_provider_uid() {
        let session: Session = serde_json::from_value(json!({
            "$id": "ses_1",
            "userId": "usr_1",
            "providerUid": "ada@example.com",
            "secret": "s3cr3t",
            "expire": "2026-05-01T10:00:00.000+00:00"
        }))
        .expect("session deserialize");
        assert_eq!(session.user_id, "usr_1");
        assert_eq!(session.secret, "s3cr3t");
        assert_eq!(session.provider_uid, "ada@example.com");
    }
}
