use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use reqwest::{Client, Url};
use serde::Serialize;
use sha2::Sha256;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::line::model::{PushRequest, ReplyRequest};

pub mod model;

pub use model::{Action, Message, Profile, Template};

const LINE_API_BASE: &str = "https://api.line.me/";

/// Header carrying the body signature on webhook calls.
pub const SIGNATURE_HEADER: &str = "x-line-signature";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signature header is missing")]
    Missing,
    #[error("signature is not valid base64")]
    Encoding,
    #[error("signature does not match body")]
    Mismatch,
}

/// Check a webhook body against its base64 HMAC-SHA256 signature.
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> Result<(), SignatureError> {
    let expected = BASE64
        .decode(signature.trim())
        .map_err(|_| SignatureError::Encoding)?;
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|_| SignatureError::Mismatch)?;
    mac.update(body);
    mac.verify_slice(&expected)
        .map_err(|_| SignatureError::Mismatch)
}

pub fn sign(secret: &str, body: &[u8]) -> String {
    // HMAC accepts keys of any length.
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .unwrap_or_else(|_| unreachable!("hmac key of any size"));
    mac.update(body);
    BASE64.encode(mac.finalize().into_bytes())
}

#[async_trait]
pub trait LineApi: Send + Sync {
    async fn reply(&self, reply_token: &str, messages: &[Message]) -> Result<()>;

    async fn push(&self, to: &str, messages: &[Message]) -> Result<()>;

    async fn profile(&self, user_id: &str) -> Result<Profile>;
}

#[derive(Clone)]
pub struct LineClient {
    http: Client,
    base_url: Url,
    token: String,
}

impl fmt::Debug for LineClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LineClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl LineClient {
    pub fn new(token: String, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(LINE_API_BASE).context("invalid default API URL")?;
        Self::with_base_url(token, base_url, timeout)
    }

    pub fn with_base_url(token: String, base_url: Url, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("tw-airbot/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            http,
            base_url,
            token,
        })
    }

    pub fn build_post<T: Serialize>(&self, path: &str, body: &T) -> Result<reqwest::Request> {
        let endpoint = self.base_url.join(path).context("invalid API base URL")?;
        self.http
            .post(endpoint)
            .bearer_auth(&self.token)
            .json(body)
            .build()
            .context("failed to build request")
    }

    async fn execute(&self, request: reqwest::Request) -> Result<reqwest::Response> {
        debug!(url=%request.url(), method=%request.method(), "sending platform request");
        let res = self
            .http
            .execute(request)
            .await
            .context("failed to reach messaging API")?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("messaging API error {}: {}", status, body));
        }
        Ok(res)
    }
}

#[async_trait]
impl LineApi for LineClient {
    async fn reply(&self, reply_token: &str, messages: &[Message]) -> Result<()> {
        let request = self.build_post(
            "v2/bot/message/reply",
            &ReplyRequest {
                reply_token,
                messages,
            },
        )?;
        self.execute(request).await?;
        Ok(())
    }

    async fn push(&self, to: &str, messages: &[Message]) -> Result<()> {
        let request = self.build_post("v2/bot/message/push", &PushRequest { to, messages })?;
        self.execute(request).await?;
        Ok(())
    }

    async fn profile(&self, user_id: &str) -> Result<Profile> {
        let endpoint = self
            .base_url
            .join(&format!("v2/bot/profile/{}", user_id))
            .context("invalid API base URL")?;
        let request = self
            .http
            .get(endpoint)
            .bearer_auth(&self.token)
            .build()
            .context("failed to build request")?;
        let res = self.execute(request).await?;
        res.json().await.context("invalid profile response")
    }
}
