//! Reqwest-backed XDM gateway adapter.
//!
//! Owns transport details only: client-credentials token caching,
//! request serialisation, HTTP status mapping and response decoding.
//! Idempotency and hash gating live in the domain services.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use super::config::XdmConfig;
use super::dto::{
    CreatedResponseDto, GroupRequestDto, OverrideRequestDto, OverrideSlotDto, TokenResponseDto,
};
use crate::domain::external::{ExternalGeozoneId, ExternalGroupId};
use crate::domain::ports::{
    DeviceConfigGateway, GatewayError, GeozoneImport, OverrideSubmission,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_TOKEN_TTL_SECONDS: u64 = 300;
const TOKEN_EXPIRY_SLACK_SECONDS: u64 = 30;

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Gateway adapter performing authenticated HTTP calls against XDM.
pub struct XdmHttpClient {
    client: Client,
    config: XdmConfig,
    token: Mutex<Option<CachedToken>>,
}

impl XdmHttpClient {
    /// Build an adapter with an explicit request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error when the reqwest client cannot be constructed.
    pub fn new(mut config: XdmConfig) -> Result<Self, reqwest::Error> {
        // `Url::join` resolves relative to the last `/`; without this a
        // base like `https://host/api` would lose its final path
        // segment on every request.
        if !config.base_url.path().ends_with('/') {
            let path = format!("{}/", config.base_url.path());
            config.base_url.set_path(&path);
        }
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            config,
            token: Mutex::new(None),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, GatewayError> {
        self.config
            .base_url
            .join(path)
            .map_err(|error| GatewayError::invalid_request(format!("bad endpoint {path}: {error}")))
    }

    /// Fetch or reuse the client-credentials bearer token.
    ///
    /// Tokens are cached until shortly before their reported expiry so
    /// a batch of per-vehicle calls performs at most one token fetch.
    async fn bearer_token(&self) -> Result<String, GatewayError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() {
                return Ok(token.value.clone());
            }
        }

        let response = self
            .client
            .post(self.config.token_url.clone())
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let body = response.bytes().await.map_err(map_transport_error)?;
        if !status.is_success() {
            return Err(GatewayError::auth(format!(
                "token endpoint status {}: {}",
                status.as_u16(),
                body_preview(body.as_ref())
            )));
        }

        let token: TokenResponseDto = serde_json::from_slice(body.as_ref())
            .map_err(|error| GatewayError::decode(format!("invalid token payload: {error}")))?;
        let ttl = token
            .expires_in
            .unwrap_or(DEFAULT_TOKEN_TTL_SECONDS)
            .saturating_sub(TOKEN_EXPIRY_SLACK_SECONDS)
            .max(1);
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: Instant::now() + Duration::from_secs(ttl),
        });
        debug!(ttl_seconds = ttl, "obtained device-configuration token");
        Ok(token.access_token)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, GatewayError> {
        let token = self.bearer_token().await?;
        request
            .bearer_auth(token)
            .send()
            .await
            .map_err(map_transport_error)
    }

    async fn read_success(&self, response: Response) -> Result<Vec<u8>, GatewayError> {
        let status = response.status();
        let body = response.bytes().await.map_err(map_transport_error)?;
        if !status.is_success() {
            return Err(map_status_error(status, body.as_ref()));
        }
        Ok(body.to_vec())
    }

    fn decode_created_id(&self, body: &[u8], subject: &str) -> Result<String, GatewayError> {
        let decoded: CreatedResponseDto = serde_json::from_slice(body).map_err(|error| {
            GatewayError::decode(format!("invalid {subject} response: {error}"))
        })?;
        Ok(decoded.into_id())
    }
}

#[async_trait]
impl DeviceConfigGateway for XdmHttpClient {
    async fn import_geozone(
        &self,
        request: GeozoneImport,
    ) -> Result<ExternalGeozoneId, GatewayError> {
        let geometry = serde_json::to_vec(&request.ring).map_err(|error| {
            GatewayError::invalid_request(format!("geometry payload did not serialise: {error}"))
        })?;
        let form = Form::new().text("name", request.name).part(
            "geometry",
            Part::bytes(geometry)
                .file_name("geometry.json")
                .mime_str("application/json")
                .map_err(|error| GatewayError::invalid_request(error.to_string()))?,
        );

        let url = self.endpoint("geozones/import")?;
        let response = self.send(self.client.post(url).multipart(form)).await?;
        let body = self.read_success(response).await?;
        Ok(ExternalGeozoneId::new(
            self.decode_created_id(&body, "geozone import")?,
        ))
    }

    async fn delete_geozone(&self, id: ExternalGeozoneId) -> Result<(), GatewayError> {
        let url = self.endpoint(&format!("geozones/{id}"))?;
        let response = self.send(self.client.delete(url)).await?;
        self.read_success(response).await?;
        Ok(())
    }

    async fn upsert_geozone_group(
        &self,
        existing: Option<ExternalGroupId>,
        name: String,
        member_ids: Vec<ExternalGeozoneId>,
    ) -> Result<ExternalGroupId, GatewayError> {
        let body = GroupRequestDto {
            name,
            member_ids: member_ids
                .iter()
                .map(|id| id.as_str().to_owned())
                .collect(),
        };
        let response = match &existing {
            Some(group_id) => {
                let url = self.endpoint(&format!("geozone-groups/{group_id}"))?;
                self.send(self.client.put(url).json(&body)).await?
            }
            None => {
                let url = self.endpoint("geozone-groups")?;
                self.send(self.client.post(url).json(&body)).await?
            }
        };
        let payload = self.read_success(response).await?;
        // Updates keep their id; some service versions answer an empty
        // body on PUT, so only creates require a decodable response.
        if let Some(group_id) = existing {
            return Ok(group_id);
        }
        Ok(ExternalGroupId::new(
            self.decode_created_id(&payload, "geozone group")?,
        ))
    }

    async fn submit_override(&self, submission: OverrideSubmission) -> Result<(), GatewayError> {
        let body = OverrideRequestDto {
            config_id: submission.config_id,
            overrides: submission
                .slots
                .into_iter()
                .map(|slot| OverrideSlotDto {
                    slot_id: slot.slot_id,
                    value: slot.value,
                })
                .collect(),
        };
        let url = self.endpoint(&format!(
            "devices/{}/settings-override",
            submission.device_uid
        ))?;
        let response = self.send(self.client.post(url).json(&body)).await?;
        self.read_success(response).await?;
        Ok(())
    }
}

fn map_transport_error(error: reqwest::Error) -> GatewayError {
    if error.is_timeout() {
        GatewayError::timeout(error.to_string())
    } else {
        GatewayError::transport(error.to_string())
    }
}

fn map_status_error(status: StatusCode, body: &[u8]) -> GatewayError {
    let preview = body_preview(body);
    let message = if preview.is_empty() {
        format!("status {}", status.as_u16())
    } else {
        format!("status {}: {}", status.as_u16(), preview)
    };

    match status {
        StatusCode::PAYLOAD_TOO_LARGE => GatewayError::payload_too_large(message),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GatewayError::auth(message),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => GatewayError::timeout(message),
        _ if status.is_client_error() => GatewayError::invalid_request(message),
        _ => GatewayError::transport(message),
    }
}

fn body_preview(body: &[u8]) -> String {
    const PREVIEW_CHAR_LIMIT: usize = 160;

    let compact = String::from_utf8_lossy(body)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let preview = compact.chars().take(PREVIEW_CHAR_LIMIT).collect::<String>();
    if compact.chars().count() > PREVIEW_CHAR_LIMIT {
        format!("{preview}...")
    } else {
        preview
    }
}
