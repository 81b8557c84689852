//! BRouter HTTP client.
//!
//! Routes are requested with
//! `GET {base}/brouter?lonlats=..&profile=..&alternativeidx=0&format=geojson`
//! and custom profiles are uploaded with `POST {base}/brouter/profile`, whose
//! JSON answer carries either `profileid` or `error`.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{RouteClient, RouteRequest, RoutingError, RoutingResult};
use crate::geometry::RouteGeoJson;

/// Client for a BRouter server.
#[derive(Debug, Clone)]
pub struct BrouterClient {
    base_uri: String,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    profileid: Option<String>,
    error: Option<String>,
}

impl BrouterClient {
    /// Creates a client for the server at `base_uri` with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be initialized.
    pub fn new(base_uri: impl Into<String>, timeout: Duration) -> RoutingResult<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(base_uri, http))
    }

    /// Creates a client reusing an existing `reqwest::Client`.
    pub fn with_client(base_uri: impl Into<String>, http: reqwest::Client) -> Self {
        let base_uri = base_uri.into().trim_end_matches('/').to_string();
        Self { base_uri, http }
    }

    /// The server's base URI, without a trailing slash.
    pub fn base_uri(&self) -> &str {
        &self.base_uri
    }

    async fn read_body(response: reqwest::Response) -> RoutingResult<String> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(RoutingError::Status {
                status: status.as_u16(),
                body: body.trim().to_string(),
            });
        }
        Ok(body)
    }
}

#[async_trait]
impl RouteClient for BrouterClient {
    async fn route(&self, request: &RouteRequest) -> RoutingResult<RouteGeoJson> {
        if request.profile.is_empty() {
            return Err(RoutingError::NoProfile);
        }

        let lonlats = request.lonlats();
        debug!("GET {}/brouter lonlats={} profile={}", self.base_uri, lonlats, request.profile);

        let response = self
            .http
            .get(format!("{}/brouter", self.base_uri))
            .query(&[
                ("lonlats", lonlats.as_str()),
                ("profile", request.profile.as_str()),
                ("alternativeidx", "0"),
                ("format", "geojson"),
            ])
            .send()
            .await?;

        let body = Self::read_body(response).await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn upload_profile(&self, profile: &str) -> RoutingResult<String> {
        debug!("POST {}/brouter/profile ({} bytes)", self.base_uri, profile.len());

        let response = self
            .http
            .post(format!("{}/brouter/profile", self.base_uri))
            .body(profile.to_string())
            .send()
            .await?;

        let body = Self::read_body(response).await?;
        let upload: UploadResponse = serde_json::from_str(&body)?;

        if let Some(error) = upload.error {
            return Err(RoutingError::Rejected(error));
        }
        upload.profileid.ok_or(RoutingError::MissingProfileId)
    }

    fn name(&self) -> &'static str {
        "brouter"
    }
}
