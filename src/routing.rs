//! Routing service clients.
//!
//! A [`RouteClient`] is everything the orchestrator needs from the routing
//! service: compute a route between two points with a named profile, and
//! upload a custom profile to obtain a temporary profile id.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                       RouteClient                         │
//! │                                                           │
//! │  route(RouteRequest) ──────────► RouteGeoJson             │
//! │  upload_profile(text) ─────────► profile id               │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Built-in Clients
//!
//! | Client | Module | Description |
//! |--------|--------|-------------|
//! | BRouter | [`brouter`] | BRouter HTTP API over reqwest |
//!
//! # Error Handling
//!
//! All client operations return [`RoutingResult<T>`]. A failed route request
//! is an ordinary outcome for a regression run (the profile may simply not
//! find a route), so the orchestrator records it per test case instead of
//! aborting the run.

pub mod brouter;

use async_trait::async_trait;

use crate::geometry::RouteGeoJson;

pub use brouter::BrouterClient;

/// A `[lon, lat]` position.
pub type Point = [f64; 2];

/// Result type for routing operations.
pub type RoutingResult<T> = Result<T, RoutingError>;

/// Errors that can occur while talking to the routing service.
#[derive(Debug, thiserror::Error)]
pub enum RoutingError {
    /// The request named no profile.
    #[error("No profile")]
    NoProfile,

    /// The HTTP exchange itself failed (connect, timeout, body read).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    ///
    /// The routing service reports "no route found" and similar conditions
    /// this way, with a plain-text explanation in the body.
    #[error("Routing service returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, trimmed.
        body: String,
    },

    /// The response body was not the expected JSON.
    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The service accepted the request but reported an error in its payload.
    #[error("Routing service rejected request: {0}")]
    Rejected(String),

    /// A profile upload succeeded but the response named no profile id.
    #[error("Profile upload response carried no profile id")]
    MissingProfileId,
}

/// A single route computation.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteRequest {
    /// Route origin.
    pub start: Point,
    /// Route destination.
    pub end: Point,
    /// Profile name or uploaded profile id.
    pub profile: String,
}

impl RouteRequest {
    /// Creates a request from `start` to `end` with `profile`.
    pub fn new(start: Point, end: Point, profile: impl Into<String>) -> Self {
        Self {
            start,
            end,
            profile: profile.into(),
        }
    }

    /// Waypoints in the service's `lon,lat|lon,lat` notation.
    ///
    /// ```
    /// use routecheck::routing::RouteRequest;
    ///
    /// let req = RouteRequest::new([13.38, 52.51], [8.0, 50.25], "trekking");
    /// assert_eq!(req.lonlats(), "13.38,52.51|8,50.25");
    /// ```
    pub fn lonlats(&self) -> String {
        format!(
            "{},{}|{},{}",
            self.start[0], self.start[1], self.end[0], self.end[1]
        )
    }
}

/// Client for a routing service.
#[async_trait]
pub trait RouteClient: Send + Sync {
    /// Computes a route.
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError::NoProfile`] for an empty profile, or any
    /// transport, status or decoding failure.
    async fn route(&self, request: &RouteRequest) -> RoutingResult<RouteGeoJson>;

    /// Uploads profile source text and returns the id to route with.
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError::Rejected`] when the service refuses the
    /// profile (for instance, it does not compile).
    async fn upload_profile(&self, profile: &str) -> RoutingResult<String>;

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}
