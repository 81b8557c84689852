//! GeoJSON route geometry returned by the routing service.
//!
//! The service answers a route request with a `FeatureCollection` whose first
//! feature is the route itself: a `LineString` of `[lon, lat, elevation]`
//! positions plus a bag of string-valued properties (`track-length`,
//! `filtered ascend`, ...). Only the geometry takes part in comparisons.
//!
//! # Example
//!
//! ```
//! use routecheck::geometry::RouteGeoJson;
//!
//! let route: RouteGeoJson = serde_json::from_str(r#"{
//!     "type": "FeatureCollection",
//!     "features": [{
//!         "type": "Feature",
//!         "properties": { "track-length": "1520" },
//!         "geometry": {
//!             "type": "LineString",
//!             "coordinates": [[13.38, 52.51, 34.0], [13.40, 52.52, 36.5]]
//!         }
//!     }]
//! }"#).unwrap();
//!
//! assert_eq!(route.start(), Some(&[13.38, 52.51, 34.0][..]));
//! assert_eq!(route.track_length(), Some(1520.0));
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A routing response in GeoJSON form.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RouteGeoJson {
    /// Route features; the first one is the route.
    #[serde(default)]
    pub features: Vec<Feature>,
}

/// A single GeoJSON feature.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Feature {
    /// Route geometry, absent if the service returned an empty feature.
    #[serde(default)]
    pub geometry: Option<Geometry>,

    /// Free-form feature properties.
    #[serde(default)]
    pub properties: Map<String, Value>,
}

/// A GeoJSON line geometry.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Geometry {
    /// GeoJSON geometry type, `LineString` for routes.
    #[serde(rename = "type")]
    pub kind: String,

    /// Positions as `[lon, lat]` or `[lon, lat, elevation]`.
    #[serde(default)]
    pub coordinates: Vec<Vec<f64>>,

    /// Any other geometry members (`bbox`, foreign members).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RouteGeoJson {
    /// The route feature.
    pub fn feature(&self) -> Option<&Feature> {
        self.features.first()
    }

    /// The route geometry.
    pub fn geometry(&self) -> Option<&Geometry> {
        self.feature().and_then(|f| f.geometry.as_ref())
    }

    /// First position of the route.
    pub fn start(&self) -> Option<&[f64]> {
        self.geometry()
            .and_then(|g| g.coordinates.first())
            .map(Vec::as_slice)
    }

    /// Last position of the route.
    pub fn end(&self) -> Option<&[f64]> {
        self.geometry()
            .and_then(|g| g.coordinates.last())
            .map(Vec::as_slice)
    }

    /// Route length in meters, from the `track-length` property.
    ///
    /// The service encodes numbers as strings; plain JSON numbers are
    /// accepted too.
    pub fn track_length(&self) -> Option<f64> {
        match self.feature()?.properties.get("track-length")? {
            Value::String(s) => s.parse().ok(),
            Value::Number(n) => n.as_f64(),
            _ => None,
        }
    }
}

/// Returns `true` if both routes carry a geometry and the geometries match
/// exactly, every geometry member included.
pub fn same_geometry(expected: &RouteGeoJson, actual: &RouteGeoJson) -> bool {
    match (expected.geometry(), actual.geometry()) {
        (Some(e), Some(a)) => e == a,
        _ => false,
    }
}
