use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::Result;
use crate::types::{BoundingBox, PointOfInterest};

/// Read side of the points-of-interest collaborator.
pub trait PoiSource {
    /// POIs inside the square window `center ± radius` carrying at least one
    /// requested category key.
    async fn query(&self, center_lat: f64, center_lon: f64, radius: f64) -> Result<Vec<PointOfInterest>>;
}

/// OpenStreetMap POIs via an Overpass API interpreter endpoint.
pub struct OverpassClient {
    client: reqwest::Client,
    url: String,
    categories: Vec<String>,
}

impl OverpassClient {
    pub fn new(url: &str, categories: Vec<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.to_string(),
            categories,
        })
    }
}

impl PoiSource for OverpassClient {
    async fn query(&self, center_lat: f64, center_lon: f64, radius: f64) -> Result<Vec<PointOfInterest>> {
        let bbox = BoundingBox::around(center_lat, center_lon, 2.0 * radius);
        let ql = build_query(&bbox, &self.categories);
        debug!(query = %ql, "[POI] Overpass request");

        let resp: OverpassResponse = self
            .client
            .post(&self.url)
            .form(&[("data", ql.as_str())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let total = resp.elements.len();
        let pois: Vec<PointOfInterest> = resp
            .elements
            .into_iter()
            .filter_map(|e| e.into_poi(&self.categories))
            .collect();

        info!(elements = total, pois = pois.len(), %bbox, "[POI] Overpass response");
        Ok(pois)
    }
}

/// Overpass QL for every node/way/relation carrying one of the category keys.
/// Ways and relations report their centre.
pub fn build_query(bbox: &BoundingBox, categories: &[String]) -> String {
    let area = format!("({},{},{},{})", bbox.south, bbox.west, bbox.north, bbox.east);
    let selectors: String = categories
        .iter()
        .map(|c| format!("nwr[\"{c}\"]{area};"))
        .collect();
    format!("[out:json];({selectors});out center tags;")
}

#[derive(Debug, Deserialize)]
struct OverpassResponse {
    #[serde(default)]
    elements: Vec<OverpassElement>,
}

#[derive(Debug, Deserialize)]
struct OverpassElement {
    lat: Option<f64>,
    lon: Option<f64>,
    center: Option<LatLon>,
    #[serde(default)]
    tags: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct LatLon {
    lat: f64,
    lon: f64,
}

impl OverpassElement {
    fn into_poi(self, categories: &[String]) -> Option<PointOfInterest> {
        let (lat, lon) = match (self.lat, self.lon, &self.center) {
            (Some(lat), Some(lon), _) => (lat, lon),
            (_, _, Some(c)) => (c.lat, c.lon),
            _ => return None,
        };
        let mut poi = PointOfInterest::new(lat, lon);
        poi.tags = self.tags;
        categories.iter().any(|c| poi.has_category(c)).then_some(poi)
    }
}
