use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;

use crate::config::Config;
use crate::exif::GeoPoint;

/// Free-text place lookup used to position the map.
///
/// # Example
///
/// ```rust,no_run
/// use geotagger::geocode::{NominatimSearch, PlaceSearch};
///
/// # async fn example() -> anyhow::Result<()> {
/// let search = NominatimSearch::new(
///     "https://nominatim.openstreetmap.org".into(),
///     "geotagger-example".into(),
/// );
/// if let Some(point) = search.search("Point State Park, Pittsburgh").await? {
///     println!("{}, {}", point.latitude, point.longitude);
/// }
/// # Ok(())
/// # }
/// ```
#[async_trait::async_trait]
pub trait PlaceSearch: Send + Sync {
    /// The display name of this service (e.g., "Nominatim").
    fn name(&self) -> &str;
    /// Best match for `query`, or `None` when nothing matches.
    async fn search(&self, query: &str) -> Result<Option<GeoPoint>>;
}

/// OpenStreetMap Nominatim search API.
pub struct NominatimSearch {
    endpoint: String,
    user_agent: String,
    client: Client,
}

impl NominatimSearch {
    pub fn new(endpoint: String, user_agent: String) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            user_agent,
            client: Client::new(),
        }
    }
}

#[async_trait::async_trait]
impl PlaceSearch for NominatimSearch {
    fn name(&self) -> &str {
        "Nominatim"
    }

    async fn search(&self, query: &str) -> Result<Option<GeoPoint>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(None);
        }

        let resp = self
            .client
            .get(format!("{}/search", self.endpoint))
            .query(&[("format", "json"), ("q", query), ("limit", "1")])
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .send()
            .await
            .context("Nominatim request failed")?;

        let status = resp.status();
        let text = resp.text().await.context("Failed to read Nominatim response")?;

        if !status.is_success() {
            anyhow::bail!("Nominatim API error ({}): {}", status, text);
        }

        let point = parse_search_response(&text)?;
        match point {
            Some(p) => log::debug!("Nominatim: {query:?} → {}, {}", p.latitude, p.longitude),
            None => log::info!("Nominatim: no match for {query:?}"),
        }
        Ok(point)
    }
}

#[derive(Deserialize)]
struct Place {
    // Nominatim sends coordinates as strings
    lat: String,
    lon: String,
}

/// Parse a Nominatim `format=json` search response into its first point.
pub fn parse_search_response(text: &str) -> Result<Option<GeoPoint>> {
    let places: Vec<Place> =
        serde_json::from_str(text).context("Failed to parse Nominatim response JSON")?;

    let Some(place) = places.into_iter().next() else {
        return Ok(None);
    };

    let latitude: f64 = place.lat.trim().parse().with_context(|| format!("Bad latitude {:?}", place.lat))?;
    let longitude: f64 = place.lon.trim().parse().with_context(|| format!("Bad longitude {:?}", place.lon))?;
    Ok(Some(GeoPoint { latitude, longitude }))
}

/// Build the place search from configuration, if enabled.
pub fn build_place_search(config: &Config) -> Option<Box<dyn PlaceSearch>> {
    let geocoder = &config.geocoder;
    if !geocoder.enabled {
        return None;
    }
    if geocoder.endpoint.trim().is_empty() {
        log::warn!("Geocoder enabled but no endpoint configured");
        return None;
    }
    if geocoder.user_agent.trim().is_empty() {
        log::warn!("Geocoder enabled but no User-Agent configured");
        return None;
    }
    Some(Box::new(NominatimSearch::new(geocoder.endpoint.clone(), geocoder.user_agent.clone())))
}
