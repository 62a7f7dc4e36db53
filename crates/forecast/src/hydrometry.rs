//! Observed river discharge from the Hub'Eau hydrometry API.
//!
//! `/obs_elab` serves elaborated observations: daily or monthly mean,
//! minimum and maximum discharge (`QmnJ`, `QINnJ`, `QIXnJ`, ...) and water
//! level. Discharge is published in L/s and converted to m³/s here; water
//! levels in mm are converted to m.

use crate::error::{ForecastError, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use tracing::{debug, warn};

/// Physical quantity of an observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Measure {
    /// Discharge, m³/s
    Discharge,
    /// Water level, m
    Height,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Statistic {
    Average,
    Min,
    Max,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationSpan {
    Daily,
    Monthly,
}

/// A gauging station
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteInfo {
    pub code: String,
    pub longitude: f64,
    pub latitude: f64,
    pub river: String,
}

/// One elaborated observation, in SI units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub site: SiteInfo,
    pub observed_at: DateTime<Utc>,
    pub measure: Measure,
    pub statistic: Statistic,
    pub span: AggregationSpan,
    pub value: f64,
}

/// Decompose a Hub'Eau elaborated quantity code such as `QIXnJ`.
///
/// The first letter is the measure; `ix`/`in` mark max/min (anything else is
/// a mean) and `nj` marks a daily aggregate (otherwise monthly).
pub fn parse_quantity_code(code: &str) -> Option<(Measure, Statistic, AggregationSpan)> {
    let measure = match code.chars().next()? {
        'Q' => Measure::Discharge,
        'H' => Measure::Height,
        _ => return None,
    };
    let lower = code.to_lowercase();
    let statistic = if lower.contains("ix") {
        Statistic::Max
    } else if lower.contains("in") {
        Statistic::Min
    } else {
        Statistic::Average
    };
    let span = if lower.contains("nj") {
        AggregationSpan::Daily
    } else {
        AggregationSpan::Monthly
    };
    Some((measure, statistic, span))
}

#[derive(Debug, Deserialize)]
struct RawObservation {
    code_site: String,
    longitude: f64,
    latitude: f64,
    #[serde(default)]
    libelle_cours_eau: Option<String>,
    date_obs_elab: NaiveDate,
    resultat_obs_elab: f64,
    grandeur_hydro_elab: String,
}

impl RawObservation {
    fn into_observation(self, default_river: &str) -> Option<Observation> {
        let (measure, statistic, span) = parse_quantity_code(&self.grandeur_hydro_elab)?;
        // L/s to m³/s, mm to m
        let value = self.resultat_obs_elab / 1000.0;
        Some(Observation {
            site: SiteInfo {
                code: self.code_site,
                longitude: self.longitude,
                latitude: self.latitude,
                river: self.libelle_cours_eau.unwrap_or_else(|| default_river.to_string()),
            },
            observed_at: self.date_obs_elab.and_hms_opt(0, 0, 0)?.and_utc(),
            measure,
            statistic,
            span,
            value,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RawSite {
    code_site: String,
    longitude_site: f64,
    latitude_site: f64,
    #[serde(default)]
    libelle_cours_eau: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    data: Vec<serde_json::Value>,
}

/// Parse an `/obs_elab` response body, dropping records that do not parse
pub fn parse_observations(body: &str, default_river: &str) -> Result<Vec<Observation>> {
    let envelope: Envelope = serde_json::from_str(body)
        .map_err(|e| ForecastError::Hydrometry(format!("parsing observations: {e}")))?;

    let total = envelope.data.len();
    let observations: Vec<Observation> = envelope
        .data
        .into_iter()
        .filter_map(|v| serde_json::from_value::<RawObservation>(v).ok())
        .filter_map(|raw| raw.into_observation(default_river))
        .collect();

    if observations.len() < total {
        debug!("dropped {} unparseable observations", total - observations.len());
    }
    Ok(observations)
}

/// Most recent observation of the given kind
pub fn latest_measure(
    observations: &[Observation],
    measure: Measure,
    statistic: Statistic,
    span: AggregationSpan,
) -> Option<&Observation> {
    observations
        .iter()
        .filter(|o| o.measure == measure && o.statistic == statistic && o.span == span)
        .max_by_key(|o| o.observed_at)
}

/// Provider of the latest observed discharge near a point.
pub trait DischargeSource: Send + Sync {
    /// Latest daily-maximum discharge (m³/s) within `max_distance_km`
    fn latest_discharge(
        &self,
        latitude: f64,
        longitude: f64,
        max_distance_km: f64,
    ) -> impl Future<Output = Result<Observation>> + Send;
}

/// Hub'Eau hydrometry client
#[derive(Debug, Clone)]
pub struct HubEauClient {
    client: reqwest::Client,
    base_url: String,
    river: String,
}

impl HubEauClient {
    pub const DEFAULT_BASE_URL: &'static str = "https://hubeau.eaufrance.fr/api/v2/hydrometrie";

    pub fn new(base_url: impl Into<String>, river: impl Into<String>, timeout: std::time::Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ForecastError::Hydrometry(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            river: river.into(),
        })
    }

    async fn get_text(&self, path: &str, query: &[(&str, String)]) -> Result<String> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self.client.get(&url).query(query).send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        // Hub'Eau answers 206 when the result is paginated
        if !status.is_success() {
            return Err(ForecastError::Hydrometry(format!(
                "GET {} returned HTTP {}: {}",
                url,
                status,
                body.chars().take(300).collect::<String>()
            )));
        }
        Ok(body)
    }

    /// Observations near a point from `start_date` onwards
    pub async fn fetch_observations(
        &self,
        latitude: f64,
        longitude: f64,
        max_distance_km: f64,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<Observation>> {
        let mut query = vec![
            ("latitude", latitude.to_string()),
            ("longitude", longitude.to_string()),
            ("distance", max_distance_km.to_string()),
        ];
        if let Some(d) = start_date {
            query.push(("date_debut_obs_elab", d.format("%Y-%m-%d").to_string()));
        }
        if let Some(d) = end_date {
            query.push(("date_fin_obs_elab", d.format("%Y-%m-%d").to_string()));
        }

        let body = self.get_text("/obs_elab", &query).await?;
        parse_observations(&body, &self.river)
    }

    /// Active station on the configured river closest to a point
    pub async fn locate_nearest_station(
        &self,
        latitude: f64,
        longitude: f64,
        max_distance_km: f64,
    ) -> Result<Option<SiteInfo>> {
        let query = [
            ("latitude", latitude.to_string()),
            ("longitude", longitude.to_string()),
            ("distance", max_distance_km.to_string()),
            ("libelle_cours_eau", self.river.clone()),
            ("en_service", "true".to_string()),
        ];
        let body = self.get_text("/referentiel/sites", &query).await?;
        let envelope: Envelope = serde_json::from_str(&body)
            .map_err(|e| ForecastError::Hydrometry(format!("parsing sites: {e}")))?;

        let sites = envelope
            .data
            .into_iter()
            .filter_map(|v| serde_json::from_value::<RawSite>(v).ok())
            .map(|s| SiteInfo {
                code: s.code_site,
                longitude: s.longitude_site,
                latitude: s.latitude_site,
                river: s.libelle_cours_eau.unwrap_or_else(|| self.river.clone()),
            });
        Ok(nearest(sites, latitude, longitude))
    }
}

fn nearest(sites: impl Iterator<Item = SiteInfo>, latitude: f64, longitude: f64) -> Option<SiteInfo> {
    let distance = |s: &SiteInfo| (s.latitude - latitude).powi(2) + (s.longitude - longitude).powi(2);
    sites.min_by(|a, b| distance(a).total_cmp(&distance(b)))
}

impl DischargeSource for HubEauClient {
    async fn latest_discharge(&self, latitude: f64, longitude: f64, max_distance_km: f64) -> Result<Observation> {
        let yesterday = (Utc::now() - Duration::days(1)).date_naive();
        let observations = self
            .fetch_observations(latitude, longitude, max_distance_km, Some(yesterday), None)
            .await?;

        match latest_measure(&observations, Measure::Discharge, Statistic::Max, AggregationSpan::Daily) {
            Some(obs) => Ok(obs.clone()),
            None => {
                warn!("no daily maximum discharge since {yesterday} near ({latitude}, {longitude})");
                Err(ForecastError::NoObservation(format!(
                    "no daily maximum discharge since {yesterday} within {max_distance_km} km"
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"{
        "count": 4,
        "data": [
            {"code_site": "O2000040", "longitude": 1.42, "latitude": 43.52,
             "date_obs_elab": "2026-01-11", "resultat_obs_elab": 152000.0, "grandeur_hydro_elab": "QIXnJ"},
            {"code_site": "O2000040", "longitude": 1.42, "latitude": 43.52,
             "date_obs_elab": "2026-01-12", "resultat_obs_elab": 180500.0, "grandeur_hydro_elab": "QIXnJ"},
            {"code_site": "O2000040", "longitude": 1.42, "latitude": 43.52,
             "date_obs_elab": "2026-01-12", "resultat_obs_elab": 120000.0, "grandeur_hydro_elab": "QmnJ"},
            {"code_site": "O2000040", "longitude": 1.42, "latitude": 43.52,
             "date_obs_elab": "2026-01-13", "resultat_obs_elab": null, "grandeur_hydro_elab": "QIXnJ"}
        ]
    }"#;

    #[test]
    fn quantity_codes() {
        assert_eq!(
            parse_quantity_code("QIXnJ"),
            Some((Measure::Discharge, Statistic::Max, AggregationSpan::Daily))
        );
        assert_eq!(
            parse_quantity_code("QINnJ"),
            Some((Measure::Discharge, Statistic::Min, AggregationSpan::Daily))
        );
        assert_eq!(
            parse_quantity_code("QmM"),
            Some((Measure::Discharge, Statistic::Average, AggregationSpan::Monthly))
        );
        assert_eq!(
            parse_quantity_code("HIXnJ"),
            Some((Measure::Height, Statistic::Max, AggregationSpan::Daily))
        );
        assert_eq!(parse_quantity_code("XmnJ"), None);
        assert_eq!(parse_quantity_code(""), None);
    }

    #[test]
    fn parses_and_converts_to_cubic_metres() {
        let obs = parse_observations(BODY, "La Garonne").unwrap();
        // the null result is dropped
        assert_eq!(obs.len(), 3);
        assert_eq!(obs[0].value, 152.0);
        assert_eq!(obs[0].site.river, "La Garonne");
        assert_eq!(obs[0].observed_at.to_rfc3339(), "2026-01-11T00:00:00+00:00");
    }

    #[test]
    fn latest_daily_max_wins() {
        let obs = parse_observations(BODY, "La Garonne").unwrap();
        let latest = latest_measure(&obs, Measure::Discharge, Statistic::Max, AggregationSpan::Daily).unwrap();
        assert_eq!(latest.value, 180.5);
        assert!(latest_measure(&obs, Measure::Height, Statistic::Max, AggregationSpan::Daily).is_none());
    }

    #[test]
    fn malformed_body_is_an_upstream_error() {
        let err = parse_observations("<html>", "La Garonne").unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn nearest_site() {
        let site = |code: &str, lat: f64, lon: f64| SiteInfo {
            code: code.into(),
            latitude: lat,
            longitude: lon,
            river: "La Garonne".into(),
        };
        let sites = vec![site("far", 43.6, 1.5), site("near", 43.521, 1.412), site("mid", 43.55, 1.42)];
        assert_eq!(nearest(sites.into_iter(), 43.520681, 1.411743).unwrap().code, "near");
        assert!(nearest(std::iter::empty(), 0.0, 0.0).is_none());
    }

    #[tokio::test]
    #[ignore]
    async fn live_latest_discharge() {
        let client = HubEauClient::new(HubEauClient::DEFAULT_BASE_URL, "La Garonne", std::time::Duration::from_secs(30)).unwrap();
        let obs = client.latest_discharge(43.520681, 1.411743, 5.0).await.unwrap();
        assert_eq!(obs.measure, Measure::Discharge);
        assert!(obs.value > 0.0);
    }
}
