//! Baseline-corrected discharge prediction
//!
//! The routed rainfall rate only explains part of the river's flow. The rest
//! (groundwater, upstream contributions) is estimated from the latest gauged
//! discharge: whatever the routing cannot account for at the observation
//! time is carried forward unchanged as the baseline.
//!
//! ```text
//! baseline   = observed · 3600 − route(t_obs) / divisor
//! prediction = baseline + route(T) / divisor
//! ```
//!
//! All internal quantities are m³/h; m³/s appears only in
//! [`Prediction::flow_m3s`].

use crate::error::{ForecastError, Result};
use crate::hydrometry::{DischargeSource, Observation};
use crate::routing::{truncate_to_hour, FlowEstimate, FlowRouter};
use chrono::{DateTime, Utc};
use hydrocast_rainfall::RainfallSource;
use serde::Serialize;
use tracing::{debug, info};

const SECONDS_PER_HOUR: f64 = 3600.0;

/// Reference gauge and scaling of the routed rate
#[derive(Debug, Clone, Copy)]
pub struct BaselineParams {
    pub latitude: f64,
    pub longitude: f64,
    /// Gauge search radius, km
    pub max_distance_km: f64,
    /// Empirical attenuation applied to the routed rate
    pub flow_divisor: f64,
}

impl Default for BaselineParams {
    fn default() -> Self {
        Self {
            latitude: 43.520681,
            longitude: 1.411743,
            max_distance_km: 5.0,
            flow_divisor: 12.0,
        }
    }
}

/// Baseline derived from one observation
#[derive(Debug, Clone, Serialize)]
pub struct Baseline {
    pub observation: Observation,
    /// Observation time truncated to the hour
    pub observed_at: DateTime<Utc>,
    pub observed_m3h: f64,
    /// Routed rate at `observed_at` before scaling
    pub routed_m3h: f64,
    pub baseline_m3h: f64,
}

/// Predicted discharge at one instant
#[derive(Debug, Clone, Serialize)]
pub struct Prediction {
    pub arrival: DateTime<Utc>,
    pub flow_m3h: f64,
    pub baseline_m3h: f64,
    /// Scaled routed contribution
    pub rainfall_m3h: f64,
    pub routing: FlowEstimate,
    pub baseline: Baseline,
}

impl Prediction {
    pub fn flow_m3s(&self) -> f64 {
        self.flow_m3h / SECONDS_PER_HOUR
    }
}

/// Combines a flow router with observed discharge.
pub struct BaselineCorrector<S, D> {
    router: FlowRouter<S>,
    discharge: D,
    params: BaselineParams,
}

impl<S, D> BaselineCorrector<S, D>
where
    S: RainfallSource + 'static,
    D: DischargeSource,
{
    pub fn new(router: FlowRouter<S>, discharge: D, params: BaselineParams) -> Result<Self> {
        if !(params.flow_divisor > 0.0) {
            return Err(ForecastError::InvalidInput(format!(
                "flow_divisor must be positive, got {}",
                params.flow_divisor
            )));
        }
        Ok(Self {
            router,
            discharge,
            params,
        })
    }

    pub fn router(&self) -> &FlowRouter<S> {
        &self.router
    }

    pub fn params(&self) -> &BaselineParams {
        &self.params
    }

    /// Baseline from the latest observation near the reference point
    pub async fn baseline(&self) -> Result<Baseline> {
        let p = &self.params;
        let observation = self
            .discharge
            .latest_discharge(p.latitude, p.longitude, p.max_distance_km)
            .await?;
        self.baseline_from(observation).await
    }

    /// Baseline from a given observation
    pub async fn baseline_from(&self, observation: Observation) -> Result<Baseline> {
        let observed_at = truncate_to_hour(observation.observed_at)?;
        let routed = self.router.estimate(observed_at).await?;

        let observed_m3h = observation.value * SECONDS_PER_HOUR;
        let baseline_m3h = observed_m3h - routed.rate_m3h / self.params.flow_divisor;
        debug!(
            "Observed {:.2} m3/s at {} ({}), baseline {:.1} m3/h",
            observation.value, observed_at, observation.site.code, baseline_m3h
        );

        Ok(Baseline {
            observation,
            observed_at,
            observed_m3h,
            routed_m3h: routed.rate_m3h,
            baseline_m3h,
        })
    }

    /// Predicted discharge arriving at `arrival` (hour-aligned)
    pub async fn predict(&self, arrival: DateTime<Utc>) -> Result<Prediction> {
        let baseline = self.baseline().await?;
        self.predict_with(baseline, arrival).await
    }

    /// Prediction reusing an already computed baseline
    pub async fn predict_with(&self, baseline: Baseline, arrival: DateTime<Utc>) -> Result<Prediction> {
        let routing = self.router.estimate(arrival).await?;
        let rainfall_m3h = routing.rate_m3h / self.params.flow_divisor;
        let flow_m3h = baseline.baseline_m3h + rainfall_m3h;
        info!(
            "Predicted {:.2} m3/s at {} (baseline {:.1} m3/h, rainfall {:.1} m3/h)",
            flow_m3h / SECONDS_PER_HOUR,
            arrival,
            baseline.baseline_m3h,
            rainfall_m3h
        );

        Ok(Prediction {
            arrival,
            flow_m3h,
            baseline_m3h: baseline.baseline_m3h,
            rainfall_m3h,
            routing,
            baseline,
        })
    }
}
