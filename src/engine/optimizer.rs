use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::geo::{nearest, path_length_km};
use crate::models::fleet::GeoPoint;
use crate::models::order::StopType;

/// What the sequencer sees of a stop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StopPoint {
    pub stop_id: Uuid,
    pub order_id: Uuid,
    #[serde(rename = "type")]
    pub stop_type: StopType,
    pub location: Option<GeoPoint>,
}

#[derive(Debug, Error)]
pub enum OptimizerError {
    #[error("optimizer unavailable: {0}")]
    Unavailable(String),

    #[error("optimizer rejected the request: {0}")]
    Rejected(String),

    #[error("optimizer returned an unusable sequence: {0}")]
    InvalidSequence(String),
}

/// Produces a visiting order for a route's stops. The result must be a
/// permutation of the input stop ids; anything else is discarded by the caller.
#[async_trait]
pub trait Optimizer: Send + Sync {
    async fn sequence(&self, stops: &[StopPoint]) -> Result<Vec<Uuid>, OptimizerError>;

    fn name(&self) -> &'static str;
}

/// Greedy nearest-neighbour over haversine distance. An order's drops only
/// become eligible once its pickups are visited. Stops without coordinates
/// keep their input order at the tail, and so do drops whose order has a
/// pickup without coordinates.
pub struct NearestNeighborOptimizer;

#[async_trait]
impl Optimizer for NearestNeighborOptimizer {
    async fn sequence(&self, stops: &[StopPoint]) -> Result<Vec<Uuid>, OptimizerError> {
        Ok(nearest_neighbor_sequence(stops))
    }

    fn name(&self) -> &'static str {
        "nearest_neighbor"
    }
}

pub fn nearest_neighbor_sequence(stops: &[StopPoint]) -> Vec<Uuid> {
    let unplaceable_orders: HashSet<Uuid> = stops
        .iter()
        .filter(|stop| stop.stop_type == StopType::Pickup && stop.location.is_none())
        .map(|stop| stop.order_id)
        .collect();

    let (mut remaining, deferred): (Vec<&StopPoint>, Vec<&StopPoint>) =
        stops.iter().partition(|stop| {
            stop.location.is_some() && !unplaceable_orders.contains(&stop.order_id)
        });

    if remaining.len() < 2 {
        return stops.iter().map(|stop| stop.stop_id).collect();
    }

    let mut ordered: Vec<&StopPoint> = Vec::with_capacity(stops.len());
    let mut current: Option<GeoPoint> = None;

    while !remaining.is_empty() {
        let eligible: Vec<usize> = (0..remaining.len())
            .filter(|&index| is_eligible(remaining[index], &remaining))
            .collect();

        let choice = match current {
            Some(from) => {
                let points: Vec<GeoPoint> = eligible
                    .iter()
                    .filter_map(|&index| remaining[index].location)
                    .collect();
                nearest(&from, &points).map(|position| eligible[position])
            }
            None => eligible.first().copied(),
        };

        // Never empty: any remaining pickup qualifies, and with no pickups left
        // every drop does.
        let index = choice.unwrap_or(0);
        let stop = remaining.remove(index);
        current = stop.location;
        ordered.push(stop);
    }

    let located: Vec<GeoPoint> = ordered.iter().filter_map(|stop| stop.location).collect();
    tracing::debug!(
        stops = stops.len(),
        distance_km = path_length_km(&located),
        "nearest-neighbour sequence computed"
    );

    ordered
        .into_iter()
        .chain(deferred)
        .map(|stop| stop.stop_id)
        .collect()
}

fn is_eligible(stop: &StopPoint, remaining: &[&StopPoint]) -> bool {
    stop.stop_type == StopType::Pickup
        || !remaining
            .iter()
            .any(|other| other.order_id == stop.order_id && other.stop_type == StopType::Pickup)
}

#[derive(Serialize)]
struct SequenceRequest<'a> {
    stops: &'a [StopPoint],
}

#[derive(Deserialize)]
struct SequenceResponse {
    stop_order: Vec<Uuid>,
}

/// Delegates sequencing to an external routing service.
pub struct HttpOptimizer {
    client: Client,
    url: String,
}

impl HttpOptimizer {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, OptimizerError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| OptimizerError::Unavailable(format!("failed to build client: {err}")))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Optimizer for HttpOptimizer {
    async fn sequence(&self, stops: &[StopPoint]) -> Result<Vec<Uuid>, OptimizerError> {
        let response = self
            .client
            .post(&self.url)
            .json(&SequenceRequest { stops })
            .send()
            .await
            .map_err(|err| OptimizerError::Unavailable(err.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(OptimizerError::Rejected(format!("{status}: {body}")));
        }

        let parsed: SequenceResponse = response
            .json()
            .await
            .map_err(|err| OptimizerError::InvalidSequence(err.to_string()))?;

        Ok(parsed.stop_order)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
