use std::collections::HashMap;
use std::ops::Add;
use std::sync::{Arc, RwLock};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use time::Duration;
use tracing::warn;

/// Health reporting for the asynchronous components of a service.
///
/// A process that hosts background loops can only be trusted with data if
/// those loops are actually running. Each loop registers itself and gets a
/// `HealthHandle` it must report through more often than its deadline.
/// The process status is the combination of all component statuses:
///   - a component that reported recently is healthy until its deadline
///   - a component that missed its deadline is stalled
///   - any stalled or unhealthy component fails the whole probe
///
/// Staleness is evaluated when the probe is read, so a component that dies
/// silently fails the check without anyone having to notice first.

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ComponentStatus {
    /// Automatically set when a component is newly registered
    Starting,
    /// Recently reported healthy, will need to report again before the date
    HealthyUntil(time::OffsetDateTime),
    /// Reported unhealthy
    Unhealthy,
    /// Automatically set when the HealthyUntil deadline is reached
    Stalled,
}

#[derive(Default, Debug)]
pub struct HealthStatus {
    /// The overall status: true if all components are healthy
    pub healthy: bool,
    /// Current status of each registered component, for display
    pub components: HashMap<String, ComponentStatus>,
}

impl IntoResponse for HealthStatus {
    /// Computes the status code from the overall health status,
    /// and prints each component status in the body for debugging.
    fn into_response(self) -> Response {
        let body = format!("{:?}", self);
        match self.healthy {
            true => (StatusCode::OK, body),
            false => (StatusCode::INTERNAL_SERVER_ERROR, body),
        }
        .into_response()
    }
}

type ComponentMap = Arc<RwLock<HashMap<String, ComponentStatus>>>;

pub struct HealthHandle {
    component: String,
    deadline: Duration,
    components: ComponentMap,
}

impl HealthHandle {
    /// Report as healthy until the component's deadline.
    /// Must be called more frequently than the configured deadline.
    pub fn report_healthy(&self) {
        self.report_status(ComponentStatus::HealthyUntil(
            time::OffsetDateTime::now_utc().add(self.deadline),
        ))
    }

    pub fn report_status(&self, status: ComponentStatus) {
        match self.components.write() {
            Ok(mut map) => {
                _ = map.insert(self.component.clone(), status);
            }
            // Poisoned lock: just warn, the probe will fail and the process restart
            Err(_) => warn!("poisoned HealthRegistry lock"),
        }
    }
}

#[derive(Clone)]
pub struct HealthRegistry {
    name: String,
    components: ComponentMap,
}

impl HealthRegistry {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            components: Default::default(),
        }
    }

    /// Registers a new component in the registry. The returned handle should be passed
    /// to the component, to allow it to frequently report its health status.
    pub fn register(&self, component: String, deadline: Duration) -> HealthHandle {
        let handle = HealthHandle {
            component,
            deadline,
            components: self.components.clone(),
        };
        handle.report_status(ComponentStatus::Starting);
        handle
    }

    /// Returns the overall process status, computed from the status of all the
    /// components currently registered. Can be used as an axum handler.
    pub fn get_status(&self) -> HealthStatus {
        let components = match self.components.read() {
            Ok(map) => map,
            Err(_) => {
                warn!("poisoned HealthRegistry lock");
                return HealthStatus {
                    healthy: false,
                    components: Default::default(),
                };
            }
        };

        // Unhealthy until at least one component has registered
        let mut result = HealthStatus {
            healthy: !components.is_empty(),
            components: Default::default(),
        };
        let now = time::OffsetDateTime::now_utc();

        for (name, status) in components.iter() {
            match status {
                ComponentStatus::HealthyUntil(until) if until.gt(&now) => {
                    _ = result.components.insert(name.clone(), status.clone());
                }
                ComponentStatus::HealthyUntil(_) => {
                    result.healthy = false;
                    _ = result
                        .components
                        .insert(name.clone(), ComponentStatus::Stalled);
                }
                other => {
                    result.healthy = false;
                    _ = result.components.insert(name.clone(), other.clone());
                }
            }
        }

        if !result.healthy {
            warn!("{} health check failed: {:?}", self.name, result.components);
        }
        result
    }
}
