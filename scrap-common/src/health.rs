use std::collections::HashMap;
use std::ops::Add;
use std::sync::{Arc, PoisonError, RwLock};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use time::{Duration, OffsetDateTime};
use tracing::warn;

/// Liveness tracking for the long-running loops of the worker.
///
/// Each loop registers a component with a deadline and must report healthy more
/// often than that deadline. The process is healthy only when every registered
/// component has a report that has not yet expired. A component that never
/// reported, reported unhealthy, or missed its deadline fails the check.
#[derive(Default, Debug)]
pub struct HealthStatus {
    pub healthy: bool,
    pub components: HashMap<String, ComponentStatus>,
}

impl IntoResponse for HealthStatus {
    fn into_response(self) -> Response {
        let body = format!("{:?}", self.components);
        match self.healthy {
            true => (StatusCode::OK, body),
            false => (StatusCode::INTERNAL_SERVER_ERROR, body),
        }
        .into_response()
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ComponentStatus {
    /// Registered but has not reported yet.
    Starting,
    HealthyUntil(OffsetDateTime),
    Unhealthy,
    /// The last healthy report expired before a new one arrived.
    Stalled,
}

type Components = Arc<RwLock<HashMap<String, ComponentStatus>>>;

#[derive(Clone)]
pub struct HealthHandle {
    component: String,
    deadline: Duration,
    components: Components,
}

impl HealthHandle {
    /// Must be called more frequently than the deadline given at registration.
    pub fn report_healthy(&self) {
        self.report_status(ComponentStatus::HealthyUntil(
            OffsetDateTime::now_utc().add(self.deadline),
        ))
    }

    pub fn report_status(&self, status: ComponentStatus) {
        let mut components = self
            .components
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        components.insert(self.component.clone(), status);
    }
}

#[derive(Clone)]
pub struct HealthRegistry {
    name: String,
    components: Components,
}

impl HealthRegistry {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            components: Default::default(),
        }
    }

    pub fn register(&self, component: &str, deadline: Duration) -> HealthHandle {
        let handle = HealthHandle {
            component: component.to_owned(),
            deadline,
            components: self.components.clone(),
        };
        handle.report_status(ComponentStatus::Starting);
        handle
    }

    /// Computes the process status from every registered component. Usable as an axum handler.
    pub fn get_status(&self) -> HealthStatus {
        let components = self
            .components
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let now = OffsetDateTime::now_utc();

        let mut status = HealthStatus {
            healthy: !components.is_empty(),
            components: HashMap::with_capacity(components.len()),
        };

        for (name, component) in components.iter() {
            let current = match component {
                ComponentStatus::HealthyUntil(until) if *until > now => *component,
                ComponentStatus::HealthyUntil(_) => ComponentStatus::Stalled,
                other => *other,
            };
            if !matches!(current, ComponentStatus::HealthyUntil(_)) {
                status.healthy = false;
            }
            status.components.insert(name.clone(), current);
        }

        if !status.healthy {
            warn!("{} health check failed: {:?}", self.name, status.components);
        }
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ops::Sub;

    #[test]
    fn empty_registry_is_unhealthy() {
        let registry = HealthRegistry::new("liveness");
        assert!(!registry.get_status().healthy);
    }

    #[test]
    fn component_goes_healthy_after_reporting() {
        let registry = HealthRegistry::new("liveness");
        let handle = registry.register("consumer", Duration::seconds(30));

        let status = registry.get_status();
        assert!(!status.healthy);
        assert_eq!(
            status.components.get("consumer"),
            Some(&ComponentStatus::Starting)
        );

        handle.report_healthy();
        assert!(registry.get_status().healthy);

        handle.report_status(ComponentStatus::Unhealthy);
        assert!(!registry.get_status().healthy);
    }

    #[test]
    fn expired_report_is_stalled() {
        let registry = HealthRegistry::new("liveness");
        let handle = registry.register("consumer", Duration::seconds(30));

        handle.report_status(ComponentStatus::HealthyUntil(
            OffsetDateTime::now_utc().sub(Duration::seconds(1)),
        ));

        let status = registry.get_status();
        assert!(!status.healthy);
        assert_eq!(
            status.components.get("consumer"),
            Some(&ComponentStatus::Stalled)
        );
    }

    #[test]
    fn every_component_must_be_healthy() {
        let registry = HealthRegistry::new("liveness");
        let consumer = registry.register("consumer", Duration::seconds(30));
        let producer = registry.register("producer", Duration::seconds(30));

        consumer.report_healthy();
        assert!(!registry.get_status().healthy);

        producer.report_healthy();
        assert!(registry.get_status().healthy);
    }

    #[test]
    fn status_maps_to_http_code() {
        let nok = HealthStatus::default().into_response();
        assert_eq!(nok.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let ok = HealthStatus {
            healthy: true,
            components: Default::default(),
        }
        .into_response();
        assert_eq!(ok.status(), StatusCode::OK);
    }
}
