use std::fmt;

pub use common::{Error, Result};

/// Namespace and name of the resource a reconcile was triggered for
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct NamespacedName {
    pub namespace: String,
    pub name: String,
}

impl NamespacedName {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}

impl fmt::Display for NamespacedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

pub mod configmaps;
pub mod crclient;
pub mod deployments;
pub mod ingresses;
pub mod lock;
pub mod priority;
pub mod ready;
pub mod reconciler;
pub mod resources;
pub mod services;
pub mod status;
pub mod store;

/// Controllers of both gateway kinds and of the gateway image
pub mod facadeservice;
pub mod gateway;
pub mod imagesync;

/// State machinery for kube, as exposeable to actix
pub mod manager;
pub use manager::Manager;

/// Log and trace integrations
pub mod telemetry;

/// Metrics
mod metrics;
pub use metrics::Metrics;

#[cfg(test)]
mod memstore;
