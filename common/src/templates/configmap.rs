use super::{PART_OF_LABEL, managed_labels, propagate_labels};
use crate::{MONITORING_CONFIG_SUFFIX, MeshGateway};
use k8s_openapi::{api::core::v1::ConfigMap, apimachinery::pkg::apis::meta::v1::ObjectMeta};
use std::collections::BTreeMap;

pub fn monitoring_config_map_name(deployment: &str) -> String {
    format!("{deployment}{MONITORING_CONFIG_SUFFIX}")
}

/// Scrape hint read by the monitoring agent next to each gateway deployment
pub fn monitoring_config_map(cr: &MeshGateway, deployment: &str, namespace: &str) -> ConfigMap {
    let mut labels = managed_labels();
    propagate_labels(&mut labels, cr.labels(), &[PART_OF_LABEL]);
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(monitoring_config_map_name(deployment)),
            namespace: Some(namespace.to_string()),
            labels: Some(labels),
            owner_references: Some(vec![cr.owner_reference()]),
            ..Default::default()
        },
        data: Some(BTreeMap::from([(
            "prometheus.url.metrics".to_string(),
            "http://%(ip)s:9901/stats/prometheus".to_string(),
        )])),
        ..Default::default()
    }
}
