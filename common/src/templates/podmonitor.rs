use super::{NAME_LABEL, PART_OF_LABEL, managed_labels, propagate_labels};
use crate::{
    MeshGateway, POD_MONITOR_SUFFIX,
    podmonitor::{NamespaceSelector, PodMetricsEndpoint, PodMonitor, PodMonitorSpec},
    short_name,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use std::collections::BTreeMap;

pub fn pod_monitor_name(deployment: &str) -> String {
    short_name(deployment, POD_MONITOR_SUFFIX)
}

pub fn pod_monitor(cr: &MeshGateway, deployment: &str, namespace: &str) -> PodMonitor {
    let name = pod_monitor_name(deployment);
    let mut labels = managed_labels();
    labels.insert("k8s-app".to_string(), name.clone());
    labels.insert(NAME_LABEL.to_string(), name.clone());
    labels.insert("app.kubernetes.io/component".to_string(), "monitoring".to_string());
    labels.insert(
        "app.kubernetes.io/processed-by-operator".to_string(),
        "victoriametrics-operator".to_string(),
    );
    propagate_labels(&mut labels, cr.labels(), &[PART_OF_LABEL]);
    let mut pm = PodMonitor::new(&name, PodMonitorSpec {
        job_label: Some("k8s-app".to_string()),
        pod_metrics_endpoints: vec![PodMetricsEndpoint {
            interval: Some("30s".to_string()),
            port: Some("admin".to_string()),
            scheme: Some("http".to_string()),
            path: Some("/stats/prometheus".to_string()),
        }],
        namespace_selector: Some(NamespaceSelector {
            match_names: vec![namespace.to_string()],
        }),
        selector: LabelSelector {
            match_labels: Some(BTreeMap::from([("name".to_string(), deployment.to_string())])),
            ..Default::default()
        },
    });
    pm.metadata.namespace = Some(namespace.to_string());
    pm.metadata.labels = Some(labels);
    pm.metadata.owner_references = Some(vec![cr.owner_reference()]);
    pm
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{facade::GatewaySpecBody, meshgateway::fixtures::*};

    #[test]
    fn test_pod_monitor() {
        let cr = facade_service("svcA", GatewaySpecBody::default());
        let pm = pod_monitor(&cr, "svcA-gateway", "ns");
        assert_eq!(pm.metadata.name.as_deref(), Some("svcA-gateway-pod-monitor"));
        assert_eq!(pm.metadata.labels.as_ref().unwrap()["k8s-app"], "svcA-gateway-pod-monitor");
        assert_eq!(pm.spec.selector.match_labels.as_ref().unwrap()["name"], "svcA-gateway");
        assert_eq!(pm.spec.namespace_selector.as_ref().unwrap().match_names, vec!["ns".to_string()]);
        let json = serde_json::to_value(&pm).unwrap();
        assert_eq!(json["apiVersion"], "monitoring.coreos.com/v1");
        assert_eq!(json["spec"]["podMetricsEndpoints"][0]["path"], "/stats/prometheus");
    }

    #[test]
    fn test_long_name_is_cut() {
        let cr = facade_service("svcA", GatewaySpecBody::default());
        let pm = pod_monitor(&cr, &"d".repeat(80), "ns");
        assert_eq!(pm.metadata.name.as_ref().unwrap().len(), 63);
    }
}
