use super::{NAME_LABEL, PART_OF_LABEL, deployment::protocol, managed_labels, propagate_labels};
use crate::{MeshGateway, config::ServiceType, templates::deployment::DEFAULT_GATEWAY_PORT};
use k8s_openapi::{
    api::core::v1::{Service, ServicePort, ServiceSpec},
    apimachinery::pkg::{apis::meta::v1::ObjectMeta, util::intstr::IntOrString},
};
use std::collections::BTreeMap;

pub static HEADLESS_CLUSTER_IP: &str = "None";

/// Service selecting the pods of a gateway deployment
pub struct FacadeServiceTemplate<'a> {
    pub cr: &'a MeshGateway,
    pub name: String,
    pub namespace: String,
    /// Deployment the service routes to
    pub selector: String,
    pub service_type: ServiceType,
}

impl FacadeServiceTemplate<'_> {
    fn ports(&self) -> Vec<ServicePort> {
        let spec = self.cr.spec();
        if spec.gateway_ports.is_empty() {
            return vec![ServicePort {
                name: Some("web".to_string()),
                port: spec.port,
                protocol: Some("TCP".to_string()),
                target_port: Some(IntOrString::Int(DEFAULT_GATEWAY_PORT)),
                ..Default::default()
            }];
        }
        spec.gateway_ports
            .iter()
            .map(|p| ServicePort {
                name: Some(p.name.clone()),
                port: p.port,
                protocol: Some(protocol(&p.protocol)),
                target_port: Some(IntOrString::Int(p.port)),
                ..Default::default()
            })
            .collect()
    }

    pub fn build(&self) -> Service {
        let mut labels = managed_labels();
        labels.insert("name".to_string(), self.name.clone());
        labels.insert(
            NAME_LABEL.to_string(),
            self.cr.label(NAME_LABEL).unwrap_or(self.name.as_str()).to_string(),
        );
        propagate_labels(&mut labels, self.cr.labels(), &[PART_OF_LABEL]);
        Service {
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                namespace: Some(self.namespace.clone()),
                labels: Some(labels),
                owner_references: Some(vec![self.cr.owner_reference()]),
                ..Default::default()
            },
            spec: Some(ServiceSpec {
                selector: Some(BTreeMap::from([("app".to_string(), self.selector.clone())])),
                ports: Some(self.ports()),
                cluster_ip: (self.service_type == ServiceType::Headless).then(|| HEADLESS_CLUSTER_IP.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

/// True when the cluster IP of an existing service has the shape `service_type` needs
pub fn matches_service_type(service: &Service, service_type: ServiceType) -> bool {
    let cluster_ip = service.spec.as_ref().and_then(|s| s.cluster_ip.as_deref());
    match service_type {
        ServiceType::Headless => cluster_ip == Some(HEADLESS_CLUSTER_IP),
        ServiceType::ClusterIp => cluster_ip != Some(HEADLESS_CLUSTER_IP),
    }
}
