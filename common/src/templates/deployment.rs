use super::{NAME_LABEL, PART_OF_LABEL, VERSION_LABEL, is_quantity, label_value, managed_labels, propagate_labels};
use crate::{
    EGRESS_GATEWAY, FACADE_GATEWAY_LABEL, HOSTED_BY_LABEL, LAST_APPLIED_CR_ANNOTATION, MASTER_CR_LABEL,
    MESH_ROUTER_LABEL, MeshGateway, Result,
    config::{OperatorConfig, Platform},
    loosevalue, short_name,
};
use k8s_openapi::{
    api::{
        apps::v1::{Deployment, DeploymentSpec},
        core::v1::{
            Capabilities, Container, ContainerPort, EmptyDirVolumeSource, EnvVar, EnvVarSource,
            HTTPGetAction, ObjectFieldSelector, PodSpec, PodTemplateSpec, Probe, ResourceRequirements,
            SeccompProfile, SecurityContext, TopologySpreadConstraint, Volume, VolumeMount,
        },
    },
    apimachinery::pkg::{
        api::resource::Quantity,
        apis::meta::v1::{LabelSelector, ObjectMeta},
        util::intstr::IntOrString,
    },
};
use std::collections::BTreeMap;
use tracing::*;

pub static ADMIN_PORT: i32 = 9901;
pub static DEFAULT_GATEWAY_PORT: i32 = 8080;
static MINIMUM_EGRESS_MEMORY_MI: i64 = 64;
static CONFIG_VOLUME: &str = "config";

/// Envoy deployment serving one gateway
pub struct RouterDeployment<'a> {
    pub config: &'a OperatorConfig,
    pub cr: &'a MeshGateway,
    /// Value of `SERVICE_NAME_VARIABLE`, the name envoy registers with
    pub service_name: String,
    /// Deployment name
    pub gateway_name: String,
    pub namespace: String,
    pub image: String,
    pub mesh_router: bool,
}

fn quantity_or_default(value: Option<String>, default: &str, field: &str) -> Quantity {
    match value {
        Some(v) if is_quantity(&v) => Quantity(v.trim().to_string()),
        Some(v) => {
            error!("Error during converting {field} '{v}', using '{default}'");
            Quantity(default.to_string())
        }
        None => Quantity(default.to_string()),
    }
}

/// Limits and requests of the gateway container; the memory request equals the memory limit
pub fn resource_requirements(config: &OperatorConfig, cr: &MeshGateway) -> ResourceRequirements {
    let env = cr.spec().env.clone().unwrap_or_default();
    let mut default_memory = config.default_memory_limit.clone();
    if cr.name() == EGRESS_GATEWAY {
        let default_mi = default_memory.trim_end_matches("Mi").parse::<i64>().unwrap_or(0);
        if default_mi < MINIMUM_EGRESS_MEMORY_MI {
            default_memory = format!("{MINIMUM_EGRESS_MEMORY_MI}Mi");
        }
    }
    let memory = quantity_or_default(
        env.facade_gateway_memory_limit.filter(|m| !m.is_empty() && m != "null"),
        &default_memory,
        "facadeGatewayMemoryLimit",
    );
    let cpu_limit = quantity_or_default(
        env.facade_gateway_cpu_limit.as_text(),
        &config.default_cpu_limit,
        "facadeGatewayCpuLimit",
    );
    let cpu_request = quantity_or_default(
        env.facade_gateway_cpu_request.as_text(),
        &config.default_cpu_request,
        "facadeGatewayCpuRequest",
    );
    ResourceRequirements {
        limits: Some(BTreeMap::from([
            ("cpu".to_string(), cpu_limit),
            ("memory".to_string(), memory.clone()),
        ])),
        requests: Some(BTreeMap::from([
            ("cpu".to_string(), cpu_request),
            ("memory".to_string(), memory),
        ])),
        ..Default::default()
    }
}

impl RouterDeployment<'_> {
    fn master_cr(&self) -> Option<String> {
        self.cr.is_master().then(|| self.cr.name())
    }

    fn app_name_label(&self) -> String {
        match (self.master_cr(), self.cr.label(NAME_LABEL)) {
            (Some(_), Some(name)) => name.to_string(),
            _ => self.gateway_name.clone(),
        }
    }

    /// `app.kubernetes.io/instance`: the deployment and namespace, cut to a valid label value
    pub fn instance_label(&self) -> String {
        label_value(&short_name(&self.gateway_name, &format!("-{}", self.namespace)))
    }

    fn labels(&self, template: bool) -> BTreeMap<String, String> {
        let mut labels = if template {
            BTreeMap::from([("app".to_string(), self.gateway_name.clone())])
        } else {
            managed_labels()
        };
        labels.insert("name".to_string(), self.gateway_name.clone());
        labels.insert(NAME_LABEL.to_string(), self.app_name_label());
        labels.insert("app.kubernetes.io/instance".to_string(), self.instance_label());
        labels.insert("app.kubernetes.io/component".to_string(), "mesh-gateway".to_string());
        labels.insert("app.kubernetes.io/technology".to_string(), "cpp".to_string());
        labels.insert(FACADE_GATEWAY_LABEL.to_string(), "true".to_string());
        propagate_labels(&mut labels, self.cr.labels(), &[PART_OF_LABEL, VERSION_LABEL]);
        if let Some(master) = self.master_cr() {
            labels.insert(MASTER_CR_LABEL.to_string(), master);
            if let Some(hosted_by) = self.cr.label(HOSTED_BY_LABEL).filter(|h| !h.is_empty()) {
                labels.insert(HOSTED_BY_LABEL.to_string(), hosted_by.to_string());
            }
        }
        if self.mesh_router {
            labels.insert(MESH_ROUTER_LABEL.to_string(), "true".to_string());
        }
        labels
    }

    fn container_ports(&self) -> Vec<ContainerPort> {
        let mut ports = vec![ContainerPort {
            name: Some("admin".to_string()),
            container_port: ADMIN_PORT,
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }];
        let gateway_ports = &self.cr.spec().gateway_ports;
        if gateway_ports.is_empty() {
            ports.push(ContainerPort {
                name: Some("web".to_string()),
                container_port: DEFAULT_GATEWAY_PORT,
                protocol: Some("TCP".to_string()),
                ..Default::default()
            });
        } else {
            ports.extend(gateway_ports.iter().filter(|p| p.port != ADMIN_PORT).map(|p| ContainerPort {
                name: Some(p.name.clone()),
                container_port: p.port,
                protocol: Some(protocol(&p.protocol)),
                ..Default::default()
            }));
        }
        ports
    }

    fn env(&self, memory_limit: &str) -> Vec<EnvVar> {
        let value = |name: &str, value: String| EnvVar {
            name: name.to_string(),
            value: Some(value),
            value_from: None,
        };
        let field = |name: &str, path: &str| EnvVar {
            name: name.to_string(),
            value: None,
            value_from: Some(EnvVarSource {
                field_ref: Some(ObjectFieldSelector {
                    field_path: path.to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            }),
        };
        let config = self.config;
        let concurrency = loosevalue::concurrency(
            &self.cr.spec().env.clone().unwrap_or_default().facade_gateway_concurrency,
            config.default_concurrency,
        );
        vec![
            value("SERVICE_NAME_VARIABLE", self.service_name.clone()),
            field("CLOUD_NAMESPACE", "metadata.namespace"),
            field("POD_HOSTNAME", "metadata.name"),
            value("GW_MEMORY_LIMIT", memory_limit.to_string()),
            value(
                "GW_TERMINATION_GRACE_PERIOD_S",
                config.termination_grace_period_s.to_string(),
            ),
            value("TRACING_ENABLED", config.tracing_enabled.clone()),
            value("TRACING_HOST", config.tracing_host.clone()),
            value("IP_STACK", config.ip_stack.clone()),
            value("IP_BIND", config.ip_bind.clone()),
            value("ENVOY_UID", "0".to_string()),
            value("XDS_CLUSTER_HOST", config.xds_cluster_host.clone()),
            value("XDS_CLUSTER_PORT", config.xds_cluster_port.clone()),
            value("LOG_LEVEL", config.log_level.clone()),
            value("ENVOY_CONCURRENCY", concurrency.to_string()),
        ]
    }

    fn probe(initial_delay: i32, timeout: i32, period: i32, success: i32, failure: i32) -> Probe {
        Probe {
            http_get: Some(HTTPGetAction {
                path: Some("/ready".to_string()),
                port: IntOrString::Int(ADMIN_PORT),
                scheme: Some("HTTP".to_string()),
                ..Default::default()
            }),
            initial_delay_seconds: Some(initial_delay),
            timeout_seconds: Some(timeout),
            period_seconds: Some(period),
            success_threshold: Some(success),
            failure_threshold: Some(failure),
            ..Default::default()
        }
    }

    fn security_context(&self) -> SecurityContext {
        SecurityContext {
            read_only_root_filesystem: Some(self.config.read_only_container),
            run_as_non_root: Some(true),
            run_as_group: (self.config.platform == Platform::Kubernetes).then_some(10001),
            seccomp_profile: Some(SeccompProfile {
                type_: "RuntimeDefault".to_string(),
                ..Default::default()
            }),
            allow_privilege_escalation: Some(false),
            capabilities: Some(Capabilities {
                drop: Some(vec!["ALL".to_string()]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn topology_spread(&self) -> Vec<TopologySpreadConstraint> {
        let selector = || {
            Some(LabelSelector {
                match_labels: Some(BTreeMap::from([("name".to_string(), self.gateway_name.clone())])),
                ..Default::default()
            })
        };
        match &self.config.cloud_topologies {
            Some(topologies) => topologies
                .iter()
                .map(|t| TopologySpreadConstraint {
                    max_skew: t.max_skew,
                    topology_key: t.topology_key.clone(),
                    when_unsatisfiable: t.when_unsatisfiable.clone(),
                    label_selector: selector(),
                    ..Default::default()
                })
                .collect(),
            None => vec![TopologySpreadConstraint {
                max_skew: 1,
                topology_key: self.config.cloud_topology_key.clone(),
                when_unsatisfiable: "ScheduleAnyway".to_string(),
                label_selector: selector(),
                ..Default::default()
            }],
        }
    }

    pub fn build(&self) -> Result<Deployment> {
        let resources = resource_requirements(self.config, self.cr);
        let memory_limit = resources
            .limits
            .as_ref()
            .and_then(|l| l.get("memory"))
            .map(|q| q.0.clone())
            .unwrap_or_default();
        let replicas = loosevalue::replicas(&self.cr.spec().replicas, self.config.default_replicas);
        let read_only = self.config.read_only_container;
        debug!(
            "Building deployment {} with replicas {replicas} and resources {resources:?}",
            self.gateway_name
        );
        Ok(Deployment {
            metadata: ObjectMeta {
                name: Some(self.gateway_name.clone()),
                namespace: Some(self.namespace.clone()),
                labels: Some(self.labels(false)),
                annotations: Some(BTreeMap::from([(
                    LAST_APPLIED_CR_ANNOTATION.to_string(),
                    self.cr.last_applied().to_json()?,
                )])),
                owner_references: Some(vec![self.cr.owner_reference()]),
                ..Default::default()
            },
            spec: Some(DeploymentSpec {
                replicas: Some(replicas),
                selector: LabelSelector {
                    match_labels: Some(BTreeMap::from([("app".to_string(), self.gateway_name.clone())])),
                    ..Default::default()
                },
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(self.labels(true)),
                        ..Default::default()
                    }),
                    spec: Some(PodSpec {
                        containers: vec![Container {
                            name: self.gateway_name.clone(),
                            image: Some(self.image.clone()),
                            args: Some(vec!["/envoy/run.sh".to_string()]),
                            ports: Some(self.container_ports()),
                            env: Some(self.env(&memory_limit)),
                            resources: Some(resources),
                            liveness_probe: Some(Self::probe(300, 30, 10, 1, 3)),
                            readiness_probe: Some(Self::probe(1, 30, 2, 1, 15)),
                            security_context: Some(self.security_context()),
                            volume_mounts: read_only.then(|| {
                                vec![VolumeMount {
                                    name: CONFIG_VOLUME.to_string(),
                                    mount_path: "/envoy/config".to_string(),
                                    ..Default::default()
                                }]
                            }),
                            ..Default::default()
                        }],
                        topology_spread_constraints: Some(self.topology_spread()),
                        volumes: read_only.then(|| {
                            vec![Volume {
                                name: CONFIG_VOLUME.to_string(),
                                empty_dir: Some(EmptyDirVolumeSource::default()),
                                ..Default::default()
                            }]
                        }),
                        termination_grace_period_seconds: Some(self.config.termination_grace_period_s),
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            ..Default::default()
        })
    }
}

/// Upper-cased protocol, TCP when unset
pub fn protocol(value: &str) -> String {
    if value.is_empty() {
        "TCP".to_string()
    } else {
        value.to_uppercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::CloudTopology,
        facade::{FacadeServiceEnv, GatewayPort, GatewaySpecBody},
        lastapplied::LastAppliedCr,
        loosevalue::LooseValue,
        meshgateway::fixtures::*,
    };

    fn build(config: &OperatorConfig, cr: &MeshGateway, mesh_router: bool) -> Deployment {
        RouterDeployment {
            config,
            cr,
            service_name: cr.name(),
            gateway_name: cr.deployment_name(),
            namespace: "ns".to_string(),
            image: "envoy:1".to_string(),
            mesh_router,
        }
        .build()
        .unwrap()
    }

    fn labels(d: &Deployment) -> &BTreeMap<String, String> {
        d.metadata.labels.as_ref().unwrap()
    }

    fn container(d: &Deployment) -> &Container {
        &d.spec.as_ref().unwrap().template.spec.as_ref().unwrap().containers[0]
    }

    #[test]
    fn test_facade_gateway_deployment() {
        let config = OperatorConfig::default();
        let cr = facade_service("svcA", GatewaySpecBody::default());
        let d = build(&config, &cr, false);
        assert_eq!(d.metadata.name.as_deref(), Some("svcA-gateway"));
        let labels = labels(&d);
        assert_eq!(labels[FACADE_GATEWAY_LABEL], "true");
        assert_eq!(labels["app.kubernetes.io/instance"], "svcA-gateway-ns");
        assert_eq!(labels[PART_OF_LABEL], "unknown");
        assert!(!labels.contains_key(MESH_ROUTER_LABEL));
        assert!(!labels.contains_key(MASTER_CR_LABEL));
        let spec = d.spec.as_ref().unwrap();
        assert_eq!(spec.replicas, Some(1));
        assert_eq!(
            spec.selector.match_labels.as_ref().unwrap()["app"],
            "svcA-gateway"
        );
        let ports = container(&d).ports.as_ref().unwrap();
        assert_eq!(ports.len(), 2);
        assert_eq!(ports[1].container_port, DEFAULT_GATEWAY_PORT);
        let last: LastAppliedCr =
            serde_json::from_str(&d.metadata.annotations.as_ref().unwrap()[LAST_APPLIED_CR_ANNOTATION]).unwrap();
        assert_eq!(last, cr.last_applied());
    }

    #[test]
    fn test_mesh_router_master_labels() {
        let config = OperatorConfig::default();
        let mut cr = gateway(
            "svcA",
            GatewaySpecBody {
                gateway: Some("composite1".into()),
                master_configuration: true,
                replicas: LooseValue::String("2".into()),
                gateway_ports: vec![
                    GatewayPort { name: "admin".into(), port: ADMIN_PORT, protocol: String::new() },
                    GatewayPort { name: "grpc".into(), port: 9000, protocol: "udp".into() },
                ],
                ..Default::default()
            },
        );
        if let MeshGateway::Gateway(gw) = &mut cr {
            gw.metadata.labels = Some(BTreeMap::from([
                (HOSTED_BY_LABEL.to_string(), "baseline".to_string()),
                (NAME_LABEL.to_string(), "composite".to_string()),
            ]));
        }
        let d = build(&config, &cr, true);
        let labels = labels(&d);
        assert_eq!(labels[MESH_ROUTER_LABEL], "true");
        assert_eq!(labels[MASTER_CR_LABEL], "svcA");
        assert_eq!(labels[HOSTED_BY_LABEL], "baseline");
        assert_eq!(labels[NAME_LABEL], "composite");
        let template_labels = d.spec.as_ref().unwrap().template.metadata.as_ref().unwrap().labels.as_ref().unwrap();
        assert_eq!(template_labels[MASTER_CR_LABEL], "svcA");
        assert_eq!(template_labels["app"], "composite1");
        assert_eq!(d.spec.as_ref().unwrap().replicas, Some(2));
        let ports = container(&d).ports.as_ref().unwrap();
        assert_eq!(ports.len(), 2);
        assert_eq!(ports[1].protocol.as_deref(), Some("UDP"));
    }

    #[test]
    fn test_resources_from_cr_and_defaults() {
        let config = OperatorConfig::default();
        let cr = facade_service(
            "svcA",
            GatewaySpecBody {
                env: Some(FacadeServiceEnv {
                    facade_gateway_cpu_limit: LooseValue::Int(1),
                    facade_gateway_cpu_request: LooseValue::String("not a cpu".into()),
                    facade_gateway_memory_limit: Some("200Mi".into()),
                    ..Default::default()
                }),
                ..Default::default()
            },
        );
        let res = resource_requirements(&config, &cr);
        let limits = res.limits.unwrap();
        let requests = res.requests.unwrap();
        assert_eq!(limits["cpu"], Quantity("1".into()));
        assert_eq!(limits["memory"], Quantity("200Mi".into()));
        assert_eq!(requests["memory"], Quantity("200Mi".into()));
        assert_eq!(requests["cpu"], Quantity(config.default_cpu_request.clone()));
    }

    #[test]
    fn test_egress_gateway_memory_floor() {
        let config = OperatorConfig {
            default_memory_limit: "32Mi".to_string(),
            ..Default::default()
        };
        let egress = facade_service(EGRESS_GATEWAY, GatewaySpecBody::default());
        let res = resource_requirements(&config, &egress);
        assert_eq!(res.limits.unwrap()["memory"], Quantity("64Mi".into()));
        let other = facade_service("svcA", GatewaySpecBody::default());
        assert_eq!(resource_requirements(&config, &other).limits.unwrap()["memory"], Quantity("32Mi".into()));
    }

    #[test]
    fn test_platform_and_topology() {
        let mut config = OperatorConfig {
            read_only_container: true,
            cloud_topologies: Some(vec![CloudTopology {
                topology_key: "zone".into(),
                max_skew: 2,
                when_unsatisfiable: "DoNotSchedule".into(),
            }]),
            ..Default::default()
        };
        let cr = facade_service("svcA", GatewaySpecBody::default());
        let d = build(&config, &cr, false);
        let pod = d.spec.as_ref().unwrap().template.spec.as_ref().unwrap();
        assert_eq!(pod.topology_spread_constraints.as_ref().unwrap()[0].topology_key, "zone");
        assert_eq!(pod.volumes.as_ref().unwrap()[0].name, CONFIG_VOLUME);
        assert_eq!(container(&d).security_context.as_ref().unwrap().run_as_group, Some(10001));
        config.platform = Platform::Openshift;
        let d = build(&config, &cr, false);
        assert_eq!(container(&d).security_context.as_ref().unwrap().run_as_group, None);
    }

    #[test]
    fn test_instance_label_is_truncated() {
        let config = OperatorConfig::default();
        let cr = facade_service(&"x".repeat(70), GatewaySpecBody::default());
        let d = build(&config, &cr, false);
        let instance = &labels(&d)["app.kubernetes.io/instance"];
        assert!(instance.len() <= 63);
        assert!(instance.ends_with("-ns"));
    }
}
