use super::{MANAGED_BY_LABEL, PART_OF_LABEL, managed_labels, propagate_labels};
use crate::{
    ANNOTATION_PREFIX, Error, MeshGateway, OPERATOR_NAME, PRIVATE_GATEWAY_SERVICE, PUBLIC_GATEWAY_SERVICE, Result,
    config::{OperatorConfig, Platform},
    facade::IngressSpec,
    ingresskinds::{
        LegacyHttpIngressPath, LegacyHttpIngressRuleValue, LegacyIngress, LegacyIngressBackend, LegacyIngressRule,
        LegacyIngressSpec, Route, RoutePort, RouteSpec, RouteTargetReference,
    },
    templates::deployment::DEFAULT_GATEWAY_PORT,
};
use k8s_openapi::{
    api::networking::v1::{
        HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule, IngressServiceBackend,
        IngressSpec as K8sIngressSpec, ServiceBackendPort,
    },
    apimachinery::pkg::{
        apis::meta::v1::{ObjectMeta, OwnerReference},
        util::intstr::IntOrString,
    },
};
use std::collections::BTreeMap;

static NGINX_PREFIX: &str = "nginx.ingress.kubernetes.io";

/// Annotation telling objects created by this operator apart from foreign ones
pub fn is_managed(annotations: Option<&BTreeMap<String, String>>) -> bool {
    annotations
        .and_then(|a| a.get(MANAGED_BY_LABEL))
        .is_some_and(|v| v == OPERATOR_NAME)
}

/// Everything needed to render one hostname as an Ingress or a Route
#[derive(Clone, Debug, PartialEq)]
pub struct IngressTemplate {
    pub name: String,
    pub namespace: String,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub hostname: String,
    pub service_name: String,
    pub port: i32,
    pub ingress_class_name: Option<String>,
    pub owner: OwnerReference,
}

impl IngressTemplate {
    fn metadata(&self) -> ObjectMeta {
        ObjectMeta {
            name: Some(self.name.clone()),
            namespace: Some(self.namespace.clone()),
            labels: Some(self.labels.clone()),
            annotations: Some(self.annotations.clone()),
            owner_references: Some(vec![self.owner.clone()]),
            ..Default::default()
        }
    }

    pub fn build_ingress(&self) -> Ingress {
        Ingress {
            metadata: self.metadata(),
            spec: Some(K8sIngressSpec {
                ingress_class_name: self.ingress_class_name.clone(),
                rules: Some(vec![IngressRule {
                    host: Some(self.hostname.clone()),
                    http: Some(HTTPIngressRuleValue {
                        paths: vec![HTTPIngressPath {
                            path: Some("/".to_string()),
                            path_type: "Prefix".to_string(),
                            backend: IngressBackend {
                                service: Some(IngressServiceBackend {
                                    name: self.service_name.clone(),
                                    port: Some(ServiceBackendPort {
                                        number: Some(self.port),
                                        ..Default::default()
                                    }),
                                }),
                                ..Default::default()
                            },
                        }],
                    }),
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    pub fn build_legacy_ingress(&self) -> LegacyIngress {
        let mut ingress = LegacyIngress::new(&self.name, LegacyIngressSpec {
            ingress_class_name: self.ingress_class_name.clone(),
            rules: vec![LegacyIngressRule {
                host: Some(self.hostname.clone()),
                http: Some(LegacyHttpIngressRuleValue {
                    paths: vec![LegacyHttpIngressPath {
                        path: Some("/".to_string()),
                        path_type: Some("Prefix".to_string()),
                        backend: LegacyIngressBackend {
                            service_name: self.service_name.clone(),
                            service_port: IntOrString::Int(self.port),
                        },
                    }],
                }),
            }],
        });
        ingress.metadata = self.metadata();
        ingress
    }

    pub fn build_route(&self) -> Route {
        let mut route = Route::new(&self.name, RouteSpec {
            host: Some(self.hostname.clone()),
            to: RouteTargetReference {
                kind: "Service".to_string(),
                name: self.service_name.clone(),
                weight: None,
            },
            port: Some(RoutePort {
                target_port: IntOrString::Int(self.port),
            }),
        });
        route.metadata = self.metadata();
        route
    }
}

/// Renders the ingress specs of ingress-type gateways
#[derive(Clone, Debug)]
pub struct IngressTemplateBuilder {
    gw_annotations: BTreeMap<String, String>,
    x509_enabled: bool,
    satellite: bool,
    baseline_namespace: String,
    ingress_class_name: Option<String>,
    platform: Platform,
}

impl IngressTemplateBuilder {
    pub fn new(config: &OperatorConfig) -> Self {
        Self {
            gw_annotations: config.gw_ingress_annotations.clone(),
            x509_enabled: config.x509_enabled,
            satellite: config.is_satellite(),
            baseline_namespace: config.baseline_namespace.clone(),
            ingress_class_name: config.ingress_class.clone(),
            platform: config.platform,
        }
    }

    fn resolve_gateway_port(&self, spec: &IngressSpec, cr: &MeshGateway) -> Result<i32> {
        if spec.gateway_port > 0 {
            return Ok(spec.gateway_port);
        }
        let ports = &cr.spec().gateway_ports;
        if ports.len() > 1 {
            return Err(Error::InvalidFacadeServiceCr(format!(
                "could not resolve gateway port while building Ingress by CR {}: there are more than one port configured for the gateway service",
                cr.name()
            )));
        }
        let port = ports.first().map(|p| p.port).filter(|p| *p > 0).unwrap_or(cr.spec().port);
        Ok(if port > 0 { port } else { DEFAULT_GATEWAY_PORT })
    }

    /// Object name and backend port for one ingress spec
    pub fn build_name_and_port(&self, spec: &IngressSpec, cr: &MeshGateway, service_name: &str) -> Result<(String, i32)> {
        let port = self.resolve_gateway_port(spec, cr)?;
        let port_name = cr
            .spec()
            .gateway_ports
            .iter()
            .find(|p| p.port == port)
            .map(|p| p.name.clone())
            .unwrap_or_else(|| "web".to_string());
        let base = if service_name == PUBLIC_GATEWAY_SERVICE {
            "public-gateway".to_string()
        } else if service_name == PRIVATE_GATEWAY_SERVICE {
            "private-gateway".to_string()
        } else {
            format!("{service_name}-{port_name}")
        };
        let name = if spec.is_grpc { format!("{base}-grpc") } else { base };
        Ok((name, port))
    }

    fn annotations(&self, service_name: &str, namespace: &str, grpc: bool) -> BTreeMap<String, String> {
        let mut annotations = BTreeMap::from([
            (MANAGED_BY_LABEL.to_string(), OPERATOR_NAME.to_string()),
            (format!("{ANNOTATION_PREFIX}/start.stage"), "1".to_string()),
        ]);
        if service_name == PUBLIC_GATEWAY_SERVICE {
            for (key, value) in [
                ("tenant.service.tenant.id", "GENERAL"),
                ("tenant.service.show.name", "Public Gateway"),
                ("tenant.service.show.description", "Api Gateway to access public API"),
            ] {
                annotations.insert(format!("{ANNOTATION_PREFIX}/{key}"), value.to_string());
            }
            annotations.extend(self.gw_annotations.clone());
        } else if service_name == PRIVATE_GATEWAY_SERVICE {
            annotations.extend(self.gw_annotations.clone());
        }
        if self.platform == Platform::Openshift {
            return annotations;
        }
        if grpc {
            annotations.insert(format!("{NGINX_PREFIX}/ssl-redirect"), "true".to_string());
            annotations.insert(format!("{NGINX_PREFIX}/backend-protocol"), "GRPC".to_string());
        }
        if self.x509_enabled {
            let secret_namespace = if self.satellite { &self.baseline_namespace } else { namespace };
            annotations.insert(
                format!("{NGINX_PREFIX}/auth-tls-pass-certificate-to-upstream"),
                "true".to_string(),
            );
            annotations.insert(format!("{NGINX_PREFIX}/auth-tls-verify-client"), "optional_no_ca".to_string());
            annotations.insert(format!("{NGINX_PREFIX}/auth-tls-secret"), format!("{secret_namespace}/x509"));
        }
        annotations
    }

    pub fn build(&self, spec: &IngressSpec, cr: &MeshGateway, service_name: &str) -> Result<IngressTemplate> {
        let (name, port) = self.build_name_and_port(spec, cr, service_name)?;
        let mut labels = managed_labels();
        propagate_labels(&mut labels, cr.labels(), &[PART_OF_LABEL]);
        let namespace = cr.namespace();
        Ok(IngressTemplate {
            name,
            annotations: self.annotations(service_name, &namespace, spec.is_grpc),
            namespace,
            labels,
            hostname: spec.hostname.clone(),
            service_name: service_name.to_string(),
            port,
            ingress_class_name: self.ingress_class_name.clone(),
            owner: cr.owner_reference(),
        })
    }
}
