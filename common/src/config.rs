use crate::{Error, Result, Semver};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Platform {
    #[default]
    Kubernetes,
    Openshift,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ServiceType {
    #[default]
    ClusterIp,
    Headless,
}

/// Which kind of object exposes ingress-type gateways
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IngressFlavor {
    IngressV1,
    IngressV1Beta1,
    Route,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudTopology {
    pub topology_key: String,
    #[serde(default = "default_max_skew")]
    pub max_skew: i32,
    #[serde(default = "default_when_unsatisfiable")]
    pub when_unsatisfiable: String,
}
fn default_max_skew() -> i32 {
    1
}
fn default_when_unsatisfiable() -> String {
    "ScheduleAnyway".to_string()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HpaBehaviorDefaults {
    pub stabilization_window_seconds: i32,
    pub percent_value: i32,
    pub percent_period_seconds: i32,
    pub pods_value: i32,
    pub pods_period_seconds: i32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HpaDefaults {
    pub min_replicas: i32,
    pub max_replicas: i32,
    pub average_utilization: i32,
    pub select_policy: String,
    pub scale_up: HpaBehaviorDefaults,
    pub scale_down: HpaBehaviorDefaults,
}

impl Default for HpaDefaults {
    fn default() -> Self {
        Self {
            min_replicas: 1,
            max_replicas: 9999,
            average_utilization: 75,
            select_policy: "Disabled".to_string(),
            scale_up: HpaBehaviorDefaults {
                stabilization_window_seconds: 60,
                percent_value: -1,
                percent_period_seconds: -1,
                pods_value: 1,
                pods_period_seconds: 60,
            },
            scale_down: HpaBehaviorDefaults {
                stabilization_window_seconds: 300,
                percent_value: -1,
                percent_period_seconds: -1,
                pods_value: 1,
                pods_period_seconds: 60,
            },
        }
    }
}

/// Everything the operator reads from its environment, resolved once at start-up
#[derive(Clone, Debug)]
pub struct OperatorConfig {
    /// Namespace the operator watches
    pub namespace: String,
    pub max_concurrent_reconciles: u16,
    pub control_plane_url: String,

    pub default_replicas: i32,
    pub default_memory_limit: String,
    pub default_cpu_limit: String,
    pub default_cpu_request: String,
    pub default_concurrency: i32,
    pub termination_grace_period_s: i64,

    pub monitoring_enabled: bool,
    pub artifact_descriptor_version: String,
    pub tracing_enabled: String,
    pub tracing_host: String,
    pub ip_stack: String,
    pub ip_bind: String,
    pub cloud_topologies: Option<Vec<CloudTopology>>,
    pub cloud_topology_key: String,
    pub xds_cluster_host: String,
    pub xds_cluster_port: String,
    pub read_only_container: bool,
    pub log_level: String,

    pub platform: Platform,
    pub platform_version: Option<Semver>,
    pub service_type: ServiceType,

    pub peer_namespace: String,
    pub ingress_class: Option<String>,
    pub gw_ingress_annotations: BTreeMap<String, String>,
    pub x509_enabled: bool,
    pub composite_satellite: bool,
    pub baseline_namespace: String,

    pub hpa: HpaDefaults,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            max_concurrent_reconciles: 1,
            control_plane_url: "http://control-plane:8080".to_string(),
            default_replicas: 1,
            default_memory_limit: "64Mi".to_string(),
            default_cpu_limit: "100m".to_string(),
            default_cpu_request: "50m".to_string(),
            default_concurrency: 0,
            termination_grace_period_s: 60,
            monitoring_enabled: true,
            artifact_descriptor_version: String::new(),
            tracing_enabled: "false".to_string(),
            tracing_host: String::new(),
            ip_stack: String::new(),
            ip_bind: String::new(),
            cloud_topologies: None,
            cloud_topology_key: "kubernetes.io/hostname".to_string(),
            xds_cluster_host: String::new(),
            xds_cluster_port: String::new(),
            read_only_container: false,
            log_level: "info".to_string(),
            platform: Platform::Kubernetes,
            platform_version: None,
            service_type: ServiceType::ClusterIp,
            peer_namespace: String::new(),
            ingress_class: None,
            gw_ingress_annotations: BTreeMap::new(),
            x509_enabled: false,
            composite_satellite: false,
            baseline_namespace: String::new(),
            hpa: HpaDefaults::default(),
        }
    }
}

fn env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && v != "null")
}

fn env_or(name: &str, default: &str) -> String {
    env(name).unwrap_or_else(|| default.to_string())
}

fn env_bool(name: &str, default: bool) -> bool {
    match env(name) {
        None => default,
        Some(v) => match v.to_lowercase().as_str() {
            "true" | "1" | "t" => true,
            "false" | "0" | "f" => false,
            _ => {
                warn!("Can not parse {name}='{v}' as a boolean, using {default}");
                default
            }
        },
    }
}

fn env_int<T: std::str::FromStr + std::fmt::Display + Copy>(name: &str, default: T) -> T {
    match env(name) {
        None => default,
        Some(v) => v.parse::<T>().unwrap_or_else(|_| {
            warn!("Can not parse {name}='{v}' as a number, using {default}");
            default
        }),
    }
}

/// Parse `name: 'value'` lines into an annotation map
pub fn parse_ingress_annotations(raw: &str) -> BTreeMap<String, String> {
    raw.replace("\r\n", "\n")
        .lines()
        .filter_map(|line| {
            let (name, rest) = line.split_once(':')?;
            let start = rest.find('\'')?;
            let end = rest.rfind('\'')?;
            if end <= start {
                return None;
            }
            Some((name.trim().to_string(), rest[start + 1..end].to_string()))
        })
        .collect()
}

/// Decode the base64 JSON list of topology spread settings
pub fn parse_cloud_topologies(encoded: &str) -> Result<Vec<CloudTopology>> {
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| Error::InitParamsValidation(format!("CLOUD_TOPOLOGIES_JSON_BASE64 is not base64: {e}")))?;
    let topologies: Vec<CloudTopology> = serde_json::from_slice(&bytes)?;
    if topologies.iter().any(|t| t.topology_key.is_empty()) {
        return Err(Error::InitParamsValidation(
            "parameter CLOUD_TOPOLOGIES doesn't contain mandatory field 'topologyKey'".to_string(),
        ));
    }
    Ok(topologies)
}

fn behavior_from_env(prefix: &str, default: &HpaBehaviorDefaults) -> HpaBehaviorDefaults {
    HpaBehaviorDefaults {
        stabilization_window_seconds: env_int(
            &format!("GATEWAY_HPA_{prefix}_STABILIZATION_WINDOW_SECONDS"),
            default.stabilization_window_seconds,
        ),
        percent_value: env_int(&format!("GATEWAY_HPA_{prefix}_PERCENT_VALUE"), default.percent_value),
        percent_period_seconds: env_int(
            &format!("GATEWAY_HPA_{prefix}_PERCENT_PERIOD_SECONDS"),
            default.percent_period_seconds,
        ),
        pods_value: env_int(&format!("GATEWAY_HPA_{prefix}_PODS_VALUE"), default.pods_value),
        pods_period_seconds: env_int(
            &format!("GATEWAY_HPA_{prefix}_PODS_PERIOD_SECONDS"),
            default.pods_period_seconds,
        ),
    }
}

impl OperatorConfig {
    pub fn from_env() -> Result<Self> {
        let base = Self::default();
        let platform = match env("PAAS_PLATFORM").map(|p| p.to_lowercase()) {
            None => Platform::Kubernetes,
            Some(p) if p == "kubernetes" => Platform::Kubernetes,
            Some(p) if p == "openshift" => Platform::Openshift,
            Some(p) => {
                return Err(Error::InitParamsValidation(format!(
                    "PAAS_PLATFORM must be 'kubernetes' or 'openshift', got '{p}'"
                )));
            }
        };
        let platform_version = env("PAAS_VERSION").and_then(|v| {
            let parsed = Semver::parse(&v);
            if parsed.is_none() {
                warn!("Can not parse PAAS_VERSION='{v}', assuming a recent cluster");
            }
            parsed
        });
        let service_type = match env("K8S_SERVICE_TYPE").map(|p| p.to_uppercase()) {
            None => ServiceType::ClusterIp,
            Some(t) if t == "CLUSTER_IP" => ServiceType::ClusterIp,
            Some(t) if t == "HEADLESS" => ServiceType::Headless,
            Some(t) => {
                return Err(Error::InitParamsValidation(format!(
                    "K8S_SERVICE_TYPE must be 'CLUSTER_IP' or 'HEADLESS', got '{t}'"
                )));
            }
        };
        let cloud_topologies = match env("CLOUD_TOPOLOGIES_JSON_BASE64") {
            None => None,
            Some(encoded) => match parse_cloud_topologies(&encoded) {
                Ok(t) => Some(t),
                Err(e) => {
                    warn!("Ignoring CLOUD_TOPOLOGIES_JSON_BASE64: {e}");
                    None
                }
            },
        };
        let peer_namespace = env_or("PEER_NAMESPACE", "");
        let ingress_class = if !peer_namespace.is_empty() {
            Some(crate::INGRESS_CLASS_NAME.to_string())
        } else {
            env("INGRESS_CLASS")
        };
        let namespace = env("CLOUD_NAMESPACE")
            .or_else(|| env("POD_NAMESPACE"))
            .ok_or_else(|| Error::InitParamsValidation("CLOUD_NAMESPACE is required".to_string()))?;
        let hpa = HpaDefaults {
            min_replicas: env_int("GATEWAY_HPA_MIN_REPLICAS", base.hpa.min_replicas),
            max_replicas: env_int("GATEWAY_HPA_MAX_REPLICAS", base.hpa.max_replicas),
            average_utilization: env_int(
                "GATEWAY_HPA_AVERAGE_UTILIZATION_TARGET_PERCENT",
                base.hpa.average_utilization,
            ),
            select_policy: env_or("GATEWAY_HPA_SELECT_POLICY", &base.hpa.select_policy),
            scale_up: behavior_from_env("SCALE_UP", &base.hpa.scale_up),
            scale_down: behavior_from_env("SCALE_DOWN", &base.hpa.scale_down),
        };
        Ok(Self {
            namespace,
            max_concurrent_reconciles: env_int("MAX_CONCURRENT_RECONCILES", base.max_concurrent_reconciles),
            control_plane_url: env_or("CONTROL_PLANE_URL", &base.control_plane_url),
            default_replicas: env_int("FACADE_GATEWAY_REPLICAS", base.default_replicas),
            default_memory_limit: env_or("FACADE_GATEWAY_MEMORY_LIMIT", &base.default_memory_limit),
            default_cpu_limit: env_or("FACADE_GATEWAY_CPU_LIMIT", &base.default_cpu_limit),
            default_cpu_request: env_or("FACADE_GATEWAY_CPU_REQUEST", &base.default_cpu_request),
            default_concurrency: env_int("FACADE_GATEWAY_CONCURRENCY", base.default_concurrency),
            termination_grace_period_s: env_int(
                "FACADE_GATEWAY_TERMINATION_GRACE_PERIOD_S",
                base.termination_grace_period_s,
            ),
            monitoring_enabled: env_bool("MONITORING_ENABLED", base.monitoring_enabled),
            artifact_descriptor_version: env_or("ARTIFACT_DESCRIPTOR_VERSION", ""),
            tracing_enabled: env_or("TRACING_ENABLED", &base.tracing_enabled),
            tracing_host: env_or("TRACING_HOST", ""),
            ip_stack: env_or("IP_STACK", ""),
            ip_bind: env_or("IP_BIND", ""),
            cloud_topologies,
            cloud_topology_key: env_or("CLOUD_TOPOLOGY_KEY", &base.cloud_topology_key),
            xds_cluster_host: env_or("XDS_CLUSTER_HOST", ""),
            xds_cluster_port: env_or("XDS_CLUSTER_PORT", ""),
            read_only_container: env_bool("READONLY_CONTAINER_FILE_SYSTEM_ENABLED", false),
            log_level: env_or("LOG_LEVEL", &base.log_level),
            platform,
            platform_version,
            service_type,
            peer_namespace,
            ingress_class,
            gw_ingress_annotations: env("GW_INGRESS_ANNOTATIONS")
                .map(|raw| parse_ingress_annotations(&raw))
                .unwrap_or_default(),
            x509_enabled: env_bool("X509_AUTHENTICATION_ENABLED", false),
            composite_satellite: env_bool("COMPOSITE_PLATFORM", false),
            baseline_namespace: env_or("BASELINE_PROJ", ""),
            hpa,
        })
    }

    pub fn ingress_flavor(&self) -> IngressFlavor {
        match self.platform {
            Platform::Openshift => IngressFlavor::Route,
            Platform::Kubernetes => match &self.platform_version {
                Some(v) if !v.at_least(1, 22) => IngressFlavor::IngressV1Beta1,
                _ => IngressFlavor::IngressV1,
            },
        }
    }

    /// A composite satellite only is one when it also knows its baseline
    pub fn is_satellite(&self) -> bool {
        self.composite_satellite && !self.baseline_namespace.is_empty()
    }
}
