use crate::loosevalue::LooseValue;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Spec shared by every kind of mesh gateway custom resource
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GatewaySpecBody {
    /// Resources and tuning of the gateway container
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<FacadeServiceEnv>,
    /// Replica count, as a number or a numeric string
    #[serde(default, skip_serializing_if = "LooseValue::is_absent")]
    pub replicas: LooseValue,
    /// Name of a shared gateway deployment this resource delegates to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
    /// Port exposed by the facade service when no gatewayPorts are given
    #[serde(default)]
    pub port: i32,
    /// Ports exposed by the gateway
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gateway_ports: Vec<GatewayPort>,
    /// Claim exclusive ownership of a shared gateway
    #[serde(default)]
    pub master_configuration: bool,
    /// mesh, ingress or egress
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway_type: Option<String>,
    /// Forwarded to the control-plane on registration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_virtual_hosts: Option<bool>,
    /// Hostnames exposed through an Ingress or a Route (ingress gateways only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ingresses: Vec<IngressSpec>,
    /// Autoscaling settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hpa: Option<HpaSpec>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FacadeServiceEnv {
    #[serde(default, skip_serializing_if = "LooseValue::is_absent")]
    pub facade_gateway_cpu_limit: LooseValue,
    #[serde(default, skip_serializing_if = "LooseValue::is_absent")]
    pub facade_gateway_cpu_request: LooseValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facade_gateway_memory_limit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facade_gateway_memory_request: Option<String>,
    #[serde(default, skip_serializing_if = "LooseValue::is_absent")]
    pub facade_gateway_concurrency: LooseValue,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GatewayPort {
    #[serde(default)]
    pub name: String,
    pub port: i32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub protocol: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IngressSpec {
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub is_grpc: bool,
    /// Gateway port to route to; resolved from the gateway ports when unset
    #[serde(default)]
    pub gateway_port: i32,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HpaSpec {
    #[serde(default, skip_serializing_if = "LooseValue::is_absent")]
    pub min_replicas: LooseValue,
    #[serde(default, skip_serializing_if = "LooseValue::is_absent")]
    pub max_replicas: LooseValue,
    #[serde(default, skip_serializing_if = "LooseValue::is_absent")]
    pub average_cpu_utilization: LooseValue,
    #[serde(default)]
    pub scale_up_behavior: HpaBehavior,
    #[serde(default)]
    pub scale_down_behavior: HpaBehavior,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HpaBehavior {
    #[serde(default, skip_serializing_if = "LooseValue::is_absent")]
    pub stabilization_window_seconds: LooseValue,
    #[serde(default)]
    pub select_policy: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub policies: Vec<HpaPolicy>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HpaPolicy {
    #[serde(default, rename = "type")]
    pub policy_type: String,
    #[serde(default, skip_serializing_if = "LooseValue::is_absent")]
    pub value: LooseValue,
    #[serde(default, skip_serializing_if = "LooseValue::is_absent")]
    pub period_seconds: LooseValue,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum GatewayType {
    #[default]
    Mesh,
    Ingress,
    Egress,
}

impl GatewayType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayType::Mesh => "mesh",
            GatewayType::Ingress => "ingress",
            GatewayType::Egress => "egress",
        }
    }
}

impl std::fmt::Display for GatewayType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl GatewaySpecBody {
    /// `gateway` when it names a real delegation target
    pub fn delegated_gateway(&self) -> Option<&str> {
        self.gateway
            .as_deref()
            .filter(|g| !g.is_empty() && *g != "null")
    }

    pub fn declared_gateway_type(&self) -> GatewayType {
        match self.gateway_type.as_deref().map(str::to_lowercase).as_deref() {
            None | Some("") | Some("null") | Some("mesh") => GatewayType::Mesh,
            Some("ingress") => GatewayType::Ingress,
            Some("egress") => GatewayType::Egress,
            Some(other) => {
                tracing::warn!("Unknown gatewayType '{other}', handling it as mesh");
                GatewayType::Mesh
            }
        }
    }
}
