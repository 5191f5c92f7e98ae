use crate::facade::GatewaySpecBody;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Describe a mesh gateway
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    kind = "Gateway",
    status = "GatewayStatus",
    shortname = "gw",
    group = "core.netcracker.com",
    version = "v1",
    namespaced
)]
#[kube(
    doc = "Custom resource describing a mesh gateway",
    printcolumn = r#"
    {"name":"gateway", "type":"string", "description":"Delegated gateway", "jsonPath":".spec.gateway"},
    {"name":"type",    "type":"string", "description":"Gateway type", "jsonPath":".spec.gatewayType"},
    {"name":"phase",   "type":"string", "description":"Phase", "jsonPath":".status.phase"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct GatewaySpec {
    #[serde(flatten)]
    pub body: GatewaySpecBody,
}

#[derive(Serialize, Deserialize, Eq, PartialEq, Clone, Copy, Debug, JsonSchema, Default)]
pub enum GatewayPhase {
    Updated,
    BackingOff,
    InvalidConfiguration,
    WaitingForDependency,
    Updating,
    #[default]
    Unknown,
}

/// The status object of `Gateway`
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GatewayStatus {
    /// Generation the phase was computed for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<GatewayPhase>,
}
