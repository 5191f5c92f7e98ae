use crate::facade::GatewaySpecBody;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Legacy description of a facade gateway
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    kind = "FacadeService",
    shortname = "fs",
    group = "netcracker.com",
    version = "v1alpha",
    namespaced
)]
#[kube(
    doc = "Legacy custom resource describing a facade gateway",
    printcolumn = r#"
    {"name":"gateway", "type":"string", "description":"Delegated gateway", "jsonPath":".spec.gateway"},
    {"name":"type",    "type":"string", "description":"Gateway type", "jsonPath":".spec.gatewayType"},
    {"name":"master",  "type":"boolean", "description":"Master configuration", "jsonPath":".spec.masterConfiguration"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct FacadeServiceSpec {
    #[serde(flatten)]
    pub body: GatewaySpecBody,
}
