use crate::{
    EGRESS_GATEWAY, Error, FacadeService, GATEWAY_SUFFIX, Gateway, INTERNAL_GATEWAY_SERVICE,
    PRIVATE_GATEWAY_SERVICE, PUBLIC_GATEWAY_SERVICE, Result,
    facade::{GatewaySpecBody, GatewayType},
    gateway::{GatewayPhase, GatewayStatus},
    lastapplied::LastAppliedCr,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;

/// Either kind of custom resource describing a gateway
#[derive(Clone, Debug)]
pub enum MeshGateway {
    FacadeService(FacadeService),
    Gateway(Gateway),
}

impl From<FacadeService> for MeshGateway {
    fn from(fs: FacadeService) -> Self {
        MeshGateway::FacadeService(fs)
    }
}

impl From<Gateway> for MeshGateway {
    fn from(gw: Gateway) -> Self {
        MeshGateway::Gateway(gw)
    }
}

/// `(apiVersion, kind)` of the supported custom resources
pub fn facade_service_type() -> (String, String) {
    (FacadeService::api_version(&()).to_string(), FacadeService::kind(&()).to_string())
}
pub fn gateway_type() -> (String, String) {
    (Gateway::api_version(&()).to_string(), Gateway::kind(&()).to_string())
}

/// Which kind a LastAppliedCR record designates
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MeshGatewayKind {
    FacadeService,
    Gateway,
}

impl MeshGatewayKind {
    pub fn resolve(last: &LastAppliedCr) -> Result<Self> {
        let record = (last.api_version.clone(), last.kind.clone());
        if record == facade_service_type() {
            Ok(MeshGatewayKind::FacadeService)
        } else if record == gateway_type() {
            Ok(MeshGatewayKind::Gateway)
        } else {
            Err(Error::Unknown(format!(
                "Can not resolve type for apiVersion '{}' and kind '{}'",
                last.api_version, last.kind
            )))
        }
    }
}

impl MeshGateway {
    pub fn name(&self) -> String {
        match self {
            MeshGateway::FacadeService(o) => o.name_any(),
            MeshGateway::Gateway(o) => o.name_any(),
        }
    }

    pub fn namespace(&self) -> String {
        match self {
            MeshGateway::FacadeService(o) => o.namespace().unwrap_or_default(),
            MeshGateway::Gateway(o) => o.namespace().unwrap_or_default(),
        }
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        match self {
            MeshGateway::FacadeService(o) => o.labels(),
            MeshGateway::Gateway(o) => o.labels(),
        }
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels().get(key).map(String::as_str)
    }

    pub fn uid(&self) -> String {
        match self {
            MeshGateway::FacadeService(o) => o.uid().unwrap_or_default(),
            MeshGateway::Gateway(o) => o.uid().unwrap_or_default(),
        }
    }

    pub fn generation(&self) -> Option<i64> {
        match self {
            MeshGateway::FacadeService(o) => o.meta().generation,
            MeshGateway::Gateway(o) => o.meta().generation,
        }
    }

    pub fn is_deleting(&self) -> bool {
        match self {
            MeshGateway::FacadeService(o) => o.meta().deletion_timestamp.is_some(),
            MeshGateway::Gateway(o) => o.meta().deletion_timestamp.is_some(),
        }
    }

    pub fn kind(&self) -> MeshGatewayKind {
        match self {
            MeshGateway::FacadeService(_) => MeshGatewayKind::FacadeService,
            MeshGateway::Gateway(_) => MeshGatewayKind::Gateway,
        }
    }

    pub fn api_version_and_kind(&self) -> (String, String) {
        match self {
            MeshGateway::FacadeService(_) => facade_service_type(),
            MeshGateway::Gateway(_) => gateway_type(),
        }
    }

    /// Kind ordinal used to break ties between competing writers
    pub fn priority(&self) -> i32 {
        match self {
            MeshGateway::FacadeService(_) => 0,
            MeshGateway::Gateway(_) => 1,
        }
    }

    pub fn spec(&self) -> &GatewaySpecBody {
        match self {
            MeshGateway::FacadeService(o) => &o.spec.body,
            MeshGateway::Gateway(o) => &o.spec.body,
        }
    }

    pub fn status(&self) -> Option<&GatewayStatus> {
        match self {
            MeshGateway::FacadeService(_) => None,
            MeshGateway::Gateway(o) => o.status.as_ref(),
        }
    }

    pub fn phase(&self) -> Option<GatewayPhase> {
        self.status().and_then(|s| s.phase)
    }

    pub fn gateway_type(&self) -> GatewayType {
        if self.name() == EGRESS_GATEWAY {
            GatewayType::Egress
        } else {
            self.spec().declared_gateway_type()
        }
    }

    pub fn is_master(&self) -> bool {
        self.spec().master_configuration
    }

    /// Same kind and apiVersion as the recorded applier
    pub fn is_same_type(&self, last: &LastAppliedCr) -> bool {
        let (api_version, kind) = self.api_version_and_kind();
        api_version == last.api_version && kind == last.kind
    }

    pub fn last_applied(&self) -> LastAppliedCr {
        let (api_version, kind) = self.api_version_and_kind();
        LastAppliedCr {
            api_version,
            kind,
            name: self.name(),
            deleted: false,
        }
    }

    /// Reference from a child object back to this resource
    pub fn owner_reference(&self) -> OwnerReference {
        let (api_version, kind) = self.api_version_and_kind();
        OwnerReference {
            api_version,
            kind,
            name: self.name(),
            uid: self.uid(),
            controller: Some(false),
            block_owner_deletion: None,
        }
    }

    /// Deployment this resource deploys to: the delegated gateway, or `<name>-gateway`
    pub fn deployment_name(&self) -> String {
        match self.spec().delegated_gateway() {
            Some(gw) => gw.to_string(),
            None => format!("{}{GATEWAY_SUFFIX}", self.name()),
        }
    }

    /// Name the gateway is known by in the control-plane and in ingress objects
    pub fn gateway_service_name(&self) -> String {
        let name = self.name();
        if name == PUBLIC_GATEWAY_SERVICE || name == PRIVATE_GATEWAY_SERVICE || name == INTERNAL_GATEWAY_SERVICE {
            return name;
        }
        match self.spec().delegated_gateway() {
            Some(gw) if self.gateway_type() == GatewayType::Mesh => gw.to_string(),
            _ => name,
        }
    }
}

#[cfg(test)]
pub mod fixtures {
    use super::*;
    use crate::{facadeservice::FacadeServiceSpec, gateway::GatewaySpec};

    pub fn facade_service(name: &str, body: GatewaySpecBody) -> MeshGateway {
        let mut fs = FacadeService::new(name, FacadeServiceSpec { body });
        fs.metadata.namespace = Some("ns".to_string());
        fs.metadata.uid = Some(format!("uid-{name}"));
        MeshGateway::FacadeService(fs)
    }

    pub fn gateway(name: &str, body: GatewaySpecBody) -> MeshGateway {
        let mut gw = Gateway::new(name, GatewaySpec { body });
        gw.metadata.namespace = Some("ns".to_string());
        gw.metadata.uid = Some(format!("uid-{name}"));
        MeshGateway::Gateway(gw)
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    fn body(gateway: Option<&str>, gateway_type: Option<&str>) -> GatewaySpecBody {
        GatewaySpecBody {
            gateway: gateway.map(String::from),
            gateway_type: gateway_type.map(String::from),
            ..Default::default()
        }
    }

    #[test]
    fn test_priorities_and_types() {
        let fs = facade_service("a", body(None, None));
        let gw = gateway("b", body(None, None));
        assert_eq!(fs.priority(), 0);
        assert_eq!(gw.priority(), 1);
        assert_eq!(fs.api_version_and_kind(), ("netcracker.com/v1alpha".to_string(), "FacadeService".to_string()));
        assert_eq!(gw.api_version_and_kind(), ("core.netcracker.com/v1".to_string(), "Gateway".to_string()));
    }

    #[test]
    fn test_egress_gateway_by_name() {
        let cr = facade_service(EGRESS_GATEWAY, body(None, Some("mesh")));
        assert_eq!(cr.gateway_type(), GatewayType::Egress);
    }

    #[test]
    fn test_gateway_service_name() {
        assert_eq!(facade_service("svcA", body(Some("composite1"), None)).gateway_service_name(), "composite1");
        assert_eq!(facade_service("svcA", body(Some("composite1"), Some("ingress"))).gateway_service_name(), "svcA");
        assert_eq!(facade_service("svcA", body(None, None)).gateway_service_name(), "svcA");
        assert_eq!(
            facade_service(PUBLIC_GATEWAY_SERVICE, body(Some("composite1"), None)).gateway_service_name(),
            PUBLIC_GATEWAY_SERVICE
        );
    }

    #[test]
    fn test_deployment_name() {
        assert_eq!(gateway("svcA", body(None, None)).deployment_name(), "svcA-gateway");
        assert_eq!(gateway("svcA", body(Some("null"), None)).deployment_name(), "svcA-gateway");
        assert_eq!(gateway("svcA", body(Some("composite1"), None)).deployment_name(), "composite1");
    }

    #[test]
    fn test_resolve_kind() {
        let fs = facade_service("a", body(None, None)).last_applied();
        assert_eq!(MeshGatewayKind::resolve(&fs).unwrap(), MeshGatewayKind::FacadeService);
        let bad = LastAppliedCr {
            api_version: "v1".into(),
            kind: "Pod".into(),
            name: "x".into(),
            deleted: false,
        };
        assert!(MeshGatewayKind::resolve(&bad).is_err());
    }

    #[test]
    fn test_owner_reference_is_not_controller() {
        let owner = gateway("gw", body(None, None)).owner_reference();
        assert_eq!(owner.controller, Some(false));
        assert_eq!(owner.uid, "uid-gw");
        assert_eq!(owner.kind, "Gateway");
    }
}
