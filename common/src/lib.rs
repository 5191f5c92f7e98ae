use thiserror::Error;

/// Stable, dashboard-friendly identifier of an error family
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ErrorCode {
    pub code: &'static str,
    pub title: &'static str,
}

pub const UNKNOWN_ERROR: ErrorCode = ErrorCode {
    code: "CORE-MESH-OP-2000",
    title: "Unexpected exception",
};
pub const UNEXPECTED_KUBERNETES_ERROR: ErrorCode = ErrorCode {
    code: "CORE-MESH-OP-2001",
    title: "Unexpected kubernetes error",
};
pub const UPDATE_IMAGE_KUBERNETES_ERROR: ErrorCode = ErrorCode {
    code: "CORE-MESH-OP-2002",
    title: "Unexpected kubernetes error during image update",
};
pub const INIT_PARAMS_VALIDATION_ERROR: ErrorCode = ErrorCode {
    code: "CORE-MESH-OP-2003",
    title: "Init parameters validation error",
};
pub const GATEWAY_IMAGE_ERROR: ErrorCode = ErrorCode {
    code: "CORE-MESH-OP-2004",
    title: "Can not get gateway image",
};
pub const TLS_OPERATION_ERROR: ErrorCode = ErrorCode {
    code: "CORE-MESH-OP-2005",
    title: "TLS operation error",
};
pub const CONTROL_PLANE_ERROR: ErrorCode = ErrorCode {
    code: "CORE-MESH-OP-2006",
    title: "Communication with control-plane failed",
};
pub const INVALID_FACADE_SERVICE_CR_ERROR: ErrorCode = ErrorCode {
    code: "CORE-MESH-OP-2007",
    title: "Invalid FacadeService CR",
};

#[derive(Error, Debug)]
pub enum Error {
    /// Races the next reconcile will settle on its own (conflicts, concurrent creation)
    #[error("Expected error: {0}")]
    Expected(String),

    #[error("{0}: {1}")]
    UnexpectedKubernetes(String, #[source] kube::Error),

    #[error("{0}: {1}")]
    UpdateImageKubernetes(String, #[source] kube::Error),

    #[error("Invalid configuration: {0}")]
    InitParamsValidation(String),

    #[error("{0}")]
    GatewayImage(String),

    #[error("{0}")]
    ControlPlane(String),

    #[error("{0}: {1}")]
    ControlPlaneRequest(String, #[source] reqwest::Error),

    #[error("{0}")]
    InvalidFacadeServiceCr(String),

    #[error("{0}")]
    Unknown(String),

    #[error("SerializationError: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("K8s error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Finalizer error: {0}")]
    // NB: awkward type because finalizer::Error embeds the reconciler error (which is this)
    // so boxing this error to break cycles
    FinalizerError(#[source] Box<kube::runtime::finalizer::Error<Error>>),
}

impl Error {
    pub fn metric_label(&self) -> String {
        match self.code() {
            Some(code) => code.code.to_lowercase(),
            None => "expected".to_string(),
        }
    }

    /// The stable code carried by this error; `None` for expected races
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Error::Expected(_) => None,
            Error::UnexpectedKubernetes(..) => Some(UNEXPECTED_KUBERNETES_ERROR),
            Error::UpdateImageKubernetes(..) => Some(UPDATE_IMAGE_KUBERNETES_ERROR),
            Error::InitParamsValidation(_) => Some(INIT_PARAMS_VALIDATION_ERROR),
            Error::GatewayImage(_) => Some(GATEWAY_IMAGE_ERROR),
            Error::ControlPlane(_) | Error::ControlPlaneRequest(..) => Some(CONTROL_PLANE_ERROR),
            Error::InvalidFacadeServiceCr(_) => Some(INVALID_FACADE_SERVICE_CR_ERROR),
            Error::Unknown(_)
            | Error::SerializationError(_)
            | Error::KubeError(_)
            | Error::FinalizerError(_) => Some(UNKNOWN_ERROR),
        }
    }

    pub fn is_expected(&self) -> bool {
        match self {
            Error::Expected(_) => true,
            Error::FinalizerError(e) => matches!(
                e.as_ref(),
                kube::runtime::finalizer::Error::ApplyFailed(inner)
                    | kube::runtime::finalizer::Error::CleanupFailed(inner) if inner.is_expected()
            ),
            _ => false,
        }
    }

    /// True for errors raised with a domain code; anything else gets wrapped as unknown
    pub fn is_coded(&self) -> bool {
        !matches!(
            self,
            Error::Expected(_)
                | Error::Unknown(_)
                | Error::SerializationError(_)
                | Error::KubeError(_)
                | Error::FinalizerError(_)
        )
    }

    /// Log form: `[CODE][title] detail`
    pub fn to_log_format(&self) -> String {
        match self.code() {
            Some(code) => format!("[{}][{}] {self}", code.code, code.title),
            None => format!("{self}"),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

// ── Well-known names ──────────────────────────────────────────────────────────

pub static EGRESS_GATEWAY: &str = "egress-gateway";
pub static PUBLIC_GATEWAY_SERVICE: &str = "public-gateway-service";
pub static PRIVATE_GATEWAY_SERVICE: &str = "private-gateway-service";
pub static INTERNAL_GATEWAY_SERVICE: &str = "internal-gateway-service";
pub static INGRESS_CLASS_NAME: &str = "bg.mesh.netcracker.com";
pub static CORE_GATEWAY_IMAGE_CONFIGMAP: &str = "core-gateway-image";

pub static FACADE_GATEWAY_LABEL: &str = "facadeGateway";
pub static MESH_ROUTER_LABEL: &str = "mesh-router";
pub static MASTER_CR_LABEL: &str = "masterCR";
pub static HOSTED_BY_LABEL: &str = "mesh.netcracker.com/hosted.by";
pub static LAST_APPLIED_CR_ANNOTATION: &str = "netcracker.cloud/last-applied-cr";
pub static ANNOTATION_PREFIX: &str = "netcracker.cloud";
pub static GATEWAY_SUFFIX: &str = "-gateway";
pub static MONITORING_CONFIG_SUFFIX: &str = ".monitoring-config";
pub static POD_MONITOR_SUFFIX: &str = "-pod-monitor";
pub static UNKNOWN: &str = "unknown";
pub static FIELD_MANAGER: &str = "facadeOperator";
pub static OPERATOR_NAME: &str = "facade-operator";

/// Longest name the API server accepts for labels and most object names
pub const MAX_NAME_LENGTH: usize = 63;

/// Append `suffix` to `name`, cutting `name` so that the result fits in 63 characters
pub fn short_name(name: &str, suffix: &str) -> String {
    if name.len() + suffix.len() > MAX_NAME_LENGTH {
        let keep = MAX_NAME_LENGTH.saturating_sub(suffix.len());
        let mut cut = keep.min(name.len());
        while !name.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}{suffix}", &name[..cut])
    } else {
        format!("{name}{suffix}")
    }
}

pub mod config;
pub mod context;
pub mod controlplane;
pub mod facade;
pub mod facadeservice;
pub mod gateway;
pub mod ingresskinds;
pub mod lastapplied;
pub mod loosevalue;
pub mod meshgateway;
pub mod podmonitor;
mod semverhandler;
pub mod templates;
pub use context::get_client_name;
pub use facadeservice::FacadeService;
pub use gateway::Gateway;
pub use meshgateway::MeshGateway;
pub use semverhandler::Semver;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_name_keeps_short_names() {
        assert_eq!(short_name("gw", "-pod-monitor"), "gw-pod-monitor");
    }

    #[test]
    fn test_short_name_truncates_to_63() {
        let name = "a".repeat(60);
        let res = short_name(&name, "-pod-monitor");
        assert_eq!(res.len(), 63);
        assert!(res.ends_with("-pod-monitor"));
    }

    #[test]
    fn test_exactly_63_is_untouched() {
        let name = "b".repeat(51);
        let res = short_name(&name, "-pod-monitor");
        assert_eq!(res, format!("{name}-pod-monitor"));
        assert_eq!(res.len(), 63);
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::GatewayImage("x".into()).code(), Some(GATEWAY_IMAGE_ERROR));
        assert_eq!(Error::Expected("x".into()).code(), None);
        assert!(Error::Expected("x".into()).is_expected());
        assert!(Error::ControlPlane("x".into()).is_coded());
        assert!(!Error::Unknown("x".into()).is_coded());
        assert_eq!(
            Error::ControlPlane("boom".into()).to_log_format(),
            "[CORE-MESH-OP-2006][Communication with control-plane failed] boom"
        );
    }
}
