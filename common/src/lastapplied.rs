use crate::{Error, LAST_APPLIED_CR_ANNOTATION, Result};
use k8s_openapi::api::apps::v1::Deployment;
use serde::{Deserialize, Serialize};

/// Which custom resource last wrote a deployment
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LastAppliedCr {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub deleted: bool,
}

impl LastAppliedCr {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Read the annotation of a deployment; `Ok(None)` when it is missing or empty
    pub fn from_deployment(deployment: &Deployment) -> Result<Option<Self>> {
        let raw = deployment
            .metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(LAST_APPLIED_CR_ANNOTATION))
            .map(String::as_str)
            .unwrap_or_default();
        if raw.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(raw).map(Some).map_err(|e| {
            Error::Unknown(format!(
                "Can not unmarshal '{LAST_APPLIED_CR_ANNOTATION}' annotation with value '{raw}': {e}"
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn deployment_with(annotation: Option<&str>) -> Deployment {
        let mut d = Deployment::default();
        if let Some(a) = annotation {
            d.metadata.annotations = Some(BTreeMap::from([(LAST_APPLIED_CR_ANNOTATION.to_string(), a.to_string())]));
        }
        d
    }

    #[test]
    fn test_serialized_shape() {
        let cr = LastAppliedCr {
            api_version: "core.netcracker.com/v1".into(),
            kind: "Gateway".into(),
            name: "gw".into(),
            deleted: false,
        };
        assert_eq!(
            cr.to_json().unwrap(),
            r#"{"apiVersion":"core.netcracker.com/v1","kind":"Gateway","name":"gw","deleted":false}"#
        );
    }

    #[test]
    fn test_from_deployment() {
        assert_eq!(LastAppliedCr::from_deployment(&deployment_with(None)).unwrap(), None);
        assert_eq!(LastAppliedCr::from_deployment(&deployment_with(Some(""))).unwrap(), None);
        let found = LastAppliedCr::from_deployment(&deployment_with(Some(
            r#"{"apiVersion":"netcracker.com/v1alpha","kind":"FacadeService","name":"a"}"#,
        )))
        .unwrap()
        .unwrap();
        assert_eq!(found.name, "a");
        assert!(!found.deleted);
        assert!(LastAppliedCr::from_deployment(&deployment_with(Some("{not json"))).is_err());
    }
}
