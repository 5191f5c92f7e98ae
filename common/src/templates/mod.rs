use crate::{OPERATOR_NAME, UNKNOWN};
use regex::Regex;
use std::collections::BTreeMap;

pub mod configmap;
pub mod deployment;
pub mod hpa;
pub mod ingress;
pub mod podmonitor;
pub mod service;

pub static NAME_LABEL: &str = "app.kubernetes.io/name";
pub static PART_OF_LABEL: &str = "app.kubernetes.io/part-of";
pub static VERSION_LABEL: &str = "app.kubernetes.io/version";
pub static MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub static MANAGED_BY_OPERATOR_LABEL: &str = "app.kubernetes.io/managed-by-operator";

lazy_static::lazy_static! {
    static ref LABEL_VALUE: Regex = Regex::new("(([A-Za-z0-9][-A-Za-z0-9_.]*)?[A-Za-z0-9])?").unwrap();
    static ref QUANTITY: Regex = Regex::new(
        r"^[+-]?(\d+(\.\d*)?|\.\d+)(([eE][+-]?\d+)|Ki|Mi|Gi|Ti|Pi|Ei|n|u|m|k|M|G|T|P|E)?$"
    ).unwrap();
}

/// Labels identifying objects owned by this operator
pub fn managed_labels() -> BTreeMap<String, String> {
    BTreeMap::from([
        (MANAGED_BY_LABEL.to_string(), "operator".to_string()),
        (MANAGED_BY_OPERATOR_LABEL.to_string(), OPERATOR_NAME.to_string()),
    ])
}

/// Label selector matching every object carrying [`managed_labels`]
pub fn managed_selector() -> String {
    format!("{MANAGED_BY_OPERATOR_LABEL}={OPERATOR_NAME}")
}

/// Copy `keys` from the custom resource labels, `unknown` when it has none
pub fn propagate_labels(labels: &mut BTreeMap<String, String>, cr_labels: &BTreeMap<String, String>, keys: &[&str]) {
    for key in keys {
        let value = cr_labels
            .get(*key)
            .filter(|v| !v.is_empty())
            .cloned()
            .unwrap_or_else(|| UNKNOWN.to_string());
        labels.insert(key.to_string(), value);
    }
}

/// Leading part of `value` that is a valid label value
pub fn label_value(value: &str) -> String {
    LABEL_VALUE
        .find(value)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

/// True when `value` parses as a Kubernetes resource quantity
pub fn is_quantity(value: &str) -> bool {
    QUANTITY.is_match(value.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_value() {
        assert_eq!(label_value("gw-ns"), "gw-ns");
        assert_eq!(label_value("gw.-"), "gw");
        assert_eq!(label_value("-gw"), "");
    }

    #[test]
    fn test_quantities() {
        for q in ["100m", "1", "0.5", "128Mi", "1Gi", "2e3"] {
            assert!(is_quantity(q), "{q}");
        }
        for q in ["", "abc", "10MB", "1..0"] {
            assert!(!is_quantity(q), "{q}");
        }
    }

    #[test]
    fn test_propagate_labels() {
        let cr = BTreeMap::from([(PART_OF_LABEL.to_string(), "app".to_string())]);
        let mut labels = managed_labels();
        propagate_labels(&mut labels, &cr, &[PART_OF_LABEL, VERSION_LABEL]);
        assert_eq!(labels[PART_OF_LABEL], "app");
        assert_eq!(labels[VERSION_LABEL], UNKNOWN);
        assert_eq!(labels[MANAGED_BY_OPERATOR_LABEL], "facade-operator");
    }
}
