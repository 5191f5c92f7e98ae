use super::{NAME_LABEL, PART_OF_LABEL, managed_labels, propagate_labels};
use crate::{
    MeshGateway,
    config::{HpaBehaviorDefaults, HpaDefaults},
    facade::{HpaBehavior, HpaPolicy},
    loosevalue::hpa_int32,
};
use k8s_openapi::{
    api::autoscaling::v2::{
        CrossVersionObjectReference, HPAScalingPolicy, HPAScalingRules, HorizontalPodAutoscaler,
        HorizontalPodAutoscalerBehavior, HorizontalPodAutoscalerSpec, MetricSpec, MetricTarget,
        ResourceMetricSource,
    },
    apimachinery::pkg::apis::meta::v1::ObjectMeta,
};
use tracing::*;

static PODS_POLICY: &str = "Pods";
static PERCENT_POLICY: &str = "Percent";

/// Builds the autoscaler of a gateway deployment from the CR settings and the operator defaults
#[derive(Clone, Debug)]
pub struct HpaTemplateBuilder {
    defaults: HpaDefaults,
}

impl HpaTemplateBuilder {
    pub fn new(defaults: HpaDefaults) -> Self {
        Self { defaults }
    }

    fn select_policy(&self, policy: &str) -> String {
        match policy {
            "Max" | "Min" | "Disabled" => policy.to_string(),
            _ => {
                warn!(
                    "Can not parse scale policy with value '{policy}'. Use default value '{}'",
                    self.defaults.select_policy
                );
                self.defaults.select_policy.clone()
            }
        }
    }

    fn policies(&self, policies: &[HpaPolicy], defaults: &HpaBehaviorDefaults, prefix: &str) -> Vec<HPAScalingPolicy> {
        if policies.is_empty() {
            return vec![HPAScalingPolicy {
                type_: PODS_POLICY.to_string(),
                value: defaults.pods_value,
                period_seconds: defaults.pods_period_seconds,
            }];
        }
        policies
            .iter()
            .map(|policy| {
                let pods = match policy.policy_type.as_str() {
                    "Pods" => true,
                    "Percent" => false,
                    other => {
                        warn!("Can not parse policy type with value '{other}'. Use default value '{PODS_POLICY}'");
                        true
                    }
                };
                let (value, period) = if pods {
                    (defaults.pods_value, defaults.pods_period_seconds)
                } else {
                    (defaults.percent_value, defaults.percent_period_seconds)
                };
                HPAScalingPolicy {
                    type_: if pods { PODS_POLICY } else { PERCENT_POLICY }.to_string(),
                    value: hpa_int32(&policy.value, value, &format!("{prefix}.policies.value")),
                    period_seconds: hpa_int32(&policy.period_seconds, period, &format!("{prefix}.policies.periodSeconds")),
                }
            })
            .collect()
    }

    fn rules(&self, behavior: &HpaBehavior, defaults: &HpaBehaviorDefaults, prefix: &str) -> HPAScalingRules {
        HPAScalingRules {
            stabilization_window_seconds: Some(hpa_int32(
                &behavior.stabilization_window_seconds,
                defaults.stabilization_window_seconds,
                &format!("{prefix}.stabilizationWindowSeconds"),
            )),
            select_policy: Some(self.select_policy(&behavior.select_policy)),
            policies: Some(self.policies(&behavior.policies, defaults, prefix)),
        }
    }

    pub fn build(&self, cr: &MeshGateway, deployment: &str, namespace: &str) -> HorizontalPodAutoscaler {
        let hpa = cr.spec().hpa.clone().unwrap_or_default();
        let mut labels = managed_labels();
        labels.insert(NAME_LABEL.to_string(), deployment.to_string());
        propagate_labels(&mut labels, cr.labels(), &[PART_OF_LABEL]);
        HorizontalPodAutoscaler {
            metadata: ObjectMeta {
                name: Some(deployment.to_string()),
                namespace: Some(namespace.to_string()),
                labels: Some(labels),
                owner_references: Some(vec![cr.owner_reference()]),
                ..Default::default()
            },
            spec: Some(HorizontalPodAutoscalerSpec {
                scale_target_ref: CrossVersionObjectReference {
                    api_version: Some("apps/v1".to_string()),
                    kind: "Deployment".to_string(),
                    name: deployment.to_string(),
                },
                min_replicas: Some(hpa_int32(&hpa.min_replicas, self.defaults.min_replicas, "hpa.minReplicas")),
                max_replicas: hpa_int32(&hpa.max_replicas, self.defaults.max_replicas, "hpa.maxReplicas"),
                metrics: Some(vec![MetricSpec {
                    type_: "Resource".to_string(),
                    resource: Some(ResourceMetricSource {
                        name: "cpu".to_string(),
                        target: MetricTarget {
                            type_: "Utilization".to_string(),
                            average_utilization: Some(hpa_int32(
                                &hpa.average_cpu_utilization,
                                self.defaults.average_utilization,
                                "hpa.averageCpuUtilization",
                            )),
                            ..Default::default()
                        },
                    }),
                    ..Default::default()
                }]),
                behavior: Some(HorizontalPodAutoscalerBehavior {
                    scale_up: Some(self.rules(&hpa.scale_up_behavior, &self.defaults.scale_up, "hpa.scaleUpBehavior")),
                    scale_down: Some(self.rules(
                        &hpa.scale_down_behavior,
                        &self.defaults.scale_down,
                        "hpa.scaleDownBehavior",
                    )),
                }),
            }),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        facade::{GatewaySpecBody, HpaSpec},
        loosevalue::LooseValue,
        meshgateway::fixtures::*,
    };

    fn spec_of(hpa: &HorizontalPodAutoscaler) -> &HorizontalPodAutoscalerSpec {
        hpa.spec.as_ref().unwrap()
    }

    #[test]
    fn test_defaults() {
        let builder = HpaTemplateBuilder::new(HpaDefaults::default());
        let cr = gateway("svcA", GatewaySpecBody::default());
        let hpa = builder.build(&cr, "svcA-gateway", "ns");
        let spec = spec_of(&hpa);
        assert_eq!(spec.scale_target_ref.name, "svcA-gateway");
        assert_eq!(spec.min_replicas, Some(1));
        assert_eq!(spec.max_replicas, 9999);
        let behavior = spec.behavior.as_ref().unwrap();
        let up = behavior.scale_up.as_ref().unwrap();
        assert_eq!(up.stabilization_window_seconds, Some(60));
        assert_eq!(up.select_policy.as_deref(), Some("Disabled"));
        let policies = up.policies.as_ref().unwrap();
        assert_eq!(policies.len(), 1);
        assert_eq!(policies[0].type_, "Pods");
        assert_eq!(behavior.scale_down.as_ref().unwrap().stabilization_window_seconds, Some(300));
    }

    #[test]
    fn test_cr_values() {
        let builder = HpaTemplateBuilder::new(HpaDefaults::default());
        let cr = gateway(
            "svcA",
            GatewaySpecBody {
                hpa: Some(HpaSpec {
                    min_replicas: LooseValue::String("2".into()),
                    max_replicas: LooseValue::Int(5),
                    average_cpu_utilization: LooseValue::String("garbage".into()),
                    scale_up_behavior: HpaBehavior {
                        select_policy: "Max".into(),
                        policies: vec![
                            HpaPolicy {
                                policy_type: "Percent".into(),
                                value: LooseValue::Int(50),
                                period_seconds: LooseValue::Absent,
                            },
                            HpaPolicy {
                                policy_type: "Bogus".into(),
                                value: LooseValue::Absent,
                                period_seconds: LooseValue::Int(15),
                            },
                        ],
                        ..Default::default()
                    },
                    ..Default::default()
                }),
                ..Default::default()
            },
        );
        let hpa = builder.build(&cr, "svcA-gateway", "ns");
        let spec = spec_of(&hpa);
        assert_eq!(spec.min_replicas, Some(2));
        assert_eq!(spec.max_replicas, 5);
        let target = &spec.metrics.as_ref().unwrap()[0].resource.as_ref().unwrap().target;
        assert_eq!(target.average_utilization, Some(75));
        let up = spec.behavior.as_ref().unwrap().scale_up.as_ref().unwrap();
        assert_eq!(up.select_policy.as_deref(), Some("Max"));
        let policies = up.policies.as_ref().unwrap();
        assert_eq!(policies[0].type_, "Percent");
        assert_eq!(policies[0].value, 50);
        assert_eq!(policies[0].period_seconds, -1);
        assert_eq!(policies[1].type_, "Pods");
        assert_eq!(policies[1].value, 1);
        assert_eq!(policies[1].period_seconds, 15);
    }
}
