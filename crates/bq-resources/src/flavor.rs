//! Flavor definitions and the admits-a-pod-set matching rule (spec §4.1).

use std::{collections::BTreeSet, fmt};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use snafu::Snafu;

use crate::{
    quantity::ResourceQuantity,
    workload::{AffinityTerm, PodPlacement},
};

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Deserialize, JsonSchema, Serialize)]
#[serde(transparent)]
pub struct FlavorName(pub String);

impl fmt::Display for FlavorName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FlavorName {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, JsonSchema, Serialize)]
#[serde(rename_all = "PascalCase")]
pub enum TaintEffect {
    NoSchedule,
    PreferNoSchedule,
    NoExecute,
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize, JsonSchema, Serialize)]
pub struct Taint {
    pub key: String,
    pub value: Option<String>,
    pub effect: TaintEffect,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, JsonSchema, Serialize)]
#[serde(rename_all = "PascalCase")]
pub enum TolerationOperator {
    Equal,
    Exists,
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize, JsonSchema, Serialize)]
pub struct Toleration {
    /// `None` tolerates every key (matches a bare wildcard toleration).
    pub key: Option<String>,
    pub value: Option<String>,
    pub operator: TolerationOperator,
    /// `None` tolerates the taint regardless of its effect.
    pub effect: Option<TaintEffect>,
}

impl Toleration {
    fn tolerates(&self, taint: &Taint) -> bool {
        let key_matches = self.key.as_deref().is_none_or(|key| key == taint.key);
        let effect_matches = self.effect.is_none_or(|effect| effect == taint.effect);
        let value_matches = match self.operator {
            TolerationOperator::Exists => true,
            TolerationOperator::Equal => self.value == taint.value,
        };
        key_matches && effect_matches && value_matches
    }
}

/// A variant of a resource: a set of node labels/taints, plus the
/// `Guaranteed`/`Ceiling` quantities a cluster queue may draw from it.
#[derive(Clone, Debug, PartialEq, Deserialize, JsonSchema, Serialize)]
pub struct Flavor {
    pub name: FlavorName,
    #[serde(default)]
    pub node_labels: std::collections::BTreeMap<String, String>,
    #[serde(default)]
    pub taints: Vec<Taint>,
    pub guaranteed: ResourceQuantity,
    pub ceiling: ResourceQuantity,
}

#[derive(Debug, PartialEq, Snafu)]
pub enum FlavorError {
    #[snafu(display(
        "pod-set {pod_set:?} does not admit to flavor {flavor}: {reason}"
    ))]
    FlavorUnmatched {
        pod_set: String,
        flavor: FlavorName,
        reason: MismatchReason,
    },
}

#[derive(Debug, Eq, PartialEq, strum::Display)]
pub enum MismatchReason {
    #[strum(to_string = "node label {key:?} required {required:?} but flavor declares {actual:?}")]
    NodeLabelConflict {
        key: String,
        required: String,
        actual: String,
    },
    #[strum(to_string = "taint {key}={value:?}:{effect:?} is not tolerated")]
    UntoleratedTaint {
        key: String,
        value: Option<String>,
        effect: TaintEffect,
    },
    #[strum(to_string = "pod affinity term requires {key}={value:?} which flavor does not provide")]
    AffinityTermUnsatisfied { key: String, value: String },
}

/// Returns `Ok(())` if `flavor` admits `placement`, per spec §4.1 rules
/// (a)/(b)/(c).
///
/// `declared_keys` is the set of node-label keys declared by *any* flavor of
/// the resource being matched — used to decide whether an affinity term's
/// label key is a same-resource constraint (checked here) or a node-side
/// concern left for later (silently ignored), per the flavor-matching open
/// question: a key declared by *some* flavor of the resource constrains
/// matching against every flavor of it, even ones that don't declare the
/// key themselves.
pub fn flavor_admits(
    flavor: &Flavor,
    pod_set_name: &str,
    placement: &PodPlacement,
    declared_keys: &BTreeSet<String>,
) -> Result<(), FlavorError> {
    check_node_labels(flavor, pod_set_name, placement)?;
    check_taints(flavor, pod_set_name, placement)?;
    check_affinity_terms(flavor, pod_set_name, placement, declared_keys)?;
    Ok(())
}

fn check_node_labels(
    flavor: &Flavor,
    pod_set_name: &str,
    placement: &PodPlacement,
) -> Result<(), FlavorError> {
    for (key, actual) in &flavor.node_labels {
        let required = placement
            .node_selector
            .get(key)
            .or_else(|| required_by_any_term(&placement.affinity_terms, key));

        if let Some(required) = required {
            if required != actual {
                return Err(FlavorError::FlavorUnmatched {
                    pod_set: pod_set_name.to_owned(),
                    flavor: flavor.name.clone(),
                    reason: MismatchReason::NodeLabelConflict {
                        key: key.clone(),
                        required: required.clone(),
                        actual: actual.clone(),
                    },
                });
            }
        }
    }
    Ok(())
}

fn required_by_any_term<'a>(terms: &'a [AffinityTerm], key: &str) -> Option<&'a String> {
    terms.iter().find_map(|term| term.match_labels.get(key))
}

fn check_taints(
    flavor: &Flavor,
    pod_set_name: &str,
    placement: &PodPlacement,
) -> Result<(), FlavorError> {
    for taint in &flavor.taints {
        if !matches!(taint.effect, TaintEffect::NoSchedule | TaintEffect::NoExecute) {
            continue;
        }
        let tolerated = placement.tolerations.iter().any(|t| t.tolerates(taint));
        if !tolerated {
            return Err(FlavorError::FlavorUnmatched {
                pod_set: pod_set_name.to_owned(),
                flavor: flavor.name.clone(),
                reason: MismatchReason::UntoleratedTaint {
                    key: taint.key.clone(),
                    value: taint.value.clone(),
                    effect: taint.effect,
                },
            });
        }
    }
    Ok(())
}

fn check_affinity_terms(
    flavor: &Flavor,
    pod_set_name: &str,
    placement: &PodPlacement,
    declared_keys: &BTreeSet<String>,
) -> Result<(), FlavorError> {
    for term in &placement.affinity_terms {
        for (key, required_value) in &term.match_labels {
            if !declared_keys.contains(key) {
                // No flavor of this resource declares the key: it's a
                // node-side constraint enforced later, not our concern.
                continue;
            }
            match flavor.node_labels.get(key) {
                Some(actual) if actual == required_value => {}
                _ => {
                    return Err(FlavorError::FlavorUnmatched {
                        pod_set: pod_set_name.to_owned(),
                        flavor: flavor.name.clone(),
                        reason: MismatchReason::AffinityTermUnsatisfied {
                            key: key.clone(),
                            value: required_value.clone(),
                        },
                    });
                }
            }
        }
    }
    Ok(())
}
