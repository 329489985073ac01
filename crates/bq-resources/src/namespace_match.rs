//! Namespace-selector matching (spec §6 "evaluated against the workload's
//! namespace labels"), following `stackable-operator::kvp::label::selector`'s
//! error-enum idiom for malformed selectors.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use snafu::{OptionExt, Snafu};

#[derive(Debug, Eq, PartialEq, Snafu)]
pub enum SelectorError {
    #[snafu(display("match expression on key {key:?} with operator {operator:?} must have values"))]
    BinaryOperatorWithoutValues { key: String, operator: String },

    #[snafu(display("match expression on key {key:?} has an unrecognized operator {operator:?}"))]
    InvalidOperator { key: String, operator: String },
}

/// Whether `labels` satisfy `selector`: every `matchLabels` pair is present
/// and equal, and every `matchExpressions` requirement holds.
pub fn selector_matches(
    selector: &LabelSelector,
    labels: &BTreeMap<String, String>,
) -> Result<bool, SelectorError> {
    if let Some(match_labels) = &selector.match_labels {
        for (key, value) in match_labels {
            if labels.get(key) != Some(value) {
                return Ok(false);
            }
        }
    }

    if let Some(requirements) = &selector.match_expressions {
        for requirement in requirements {
            if !requirement_matches(requirement, labels)? {
                return Ok(false);
            }
        }
    }

    Ok(true)
}

fn requirement_matches(
    requirement: &k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelectorRequirement,
    labels: &BTreeMap<String, String>,
) -> Result<bool, SelectorError> {
    let key = &requirement.key;
    match requirement.operator.as_str() {
        "In" => {
            let values = requirement.values.as_ref().filter(|v| !v.is_empty()).context(
                BinaryOperatorWithoutValuesSnafu { key: key.clone(), operator: "In" },
            )?;
            Ok(labels.get(key).is_some_and(|v| values.contains(v)))
        }
        "NotIn" => {
            let values = requirement.values.as_ref().filter(|v| !v.is_empty()).context(
                BinaryOperatorWithoutValuesSnafu { key: key.clone(), operator: "NotIn" },
            )?;
            Ok(!labels.get(key).is_some_and(|v| values.contains(v)))
        }
        "Exists" => Ok(labels.contains_key(key)),
        "DoesNotExist" => Ok(!labels.contains_key(key)),
        other => InvalidOperatorSnafu { key: key.clone(), operator: other }.fail(),
    }
}
