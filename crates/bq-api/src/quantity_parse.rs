//! Parses Kubernetes [`Quantity`] strings into canonical integers.
//!
//! The core (`bq-resources`) only ever sees a plain, unit-less
//! [`ResourceQuantity`]; this module is the one place that understands the
//! Kubernetes quantity suffix grammar, following the same binary/decimal
//! scaling-factor tables `stackable-operator::quantity::suffix` uses, pared
//! down to the handful of suffixes actually seen on `cpu`/`memory`/custom
//! resources by the time a workload reaches admission.

use bq_resources::ResourceQuantity;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use snafu::{ensure, Snafu};

#[derive(Debug, PartialEq, Snafu)]
pub enum QuantityParseError {
    #[snafu(display("quantity {raw:?} is empty"))]
    Empty { raw: String },

    #[snafu(display("quantity {raw:?} has an unrecognized suffix"))]
    UnknownSuffix { raw: String },

    #[snafu(display("quantity {raw:?} is not a valid number"))]
    InvalidNumber { raw: String },

    #[snafu(display("quantity {raw:?} is negative"))]
    Negative { raw: String },
}

/// Parses `raw` as a quantity of `resource`, returning a canonical integer:
/// millicores for `cpu`, bytes for `memory`, the bare integer otherwise.
pub fn parse_canonical(resource: &str, raw: &Quantity) -> Result<ResourceQuantity, QuantityParseError> {
    let raw = raw.0.as_str();
    ensure!(!raw.is_empty(), EmptySnafu { raw });

    let value = match resource {
        "cpu" => parse_cpu(raw)?,
        "memory" => parse_bytes(raw)?,
        _ => parse_count(raw)?,
    };
    ensure!(value >= 0, NegativeSnafu { raw });
    Ok(ResourceQuantity::new(value))
}

fn parse_cpu(raw: &str) -> Result<i64, QuantityParseError> {
    if let Some(milli) = raw.strip_suffix('m') {
        return milli
            .parse::<i64>()
            .map_err(|_| QuantityParseError::InvalidNumber { raw: raw.to_owned() });
    }
    let cores: f64 = raw
        .parse()
        .map_err(|_| QuantityParseError::InvalidNumber { raw: raw.to_owned() })?;
    Ok((cores * 1000.0).round() as i64)
}

fn parse_bytes(raw: &str) -> Result<i64, QuantityParseError> {
    let binary: [(&str, f64); 6] = [
        ("Ki", 2f64.powi(10)),
        ("Mi", 2f64.powi(20)),
        ("Gi", 2f64.powi(30)),
        ("Ti", 2f64.powi(40)),
        ("Pi", 2f64.powi(50)),
        ("Ei", 2f64.powi(60)),
    ];
    let decimal: [(&str, f64); 6] = [
        ("k", 1e3),
        ("M", 1e6),
        ("G", 1e9),
        ("T", 1e12),
        ("P", 1e15),
        ("E", 1e18),
    ];

    for (suffix, factor) in binary.iter().chain(decimal.iter()) {
        if let Some(number) = raw.strip_suffix(suffix) {
            let number: f64 = number
                .parse()
                .map_err(|_| QuantityParseError::InvalidNumber { raw: raw.to_owned() })?;
            return Ok((number * factor).round() as i64);
        }
    }

    if raw.ends_with(|c: char| c.is_ascii_alphabetic()) {
        return Err(QuantityParseError::UnknownSuffix { raw: raw.to_owned() });
    }

    raw.parse::<f64>()
        .map(|number| number.round() as i64)
        .map_err(|_| QuantityParseError::InvalidNumber { raw: raw.to_owned() })
}

fn parse_count(raw: &str) -> Result<i64, QuantityParseError> {
    raw.parse()
        .map_err(|_| QuantityParseError::InvalidNumber { raw: raw.to_owned() })
}
