//! Integer quantities in canonical units (millicores, bytes, bare counts).
//!
//! Kubernetes quantities themselves support arbitrary suffixes and
//! scientific notation; by the time a request reaches the admission
//! pipeline it has already been normalized to one integer in the resource's
//! canonical unit, so unlike `k8s-openapi`'s `Quantity` this type carries no
//! suffix at all — just a saturating `i64`.

use std::{
    fmt,
    ops::{Add, AddAssign, Sub, SubAssign},
};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The name of a requestable resource, e.g. `cpu`, `memory`, or a custom
/// extended resource such as `nvidia.com/gpu`.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Deserialize, JsonSchema, Serialize)]
#[serde(transparent)]
pub struct ResourceName(pub String);

impl fmt::Display for ResourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceName {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// A non-negative integer quantity of some [`ResourceName`], in that
/// resource's canonical unit.
///
/// Addition and subtraction saturate instead of panicking or overflowing: a
/// scheduling pass must never abort mid-computation over an adversarial or
/// simply very large request.
#[derive(Clone, Copy, Debug, Default, Eq, Ord, PartialEq, PartialOrd, Deserialize, JsonSchema, Serialize)]
#[serde(transparent)]
pub struct ResourceQuantity(i64);

impl ResourceQuantity {
    pub const ZERO: ResourceQuantity = ResourceQuantity(0);

    /// Constructs a quantity, clamping negative input to zero.
    ///
    /// Quota quantities (`Guaranteed`, `Ceiling`, usage) are non-negative by
    /// construction (spec invariant); a negative input can only come from a
    /// malformed CRD, so we clamp rather than propagate an error into every
    /// arithmetic call site.
    pub fn new(value: i64) -> Self {
        Self(value.max(0))
    }

    pub fn as_i64(self) -> i64 {
        self.0
    }

    pub fn saturating_mul(self, factor: u32) -> Self {
        Self(self.0.saturating_mul(i64::from(factor)))
    }

    pub fn saturating_sub(self, rhs: Self) -> Self {
        Self((self.0 - rhs.0).max(0))
    }
}

impl Add for ResourceQuantity {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for ResourceQuantity {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for ResourceQuantity {
    type Output = Self;

    /// Saturates at zero rather than going negative — usage never drops
    /// below zero even if callers race a decrement past a stale read.
    fn sub(self, rhs: Self) -> Self {
        self.saturating_sub(rhs)
    }
}

impl SubAssign for ResourceQuantity {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl fmt::Display for ResourceQuantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
