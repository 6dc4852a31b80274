use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use pickup_core::errors::{ErrorInfo, PickupError};
use pickup_core::{Configuration, ParamValue};
use serde::{Deserialize, Serialize};

/// Record of what one axis set on one configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AxisReport {
    /// Parameters written by the axis, keyed by parameter name.
    pub values: BTreeMap<String, ParamValue>,
    /// Run identity bound by the axis, if it binds one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_key: Option<i64>,
}

impl AxisReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn with_identity(mut self, identity_key: i64) -> Self {
        self.identity_key = Some(identity_key);
        self
    }
}

/// One independently varying dimension of an experiment.
///
/// `apply` must be a pure function of its inputs: the same configuration and
/// position always produce the same configuration and report.
pub trait SweepAxis: Send + Sync {
    /// Axis name recorded in every sweep coordinate.
    fn name(&self) -> &str;

    /// Number of candidate values along the axis.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Applies the value at `position` to `config`.
    fn apply(
        &self,
        config: Configuration,
        position: usize,
    ) -> Result<(Configuration, AxisReport), PickupError>;

    /// True for axes that bind a run identity; at most one may be composed.
    fn binds_identity(&self) -> bool {
        false
    }
}

/// Axis over an explicit list of value tuples, each element written to its named key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueListAxis {
    name: String,
    keys: Vec<String>,
    tuples: Vec<Vec<ParamValue>>,
}

impl ValueListAxis {
    /// Single-key axis named after the key it sets.
    pub fn values<V: Into<ParamValue>>(
        key: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let key = key.into();
        Self {
            name: key.clone(),
            keys: vec![key],
            tuples: values.into_iter().map(|v| vec![v.into()]).collect(),
        }
    }

    /// Integer index values `range.start..range.end` written to `key`.
    pub fn range(key: impl Into<String>, range: Range<i64>) -> Self {
        Self::values(key, range)
    }

    /// Cross-product of several named lists presented as a single axis.
    ///
    /// The first list varies slowest. Any empty list yields an empty axis.
    pub fn product(name: impl Into<String>, lists: Vec<(String, Vec<ParamValue>)>) -> Self {
        let keys: Vec<String> = lists.iter().map(|(key, _)| key.clone()).collect();
        let mut tuples: Vec<Vec<ParamValue>> = vec![Vec::new()];
        for (_, values) in &lists {
            let mut next = Vec::with_capacity(tuples.len() * values.len());
            for prefix in &tuples {
                for value in values {
                    let mut tuple = prefix.clone();
                    tuple.push(value.clone());
                    next.push(tuple);
                }
            }
            tuples = next;
        }
        if lists.is_empty() {
            tuples.clear();
        }
        Self {
            name: name.into(),
            keys,
            tuples,
        }
    }

    /// Named lists moved in lockstep: tuple `i` takes element `i` of every list.
    pub fn zip(
        name: impl Into<String>,
        lists: Vec<(String, Vec<ParamValue>)>,
    ) -> Result<Self, PickupError> {
        let name = name.into();
        let len = lists.first().map(|(_, values)| values.len()).unwrap_or(0);
        if let Some((key, values)) = lists.iter().find(|(_, values)| values.len() != len) {
            return Err(ragged(&name, key, len, values.len()));
        }
        let keys = lists.iter().map(|(key, _)| key.clone()).collect();
        let tuples = (0..len)
            .map(|idx| lists.iter().map(|(_, values)| values[idx].clone()).collect())
            .collect();
        Ok(Self { name, keys, tuples })
    }

    /// Explicit tuples; each tuple must have one element per key.
    pub fn from_tuples(
        name: impl Into<String>,
        keys: Vec<String>,
        tuples: Vec<Vec<ParamValue>>,
    ) -> Result<Self, PickupError> {
        let name = name.into();
        if let Some(tuple) = tuples.iter().find(|tuple| tuple.len() != keys.len()) {
            return Err(ragged(&name, "tuple", keys.len(), tuple.len()));
        }
        Ok(Self { name, keys, tuples })
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn tuples(&self) -> &[Vec<ParamValue>] {
        &self.tuples
    }
}

impl SweepAxis for ValueListAxis {
    fn name(&self) -> &str {
        &self.name
    }

    fn len(&self) -> usize {
        self.tuples.len()
    }

    fn apply(
        &self,
        mut config: Configuration,
        position: usize,
    ) -> Result<(Configuration, AxisReport), PickupError> {
        let tuple = self
            .tuples
            .get(position)
            .ok_or_else(|| out_of_range(&self.name, position, self.tuples.len()))?;
        let mut report = AxisReport::new();
        for (key, value) in self.keys.iter().zip(tuple) {
            config.set(key.clone(), value.clone());
            report.values.insert(key.clone(), value.clone());
        }
        Ok((config, report))
    }
}

type Mapper =
    dyn Fn(Configuration, &ParamValue) -> Result<(Configuration, AxisReport), PickupError>
        + Send
        + Sync;

/// Axis whose values are turned into configuration changes by a caller-supplied function.
#[derive(Clone)]
pub struct MappedAxis {
    name: String,
    values: Vec<ParamValue>,
    mapper: Arc<Mapper>,
}

impl MappedAxis {
    pub fn new<F>(name: impl Into<String>, values: Vec<ParamValue>, mapper: F) -> Self
    where
        F: Fn(Configuration, &ParamValue) -> Result<(Configuration, AxisReport), PickupError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            values,
            mapper: Arc::new(mapper),
        }
    }

    pub fn values(&self) -> &[ParamValue] {
        &self.values
    }
}

impl fmt::Debug for MappedAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappedAxis")
            .field("name", &self.name)
            .field("values", &self.values)
            .finish_non_exhaustive()
    }
}

impl SweepAxis for MappedAxis {
    fn name(&self) -> &str {
        &self.name
    }

    fn len(&self) -> usize {
        self.values.len()
    }

    fn apply(
        &self,
        config: Configuration,
        position: usize,
    ) -> Result<(Configuration, AxisReport), PickupError> {
        let value = self
            .values
            .get(position)
            .ok_or_else(|| out_of_range(&self.name, position, self.values.len()))?;
        (self.mapper)(config, value)
    }
}

fn ragged(axis: &str, key: &str, expected: usize, found: usize) -> PickupError {
    PickupError::EmptyAxis(
        ErrorInfo::new("axis.ragged", "axis value lists differ in length")
            .with_context("axis", axis)
            .with_context("key", key)
            .with_context("expected", expected.to_string())
            .with_context("found", found.to_string()),
    )
}

fn out_of_range(axis: &str, position: usize, len: usize) -> PickupError {
    PickupError::Binding(
        ErrorInfo::new("axis.out_of_range", "axis position outside declared values")
            .with_context("axis", axis)
            .with_context("position", position.to_string())
            .with_context("len", len.to_string()),
    )
}
