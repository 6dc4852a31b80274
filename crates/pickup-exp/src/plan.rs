use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use pickup_core::errors::{ErrorInfo, PickupError};
use pickup_core::{Configuration, ParamValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::assemble::{
    assemble, ConfigValidator, ExperimentDefinition, RequiredKeys, TaskTemplate,
};
use crate::axis::{SweepAxis, ValueListAxis};
use crate::binder::{BindingKeys, BurninBinder, DEFAULT_OUTPUT_SUBDIR};
use crate::burnin::BurninIndex;
use crate::compose::{Scheduler, SweepComposer};
use crate::serde::{from_json_slice, from_yaml_slice};
use crate::store::MetadataStore;

/// Where the pickup runs resume from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BurninPlan {
    pub experiment_id: String,
    /// Simulated time a snapshot must have reached to qualify.
    pub min_elapsed_time: f64,
    #[serde(default = "BurninPlan::default_name")]
    pub name: String,
    /// Entry fields copied onto each bound configuration when present.
    #[serde(default)]
    pub extra_params: Vec<String>,
    #[serde(default)]
    pub keys: BindingKeys,
    #[serde(default = "BurninPlan::default_output_subdir")]
    pub output_subdir: String,
}

impl BurninPlan {
    fn default_name() -> String {
        "burnin".to_string()
    }

    fn default_output_subdir() -> String {
        DEFAULT_OUTPUT_SUBDIR.to_string()
    }

    pub fn new(experiment_id: impl Into<String>, min_elapsed_time: f64) -> Self {
        Self {
            experiment_id: experiment_id.into(),
            min_elapsed_time,
            name: Self::default_name(),
            extra_params: Vec::new(),
            keys: BindingKeys::default(),
            output_subdir: Self::default_output_subdir(),
        }
    }
}

/// One named value list inside a `product` or `zip` axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedValues {
    pub key: String,
    pub values: Vec<ParamValue>,
}

/// Declarative description of a sweep axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AxisPlan {
    Values {
        key: String,
        values: Vec<ParamValue>,
    },
    Product {
        name: String,
        parameters: Vec<NamedValues>,
    },
    Zip {
        name: String,
        parameters: Vec<NamedValues>,
    },
    Range {
        key: String,
        start: i64,
        end: i64,
    },
    /// Position of the burn-in axis in composition order.
    Burnin,
}

impl AxisPlan {
    fn to_axis(&self) -> Result<Option<ValueListAxis>, PickupError> {
        let axis = match self {
            AxisPlan::Values { key, values } => ValueListAxis::values(key.clone(), values.clone()),
            AxisPlan::Product { name, parameters } => {
                ValueListAxis::product(name.clone(), named_lists(parameters))
            }
            AxisPlan::Zip { name, parameters } => {
                ValueListAxis::zip(name.clone(), named_lists(parameters))?
            }
            AxisPlan::Range { key, start, end } => ValueListAxis::range(key.clone(), *start..*end),
            AxisPlan::Burnin => return Ok(None),
        };
        Ok(Some(axis))
    }
}

fn named_lists(parameters: &[NamedValues]) -> Vec<(String, Vec<ParamValue>)> {
    parameters
        .iter()
        .map(|named| (named.key.clone(), named.values.clone()))
        .collect()
}

/// YAML-configurable description of a pickup experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentPlan {
    pub name: String,
    /// JSON configuration file every simulation starts from.
    #[serde(default)]
    pub base_config: Option<PathBuf>,
    /// Inline overrides applied on top of `base_config`.
    #[serde(default)]
    pub fixed: BTreeMap<String, ParamValue>,
    #[serde(default)]
    pub burnin: Option<BurninPlan>,
    #[serde(default)]
    pub axes: Vec<AxisPlan>,
    #[serde(default)]
    pub required_keys: Vec<String>,
    #[serde(default)]
    pub task: TaskTemplate,
    #[serde(default)]
    pub scheduler: Scheduler,
}

impl ExperimentPlan {
    /// Reads a YAML plan; a relative `base_config` is resolved against the plan's directory.
    pub fn load(path: &Path) -> Result<Self, PickupError> {
        let bytes = fs::read(path).map_err(|err| io_error("plan.read", path, err))?;
        let mut plan = Self::from_yaml_slice(&bytes)?;
        if let (Some(base), Some(dir)) = (plan.base_config.as_ref(), path.parent()) {
            if base.is_relative() {
                plan.base_config = Some(dir.join(base));
            }
        }
        Ok(plan)
    }

    pub fn from_yaml_slice(data: &[u8]) -> Result<Self, PickupError> {
        from_yaml_slice(data)
    }

    /// Base configuration file (if any) overlaid with `fixed`.
    pub fn base_configuration(&self) -> Result<Configuration, PickupError> {
        let mut config = match &self.base_config {
            Some(path) => load_config_file(path)?,
            None => Configuration::new(),
        };
        for (key, value) in &self.fixed {
            config.set(key.clone(), value.clone());
        }
        Ok(config)
    }

    /// Builds the value axes and rejects degenerate ones before any store access.
    fn value_axes(&self) -> Result<Vec<Option<ValueListAxis>>, PickupError> {
        let mut axes = Vec::with_capacity(self.axes.len());
        for plan in &self.axes {
            let axis = plan.to_axis()?;
            if let Some(axis) = &axis {
                if axis.is_empty() {
                    return Err(PickupError::EmptyAxis(
                        ErrorInfo::new("axis.empty", "sweep axis has no values")
                            .with_context("axis", axis.name())
                            .with_context("experiment", self.name.as_str()),
                    ));
                }
            }
            axes.push(axis);
        }
        let markers = axes.iter().filter(|axis| axis.is_none()).count();
        if markers > 0 && self.burnin.is_none() {
            return Err(PickupError::Serde(ErrorInfo::new(
                "plan.burnin_missing",
                "axes reference a burn-in axis but the plan has no burnin section",
            )));
        }
        if markers == 0 && self.burnin.is_some() {
            axes.push(None);
        }
        Ok(axes)
    }
}

fn load_config_file(path: &Path) -> Result<Configuration, PickupError> {
    let bytes = fs::read(path).map_err(|err| io_error("plan.base_config", path, err))?;
    let value: Value = from_json_slice(&bytes)?;
    // Simulation config files nest their parameters under a single `parameters` object.
    let params = match value {
        Value::Object(mut map) if map.len() == 1 && map.contains_key("parameters") => {
            map.remove("parameters").unwrap_or_default()
        }
        other => other,
    };
    match params {
        Value::Object(map) => Ok(map.into_iter().collect()),
        _ => Err(PickupError::Serde(
            ErrorInfo::new("plan.base_config", "base configuration must be a JSON object")
                .with_context("path", path.display().to_string()),
        )),
    }
}

fn io_error(code: &str, path: &Path, err: std::io::Error) -> PickupError {
    PickupError::Serde(
        ErrorInfo::new(code, "failed to read file")
            .with_context("path", path.display().to_string())
            .with_hint(err.to_string()),
    )
}

/// Builds the complete experiment described by `plan`.
///
/// The burn-in index is read once before composition; any failure aborts the
/// build before anything is assembled.
pub fn build_experiment<S: MetadataStore + ?Sized>(
    plan: &ExperimentPlan,
    store: &S,
    validator: &dyn ConfigValidator,
) -> Result<ExperimentDefinition, PickupError> {
    let base = plan.base_configuration()?;
    let value_axes = plan.value_axes()?;

    let burnin_axis = match &plan.burnin {
        Some(burnin) => {
            let index = BurninIndex::load(store, &burnin.experiment_id, burnin.min_elapsed_time)?;
            let binder = BurninBinder::new(index)
                .with_keys(burnin.keys.clone())
                .with_output_subdir(burnin.output_subdir.clone())
                .propagate(burnin.extra_params.iter().cloned());
            Some(binder.into_axis(burnin.name.clone()))
        }
        None => None,
    };

    let mut composer = SweepComposer::new().scheduler(plan.scheduler.clone());
    for axis in value_axes {
        match (axis, &burnin_axis) {
            (Some(axis), _) => composer.push_boxed(Box::new(axis)),
            (None, Some(burnin_axis)) => composer.push_boxed(Box::new(burnin_axis.clone())),
            (None, None) => {}
        }
    }
    info!(experiment = %plan.name, composer = ?composer, "composing experiment");
    let instances = composer.compose(&base)?;

    let required = RequiredKeys::new(plan.required_keys.iter().cloned());
    let combined = |config: &Configuration| {
        let mut violations = required.validate(config);
        violations.extend(validator.validate(config));
        violations
    };
    assemble(plan.task.clone(), instances, &plan.name, &combined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PLAN: &str = r#"
name: example_sim_pickup_CM
fixed:
  Simulation_Duration: 1825
  Serialized_Population_Reading_Type: READ
  Serialization_Mask_Node_Read: 0
burnin:
  experiment_id: ac7d567c
  min_elapsed_time: 18250
  extra_params: [x_Temporary_Larval_Habitat]
axes:
  - type: product
    name: case_management
    parameters:
      - key: cm_cov_U5
        values: [0.0, 0.5, 0.95]
      - key: cm_start
        values: [1, 100, 365]
required_keys: [Simulation_Duration, Run_Number]
scheduler:
  parallelism: 2
"#;

    #[test]
    fn parses_plan_with_defaults() {
        let plan = ExperimentPlan::from_yaml_slice(PLAN.as_bytes()).expect("plan");
        assert_eq!(plan.name, "example_sim_pickup_CM");
        let burnin = plan.burnin.as_ref().expect("burnin");
        assert_eq!(burnin.name, "burnin");
        assert_eq!(burnin.output_subdir, "output");
        assert_eq!(burnin.keys, BindingKeys::default());
        assert_eq!(plan.scheduler.parallelism, 2);
        assert_eq!(
            plan.base_configuration().expect("base").get("Simulation_Duration"),
            Some(&json!(1825))
        );
    }

    #[test]
    fn burnin_axis_defaults_to_last() {
        let plan = ExperimentPlan::from_yaml_slice(PLAN.as_bytes()).expect("plan");
        let axes = plan.value_axes().expect("axes");
        assert_eq!(axes.len(), 2);
        assert!(axes[0].is_some());
        assert!(axes[1].is_none());
    }

    #[test]
    fn burnin_marker_without_section_is_rejected() {
        let plan = ExperimentPlan::from_yaml_slice(
            b"name: broken\naxes:\n  - type: burnin\n",
        )
        .expect("plan");
        let err = plan.value_axes().expect_err("missing");
        assert_eq!(err.code(), "plan.burnin_missing");
    }

    #[test]
    fn base_config_unwraps_parameters_object() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"parameters": {"Simulation_Duration": 3650, "Run_Number": 0}}"#,
        )
        .expect("write");
        let config = load_config_file(&path).expect("config");
        assert_eq!(config.get("Simulation_Duration"), Some(&json!(3650)));
        assert_eq!(config.len(), 2);
    }
}
