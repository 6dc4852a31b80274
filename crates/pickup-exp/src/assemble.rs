use std::collections::BTreeSet;

use pickup_core::errors::{ErrorInfo, PickupError};
use pickup_core::{Configuration, ParamValue};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::compose::{SimulationInstance, SweepCoordinate};
use crate::hash::content_id;

/// Checks a composed configuration and returns every violation found.
pub trait ConfigValidator: Send + Sync {
    fn validate(&self, config: &Configuration) -> Vec<String>;
}

/// Accepts every configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopValidator;

impl ConfigValidator for NoopValidator {
    fn validate(&self, _config: &Configuration) -> Vec<String> {
        Vec::new()
    }
}

/// Requires each listed key to be present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredKeys {
    keys: BTreeSet<String>,
}

impl RequiredKeys {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }
}

impl ConfigValidator for RequiredKeys {
    fn validate(&self, config: &Configuration) -> Vec<String> {
        self.keys
            .iter()
            .filter(|key| !config.contains_key(key))
            .map(|key| format!("missing required key `{key}`"))
            .collect()
    }
}

impl<F> ConfigValidator for F
where
    F: Fn(&Configuration) -> Vec<String> + Send + Sync,
{
    fn validate(&self, config: &Configuration) -> Vec<String> {
        self(config)
    }
}

/// File or directory shipped with every simulation of the experiment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRef {
    pub source: String,
    /// Location relative to the simulation working directory.
    #[serde(default)]
    pub relative_path: Option<String>,
}

/// Template shared by every simulation: what to run and what to ship with it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TaskTemplate {
    #[serde(default)]
    pub executable: String,
    #[serde(default)]
    pub common_assets: Vec<AssetRef>,
    /// Opaque options forwarded to the submitter untouched.
    #[serde(default)]
    pub options: ParamValue,
}

/// Post-submission identity of one simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceIdentity {
    pub index: usize,
    pub id: String,
    pub coordinate: SweepCoordinate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_key: Option<i64>,
}

/// Validated, immutable experiment ready for submission.
///
/// Only [`assemble`] builds one; it serializes for submission but is never
/// read back.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExperimentDefinition {
    id: String,
    name: String,
    base_task: TaskTemplate,
    simulations: Vec<SimulationInstance>,
}

impl ExperimentDefinition {
    /// Stable hash over name, task and instance ids.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_task(&self) -> &TaskTemplate {
        &self.base_task
    }

    pub fn simulations(&self) -> &[SimulationInstance] {
        &self.simulations
    }

    pub fn len(&self) -> usize {
        self.simulations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.simulations.is_empty()
    }

    /// What must remain queryable once the experiment has been submitted.
    pub fn identities(&self) -> Vec<InstanceIdentity> {
        self.simulations
            .iter()
            .map(|instance| InstanceIdentity {
                index: instance.index(),
                id: instance.id().to_string(),
                coordinate: instance.coordinate().clone(),
                identity_key: instance.identity_key(),
            })
            .collect()
    }
}

/// Validates every instance and wraps them into an [`ExperimentDefinition`].
///
/// All failing instances are reported together; nothing is assembled if any fails.
pub fn assemble(
    base_task: TaskTemplate,
    instances: Vec<SimulationInstance>,
    name: &str,
    validator: &dyn ConfigValidator,
) -> Result<ExperimentDefinition, PickupError> {
    let Some(first) = instances.first() else {
        return Err(PickupError::Assembly(
            ErrorInfo::new("assemble.empty", "experiment has no simulations")
                .with_context("experiment", name),
        ));
    };
    let expected_axes: Vec<String> = first
        .coordinate()
        .axis_names()
        .map(str::to_string)
        .collect();

    let mut failure = ErrorInfo::new("assemble.validation", "");
    let mut failed = 0usize;
    for (position, instance) in instances.iter().enumerate() {
        let mut violations = validator.validate(instance.configuration());
        let axes: Vec<&str> = instance.coordinate().axis_names().collect();
        if axes != expected_axes {
            violations.push(format!(
                "coordinate records axes [{}], expected [{}]",
                axes.join(", "),
                expected_axes.join(", ")
            ));
        }
        if violations.is_empty() {
            continue;
        }
        failed += 1;
        warn!(
            experiment = name,
            position,
            violations = violations.len(),
            "simulation failed validation"
        );
        failure = failure
            .with_context(
                format!("instance.{position}.coordinate"),
                instance.coordinate().to_string(),
            )
            .with_context(
                format!("instance.{position}.violations"),
                violations.join("; "),
            );
    }
    if failed > 0 {
        failure.message = format!(
            "{failed} of {} simulations failed validation",
            instances.len()
        );
        return Err(PickupError::Assembly(
            failure.with_context("experiment", name),
        ));
    }

    let ids: Vec<&str> = instances.iter().map(|instance| instance.id()).collect();
    let id = content_id(&(name, &base_task, ids))?;
    info!(
        experiment = name,
        id = %id,
        simulations = instances.len(),
        "assembled experiment"
    );
    Ok(ExperimentDefinition {
        id,
        name: name.to_string(),
        base_task,
        simulations: instances,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axis::ValueListAxis;
    use crate::compose::compose;

    #[test]
    fn required_keys_reports_each_missing_key() {
        let validator = RequiredKeys::new(["Run_Number", "Simulation_Duration"]);
        let violations = validator.validate(&Configuration::new().with("Run_Number", 1));
        assert_eq!(violations, vec!["missing required key `Simulation_Duration`"]);
    }

    #[test]
    fn empty_instance_list_is_rejected() {
        let err = assemble(TaskTemplate::default(), Vec::new(), "empty", &NoopValidator)
            .expect_err("empty");
        assert_eq!(err.code(), "assemble.empty");
    }

    #[test]
    fn identical_inputs_produce_identical_ids() {
        let axis = ValueListAxis::values("x", [1, 2, 3]);
        let build = || {
            let instances = compose(&Configuration::new(), &[&axis]).expect("compose");
            assemble(TaskTemplate::default(), instances, "ids", &NoopValidator).expect("assemble")
        };
        let a = build();
        let b = build();
        assert_eq!(a.id(), b.id());
        assert_eq!(a.identities(), b.identities());
    }

    #[test]
    fn mismatched_coordinates_are_violations() {
        let one = ValueListAxis::values("x", [1]);
        let two = ValueListAxis::values("y", [2]);
        let mut instances = compose(&Configuration::new(), &[&one]).expect("compose");
        instances.extend(compose(&Configuration::new(), &[&one, &two]).expect("compose"));
        let err = assemble(TaskTemplate::default(), instances, "mixed", &NoopValidator)
            .expect_err("mismatch");
        let context = &err.info().context;
        assert!(context["instance.1.violations"].contains("expected [x]"));
        assert!(!context.contains_key("instance.0.violations"));
    }
}
