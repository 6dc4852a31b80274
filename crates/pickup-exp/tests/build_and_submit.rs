use std::fs;

use pickup_core::PickupError;
use pickup_exp::{
    build_experiment, from_json_slice, registry_append, DirectorySubmitter, ExperimentPlan,
    ExperimentSubmitter, MetadataRow, NoopValidator, PlatformTarget, Registry,
};
use serde_json::{json, Value};

const PLAN: &str = r#"
name: example_sim_pickup_CM
base_config: config.json
fixed:
  Serialized_Population_Reading_Type: READ
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
required_keys: [Simulation_Duration, Run_Number, Serialized_Population_Path]
task:
  executable: Eradication
scheduler:
  parallelism: 2
"#;

fn seed_registry(registry: &Registry) {
    let rows: Vec<MetadataRow> = (0..3)
        .flat_map(|run| {
            let path = format!("/burnin/ac7d567c/sim_{run}");
            [
                MetadataRow::new("ac7d567c", run, path.clone(), 3650.0, "state-03650.dtk"),
                MetadataRow::new("ac7d567c", run, path, 18250.0, "state-18250.dtk")
                    .with_extra("x_Temporary_Larval_Habitat", 0.2 * (run + 1) as f64),
            ]
        })
        .collect();
    registry_append(registry, &rows).expect("append");
}

#[test]
fn plan_builds_and_submits_to_directory() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(
        dir.path().join("config.json"),
        r#"{"parameters": {"Simulation_Duration": 1825, "Run_Number": 0}}"#,
    )
    .expect("config");
    let plan_path = dir.path().join("plan.yaml");
    fs::write(&plan_path, PLAN).expect("plan");
    let registry = Registry::from_path(dir.path().join("snapshots.sqlite"));
    seed_registry(&registry);

    let plan = ExperimentPlan::load(&plan_path).expect("load plan");
    let experiment = build_experiment(&plan, &registry, &NoopValidator).expect("build");
    assert_eq!(experiment.len(), 27);
    let again = build_experiment(&plan, &registry, &NoopValidator).expect("build");
    assert_eq!(experiment.id(), again.id());

    let last = &experiment.simulations()[26];
    let config = last.configuration();
    assert_eq!(config.get("cm_cov_U5"), Some(&json!(0.95)));
    assert_eq!(config.get("cm_start"), Some(&json!(365)));
    assert_eq!(config.get("Run_Number"), Some(&json!(2)));
    assert_eq!(config.get("Serialized_Population_Filenames"), Some(&json!(["state-18250.dtk"])));
    assert_eq!(config.get("Serialized_Population_Reading_Type"), Some(&json!("READ")));
    assert!(config.get("x_Temporary_Larval_Habitat").is_some());

    let jobs = dir.path().join("jobs");
    let receipt = DirectorySubmitter
        .submit(&experiment, &PlatformTarget::local(&jobs))
        .expect("submit");
    assert_eq!(receipt.experiment_id, experiment.id());
    assert_eq!(receipt.simulations, 27);

    let root = jobs.join(experiment.id());
    let platform: Value =
        from_json_slice(&fs::read(root.join("platform.json")).expect("platform")).expect("json");
    assert_eq!(platform["name"], json!("SLURM_LOCAL"));
    let tags: Value =
        from_json_slice(&fs::read(root.join("sim_0026/tags.json")).expect("tags")).expect("json");
    assert_eq!(tags["identity_key"], json!(2));
    assert_eq!(tags["id"], json!(last.id()));
}

#[test]
fn missing_burnin_data_aborts_the_build() {
    let dir = tempfile::tempdir().expect("tempdir");
    let registry = Registry::from_path(dir.path().join("snapshots.csv"));
    let plan = ExperimentPlan::from_yaml_slice(
        b"name: pickup\nburnin:\n  experiment_id: missing\n  min_elapsed_time: 100\n",
    )
    .expect("plan");
    let err = build_experiment(&plan, &registry, &NoopValidator).expect_err("not found");
    assert!(matches!(err, PickupError::NotFound(_)));
}

#[test]
fn required_keys_fail_assembly() {
    let dir = tempfile::tempdir().expect("tempdir");
    let registry = Registry::from_path(dir.path().join("snapshots.csv"));
    seed_registry(&registry);
    let plan = ExperimentPlan::from_yaml_slice(
        br#"
name: pickup
burnin:
  experiment_id: ac7d567c
  min_elapsed_time: 18250
required_keys: [Simulation_Duration]
"#,
    )
    .expect("plan");
    let err = build_experiment(&plan, &registry, &NoopValidator).expect_err("assembly");
    assert!(matches!(err, PickupError::Assembly(_)));
    assert_eq!(err.info().message, "3 of 3 simulations failed validation");
}
