use criterion::{criterion_group, criterion_main, Criterion};
use pickup_core::Configuration;
use pickup_exp::{
    compose_with, BurninBinder, BurninEntry, BurninIndex, Scheduler, SweepAxis, ValueListAxis,
};
use serde_json::json;

fn make_axes() -> (ValueListAxis, ValueListAxis) {
    let case_management = ValueListAxis::product(
        "case_management",
        vec![
            (
                "cm_cov_U5".to_string(),
                vec![json!(0.0), json!(0.25), json!(0.5), json!(0.75), json!(0.95)],
            ),
            (
                "cm_start".to_string(),
                vec![json!(1), json!(100), json!(200), json!(365)],
            ),
        ],
    );
    let habitat = ValueListAxis::values("x_Temporary_Larval_Habitat", [0.1, 0.5, 1.0, 2.0]);
    (case_management, habitat)
}

fn make_burnin() -> BurninBinder {
    let entries = (0..50)
        .map(|run| {
            let mut entry = BurninEntry::new(run, format!("/burnin/ac7d567c/sim_{run:03}"));
            entry.state_filenames = vec!["state-18250.dtk".to_string()];
            entry
        })
        .collect();
    let index = BurninIndex::from_entries("ac7d567c", 18250.0, entries).expect("index");
    BurninBinder::new(index)
}

fn bench_compose(c: &mut Criterion) {
    let (case_management, habitat) = make_axes();
    let burnin = make_burnin().into_axis("burnin");
    let axes: [&dyn SweepAxis; 3] = [&case_management, &habitat, &burnin];
    let base = Configuration::new()
        .with("Simulation_Duration", 1825)
        .with("Serialized_Population_Reading_Type", "READ");

    c.bench_function("compose_sequential", |b| {
        b.iter(|| {
            let _ = compose_with(&base, &axes, &Scheduler::default()).expect("compose");
        });
    });
    c.bench_function("compose_parallel", |b| {
        b.iter(|| {
            let _ = compose_with(&base, &axes, &Scheduler::parallel(4)).expect("compose");
        });
    });
}

criterion_group!(benches, bench_compose);
criterion_main!(benches);
