//! Sweep composition and burn-in linkage for pickup simulation experiments.

mod assemble;
mod axis;
mod binder;
mod burnin;
mod compose;
mod hash;
mod plan;
mod registry;
mod serde;
mod store;
mod submit;

pub use assemble::{
    assemble, AssetRef, ConfigValidator, ExperimentDefinition, InstanceIdentity, NoopValidator,
    RequiredKeys, TaskTemplate,
};
pub use axis::{AxisReport, MappedAxis, SweepAxis, ValueListAxis};
pub use binder::{join_output, BindingKeys, BurninAxis, BurninBinder, DEFAULT_OUTPUT_SUBDIR};
pub use burnin::{BurninEntry, BurninIndex};
pub use compose::{
    compose, compose_with, AxisPoint, Scheduler, SimulationInstance, SweepComposer,
    SweepCoordinate,
};
pub use hash::content_id;
pub use plan::{build_experiment, AxisPlan, BurninPlan, ExperimentPlan, NamedValues};
pub use registry::{registry_append, Registry};
pub use store::{MemoryStore, MetadataRow, MetadataStore};
pub use submit::{DirectorySubmitter, ExperimentSubmitter, PlatformTarget, SubmissionReceipt};

pub use crate::serde::{from_json_slice, from_yaml_slice, to_canonical_json_bytes};
