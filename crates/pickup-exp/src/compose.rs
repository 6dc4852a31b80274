use std::collections::BTreeMap;
use std::fmt;

use pickup_core::errors::{ErrorInfo, PickupError};
use pickup_core::Configuration;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::axis::{AxisReport, SweepAxis};
use crate::hash::content_id;

/// Scheduler configuration controlling how coordinates are evaluated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scheduler {
    #[serde(default = "Scheduler::default_parallelism")]
    pub parallelism: usize,
}

impl Scheduler {
    const fn default_parallelism() -> usize {
        1
    }

    pub fn parallel(parallelism: usize) -> Self {
        Self { parallelism }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self {
            parallelism: Self::default_parallelism(),
        }
    }
}

/// The value one axis contributed to an instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisPoint {
    pub axis: String,
    pub position: usize,
    pub report: AxisReport,
}

/// One chosen value per axis, in composition order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SweepCoordinate {
    points: Vec<AxisPoint>,
}

impl SweepCoordinate {
    pub fn new(points: Vec<AxisPoint>) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[AxisPoint] {
        &self.points
    }

    pub fn get(&self, axis: &str) -> Option<&AxisPoint> {
        self.points.iter().find(|point| point.axis == axis)
    }

    pub fn axis_names(&self) -> impl Iterator<Item = &str> {
        self.points.iter().map(|point| point.axis.as_str())
    }

    pub fn positions(&self) -> Vec<usize> {
        self.points.iter().map(|point| point.position).collect()
    }
}

impl fmt::Display for SweepCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (idx, point) in self.points.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}[{}]", point.axis, point.position)?;
            if !point.report.values.is_empty() {
                write!(f, "{{")?;
                for (n, (key, value)) in point.report.values.iter().enumerate() {
                    if n > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key}={value}")?;
                }
                write!(f, "}}")?;
            }
        }
        write!(f, ")")
    }
}

/// A fully composed simulation configuration and the coordinate that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationInstance {
    index: usize,
    id: String,
    coordinate: SweepCoordinate,
    configuration: Configuration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    identity_key: Option<i64>,
}

impl SimulationInstance {
    /// Builds an instance directly; the id is derived from the coordinate.
    pub fn new(
        index: usize,
        coordinate: SweepCoordinate,
        configuration: Configuration,
    ) -> Result<Self, PickupError> {
        let id = content_id(&coordinate)?;
        let identity_key = coordinate
            .points()
            .iter()
            .find_map(|point| point.report.identity_key);
        Ok(Self {
            index,
            id,
            coordinate,
            configuration,
            identity_key,
        })
    }

    /// Position in lexicographic coordinate order.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Stable hash of the sweep coordinate.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn coordinate(&self) -> &SweepCoordinate {
        &self.coordinate
    }

    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    pub fn configuration_mut(&mut self) -> &mut Configuration {
        &mut self.configuration
    }

    /// Run identity bound by the burn-in axis, if one was composed.
    pub fn identity_key(&self) -> Option<i64> {
        self.identity_key
    }
}

/// Ordered set of axes composed into the full cross-product.
#[derive(Default)]
pub struct SweepComposer {
    axes: Vec<Box<dyn SweepAxis>>,
    scheduler: Scheduler,
}

impl SweepComposer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn axis(mut self, axis: impl SweepAxis + 'static) -> Self {
        self.axes.push(Box::new(axis));
        self
    }

    pub fn push_boxed(&mut self, axis: Box<dyn SweepAxis>) {
        self.axes.push(axis);
    }

    pub fn scheduler(mut self, scheduler: Scheduler) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn axes(&self) -> impl Iterator<Item = &dyn SweepAxis> {
        self.axes.iter().map(|axis| axis.as_ref())
    }

    pub fn compose(&self, base: &Configuration) -> Result<Vec<SimulationInstance>, PickupError> {
        let axes: Vec<&dyn SweepAxis> = self.axes().collect();
        compose_with(base, &axes, &self.scheduler)
    }
}

impl fmt::Debug for SweepComposer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.axes().map(|axis| axis.name()).collect();
        f.debug_struct("SweepComposer")
            .field("axes", &names)
            .field("scheduler", &self.scheduler)
            .finish()
    }
}

/// Composes `axes` sequentially; see [`compose_with`].
pub fn compose(
    base: &Configuration,
    axes: &[&dyn SweepAxis],
) -> Result<Vec<SimulationInstance>, PickupError> {
    compose_with(base, axes, &Scheduler::default())
}

/// Expands the cross-product of `axes` over independent copies of `base`.
///
/// The first axis varies slowest. Axes are applied in declaration order, so
/// a key written by two axes keeps the later axis's value. Output order does
/// not depend on `scheduler.parallelism`.
pub fn compose_with(
    base: &Configuration,
    axes: &[&dyn SweepAxis],
    scheduler: &Scheduler,
) -> Result<Vec<SimulationInstance>, PickupError> {
    for axis in axes {
        if axis.is_empty() {
            return Err(PickupError::EmptyAxis(
                ErrorInfo::new("axis.empty", "sweep axis has no values")
                    .with_context("axis", axis.name()),
            ));
        }
    }
    let binding_axes: Vec<&str> = axes
        .iter()
        .filter(|axis| axis.binds_identity())
        .map(|axis| axis.name())
        .collect();
    if binding_axes.len() > 1 {
        return Err(PickupError::Binding(
            ErrorInfo::new(
                "compose.multiple_burnin_axes",
                "at most one burn-in axis may be composed",
            )
            .with_context("axes", binding_axes.join(",")),
        ));
    }

    let sizes: Vec<usize> = axes.iter().map(|axis| axis.len()).collect();
    let total = instance_count(&sizes).ok_or_else(|| {
        let sizes: Vec<String> = sizes.iter().map(ToString::to_string).collect();
        PickupError::EmptyAxis(
            ErrorInfo::new("compose.too_large", "sweep cross-product is not addressable")
                .with_context("sizes", sizes.join("x")),
        )
    })?;

    let instances = if scheduler.parallelism > 1 {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(scheduler.parallelism)
            .build()
            .map_err(|err| pool_error(scheduler.parallelism, err))?;
        // Indexed collect keeps coordinate order.
        pool.install(|| {
            (0..total)
                .into_par_iter()
                .map(|index| evaluate(base, axes, &sizes, index))
                .collect::<Result<Vec<_>, _>>()
        })?
    } else {
        (0..total)
            .map(|index| evaluate(base, axes, &sizes, index))
            .collect::<Result<Vec<_>, _>>()?
    };

    if let Some(first) = instances.first() {
        warn_on_shared_keys(first.coordinate());
    }
    info!(
        axes = axes.len(),
        instances = instances.len(),
        parallelism = scheduler.parallelism,
        "composed sweep"
    );
    Ok(instances)
}

/// Product of the axis sizes, or `None` when it overflows `usize`.
fn instance_count(sizes: &[usize]) -> Option<usize> {
    sizes
        .iter()
        .try_fold(1usize, |total, size| total.checked_mul(*size))
}

fn pool_error(threads: usize, err: impl ToString) -> PickupError {
    PickupError::Runtime(
        ErrorInfo::new("compose.thread_pool", "failed to start composition workers")
            .with_context("threads", threads)
            .with_hint(err.to_string()),
    )
}

/// Decodes `index` into per-axis positions with the last axis varying fastest.
fn positions_for(sizes: &[usize], mut index: usize) -> Vec<usize> {
    let mut positions = vec![0; sizes.len()];
    for (slot, size) in positions.iter_mut().zip(sizes).rev() {
        *slot = index % size;
        index /= size;
    }
    positions
}

fn evaluate(
    base: &Configuration,
    axes: &[&dyn SweepAxis],
    sizes: &[usize],
    index: usize,
) -> Result<SimulationInstance, PickupError> {
    let positions = positions_for(sizes, index);
    let mut config = base.clone();
    let mut points = Vec::with_capacity(axes.len());
    for (axis, position) in axes.iter().zip(positions) {
        let (next, report) = axis.apply(config, position)?;
        config = next;
        points.push(AxisPoint {
            axis: axis.name().to_string(),
            position,
            report,
        });
    }
    SimulationInstance::new(index, SweepCoordinate::new(points), config)
}

fn warn_on_shared_keys(coordinate: &SweepCoordinate) {
    let mut writers: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for point in coordinate.points() {
        for key in point.report.values.keys() {
            writers.entry(key.as_str()).or_default().push(point.axis.as_str());
        }
    }
    for (key, axes) in writers.into_iter().filter(|(_, axes)| axes.len() > 1) {
        warn!(key, axes = %axes.join(","), "parameter set by several axes; last axis wins");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axis::ValueListAxis;
    use serde_json::json;

    #[test]
    fn positions_follow_first_axis_outermost() {
        let sizes = [2, 3];
        let decoded: Vec<_> = (0..6).map(|idx| positions_for(&sizes, idx)).collect();
        assert_eq!(
            decoded,
            vec![
                vec![0, 0],
                vec![0, 1],
                vec![0, 2],
                vec![1, 0],
                vec![1, 1],
                vec![1, 2]
            ]
        );
    }

    struct WideAxis;

    impl SweepAxis for WideAxis {
        fn name(&self) -> &str {
            "wide"
        }

        fn len(&self) -> usize {
            usize::MAX / 2 + 1
        }

        fn apply(
            &self,
            config: Configuration,
            _position: usize,
        ) -> Result<(Configuration, AxisReport), PickupError> {
            Ok((config, AxisReport::new()))
        }
    }

    #[test]
    fn overflowing_cross_product_is_rejected() {
        let err = compose(&Configuration::new(), &[&WideAxis, &WideAxis]).expect_err("too large");
        assert!(matches!(err, PickupError::EmptyAxis(_)));
        assert_eq!(err.code(), "compose.too_large");
        assert_eq!(instance_count(&[1 << 16; 4]), None);
        assert_eq!(instance_count(&[3, 5]), Some(15));
        assert_eq!(instance_count(&[]), Some(1));
    }

    #[test]
    fn pool_failures_are_runtime_errors() {
        let err = pool_error(4, "thread spawn refused");
        assert!(matches!(err, PickupError::Runtime(_)));
        assert_eq!(err.code(), "compose.thread_pool");
        assert_eq!(err.info().context["threads"], "4");
    }

    #[test]
    fn no_axes_yield_the_base_configuration() {
        let base = Configuration::new().with("Simulation_Duration", 1825);
        let instances = compose(&base, &[]).expect("compose");
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].configuration(), &base);
        assert!(instances[0].coordinate().points().is_empty());
    }

    #[test]
    fn later_axis_wins_on_shared_key() {
        let first = ValueListAxis::values("x", [1, 2]);
        let second =
            ValueListAxis::from_tuples("override", vec!["x".to_string()], vec![vec![json!(10)]])
                .expect("tuples");
        let instances = compose(&Configuration::new(), &[&first, &second]).expect("compose");
        assert_eq!(instances.len(), 2);
        assert!(instances
            .iter()
            .all(|instance| instance.configuration().get("x") == Some(&json!(10))));
    }

    #[test]
    fn coordinate_display_names_axes_and_values() {
        let axis = ValueListAxis::values("cm_start", [365]);
        let instances = compose(&Configuration::new(), &[&axis]).expect("compose");
        assert_eq!(
            instances[0].coordinate().to_string(),
            "(cm_start[0]{cm_start=365})"
        );
    }
}
