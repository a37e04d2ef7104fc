use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::active_cells::{ActiveCellIndex, PorosityModel};
use crate::case::{CaseDataSource, CaseId};
use crate::ensemble::UnionActiveCells;
use crate::error::StatisticsError;
use crate::progress::ProgressReporter;
use crate::statistics::config::{
    AggregateKind, PercentileConfig, ResultSpec, UNDEFINED_VALUE, is_undefined,
};
use crate::statistics::math::{basic_statistics, percentile, sort_samples};
use crate::statistics::store::{AggregateArrays, ResultStore};

/// 一次统计计算的参数
#[derive(Debug, Clone, Copy)]
pub struct EvaluationSettings<'a> {
    pub specs: &'a [ResultSpec],
    /// 动态结果需要计算的时间步；为空时只计算时间步 0
    pub time_steps: &'a [usize],
    pub percentiles: &'a PercentileConfig,
    /// 成员中非有效的单元按 0 参与统计
    pub use_zero_for_inactive_cells: bool,
}

/// 单个工作单元（属性 × 时间步）的计时
#[derive(Debug, Clone, Serialize)]
pub struct UnitTiming {
    pub property: String,
    pub porosity: PorosityModel,
    pub time_step: usize,
    pub cell_count: usize,
    /// 至少有一个样本的单元数
    pub contributing_cells: usize,
    pub duration: Duration,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EvaluationReport {
    pub units: Vec<UnitTiming>,
    pub total: Duration,
}

impl EvaluationReport {
    pub fn total_cells(&self) -> usize {
        self.units.iter().map(|u| u.cell_count).sum()
    }
}

/// 成员在某个孔隙模型下参与统计所需的数据
struct MemberInput {
    case: CaseId,
    active: Option<Arc<ActiveCellIndex>>,
}

/// 统计计算器
///
/// 遍历每个结果与时间步，在并集有效单元上收集所有成员的样本，
/// 计算统计量后按（属性, 时间步）整体发布到结果存储。
pub struct StatisticsEvaluator<'a> {
    source: &'a dyn CaseDataSource,
    members: &'a [CaseId],
    union: &'a UnionActiveCells,
}

impl<'a> StatisticsEvaluator<'a> {
    pub fn new(source: &'a dyn CaseDataSource, members: &'a [CaseId], union: &'a UnionActiveCells) -> Self {
        Self { source, members, union }
    }

    pub fn evaluate(
        &self,
        settings: &EvaluationSettings<'_>,
        store: &ResultStore,
        progress: &dyn ProgressReporter,
    ) -> Result<EvaluationReport, StatisticsError> {
        if self.members.is_empty() {
            debug!("[统计计算] 案例组没有成员，跳过");
            return Ok(EvaluationReport::default());
        }
        if self.union.is_stale() {
            return Err(StatisticsError::StaleUnionIndex);
        }
        settings.percentiles.validate()?;

        let default_steps = [0usize];
        let dynamic_steps = if settings.time_steps.is_empty() {
            &default_steps[..]
        } else {
            settings.time_steps
        };

        let units: Vec<(&ResultSpec, usize)> = settings
            .specs
            .iter()
            .flat_map(|spec| {
                let steps = if spec.category.is_time_dependent() {
                    dynamic_steps
                } else {
                    &default_steps[..]
                };
                steps.iter().map(move |&step| (spec, step))
            })
            .collect();

        info!(
            members = self.members.len(),
            results = settings.specs.len(),
            units = units.len(),
            "[统计计算] 开始"
        );

        let start = Instant::now();
        let mut task = progress.begin_task(units.len(), "计算统计量");
        let mut report = EvaluationReport::default();

        for (spec, time_step) in units {
            if task.is_cancelled() {
                warn!(completed = report.units.len(), "[统计计算] 已取消，丢弃部分结果");
                store.clear();
                return Err(StatisticsError::Cancelled);
            }

            let unit_start = Instant::now();
            let (arrays, cell_count, contributing_cells) = self.evaluate_unit(spec, time_step, settings);
            store.publish(spec.porosity, &spec.property, time_step, arrays);

            let duration = unit_start.elapsed();
            debug!(
                property = %spec.property,
                porosity = spec.porosity.label(),
                time_step,
                cells = cell_count,
                contributing = contributing_cells,
                elapsed_us = duration.as_micros() as u64,
                "[统计计算] 工作单元完成"
            );
            report.units.push(UnitTiming {
                property: spec.property.clone(),
                porosity: spec.porosity,
                time_step,
                cell_count,
                contributing_cells,
                duration,
            });
            task.increment();
        }

        report.total = start.elapsed();
        info!(
            units = report.units.len(),
            cells = report.total_cells(),
            elapsed_ms = report.total.as_millis() as u64,
            "[统计计算] 完成"
        );
        Ok(report)
    }

    /// 计算一个（属性, 时间步）；返回结果数组、单元数和有样本的单元数
    fn evaluate_unit(
        &self,
        spec: &ResultSpec,
        time_step: usize,
        settings: &EvaluationSettings<'_>,
    ) -> (AggregateArrays, usize, usize) {
        let union_index = self.union.index(spec.porosity);
        let cell_count = union_index.reservoir_active_count();
        let kinds = settings.percentiles.aggregate_kinds();

        // 没有存储该属性的成员整体排除
        let inputs: Vec<MemberInput> = self
            .members
            .iter()
            .filter(|&&case| self.source.has_result(case, spec.porosity, spec.category, &spec.property))
            .map(|&case| MemberInput {
                case,
                active: self.source.active_cell_index(case, spec.porosity),
            })
            .collect();

        let cells: Vec<Option<[f64; 9]>> = union_index
            .active_global_cells()
            .par_iter()
            .map_init(
                || Vec::with_capacity(inputs.len()),
                |samples, &global_cell| {
                    samples.clear();
                    self.gather_samples(&inputs, spec, time_step, global_cell, settings, samples);
                    cell_aggregates(samples, settings.percentiles)
                },
            )
            .collect();

        let contributing_cells = cells.iter().filter(|c| c.is_some()).count();
        let mut arrays = AggregateArrays::default();
        for kind in kinds {
            let code = kind.code() as usize;
            let values = cells
                .iter()
                .map(|cell| cell.map_or(UNDEFINED_VALUE, |values| values[code]))
                .collect();
            arrays.insert(kind, values);
        }
        (arrays, cell_count, contributing_cells)
    }

    fn gather_samples(
        &self,
        inputs: &[MemberInput],
        spec: &ResultSpec,
        time_step: usize,
        global_cell: usize,
        settings: &EvaluationSettings<'_>,
        samples: &mut Vec<f64>,
    ) {
        for input in inputs {
            let active = input.active.as_ref().is_some_and(|index| index.is_active(global_cell));
            if !active {
                if settings.use_zero_for_inactive_cells {
                    samples.push(0.0);
                }
                continue;
            }

            if let Some(value) =
                self.source
                    .scalar_value(input.case, spec.porosity, &spec.property, time_step, global_cell)
                && !is_undefined(value)
            {
                samples.push(value);
            }
        }
    }
}

/// 单元的全部统计量，按 [`AggregateKind::code`] 排列；没有样本时返回 None
fn cell_aggregates(samples: &mut [f64], percentiles: &PercentileConfig) -> Option<[f64; 9]> {
    let stats = basic_statistics(samples)?;

    let mut values = [UNDEFINED_VALUE; 9];
    values[AggregateKind::Min.code() as usize] = stats.min;
    values[AggregateKind::Max.code() as usize] = stats.max;
    values[AggregateKind::Sum.code() as usize] = stats.sum;
    values[AggregateKind::Range.code() as usize] = stats.range;
    values[AggregateKind::Mean.code() as usize] = stats.mean;
    values[AggregateKind::StdDev.code() as usize] = stats.std_dev;

    if percentiles.enabled {
        sort_samples(samples);
        for kind in AggregateKind::PERCENTILES {
            if let Some(position) = percentiles.position(kind) {
                values[kind.code() as usize] = percentile(samples, position, percentiles.method);
            }
        }
    }
    Some(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::case::{InMemoryCase, InMemoryCaseSource, ResultCategory};
    use crate::ensemble::UnionActiveCellComputer;
    use crate::grid::{GridTopology, SubGrid};
    use crate::progress::{NoProgress, ProgressTask};
    use crate::statistics::config::PercentileMethod;

    fn two_case_source() -> (InMemoryCaseSource, Arc<GridTopology>, Vec<CaseId>) {
        let grid = Arc::new(GridTopology::new(vec![SubGrid::new("MAIN", [4, 1, 1])]).unwrap());
        let source = InMemoryCaseSource::new();

        let active = ActiveCellIndex::from_active_flags(&grid, &[true, true, true, false]).unwrap();
        let mut a = InMemoryCase::new("A", grid.clone(), active);
        a.add_result(PorosityModel::Matrix, ResultCategory::DynamicNative, "PRESSURE", vec![vec![10.0, 20.0, 30.0]])
            .unwrap();

        let active = ActiveCellIndex::from_active_flags(&grid, &[false, true, true, true]).unwrap();
        let mut b = InMemoryCase::new("B", grid.clone(), active);
        b.add_result(PorosityModel::Matrix, ResultCategory::DynamicNative, "PRESSURE", vec![vec![21.0, 31.0, 41.0]])
            .unwrap();

        let members = vec![source.insert(a), source.insert(b)];
        (source, grid, members)
    }

    fn pressure_spec() -> Vec<ResultSpec> {
        vec![ResultSpec::new(PorosityModel::Matrix, ResultCategory::DynamicNative, "PRESSURE")]
    }

    fn computed_union(source: &InMemoryCaseSource, grid: &GridTopology, members: &[CaseId]) -> UnionActiveCells {
        let mut union = UnionActiveCells::default();
        UnionActiveCellComputer::new(source, &NoProgress).compute(&mut union, Some(grid), members);
        union
    }

    #[test]
    fn inactive_members_are_excluded_from_samples() {
        let (source, grid, members) = two_case_source();
        let union = computed_union(&source, &grid, &members);
        let store = ResultStore::new();
        let specs = pressure_spec();
        let percentiles = PercentileConfig::default();
        let settings = EvaluationSettings {
            specs: &specs,
            time_steps: &[],
            percentiles: &percentiles,
            use_zero_for_inactive_cells: false,
        };

        let report = StatisticsEvaluator::new(&source, &members, &union)
            .evaluate(&settings, &store, &NoProgress)
            .unwrap();
        assert_eq!(report.units.len(), 1);
        assert_eq!(report.units[0].contributing_cells, 4);

        let arrays = store.get(PorosityModel::Matrix, "PRESSURE", 0).unwrap();
        assert_eq!(arrays.get(AggregateKind::Mean).unwrap(), &[10.0, 20.5, 30.5, 41.0]);
        assert_eq!(arrays.get(AggregateKind::Min).unwrap(), &[10.0, 20.0, 30.0, 41.0]);
        assert_eq!(arrays.get(AggregateKind::Max).unwrap(), &[10.0, 21.0, 31.0, 41.0]);
        assert_eq!(arrays.get(AggregateKind::StdDev).unwrap()[0], 0.0);
    }

    #[test]
    fn zero_option_counts_inactive_members() {
        let (source, grid, members) = two_case_source();
        let union = computed_union(&source, &grid, &members);
        let store = ResultStore::new();
        let specs = pressure_spec();
        let percentiles = PercentileConfig { enabled: false, ..PercentileConfig::default() };
        let settings = EvaluationSettings {
            specs: &specs,
            time_steps: &[0],
            percentiles: &percentiles,
            use_zero_for_inactive_cells: true,
        };

        StatisticsEvaluator::new(&source, &members, &union)
            .evaluate(&settings, &store, &NoProgress)
            .unwrap();

        let arrays = store.get(PorosityModel::Matrix, "PRESSURE", 0).unwrap();
        assert_eq!(arrays.get(AggregateKind::Mean).unwrap(), &[5.0, 20.5, 30.5, 20.5]);
        assert!(arrays.get(AggregateKind::PMid).is_none());
    }

    #[test]
    fn missing_property_leaves_cells_undefined() {
        let (source, grid, members) = two_case_source();
        let union = computed_union(&source, &grid, &members);
        let store = ResultStore::new();
        let specs = vec![ResultSpec::new(PorosityModel::Matrix, ResultCategory::StaticNative, "PORO")];
        let percentiles = PercentileConfig::default();
        let settings = EvaluationSettings {
            specs: &specs,
            time_steps: &[0, 1, 2],
            percentiles: &percentiles,
            use_zero_for_inactive_cells: false,
        };

        let report = StatisticsEvaluator::new(&source, &members, &union)
            .evaluate(&settings, &store, &NoProgress)
            .unwrap();

        // 静态结果只计算时间步 0
        assert_eq!(report.units.len(), 1);
        let arrays = store.get(PorosityModel::Matrix, "PORO", 0).unwrap();
        assert!(arrays.get(AggregateKind::Mean).unwrap().iter().all(|v| *v == UNDEFINED_VALUE));
        assert_eq!(store.value(PorosityModel::Matrix, "PORO", 0, AggregateKind::Mean, 0), None);
    }

    #[test]
    fn stale_union_is_refused() {
        let (source, _grid, members) = two_case_source();
        let union = UnionActiveCells::default();
        let store = ResultStore::new();
        let specs = pressure_spec();
        let percentiles = PercentileConfig::default();
        let settings = EvaluationSettings {
            specs: &specs,
            time_steps: &[],
            percentiles: &percentiles,
            use_zero_for_inactive_cells: false,
        };

        let result = StatisticsEvaluator::new(&source, &members, &union).evaluate(&settings, &store, &NoProgress);
        assert_eq!(result.unwrap_err(), StatisticsError::StaleUnionIndex);
    }

    struct CancelAfter(usize);

    struct CancelTask {
        remaining: usize,
    }

    impl ProgressTask for CancelTask {
        fn increment(&mut self) {
            self.remaining = self.remaining.saturating_sub(1);
        }

        fn is_cancelled(&self) -> bool {
            self.remaining == 0
        }
    }

    impl ProgressReporter for CancelAfter {
        fn begin_task(&self, _total_units: usize, _label: &str) -> Box<dyn ProgressTask + '_> {
            Box::new(CancelTask { remaining: self.0 })
        }
    }

    #[test]
    fn cancellation_discards_partial_results() {
        let (source, grid, members) = two_case_source();
        let union = computed_union(&source, &grid, &members);
        let store = ResultStore::new();
        let specs = vec![
            ResultSpec::new(PorosityModel::Matrix, ResultCategory::DynamicNative, "PRESSURE"),
            ResultSpec::new(PorosityModel::Matrix, ResultCategory::DynamicNative, "SOIL"),
        ];
        let percentiles = PercentileConfig { method: PercentileMethod::NearestObservation, ..PercentileConfig::default() };
        let settings = EvaluationSettings {
            specs: &specs,
            time_steps: &[],
            percentiles: &percentiles,
            use_zero_for_inactive_cells: false,
        };

        let result = StatisticsEvaluator::new(&source, &members, &union).evaluate(&settings, &store, &CancelAfter(1));
        assert_eq!(result.unwrap_err(), StatisticsError::Cancelled);
        assert!(store.is_empty());
    }
}
