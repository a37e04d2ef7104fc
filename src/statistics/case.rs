use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::active_cells::{ActiveCellIndex, PorosityModel};
use crate::case::{CaseDataSource, CaseId, ResultCategory};
use crate::ensemble::{EnsembleEvent, EnsembleObserver, UnionActiveCells};
use crate::error::StatisticsError;
use crate::grid::GridTopology;
use crate::progress::ProgressReporter;
use crate::statistics::config::{AggregateKind, PercentileConfig, PropertySelection};
use crate::statistics::evaluator::{EvaluationReport, EvaluationSettings, StatisticsEvaluator};
use crate::statistics::store::ResultStore;

/// 默认预选的属性
const DEFAULT_DYNAMIC_PROPERTIES: [&str; 2] = ["SOIL", "PRESSURE"];
const DEFAULT_STATIC_PROPERTIES: [&str; 2] = ["PERMX", "PORO"];

/// 计算状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CalculationStatus {
    #[default]
    NotCalculated,
    Calculated,
}

/// 统计案例共享的网格数据：案例组的网格与有效单元并集
#[derive(Debug, Clone)]
pub struct StatisticsGridData {
    pub grid: Arc<GridTopology>,
    pub active_cells: [Arc<ActiveCellIndex>; 2],
}

/// 计算统计量所需的案例组上下文
#[derive(Clone, Copy)]
pub struct ComputeContext<'a> {
    pub source: &'a dyn CaseDataSource,
    pub members: &'a [CaseId],
    pub grid: Option<&'a Arc<GridTopology>>,
    /// 必须已是最新状态
    pub union: &'a UnionActiveCells,
    pub progress: &'a dyn ProgressReporter,
}

#[derive(Debug)]
pub enum ComputeOutcome {
    Computed(EvaluationReport),
    /// 已处于 CALCULATED 状态，未重新计算
    AlreadyCalculated,
}

/// 统计案例
///
/// 只保存统计结果的合成案例。计算完成后进入 CALCULATED 状态，
/// 此时属性选择与百分位数配置只读，直到结果被清除。
#[derive(Debug)]
pub struct StatisticsCase {
    id: Uuid,
    name: String,
    status: CalculationStatus,
    selection: PropertySelection,
    percentiles: PercentileConfig,
    time_steps: Vec<usize>,
    use_zero_for_inactive_cells: bool,
    store: ResultStore,
    grid_data: Option<StatisticsGridData>,
}

impl StatisticsCase {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4(), name)
    }

    pub fn with_id(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            status: CalculationStatus::NotCalculated,
            selection: PropertySelection::default(),
            percentiles: PercentileConfig::default(),
            time_steps: Vec::new(),
            use_zero_for_inactive_cells: false,
            store: ResultStore::new(),
            grid_data: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn status(&self) -> CalculationStatus {
        self.status
    }

    pub fn has_computed_statistics(&self) -> bool {
        self.status == CalculationStatus::Calculated
    }

    pub fn selection(&self) -> &PropertySelection {
        &self.selection
    }

    pub fn percentiles(&self) -> &PercentileConfig {
        &self.percentiles
    }

    pub fn time_steps(&self) -> &[usize] {
        &self.time_steps
    }

    pub fn use_zero_for_inactive_cells(&self) -> bool {
        self.use_zero_for_inactive_cells
    }

    pub fn result_store(&self) -> &ResultStore {
        &self.store
    }

    pub fn grid_data(&self) -> Option<&StatisticsGridData> {
        self.grid_data.as_ref()
    }

    fn ensure_editable(&self) -> Result<(), StatisticsError> {
        if self.has_computed_statistics() {
            return Err(StatisticsError::SelectionLocked);
        }
        Ok(())
    }

    pub fn set_selected_properties(
        &mut self,
        porosity: PorosityModel,
        category: ResultCategory,
        names: Vec<String>,
    ) -> Result<(), StatisticsError> {
        self.ensure_editable()?;
        self.selection.set(porosity, category, names)
    }

    pub fn set_selection(&mut self, selection: PropertySelection) -> Result<(), StatisticsError> {
        self.ensure_editable()?;
        selection.validate()?;
        self.selection = selection;
        Ok(())
    }

    pub fn set_percentiles(&mut self, percentiles: PercentileConfig) -> Result<(), StatisticsError> {
        self.ensure_editable()?;
        percentiles.validate()?;
        self.percentiles = percentiles;
        Ok(())
    }

    /// 设置需要计算的时间步；为空时只计算时间步 0
    pub fn set_time_steps(&mut self, time_steps: Vec<usize>) -> Result<(), StatisticsError> {
        self.ensure_editable()?;
        let mut time_steps = time_steps;
        time_steps.sort_unstable();
        time_steps.dedup();
        self.time_steps = time_steps;
        Ok(())
    }

    /// 选中主案例的全部时间步
    pub fn select_all_time_steps(&mut self, time_step_count: usize) -> Result<(), StatisticsError> {
        self.set_time_steps((0..time_step_count).collect())
    }

    pub fn set_use_zero_for_inactive_cells(&mut self, enabled: bool) -> Result<(), StatisticsError> {
        self.ensure_editable()?;
        self.use_zero_for_inactive_cells = enabled;
        Ok(())
    }

    /// 为空的类别预选常用属性（仅当主案例存在该属性）
    pub fn populate_default_selection(
        &mut self,
        source: &dyn CaseDataSource,
        main_case: CaseId,
    ) -> Result<(), StatisticsError> {
        self.ensure_editable()?;

        for porosity in PorosityModel::ALL {
            for (category, defaults) in [
                (ResultCategory::DynamicNative, &DEFAULT_DYNAMIC_PROPERTIES),
                (ResultCategory::StaticNative, &DEFAULT_STATIC_PROPERTIES),
            ] {
                if !self.selection.get(porosity, category).is_empty() {
                    continue;
                }
                let available = source.result_names(main_case, porosity, category);
                let names: Vec<String> = defaults
                    .iter()
                    .filter(|name| available.contains(**name))
                    .filter(|name| self.selection.category_of(porosity, name).is_none())
                    .map(|name| name.to_string())
                    .collect();
                self.selection.set(porosity, category, names)?;
            }
        }
        Ok(())
    }

    pub fn selection_summary(&self) -> String {
        self.selection.summary(&self.percentiles)
    }

    /// 计算统计量
    ///
    /// 已计算时不做任何事。失败或取消时丢弃部分结果并保持 NOT_CALCULATED。
    pub fn compute_statistics(&mut self, context: ComputeContext<'_>) -> Result<ComputeOutcome, StatisticsError> {
        if self.has_computed_statistics() {
            debug!(case = %self.name, "[统计案例] 已计算，跳过");
            return Ok(ComputeOutcome::AlreadyCalculated);
        }
        if context.union.is_stale() {
            return Err(StatisticsError::StaleUnionIndex);
        }

        if self.grid_data.is_none()
            && let Some(grid) = context.grid
        {
            self.open_grid_data(grid.clone(), context.union);
        }

        let specs = self.selection.result_specs();
        let settings = EvaluationSettings {
            specs: &specs,
            time_steps: &self.time_steps,
            percentiles: &self.percentiles,
            use_zero_for_inactive_cells: self.use_zero_for_inactive_cells,
        };

        self.store.clear();
        let evaluator = StatisticsEvaluator::new(context.source, context.members, context.union);
        match evaluator.evaluate(&settings, &self.store, context.progress) {
            Ok(report) => {
                self.status = CalculationStatus::Calculated;
                info!(
                    case = %self.name,
                    entries = self.store.entry_count(),
                    "[统计案例] 计算完成"
                );
                Ok(ComputeOutcome::Computed(report))
            }
            Err(e) => {
                self.store.clear();
                warn!(case = %self.name, error = %e, "[统计案例] 计算失败");
                Err(e)
            }
        }
    }

    /// 清除统计结果，回到 NOT_CALCULATED，属性选择重新可编辑
    pub fn clear_computed_statistics(&mut self) {
        self.store.clear();
        self.status = CalculationStatus::NotCalculated;
        debug!(case = %self.name, "[统计案例] 已清除统计结果");
    }

    /// 以持久化的结果恢复为 CALCULATED 状态
    pub fn restore_results(&mut self, store: ResultStore, grid: Arc<GridTopology>, union: &UnionActiveCells) {
        self.store.replace_with(store);
        self.open_grid_data(grid, union);
        self.status = CalculationStatus::Calculated;
    }

    /// 恢复持久化的状态字段（不含结果）
    pub(crate) fn restore_settings(
        &mut self,
        selection: PropertySelection,
        percentiles: PercentileConfig,
        time_steps: Vec<usize>,
        use_zero_for_inactive_cells: bool,
    ) {
        self.selection = selection;
        self.percentiles = percentiles;
        self.time_steps = time_steps;
        self.use_zero_for_inactive_cells = use_zero_for_inactive_cells;
    }

    fn open_grid_data(&mut self, grid: Arc<GridTopology>, union: &UnionActiveCells) {
        self.grid_data = Some(StatisticsGridData {
            grid,
            active_cells: [
                union.index(PorosityModel::Matrix).clone(),
                union.index(PorosityModel::Fracture).clone(),
            ],
        });
    }

    /// 基质模型下单个单元的统计值；未计算或未定义时返回 None
    pub fn aggregate_value(&self, property: &str, time_step: usize, kind: AggregateKind, ordinal: usize) -> Option<f64> {
        self.aggregate_value_for(PorosityModel::Matrix, property, time_step, kind, ordinal)
    }

    pub fn aggregate_value_for(
        &self,
        porosity: PorosityModel,
        property: &str,
        time_step: usize,
        kind: AggregateKind,
        ordinal: usize,
    ) -> Option<f64> {
        self.store.value(porosity, property, time_step, kind, ordinal)
    }

    /// 完整的统计数组，未定义单元为 [`crate::statistics::UNDEFINED_VALUE`]
    pub fn aggregate_array(
        &self,
        porosity: PorosityModel,
        property: &str,
        time_step: usize,
        kind: AggregateKind,
    ) -> Option<Vec<f64>> {
        let arrays = self.store.get(porosity, property, time_step)?;
        arrays.get(kind).map(<[f64]>::to_vec)
    }

    /// 已发布的统计结果名称，例如 PRESSURE_MEAN
    pub fn result_names(&self, porosity: PorosityModel) -> Vec<String> {
        let mut names = Vec::new();
        for property in self.store.properties(porosity) {
            let kinds: Vec<AggregateKind> = self
                .store
                .time_steps(porosity, &property)
                .first()
                .and_then(|&step| self.store.get(porosity, &property, step))
                .map(|arrays| arrays.kinds().collect())
                .unwrap_or_default();
            names.extend(kinds.into_iter().map(|kind| kind.result_name(&property)));
        }
        names
    }
}

impl EnsembleObserver for StatisticsCase {
    fn on_ensemble_event(&mut self, event: &EnsembleEvent) {
        if self.has_computed_statistics() {
            info!(case = %self.name, ?event, "[统计案例] 成员变化，清除已计算的统计结果");
        }
        self.clear_computed_statistics();
        self.grid_data = None;
    }
}
