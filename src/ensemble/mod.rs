//! 案例组（网格案例组）
//!
//! 一组共享同一网格拓扑的模拟案例，以及从这些成员派生的统计案例。
//! 成员变化通过 [`EnsembleEvent`] 统一通知有效单元并集与所有统计案例。

mod union;

use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, info};
use uuid::Uuid;

use crate::active_cells::{ActiveCellIndex, PorosityModel};
use crate::case::{CaseDataSource, CaseId};
use crate::error::{EnsembleError, GridMismatchError, StatisticsError};
use crate::grid::{GridTopology, GridTopologyRegistry};
use crate::progress::ProgressReporter;
use crate::statistics::{ComputeContext, ComputeOutcome, ResultStore, StatisticsCase};

pub use union::{UnionActiveCellComputer, UnionActiveCells};

/// 自动创建的统计案例名称
pub const DEFAULT_STATISTICS_CASE_NAME: &str = "Statistics 1";

/// 成员变化事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsembleEvent {
    CaseAdded(CaseId),
    CaseRemoved(CaseId),
}

/// 关注成员变化的对象
pub trait EnsembleObserver {
    fn on_ensemble_event(&mut self, event: &EnsembleEvent);
}

#[derive(Debug)]
pub struct CaseEnsemble {
    id: Uuid,
    name: String,
    /// 加入顺序有意义：第一个成员是主案例
    members: Vec<CaseId>,
    statistics_cases: Vec<StatisticsCase>,
    shared_grid: Option<Arc<GridTopology>>,
    union: UnionActiveCells,
}

impl CaseEnsemble {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4(), name)
    }

    pub fn with_id(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            members: Vec::new(),
            statistics_cases: Vec::new(),
            shared_grid: None,
            union: UnionActiveCells::default(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn members(&self) -> &[CaseId] {
        &self.members
    }

    pub fn main_case(&self) -> Option<CaseId> {
        self.members.first().copied()
    }

    pub fn contains(&self, case: CaseId) -> bool {
        self.members.contains(&case)
    }

    pub fn shared_grid(&self) -> Option<&Arc<GridTopology>> {
        self.shared_grid.as_ref()
    }

    /// 添加成员案例
    ///
    /// 第一个成员的网格通过注册表登记或共享；之后的成员必须与共享网格结构一致，
    /// 否则返回 [`EnsembleError::GridMismatch`]，案例组状态不变。
    pub fn add_case(
        &mut self,
        case: CaseId,
        source: &dyn CaseDataSource,
        registry: &GridTopologyRegistry,
    ) -> Result<(), EnsembleError> {
        if self.contains(case) {
            return Err(EnsembleError::DuplicateCase(case));
        }
        if !source.is_grid_loaded(case) {
            return Err(EnsembleError::GridNotLoaded(case));
        }
        let grid = source.grid(case).ok_or(EnsembleError::GridNotLoaded(case))?;

        let shared = match &self.shared_grid {
            Some(shared) => {
                if !Arc::ptr_eq(shared, &grid) && !shared.is_structurally_equal(&grid) {
                    return Err(GridMismatchError {
                        case_id: case,
                        expected: shared.summary(),
                        found: grid.summary(),
                    }
                    .into());
                }
                shared.clone()
            }
            None => registry.register_or_share(grid.clone()),
        };

        if !Arc::ptr_eq(&shared, &grid) {
            source.bind_grid(case, shared.clone());
        }
        self.shared_grid = Some(shared);
        self.members.push(case);

        if self.statistics_cases.is_empty() {
            self.create_statistics_case(DEFAULT_STATISTICS_CASE_NAME);
        }

        info!(ensemble = %self.name, %case, members = self.members.len(), "[案例组] 添加成员");
        self.raise(EnsembleEvent::CaseAdded(case));
        Ok(())
    }

    /// 移除成员案例；组为空时释放共享网格
    pub fn remove_case(&mut self, case: CaseId) -> Result<(), EnsembleError> {
        let position = self
            .members
            .iter()
            .position(|&m| m == case)
            .ok_or(EnsembleError::CaseNotFound(case))?;
        self.members.remove(position);

        if self.members.is_empty() {
            self.shared_grid = None;
        }

        info!(ensemble = %self.name, %case, members = self.members.len(), "[案例组] 移除成员");
        self.raise(EnsembleEvent::CaseRemoved(case));
        Ok(())
    }

    fn raise(&mut self, event: EnsembleEvent) {
        self.union.on_ensemble_event(&event);
        for statistics_case in &mut self.statistics_cases {
            statistics_case.on_ensemble_event(&event);
        }
    }

    pub fn statistics_cases(&self) -> &[StatisticsCase] {
        &self.statistics_cases
    }

    pub fn create_statistics_case(&mut self, name: impl Into<String>) -> Uuid {
        self.add_statistics_case(StatisticsCase::new(name))
    }

    pub(crate) fn add_statistics_case(&mut self, statistics_case: StatisticsCase) -> Uuid {
        let id = statistics_case.id();
        debug!(ensemble = %self.name, case = statistics_case.name(), "[案例组] 创建统计案例");
        self.statistics_cases.push(statistics_case);
        id
    }

    pub fn remove_statistics_case(&mut self, id: Uuid) -> Result<StatisticsCase, EnsembleError> {
        let position = self
            .statistics_cases
            .iter()
            .position(|s| s.id() == id)
            .ok_or(EnsembleError::StatisticsCaseNotFound(id))?;
        Ok(self.statistics_cases.remove(position))
    }

    pub(crate) fn clear_statistics_cases(&mut self) {
        self.statistics_cases.clear();
    }

    /// 以持久化的结果恢复统计案例，并集必须已是最新状态
    pub fn restore_statistics_results(&mut self, id: Uuid, store: ResultStore) -> Result<(), EnsembleError> {
        if self.union.is_stale() {
            return Err(StatisticsError::StaleUnionIndex.into());
        }
        let Some(grid) = self.shared_grid.clone() else {
            return Ok(());
        };
        let expected = PorosityModel::ALL.map(|porosity| self.union_active_cells(porosity).reservoir_active_count());
        store
            .check_lengths(expected)
            .map_err(|(porosity, property, expected, found)| EnsembleError::ResultLengthMismatch {
                porosity,
                property,
                expected,
                found,
            })?;
        let statistics_case = self
            .statistics_cases
            .iter_mut()
            .find(|s| s.id() == id)
            .ok_or(EnsembleError::StatisticsCaseNotFound(id))?;
        statistics_case.restore_results(store, grid, &self.union);
        Ok(())
    }

    pub fn statistics_case(&self, id: Uuid) -> Option<&StatisticsCase> {
        self.statistics_cases.iter().find(|s| s.id() == id)
    }

    pub fn statistics_case_mut(&mut self, id: Uuid) -> Option<&mut StatisticsCase> {
        self.statistics_cases.iter_mut().find(|s| s.id() == id)
    }

    pub fn union(&self) -> &UnionActiveCells {
        &self.union
    }

    pub fn union_active_cells(&self, porosity: PorosityModel) -> &Arc<ActiveCellIndex> {
        self.union.index(porosity)
    }

    pub fn is_union_stale(&self) -> bool {
        self.union.is_stale()
    }

    pub fn clear_union_of_active_cells(&mut self) {
        self.union.clear();
    }

    /// 按需重新计算有效单元并集
    pub fn compute_union_of_active_cells(&mut self, source: &dyn CaseDataSource, progress: &dyn ProgressReporter) {
        UnionActiveCellComputer::new(source, progress).compute(
            &mut self.union,
            self.shared_grid.as_deref(),
            &self.members,
        );
    }

    /// 计算一个统计案例
    pub fn compute_statistics(
        &mut self,
        id: Uuid,
        source: &dyn CaseDataSource,
        progress: &dyn ProgressReporter,
    ) -> Result<ComputeOutcome, EnsembleError> {
        self.compute_union_of_active_cells(source, progress);

        let context = ComputeContext {
            source,
            members: &self.members,
            grid: self.shared_grid.as_ref(),
            union: &self.union,
            progress,
        };
        let statistics_case = self
            .statistics_cases
            .iter_mut()
            .find(|s| s.id() == id)
            .ok_or(EnsembleError::StatisticsCaseNotFound(id))?;
        Ok(statistics_case.compute_statistics(context)?)
    }

    /// 并行计算全部统计案例；各统计案例的存储互不相交，并集在开始前已更新且只读
    pub fn compute_all_statistics(
        &mut self,
        source: &dyn CaseDataSource,
        progress: &dyn ProgressReporter,
    ) -> Vec<(Uuid, Result<ComputeOutcome, StatisticsError>)> {
        self.compute_union_of_active_cells(source, progress);

        let context = ComputeContext {
            source,
            members: &self.members,
            grid: self.shared_grid.as_ref(),
            union: &self.union,
            progress,
        };
        self.statistics_cases
            .par_iter_mut()
            .map(|statistics_case| (statistics_case.id(), statistics_case.compute_statistics(context)))
            .collect()
    }
}
