use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use crate::active_cells::{ActiveCellIndex, PorosityModel};
use crate::case::{CaseDataSource, CaseId};
use crate::ensemble::{EnsembleEvent, EnsembleObserver};
use crate::grid::GridTopology;
use crate::progress::ProgressReporter;

/// 案例组的有效单元并集（基质与裂缝各一份）
///
/// 索引以 `Arc` 持有，重建时整体替换；正在进行的计算持有旧索引不受影响。
#[derive(Debug, Clone)]
pub struct UnionActiveCells {
    indices: [Arc<ActiveCellIndex>; 2],
    computed: bool,
}

impl Default for UnionActiveCells {
    fn default() -> Self {
        Self {
            indices: [Arc::default(), Arc::default()],
            computed: false,
        }
    }
}

impl UnionActiveCells {
    pub fn index(&self, porosity: PorosityModel) -> &Arc<ActiveCellIndex> {
        &self.indices[porosity.index()]
    }

    pub fn is_computed(&self) -> bool {
        self.computed
    }

    /// 成员变化后、重新计算前为过期状态
    pub fn is_stale(&self) -> bool {
        !self.computed
    }

    /// 显式清空并集，下次访问时重新计算
    pub fn clear(&mut self) {
        self.indices = [Arc::default(), Arc::default()];
        self.computed = false;
    }

    fn mark_stale(&mut self) {
        self.computed = false;
    }
}

impl EnsembleObserver for UnionActiveCells {
    fn on_ensemble_event(&mut self, event: &EnsembleEvent) {
        debug!(?event, "[有效单元并集] 成员变化，标记为过期");
        self.mark_stale();
    }
}

/// 有效单元并集计算
pub struct UnionActiveCellComputer<'a> {
    source: &'a dyn CaseDataSource,
    progress: &'a dyn ProgressReporter,
}

impl<'a> UnionActiveCellComputer<'a> {
    pub fn new(source: &'a dyn CaseDataSource, progress: &'a dyn ProgressReporter) -> Self {
        Self { source, progress }
    }

    /// 按需重新计算并集；已计算且未过期时直接返回
    ///
    /// 没有成员或没有共享网格时，并集被清空为零计数。
    pub fn compute(&self, union: &mut UnionActiveCells, grid: Option<&GridTopology>, members: &[CaseId]) {
        if union.computed {
            return;
        }

        let grid = match grid {
            Some(grid) if !members.is_empty() => grid,
            _ => {
                union.indices = [Arc::default(), Arc::default()];
                union.computed = true;
                debug!("[有效单元并集] 案例组为空，并集已清空");
                return;
            }
        };

        let start = Instant::now();
        let mut task = self
            .progress
            .begin_task(grid.grid_count() * PorosityModel::ALL.len(), "计算有效单元并集");

        for porosity in PorosityModel::ALL {
            let member_indices: Vec<Arc<ActiveCellIndex>> = members
                .iter()
                .filter_map(|&case| self.source.active_cell_index(case, porosity))
                .collect();

            let mut index = ActiveCellIndex::new(grid.global_cell_count(), grid.grid_count());
            let mut global_active_count = 0usize;
            let mut offset = 0usize;

            for (grid_index, sub_grid) in grid.sub_grids().iter().enumerate() {
                let cell_count = sub_grid.cell_count();

                // 任一成员有效即为有效，找到第一个即停止
                let mask: Vec<bool> = (0..cell_count)
                    .map(|local| member_indices.iter().any(|m| m.is_active(offset + local)))
                    .collect();

                let mut local_active_count = 0usize;
                for (local, _) in mask.iter().enumerate().filter(|(_, active)| **active) {
                    index.set_cell_result_index(offset + local, global_active_count + local_active_count);
                    local_active_count += 1;
                }

                index.set_grid_active_count(grid_index, local_active_count);
                global_active_count += local_active_count;
                offset += cell_count;
                task.increment();
            }

            index.compute_derived_data(grid);
            debug!(
                porosity = porosity.label(),
                active = index.reservoir_active_count(),
                "[有效单元并集] 孔隙模型计算完成"
            );
            union.indices[porosity.index()] = Arc::new(index);
        }

        union.computed = true;
        info!(
            members = members.len(),
            matrix_active = union.index(PorosityModel::Matrix).reservoir_active_count(),
            fracture_active = union.index(PorosityModel::Fracture).reservoir_active_count(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "[有效单元并集] 重新计算完成"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::case::{InMemoryCase, InMemoryCaseSource};
    use crate::grid::SubGrid;
    use crate::progress::NoProgress;

    fn grid() -> Arc<GridTopology> {
        Arc::new(GridTopology::new(vec![SubGrid::new("MAIN", [4, 1, 1]), SubGrid::new("LGR", [2, 1, 1])]).unwrap())
    }

    fn add_case(source: &InMemoryCaseSource, grid: &Arc<GridTopology>, flags: &[bool]) -> CaseId {
        let active = ActiveCellIndex::from_active_flags(grid, flags).unwrap();
        source.insert(InMemoryCase::new("case", grid.clone(), active))
    }

    #[test]
    fn union_is_logical_or_of_members() {
        let source = InMemoryCaseSource::new();
        let grid = grid();
        let a = add_case(&source, &grid, &[true, true, true, false, false, true]);
        let b = add_case(&source, &grid, &[false, true, true, true, false, false]);

        let mut union = UnionActiveCells::default();
        UnionActiveCellComputer::new(&source, &NoProgress).compute(&mut union, Some(&grid), &[a, b]);

        let matrix = union.index(PorosityModel::Matrix);
        assert_eq!(matrix.active_global_cells(), &[0, 1, 2, 3, 5]);
        assert_eq!(matrix.grid_active_counts(), &[4, 1]);
        assert!(union.index(PorosityModel::Fracture).is_empty());
        assert!(!union.is_stale());
    }

    #[test]
    fn recomputation_is_skipped_until_stale() {
        let source = InMemoryCaseSource::new();
        let grid = grid();
        let a = add_case(&source, &grid, &[true, false, false, false, false, false]);
        let b = add_case(&source, &grid, &[false, false, false, false, false, true]);

        let computer = UnionActiveCellComputer::new(&source, &NoProgress);
        let mut union = UnionActiveCells::default();
        computer.compute(&mut union, Some(&grid), &[a]);
        let first = union.index(PorosityModel::Matrix).clone();

        computer.compute(&mut union, Some(&grid), &[a, b]);
        assert!(Arc::ptr_eq(&first, union.index(PorosityModel::Matrix)));

        union.on_ensemble_event(&EnsembleEvent::CaseAdded(b));
        computer.compute(&mut union, Some(&grid), &[a, b]);
        assert_eq!(union.index(PorosityModel::Matrix).reservoir_active_count(), 2);
    }

    #[test]
    fn empty_ensemble_clears_union() {
        let source = InMemoryCaseSource::new();
        let grid = grid();
        let a = add_case(&source, &grid, &[true; 6]);

        let computer = UnionActiveCellComputer::new(&source, &NoProgress);
        let mut union = UnionActiveCells::default();
        computer.compute(&mut union, Some(&grid), &[a]);
        union.on_ensemble_event(&EnsembleEvent::CaseRemoved(a));
        computer.compute(&mut union, None, &[]);

        assert!(union.index(PorosityModel::Matrix).is_empty());
        assert_eq!(union.index(PorosityModel::Matrix).grid_count(), 0);
    }
}
