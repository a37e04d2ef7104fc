use serde::{Deserialize, Serialize};

use crate::grid::GridTopology;

/// 孔隙模型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PorosityModel {
    Matrix,
    Fracture,
}

impl PorosityModel {
    pub const ALL: [PorosityModel; 2] = [PorosityModel::Matrix, PorosityModel::Fracture];

    pub fn index(self) -> usize {
        match self {
            PorosityModel::Matrix => 0,
            PorosityModel::Fracture => 1,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PorosityModel::Matrix => "matrix",
            PorosityModel::Fracture => "fracture",
        }
    }
}

/// 主网格中有效单元的 IJK 包围盒（包含两端）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ActiveBoundingBox {
    pub min: [usize; 3],
    pub max: [usize; 3],
}

/// 有效单元索引
///
/// 全局单元索引与紧凑的"有效序号"之间的稀疏映射。
/// 序号在每个子网格内连续，并按全局单元索引升序分配；
/// 在索引重建之前保持稳定。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActiveCellIndex {
    /// 全局单元索引 -> 有效序号
    cell_result_index: Vec<Option<usize>>,
    /// 每个子网格的有效单元数
    grid_active_counts: Vec<usize>,
    reservoir_active_count: usize,
    /// 派生数据：有效序号 -> 全局单元索引
    active_to_global: Vec<usize>,
    bounding_box: Option<ActiveBoundingBox>,
}

impl ActiveCellIndex {
    pub fn new(global_cell_count: usize, grid_count: usize) -> Self {
        Self {
            cell_result_index: vec![None; global_cell_count],
            grid_active_counts: vec![0; grid_count],
            ..Self::default()
        }
    }

    /// 根据全局有效标记构建索引
    /// 标记数量必须等于网格单元总数
    pub fn from_active_flags(grid: &GridTopology, flags: &[bool]) -> Result<Self, String> {
        let cell_count = grid.global_cell_count();
        if flags.len() != cell_count {
            return Err(format!(
                "有效标记数量不匹配: 网格需要 {} 个，但提供了 {} 个",
                cell_count,
                flags.len()
            ));
        }

        let mut index = Self::new(cell_count, grid.grid_count());
        let mut global_active_count = 0usize;
        let mut offset = 0usize;
        for (grid_index, sub_grid) in grid.sub_grids().iter().enumerate() {
            let mut local_active_count = 0usize;
            for local_cell in 0..sub_grid.cell_count() {
                if flags[offset + local_cell] {
                    index.set_cell_result_index(offset + local_cell, global_active_count + local_active_count);
                    local_active_count += 1;
                }
            }
            index.set_grid_active_count(grid_index, local_active_count);
            global_active_count += local_active_count;
            offset += sub_grid.cell_count();
        }
        index.compute_derived_data(grid);
        Ok(index)
    }

    pub fn global_cell_count(&self) -> usize {
        self.cell_result_index.len()
    }

    pub fn grid_count(&self) -> usize {
        self.grid_active_counts.len()
    }

    pub fn set_cell_result_index(&mut self, global_cell: usize, ordinal: usize) {
        self.cell_result_index[global_cell] = Some(ordinal);
    }

    pub fn set_grid_active_count(&mut self, grid_index: usize, count: usize) {
        self.grid_active_counts[grid_index] = count;
    }

    pub fn is_active(&self, global_cell: usize) -> bool {
        self.cell_result_index(global_cell).is_some()
    }

    /// 全局单元的有效序号，非有效单元返回 None
    pub fn cell_result_index(&self, global_cell: usize) -> Option<usize> {
        self.cell_result_index.get(global_cell).copied().flatten()
    }

    /// 有效序号对应的全局单元索引（需要先计算派生数据）
    pub fn global_cell_index(&self, ordinal: usize) -> Option<usize> {
        self.active_to_global.get(ordinal).copied()
    }

    /// 派生数据中按序号排列的全局单元索引
    pub fn active_global_cells(&self) -> &[usize] {
        &self.active_to_global
    }

    pub fn grid_active_count(&self, grid_index: usize) -> usize {
        self.grid_active_counts.get(grid_index).copied().unwrap_or(0)
    }

    pub fn grid_active_counts(&self) -> &[usize] {
        &self.grid_active_counts
    }

    /// 所有子网格的有效单元总数
    pub fn reservoir_active_count(&self) -> usize {
        self.reservoir_active_count
    }

    pub fn bounding_box(&self) -> Option<ActiveBoundingBox> {
        self.bounding_box
    }

    pub fn is_empty(&self) -> bool {
        self.reservoir_active_count == 0
    }

    /// 计算派生数据：反向查找表、有效单元总数和主网格包围盒
    pub fn compute_derived_data(&mut self, grid: &GridTopology) {
        self.reservoir_active_count = self.grid_active_counts.iter().sum();

        let mut active_to_global = vec![0usize; self.reservoir_active_count];
        for (global_cell, ordinal) in self.cell_result_index.iter().enumerate() {
            if let Some(ordinal) = ordinal {
                active_to_global[*ordinal] = global_cell;
            }
        }
        self.active_to_global = active_to_global;

        let main_grid = grid.main_grid();
        let main_cells = main_grid.cell_count().min(self.cell_result_index.len());
        let mut bounding_box: Option<ActiveBoundingBox> = None;
        for local_cell in (0..main_cells).filter(|&c| self.cell_result_index[c].is_some()) {
            let ijk = main_grid.ijk(local_cell);
            let bb = bounding_box.get_or_insert(ActiveBoundingBox { min: ijk, max: ijk });
            for axis in 0..3 {
                bb.min[axis] = bb.min[axis].min(ijk[axis]);
                bb.max[axis] = bb.max[axis].max(ijk[axis]);
            }
        }
        self.bounding_box = bounding_box;
    }

    /// 清空索引，所有计数归零
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::SubGrid;

    fn two_grid_topology() -> GridTopology {
        GridTopology::new(vec![
            SubGrid::new("MAIN", [2, 2, 1]),
            SubGrid::new("LGR1", [2, 1, 1]),
        ])
        .unwrap()
    }

    #[test]
    fn ordinals_are_contiguous_per_sub_grid() {
        let grid = two_grid_topology();
        let index =
            ActiveCellIndex::from_active_flags(&grid, &[false, true, true, false, true, true]).unwrap();

        assert_eq!(index.grid_active_counts(), &[2, 2]);
        assert_eq!(index.reservoir_active_count(), 4);
        assert_eq!(index.cell_result_index(0), None);
        assert_eq!(index.cell_result_index(1), Some(0));
        assert_eq!(index.cell_result_index(2), Some(1));
        assert_eq!(index.cell_result_index(4), Some(2));
        assert_eq!(index.cell_result_index(5), Some(3));
        assert_eq!(index.active_global_cells(), &[1, 2, 4, 5]);
    }

    #[test]
    fn reverse_lookup_is_strictly_increasing() {
        let grid = two_grid_topology();
        let index =
            ActiveCellIndex::from_active_flags(&grid, &[true, false, true, true, false, true]).unwrap();

        let globals = index.active_global_cells();
        assert!(globals.windows(2).all(|w| w[0] < w[1]));
        for (ordinal, &global) in globals.iter().enumerate() {
            assert_eq!(index.cell_result_index(global), Some(ordinal));
        }
    }

    #[test]
    fn bounding_box_covers_main_grid_active_cells() {
        let grid = two_grid_topology();
        let index =
            ActiveCellIndex::from_active_flags(&grid, &[false, true, false, false, true, false]).unwrap();

        assert_eq!(
            index.bounding_box(),
            Some(ActiveBoundingBox { min: [1, 0, 0], max: [1, 0, 0] })
        );
    }

    #[test]
    fn flag_count_must_match_grid() {
        let grid = two_grid_topology();
        assert!(ActiveCellIndex::from_active_flags(&grid, &[true; 3]).is_err());
    }

    #[test]
    fn clear_resets_counts() {
        let grid = two_grid_topology();
        let mut index = ActiveCellIndex::from_active_flags(&grid, &[true; 6]).unwrap();
        index.clear();

        assert!(index.is_empty());
        assert_eq!(index.global_cell_count(), 0);
        assert_eq!(index.global_cell_index(0), None);
    }
}
