use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// 节点坐标比较的绝对容差
pub const NODE_TOLERANCE: f64 = 1e-6;

/// 子网格（主网格或 LGR）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubGrid {
    pub name: String,
    /// 网格维度 [ni, nj, nk]
    pub dimensions: [usize; 3],
}

impl SubGrid {
    pub fn new(name: impl Into<String>, dimensions: [usize; 3]) -> Self {
        Self {
            name: name.into(),
            dimensions,
        }
    }

    pub fn cell_count(&self) -> usize {
        self.dimensions[0] * self.dimensions[1] * self.dimensions[2]
    }

    /// 局部单元索引转 IJK，按 C 顺序（i 变化最快）
    /// index = k * ni * nj + j * ni + i
    pub fn ijk(&self, local_cell: usize) -> [usize; 3] {
        let [ni, nj, _] = self.dimensions;
        let i = local_cell % ni;
        let j = (local_cell / ni) % nj;
        let k = local_cell / (ni * nj);
        [i, j, k]
    }
}

/// 只需计算一次的派生数据
#[derive(Debug, Clone)]
pub struct GridDerivedData {
    /// 每个子网格第一个单元的全局索引
    pub cell_offsets: Vec<usize>,
}

/// 网格拓扑
///
/// 构建后不可变，多个案例通过 `Arc` 共享同一个实例
#[derive(Debug)]
pub struct GridTopology {
    sub_grids: Vec<SubGrid>,
    /// 主网格节点坐标，可为空
    nodes: Vec<[f64; 3]>,
    derived: OnceLock<GridDerivedData>,
}

impl GridTopology {
    /// 创建网格拓扑，第一个子网格为主网格
    pub fn new(sub_grids: Vec<SubGrid>) -> Result<Self, String> {
        Self::with_nodes(sub_grids, Vec::new())
    }

    pub fn with_nodes(sub_grids: Vec<SubGrid>, nodes: Vec<[f64; 3]>) -> Result<Self, String> {
        if sub_grids.is_empty() {
            return Err("网格至少需要一个子网格".to_string());
        }
        if let Some(empty) = sub_grids.iter().find(|g| g.cell_count() == 0) {
            return Err(format!(
                "子网格 {} 的维度 {:?} 不包含任何单元",
                empty.name, empty.dimensions
            ));
        }

        Ok(Self {
            sub_grids,
            nodes,
            derived: OnceLock::new(),
        })
    }

    pub fn sub_grids(&self) -> &[SubGrid] {
        &self.sub_grids
    }

    pub fn main_grid(&self) -> &SubGrid {
        &self.sub_grids[0]
    }

    pub fn grid_count(&self) -> usize {
        self.sub_grids.len()
    }

    pub fn nodes(&self) -> &[[f64; 3]] {
        &self.nodes
    }

    /// 所有子网格的单元总数
    pub fn global_cell_count(&self) -> usize {
        self.sub_grids.iter().map(SubGrid::cell_count).sum()
    }

    /// 子网格第一个单元的全局索引
    pub fn cell_offset(&self, grid_index: usize) -> usize {
        self.derived_data().cell_offsets[grid_index]
    }

    /// 获取派生数据，首次调用时计算
    pub fn derived_data(&self) -> &GridDerivedData {
        self.derived.get_or_init(|| {
            debug!(grids = self.sub_grids.len(), "计算网格派生数据");
            let mut cell_offsets = Vec::with_capacity(self.sub_grids.len());
            let mut offset = 0usize;
            for grid in &self.sub_grids {
                cell_offsets.push(offset);
                offset += grid.cell_count();
            }
            GridDerivedData { cell_offsets }
        })
    }

    /// 派生数据是否已经计算过
    pub fn has_derived_data(&self) -> bool {
        self.derived.get().is_some()
    }

    /// 仅基于维度的指纹，用作注册表分桶键
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.sub_grids.len().hash(&mut hasher);
        for grid in &self.sub_grids {
            grid.dimensions.hash(&mut hasher);
        }
        hasher.finish()
    }

    /// 结构相等判定：子网格数量、维度一致，节点坐标在容差内相等
    pub fn is_structurally_equal(&self, other: &GridTopology) -> bool {
        if self.sub_grids.len() != other.sub_grids.len() {
            return false;
        }
        let dimensions_equal = self
            .sub_grids
            .iter()
            .zip(&other.sub_grids)
            .all(|(a, b)| a.dimensions == b.dimensions);
        if !dimensions_equal {
            return false;
        }

        if self.nodes.is_empty() || other.nodes.is_empty() {
            return true;
        }
        if self.nodes.len() != other.nodes.len() {
            return false;
        }
        self.nodes.iter().zip(&other.nodes).all(|(a, b)| {
            a.iter()
                .zip(b)
                .all(|(x, y)| (x - y).abs() <= NODE_TOLERANCE)
        })
    }

    pub fn summary(&self) -> GridSummary {
        GridSummary {
            grid_count: self.sub_grids.len(),
            main_dimensions: self.main_grid().dimensions,
            cell_count: self.global_cell_count(),
        }
    }
}

/// 用于错误信息与接口响应的网格概要
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GridSummary {
    pub grid_count: usize,
    pub main_dimensions: [usize; 3],
    pub cell_count: usize,
}

impl fmt::Display for GridSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} 个子网格, 主网格 {:?}, 共 {} 个单元",
            self.grid_count, self.main_dimensions, self.cell_count
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(dims: [usize; 3]) -> GridTopology {
        GridTopology::new(vec![SubGrid::new("MAIN", dims)]).unwrap()
    }

    #[test]
    fn rejects_empty_grids() {
        assert!(GridTopology::new(Vec::new()).is_err());
        assert!(GridTopology::new(vec![SubGrid::new("MAIN", [2, 0, 1])]).is_err());
    }

    #[test]
    fn equal_dimensions_are_structurally_equal() {
        assert!(grid([2, 3, 4]).is_structurally_equal(&grid([2, 3, 4])));
        assert!(!grid([2, 3, 4]).is_structurally_equal(&grid([4, 3, 2])));
        assert_eq!(grid([2, 3, 4]).fingerprint(), grid([2, 3, 4]).fingerprint());
    }

    #[test]
    fn node_coordinates_are_compared_with_tolerance() {
        let sub = vec![SubGrid::new("MAIN", [1, 1, 1])];
        let a = GridTopology::with_nodes(sub.clone(), vec![[0.0, 0.0, 0.0], [1.0, 1.0, 1.0]]).unwrap();
        let b = GridTopology::with_nodes(sub.clone(), vec![[0.0, 0.0, 0.0], [1.0, 1.0, 1.0 + 1e-9]]).unwrap();
        let c = GridTopology::with_nodes(sub, vec![[0.0, 0.0, 0.0], [1.0, 1.0, 1.5]]).unwrap();

        assert!(a.is_structurally_equal(&b));
        assert!(!a.is_structurally_equal(&c));
    }

    #[test]
    fn cell_offsets_span_all_sub_grids() {
        let topology = GridTopology::new(vec![
            SubGrid::new("MAIN", [2, 2, 1]),
            SubGrid::new("LGR1", [3, 1, 1]),
        ])
        .unwrap();

        assert!(!topology.has_derived_data());
        assert_eq!(topology.global_cell_count(), 7);
        assert_eq!(topology.cell_offset(1), 4);
        assert!(topology.has_derived_data());
    }

    #[test]
    fn ijk_uses_i_fastest_ordering() {
        let sub = SubGrid::new("MAIN", [2, 3, 2]);
        assert_eq!(sub.ijk(0), [0, 0, 0]);
        assert_eq!(sub.ijk(1), [1, 0, 0]);
        assert_eq!(sub.ijk(2), [0, 1, 0]);
        assert_eq!(sub.ijk(7), [1, 0, 1]);
    }
}
