use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::grid::GridTopology;

/// 网格拓扑注册表
/// 对结构相同的网格去重，使多个案例共享同一个实例
///
/// 注册表只持有弱引用：最后一个释放网格的案例负责释放网格本身
pub struct GridTopologyRegistry {
    /// 指纹 -> 同一指纹下已注册的网格
    grids: RwLock<HashMap<u64, Vec<Weak<GridTopology>>>>,
}

impl GridTopologyRegistry {
    pub fn new() -> Self {
        Self {
            grids: RwLock::new(HashMap::new()),
        }
    }

    /// 查找结构相同的已注册网格
    pub fn find_equal(&self, candidate: &GridTopology) -> Option<Arc<GridTopology>> {
        let grids = self.grids.read();
        grids
            .get(&candidate.fingerprint())?
            .iter()
            .filter_map(Weak::upgrade)
            .find(|existing| existing.is_structurally_equal(candidate))
    }

    /// 注册候选网格，或返回已注册的相同网格
    ///
    /// 命中时候选网格被丢弃，其派生数据不会被计算；
    /// 未命中时候选网格成为新的注册实例，派生数据在此计算一次
    pub fn register_or_share(&self, candidate: Arc<GridTopology>) -> Arc<GridTopology> {
        let key = candidate.fingerprint();
        let mut grids = self.grids.write();
        let bucket = grids.entry(key).or_default();

        if let Some(existing) = bucket
            .iter()
            .filter_map(Weak::upgrade)
            .find(|existing| Arc::ptr_eq(existing, &candidate) || existing.is_structurally_equal(&candidate))
        {
            debug!(fingerprint = key, "[网格注册] 复用已注册的网格");
            return existing;
        }

        candidate.derived_data();
        bucket.push(Arc::downgrade(&candidate));
        info!(
            fingerprint = key,
            cells = candidate.global_cell_count(),
            "[网格注册] 注册新网格"
        );
        candidate
    }

    /// 清理已被释放的网格条目
    /// 返回清理的条目数量
    pub fn prune_released(&self) -> usize {
        let mut grids = self.grids.write();
        let before_count: usize = grids.values().map(Vec::len).sum();

        for bucket in grids.values_mut() {
            bucket.retain(|grid| grid.strong_count() > 0);
        }
        grids.retain(|_, bucket| !bucket.is_empty());

        let after_count: usize = grids.values().map(Vec::len).sum();
        before_count - after_count
    }

    /// 当前仍存活的注册网格数量
    pub fn registered_count(&self) -> usize {
        self.grids
            .read()
            .values()
            .flat_map(|bucket| bucket.iter())
            .filter(|grid| grid.strong_count() > 0)
            .count()
    }
}

impl Default for GridTopologyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::SubGrid;

    fn grid(dims: [usize; 3]) -> Arc<GridTopology> {
        Arc::new(GridTopology::new(vec![SubGrid::new("MAIN", dims)]).unwrap())
    }

    #[test]
    fn equal_grids_are_shared() {
        let registry = GridTopologyRegistry::new();
        let first = registry.register_or_share(grid([2, 2, 2]));
        let candidate = grid([2, 2, 2]);
        let second = registry.register_or_share(candidate.clone());

        assert!(Arc::ptr_eq(&first, &second));
        assert!(first.has_derived_data());
        assert!(!candidate.has_derived_data());
        assert_eq!(registry.registered_count(), 1);
    }

    #[test]
    fn different_grids_are_registered_separately() {
        let registry = GridTopologyRegistry::new();
        let a = registry.register_or_share(grid([2, 2, 2]));
        let b = registry.register_or_share(grid([3, 2, 2]));

        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(registry.registered_count(), 2);
    }

    #[test]
    fn released_grids_are_pruned() {
        let registry = GridTopologyRegistry::new();
        let kept = registry.register_or_share(grid([2, 2, 2]));
        let dropped = registry.register_or_share(grid([1, 1, 1]));
        drop(dropped);

        assert_eq!(registry.registered_count(), 1);
        assert_eq!(registry.prune_released(), 1);
        assert_eq!(registry.prune_released(), 0);
        assert!(registry.find_equal(&kept).is_some());
    }
}
