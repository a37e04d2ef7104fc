use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use uuid::Uuid;

use crate::active_cells::{ActiveCellIndex, PorosityModel};
use crate::case::{CaseDataSource, CaseId, ResultCategory};
use crate::grid::GridTopology;

/// 内存中的模拟案例
///
/// 结果按时间步存储，每个时间步的数组按案例自身的有效序号索引
pub struct InMemoryCase {
    pub name: String,
    pub grid: Arc<GridTopology>,
    active: [Option<Arc<ActiveCellIndex>>; 2],
    time_step_count: usize,
    /// 按孔隙模型分组：属性名 -> 结果
    results: [HashMap<String, StoredResult>; 2],
}

struct StoredResult {
    category: ResultCategory,
    time_steps: Vec<Vec<f64>>,
}

impl InMemoryCase {
    /// 创建只有基质模型的案例
    pub fn new(name: impl Into<String>, grid: Arc<GridTopology>, matrix_active: ActiveCellIndex) -> Self {
        Self {
            name: name.into(),
            grid,
            active: [Some(Arc::new(matrix_active)), None],
            time_step_count: 0,
            results: [HashMap::new(), HashMap::new()],
        }
    }

    pub fn set_active_cells(&mut self, porosity: PorosityModel, active: ActiveCellIndex) {
        self.active[porosity.index()] = Some(Arc::new(active));
    }

    pub fn active_cells(&self, porosity: PorosityModel) -> Option<&Arc<ActiveCellIndex>> {
        self.active[porosity.index()].as_ref()
    }

    pub fn time_step_count(&self) -> usize {
        self.time_step_count
    }

    /// 添加一个属性的结果数据
    /// 每个时间步的数组长度必须等于该孔隙模型的有效单元数
    pub fn add_result(
        &mut self,
        porosity: PorosityModel,
        category: ResultCategory,
        name: impl Into<String>,
        time_steps: Vec<Vec<f64>>,
    ) -> Result<(), String> {
        let name = name.into();
        let active_count = self
            .active_cells(porosity)
            .map(|a| a.reservoir_active_count())
            .ok_or_else(|| format!("案例 {} 没有 {} 模型的有效单元", self.name, porosity.label()))?;

        if let Some((step, values)) = time_steps
            .iter()
            .enumerate()
            .find(|(_, values)| values.len() != active_count)
        {
            return Err(format!(
                "属性 {} 时间步 {} 的数据量不匹配: 需要 {} 个值，但提供了 {} 个",
                name,
                step,
                active_count,
                values.len()
            ));
        }

        if category.is_time_dependent() {
            self.time_step_count = self.time_step_count.max(time_steps.len());
        }
        self.results[porosity.index()].insert(name, StoredResult { category, time_steps });
        Ok(())
    }

    fn lookup(&self, porosity: PorosityModel, property: &str) -> Option<&[Vec<f64>]> {
        self.results[porosity.index()]
            .get(property)
            .map(|stored| stored.time_steps.as_slice())
    }
}

/// 内存案例数据源
pub struct InMemoryCaseSource {
    cases: RwLock<HashMap<CaseId, InMemoryCase>>,
}

impl InMemoryCaseSource {
    pub fn new() -> Self {
        Self {
            cases: RwLock::new(HashMap::new()),
        }
    }

    pub fn insert(&self, case: InMemoryCase) -> CaseId {
        let case_id = Uuid::new_v4();
        self.insert_with_id(case_id, case);
        case_id
    }

    /// 以指定标识插入案例（恢复工程时使用）
    pub fn insert_with_id(&self, case_id: CaseId, case: InMemoryCase) {
        self.cases.write().insert(case_id, case);
    }

    pub fn contains(&self, case_id: CaseId) -> bool {
        self.cases.read().contains_key(&case_id)
    }

    pub fn case_ids(&self) -> Vec<CaseId> {
        self.cases.read().keys().copied().collect()
    }

    pub fn case_count(&self) -> usize {
        self.cases.read().len()
    }
}

impl Default for InMemoryCaseSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CaseDataSource for InMemoryCaseSource {
    fn is_grid_loaded(&self, case: CaseId) -> bool {
        self.cases.read().contains_key(&case)
    }

    fn grid(&self, case: CaseId) -> Option<Arc<GridTopology>> {
        self.cases.read().get(&case).map(|c| c.grid.clone())
    }

    fn bind_grid(&self, case: CaseId, grid: Arc<GridTopology>) {
        if let Some(c) = self.cases.write().get_mut(&case) {
            c.grid = grid;
        }
    }

    fn active_cell_index(&self, case: CaseId, porosity: PorosityModel) -> Option<Arc<ActiveCellIndex>> {
        self.cases.read().get(&case)?.active_cells(porosity).cloned()
    }

    fn scalar_value(
        &self,
        case: CaseId,
        porosity: PorosityModel,
        property: &str,
        time_step: usize,
        global_cell: usize,
    ) -> Option<f64> {
        let cases = self.cases.read();
        let c = cases.get(&case)?;
        let ordinal = c.active_cells(porosity)?.cell_result_index(global_cell)?;
        c.lookup(porosity, property)?.get(time_step)?.get(ordinal).copied()
    }

    fn result_names(&self, case: CaseId, porosity: PorosityModel, category: ResultCategory) -> BTreeSet<String> {
        self.cases
            .read()
            .get(&case)
            .map(|c| {
                c.results[porosity.index()]
                    .iter()
                    .filter(|(_, stored)| stored.category == category)
                    .map(|(name, _)| name.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn time_step_count(&self, case: CaseId) -> usize {
        self.cases.read().get(&case).map(|c| c.time_step_count).unwrap_or(0)
    }

    fn case_name(&self, case: CaseId) -> Option<String> {
        self.cases.read().get(&case).map(|c| c.name.clone())
    }
}
