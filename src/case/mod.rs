//! 案例数据源接口
//!
//! 网格读取与结果存储不在本库范围内，统计引擎只通过 [`CaseDataSource`]
//! 读取每个案例的网格、有效单元索引与标量结果。

mod memory;

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::active_cells::{ActiveCellIndex, PorosityModel};
use crate::grid::GridTopology;

pub use memory::{InMemoryCase, InMemoryCaseSource};

/// 案例标识
pub type CaseId = Uuid;

/// 结果类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultCategory {
    DynamicNative,
    StaticNative,
    Generated,
    InputProperty,
}

impl ResultCategory {
    pub const ALL: [ResultCategory; 4] = [
        ResultCategory::DynamicNative,
        ResultCategory::StaticNative,
        ResultCategory::Generated,
        ResultCategory::InputProperty,
    ];

    /// 只有动态结果按时间步变化，其余类别只有时间步 0 有意义
    pub fn is_time_dependent(self) -> bool {
        matches!(self, ResultCategory::DynamicNative)
    }

    pub fn label(self) -> &'static str {
        match self {
            ResultCategory::DynamicNative => "Dynamic properties",
            ResultCategory::StaticNative => "Static properties",
            ResultCategory::Generated => "Generated properties",
            ResultCategory::InputProperty => "Input properties",
        }
    }
}

/// 案例数据源
///
/// 标量值按全局单元索引读取；单元在该案例中非有效、属性不存在
/// 或时间步越界时返回 None。
pub trait CaseDataSource: Send + Sync {
    /// 案例网格是否已加载
    fn is_grid_loaded(&self, case: CaseId) -> bool;

    /// 案例当前绑定的网格
    fn grid(&self, case: CaseId) -> Option<Arc<GridTopology>>;

    /// 把案例重新绑定到共享网格实例
    fn bind_grid(&self, case: CaseId, grid: Arc<GridTopology>);

    /// 案例自身的有效单元索引
    fn active_cell_index(&self, case: CaseId, porosity: PorosityModel) -> Option<Arc<ActiveCellIndex>>;

    fn scalar_value(
        &self,
        case: CaseId,
        porosity: PorosityModel,
        property: &str,
        time_step: usize,
        global_cell: usize,
    ) -> Option<f64>;

    /// 可供选择的结果名称
    fn result_names(&self, case: CaseId, porosity: PorosityModel, category: ResultCategory) -> BTreeSet<String>;

    fn time_step_count(&self, case: CaseId) -> usize;

    fn case_name(&self, case: CaseId) -> Option<String>;

    /// 案例是否存储了该属性
    fn has_result(&self, case: CaseId, porosity: PorosityModel, category: ResultCategory, property: &str) -> bool {
        self.result_names(case, porosity, category).contains(property)
    }
}
