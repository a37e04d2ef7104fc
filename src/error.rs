use thiserror::Error;
use uuid::Uuid;

use crate::active_cells::PorosityModel;
use crate::case::ResultCategory;
use crate::grid::GridSummary;

/// 新案例的网格拓扑与组内共享网格不一致
///
/// 添加被拒绝，组的状态保持不变
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("案例 {case_id} 的网格拓扑不一致: 期望 {expected}, 实际 {found}")]
pub struct GridMismatchError {
    /// 被拒绝的案例
    pub case_id: Uuid,
    /// 组内共享网格的概要
    pub expected: GridSummary,
    /// 候选案例网格的概要
    pub found: GridSummary,
}

/// 案例组（CaseEnsemble）操作错误
#[derive(Debug, Error)]
pub enum EnsembleError {
    #[error("{0}")]
    GridMismatch(#[from] GridMismatchError),

    #[error("案例 {0} 的网格尚未加载")]
    GridNotLoaded(Uuid),

    #[error("案例 {0} 已经在组内")]
    DuplicateCase(Uuid),

    #[error("组内不存在案例 {0}")]
    CaseNotFound(Uuid),

    #[error("组内不存在统计案例 {0}")]
    StatisticsCaseNotFound(Uuid),

    #[error("统计结果 {property} ({porosity:?}) 的数组长度为 {found}，与并集有效单元数 {expected} 不一致")]
    ResultLengthMismatch {
        porosity: PorosityModel,
        property: String,
        expected: usize,
        found: usize,
    },

    #[error(transparent)]
    Statistics(#[from] StatisticsError),
}

/// 统计计算错误
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StatisticsError {
    /// 成员变更后并集索引尚未重建，属于内部不变量被破坏
    #[error("有效单元并集索引已过期，必须先重新计算")]
    StaleUnionIndex,

    #[error("统计结果已计算，属性选择为只读；请先清除结果")]
    SelectionLocked,

    #[error("无效的百分位数 {name}: {value}（必须在 0 到 100 之间）")]
    InvalidPercentile { name: &'static str, value: f64 },

    #[error("属性 {name} 已在类别 {category:?} 中选中")]
    DuplicateProperty { name: String, category: ResultCategory },

    #[error("统计计算已被取消")]
    Cancelled,
}

/// 工程与结果存储的持久化错误
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("读写文件失败: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON 格式错误: {0}")]
    Json(#[from] serde_json::Error),

    #[error("结果数据格式错误: {0}")]
    Format(String),

    #[error(transparent)]
    Ensemble(#[from] EnsembleError),
}

/// 案例文件读取错误
#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("读取案例文件失败: {0}")]
    Io(#[from] std::io::Error),

    #[error("案例文件格式错误: {0}")]
    Json(#[from] serde_json::Error),

    #[error("案例数据无效: {0}")]
    Invalid(String),
}
