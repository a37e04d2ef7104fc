//! 集合统计：统计配置、单元级数学、结果存储、计算器与统计案例

mod case;
mod config;
mod evaluator;
pub mod math;
mod store;

pub use case::{CalculationStatus, ComputeContext, ComputeOutcome, StatisticsCase, StatisticsGridData};
pub use config::{
    AggregateKind, PercentileConfig, PercentileMethod, PropertySelection, ResultSpec, UNDEFINED_VALUE,
    is_undefined,
};
pub use evaluator::{EvaluationReport, EvaluationSettings, StatisticsEvaluator, UnitTiming};
pub use store::{AggregateArrays, ResultStore};
