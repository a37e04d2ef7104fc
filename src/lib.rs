//! 案例组统计计算
//!
//! 对共享同一网格的多个模拟案例，逐单元计算最小值、最大值、均值、标准差
//! 与百分位数等统计量，并通过 HTTP 服务提供计算任务与结果查询。

pub mod active_cells;
pub mod case;
pub mod ensemble;
pub mod error;
pub mod grid;
pub mod persistence;
pub mod progress;
pub mod project;
pub mod readers;
pub mod statistics;
pub mod utils;

pub mod app_state;
pub mod config;
pub mod handlers;
pub mod performance;
pub mod routes;
pub mod task;

pub use active_cells::{ActiveCellIndex, PorosityModel};
pub use case::{CaseDataSource, CaseId, InMemoryCase, InMemoryCaseSource, ResultCategory};
pub use ensemble::{CaseEnsemble, EnsembleEvent, EnsembleObserver};
pub use error::{EnsembleError, GridMismatchError, PersistenceError, ReaderError, StatisticsError};
pub use grid::{GridTopology, GridTopologyRegistry, SubGrid};
pub use progress::{LoggingProgress, NoProgress, ProgressReporter, ProgressTask};
pub use project::Project;
pub use statistics::{AggregateKind, CalculationStatus, PercentileConfig, PercentileMethod, StatisticsCase};
