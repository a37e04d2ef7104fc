//! 进度汇报接口
//!
//! 并集计算与统计计算按"工作单元"（子网格、属性 × 时间步）汇报进度。
//! 汇报方可以在工作单元之间请求提前终止。

use tracing::debug;

/// 进度汇报方
pub trait ProgressReporter: Send + Sync {
    /// 开始一个包含 `total_units` 个工作单元的任务
    fn begin_task(&self, total_units: usize, label: &str) -> Box<dyn ProgressTask + '_>;
}

/// 单个任务的进度句柄
pub trait ProgressTask: Send {
    /// 完成一个工作单元
    fn increment(&mut self);

    /// 是否请求提前终止，只在工作单元之间检查
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// 不汇报任何进度
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

struct NoProgressTask;

impl ProgressTask for NoProgressTask {
    fn increment(&mut self) {}
}

impl ProgressReporter for NoProgress {
    fn begin_task(&self, _total_units: usize, _label: &str) -> Box<dyn ProgressTask + '_> {
        Box::new(NoProgressTask)
    }
}

/// 把进度写入 tracing 日志
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingProgress;

struct LoggingTask {
    label: String,
    total: usize,
    done: usize,
}

impl ProgressTask for LoggingTask {
    fn increment(&mut self) {
        self.done += 1;
        debug!(task = %self.label, done = self.done, total = self.total, "进度");
    }
}

impl ProgressReporter for LoggingProgress {
    fn begin_task(&self, total_units: usize, label: &str) -> Box<dyn ProgressTask + '_> {
        debug!(task = %label, total = total_units, "开始任务");
        Box::new(LoggingTask {
            label: label.to_string(),
            total: total_units,
            done: 0,
        })
    }
}
