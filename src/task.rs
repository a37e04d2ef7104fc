use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::progress::{ProgressReporter, ProgressTask};

/// 计算任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Completed,
    /// 统计案例已计算，未重新计算
    Skipped,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_finished(self) -> bool {
        self != JobStatus::Running
    }
}

/// 任务状态快照，用于返回给前端
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub job_id: String,
    pub ensemble_id: Uuid,
    pub statistics_case_id: Uuid,
    pub status: JobStatus,
    /// 当前阶段（并集计算或统计计算）
    pub stage: String,
    pub completed_units: usize,
    pub total_units: usize,
    pub cancel_requested: bool,
    pub message: Option<String>,
    pub elapsed_ms: u64,
}

/// 一次统计计算任务
///
/// 同时作为计算的进度汇报方：计数工作单元，并在取消请求后通知计算提前终止。
pub struct JobData {
    pub ensemble_id: Uuid,
    pub statistics_case_id: Uuid,
    /// 任务创建时间，用于 TTL 过期检查
    pub created_at: Instant,
    status: RwLock<JobStatus>,
    stage: RwLock<String>,
    message: RwLock<Option<String>>,
    finished_at: RwLock<Option<Instant>>,
    total_units: AtomicUsize,
    completed_units: AtomicUsize,
    cancel_requested: AtomicBool,
}

impl JobData {
    pub fn new(ensemble_id: Uuid, statistics_case_id: Uuid) -> Self {
        Self {
            ensemble_id,
            statistics_case_id,
            created_at: Instant::now(),
            status: RwLock::new(JobStatus::Running),
            stage: RwLock::new(String::new()),
            message: RwLock::new(None),
            finished_at: RwLock::new(None),
            total_units: AtomicUsize::new(0),
            completed_units: AtomicUsize::new(0),
            cancel_requested: AtomicBool::new(false),
        }
    }

    pub fn status(&self) -> JobStatus {
        *self.status.read()
    }

    /// 结束任务，记录最终状态与说明
    pub fn finish(&self, status: JobStatus, message: Option<String>) {
        *self.status.write() = status;
        *self.message.write() = message;
        *self.finished_at.write() = Some(Instant::now());
    }

    /// 请求取消，计算在下一个工作单元之前终止
    /// 已结束的任务返回 false
    pub fn request_cancel(&self) -> bool {
        if self.status().is_finished() {
            return false;
        }
        self.cancel_requested.store(true, Ordering::SeqCst);
        true
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self, job_id: &str) -> JobSnapshot {
        JobSnapshot {
            job_id: job_id.to_string(),
            ensemble_id: self.ensemble_id,
            statistics_case_id: self.statistics_case_id,
            status: self.status(),
            stage: self.stage.read().clone(),
            completed_units: self.completed_units.load(Ordering::Relaxed),
            total_units: self.total_units.load(Ordering::Relaxed),
            cancel_requested: self.is_cancel_requested(),
            message: self.message.read().clone(),
            elapsed_ms: self.created_at.elapsed().as_millis() as u64,
        }
    }

    /// 结束后经过的时间；运行中返回 None
    fn finished_for(&self, now: Instant) -> Option<Duration> {
        self.finished_at.read().map(|at| now.duration_since(at))
    }
}

struct JobTask<'a> {
    job: &'a JobData,
}

impl ProgressTask for JobTask<'_> {
    fn increment(&mut self) {
        self.job.completed_units.fetch_add(1, Ordering::Relaxed);
    }

    fn is_cancelled(&self) -> bool {
        self.job.is_cancel_requested()
    }
}

impl ProgressReporter for JobData {
    fn begin_task(&self, total_units: usize, label: &str) -> Box<dyn ProgressTask + '_> {
        debug!(stage = %label, total = total_units, "[计算任务] 开始阶段");
        *self.stage.write() = label.to_string();
        self.total_units.store(total_units, Ordering::Relaxed);
        self.completed_units.store(0, Ordering::Relaxed);
        Box::new(JobTask { job: self })
    }
}

pub struct JobStore {
    jobs: RwLock<HashMap<String, Arc<JobData>>>,
    /// 已结束任务的保留时间
    default_ttl: Duration,
}

impl JobStore {
    pub fn new() -> Self {
        Self::with_ttl(Duration::from_secs(30 * 60))
    }

    /// 创建带自定义 TTL 的 JobStore
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            default_ttl: ttl,
        }
    }

    pub fn insert(&self, data: JobData) -> (String, Arc<JobData>) {
        let job_id = Uuid::new_v4().to_string();
        let data = Arc::new(data);
        self.jobs.write().insert(job_id.clone(), data.clone());
        (job_id, data)
    }

    pub fn get(&self, job_id: &str) -> Option<Arc<JobData>> {
        self.jobs.read().get(job_id).cloned()
    }

    /// 指定统计案例正在运行的任务
    pub fn running_job_for(&self, statistics_case_id: Uuid) -> Option<String> {
        self.jobs
            .read()
            .iter()
            .find(|(_, job)| job.statistics_case_id == statistics_case_id && !job.status().is_finished())
            .map(|(id, _)| id.clone())
    }

    /// 清理结束时间超过 TTL 的任务，运行中的任务保留
    /// 返回清理的任务数量
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let mut jobs = self.jobs.write();
        let before_count = jobs.len();

        jobs.retain(|_, job| job.finished_for(now).is_none_or(|elapsed| elapsed < self.default_ttl));

        before_count - jobs.len()
    }

    /// 获取当前任务数量
    pub fn job_count(&self) -> usize {
        self.jobs.read().len()
    }

    /// 获取默认 TTL
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new()
    }
}
