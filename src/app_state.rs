use std::path::PathBuf;
use std::sync::Arc;

use crate::case::InMemoryCaseSource;
use crate::performance::PerformanceStore;
use crate::project::Project;
use crate::task::JobStore;
use crate::utils::reader_registry::CaseReaderRegistry;

/// 全局应用状态，负责在各个 handler 之间共享读取器、案例数据、工程与任务
pub struct AppState {
    pub reader_registry: Arc<CaseReaderRegistry>,
    pub case_source: Arc<InMemoryCaseSource>,
    pub project: Arc<Project>,
    pub resource_dir: PathBuf,
    pub project_dir: PathBuf,
    pub job_store: Arc<JobStore>,
    pub performance_store: Arc<PerformanceStore>,
}

impl AppState {
    pub fn new(resource_dir: PathBuf, project_dir: PathBuf, job_store: JobStore, performance_store: PerformanceStore) -> Self {
        Self {
            reader_registry: Arc::new(CaseReaderRegistry::new()),
            case_source: Arc::new(InMemoryCaseSource::new()),
            project: Arc::new(Project::new()),
            resource_dir,
            project_dir,
            job_store: Arc::new(job_store),
            performance_store: Arc::new(performance_store),
        }
    }
}
