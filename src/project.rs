use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

use crate::case::{CaseDataSource, CaseId};
use crate::ensemble::CaseEnsemble;
use crate::error::PersistenceError;
use crate::grid::GridTopologyRegistry;
use crate::persistence::{PROJECT_FORMAT_VERSION, ProjectDocument};
use crate::progress::LoggingProgress;
use crate::statistics::{CalculationStatus, ResultStore};

pub const PROJECT_FILE_NAME: &str = "project.json";

/// 统计结果数据文件名
pub fn statistics_blob_name(statistics_case: Uuid) -> String {
    format!("{}.stats.gz", statistics_case)
}

/// 工程：全部案例组与共享的网格注册表
///
/// 不存在全局状态，调用方显式持有工程并传入统计接口。
pub struct Project {
    ensembles: RwLock<HashMap<Uuid, Arc<Mutex<CaseEnsemble>>>>,
    case_files: RwLock<BTreeMap<CaseId, String>>,
    registry: GridTopologyRegistry,
}

impl Project {
    pub fn new() -> Self {
        Self {
            ensembles: RwLock::new(HashMap::new()),
            case_files: RwLock::new(BTreeMap::new()),
            registry: GridTopologyRegistry::new(),
        }
    }

    pub fn registry(&self) -> &GridTopologyRegistry {
        &self.registry
    }

    pub fn insert_ensemble(&self, ensemble: CaseEnsemble) -> Arc<Mutex<CaseEnsemble>> {
        let id = ensemble.id();
        let ensemble = Arc::new(Mutex::new(ensemble));
        self.ensembles.write().insert(id, ensemble.clone());
        ensemble
    }

    pub fn ensemble(&self, id: Uuid) -> Option<Arc<Mutex<CaseEnsemble>>> {
        self.ensembles.read().get(&id).cloned()
    }

    pub fn remove_ensemble(&self, id: Uuid) -> Option<Arc<Mutex<CaseEnsemble>>> {
        self.ensembles.write().remove(&id)
    }

    pub fn ensemble_ids(&self) -> Vec<Uuid> {
        self.ensembles.read().keys().copied().collect()
    }

    /// 返回一个正被占用（计算中）的案例组，全部空闲时返回 None
    pub fn busy_ensemble(&self) -> Option<Uuid> {
        self.ensembles
            .read()
            .iter()
            .find(|(_, ensemble)| ensemble.is_locked())
            .map(|(&id, _)| id)
    }

    pub fn ensemble_count(&self) -> usize {
        self.ensembles.read().len()
    }

    /// 记录案例的来源文件，保存工程时写入
    pub fn record_case_file(&self, case: CaseId, file: impl Into<String>) {
        self.case_files.write().insert(case, file.into());
    }

    pub fn case_files(&self) -> BTreeMap<CaseId, String> {
        self.case_files.read().clone()
    }

    pub fn to_document(&self) -> ProjectDocument {
        let mut ensembles: Vec<_> = self
            .ensembles
            .read()
            .values()
            .map(|ensemble| ensemble.lock().to_document())
            .collect();
        ensembles.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));

        ProjectDocument {
            version: PROJECT_FORMAT_VERSION,
            case_files: self.case_files(),
            ensembles,
        }
    }

    /// 保存工程文档与已计算的统计结果
    pub fn save(&self, dir: &Path) -> Result<PathBuf, PersistenceError> {
        fs::create_dir_all(dir)?;

        let ensembles: Vec<_> = self.ensembles.read().values().cloned().collect();
        let mut blob_count = 0usize;
        for ensemble in &ensembles {
            let ensemble = ensemble.lock();
            for statistics_case in ensemble.statistics_cases() {
                if !statistics_case.has_computed_statistics() {
                    continue;
                }
                let path = dir.join(statistics_blob_name(statistics_case.id()));
                statistics_case.result_store().write_to(BufWriter::new(File::create(&path)?))?;
                blob_count += 1;
            }
        }

        let path = dir.join(PROJECT_FILE_NAME);
        serde_json::to_writer_pretty(BufWriter::new(File::create(&path)?), &self.to_document())?;
        info!(
            path = %path.display(),
            ensembles = ensembles.len(),
            blobs = blob_count,
            "[工程] 保存完成"
        );
        Ok(path)
    }

    pub fn read_document(dir: &Path) -> Result<ProjectDocument, PersistenceError> {
        let file = File::open(dir.join(PROJECT_FILE_NAME))?;
        let doc: ProjectDocument = serde_json::from_reader(BufReader::new(file))?;
        if doc.version != PROJECT_FORMAT_VERSION {
            return Err(PersistenceError::Format(format!("不支持的工程版本: {}", doc.version)));
        }
        Ok(doc)
    }

    /// 读取并恢复工程，返回恢复的案例组数量
    pub fn load(&self, dir: &Path, source: &dyn CaseDataSource) -> Result<usize, PersistenceError> {
        let doc = Self::read_document(dir)?;
        self.restore(dir, &doc, source)
    }

    /// 用文档替换当前工程内容
    ///
    /// 文档中的成员案例必须已存在于数据源。CALCULATED 的统计案例从结果文件恢复，
    /// 文件缺失、损坏或数组长度与并集不符时恢复为 NOT_CALCULATED。
    pub fn restore(&self, dir: &Path, doc: &ProjectDocument, source: &dyn CaseDataSource) -> Result<usize, PersistenceError> {
        let mut restored = HashMap::new();
        for ensemble_doc in &doc.ensembles {
            let mut ensemble = CaseEnsemble::from_document(ensemble_doc, source, &self.registry)?;
            ensemble.compute_union_of_active_cells(source, &LoggingProgress);

            for statistics_doc in &ensemble_doc.statistics_cases {
                if statistics_doc.status != CalculationStatus::Calculated {
                    continue;
                }
                let path = dir.join(statistics_blob_name(statistics_doc.id));
                let restored_results = File::open(&path)
                    .map_err(PersistenceError::from)
                    .and_then(|file| ResultStore::read_from(BufReader::new(file)))
                    .and_then(|store| {
                        ensemble
                            .restore_statistics_results(statistics_doc.id, store)
                            .map_err(PersistenceError::from)
                    });
                if let Err(e) = restored_results {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "[工程] 统计结果无法恢复，需要重新计算"
                    );
                }
            }
            restored.insert(ensemble.id(), Arc::new(Mutex::new(ensemble)));
        }

        let count = restored.len();
        *self.ensembles.write() = restored;
        *self.case_files.write() = doc.case_files.clone();
        info!(dir = %dir.display(), ensembles = count, "[工程] 加载完成");
        Ok(count)
    }
}

impl Default for Project {
    fn default() -> Self {
        Self::new()
    }
}
