//! 文档树
//!
//! 案例组与统计案例以命名字段的文档树形式保存：成员列表、属性选择、
//! 百分位数配置与计算状态。统计结果本身作为派生缓存单独保存。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::case::{CaseDataSource, CaseId};
use crate::ensemble::CaseEnsemble;
use crate::error::{EnsembleError, StatisticsError};
use crate::grid::GridTopologyRegistry;
use crate::statistics::{CalculationStatus, PercentileConfig, PropertySelection, StatisticsCase};

pub const PROJECT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticsCaseDocument {
    pub id: Uuid,
    pub name: String,
    pub status: CalculationStatus,
    #[serde(default)]
    pub selection: PropertySelection,
    #[serde(default)]
    pub percentiles: PercentileConfig,
    #[serde(default)]
    pub time_steps: Vec<usize>,
    #[serde(default)]
    pub use_zero_for_inactive_cells: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleDocument {
    pub id: Uuid,
    pub name: String,
    pub members: Vec<CaseId>,
    #[serde(default)]
    pub statistics_cases: Vec<StatisticsCaseDocument>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectDocument {
    pub version: u32,
    /// 已加载案例的来源文件（相对资源目录）
    #[serde(default)]
    pub case_files: BTreeMap<CaseId, String>,
    #[serde(default)]
    pub ensembles: Vec<EnsembleDocument>,
}

impl Default for ProjectDocument {
    fn default() -> Self {
        Self {
            version: PROJECT_FORMAT_VERSION,
            case_files: BTreeMap::new(),
            ensembles: Vec::new(),
        }
    }
}

impl StatisticsCase {
    pub fn to_document(&self) -> StatisticsCaseDocument {
        StatisticsCaseDocument {
            id: self.id(),
            name: self.name().to_string(),
            status: self.status(),
            selection: self.selection().clone(),
            percentiles: *self.percentiles(),
            time_steps: self.time_steps().to_vec(),
            use_zero_for_inactive_cells: self.use_zero_for_inactive_cells(),
        }
    }

    /// 从文档恢复统计案例；状态总是 NOT_CALCULATED，结果需另外恢复
    pub fn from_document(doc: &StatisticsCaseDocument) -> Result<Self, StatisticsError> {
        doc.selection.validate()?;
        let mut statistics_case = StatisticsCase::with_id(doc.id, doc.name.clone());
        statistics_case.restore_settings(
            doc.selection.clone(),
            doc.percentiles,
            doc.time_steps.clone(),
            doc.use_zero_for_inactive_cells,
        );
        Ok(statistics_case)
    }
}

impl CaseEnsemble {
    pub fn to_document(&self) -> EnsembleDocument {
        EnsembleDocument {
            id: self.id(),
            name: self.name().to_string(),
            members: self.members().to_vec(),
            statistics_cases: self.statistics_cases().iter().map(StatisticsCase::to_document).collect(),
        }
    }

    /// 从文档恢复案例组
    ///
    /// 成员通过 [`CaseEnsemble::add_case`] 重新加入，网格重新共享与校验。
    pub fn from_document(
        doc: &EnsembleDocument,
        source: &dyn CaseDataSource,
        registry: &GridTopologyRegistry,
    ) -> Result<Self, EnsembleError> {
        let mut ensemble = CaseEnsemble::with_id(doc.id, doc.name.clone());
        for statistics_doc in &doc.statistics_cases {
            ensemble.add_statistics_case(StatisticsCase::from_document(statistics_doc)?);
        }
        for &member in &doc.members {
            ensemble.add_case(member, source, registry)?;
        }
        if doc.statistics_cases.is_empty() {
            ensemble.clear_statistics_cases();
        }
        Ok(ensemble)
    }
}
