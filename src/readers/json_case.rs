use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use crate::active_cells::{ActiveCellIndex, PorosityModel};
use crate::case::{InMemoryCase, ResultCategory};
use crate::error::ReaderError;
use crate::grid::{GridTopology, SubGrid};
use crate::utils::reader::CaseReader;

/// JSON 案例清单
///
/// ```json
/// {
///   "name": "CASE_1",
///   "grids": [{ "name": "MAIN", "dimensions": [4, 1, 1] }],
///   "active": { "MATRIX": [true, true, true, false] },
///   "results": [
///     { "porosity": "MATRIX", "category": "DYNAMIC_NATIVE", "name": "PRESSURE",
///       "time_steps": [[10.0, 20.0, 30.0]] }
///   ]
/// }
/// ```
///
/// 有效标记按全局单元索引排列；省略基质模型时所有单元有效。
/// 结果数组按案例自身的有效序号排列。
#[derive(Debug, Deserialize)]
pub struct CaseManifest {
    pub name: String,
    pub grids: Vec<SubGrid>,
    #[serde(default)]
    pub nodes: Vec<[f64; 3]>,
    #[serde(default)]
    pub active: BTreeMap<PorosityModel, Vec<bool>>,
    #[serde(default)]
    pub results: Vec<ResultManifest>,
}

#[derive(Debug, Deserialize)]
pub struct ResultManifest {
    #[serde(default = "default_porosity")]
    pub porosity: PorosityModel,
    pub category: ResultCategory,
    pub name: String,
    pub time_steps: Vec<Vec<f64>>,
}

fn default_porosity() -> PorosityModel {
    PorosityModel::Matrix
}

impl CaseManifest {
    /// 转换为内存案例
    pub fn into_case(self) -> Result<InMemoryCase, ReaderError> {
        let grid = GridTopology::with_nodes(self.grids, self.nodes).map_err(ReaderError::Invalid)?;
        let grid = Arc::new(grid);

        let mut active = self.active;
        let matrix_flags = active
            .remove(&PorosityModel::Matrix)
            .unwrap_or_else(|| vec![true; grid.global_cell_count()]);
        let matrix = ActiveCellIndex::from_active_flags(&grid, &matrix_flags).map_err(ReaderError::Invalid)?;

        let mut case = InMemoryCase::new(self.name, grid.clone(), matrix);
        if let Some(fracture_flags) = active.remove(&PorosityModel::Fracture) {
            let fracture =
                ActiveCellIndex::from_active_flags(&grid, &fracture_flags).map_err(ReaderError::Invalid)?;
            case.set_active_cells(PorosityModel::Fracture, fracture);
        }

        for result in self.results {
            case.add_result(result.porosity, result.category, result.name, result.time_steps)
                .map_err(ReaderError::Invalid)?;
        }
        Ok(case)
    }
}

/// JSON 案例清单读取器
pub struct JsonCaseReader;

impl JsonCaseReader {
    pub fn new() -> Self {
        JsonCaseReader
    }
}

impl Default for JsonCaseReader {
    fn default() -> Self {
        Self::new()
    }
}

impl CaseReader for JsonCaseReader {
    fn supported_extensions(&self) -> Vec<&'static str> {
        vec!["json"]
    }

    fn name(&self) -> &'static str {
        "JSON Case Reader"
    }

    fn read_case(&self, file_path: &Path) -> Result<InMemoryCase, ReaderError> {
        let file = File::open(file_path)?;
        let manifest: CaseManifest = serde_json::from_reader(BufReader::new(file))?;
        manifest.into_case()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::case::{CaseDataSource, InMemoryCaseSource};

    const MANIFEST: &str = r#"{
        "name": "CASE_A",
        "grids": [{ "name": "MAIN", "dimensions": [2, 2, 1] }],
        "active": { "MATRIX": [true, false, true, true], "FRACTURE": [false, false, false, true] },
        "results": [
            { "category": "DYNAMIC_NATIVE", "name": "PRESSURE", "time_steps": [[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]] },
            { "porosity": "FRACTURE", "category": "STATIC_NATIVE", "name": "PORO", "time_steps": [[0.3]] }
        ]
    }"#;

    #[test]
    fn manifest_file_is_read_into_a_case() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        file.write_all(MANIFEST.as_bytes()).unwrap();

        let case = JsonCaseReader::new().read_case(file.path()).unwrap();
        assert_eq!(case.name, "CASE_A");
        assert_eq!(case.time_step_count(), 2);

        let source = InMemoryCaseSource::new();
        let id = source.insert(case);
        assert_eq!(source.scalar_value(id, PorosityModel::Matrix, "PRESSURE", 1, 3), Some(6.0));
        assert_eq!(source.scalar_value(id, PorosityModel::Matrix, "PRESSURE", 0, 1), None);
        assert_eq!(source.scalar_value(id, PorosityModel::Fracture, "PORO", 0, 3), Some(0.3));
    }

    #[test]
    fn missing_matrix_flags_mean_all_active() {
        let manifest: CaseManifest = serde_json::from_str(
            r#"{ "name": "B", "grids": [{ "name": "MAIN", "dimensions": [3, 1, 1] }] }"#,
        )
        .unwrap();
        let case = manifest.into_case().unwrap();
        let matrix = case.active_cells(PorosityModel::Matrix).unwrap();
        assert_eq!(matrix.reservoir_active_count(), 3);
        assert!(case.active_cells(PorosityModel::Fracture).is_none());
    }

    #[test]
    fn wrong_result_length_is_invalid() {
        let manifest: CaseManifest = serde_json::from_str(
            r#"{
                "name": "C",
                "grids": [{ "name": "MAIN", "dimensions": [2, 1, 1] }],
                "results": [{ "category": "STATIC_NATIVE", "name": "PORO", "time_steps": [[0.1]] }]
            }"#,
        )
        .unwrap();
        assert!(matches!(manifest.into_case(), Err(ReaderError::Invalid(_))));
    }
}
