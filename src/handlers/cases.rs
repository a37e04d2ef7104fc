use std::time::Instant;

use actix_web::{HttpResponse, Responder, post, web};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::active_cells::PorosityModel;
use crate::app_state::AppState;
use crate::case::CaseId;
use crate::grid::GridSummary;

#[derive(Deserialize)]
pub struct LoadCaseRequest {
    /// 资源目录下的文件名（如 "CASE_1.json"）
    pub file: String,
}

#[derive(Serialize)]
pub struct LoadCaseResponse {
    pub case_id: CaseId,
    pub name: String,
    pub file: String,
    pub grid: GridSummary,
    pub matrix_active: usize,
    pub fracture_active: usize,
    pub time_step_count: usize,
}

#[post("/cases/load")]
pub async fn load_case(data: web::Data<AppState>, payload: web::Json<LoadCaseRequest>) -> impl Responder {
    match run_load_case(data.get_ref(), &payload.file, None) {
        Ok(resp) => HttpResponse::Ok().json(resp),
        Err(err) => err,
    }
}

/// 读取案例文件并加入案例数据源
///
/// `case_id` 为 None 时分配新的标识；恢复工程时沿用保存的标识。
pub fn run_load_case(
    app_state: &AppState,
    file: &str,
    case_id: Option<CaseId>,
) -> Result<LoadCaseResponse, HttpResponse> {
    let file_path = app_state.resource_dir.join(file);

    let Some((reader, _)) = app_state.reader_registry.find_reader_for_file(&file_path) else {
        let supported = app_state.reader_registry.supported_extensions();
        return Err(HttpResponse::BadRequest().json(serde_json::json!({
            "error": "不支持的文件格式",
            "file": file,
            "supported_extensions": supported,
        })));
    };

    if !file_path.is_file() {
        return Err(HttpResponse::NotFound().json(serde_json::json!({
            "error": "文件不存在或无法访问",
            "file": file,
        })));
    }

    let read_start = Instant::now();
    let case = reader.read_case(&file_path).map_err(|e| {
        HttpResponse::UnprocessableEntity().json(serde_json::json!({
            "error": "读取案例文件失败",
            "file": file,
            "reader": reader.name(),
            "details": e.to_string(),
        }))
    })?;

    let response = LoadCaseResponse {
        case_id: case_id.unwrap_or_else(Uuid::new_v4),
        name: case.name.clone(),
        file: file.to_string(),
        grid: case.grid.summary(),
        matrix_active: case
            .active_cells(PorosityModel::Matrix)
            .map_or(0, |a| a.reservoir_active_count()),
        fracture_active: case
            .active_cells(PorosityModel::Fracture)
            .map_or(0, |a| a.reservoir_active_count()),
        time_step_count: case.time_step_count(),
    };

    app_state.case_source.insert_with_id(response.case_id, case);
    app_state.project.record_case_file(response.case_id, file);
    info!(
        case_id = %response.case_id,
        file,
        reader = reader.name(),
        elapsed_ms = read_start.elapsed().as_millis() as u64,
        "[案例加载] 完成"
    );
    Ok(response)
}
