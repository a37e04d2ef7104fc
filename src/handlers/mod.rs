pub mod cases;
pub mod chunk;
pub mod compute;
pub mod ensembles;
pub mod health;
pub mod jobs;
pub mod performance;
pub mod project;
pub mod statistics;

use std::sync::Arc;

use actix_web::HttpResponse;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::case::CaseDataSource;
use crate::ensemble::CaseEnsemble;
use crate::error::{EnsembleError, StatisticsError};
use crate::statistics::StatisticsCase;

pub use cases::load_case;
pub use chunk::get_statistics_chunk;
pub use compute::{clear_statistics, compute_statistics};
pub use ensembles::{add_ensemble_case, create_ensemble, delete_ensemble, get_ensemble, remove_ensemble_case};
pub use health::hello;
pub use jobs::{cancel_job, get_job};
pub use performance::get_performance;
pub use project::{load_project, save_project};
pub use statistics::{configure_statistics_case, get_statistics_value};

/// 查找案例组，不存在时返回 404 响应
pub(crate) fn find_ensemble(app_state: &AppState, ensemble_id: Uuid) -> Result<Arc<Mutex<CaseEnsemble>>, HttpResponse> {
    app_state.project.ensemble(ensemble_id).ok_or_else(|| {
        HttpResponse::NotFound().json(serde_json::json!({
            "error": "案例组不存在",
            "ensemble_id": ensemble_id,
        }))
    })
}

/// 案例组正在计算时的响应
pub(crate) fn ensemble_busy(ensemble_id: Uuid) -> HttpResponse {
    HttpResponse::Accepted().json(serde_json::json!({
        "error": "案例组正在计算中，请稍后重试",
        "ensemble_id": ensemble_id,
        "status": "processing",
    }))
}

/// 把案例组错误映射为 HTTP 响应
pub(crate) fn ensemble_error_response(err: &EnsembleError) -> HttpResponse {
    let body = serde_json::json!({ "error": err.to_string() });
    match err {
        EnsembleError::GridMismatch(mismatch) => HttpResponse::Conflict().json(serde_json::json!({
            "error": err.to_string(),
            "case_id": mismatch.case_id,
            "expected": mismatch.expected,
            "found": mismatch.found,
        })),
        EnsembleError::DuplicateCase(_) | EnsembleError::ResultLengthMismatch { .. } => {
            HttpResponse::Conflict().json(body)
        }
        EnsembleError::GridNotLoaded(_)
        | EnsembleError::CaseNotFound(_)
        | EnsembleError::StatisticsCaseNotFound(_) => HttpResponse::NotFound().json(body),
        EnsembleError::Statistics(e) => statistics_error_response(e),
    }
}

pub(crate) fn statistics_error_response(err: &StatisticsError) -> HttpResponse {
    let body = serde_json::json!({ "error": err.to_string() });
    match err {
        StatisticsError::SelectionLocked | StatisticsError::DuplicateProperty { .. } => {
            HttpResponse::Conflict().json(body)
        }
        StatisticsError::InvalidPercentile { .. } => HttpResponse::BadRequest().json(body),
        StatisticsError::Cancelled | StatisticsError::StaleUnionIndex => {
            HttpResponse::InternalServerError().json(body)
        }
    }
}

/// 统计案例概要
pub(crate) fn statistics_case_summary(statistics_case: &StatisticsCase) -> serde_json::Value {
    serde_json::json!({
        "id": statistics_case.id(),
        "name": statistics_case.name(),
        "status": statistics_case.status(),
        "percentiles": statistics_case.percentiles(),
        "time_steps": statistics_case.time_steps(),
        "use_zero_for_inactive_cells": statistics_case.use_zero_for_inactive_cells(),
        "selection": statistics_case.selection(),
        "selection_summary": statistics_case.selection_summary(),
        "result_entries": statistics_case.result_store().entry_count(),
    })
}

/// 案例组概要
pub(crate) fn ensemble_summary(ensemble: &CaseEnsemble, source: &dyn CaseDataSource) -> serde_json::Value {
    use crate::active_cells::PorosityModel;

    let members: Vec<_> = ensemble
        .members()
        .iter()
        .map(|&case| {
            serde_json::json!({
                "case_id": case,
                "name": source.case_name(case),
                "time_step_count": source.time_step_count(case),
            })
        })
        .collect();
    let statistics_cases: Vec<_> = ensemble.statistics_cases().iter().map(statistics_case_summary).collect();

    serde_json::json!({
        "id": ensemble.id(),
        "name": ensemble.name(),
        "main_case": ensemble.main_case(),
        "members": members,
        "grid": ensemble.shared_grid().map(|grid| grid.summary()),
        "union": {
            "stale": ensemble.is_union_stale(),
            "matrix_active": ensemble.union_active_cells(PorosityModel::Matrix).reservoir_active_count(),
            "fracture_active": ensemble.union_active_cells(PorosityModel::Fracture).reservoir_active_count(),
            "bounding_box": ensemble.union_active_cells(PorosityModel::Matrix).bounding_box(),
        },
        "statistics_cases": statistics_cases,
    })
}
