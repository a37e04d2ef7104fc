use actix_web::{HttpResponse, Responder, delete, get, post, web};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::app_state::AppState;
use crate::case::CaseId;
use crate::ensemble::CaseEnsemble;
use crate::handlers::{ensemble_busy, ensemble_error_response, ensemble_summary, find_ensemble};

#[derive(Deserialize)]
pub struct CreateEnsembleRequest {
    pub name: String,
    #[serde(default)]
    pub case_ids: Vec<CaseId>,
}

#[derive(Deserialize)]
pub struct AddCaseRequest {
    pub case_id: CaseId,
}

/// 创建案例组并依次加入案例；任何一个案例被拒绝时不创建案例组
#[post("/ensembles")]
pub async fn create_ensemble(data: web::Data<AppState>, payload: web::Json<CreateEnsembleRequest>) -> impl Responder {
    let mut ensemble = CaseEnsemble::new(payload.name.clone());
    for &case_id in &payload.case_ids {
        if let Err(e) = ensemble.add_case(case_id, &*data.case_source, data.project.registry()) {
            warn!(ensemble = %payload.name, %case_id, error = %e, "[案例组] 创建失败");
            return ensemble_error_response(&e);
        }
    }

    let summary = ensemble_summary(&ensemble, &*data.case_source);
    data.project.insert_ensemble(ensemble);
    HttpResponse::Created().json(summary)
}

#[get("/ensembles/{ensemble_id}")]
pub async fn get_ensemble(data: web::Data<AppState>, path: web::Path<Uuid>) -> impl Responder {
    let ensemble_id = path.into_inner();
    let ensemble = match find_ensemble(&data, ensemble_id) {
        Ok(ensemble) => ensemble,
        Err(resp) => return resp,
    };
    let Some(ensemble) = ensemble.try_lock() else {
        return ensemble_busy(ensemble_id);
    };
    HttpResponse::Ok().json(ensemble_summary(&ensemble, &*data.case_source))
}

/// 删除案例组，计算中的案例组不能删除
#[delete("/ensembles/{ensemble_id}")]
pub async fn delete_ensemble(data: web::Data<AppState>, path: web::Path<Uuid>) -> impl Responder {
    let ensemble_id = path.into_inner();
    let ensemble = match find_ensemble(&data, ensemble_id) {
        Ok(ensemble) => ensemble,
        Err(resp) => return resp,
    };
    if ensemble.is_locked() {
        return ensemble_busy(ensemble_id);
    }
    drop(ensemble);

    data.project.remove_ensemble(ensemble_id);
    let released = data.project.registry().prune_released();
    info!(%ensemble_id, released_grids = released, "[案例组] 已删除");
    HttpResponse::Ok().json(serde_json::json!({
        "ensemble_id": ensemble_id,
        "released_grids": released,
    }))
}

#[post("/ensembles/{ensemble_id}/cases")]
pub async fn add_ensemble_case(
    data: web::Data<AppState>,
    path: web::Path<Uuid>,
    payload: web::Json<AddCaseRequest>,
) -> impl Responder {
    let ensemble_id = path.into_inner();
    let ensemble = match find_ensemble(&data, ensemble_id) {
        Ok(ensemble) => ensemble,
        Err(resp) => return resp,
    };
    let Some(mut ensemble) = ensemble.try_lock() else {
        return ensemble_busy(ensemble_id);
    };

    match ensemble.add_case(payload.case_id, &*data.case_source, data.project.registry()) {
        Ok(()) => HttpResponse::Ok().json(ensemble_summary(&ensemble, &*data.case_source)),
        Err(e) => ensemble_error_response(&e),
    }
}

#[delete("/ensembles/{ensemble_id}/cases/{case_id}")]
pub async fn remove_ensemble_case(data: web::Data<AppState>, path: web::Path<(Uuid, CaseId)>) -> impl Responder {
    let (ensemble_id, case_id) = path.into_inner();
    let ensemble = match find_ensemble(&data, ensemble_id) {
        Ok(ensemble) => ensemble,
        Err(resp) => return resp,
    };
    let Some(mut ensemble) = ensemble.try_lock() else {
        return ensemble_busy(ensemble_id);
    };

    match ensemble.remove_case(case_id) {
        Ok(()) => {
            let released = data.project.registry().prune_released();
            let mut summary = ensemble_summary(&ensemble, &*data.case_source);
            summary["released_grids"] = serde_json::json!(released);
            HttpResponse::Ok().json(summary)
        }
        Err(e) => ensemble_error_response(&e),
    }
}
