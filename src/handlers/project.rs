use std::time::Instant;

use actix_web::{HttpResponse, Responder, post, web};
use tracing::{error, info};

use crate::app_state::AppState;
use crate::error::PersistenceError;
use crate::handlers::cases::run_load_case;
use crate::handlers::ensemble_busy;
use crate::project::Project;

fn persistence_error_response(action: &str, err: &PersistenceError) -> HttpResponse {
    let body = serde_json::json!({
        "error": format!("{}失败", action),
        "details": err.to_string(),
    });
    match err {
        PersistenceError::Io(e) if e.kind() == std::io::ErrorKind::NotFound => HttpResponse::NotFound().json(body),
        PersistenceError::Json(_) | PersistenceError::Format(_) => HttpResponse::UnprocessableEntity().json(body),
        PersistenceError::Ensemble(_) => HttpResponse::Conflict().json(body),
        PersistenceError::Io(_) => HttpResponse::InternalServerError().json(body),
    }
}

fn join_error_response(action: &str, err: &actix_web::rt::task::JoinError) -> HttpResponse {
    error!(error = %err, "[工程] 后台任务异常退出");
    HttpResponse::InternalServerError().json(serde_json::json!({
        "error": format!("{}失败", action),
        "details": err.to_string(),
    }))
}

/// 保存工程到工程目录
///
/// 有案例组正在计算时返回 202，写文件在阻塞线程池中进行。
#[post("/project/save")]
pub async fn save_project(data: web::Data<AppState>) -> impl Responder {
    if let Some(ensemble_id) = data.project.busy_ensemble() {
        return ensemble_busy(ensemble_id);
    }

    let start = Instant::now();
    let project = data.project.clone();
    let dir = data.project_dir.clone();
    let saved = actix_web::rt::task::spawn_blocking(move || project.save(&dir)).await;

    match saved {
        Ok(Ok(path)) => HttpResponse::Ok().json(serde_json::json!({
            "path": path,
            "ensembles": data.project.ensemble_count(),
            "elapsed_ms": start.elapsed().as_millis() as u64,
        })),
        Ok(Err(e)) => {
            error!(dir = %data.project_dir.display(), error = %e, "[工程] 保存失败");
            persistence_error_response("保存工程", &e)
        }
        Err(e) => join_error_response("保存工程", &e),
    }
}

/// 从工程目录恢复工程
///
/// 先按保存的标识重新读取尚未加载的案例文件，再重建案例组与统计结果。
/// 有案例组正在计算时返回 202，重建在阻塞线程池中进行。
#[post("/project/load")]
pub async fn load_project(data: web::Data<AppState>) -> impl Responder {
    if let Some(ensemble_id) = data.project.busy_ensemble() {
        return ensemble_busy(ensemble_id);
    }

    let start = Instant::now();
    let doc = match Project::read_document(&data.project_dir) {
        Ok(doc) => doc,
        Err(e) => {
            error!(dir = %data.project_dir.display(), error = %e, "[工程] 读取失败");
            return persistence_error_response("读取工程", &e);
        }
    };

    let mut reloaded = 0usize;
    for (&case_id, file) in &doc.case_files {
        if data.case_source.contains(case_id) {
            continue;
        }
        if let Err(resp) = run_load_case(data.get_ref(), file, Some(case_id)) {
            error!(%case_id, file = %file, "[工程] 案例文件无法重新加载");
            return resp;
        }
        reloaded += 1;
    }

    let project = data.project.clone();
    let source = data.case_source.clone();
    let dir = data.project_dir.clone();
    let restored = actix_web::rt::task::spawn_blocking(move || project.restore(&dir, &doc, &*source)).await;

    match restored {
        Ok(Ok(ensembles)) => {
            info!(ensembles, reloaded_cases = reloaded, "[工程] 已恢复");
            HttpResponse::Ok().json(serde_json::json!({
                "ensembles": ensembles,
                "reloaded_cases": reloaded,
                "ensemble_ids": data.project.ensemble_ids(),
                "elapsed_ms": start.elapsed().as_millis() as u64,
            }))
        }
        Ok(Err(e)) => {
            error!(error = %e, "[工程] 恢复失败");
            persistence_error_response("恢复工程", &e)
        }
        Err(e) => join_error_response("恢复工程", &e),
    }
}
