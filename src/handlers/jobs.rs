use actix_web::{HttpResponse, Responder, delete, get, web};
use tracing::info;

use crate::app_state::AppState;

fn job_not_found(job_id: &str) -> HttpResponse {
    HttpResponse::NotFound().json(serde_json::json!({
        "error": "无效的 job_id",
        "job_id": job_id,
    }))
}

#[get("/jobs/{job_id}")]
pub async fn get_job(data: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let job_id = path.into_inner();
    match data.job_store.get(&job_id) {
        Some(job) => HttpResponse::Ok().json(job.snapshot(&job_id)),
        None => job_not_found(&job_id),
    }
}

/// 取消计算任务；已完成的部分结果会被丢弃
#[delete("/jobs/{job_id}")]
pub async fn cancel_job(data: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let job_id = path.into_inner();
    let Some(job) = data.job_store.get(&job_id) else {
        return job_not_found(&job_id);
    };

    if !job.request_cancel() {
        return HttpResponse::Conflict().json(serde_json::json!({
            "error": "任务已结束，无法取消",
            "job": job.snapshot(&job_id),
        }));
    }
    info!(%job_id, "[计算任务] 收到取消请求");
    HttpResponse::Ok().json(job.snapshot(&job_id))
}
