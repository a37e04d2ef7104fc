use actix_web::{HttpResponse, Responder, get, web};
use serde::Deserialize;
use tracing::debug;

use crate::app_state::AppState;

#[derive(Deserialize)]
pub struct PerformanceQuery {
    /// 计算任务的 job_id
    pub session_id: String,
}

/// 计算任务各工作单元的耗时记录
///
/// 任务仍在运行、被取消或已过期时 records 为空数组。
#[get("/performance")]
pub async fn get_performance(data: web::Data<AppState>, query: web::Query<PerformanceQuery>) -> impl Responder {
    let records = data.performance_store.get_records(&query.session_id).unwrap_or_default();
    let job_status = data.job_store.get(&query.session_id).map(|job| job.status());
    debug!(session_id = %query.session_id, records = records.len(), "[性能数据查询]");

    HttpResponse::Ok().json(serde_json::json!({
        "session_id": query.session_id,
        "job_status": job_status,
        "records": records,
    }))
}
