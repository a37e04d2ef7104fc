use actix_web::{HttpResponse, Responder, get, web};

use crate::app_state::AppState;

/// 根路径健康检查/服务说明
#[get("/")]
pub async fn hello(data: web::Data<AppState>) -> impl Responder {
    let supported = data.reader_registry.supported_extensions();
    HttpResponse::Ok().json(serde_json::json!({
        "message": "案例组统计计算服务",
        "supported_extensions": supported,
        "resource_dir": data.resource_dir,
        "loaded_cases": data.case_source.case_count(),
        "ensembles": data.project.ensemble_count(),
        "running_jobs": data.job_store.job_count(),
    }))
}
