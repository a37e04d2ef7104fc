use actix_web::{HttpResponse, Responder, post, web};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::app_state::AppState;
use crate::error::{EnsembleError, StatisticsError};
use crate::handlers::{ensemble_busy, find_ensemble, statistics_case_summary};
use crate::performance::{PerformanceRecord, get_unix_timestamp_ms};
use crate::statistics::ComputeOutcome;
use crate::task::{JobData, JobStatus};

/// 启动统计计算任务
///
/// 计算在阻塞线程池中执行，整个计算期间持有案例组的锁；
/// 返回 job_id，通过 /jobs/{job_id} 查询进度或取消。
#[post("/ensembles/{ensemble_id}/statistics/{statistics_case_id}/compute")]
pub async fn compute_statistics(data: web::Data<AppState>, path: web::Path<(Uuid, Uuid)>) -> impl Responder {
    let (ensemble_id, statistics_case_id) = path.into_inner();
    let ensemble = match find_ensemble(&data, ensemble_id) {
        Ok(ensemble) => ensemble,
        Err(resp) => return resp,
    };

    if let Some(job_id) = data.job_store.running_job_for(statistics_case_id) {
        return HttpResponse::Accepted().json(serde_json::json!({
            "job_id": job_id,
            "status": "running",
        }));
    }

    {
        let Some(guard) = ensemble.try_lock() else {
            return ensemble_busy(ensemble_id);
        };
        if guard.statistics_case(statistics_case_id).is_none() {
            return HttpResponse::NotFound().json(serde_json::json!({
                "error": "统计案例不存在",
                "statistics_case_id": statistics_case_id,
            }));
        }
    }

    let (job_id, job) = data.job_store.insert(JobData::new(ensemble_id, statistics_case_id));
    let source = data.case_source.clone();
    let performance_store = data.performance_store.clone();
    let session_id = job_id.clone();

    actix_web::rt::task::spawn_blocking(move || {
        let started_ms = get_unix_timestamp_ms();
        let result = {
            let mut ensemble = ensemble.lock();
            ensemble.compute_statistics(statistics_case_id, &*source, &*job)
        };

        match result {
            Ok(ComputeOutcome::Computed(report)) => {
                let records = PerformanceRecord::from_report(&report, started_ms);
                performance_store.add_records(&session_id, records);
                info!(
                    job_id = %session_id,
                    units = report.units.len(),
                    elapsed_ms = report.total.as_millis() as u64,
                    "[计算任务] 完成"
                );
                job.finish(
                    JobStatus::Completed,
                    Some(format!("计算了 {} 个工作单元", report.units.len())),
                );
            }
            Ok(ComputeOutcome::AlreadyCalculated) => {
                job.finish(JobStatus::Skipped, Some("统计结果已存在，请先清除".to_string()));
            }
            Err(EnsembleError::Statistics(StatisticsError::Cancelled)) => {
                warn!(job_id = %session_id, "[计算任务] 已取消");
                job.finish(JobStatus::Cancelled, None);
            }
            Err(e) => {
                error!(job_id = %session_id, error = %e, "[计算任务] 失败");
                job.finish(JobStatus::Failed, Some(e.to_string()));
            }
        }
    });

    HttpResponse::Accepted().json(serde_json::json!({
        "job_id": job_id,
        "status": "running",
    }))
}

/// 清除统计结果，属性选择重新可编辑
#[post("/ensembles/{ensemble_id}/statistics/{statistics_case_id}/clear")]
pub async fn clear_statistics(data: web::Data<AppState>, path: web::Path<(Uuid, Uuid)>) -> impl Responder {
    let (ensemble_id, statistics_case_id) = path.into_inner();
    let ensemble = match find_ensemble(&data, ensemble_id) {
        Ok(ensemble) => ensemble,
        Err(resp) => return resp,
    };
    let Some(mut ensemble) = ensemble.try_lock() else {
        return ensemble_busy(ensemble_id);
    };
    let Some(statistics_case) = ensemble.statistics_case_mut(statistics_case_id) else {
        return HttpResponse::NotFound().json(serde_json::json!({
            "error": "统计案例不存在",
            "statistics_case_id": statistics_case_id,
        }));
    };

    statistics_case.clear_computed_statistics();
    HttpResponse::Ok().json(statistics_case_summary(statistics_case))
}
