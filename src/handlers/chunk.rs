use actix_web::{HttpResponse, Responder, get, http::header::ContentType, web};
use byteorder::{LittleEndian, WriteBytesExt};
use serde::Deserialize;
use uuid::Uuid;

use crate::active_cells::PorosityModel;
use crate::app_state::AppState;
use crate::handlers::{ensemble_busy, find_ensemble};
use crate::statistics::AggregateKind;

#[derive(Deserialize)]
pub struct ChunkQuery {
    pub ensemble_id: Uuid,
    pub statistics_case_id: Uuid,
    #[serde(default = "default_porosity")]
    pub porosity: PorosityModel,
    pub property: String,
    #[serde(default)]
    pub time_step: usize,
    pub kind: AggregateKind,
    /// 起始单元序号（含）
    #[serde(default)]
    pub start: usize,
    /// 结束单元序号（不含），缺省到数组末尾
    pub end: Option<usize>,
}

fn default_porosity() -> PorosityModel {
    PorosityModel::Matrix
}

/// 以小端 f64 二进制返回一段统计结果数组
///
/// 数组按活动单元序号排列；未定义的单元写入 +inf。
#[get("/statistics/chunk")]
pub async fn get_statistics_chunk(data: web::Data<AppState>, query: web::Query<ChunkQuery>) -> impl Responder {
    let ensemble = match find_ensemble(&data, query.ensemble_id) {
        Ok(ensemble) => ensemble,
        Err(resp) => return resp,
    };
    let Some(ensemble) = ensemble.try_lock() else {
        return ensemble_busy(query.ensemble_id);
    };
    let Some(statistics_case) = ensemble.statistics_case(query.statistics_case_id) else {
        return HttpResponse::NotFound().json(serde_json::json!({
            "error": "统计案例不存在",
            "statistics_case_id": query.statistics_case_id,
        }));
    };

    // 尚未计算
    if !statistics_case.has_computed_statistics() {
        return HttpResponse::Accepted().json(serde_json::json!({
            "error": "统计结果尚未计算",
            "statistics_case_id": query.statistics_case_id,
            "status": "not_calculated",
        }));
    }

    let result_name = query.kind.result_name(&query.property);
    let Some(values) =
        statistics_case.aggregate_array(query.porosity, &query.property, query.time_step, query.kind)
    else {
        return HttpResponse::NotFound().json(serde_json::json!({
            "error": "统计结果不存在",
            "result_name": result_name,
            "time_step": query.time_step,
        }));
    };

    let end = query.end.unwrap_or(values.len());
    if query.start > end || end > values.len() {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": "无效的区间",
            "start": query.start,
            "end": end,
            "length": values.len(),
        }));
    }

    let mut bytes = Vec::with_capacity((end - query.start) * std::mem::size_of::<f64>());
    for &value in &values[query.start..end] {
        if let Err(e) = bytes.write_f64::<LittleEndian>(value) {
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "写入 chunk 数据失败",
                "details": e.to_string(),
            }));
        }
    }

    HttpResponse::Ok()
        .content_type(ContentType::octet_stream())
        .append_header(("X-Chunk-Start", query.start.to_string()))
        .append_header(("X-Chunk-End", end.to_string()))
        .append_header(("X-Chunk-Length", (end - query.start).to_string()))
        .append_header(("X-Total-Length", values.len().to_string()))
        .append_header(("X-Result-Name", result_name))
        .append_header(("X-Undefined-Value", "inf"))
        .body(bytes)
}
