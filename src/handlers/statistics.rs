use actix_web::{HttpResponse, Responder, get, post, web};
use serde::Deserialize;
use uuid::Uuid;

use crate::active_cells::PorosityModel;
use crate::app_state::AppState;
use crate::case::{CaseDataSource, ResultCategory};
use crate::error::StatisticsError;
use crate::handlers::{ensemble_busy, find_ensemble, statistics_case_summary, statistics_error_response};
use crate::statistics::{AggregateKind, PercentileConfig, StatisticsCase};

#[derive(Deserialize)]
pub struct SelectionEntry {
    #[serde(default = "default_porosity")]
    pub porosity: PorosityModel,
    pub category: ResultCategory,
    pub names: Vec<String>,
}

fn default_porosity() -> PorosityModel {
    PorosityModel::Matrix
}

/// 创建或修改统计案例
/// 未给出 statistics_case_id 时创建新的统计案例
#[derive(Deserialize)]
pub struct StatisticsCaseRequest {
    pub statistics_case_id: Option<Uuid>,
    pub name: Option<String>,
    /// 为空类别预选主案例中的常用属性
    #[serde(default)]
    pub populate_defaults: bool,
    pub selection: Option<Vec<SelectionEntry>>,
    pub percentiles: Option<PercentileConfig>,
    pub time_steps: Option<Vec<usize>>,
    /// 选中主案例的全部时间步
    #[serde(default)]
    pub all_time_steps: bool,
    pub use_zero_for_inactive_cells: Option<bool>,
}

#[post("/ensembles/{ensemble_id}/statistics")]
pub async fn configure_statistics_case(
    data: web::Data<AppState>,
    path: web::Path<Uuid>,
    payload: web::Json<StatisticsCaseRequest>,
) -> impl Responder {
    let ensemble_id = path.into_inner();
    let ensemble = match find_ensemble(&data, ensemble_id) {
        Ok(ensemble) => ensemble,
        Err(resp) => return resp,
    };
    let Some(mut ensemble) = ensemble.try_lock() else {
        return ensemble_busy(ensemble_id);
    };

    let main_case = ensemble.main_case();
    let statistics_case_id = match payload.statistics_case_id {
        Some(id) => id,
        None => {
            let name = payload
                .name
                .clone()
                .unwrap_or_else(|| format!("Statistics {}", ensemble.statistics_cases().len() + 1));
            ensemble.create_statistics_case(name)
        }
    };
    let Some(statistics_case) = ensemble.statistics_case_mut(statistics_case_id) else {
        return HttpResponse::NotFound().json(serde_json::json!({
            "error": "统计案例不存在",
            "statistics_case_id": statistics_case_id,
        }));
    };

    if let Err(e) = apply_request(statistics_case, &payload, &*data.case_source, main_case) {
        return statistics_error_response(&e);
    }
    HttpResponse::Ok().json(statistics_case_summary(statistics_case))
}

fn apply_request(
    statistics_case: &mut StatisticsCase,
    request: &StatisticsCaseRequest,
    source: &dyn CaseDataSource,
    main_case: Option<Uuid>,
) -> Result<(), StatisticsError> {
    if let Some(name) = &request.name {
        statistics_case.set_name(name.clone());
    }
    if let Some(entries) = &request.selection {
        for entry in entries {
            statistics_case.set_selected_properties(entry.porosity, entry.category, entry.names.clone())?;
        }
    }
    if let Some(percentiles) = request.percentiles {
        statistics_case.set_percentiles(percentiles)?;
    }
    if let Some(time_steps) = &request.time_steps {
        statistics_case.set_time_steps(time_steps.clone())?;
    }
    if let Some(enabled) = request.use_zero_for_inactive_cells {
        statistics_case.set_use_zero_for_inactive_cells(enabled)?;
    }
    if let Some(main_case) = main_case {
        if request.all_time_steps {
            statistics_case.select_all_time_steps(source.time_step_count(main_case))?;
        }
        if request.populate_defaults {
            statistics_case.populate_default_selection(source, main_case)?;
        }
    }
    Ok(())
}

#[derive(Deserialize)]
pub struct ValueQuery {
    pub ensemble_id: Uuid,
    pub statistics_case_id: Uuid,
    #[serde(default = "default_porosity")]
    pub porosity: PorosityModel,
    pub property: String,
    #[serde(default)]
    pub time_step: usize,
    pub kind: AggregateKind,
    pub ordinal: usize,
}

/// 单个单元的统计值，未定义时返回 null
#[get("/statistics/value")]
pub async fn get_statistics_value(data: web::Data<AppState>, query: web::Query<ValueQuery>) -> impl Responder {
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

    let value = statistics_case.aggregate_value_for(
        query.porosity,
        &query.property,
        query.time_step,
        query.kind,
        query.ordinal,
    );
    HttpResponse::Ok().json(serde_json::json!({
        "status": statistics_case.status(),
        "result_name": query.kind.result_name(&query.property),
        "time_step": query.time_step,
        "ordinal": query.ordinal,
        "value": value,
    }))
}
