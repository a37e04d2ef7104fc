use std::path::Path;
use std::time::Duration;

use actix_web::{App, test, web};
use serde_json::{Value, json};

use ensemble_stats::CaseEnsemble;
use ensemble_stats::app_state::AppState;
use ensemble_stats::performance::PerformanceStore;
use ensemble_stats::routes;
use ensemble_stats::task::JobStore;

const CASE_A: &str = r#"{
    "name": "CASE_A",
    "grids": [{ "name": "MAIN", "dimensions": [4, 1, 1] }],
    "active": { "MATRIX": [true, true, true, false] },
    "results": [{ "category": "DYNAMIC_NATIVE", "name": "PRESSURE", "time_steps": [[10.0, 20.0, 30.0]] }]
}"#;

const CASE_B: &str = r#"{
    "name": "CASE_B",
    "grids": [{ "name": "MAIN", "dimensions": [4, 1, 1] }],
    "active": { "MATRIX": [false, true, true, true] },
    "results": [{ "category": "DYNAMIC_NATIVE", "name": "PRESSURE", "time_steps": [[21.0, 31.0, 41.0]] }]
}"#;

fn app_state(resource_dir: &Path, project_dir: &Path) -> web::Data<AppState> {
    std::fs::write(resource_dir.join("CASE_A.json"), CASE_A).unwrap();
    std::fs::write(resource_dir.join("CASE_B.json"), CASE_B).unwrap();
    web::Data::new(AppState::new(
        resource_dir.to_path_buf(),
        project_dir.to_path_buf(),
        JobStore::new(),
        PerformanceStore::new(),
    ))
}

#[actix_web::test]
async fn root_lists_supported_extensions() {
    let resources = tempfile::tempdir().unwrap();
    let project = tempfile::tempdir().unwrap();
    let app = test::init_service(
        App::new()
            .app_data(app_state(resources.path(), project.path()))
            .configure(routes::configure),
    )
    .await;

    let body: Value = test::call_and_read_body_json(&app, test::TestRequest::get().uri("/").to_request()).await;
    assert_eq!(body["supported_extensions"], json!(["json"]));
    assert_eq!(body["ensembles"], json!(0));
}

#[actix_web::test]
async fn unknown_ensemble_is_not_found() {
    let resources = tempfile::tempdir().unwrap();
    let project = tempfile::tempdir().unwrap();
    let app = test::init_service(
        App::new()
            .app_data(app_state(resources.path(), project.path()))
            .configure(routes::configure),
    )
    .await;

    let req = test::TestRequest::get()
        .uri(&format!("/ensembles/{}", uuid::Uuid::new_v4()))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
}

#[actix_web::test]
async fn compute_job_publishes_mean_chunk() {
    let resources = tempfile::tempdir().unwrap();
    let project = tempfile::tempdir().unwrap();
    let app = test::init_service(
        App::new()
            .app_data(app_state(resources.path(), project.path()))
            .configure(routes::configure),
    )
    .await;

    let mut case_ids = Vec::new();
    for file in ["CASE_A.json", "CASE_B.json"] {
        let req = test::TestRequest::post()
            .uri("/cases/load")
            .set_json(json!({ "file": file }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        case_ids.push(body["case_id"].clone());
    }

    let req = test::TestRequest::post()
        .uri("/ensembles")
        .set_json(json!({ "name": "Group 1", "case_ids": case_ids }))
        .to_request();
    let ensemble: Value = test::call_and_read_body_json(&app, req).await;
    let ensemble_id = ensemble["id"].as_str().unwrap().to_string();
    let statistics_case_id = ensemble["statistics_cases"][0]["id"].as_str().unwrap().to_string();

    let req = test::TestRequest::post()
        .uri(&format!("/ensembles/{}/statistics", ensemble_id))
        .set_json(json!({
            "statistics_case_id": statistics_case_id,
            "selection": [{ "category": "DYNAMIC_NATIVE", "names": ["PRESSURE"] }],
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());

    let req = test::TestRequest::post()
        .uri(&format!("/ensembles/{}/statistics/{}/compute", ensemble_id, statistics_case_id))
        .to_request();
    let started: Value = test::call_and_read_body_json(&app, req).await;
    let job_id = started["job_id"].as_str().unwrap().to_string();

    let mut status = String::new();
    for _ in 0..200 {
        let req = test::TestRequest::get().uri(&format!("/jobs/{}", job_id)).to_request();
        let job: Value = test::call_and_read_body_json(&app, req).await;
        status = job["status"].as_str().unwrap().to_string();
        if status != "running" {
            break;
        }
        actix_web::rt::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(status, "completed");

    let req = test::TestRequest::get()
        .uri(&format!(
            "/statistics/chunk?ensemble_id={}&statistics_case_id={}&property=PRESSURE&kind=MEAN&start=1",
            ensemble_id, statistics_case_id
        ))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers().get("X-Result-Name").unwrap(), "PRESSURE_MEAN");
    assert_eq!(resp.headers().get("X-Chunk-Length").unwrap(), "3");

    let bytes = test::read_body(resp).await;
    let values: Vec<f64> = bytes
        .chunks_exact(8)
        .map(|chunk| f64::from_le_bytes(chunk.try_into().unwrap()))
        .collect();
    assert_eq!(values, vec![20.5, 30.5, 41.0]);
}

#[actix_web::test]
async fn saving_while_an_ensemble_computes_is_deferred() {
    let resources = tempfile::tempdir().unwrap();
    let project = tempfile::tempdir().unwrap();
    let state = app_state(resources.path(), project.path());
    let app = test::init_service(App::new().app_data(state.clone()).configure(routes::configure)).await;

    let ensemble = state.project.insert_ensemble(CaseEnsemble::new("Busy"));
    let ensemble_id = ensemble.lock().id();
    let guard = ensemble.lock();

    let resp = test::call_service(&app, test::TestRequest::post().uri("/project/save").to_request()).await;
    assert_eq!(resp.status(), 202);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "processing");
    assert_eq!(body["ensemble_id"], json!(ensemble_id));

    let resp = test::call_service(&app, test::TestRequest::post().uri("/project/load").to_request()).await;
    assert_eq!(resp.status(), 202);
    assert!(!project.path().join("project.json").exists());

    drop(guard);
    let resp = test::call_service(&app, test::TestRequest::post().uri("/project/save").to_request()).await;
    assert_eq!(resp.status(), 200);
    assert!(project.path().join("project.json").exists());
}

#[actix_web::test]
async fn saved_project_loads_back() {
    let resources = tempfile::tempdir().unwrap();
    let project = tempfile::tempdir().unwrap();
    let state = app_state(resources.path(), project.path());
    let app = test::init_service(App::new().app_data(state.clone()).configure(routes::configure)).await;

    let req = test::TestRequest::post()
        .uri("/cases/load")
        .set_json(json!({ "file": "CASE_A.json" }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let req = test::TestRequest::post()
        .uri("/ensembles")
        .set_json(json!({ "name": "Group 1", "case_ids": [body["case_id"].clone()] }))
        .to_request();
    let ensemble: Value = test::call_and_read_body_json(&app, req).await;

    let resp = test::call_service(&app, test::TestRequest::post().uri("/project/save").to_request()).await;
    assert_eq!(resp.status(), 200);

    let req = test::TestRequest::post().uri("/project/load").to_request();
    let loaded: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(loaded["ensembles"], json!(1));
    assert_eq!(loaded["reloaded_cases"], json!(0));
    assert_eq!(loaded["ensemble_ids"], json!([ensemble["id"].clone()]));
}

#[actix_web::test]
async fn deleted_ensemble_is_gone() {
    let resources = tempfile::tempdir().unwrap();
    let project = tempfile::tempdir().unwrap();
    let state = app_state(resources.path(), project.path());
    let app = test::init_service(App::new().app_data(state.clone()).configure(routes::configure)).await;

    let ensemble = state.project.insert_ensemble(CaseEnsemble::new("Group 1"));
    let ensemble_id = ensemble.lock().id();
    let uri = format!("/ensembles/{}", ensemble_id);

    let guard = ensemble.lock();
    let resp = test::call_service(&app, test::TestRequest::delete().uri(&uri).to_request()).await;
    assert_eq!(resp.status(), 202);
    drop(guard);
    drop(ensemble);

    let resp = test::call_service(&app, test::TestRequest::delete().uri(&uri).to_request()).await;
    assert_eq!(resp.status(), 200);
    let resp = test::call_service(&app, test::TestRequest::get().uri(&uri).to_request()).await;
    assert_eq!(resp.status(), 404);
    assert_eq!(state.project.ensemble_count(), 0);
}
