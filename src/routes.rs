use actix_web::web;

use crate::handlers;

/// 统一注册 HTTP 路由，方便集中管理
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(handlers::hello)
        .service(handlers::load_case)
        .service(handlers::create_ensemble)
        .service(handlers::get_ensemble)
        .service(handlers::delete_ensemble)
        .service(handlers::add_ensemble_case)
        .service(handlers::remove_ensemble_case)
        .service(handlers::configure_statistics_case)
        .service(handlers::compute_statistics)
        .service(handlers::clear_statistics)
        .service(handlers::get_statistics_value)
        .service(handlers::get_statistics_chunk)
        .service(handlers::get_job)
        .service(handlers::cancel_job)
        .service(handlers::get_performance)
        .service(handlers::save_project)
        .service(handlers::load_project);
}
