use actix_web::{App, HttpServer, web};
use clap::Parser;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use ensemble_stats::app_state::AppState;
use ensemble_stats::config::ServerConfig;
use ensemble_stats::performance::PerformanceStore;
use ensemble_stats::routes;
use ensemble_stats::task::JobStore;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "ensemble_stats=info,ensemble_stats_backend=info,actix_web=info".into()))
        .with(fmt::layer())
        .init();

    let config = ServerConfig::parse();
    let app_state = web::Data::new(AppState::new(
        config.resource_dir.clone(),
        config.project_dir.clone(),
        JobStore::with_ttl(config.job_ttl()),
        PerformanceStore::with_ttl(config.job_ttl()),
    ));

    for ext in app_state.reader_registry.supported_extensions() {
        info!(extension = %ext, "[启动] 已注册读取器");
    }

    // 定期清理过期任务、性能记录与不再使用的网格
    let cleanup_state = app_state.clone();
    let cleanup_interval = config.cleanup_interval();
    actix_web::rt::spawn(async move {
        let mut interval = actix_web::rt::time::interval(cleanup_interval);
        loop {
            interval.tick().await;
            let jobs = cleanup_state.job_store.cleanup_expired();
            let sessions = cleanup_state.performance_store.cleanup_expired();
            let grids = cleanup_state.project.registry().prune_released();
            if jobs + sessions + grids > 0 {
                info!(
                    jobs,
                    sessions,
                    grids,
                    remaining_jobs = cleanup_state.job_store.job_count(),
                    "[清理任务] 已清理过期数据"
                );
            }
        }
    });

    info!(
        bind = %config.bind,
        port = config.port,
        resource_dir = %config.resource_dir.display(),
        project_dir = %config.project_dir.display(),
        job_ttl_minutes = config.job_ttl_minutes,
        "[启动] 服务器启动"
    );

    HttpServer::new(move || App::new().app_data(app_state.clone()).configure(routes::configure))
        .bind((config.bind.as_str(), config.port))?
        .run()
        .await
}
