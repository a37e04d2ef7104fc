use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// 服务配置，每个参数都可以通过环境变量提供
#[derive(Parser, Debug, Clone)]
#[command(name = "ensemble-stats-backend")]
#[command(about = "案例组统计计算服务")]
pub struct ServerConfig {
    /// 监听地址
    #[arg(long, env = "ENSEMBLE_BIND", default_value = "127.0.0.1")]
    pub bind: String,

    /// 监听端口
    #[arg(long, env = "ENSEMBLE_PORT", default_value_t = 8080)]
    pub port: u16,

    /// 案例文件所在的资源目录
    #[arg(long, env = "ENSEMBLE_RESOURCE_DIR", default_value = "test/resource")]
    pub resource_dir: PathBuf,

    /// 工程保存目录
    #[arg(long, env = "ENSEMBLE_PROJECT_DIR", default_value = "project")]
    pub project_dir: PathBuf,

    /// 计算任务保留时间（分钟）
    #[arg(long, env = "ENSEMBLE_JOB_TTL_MINUTES", default_value_t = 30)]
    pub job_ttl_minutes: u64,

    /// 后台清理间隔（秒）
    #[arg(long, env = "ENSEMBLE_CLEANUP_INTERVAL_SECS", default_value_t = 300)]
    pub cleanup_interval_secs: u64,
}

impl ServerConfig {
    pub fn job_ttl(&self) -> Duration {
        Duration::from_secs(self.job_ttl_minutes * 60)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs.max(1))
    }
}
