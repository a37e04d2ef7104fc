use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::statistics::EvaluationReport;

/// 性能数据记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceRecord {
    /// 开始时间 (Unix 时间戳，毫秒)
    pub start_time: u64,
    /// 结束时间 (Unix 时间戳，毫秒)
    pub end_time: u64,
    /// 行组 (同一行组颜色相同)，这里使用孔隙模型
    pub channel_group: String,
    /// 行号，这里使用属性名
    pub channel_index: String,
    /// 消息 (hover 时除了时间外的显示信息)
    pub msg: String,
}

impl PerformanceRecord {
    /// 把一次统计计算的工作单元计时转换为时间线记录
    /// 工作单元按顺序执行，从 `started_ms` 开始依次排列
    pub fn from_report(report: &EvaluationReport, started_ms: u64) -> Vec<PerformanceRecord> {
        let mut cursor = started_ms;
        report
            .units
            .iter()
            .map(|unit| {
                let duration_ms = unit.duration.as_millis() as u64;
                let record = PerformanceRecord {
                    start_time: cursor,
                    end_time: cursor + duration_ms,
                    channel_group: unit.porosity.label().to_string(),
                    channel_index: unit.property.clone(),
                    msg: format!(
                        "时间步 {}: {} 个单元，{} 个有样本",
                        unit.time_step, unit.cell_count, unit.contributing_cells
                    ),
                };
                cursor += duration_ms;
                record
            })
            .collect()
    }
}

/// 性能数据存储
/// 按 session_id（计算任务 id）存储性能记录
pub struct PerformanceStore {
    /// session_id -> 性能记录列表
    records: RwLock<HashMap<String, Vec<PerformanceRecord>>>,
    /// TTL（Time-To-Live）默认过期时间
    default_ttl: Duration,
    /// session_id -> 创建时间
    session_times: RwLock<HashMap<String, SystemTime>>,
}

impl PerformanceStore {
    pub fn new() -> Self {
        Self::with_ttl(Duration::from_secs(30 * 60))
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            default_ttl: ttl,
            session_times: RwLock::new(HashMap::new()),
        }
    }

    /// 批量添加性能记录
    pub fn add_records(&self, session_id: &str, records: Vec<PerformanceRecord>) {
        let mut all_records = self.records.write();
        all_records.entry(session_id.to_string()).or_default().extend(records);

        // 记录会话创建时间（如果还没有）
        self.session_times
            .write()
            .entry(session_id.to_string())
            .or_insert_with(SystemTime::now);
    }

    /// 获取指定会话的所有性能记录
    pub fn get_records(&self, session_id: &str) -> Option<Vec<PerformanceRecord>> {
        self.records.read().get(session_id).cloned()
    }

    /// 清理过期的会话
    pub fn cleanup_expired(&self) -> usize {
        let now = SystemTime::now();
        let mut records = self.records.write();
        let mut session_times = self.session_times.write();
        let before_count = records.len();

        let expired_sessions: Vec<String> = session_times
            .iter()
            .filter(|(_, created_at)| now.duration_since(**created_at).unwrap_or(Duration::ZERO) > self.default_ttl)
            .map(|(session_id, _)| session_id.clone())
            .collect();

        for session_id in &expired_sessions {
            records.remove(session_id);
            session_times.remove(session_id);
        }

        before_count - records.len()
    }
}

impl Default for PerformanceStore {
    fn default() -> Self {
        Self::new()
    }
}

/// 获取 Unix 时间戳（毫秒）
pub fn get_unix_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
