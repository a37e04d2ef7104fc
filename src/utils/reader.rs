use std::path::Path;

use crate::case::InMemoryCase;
use crate::error::ReaderError;

/// 案例文件读取器 trait
/// 不同文件格式需要实现这个 trait
pub trait CaseReader: Send + Sync {
    /// 获取支持的文件扩展名（不含点号），例如: "json"
    fn supported_extensions(&self) -> Vec<&'static str>;

    /// 检查文件扩展名是否被支持
    fn supports(&self, extension: &str) -> bool {
        self.supported_extensions()
            .iter()
            .any(|ext| ext.eq_ignore_ascii_case(extension))
    }

    /// 读取案例：网格、有效单元与结果数据
    fn read_case(&self, file_path: &Path) -> Result<InMemoryCase, ReaderError>;

    /// 获取读取器名称（用于日志和错误信息）
    fn name(&self) -> &'static str;
}
