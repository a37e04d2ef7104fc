use std::path::Path;

use crate::utils::reader::CaseReader;

/// 读取器注册表
/// 管理所有可用的案例读取器，并根据文件扩展名匹配对应的读取器
pub struct CaseReaderRegistry {
    readers: Vec<Box<dyn CaseReader>>,
}

impl CaseReaderRegistry {
    /// 创建新的读取器注册表，自动注册所有内置读取器
    pub fn new() -> Self {
        Self {
            readers: crate::readers::get_all_readers(),
        }
    }

    pub fn register(&mut self, reader: Box<dyn CaseReader>) {
        self.readers.push(reader);
    }

    /// 根据文件扩展名查找匹配的读取器
    /// extension: 文件扩展名（不含点号），例如 "json"
    pub fn find_reader(&self, extension: &str) -> Option<&dyn CaseReader> {
        self.readers
            .iter()
            .find(|reader| reader.supports(extension))
            .map(|r| r.as_ref())
    }

    /// 根据文件路径查找匹配的读取器
    pub fn find_reader_for_file(&self, file_path: &Path) -> Option<(&dyn CaseReader, String)> {
        let extension = file_path.extension().and_then(|ext| ext.to_str())?.to_string();

        self.find_reader(&extension).map(|reader| (reader, extension))
    }

    /// 获取所有支持的扩展名列表
    pub fn supported_extensions(&self) -> Vec<String> {
        let mut extensions: Vec<String> = self
            .readers
            .iter()
            .flat_map(|reader| reader.supported_extensions())
            .map(str::to_lowercase)
            .collect();
        extensions.sort();
        extensions.dedup();
        extensions
    }
}

impl Default for CaseReaderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
