mod json_case;

pub use json_case::{CaseManifest, JsonCaseReader, ResultManifest};

/// 获取所有内置的读取器
pub fn get_all_readers() -> Vec<Box<dyn crate::utils::reader::CaseReader>> {
    vec![Box::new(JsonCaseReader::new())]
}
