use std::collections::{BTreeMap, HashMap};
use std::io::{Read, Write};
use std::sync::Arc;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use parking_lot::RwLock;

use crate::active_cells::PorosityModel;
use crate::error::PersistenceError;
use crate::statistics::config::{AggregateKind, is_undefined};

const BLOB_MAGIC: &[u8; 4] = b"ESRS";
const BLOB_VERSION: u32 = 1;
/// 读取数组时每次最多分配的值个数，数量字段损坏时不会预先分配巨大的内存
const READ_CHUNK_VALUES: usize = 64 * 1024;

/// 一个（属性, 时间步）的全部统计数组，按并集有效序号索引
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateArrays {
    arrays: BTreeMap<AggregateKind, Vec<f64>>,
}

impl AggregateArrays {
    pub fn insert(&mut self, kind: AggregateKind, values: Vec<f64>) {
        self.arrays.insert(kind, values);
    }

    pub fn get(&self, kind: AggregateKind) -> Option<&[f64]> {
        self.arrays.get(&kind).map(Vec::as_slice)
    }

    pub fn kinds(&self) -> impl Iterator<Item = AggregateKind> + '_ {
        self.arrays.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.arrays.is_empty()
    }
}

type PropertyEntries = HashMap<String, BTreeMap<usize, Arc<AggregateArrays>>>;

/// 统计结果存储
///
/// 结果以（属性, 时间步）为单位整体发布，读取方只会看到完整的数组。
#[derive(Debug, Default)]
pub struct ResultStore {
    entries: RwLock<[PropertyEntries; 2]>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 发布一个（属性, 时间步）的结果，替换已有数据
    pub fn publish(&self, porosity: PorosityModel, property: &str, time_step: usize, arrays: AggregateArrays) {
        let mut entries = self.entries.write();
        entries[porosity.index()]
            .entry(property.to_string())
            .or_default()
            .insert(time_step, Arc::new(arrays));
    }

    pub fn get(&self, porosity: PorosityModel, property: &str, time_step: usize) -> Option<Arc<AggregateArrays>> {
        self.entries.read()[porosity.index()]
            .get(property)?
            .get(&time_step)
            .cloned()
    }

    /// 单个单元的统计值；未计算或未定义时返回 None
    pub fn value(
        &self,
        porosity: PorosityModel,
        property: &str,
        time_step: usize,
        kind: AggregateKind,
        ordinal: usize,
    ) -> Option<f64> {
        let entries = self.entries.read();
        let value = *entries[porosity.index()]
            .get(property)?
            .get(&time_step)?
            .get(kind)?
            .get(ordinal)?;
        (!is_undefined(value)).then_some(value)
    }

    /// 已发布的属性名（排序后）
    pub fn properties(&self, porosity: PorosityModel) -> Vec<String> {
        let mut names: Vec<String> = self.entries.read()[porosity.index()].keys().cloned().collect();
        names.sort();
        names
    }

    pub fn time_steps(&self, porosity: PorosityModel, property: &str) -> Vec<usize> {
        self.entries.read()[porosity.index()]
            .get(property)
            .map(|steps| steps.keys().copied().collect())
            .unwrap_or_default()
    }

    /// （属性, 时间步）条目数
    pub fn entry_count(&self) -> usize {
        self.entries
            .read()
            .iter()
            .map(|by_name| by_name.values().map(BTreeMap::len).sum::<usize>())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entry_count() == 0
    }

    pub fn clear(&self) {
        let mut entries = self.entries.write();
        for by_name in entries.iter_mut() {
            by_name.clear();
        }
    }

    /// 用另一个存储的内容整体替换当前内容
    pub fn replace_with(&self, other: ResultStore) {
        *self.entries.write() = other.entries.into_inner();
    }

    /// 写出为 gzip 压缩的小端二进制数据
    pub fn write_to<W: Write>(&self, writer: W) -> Result<(), PersistenceError> {
        let entries = self.entries.read();

        let mut records = Vec::new();
        for porosity in PorosityModel::ALL {
            let mut names: Vec<&String> = entries[porosity.index()].keys().collect();
            names.sort();
            for name in names {
                for (&time_step, arrays) in &entries[porosity.index()][name] {
                    for kind in arrays.kinds() {
                        records.push((porosity, name.as_str(), time_step, kind, arrays.get(kind).unwrap_or(&[])));
                    }
                }
            }
        }

        let mut encoder = GzEncoder::new(writer, Compression::default());
        encoder.write_all(BLOB_MAGIC)?;
        encoder.write_u32::<LittleEndian>(BLOB_VERSION)?;
        encoder.write_u64::<LittleEndian>(records.len() as u64)?;

        for (porosity, name, time_step, kind, values) in records {
            let name_len = u16::try_from(name.len())
                .map_err(|_| PersistenceError::Format(format!("属性名过长: {}", name)))?;
            let time_step = u32::try_from(time_step)
                .map_err(|_| PersistenceError::Format(format!("时间步超出范围: {}", time_step)))?;

            encoder.write_u8(porosity.index() as u8)?;
            encoder.write_u8(kind.code())?;
            encoder.write_u32::<LittleEndian>(time_step)?;
            encoder.write_u16::<LittleEndian>(name_len)?;
            encoder.write_all(name.as_bytes())?;
            encoder.write_u64::<LittleEndian>(values.len() as u64)?;
            for &value in values {
                encoder.write_f64::<LittleEndian>(value)?;
            }
        }
        encoder.finish()?;
        Ok(())
    }

    /// 检查每个数组的长度是否等于对应孔隙模型的有效单元数
    ///
    /// 出错时返回第一个不一致的（孔隙模型, 属性, 期望长度, 实际长度）。
    pub fn check_lengths(&self, expected: [usize; 2]) -> Result<(), (PorosityModel, String, usize, usize)> {
        let entries = self.entries.read();
        for porosity in PorosityModel::ALL {
            let want = expected[porosity.index()];
            for (name, by_step) in &entries[porosity.index()] {
                for arrays in by_step.values() {
                    for kind in arrays.kinds() {
                        let found = arrays.get(kind).map_or(0, <[f64]>::len);
                        if found != want {
                            return Err((porosity, name.clone(), want, found));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// 读取 [`ResultStore::write_to`] 写出的数据
    pub fn read_from<R: Read>(reader: R) -> Result<Self, PersistenceError> {
        let mut decoder = GzDecoder::new(reader);

        let mut magic = [0u8; 4];
        decoder.read_exact(&mut magic)?;
        if &magic != BLOB_MAGIC {
            return Err(PersistenceError::Format("不是统计结果数据文件".to_string()));
        }
        let version = decoder.read_u32::<LittleEndian>()?;
        if version != BLOB_VERSION {
            return Err(PersistenceError::Format(format!("不支持的结果数据版本: {}", version)));
        }

        let mut grouped: HashMap<(PorosityModel, String, usize), AggregateArrays> = HashMap::new();
        let record_count = decoder.read_u64::<LittleEndian>()?;
        for _ in 0..record_count {
            let porosity = match decoder.read_u8()? {
                0 => PorosityModel::Matrix,
                1 => PorosityModel::Fracture,
                other => return Err(PersistenceError::Format(format!("未知的孔隙模型编号: {}", other))),
            };
            let code = decoder.read_u8()?;
            let kind = AggregateKind::from_code(code)
                .ok_or_else(|| PersistenceError::Format(format!("未知的统计量编号: {}", code)))?;
            let time_step = decoder.read_u32::<LittleEndian>()? as usize;

            let name_len = decoder.read_u16::<LittleEndian>()? as usize;
            let mut name = vec![0u8; name_len];
            decoder.read_exact(&mut name)?;
            let name = String::from_utf8(name)
                .map_err(|e| PersistenceError::Format(format!("属性名不是有效的 UTF-8: {}", e)))?;

            let value_count = decoder.read_u64::<LittleEndian>()?;
            let values = read_values(&mut decoder, value_count)?;

            grouped.entry((porosity, name, time_step)).or_default().insert(kind, values);
        }

        let store = ResultStore::new();
        for ((porosity, name, time_step), arrays) in grouped {
            store.publish(porosity, &name, time_step, arrays);
        }
        Ok(store)
    }
}

/// 分块读取 `count` 个 f64，数据提前结束时返回格式错误
fn read_values<R: Read>(reader: &mut R, count: u64) -> Result<Vec<f64>, PersistenceError> {
    let truncated = |e: std::io::Error| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            PersistenceError::Format(format!("结果数据被截断: 需要 {} 个值", count))
        } else {
            PersistenceError::Io(e)
        }
    };

    let mut values = Vec::with_capacity(count.min(READ_CHUNK_VALUES as u64) as usize);
    let mut chunk = Vec::new();
    let mut remaining = count;
    while remaining > 0 {
        let len = remaining.min(READ_CHUNK_VALUES as u64) as usize;
        chunk.resize(len, 0.0);
        reader.read_f64_into::<LittleEndian>(&mut chunk).map_err(truncated)?;
        values.extend_from_slice(&chunk);
        remaining -= len as u64;
    }
    Ok(values)
}
