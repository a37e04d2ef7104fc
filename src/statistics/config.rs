use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::active_cells::PorosityModel;
use crate::case::ResultCategory;
use crate::error::StatisticsError;

/// 未定义值标记：没有任何样本参与的单元使用该值，而不是 0
pub const UNDEFINED_VALUE: f64 = f64::INFINITY;

/// 判断一个值是否为未定义标记（NaN 同样视为未定义）
pub fn is_undefined(value: f64) -> bool {
    value == UNDEFINED_VALUE || value.is_nan()
}

/// 统计量种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AggregateKind {
    Min,
    Max,
    Sum,
    Range,
    Mean,
    StdDev,
    PLow,
    PMid,
    PHigh,
}

impl AggregateKind {
    pub const BASIC: [AggregateKind; 6] = [
        AggregateKind::Min,
        AggregateKind::Max,
        AggregateKind::Sum,
        AggregateKind::Range,
        AggregateKind::Mean,
        AggregateKind::StdDev,
    ];

    pub const PERCENTILES: [AggregateKind; 3] =
        [AggregateKind::PLow, AggregateKind::PMid, AggregateKind::PHigh];

    /// 发布结果时附加在属性名后的后缀
    pub fn suffix(self) -> &'static str {
        match self {
            AggregateKind::Min => "_MIN",
            AggregateKind::Max => "_MAX",
            AggregateKind::Sum => "_SUM",
            AggregateKind::Range => "_RANGE",
            AggregateKind::Mean => "_MEAN",
            AggregateKind::StdDev => "_DEV",
            AggregateKind::PLow => "_PMIN",
            AggregateKind::PMid => "_PMID",
            AggregateKind::PHigh => "_PMAX",
        }
    }

    pub fn code(self) -> u8 {
        match self {
            AggregateKind::Min => 0,
            AggregateKind::Max => 1,
            AggregateKind::Sum => 2,
            AggregateKind::Range => 3,
            AggregateKind::Mean => 4,
            AggregateKind::StdDev => 5,
            AggregateKind::PLow => 6,
            AggregateKind::PMid => 7,
            AggregateKind::PHigh => 8,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::BASIC
            .iter()
            .chain(Self::PERCENTILES.iter())
            .copied()
            .find(|kind| kind.code() == code)
    }

    /// 统计结果名称，例如 PRESSURE_MEAN
    pub fn result_name(self, property: &str) -> String {
        format!("{}{}", property, self.suffix())
    }
}

/// 百分位数计算方法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PercentileMethod {
    /// 取秩最接近的观测值
    NearestObservation,
    /// 基于直方图估计的累积分布插值
    HistogramEstimated,
    /// 在相邻两个观测值之间线性插值
    #[default]
    InterpolatedObservation,
}

/// 百分位数配置，百分比取值 0–100
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PercentileConfig {
    pub enabled: bool,
    pub method: PercentileMethod,
    pub low: f64,
    pub mid: f64,
    pub high: f64,
}

impl Default for PercentileConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            method: PercentileMethod::default(),
            low: 10.0,
            mid: 50.0,
            high: 90.0,
        }
    }
}

impl PercentileConfig {
    pub fn validate(&self) -> Result<(), StatisticsError> {
        for (name, value) in [("low", self.low), ("mid", self.mid), ("high", self.high)] {
            if !value.is_finite() || !(0.0..=100.0).contains(&value) {
                return Err(StatisticsError::InvalidPercentile { name, value });
            }
        }
        Ok(())
    }

    /// 需要计算的统计量种类
    pub fn aggregate_kinds(&self) -> Vec<AggregateKind> {
        let mut kinds = AggregateKind::BASIC.to_vec();
        if self.enabled {
            kinds.extend(AggregateKind::PERCENTILES);
        }
        kinds
    }

    pub fn position(&self, kind: AggregateKind) -> Option<f64> {
        match kind {
            AggregateKind::PLow => Some(self.low),
            AggregateKind::PMid => Some(self.mid),
            AggregateKind::PHigh => Some(self.high),
            _ => None,
        }
    }
}

/// 一个待统计的结果
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResultSpec {
    pub porosity: PorosityModel,
    pub category: ResultCategory,
    pub property: String,
}

impl ResultSpec {
    pub fn new(porosity: PorosityModel, category: ResultCategory, property: impl Into<String>) -> Self {
        Self {
            porosity,
            category,
            property: property.into(),
        }
    }
}

/// 每个（孔隙模型, 结果类别）下选中的属性名
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertySelection {
    #[serde(with = "selection_entries")]
    selected: BTreeMap<(PorosityModel, ResultCategory), Vec<String>>,
}

impl PropertySelection {
    /// 设置一个类别的属性
    /// 结果按属性名发布，同一孔隙模型下属性名只能属于一个类别
    pub fn set(
        &mut self,
        porosity: PorosityModel,
        category: ResultCategory,
        names: Vec<String>,
    ) -> Result<(), StatisticsError> {
        let mut names = names;
        let mut seen = std::collections::HashSet::new();
        names.retain(|name| seen.insert(name.clone()));

        for name in &names {
            if let Some(existing) = self.category_of(porosity, name)
                && existing != category
            {
                return Err(StatisticsError::DuplicateProperty { name: name.clone(), category: existing });
            }
        }

        if names.is_empty() {
            self.selected.remove(&(porosity, category));
        } else {
            self.selected.insert((porosity, category), names);
        }
        Ok(())
    }

    /// 属性名在该孔隙模型下所属的类别
    pub fn category_of(&self, porosity: PorosityModel, name: &str) -> Option<ResultCategory> {
        ResultCategory::ALL
            .into_iter()
            .find(|&category| self.get(porosity, category).iter().any(|n| n == name))
    }

    /// 检查整体替换进来的选择没有跨类别重名
    pub fn validate(&self) -> Result<(), StatisticsError> {
        for porosity in PorosityModel::ALL {
            let mut seen = std::collections::HashMap::new();
            for category in ResultCategory::ALL {
                for name in self.get(porosity, category) {
                    if let Some(&first) = seen.get(name.as_str()) {
                        return Err(StatisticsError::DuplicateProperty { name: name.clone(), category: first });
                    }
                    seen.insert(name.as_str(), category);
                }
            }
        }
        Ok(())
    }

    pub fn get(&self, porosity: PorosityModel, category: ResultCategory) -> &[String] {
        self.selected
            .get(&(porosity, category))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    /// 按孔隙模型、类别顺序展开为结果列表
    pub fn result_specs(&self) -> Vec<ResultSpec> {
        PorosityModel::ALL
            .iter()
            .flat_map(|&porosity| {
                ResultCategory::ALL.iter().flat_map(move |&category| {
                    self.get(porosity, category)
                        .iter()
                        .map(move |name| ResultSpec::new(porosity, category, name.clone()))
                })
            })
            .collect()
    }

    /// 计算设置的文本摘要
    pub fn summary(&self, percentiles: &PercentileConfig) -> String {
        let mut text = String::from("Statistical variables to compute:\n  Min, Max, Sum, Range, Mean, Std.dev\n");
        if percentiles.enabled {
            let _ = writeln!(
                text,
                "  Percentiles for : {}, {}, {}",
                percentiles.low, percentiles.mid, percentiles.high
            );
        }

        for porosity in PorosityModel::ALL {
            for category in ResultCategory::ALL {
                let names = self.get(porosity, category);
                if names.is_empty() {
                    continue;
                }
                match porosity {
                    PorosityModel::Matrix => {
                        let _ = writeln!(text, "{}:", category.label());
                    }
                    PorosityModel::Fracture => {
                        let _ = writeln!(text, "{}, fracture model:", category.label());
                    }
                }
                let _ = writeln!(text, "  {}", names.join(", "));
            }
        }
        text
    }
}

/// BTreeMap 的元组键无法直接作为 JSON 对象键，序列化为条目列表
mod selection_entries {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use crate::active_cells::PorosityModel;
    use crate::case::ResultCategory;

    #[derive(Serialize, Deserialize)]
    struct Entry {
        porosity: PorosityModel,
        category: ResultCategory,
        names: Vec<String>,
    }

    pub fn serialize<S: Serializer>(
        map: &BTreeMap<(PorosityModel, ResultCategory), Vec<String>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let entries: Vec<Entry> = map
            .iter()
            .map(|(&(porosity, category), names)| Entry {
                porosity,
                category,
                names: names.clone(),
            })
            .collect();
        entries.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<(PorosityModel, ResultCategory), Vec<String>>, D::Error> {
        let entries = Vec::<Entry>::deserialize(deserializer)?;
        Ok(entries
            .into_iter()
            .filter(|entry| !entry.names.is_empty())
            .map(|entry| ((entry.porosity, entry.category), entry.names))
            .collect())
    }
}
