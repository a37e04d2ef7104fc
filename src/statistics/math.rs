//! 单元级统计数学
//!
//! 对一个单元收集到的样本计算基本统计量与百分位数。
//! 样本按成员加入顺序收集；百分位数计算前使用稳定排序，
//! 相同值保持成员顺序，保证结果可复现。

use crate::statistics::config::PercentileMethod;

/// 直方图估计百分位数使用的分箱数
pub const HISTOGRAM_BIN_COUNT: usize = 100;

/// 一个单元的基本统计量
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BasicStatistics {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub sum: f64,
    pub range: f64,
    pub mean: f64,
    /// 样本标准差，单个样本时为 0
    pub std_dev: f64,
}

/// 最小值、最大值与求和的累加器
#[derive(Debug, Clone, Copy)]
pub struct SampleAccumulator {
    count: usize,
    min: f64,
    max: f64,
    sum: f64,
}

impl Default for SampleAccumulator {
    fn default() -> Self {
        Self {
            count: 0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            sum: 0.0,
        }
    }
}

impl SampleAccumulator {
    pub fn push(&mut self, value: f64) {
        self.count += 1;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.sum += value;
    }

    /// 算术平均，限制在 [min, max] 内以抵消舍入误差
    pub fn mean(&self) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        Some((self.sum / self.count as f64).clamp(self.min, self.max))
    }
}

/// 计算基本统计量，没有样本时返回 None
pub fn basic_statistics(samples: &[f64]) -> Option<BasicStatistics> {
    let mut acc = SampleAccumulator::default();
    for &value in samples {
        acc.push(value);
    }
    let mean = acc.mean()?;

    // 两遍法计算方差
    let std_dev = if acc.count > 1 {
        let squares: f64 = samples.iter().map(|v| (v - mean) * (v - mean)).sum();
        (squares / (acc.count - 1) as f64).sqrt()
    } else {
        0.0
    };

    Some(BasicStatistics {
        count: acc.count,
        min: acc.min,
        max: acc.max,
        sum: acc.sum,
        range: acc.max - acc.min,
        mean,
        std_dev,
    })
}

/// 对样本进行稳定排序
pub fn sort_samples(samples: &mut [f64]) {
    samples.sort_by(f64::total_cmp);
}

/// 按指定方法计算百分位数
///
/// `sorted` 必须已按升序排列且非空；`percent` 取值 0–100
pub fn percentile(sorted: &[f64], percent: f64, method: PercentileMethod) -> f64 {
    match method {
        PercentileMethod::NearestObservation => nearest_observation(sorted, percent),
        PercentileMethod::InterpolatedObservation => interpolated_observation(sorted, percent),
        PercentileMethod::HistogramEstimated => histogram_estimated(sorted, percent),
    }
}

fn rank_position(count: usize, percent: f64) -> f64 {
    (percent / 100.0).clamp(0.0, 1.0) * (count - 1) as f64
}

/// 秩最接近 p/100 × (n-1) 的观测值，恰好居中时取较低的秩
pub fn nearest_observation(sorted: &[f64], percent: f64) -> f64 {
    let position = rank_position(sorted.len(), percent);
    let lower = position.floor();
    let rank = if position - lower > 0.5 { lower + 1.0 } else { lower };
    sorted[(rank as usize).min(sorted.len() - 1)]
}

/// 在包围 p/100 × (n-1) 的两个观测值之间线性插值
pub fn interpolated_observation(sorted: &[f64], percent: f64) -> f64 {
    let position = rank_position(sorted.len(), percent);
    let lower = position.floor() as usize;
    let upper = (position.ceil() as usize).min(sorted.len() - 1);
    let fraction = position - lower as f64;
    sorted[lower] + fraction * (sorted[upper] - sorted[lower])
}

/// 直方图估计：在 [min, max] 上等宽分箱，找到累积计数首次达到 p/100 × n 的箱，
/// 在箱内线性插值
pub fn histogram_estimated(samples: &[f64], percent: f64) -> f64 {
    let (min, max) = samples
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));

    if percent <= 0.0 || max <= min {
        return min;
    }

    let bin_width = (max - min) / HISTOGRAM_BIN_COUNT as f64;
    let mut bins = [0usize; HISTOGRAM_BIN_COUNT];
    for &value in samples {
        let bin = ((value - min) / bin_width) as usize;
        bins[bin.min(HISTOGRAM_BIN_COUNT - 1)] += 1;
    }

    let target = (percent / 100.0).min(1.0) * samples.len() as f64;
    let mut accumulated = 0.0;
    for (bin, &count) in bins.iter().enumerate() {
        accumulated += count as f64;
        if count > 0 && accumulated >= target {
            let end_of_bin = min + (bin + 1) as f64 * bin_width;
            let value = end_of_bin - ((accumulated - target) / count as f64) * bin_width;
            return value.clamp(min, max);
        }
    }
    max
}
