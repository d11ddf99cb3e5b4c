use std::collections::HashMap;

use crate::dataset::{ColumnRole, RawDataset};
use crate::error::MetricsError;
use crate::models::{GroupMetrics, MetricGain, OverallMetrics, ScoreRow};

/// Canonical gender labels kept in the gender breakdown.
pub const GENDER_ALLOW_LIST: [&str; 2] = ["Female", "Male"];

/// Sub-group dimensions a breakdown can be computed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disaggregation {
    Gender,
    Class,
}

impl Disaggregation {
    pub fn role(self) -> ColumnRole {
        match self {
            Disaggregation::Gender => ColumnRole::Gender,
            Disaggregation::Class => ColumnRole::Class,
        }
    }

    pub fn dimension(self) -> &'static str {
        match self {
            Disaggregation::Gender => "gender",
            Disaggregation::Class => "class",
        }
    }

    /// Normalized group key, or `None` when the row is left out of the breakdown.
    pub fn normalize(self, raw: &str) -> Option<String> {
        let trimmed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        if trimmed.is_empty() {
            return None;
        }
        match self {
            Disaggregation::Gender => {
                let key = capitalize(&trimmed);
                GENDER_ALLOW_LIST.contains(&key.as_str()).then_some(key)
            }
            Disaggregation::Class => Some(trimmed.to_uppercase()),
        }
    }

    fn value(self, row: &ScoreRow) -> Option<&str> {
        match self {
            Disaggregation::Gender => row.gender.as_deref(),
            Disaggregation::Class => row.class.as_deref(),
        }
    }
}

/// Division that yields 0 instead of a non-finite value for a zero denominator.
pub fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

/// Display rounding used by every rendered surface. Never yields `-0.0`.
pub fn round2(value: f64) -> f64 {
    let rounded = (value * 100.0).round() / 100.0;
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

/// Aggregates pre/post pairs. `None` when there are no pairs or the sums
/// overflow to a non-finite value.
pub fn summarize(pairs: impl IntoIterator<Item = (f64, f64)>) -> Option<OverallMetrics> {
    let mut count = 0usize;
    let mut total_pre = 0.0;
    let mut total_post = 0.0;
    let mut improved = 0usize;

    for (pre, post) in pairs {
        count += 1;
        total_pre += pre;
        total_post += post;
        if post > pre {
            improved += 1;
        }
    }

    if count == 0 {
        return None;
    }

    let mean_pre = total_pre / count as f64;
    let mean_post = total_post / count as f64;
    let mean_gain = mean_post - mean_pre;
    let metrics = OverallMetrics {
        count,
        mean_pre,
        mean_post,
        mean_gain,
        percent_gain: ratio(mean_gain, mean_pre) * 100.0,
        improvement_rate: ratio(improved as f64, count as f64) * 100.0,
    };
    metrics.is_finite().then_some(metrics)
}

/// Statistics over every valid row, whatever its sub-group category.
pub fn overall(rows: &[ScoreRow]) -> Result<OverallMetrics, MetricsError> {
    if rows.is_empty() {
        return Err(MetricsError::NoValidRows);
    }
    summarize(rows.iter().map(|row| (row.pre, row.post))).ok_or(MetricsError::OutOfRange)
}

/// Per-category statistics, sorted by key ascending. Rows whose category is
/// blank or outside the dimension's allow-list are left out.
pub fn disaggregate(
    dataset: &RawDataset,
    rows: &[ScoreRow],
    by: Disaggregation,
) -> Result<Vec<GroupMetrics>, MetricsError> {
    if !dataset.has_role(by.role()) {
        return Err(MetricsError::DisaggregationUnavailable {
            dimension: by.dimension(),
            aliases: by.role().describe_aliases(),
        });
    }
    Ok(group_rows(rows, by))
}

pub fn group_rows(rows: &[ScoreRow], by: Disaggregation) -> Vec<GroupMetrics> {
    let mut buckets: HashMap<String, Vec<(f64, f64)>> = HashMap::new();
    for row in rows {
        if let Some(key) = by.value(row).and_then(|raw| by.normalize(raw)) {
            buckets.entry(key).or_default().push((row.pre, row.post));
        }
    }

    let mut groups: Vec<GroupMetrics> = buckets
        .into_iter()
        .filter_map(|(key, pairs)| {
            summarize(pairs).map(|metrics| GroupMetrics { key, metrics })
        })
        .collect();

    groups.sort_by(|a, b| a.key.cmp(&b.key));
    groups
}

/// Group with the largest mean gain; the earliest group wins a tie.
pub fn highest_gain(groups: &[GroupMetrics]) -> Option<&GroupMetrics> {
    groups.iter().fold(None, |best: Option<&GroupMetrics>, group| match best {
        Some(current) if current.metrics.mean_gain >= group.metrics.mean_gain => Some(current),
        _ => Some(group),
    })
}

/// Mean gains for each `pre_X`/`post_X` pair that has at least one numeric row.
pub fn metric_gains(dataset: &RawDataset) -> Result<Vec<MetricGain>, MetricsError> {
    let gains: Vec<MetricGain> = dataset
        .metric_pairs()
        .into_iter()
        .filter_map(|(label, pre, post)| {
            let pairs = (0..dataset.row_count()).filter_map(|row| {
                Some((dataset.numeric(row, pre)?, dataset.numeric(row, post)?))
            });
            summarize(pairs).map(|metrics| MetricGain {
                label,
                count: metrics.count,
                mean_pre: metrics.mean_pre,
                mean_post: metrics.mean_post,
                mean_gain: metrics.mean_gain,
            })
        })
        .collect();

    if gains.len() < 2 {
        return Err(MetricsError::InsufficientMetricPairs { found: gains.len() });
    }
    Ok(gains)
}

fn capitalize(value: &str) -> String {
    let lower = value.to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
