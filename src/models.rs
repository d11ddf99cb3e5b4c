use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One row with numeric pre/post scores plus the optional descriptive columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRow {
    pub participant: Option<String>,
    pub gender: Option<String>,
    pub class: Option<String>,
    pub pre: f64,
    pub post: f64,
}

impl ScoreRow {
    pub fn gain(&self) -> f64 {
        self.post - self.pre
    }
}

/// Descriptive statistics over a set of score rows. Values are full precision;
/// every display surface rounds them with [`crate::metrics::round2`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverallMetrics {
    pub count: usize,
    pub mean_pre: f64,
    pub mean_post: f64,
    pub mean_gain: f64,
    pub percent_gain: f64,
    pub improvement_rate: f64,
}

impl OverallMetrics {
    pub fn is_finite(&self) -> bool {
        [
            self.mean_pre,
            self.mean_post,
            self.mean_gain,
            self.percent_gain,
            self.improvement_rate,
        ]
        .iter()
        .all(|value| value.is_finite())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupMetrics {
    pub key: String,
    pub metrics: OverallMetrics,
}

/// Mean gain across one `pre_<label>` / `post_<label>` column pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricGain {
    pub label: String,
    pub count: usize,
    pub mean_pre: f64,
    pub mean_post: f64,
    pub mean_gain: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    Overall,
    Dumbbell,
    Gender,
    Slopegraph,
    ClassGroupedBar,
    StackedGain,
}

impl ChartKind {
    pub fn title(self) -> &'static str {
        match self {
            ChartKind::Overall => "Pre vs Post Mean Scores",
            ChartKind::Dumbbell => "Knowledge Gap",
            ChartKind::Gender => "Average Scores by Gender",
            ChartKind::Slopegraph => "Individual Participant Journeys",
            ChartKind::ClassGroupedBar => "Pre vs Post Mean Scores by Class",
            ChartKind::StackedGain => "Mean Gain Across Metrics",
        }
    }

    pub fn file_prefix(self) -> &'static str {
        match self {
            ChartKind::Overall => "overall",
            ChartKind::Dumbbell => "dumbbell",
            ChartKind::Gender => "gender",
            ChartKind::Slopegraph => "slopegraph",
            ChartKind::ClassGroupedBar => "class",
            ChartKind::StackedGain => "stacked",
        }
    }
}

/// A rendered chart image held in the chart directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartArtifact {
    pub kind: ChartKind,
    pub title: String,
    pub file_name: String,
    pub web_path: String,
}

/// Everything one analysis run produced; the unit stored per session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub id: Uuid,
    pub source_name: String,
    pub generated_at: DateTime<Utc>,
    pub overall: OverallMetrics,
    pub gender_groups: Option<Vec<GroupMetrics>>,
    pub class_groups: Option<Vec<GroupMetrics>>,
    pub metric_gains: Option<Vec<MetricGain>>,
    pub rows: Vec<ScoreRow>,
    pub narrative: String,
    pub charts: Vec<ChartArtifact>,
    /// Optional features that could not be produced for this dataset.
    pub notices: Vec<String>,
}
