use std::io::Write as _;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::charts::{self, ChartStore};
use crate::dataset::{DatasetFormat, DatasetLimits, RawDataset};
use crate::error::{AnalysisError, ChartError, MetricsError};
use crate::metrics::{self, Disaggregation};
use crate::models::{AnalysisResult, ChartArtifact, ChartKind};
use crate::narrative::{build_narrative, Breakdown};

#[derive(Debug, Clone, Copy)]
pub struct AnalysisRequest<'a> {
    pub source_name: &'a str,
    pub bytes: &'a [u8],
    pub disaggregate: bool,
}

/// Runs the whole pipeline for one upload: load, compute, narrate, chart.
///
/// Only dataset and overall-metric failures abort. Optional breakdowns and
/// charts that cannot be produced are recorded in `notices` (or skipped
/// quietly when the dataset simply lacks the columns they need).
pub fn analyze(
    request: &AnalysisRequest<'_>,
    limits: DatasetLimits,
    store: &ChartStore,
) -> Result<AnalysisResult, AnalysisError> {
    let format = DatasetFormat::from_file_name(request.source_name)?;
    let dataset = RawDataset::load(request.bytes, format, limits)?;
    let rows = dataset.score_rows();
    let overall = metrics::overall(&rows)?;

    let mut notices = Vec::new();
    let gender_groups = if request.disaggregate {
        match metrics::disaggregate(&dataset, &rows, Disaggregation::Gender) {
            Ok(groups) => Some(groups),
            Err(err) => {
                notices.push(err.to_string());
                None
            }
        }
    } else {
        None
    };

    let class_groups = if request.disaggregate {
        metrics::disaggregate(&dataset, &rows, Disaggregation::Class)
            .ok()
            .filter(|groups| !groups.is_empty())
    } else {
        None
    };

    let metric_gains = match metrics::metric_gains(&dataset) {
        Ok(gains) => Some(gains),
        Err(MetricsError::InsufficientMetricPairs { found: 0 }) => None,
        Err(err) => {
            notices.push(err.to_string());
            None
        }
    };

    let mut breakdowns = Vec::new();
    if let Some(groups) = &gender_groups {
        breakdowns.push(Breakdown {
            dimension: "gender",
            groups,
        });
    }
    if let Some(groups) = &class_groups {
        breakdowns.push(Breakdown {
            dimension: "class",
            groups,
        });
    }
    let narrative = build_narrative(&overall, &breakdowns);

    let mut chart_list = Vec::new();
    let mut keep = |kind: ChartKind, outcome: Result<ChartArtifact, ChartError>| match outcome {
        Ok(artifact) => chart_list.push(artifact),
        Err(
            ChartError::MissingIdentifier
            | ChartError::MissingCategory
            | ChartError::Metrics(MetricsError::InsufficientMetricPairs { found: 0 }),
        ) => debug!(chart = kind.file_prefix(), "chart skipped: columns not present"),
        Err(err) => {
            warn!(chart = kind.file_prefix(), error = %err, "chart skipped");
            notices.push(format!("{} chart unavailable: {err}", kind.title()));
        }
    };

    keep(ChartKind::Overall, charts::render_overall(store, &overall));
    keep(ChartKind::Dumbbell, charts::render_dumbbell(store, &overall));
    if let Some(groups) = gender_groups.as_deref().filter(|groups| !groups.is_empty()) {
        keep(ChartKind::Gender, charts::render_gender(store, groups));
    }
    keep(
        ChartKind::Slopegraph,
        charts::render_slopegraph(store, &dataset, &rows),
    );
    keep(
        ChartKind::ClassGroupedBar,
        charts::render_class_comparison(store, &dataset, &rows),
    );
    if let Some(gains) = &metric_gains {
        keep(ChartKind::StackedGain, charts::render_stacked_gain(store, gains));
    }

    info!(
        source = request.source_name,
        rows = dataset.row_count(),
        valid = overall.count,
        charts = chart_list.len(),
        notices = notices.len(),
        "analysis complete"
    );

    Ok(AnalysisResult {
        id: Uuid::new_v4(),
        source_name: request.source_name.to_string(),
        generated_at: Utc::now(),
        overall,
        gender_groups,
        class_groups,
        metric_gains,
        rows,
        narrative,
        charts: chart_list,
        notices,
    })
}

/// An upload written to a temporary file in the uploads directory.
///
/// Dropping it removes the temporary file; only [`StagedUpload::keep`] gives
/// it its final `<uuid>_<sanitized name>` path.
#[derive(Debug)]
pub struct StagedUpload {
    file: NamedTempFile,
    target: PathBuf,
}

impl StagedUpload {
    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn keep(self) -> std::io::Result<PathBuf> {
        self.file
            .persist_noclobber(&self.target)
            .map_err(|err| err.error)?;
        Ok(self.target)
    }
}

pub fn stage_upload(
    dir: &Path,
    original_name: &str,
    bytes: &[u8],
) -> std::io::Result<StagedUpload> {
    std::fs::create_dir_all(dir)?;
    let target = dir.join(format!(
        "{}_{}",
        Uuid::new_v4().simple(),
        sanitize_file_name(original_name)
    ));

    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(bytes)?;
    Ok(StagedUpload { file, target })
}

pub fn sanitize_file_name(name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .and_then(|base| base.to_str())
        .unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DatasetError;
    use crate::metrics::round2;

    const SCENARIO: &str = "pre_test,post_test,gender\n50,70,Male\n60,55,Female\n40,80,Male\n";

    fn run(name: &str, text: &str, disaggregate: bool) -> Result<AnalysisResult, AnalysisError> {
        let dir = tempfile::tempdir().unwrap();
        let store = ChartStore::new(dir.path(), "/static/charts/testscore");
        let request = AnalysisRequest {
            source_name: name,
            bytes: text.as_bytes(),
            disaggregate,
        };
        analyze(&request, DatasetLimits::default(), &store)
    }

    #[test]
    fn scenario_produces_metrics_groups_and_charts() {
        let result = run("scores.csv", SCENARIO, true).unwrap();
        assert_eq!(result.overall.count, 3);
        assert_eq!(round2(result.overall.mean_post), 68.33);

        let groups = result.gender_groups.as_ref().unwrap();
        assert_eq!(groups.len(), 2);

        let kinds: Vec<ChartKind> = result.charts.iter().map(|c| c.kind).collect();
        assert_eq!(kinds, [ChartKind::Overall, ChartKind::Dumbbell, ChartKind::Gender]);
        assert!(result.notices.is_empty());
        assert!(result.narrative.contains("Disaggregated by gender"));
        assert_eq!(result.rows.len(), 3);
    }

    #[test]
    fn without_flag_no_gender_breakdown() {
        let result = run("scores.csv", SCENARIO, false).unwrap();
        assert!(result.gender_groups.is_none());
        assert!(!result.narrative.contains("Disaggregated"));
    }

    #[test]
    fn class_breakdown_follows_the_disaggregate_flag() {
        let text = "pre_test,post_test,class\n50,70,a\n60,55,b\n40,80,a\n";

        let plain = run("scores.csv", text, false).unwrap();
        assert!(plain.class_groups.is_none());
        assert!(!plain.narrative.contains("Disaggregated by class"));
        // The class chart does not depend on the flag.
        assert!(plain.charts.iter().any(|c| c.kind == ChartKind::ClassGroupedBar));

        let split = run("scores.csv", text, true).unwrap();
        let groups = split.class_groups.as_ref().unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].key, "A");
        assert!(split.narrative.contains("Disaggregated by class"));
    }

    #[test]
    fn unavailable_disaggregation_is_a_notice_not_a_failure() {
        let result = run("scores.csv", "pre_test,post_test\n1,2\n", true).unwrap();
        assert!(result.gender_groups.is_none());
        assert_eq!(result.notices.len(), 1);
        assert!(result.notices[0].contains("gender"));
        assert_eq!(result.charts.len(), 2);
    }

    #[test]
    fn optional_columns_unlock_optional_charts() {
        let text = "pre_test,post_test,name,class,pre_q1,post_q1,pre_q2,post_q2\n\
                    50,70,Ann,A,1,2,3,5\n\
                    60,55,Ben,B,2,2,4,4\n";
        let result = run("scores.csv", text, false).unwrap();
        let kinds: Vec<ChartKind> = result.charts.iter().map(|c| c.kind).collect();
        assert_eq!(
            kinds,
            [
                ChartKind::Overall,
                ChartKind::Dumbbell,
                ChartKind::Slopegraph,
                ChartKind::ClassGroupedBar,
                ChartKind::StackedGain
            ]
        );
        assert!(result.class_groups.is_none());
        assert_eq!(result.metric_gains.as_ref().unwrap().len(), 2);
    }

    #[test]
    fn single_metric_pair_is_reported() {
        let text = "pre_test,post_test,pre_q1,post_q1\n50,70,1,2\n";
        let result = run("scores.csv", text, false).unwrap();
        assert!(result.metric_gains.is_none());
        assert!(result.notices.iter().any(|n| n.contains("two metric pairs")));
    }

    #[test]
    fn missing_post_test_fails_with_schema_error() {
        let err = run("scores.csv", "pre_test,score\n1,2\n", false).unwrap_err();
        assert!(matches!(err, AnalysisError::Dataset(DatasetError::Schema(_))));
        assert!(err.is_user_correctable());
    }

    #[test]
    fn unsupported_extension_fails_before_parsing() {
        let err = run("scores.txt", SCENARIO, false).unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::Dataset(DatasetError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn overflowing_scores_are_a_user_error() {
        let err = run("scores.csv", "pre_test,post_test\n1e308,1e308\n1e308,1.7e308\n", true)
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Metrics(MetricsError::OutOfRange)));
        assert!(err.is_user_correctable());
    }

    #[test]
    fn uploads_are_stored_under_unique_sanitized_names() {
        let dir = tempfile::tempdir().unwrap();
        let first = stage_upload(dir.path(), "../My Scores (1).csv", b"a")
            .unwrap()
            .keep()
            .unwrap();
        let second = stage_upload(dir.path(), "../My Scores (1).csv", b"b")
            .unwrap()
            .keep()
            .unwrap();
        assert_ne!(first, second);
        assert_eq!(first.parent().unwrap(), dir.path());
        let name = first.file_name().unwrap().to_str().unwrap();
        assert!(name.ends_with("_My_Scores__1_.csv"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn dropped_uploads_leave_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let staged = stage_upload(dir.path(), "scores.csv", b"pre_test\n1\n").unwrap();
        assert!(!staged.target().exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);

        drop(staged);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn sanitizing_never_yields_an_empty_name() {
        assert_eq!(sanitize_file_name(""), "upload");
        assert_eq!(sanitize_file_name("..."), "upload");
        assert_eq!(sanitize_file_name("scores.xlsx"), "scores.xlsx");
    }
}
