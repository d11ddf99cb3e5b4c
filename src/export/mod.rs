mod docx;
mod pdf;
mod xlsx;

use std::io::Cursor;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::charts::ChartStore;
use crate::error::ExportError;
use crate::metrics::round2;
use crate::models::{AnalysisResult, GroupMetrics, OverallMetrics};

pub const REPORT_TITLE: &str = "Pre and Post Test Analysis Report";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Word,
    Pdf,
    Excel,
}

impl ExportFormat {
    pub fn from_slug(slug: &str) -> Option<Self> {
        match slug {
            "word" | "docx" => Some(Self::Word),
            "pdf" => Some(Self::Pdf),
            "excel" | "xlsx" => Some(Self::Excel),
            _ => None,
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Self::Word => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            Self::Pdf => "application/pdf",
            Self::Excel => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Word => "docx",
            Self::Pdf => "pdf",
            Self::Excel => "xlsx",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Word => "Word",
            Self::Pdf => "PDF",
            Self::Excel => "Excel",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExportDocument {
    pub file_name: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

/// A chart image that still exists on disk, ready to embed.
#[derive(Debug, Clone)]
pub(crate) struct ChartImage {
    pub title: String,
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Exports the session's last analysis, if there is one.
pub fn export_latest(
    result: Option<&AnalysisResult>,
    format: ExportFormat,
    charts: &ChartStore,
) -> Result<ExportDocument, ExportError> {
    let result = result.ok_or(ExportError::NoAnalysisAvailable)?;
    export(result, format, charts)
}

pub fn export(
    result: &AnalysisResult,
    format: ExportFormat,
    charts: &ChartStore,
) -> Result<ExportDocument, ExportError> {
    let generated_at = Utc::now();
    let bytes = match format {
        ExportFormat::Word => docx::render(result, &load_chart_images(result, charts), generated_at)?,
        ExportFormat::Pdf => pdf::render(result, &load_chart_images(result, charts), generated_at)?,
        ExportFormat::Excel => xlsx::render(result, generated_at)?,
    };

    info!(
        analysis = %result.id,
        format = format.label(),
        bytes = bytes.len(),
        "report exported"
    );
    Ok(ExportDocument {
        file_name: format!(
            "test_score_analysis_report_{}.{}",
            generated_at.format("%Y%m%d_%H%M%S"),
            format.extension()
        ),
        content_type: format.content_type(),
        bytes,
    })
}

/// Reads every chart that is still present; anything missing or unreadable is skipped.
fn load_chart_images(result: &AnalysisResult, charts: &ChartStore) -> Vec<ChartImage> {
    result
        .charts
        .iter()
        .filter_map(|artifact| {
            let path = charts.path_of(artifact);
            let png = match std::fs::read(&path) {
                Ok(bytes) => bytes,
                Err(err) => {
                    debug!(path = %path.display(), error = %err, "chart missing from export");
                    return None;
                }
            };
            let Some((width, height)) = png_dimensions(&png) else {
                debug!(path = %path.display(), "chart is not a readable png");
                return None;
            };
            Some(ChartImage {
                title: artifact.title.clone(),
                png,
                width,
                height,
            })
        })
        .collect()
}

pub(crate) fn png_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    let reader = png::Decoder::new(Cursor::new(bytes)).read_info().ok()?;
    let info = reader.info();
    Some((info.width, info.height))
}

pub(crate) fn generated_label(generated_at: DateTime<Utc>) -> String {
    format!("Generated: {} UTC", generated_at.format("%Y-%m-%d %H:%M"))
}

pub(crate) fn metric_rows(overall: &OverallMetrics) -> Vec<(&'static str, f64)> {
    vec![
        ("Participants (N)", overall.count as f64),
        ("Mean Pre-Test", round2(overall.mean_pre)),
        ("Mean Post-Test", round2(overall.mean_post)),
        ("Mean Gain", round2(overall.mean_gain)),
        ("Percent Gain (%)", round2(overall.percent_gain)),
        ("Improvement Rate (%)", round2(overall.improvement_rate)),
    ]
}

pub(crate) const GROUP_HEADERS: [&str; 7] = [
    "Group",
    "N",
    "Mean Pre",
    "Mean Post",
    "Mean Gain",
    "% Gain",
    "% Improved",
];

pub(crate) fn group_cells(group: &GroupMetrics) -> [String; 7] {
    let m = &group.metrics;
    [
        group.key.clone(),
        m.count.to_string(),
        format!("{:.2}", round2(m.mean_pre)),
        format!("{:.2}", round2(m.mean_post)),
        format!("{:.2}", round2(m.mean_gain)),
        format!("{:.2}", round2(m.percent_gain)),
        format!("{:.2}", round2(m.improvement_rate)),
    ]
}

/// Sub-group tables present in a result, with their section titles.
pub(crate) fn group_sections(result: &AnalysisResult) -> Vec<(&'static str, &[GroupMetrics])> {
    let mut sections = Vec::new();
    if let Some(groups) = result.gender_groups.as_deref().filter(|g| !g.is_empty()) {
        sections.push(("Gender Disaggregation", groups));
    }
    if let Some(groups) = result.class_groups.as_deref().filter(|g| !g.is_empty()) {
        sections.push(("Class Breakdown", groups));
    }
    sections
}

pub(crate) fn format_metric(label: &str, value: f64) -> String {
    if label == "Participants (N)" {
        format!("{value:.0}")
    } else {
        format!("{value:.2}")
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::sample_result;
    use super::*;
    use crate::charts;

    #[test]
    fn export_without_analysis_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChartStore::new(dir.path(), "/charts");
        let err = export_latest(None, ExportFormat::Pdf, &store).unwrap_err();
        assert!(matches!(err, ExportError::NoAnalysisAvailable));
        assert_eq!(err.to_string(), "Nothing to export yet. Run an analysis first.");
    }

    #[test]
    fn missing_chart_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChartStore::new(dir.path(), "/charts");
        let mut result = sample_result();
        let kept = charts::render_overall(&store, &result.overall).unwrap();
        let removed = charts::render_overall(&store, &result.overall).unwrap();
        std::fs::remove_file(store.path_of(&removed)).unwrap();
        result.charts = vec![kept, removed];

        let images = load_chart_images(&result, &store);
        assert_eq!(images.len(), 1);

        for format in [ExportFormat::Word, ExportFormat::Pdf, ExportFormat::Excel] {
            let document = export(&result, format, &store).unwrap();
            assert!(!document.bytes.is_empty());
            assert_eq!(document.content_type, format.content_type());
            assert!(document.file_name.ends_with(format.extension()));
        }
    }

    #[test]
    fn word_and_excel_are_zip_packages_and_pdf_has_header() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChartStore::new(dir.path(), "/charts");
        let result = sample_result();

        let word = export(&result, ExportFormat::Word, &store).unwrap();
        assert_eq!(&word.bytes[..2], b"PK");
        let excel = export(&result, ExportFormat::Excel, &store).unwrap();
        assert_eq!(&excel.bytes[..2], b"PK");
        let pdf = export(&result, ExportFormat::Pdf, &store).unwrap();
        assert_eq!(&pdf.bytes[..5], b"%PDF-");
    }

    #[test]
    fn slugs_map_to_formats() {
        assert_eq!(ExportFormat::from_slug("word"), Some(ExportFormat::Word));
        assert_eq!(ExportFormat::from_slug("xlsx"), Some(ExportFormat::Excel));
        assert_eq!(ExportFormat::from_slug("csv"), None);
        assert_eq!(format_metric("Participants (N)", 3.0), "3");
        assert_eq!(format_metric("Mean Gain", 18.333), "18.33");
    }
}
