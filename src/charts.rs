//! Chart artifacts.
//!
//! Each render call builds its own plotters SVG surface, rasterizes it with
//! resvg and writes an RGB PNG under a fresh UUID file name. Nothing about the
//! drawing context outlives the call.

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::Lazy;
use plotters::coord::Shift;
use plotters::drawing::DrawingAreaErrorKind;
use plotters::prelude::*;
use resvg::{tiny_skia, usvg};
use tracing::debug;
use uuid::Uuid;

use crate::dataset::{ColumnRole, RawDataset};
use crate::error::{ChartError, MetricsError};
use crate::metrics::{self, Disaggregation};
use crate::models::{ChartArtifact, ChartKind, GroupMetrics, MetricGain, OverallMetrics, ScoreRow};

/// Rows drawn in a slopegraph before it stops being legible.
pub const SLOPEGRAPH_ROW_CAP: usize = 40;

const WIDTH: u32 = 900;
const HEIGHT: u32 = 520;

const PRE_COLOR: RGBColor = RGBColor(86, 119, 164);
const POST_COLOR: RGBColor = RGBColor(221, 132, 82);
const UP_COLOR: RGBColor = RGBColor(64, 145, 108);
const DOWN_COLOR: RGBColor = RGBColor(196, 78, 82);
const SEGMENT_COLORS: [RGBColor; 6] = [
    RGBColor(86, 119, 164),
    RGBColor(221, 132, 82),
    RGBColor(85, 168, 104),
    RGBColor(196, 78, 82),
    RGBColor(129, 114, 179),
    RGBColor(147, 120, 96),
];

type Area<'a> = DrawingArea<SVGBackend<'a>, Shift>;
type DrawResult = Result<(), DrawingAreaErrorKind<std::io::Error>>;

pub(crate) static FONTS: Lazy<Arc<usvg::fontdb::Database>> = Lazy::new(|| {
    let mut fonts = usvg::fontdb::Database::new();
    fonts.load_system_fonts();
    let preferred = ["DejaVu Sans", "Liberation Sans", "Arial", "Helvetica"];
    let available = preferred.iter().find(|family| {
        fonts
            .faces()
            .any(|face| face.families.iter().any(|(name, _)| name.as_str() == **family))
    });
    if let Some(family) = available {
        fonts.set_sans_serif_family(*family);
    }
    debug!(faces = fonts.len(), "loaded chart fonts");
    Arc::new(fonts)
});

/// Directory that chart PNGs are written to, plus the URL prefix it is served under.
#[derive(Debug, Clone)]
pub struct ChartStore {
    dir: PathBuf,
    web_prefix: String,
}

impl ChartStore {
    pub fn new(dir: impl Into<PathBuf>, web_prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            web_prefix: web_prefix.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_of(&self, artifact: &ChartArtifact) -> PathBuf {
        self.dir.join(&artifact.file_name)
    }

    fn persist(&self, kind: ChartKind, png: &[u8]) -> Result<ChartArtifact, ChartError> {
        let write_error = |path: &Path, source| ChartError::Write {
            path: path.to_path_buf(),
            source,
        };
        std::fs::create_dir_all(&self.dir).map_err(|err| write_error(&self.dir, err))?;

        let file_name = format!("{}_{}.png", kind.file_prefix(), Uuid::new_v4().simple());
        let path = self.dir.join(&file_name);

        // The temp file is removed on drop if anything below fails.
        let mut staged =
            tempfile::NamedTempFile::new_in(&self.dir).map_err(|err| write_error(&self.dir, err))?;
        staged
            .write_all(png)
            .map_err(|err| write_error(staged.path(), err))?;
        staged
            .persist_noclobber(&path)
            .map_err(|err| write_error(&path, err.error))?;

        debug!(chart = %file_name, "chart written");
        Ok(ChartArtifact {
            kind,
            title: kind.title().to_string(),
            web_path: format!("{}/{}", self.web_prefix, file_name),
            file_name,
        })
    }
}

struct BarSeries<'a> {
    name: &'a str,
    values: Vec<f64>,
    color: RGBColor,
}

pub fn render_overall(
    store: &ChartStore,
    overall: &OverallMetrics,
) -> Result<ChartArtifact, ChartError> {
    let labels = vec!["Pre-test".to_string(), "Post-test".to_string()];
    let series = [BarSeries {
        name: "Mean",
        values: vec![overall.mean_pre, overall.mean_post],
        color: PRE_COLOR,
    }];
    let range = bar_range(&series)?;
    let svg = render_svg(|root| {
        draw_bars(root, ChartKind::Overall.title(), "Mean score", &labels, &series, range)
    })?;
    store.persist(ChartKind::Overall, &rasterize(&svg)?)
}

/// Pre and post means as two dots joined by a line on a single "Overall" row.
pub fn render_dumbbell(
    store: &ChartStore,
    overall: &OverallMetrics,
) -> Result<ChartArtifact, ChartError> {
    let (low, high) = padded_range([overall.mean_pre, overall.mean_post])?;
    let ends = [(overall.mean_pre, 0.0), (overall.mean_post, 0.0)];

    let svg = render_svg(|root| {
        let mut chart = ChartBuilder::on(root)
            .caption(ChartKind::Dumbbell.title(), ("sans-serif", 26))
            .margin(16)
            .x_label_area_size(48)
            .y_label_area_size(80)
            .build_cartesian_2d(low..high, -1.0f64..1.0f64)?;

        let formatter = |y: &f64| {
            if y.abs() < 1e-6 {
                "Overall".to_string()
            } else {
                String::new()
            }
        };
        chart
            .configure_mesh()
            .disable_y_mesh()
            .y_labels(3)
            .y_label_formatter(&formatter)
            .x_desc("Mean score")
            .draw()?;

        chart.draw_series(LineSeries::new(ends, BLACK.mix(0.6).stroke_width(3)))?;
        for ((point, color), name) in ends
            .into_iter()
            .zip([PRE_COLOR, POST_COLOR])
            .zip(["Pre-test", "Post-test"])
        {
            chart
                .draw_series(std::iter::once(Circle::new(point, 9, color.filled())))?
                .label(name)
                .legend(move |(x, y)| Circle::new((x + 6, y), 5, color.filled()));
        }

        chart
            .configure_series_labels()
            .border_style(&BLACK)
            .background_style(&WHITE.mix(0.85))
            .draw()?;
        Ok(())
    })?;
    store.persist(ChartKind::Dumbbell, &rasterize(&svg)?)
}

pub fn render_gender(
    store: &ChartStore,
    groups: &[GroupMetrics],
) -> Result<ChartArtifact, ChartError> {
    render_group_comparison(store, ChartKind::Gender, groups)
}

/// One pre/post bar pair per class, computed from the raw rows.
pub fn render_class_comparison(
    store: &ChartStore,
    dataset: &RawDataset,
    rows: &[ScoreRow],
) -> Result<ChartArtifact, ChartError> {
    let groups = metrics::disaggregate(dataset, rows, Disaggregation::Class).map_err(|err| {
        match err {
            MetricsError::DisaggregationUnavailable { .. } => ChartError::MissingCategory,
            other => ChartError::Metrics(other),
        }
    })?;
    if groups.is_empty() {
        return Err(ChartError::MissingCategory);
    }
    render_group_comparison(store, ChartKind::ClassGroupedBar, &groups)
}

fn render_group_comparison(
    store: &ChartStore,
    kind: ChartKind,
    groups: &[GroupMetrics],
) -> Result<ChartArtifact, ChartError> {
    let labels: Vec<String> = groups.iter().map(|group| group.key.clone()).collect();
    let series = [
        BarSeries {
            name: "Pre-test",
            values: groups.iter().map(|g| g.metrics.mean_pre).collect(),
            color: PRE_COLOR,
        },
        BarSeries {
            name: "Post-test",
            values: groups.iter().map(|g| g.metrics.mean_post).collect(),
            color: POST_COLOR,
        },
    ];
    let range = bar_range(&series)?;
    let svg =
        render_svg(|root| draw_bars(root, kind.title(), "Mean score", &labels, &series, range))?;
    store.persist(kind, &rasterize(&svg)?)
}

/// One line per participant for the first [`SLOPEGRAPH_ROW_CAP`] identified rows.
pub fn render_slopegraph(
    store: &ChartStore,
    dataset: &RawDataset,
    rows: &[ScoreRow],
) -> Result<ChartArtifact, ChartError> {
    if !dataset.has_role(ColumnRole::Participant) {
        return Err(ChartError::MissingIdentifier);
    }
    let sample = slopegraph_sample(rows);
    if sample.is_empty() {
        return Err(ChartError::MissingIdentifier);
    }

    let (low, high) = padded_range(sample.iter().flat_map(|row| [row.pre, row.post]))?;
    let svg = render_svg(|root| {
        let mut chart = ChartBuilder::on(root)
            .caption(ChartKind::Slopegraph.title(), ("sans-serif", 26))
            .margin(16)
            .x_label_area_size(40)
            .y_label_area_size(64)
            .build_cartesian_2d(-0.25f64..1.25f64, low..high)?;

        let formatter = |x: &f64| {
            if x.abs() < 1e-6 {
                "Pre-test".to_string()
            } else if (x - 1.0).abs() < 1e-6 {
                "Post-test".to_string()
            } else {
                String::new()
            }
        };
        chart
            .configure_mesh()
            .disable_x_mesh()
            .x_labels(2)
            .x_label_formatter(&formatter)
            .y_desc("Score")
            .draw()?;

        for row in &sample {
            let color = if row.post > row.pre { UP_COLOR } else { DOWN_COLOR };
            chart.draw_series(LineSeries::new(
                vec![(0.0, row.pre), (1.0, row.post)],
                color.stroke_width(2),
            ))?;
            chart.draw_series(
                [(0.0, row.pre), (1.0, row.post)]
                    .into_iter()
                    .map(|point| Circle::new(point, 3, color.filled())),
            )?;
        }
        Ok(())
    })?;
    store.persist(ChartKind::Slopegraph, &rasterize(&svg)?)
}

/// Identified rows in upload order, at most [`SLOPEGRAPH_ROW_CAP`] of them.
fn slopegraph_sample(rows: &[ScoreRow]) -> Vec<&ScoreRow> {
    rows.iter()
        .filter(|row| row.participant.is_some())
        .take(SLOPEGRAPH_ROW_CAP)
        .collect()
}

/// A single bar split into one segment per metric pair's mean gain.
pub fn render_stacked_gain(
    store: &ChartStore,
    gains: &[MetricGain],
) -> Result<ChartArtifact, ChartError> {
    if gains.len() < 2 {
        return Err(MetricsError::InsufficientMetricPairs { found: gains.len() }.into());
    }

    let mut bounds = vec![0.0];
    let mut running = 0.0;
    for gain in gains {
        running += gain.mean_gain;
        bounds.push(running);
    }
    let (low, high) = zero_based_range(bounds.iter().copied())?;

    let svg = render_svg(|root| {
        let mut chart = ChartBuilder::on(root)
            .caption(ChartKind::StackedGain.title(), ("sans-serif", 26))
            .margin(16)
            .x_label_area_size(40)
            .y_label_area_size(64)
            .build_cartesian_2d(-0.75f64..0.75f64, low..high)?;

        let formatter = |x: &f64| {
            if x.abs() < 1e-6 {
                "Total gain".to_string()
            } else {
                String::new()
            }
        };
        chart
            .configure_mesh()
            .disable_x_mesh()
            .x_labels(1)
            .x_label_formatter(&formatter)
            .y_desc("Mean gain")
            .draw()?;

        for (index, (gain, bottom)) in gains.iter().zip(&bounds).enumerate() {
            let color = SEGMENT_COLORS[index % SEGMENT_COLORS.len()];
            let top = bottom + gain.mean_gain;
            chart
                .draw_series(std::iter::once(Rectangle::new(
                    [(-0.35, *bottom), (0.35, top)],
                    color.filled(),
                )))?
                .label(gain.label.clone())
                .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 12, y + 5)], color.filled()));
        }

        chart
            .configure_series_labels()
            .border_style(&BLACK)
            .background_style(&WHITE.mix(0.85))
            .draw()?;
        Ok(())
    })?;
    store.persist(ChartKind::StackedGain, &rasterize(&svg)?)
}

fn draw_bars(
    root: &Area<'_>,
    title: &str,
    y_desc: &str,
    labels: &[String],
    series: &[BarSeries<'_>],
    (low, high): (f64, f64),
) -> DrawResult {
    let categories = labels.len().max(1);

    let mut chart = ChartBuilder::on(root)
        .caption(title, ("sans-serif", 26))
        .margin(16)
        .x_label_area_size(48)
        .y_label_area_size(64)
        .build_cartesian_2d(-0.5f64..(categories as f64 - 0.5), low..high)?;

    let formatter = |x: &f64| category_label(labels, *x);
    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(categories)
        .x_label_formatter(&formatter)
        .y_desc(y_desc)
        .draw()?;

    let slot = 0.8 / series.len().max(1) as f64;
    for (index, bars) in series.iter().enumerate() {
        let color = bars.color;
        let offset = -0.4 + slot * index as f64;
        chart
            .draw_series(bars.values.iter().enumerate().map(|(i, value)| {
                let left = i as f64 + offset + slot * 0.05;
                Rectangle::new([(left, 0.0), (left + slot * 0.9, *value)], color.filled())
            }))?
            .label(bars.name)
            .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 12, y + 5)], color.filled()));
    }

    if series.len() > 1 {
        chart
            .configure_series_labels()
            .border_style(&BLACK)
            .background_style(&WHITE.mix(0.85))
            .draw()?;
    }
    Ok(())
}

fn category_label(labels: &[String], x: f64) -> String {
    let index = x.round();
    if (x - index).abs() > 1e-6 || index < 0.0 {
        return String::new();
    }
    labels.get(index as usize).cloned().unwrap_or_default()
}

fn bar_range(series: &[BarSeries<'_>]) -> Result<(f64, f64), ChartError> {
    zero_based_range(series.iter().flat_map(|s| s.values.iter().copied()))
}

/// Smallest and largest value, or `None` for an empty input. Errors on any non-finite value.
fn finite_bounds(
    values: impl IntoIterator<Item = f64>,
) -> Result<Option<(f64, f64)>, ChartError> {
    let mut bounds: Option<(f64, f64)> = None;
    for value in values {
        if !value.is_finite() {
            return Err(MetricsError::OutOfRange.into());
        }
        bounds = Some(match bounds {
            Some((lo, hi)) => (lo.min(value), hi.max(value)),
            None => (value, value),
        });
    }
    Ok(bounds)
}

/// Plotters loops forever on an infinite axis, so both ends and the span must be finite.
fn checked_axis(low: f64, high: f64) -> Result<(f64, f64), ChartError> {
    if low.is_finite() && high.is_finite() && (high - low).is_finite() {
        Ok((low, high))
    } else {
        Err(MetricsError::OutOfRange.into())
    }
}

/// Axis range that always contains zero, with headroom above the bars.
fn zero_based_range(values: impl IntoIterator<Item = f64>) -> Result<(f64, f64), ChartError> {
    let (min, max) = finite_bounds(values)?.unwrap_or((0.0, 0.0));
    let (low, high) = checked_axis(min.min(0.0) * 1.15, max.max(0.0) * 1.15)?;
    if high - low < 1e-9 {
        Ok((0.0, 1.0))
    } else {
        Ok((low, high))
    }
}

fn padded_range(values: impl IntoIterator<Item = f64>) -> Result<(f64, f64), ChartError> {
    let Some((min, max)) = finite_bounds(values)? else {
        return Ok((0.0, 1.0));
    };
    let (min, max) = checked_axis(min, max)?;
    let pad = ((max - min) * 0.1).max(1.0);
    checked_axis(min - pad, max + pad)
}

fn render_svg(draw: impl FnOnce(&Area<'_>) -> DrawResult) -> Result<String, ChartError> {
    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, (WIDTH, HEIGHT)).into_drawing_area();
        root.fill(&WHITE).map_err(render_error)?;
        draw(&root).map_err(render_error)?;
        root.present().map_err(render_error)?;
    }
    Ok(svg)
}

fn rasterize(svg: &str) -> Result<Vec<u8>, ChartError> {
    let mut options = usvg::Options::default();
    options.fontdb = Arc::clone(&FONTS);
    let tree = usvg::Tree::from_str(svg, &options).map_err(render_error)?;

    let size = tree.size().to_int_size();
    let mut pixmap = tiny_skia::Pixmap::new(size.width(), size.height())
        .ok_or_else(|| ChartError::Render("chart has zero size".to_string()))?;
    pixmap.fill(tiny_skia::Color::WHITE);
    resvg::render(&tree, tiny_skia::Transform::default(), &mut pixmap.as_mut());

    // Flatten onto white so document exporters get an opaque RGB image.
    let rgb: Vec<u8> = pixmap
        .pixels()
        .iter()
        .flat_map(|pixel| {
            let backdrop = 255 - pixel.alpha();
            [
                pixel.red().saturating_add(backdrop),
                pixel.green().saturating_add(backdrop),
                pixel.blue().saturating_add(backdrop),
            ]
        })
        .collect();

    let mut buffer = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut buffer, pixmap.width(), pixmap.height());
        encoder.set_color(png::ColorType::Rgb);
        encoder.set_depth(png::BitDepth::Eight);
        encoder
            .write_header()
            .map_err(render_error)?
            .write_image_data(&rgb)
            .map_err(render_error)?;
    }
    Ok(buffer)
}

fn render_error(err: impl std::fmt::Display) -> ChartError {
    ChartError::Render(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{DatasetFormat, DatasetLimits};
    use crate::metrics::summarize;

    const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

    fn load(text: &str) -> RawDataset {
        RawDataset::load(text.as_bytes(), DatasetFormat::Csv, DatasetLimits::default()).unwrap()
    }

    fn store(dir: &tempfile::TempDir) -> ChartStore {
        ChartStore::new(dir.path(), "/static/charts/testscore/")
    }

    #[test]
    fn overall_chart_is_a_png_with_a_web_path() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let overall = summarize([(50.0, 70.0), (60.0, 55.0)]).unwrap();

        let artifact = render_overall(&store, &overall).unwrap();
        assert_eq!(artifact.kind, ChartKind::Overall);
        assert!(artifact.file_name.starts_with("overall_"));
        assert_eq!(
            artifact.web_path,
            format!("/static/charts/testscore/{}", artifact.file_name)
        );

        let bytes = std::fs::read(store.path_of(&artifact)).unwrap();
        assert_eq!(bytes[..8], PNG_SIGNATURE);
    }

    #[test]
    fn repeated_renders_never_share_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let overall = summarize([(1.0, 2.0)]).unwrap();

        let first = render_overall(&store, &overall).unwrap();
        let second = render_overall(&store, &overall).unwrap();
        assert_ne!(first.file_name, second.file_name);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn slopegraph_needs_an_identifier_column() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = load("pre_test,post_test\n1,2\n");
        let err = render_slopegraph(&store(&dir), &dataset, &dataset.score_rows()).unwrap_err();
        assert!(matches!(err, ChartError::MissingIdentifier));

        let named = load("pre_test,post_test,name\n1,2,Ann\n3,1,Ben\n");
        let artifact = render_slopegraph(&store(&dir), &named, &named.score_rows()).unwrap();
        assert_eq!(artifact.kind, ChartKind::Slopegraph);
    }

    #[test]
    fn class_chart_needs_a_class_column() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = load("pre_test,post_test\n1,2\n");
        let err =
            render_class_comparison(&store(&dir), &dataset, &dataset.score_rows()).unwrap_err();
        assert!(matches!(err, ChartError::MissingCategory));

        let classes = load("pre_test,post_test,class\n1,2,A\n3,5,B\n");
        let artifact =
            render_class_comparison(&store(&dir), &classes, &classes.score_rows()).unwrap();
        assert_eq!(artifact.kind, ChartKind::ClassGroupedBar);
    }

    #[test]
    fn stacked_gain_needs_two_pairs() {
        let dir = tempfile::tempdir().unwrap();
        let gain = MetricGain {
            label: "q1".into(),
            count: 1,
            mean_pre: 1.0,
            mean_post: 3.0,
            mean_gain: 2.0,
        };
        let err = render_stacked_gain(&store(&dir), std::slice::from_ref(&gain)).unwrap_err();
        assert!(matches!(
            err,
            ChartError::Metrics(MetricsError::InsufficientMetricPairs { found: 1 })
        ));

        let mut second = gain.clone();
        second.label = "q2".into();
        second.mean_gain = -1.0;
        let artifact = render_stacked_gain(&store(&dir), &[gain, second]).unwrap();
        assert_eq!(artifact.kind, ChartKind::StackedGain);
    }

    #[test]
    fn ranges_always_include_zero() {
        assert_eq!(zero_based_range([0.0, 0.0]).unwrap(), (0.0, 1.0));
        let (low, high) = zero_based_range([-5.0, 10.0]).unwrap();
        assert!(low < -5.0 && high > 10.0);
        let (low, high) = zero_based_range([3.0, 4.0]).unwrap();
        assert_eq!(low, 0.0);
        assert!(high > 4.0);
        assert_eq!(category_label(&["A".into(), "B".into()], 1.0), "B");
        assert_eq!(category_label(&["A".into()], 0.5), "");
    }

    #[test]
    fn ranges_reject_values_that_leave_f64() {
        for values in [vec![f64::INFINITY], vec![1.0, f64::NAN], vec![1.7e308]] {
            assert!(matches!(
                zero_based_range(values.clone()),
                Err(ChartError::Metrics(MetricsError::OutOfRange))
            ));
        }
        assert!(padded_range([f64::NEG_INFINITY, 1.0]).is_err());
        assert!(padded_range([-1.7e308, 1.7e308]).is_err());
        assert_eq!(padded_range(std::iter::empty::<f64>()).unwrap(), (0.0, 1.0));
        assert_eq!(padded_range([10.0, 10.0]).unwrap(), (9.0, 11.0));
    }

    #[test]
    fn huge_means_fail_fast_instead_of_drawing() {
        let dir = tempfile::tempdir().unwrap();
        let overall = summarize([(1.7e308, 1.7e308)]).unwrap();
        let err = render_overall(&store(&dir), &overall).unwrap_err();
        assert!(matches!(err, ChartError::Metrics(MetricsError::OutOfRange)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn dumbbell_chart_spans_both_means() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let overall = summarize([(50.0, 70.0), (60.0, 55.0), (40.0, 80.0)]).unwrap();

        let artifact = render_dumbbell(&store, &overall).unwrap();
        assert_eq!(artifact.kind, ChartKind::Dumbbell);
        assert_eq!(artifact.title, "Knowledge Gap");
        assert!(artifact.file_name.starts_with("dumbbell_"));
        let bytes = std::fs::read(store.path_of(&artifact)).unwrap();
        assert_eq!(bytes[..8], PNG_SIGNATURE);
    }

    fn row(participant: Option<&str>, pre: f64) -> ScoreRow {
        ScoreRow {
            participant: participant.map(str::to_owned),
            gender: None,
            class: None,
            pre,
            post: pre + 1.0,
        }
    }

    #[test]
    fn slopegraph_keeps_the_first_forty_identified_rows() {
        let mut rows: Vec<ScoreRow> = (0..50)
            .map(|i| row(Some(&format!("p{i}")), i as f64))
            .collect();
        rows.insert(3, row(None, 999.0));
        rows.insert(0, row(None, 998.0));

        let sample = slopegraph_sample(&rows);
        assert_eq!(sample.len(), SLOPEGRAPH_ROW_CAP);
        assert!(sample.iter().all(|row| row.participant.is_some()));
        assert_eq!(sample[0].participant.as_deref(), Some("p0"));
        assert_eq!(sample[39].participant.as_deref(), Some("p39"));

        let short: Vec<ScoreRow> = (0..5).map(|i| row(Some("x"), i as f64)).collect();
        assert_eq!(slopegraph_sample(&short).len(), 5);
    }

    #[test]
    fn slopegraph_renders_a_large_roster() {
        let dir = tempfile::tempdir().unwrap();
        let mut text = String::from("pre_test,post_test,participant_id\n");
        for i in 0..60 {
            text.push_str(&format!("{},{},s{i}\n", 40 + i % 7, 50 + i % 11));
        }
        let dataset = load(&text);
        let artifact = render_slopegraph(&store(&dir), &dataset, &dataset.score_rows()).unwrap();
        assert_eq!(artifact.kind, ChartKind::Slopegraph);
    }
}
