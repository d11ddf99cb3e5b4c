use std::borrow::Cow;
use std::io::Cursor;

use chrono::{DateTime, Utc};
use printpdf::image_crate::codecs::png::PngDecoder;
use printpdf::{
    BuiltinFont, Image, ImageTransform, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference,
    PdfLayerReference,
};
use resvg::usvg::fontdb::{Family, Query, Stretch, Style, Weight};
use tracing::{debug, warn};

use super::{
    format_metric, generated_label, group_cells, group_sections, metric_rows, ChartImage,
    GROUP_HEADERS, REPORT_TITLE,
};
use crate::charts::FONTS;
use crate::error::ExportError;
use crate::metrics::round2;
use crate::models::AnalysisResult;

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN: f32 = 20.0;
const CONTENT_WIDTH: f32 = PAGE_WIDTH - 2.0 * MARGIN;
const PT_TO_MM: f32 = 0.3528;
const BODY_SIZE: f32 = 10.5;
const WRAP_COLUMNS: usize = 92;

pub(super) fn render(
    result: &AnalysisResult,
    images: &[ChartImage],
    generated_at: DateTime<Utc>,
) -> Result<Vec<u8>, ExportError> {
    let mut page = PageWriter::new(REPORT_TITLE)?;

    page.line(REPORT_TITLE, 18.0, true);
    page.line(&generated_label(generated_at), BODY_SIZE, false);
    page.line(&format!("Source file: {}", result.source_name), BODY_SIZE, false);
    page.gap(6.0);

    page.line("Key Metrics", 14.0, true);
    let metrics: Vec<Vec<String>> = metric_rows(&result.overall)
        .into_iter()
        .map(|(label, value)| vec![label.to_string(), format_metric(label, value)])
        .collect();
    page.table(&["Metric", "Value"], &metrics, &[70.0, 40.0]);

    for (title, groups) in group_sections(result) {
        page.line(title, 14.0, true);
        let rows: Vec<Vec<String>> = groups
            .iter()
            .map(|group| group_cells(group).to_vec())
            .collect();
        page.table(
            &GROUP_HEADERS,
            &rows,
            &[34.0, 14.0, 22.0, 22.0, 22.0, 22.0, 24.0],
        );
    }

    if let Some(gains) = result.metric_gains.as_deref() {
        page.line("Gain by Metric", 14.0, true);
        let rows: Vec<Vec<String>> = gains
            .iter()
            .map(|gain| {
                vec![
                    gain.label.clone(),
                    gain.count.to_string(),
                    format!("{:.2}", round2(gain.mean_pre)),
                    format!("{:.2}", round2(gain.mean_post)),
                    format!("{:.2}", round2(gain.mean_gain)),
                ]
            })
            .collect();
        page.table(
            &["Metric", "N", "Mean Pre", "Mean Post", "Mean Gain"],
            &rows,
            &[50.0, 20.0, 30.0, 30.0, 30.0],
        );
    }

    page.line("Narrative Summary", 14.0, true);
    for paragraph in result.narrative.lines() {
        if paragraph.trim().is_empty() {
            page.gap(2.0);
            continue;
        }
        for line in wrap(paragraph, WRAP_COLUMNS) {
            page.line(&line, BODY_SIZE, false);
        }
    }
    page.gap(6.0);

    for image in images {
        page.line(&image.title, 14.0, true);
        page.image(image)?;
    }

    page.finish()
}

/// Top-down writer over a flowing sequence of A4 pages.
///
/// Text is set in an embedded system sans-serif when one can be loaded. The
/// builtin Helvetica fallback only covers ASCII reliably, so other characters
/// are replaced before drawing.
struct PageWriter {
    doc: PdfDocumentReference,
    layer: PdfLayerReference,
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    unicode: bool,
    cursor: f32,
}

impl PageWriter {
    fn new(title: &str) -> Result<Self, ExportError> {
        let (doc, page, layer) =
            PdfDocument::new(title, Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
        let (regular, bold, unicode) = match embedded_fonts(&doc) {
            Some((regular, bold)) => (regular, bold, true),
            None => {
                let regular = doc
                    .add_builtin_font(BuiltinFont::Helvetica)
                    .map_err(|err| ExportError::render("PDF", err))?;
                let bold = doc
                    .add_builtin_font(BuiltinFont::HelveticaBold)
                    .map_err(|err| ExportError::render("PDF", err))?;
                (regular, bold, false)
            }
        };
        let layer = doc.get_page(page).get_layer(layer);
        Ok(Self {
            doc,
            layer,
            regular,
            bold,
            unicode,
            cursor: PAGE_HEIGHT - MARGIN,
        })
    }

    fn ensure_space(&mut self, height: f32) {
        if self.cursor - height < MARGIN {
            let (page, layer) = self
                .doc
                .add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
            self.layer = self.doc.get_page(page).get_layer(layer);
            self.cursor = PAGE_HEIGHT - MARGIN;
        }
    }

    fn line(&mut self, value: &str, size: f32, bold: bool) {
        self.row(&[value], &[CONTENT_WIDTH], size, bold);
    }

    fn row(&mut self, cells: &[&str], widths: &[f32], size: f32, bold: bool) {
        let height = size * PT_TO_MM * 1.5;
        self.ensure_space(height);
        self.cursor -= height;
        let font = if bold { &self.bold } else { &self.regular };
        let mut x = MARGIN;
        for (cell, width) in cells.iter().zip(widths) {
            let text = if self.unicode {
                Cow::Borrowed(*cell)
            } else {
                ascii_fallback(cell)
            };
            self.layer
                .use_text(text, size, Mm(x), Mm(self.cursor), font);
            x += width;
        }
    }

    fn table(&mut self, headers: &[&str], rows: &[Vec<String>], widths: &[f32]) {
        self.row(headers, widths, BODY_SIZE, true);
        for cells in rows {
            let cells: Vec<&str> = cells.iter().map(String::as_str).collect();
            self.row(&cells, widths, BODY_SIZE, false);
        }
        self.gap(5.0);
    }

    fn gap(&mut self, height: f32) {
        self.cursor -= height;
    }

    fn image(&mut self, image: &ChartImage) -> Result<(), ExportError> {
        let dpi = image.width as f32 / (CONTENT_WIDTH / 25.4);
        let height = image.height as f32 / dpi * 25.4;
        self.ensure_space(height + 4.0);

        let decoder = PngDecoder::new(Cursor::new(image.png.as_slice()))
            .map_err(|err| ExportError::render("PDF", err))?;
        let embedded = Image::try_from(decoder).map_err(|err| ExportError::render("PDF", err))?;

        self.cursor -= height;
        embedded.add_to_layer(
            self.layer.clone(),
            ImageTransform {
                translate_x: Some(Mm(MARGIN)),
                translate_y: Some(Mm(self.cursor)),
                dpi: Some(dpi),
                ..Default::default()
            },
        );
        self.gap(6.0);
        Ok(())
    }

    fn finish(self) -> Result<Vec<u8>, ExportError> {
        self.doc
            .save_to_bytes()
            .map_err(|err| ExportError::render("PDF", err))
    }
}

fn system_face(weight: Weight) -> Option<Vec<u8>> {
    let id = FONTS.query(&Query {
        families: &[Family::SansSerif],
        weight,
        stretch: Stretch::Normal,
        style: Style::Normal,
    })?;
    // Collections (index > 0) cannot be embedded as a single font program.
    FONTS
        .with_face_data(id, |data, index| (index == 0).then(|| data.to_vec()))
        .flatten()
}

fn embedded_fonts(doc: &PdfDocumentReference) -> Option<(IndirectFontRef, IndirectFontRef)> {
    let Some(regular) = system_face(Weight::NORMAL) else {
        debug!("no system sans-serif font; PDF text falls back to Helvetica");
        return None;
    };
    let bold = system_face(Weight::BOLD).unwrap_or_else(|| regular.clone());
    let embed = |bytes: Vec<u8>| match doc.add_external_font(Cursor::new(bytes)) {
        Ok(font) => Some(font),
        Err(err) => {
            warn!(error = %err, "system font could not be embedded; using Helvetica");
            None
        }
    };
    Some((embed(regular)?, embed(bold)?))
}

/// Replaces characters Helvetica cannot show with `?`.
fn ascii_fallback(text: &str) -> Cow<'_, str> {
    if text.is_ascii() {
        Cow::Borrowed(text)
    } else {
        Cow::Owned(
            text.chars()
                .map(|c| if c.is_ascii() { c } else { '?' })
                .collect(),
        )
    }
}

/// Greedy word wrap; words longer than `columns` stay on their own line.
fn wrap(text: &str, columns: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if !current.is_empty() && current.len() + 1 + word.len() > columns {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}
