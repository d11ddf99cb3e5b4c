use std::io::Cursor;

use chrono::{DateTime, Utc};
use docx_rs::{Docx, Paragraph, Pic, Run, Style, StyleType, Table, TableCell, TableRow};

use super::{
    format_metric, generated_label, group_cells, group_sections, metric_rows, ChartImage,
    GROUP_HEADERS, REPORT_TITLE,
};
use crate::error::ExportError;
use crate::metrics::round2;
use crate::models::AnalysisResult;

const EMU_PER_INCH: u32 = 914_400;
const IMAGE_WIDTH_EMU: u32 = 6 * EMU_PER_INCH;

pub(super) fn render(
    result: &AnalysisResult,
    images: &[ChartImage],
    generated_at: DateTime<Utc>,
) -> Result<Vec<u8>, ExportError> {
    let mut doc = Docx::new()
        .add_style(
            Style::new("Heading1", StyleType::Paragraph)
                .name("Heading 1")
                .size(32)
                .bold(),
        )
        .add_style(
            Style::new("Heading2", StyleType::Paragraph)
                .name("Heading 2")
                .size(26)
                .bold(),
        );

    doc = doc
        .add_paragraph(heading(REPORT_TITLE, 1))
        .add_paragraph(text(&generated_label(generated_at)))
        .add_paragraph(text(&format!("Source file: {}", result.source_name)));

    doc = doc.add_paragraph(heading("Key Metrics", 2)).add_table(table(
        &["Metric", "Value"],
        metric_rows(&result.overall)
            .into_iter()
            .map(|(label, value)| vec![label.to_string(), format_metric(label, value)])
            .collect(),
    ));

    for (title, groups) in group_sections(result) {
        doc = doc.add_paragraph(heading(title, 2)).add_table(table(
            &GROUP_HEADERS,
            groups.iter().map(|group| group_cells(group).to_vec()).collect(),
        ));
    }

    if let Some(gains) = result.metric_gains.as_deref() {
        doc = doc.add_paragraph(heading("Gain by Metric", 2)).add_table(table(
            &["Metric", "N", "Mean Pre", "Mean Post", "Mean Gain"],
            gains
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
                .collect(),
        ));
    }

    doc = doc.add_paragraph(heading("Narrative Summary", 2));
    for line in result.narrative.lines() {
        doc = doc.add_paragraph(text(line));
    }

    for image in images {
        let height_emu = (u64::from(IMAGE_WIDTH_EMU) * u64::from(image.height)
            / u64::from(image.width.max(1))) as u32;
        doc = doc.add_paragraph(heading(&image.title, 2)).add_paragraph(
            Paragraph::new().add_run(
                Run::new().add_image(Pic::new(&image.png).size(IMAGE_WIDTH_EMU, height_emu)),
            ),
        );
    }

    let mut buffer = Cursor::new(Vec::new());
    doc.build()
        .pack(&mut buffer)
        .map_err(|err| ExportError::render("Word", err))?;
    Ok(buffer.into_inner())
}

fn heading(value: &str, level: u8) -> Paragraph {
    Paragraph::new()
        .add_run(Run::new().add_text(value))
        .style(&format!("Heading{level}"))
}

fn text(value: &str) -> Paragraph {
    Paragraph::new().add_run(Run::new().add_text(value))
}

fn table(headers: &[&str], rows: Vec<Vec<String>>) -> Table {
    let header = TableRow::new(
        headers
            .iter()
            .map(|value| {
                TableCell::new().add_paragraph(
                    Paragraph::new().add_run(Run::new().add_text(*value).bold()),
                )
            })
            .collect(),
    );
    let body = rows.into_iter().map(|cells| {
        TableRow::new(
            cells
                .iter()
                .map(|value| TableCell::new().add_paragraph(text(value)))
                .collect(),
        )
    });
    Table::new(std::iter::once(header).chain(body).collect())
}
