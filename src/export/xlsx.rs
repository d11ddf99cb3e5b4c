use chrono::{DateTime, Utc};
use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};

use super::{generated_label, metric_rows, REPORT_TITLE};
use crate::error::ExportError;
use crate::metrics::round2;
use crate::models::{AnalysisResult, GroupMetrics};

pub(super) fn render(
    result: &AnalysisResult,
    generated_at: DateTime<Utc>,
) -> Result<Vec<u8>, ExportError> {
    build(result, generated_at).map_err(|err| ExportError::render("Excel", err))
}

fn build(result: &AnalysisResult, generated_at: DateTime<Utc>) -> Result<Vec<u8>, XlsxError> {
    let mut workbook = Workbook::new();
    let header = Format::new().set_bold().set_background_color("#D9D9D9");

    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Overall")?;
        sheet.set_column_width(0, 24)?;
        sheet.set_column_width(1, 14)?;
        sheet.write_string_with_format(0, 0, "Metric", &header)?;
        sheet.write_string_with_format(0, 1, "Value", &header)?;
        let rows = metric_rows(&result.overall);
        for (index, (label, value)) in rows.iter().enumerate() {
            let row = index as u32 + 1;
            sheet.write_string(row, 0, *label)?;
            sheet.write_number(row, 1, *value)?;
        }
        let footer = rows.len() as u32 + 2;
        sheet.write_string(footer, 0, REPORT_TITLE)?;
        sheet.write_string(footer + 1, 0, generated_label(generated_at))?;
        sheet.write_string(footer + 2, 0, format!("Source file: {}", result.source_name))?;
    }

    if let Some(groups) = result.gender_groups.as_deref().filter(|g| !g.is_empty()) {
        write_groups(workbook.add_worksheet(), "Gender", groups, &header)?;
    }
    if let Some(groups) = result.class_groups.as_deref().filter(|g| !g.is_empty()) {
        write_groups(workbook.add_worksheet(), "Class", groups, &header)?;
    }

    if let Some(gains) = result.metric_gains.as_deref() {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Metrics")?;
        write_header(sheet, &["Metric", "N", "Mean Pre", "Mean Post", "Mean Gain"], &header)?;
        for (index, gain) in gains.iter().enumerate() {
            let row = index as u32 + 1;
            sheet.write_string(row, 0, &gain.label)?;
            sheet.write_number(row, 1, gain.count as f64)?;
            sheet.write_number(row, 2, round2(gain.mean_pre))?;
            sheet.write_number(row, 3, round2(gain.mean_post))?;
            sheet.write_number(row, 4, round2(gain.mean_gain))?;
        }
    }

    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Detail")?;
        write_header(
            sheet,
            &["Participant", "Gender", "Class", "Pre-Test", "Post-Test", "Gain"],
            &header,
        )?;
        for (index, score) in result.rows.iter().enumerate() {
            let row = index as u32 + 1;
            sheet.write_string(row, 0, score.participant.as_deref().unwrap_or_default())?;
            sheet.write_string(row, 1, score.gender.as_deref().unwrap_or_default())?;
            sheet.write_string(row, 2, score.class.as_deref().unwrap_or_default())?;
            sheet.write_number(row, 3, score.pre)?;
            sheet.write_number(row, 4, score.post)?;
            sheet.write_number(row, 5, score.gain())?;
        }
    }

    workbook.save_to_buffer()
}

fn write_header(sheet: &mut Worksheet, headers: &[&str], format: &Format) -> Result<(), XlsxError> {
    for (col, title) in headers.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *title, format)?;
        sheet.set_column_width(col as u16, 14)?;
    }
    Ok(())
}

fn write_groups(
    sheet: &mut Worksheet,
    name: &str,
    groups: &[GroupMetrics],
    format: &Format,
) -> Result<(), XlsxError> {
    sheet.set_name(name)?;
    write_header(
        sheet,
        &[
            "Group",
            "N",
            "Mean Pre",
            "Mean Post",
            "Mean Gain",
            "Percent Gain (%)",
            "Improvement Rate (%)",
        ],
        format,
    )?;
    for (index, group) in groups.iter().enumerate() {
        let row = index as u32 + 1;
        let m = &group.metrics;
        sheet.write_string(row, 0, &group.key)?;
        sheet.write_number(row, 1, m.count as f64)?;
        sheet.write_number(row, 2, round2(m.mean_pre))?;
        sheet.write_number(row, 3, round2(m.mean_post))?;
        sheet.write_number(row, 4, round2(m.mean_gain))?;
        sheet.write_number(row, 5, round2(m.percent_gain))?;
        sheet.write_number(row, 6, round2(m.improvement_rate))?;
    }
    Ok(())
}
