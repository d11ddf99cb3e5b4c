use std::fmt::Write;

use html_escape::{encode_double_quoted_attribute, encode_text};

use crate::export::{format_metric, metric_rows, ExportFormat, GROUP_HEADERS, REPORT_TITLE};
use crate::metrics::round2;
use crate::models::{AnalysisResult, GroupMetrics};

const STYLE: &str = "body{font-family:sans-serif;max-width:960px;margin:2em auto;color:#222}\
table{border-collapse:collapse;margin:1em 0}th,td{border:1px solid #bbb;padding:4px 10px;text-align:right}\
th:first-child,td:first-child{text-align:left}.flash{background:#fdecea;border:1px solid #e0a4a0;padding:8px}\
.notice{background:#fff8e1;border:1px solid #e6cf8b;padding:8px}img{max-width:100%}form.inline{display:inline}";

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>{}</title>\n<style>{STYLE}</style>\n</head>\n<body>\n{body}</body>\n</html>\n",
        encode_text(title)
    )
}

pub fn upload_form(flash: Option<&str>) -> String {
    let mut body = String::new();
    let _ = writeln!(body, "<h1>Test Score Analysis</h1>");
    if let Some(message) = flash {
        let _ = writeln!(body, "<p class=\"flash\">{}</p>", encode_text(message));
    }
    let _ = writeln!(
        body,
        "<form method=\"post\" action=\"/testscore/\" enctype=\"multipart/form-data\">\n\
         <p><label>Dataset (.csv or .xlsx): <input type=\"file\" name=\"dataset\" accept=\".csv,.xlsx\" required></label></p>\n\
         <p><label><input type=\"checkbox\" name=\"disaggregate\" value=\"yes\"> Disaggregate by gender and class</label></p>\n\
         <p><button type=\"submit\">Analyze</button></p>\n</form>"
    );
    let _ = writeln!(
        body,
        "<p><a href=\"/testscore/help\">Help</a> | <a href=\"/testscore/about\">About</a> | \
         <a href=\"/testscore/manual\">User manual (PDF)</a></p>"
    );
    page("Test Score Analysis", &body)
}

pub fn report(result: &AnalysisResult) -> String {
    let mut body = String::new();
    let _ = writeln!(body, "<h1>{}</h1>", encode_text(REPORT_TITLE));
    let _ = writeln!(
        body,
        "<p>Source file: {}</p>",
        encode_text(&result.source_name)
    );

    for notice in &result.notices {
        let _ = writeln!(body, "<p class=\"notice\">{}</p>", encode_text(notice));
    }

    let _ = writeln!(body, "<h2>Key Metrics</h2>\n<table>");
    for (label, value) in metric_rows(&result.overall) {
        let _ = writeln!(
            body,
            "<tr><th>{label}</th><td>{}</td></tr>",
            format_metric(label, value)
        );
    }
    let _ = writeln!(body, "</table>");

    if let Some(groups) = result.gender_groups.as_deref() {
        group_table(&mut body, "Gender Disaggregation", groups);
    }
    if let Some(groups) = result.class_groups.as_deref() {
        group_table(&mut body, "Class Breakdown", groups);
    }

    if let Some(gains) = result.metric_gains.as_deref() {
        let _ = writeln!(
            body,
            "<h2>Gain by Metric</h2>\n<table>\n<tr><th>Metric</th><th>N</th><th>Mean Pre</th><th>Mean Post</th><th>Mean Gain</th></tr>"
        );
        for gain in gains {
            let _ = writeln!(
                body,
                "<tr><td>{}</td><td>{}</td><td>{:.2}</td><td>{:.2}</td><td>{:.2}</td></tr>",
                encode_text(&gain.label),
                gain.count,
                round2(gain.mean_pre),
                round2(gain.mean_post),
                round2(gain.mean_gain)
            );
        }
        let _ = writeln!(body, "</table>");
    }

    let _ = writeln!(body, "<h2>Narrative Summary</h2>");
    for paragraph in result.narrative.lines().filter(|line| !line.trim().is_empty()) {
        let _ = writeln!(body, "<p>{}</p>", encode_text(paragraph));
    }

    for chart in &result.charts {
        let _ = writeln!(
            body,
            "<h3>{}</h3>\n<img src=\"{}\" alt=\"{}\">",
            encode_text(&chart.title),
            encode_double_quoted_attribute(&chart.web_path),
            encode_double_quoted_attribute(&chart.title)
        );
    }

    let _ = writeln!(body, "<h2>Export</h2>\n<p>");
    for format in [ExportFormat::Word, ExportFormat::Pdf, ExportFormat::Excel] {
        let _ = writeln!(
            body,
            "<form class=\"inline\" method=\"post\" action=\"/testscore/export/{}\"><button type=\"submit\">Download {}</button></form>",
            slug(format),
            format.label()
        );
    }
    let _ = writeln!(
        body,
        "</p>\n<p><a href=\"/testscore/\">Analyze another file</a></p>"
    );
    page(REPORT_TITLE, &body)
}

fn slug(format: ExportFormat) -> &'static str {
    match format {
        ExportFormat::Word => "word",
        ExportFormat::Pdf => "pdf",
        ExportFormat::Excel => "excel",
    }
}

fn group_table(body: &mut String, title: &str, groups: &[GroupMetrics]) {
    if groups.is_empty() {
        return;
    }
    let _ = writeln!(body, "<h2>{title}</h2>\n<table>\n<tr>");
    for header in GROUP_HEADERS {
        let _ = write!(body, "<th>{header}</th>");
    }
    let _ = writeln!(body, "</tr>");
    for group in groups {
        let m = &group.metrics;
        let _ = writeln!(
            body,
            "<tr><td>{}</td><td>{}</td><td>{:.2}</td><td>{:.2}</td><td>{:.2}</td><td>{:.2}</td><td>{:.2}</td></tr>",
            encode_text(&group.key),
            m.count,
            round2(m.mean_pre),
            round2(m.mean_post),
            round2(m.mean_gain),
            round2(m.percent_gain),
            round2(m.improvement_rate)
        );
    }
    let _ = writeln!(body, "</table>");
}

pub fn help() -> String {
    let body = "<h1>Test Score Analysis Help</h1>\n\
<h2>Preparing your file</h2>\n\
<p>Upload a CSV or Excel (.xlsx) file whose first row holds column names. Column names are matched without regard to case or surrounding spaces.</p>\n\
<ul>\n\
<li><code>pre_test</code> and <code>post_test</code> are required and must hold numbers. Rows where either score is missing or not numeric are left out.</li>\n\
<li><code>gender</code> (or <code>gend</code>) enables the gender breakdown. Only Female and Male are grouped; other values still count toward the overall figures.</li>\n\
<li><code>class</code> (or <code>student_class</code>) adds a grouped bar chart by class. With <em>Disaggregate</em> checked, the report also gets a class breakdown table.</li>\n\
<li><code>participant_id</code> (or <code>name</code>) adds a chart following each participant from pre-test to post-test (first 40 rows).</li>\n\
<li>Two or more column pairs named <code>pre_&lt;metric&gt;</code> and <code>post_&lt;metric&gt;</code> add a gain-by-metric table and chart.</li>\n\
</ul>\n\
<h2>Reading the results</h2>\n\
<p>Percent gain is the mean gain divided by the mean pre-test score; it is reported as 0 when the mean pre-test score is 0. Improvement rate is the share of participants whose post-test score is higher than their pre-test score.</p>\n\
<h2>Exports</h2>\n\
<p>After an analysis you can download it as a Word document, a PDF or an Excel workbook. Exports always use the most recent analysis in your session.</p>\n\
<p><a href=\"/testscore/\">Back to the upload form</a></p>\n";
    page("Test Score Analysis Help", body)
}

pub fn about() -> String {
    let body = "<h1>About Test Score Analysis</h1>\n\
<p>This tool compares pre-test and post-test scores for a group of participants. Upload a spreadsheet and it reports the average scores, the average gain, the percent change from baseline and the share of participants who improved.</p>\n\
<p>Every analysis includes a bar chart of the mean scores and a knowledge gap chart joining the pre-test and post-test means. Optional columns add gender and class breakdowns, participant journeys and a gain-by-metric chart.</p>\n\
<p>Results stay with your browser session and can be downloaded as Word, PDF or Excel reports. Only the most recent analysis is kept.</p>\n\
<p><a href=\"/testscore/\">Back to the upload form</a> | <a href=\"/testscore/help\">Help</a></p>\n";
    page("About Test Score Analysis", body)
}
