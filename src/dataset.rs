use std::io::Cursor;
use std::path::Path;

use calamine::{Data, Reader, Xlsx};

use crate::error::DatasetError;
use crate::models::ScoreRow;

pub const PRE_TEST: &str = "pre_test";
pub const POST_TEST: &str = "post_test";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetFormat {
    Csv,
    Xlsx,
}

impl DatasetFormat {
    pub fn from_extension(extension: &str) -> Result<Self, DatasetError> {
        match extension.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "xlsx" => Ok(Self::Xlsx),
            other => Err(DatasetError::UnsupportedFormat {
                extension: other.to_string(),
            }),
        }
    }

    pub fn from_file_name(name: &str) -> Result<Self, DatasetError> {
        let extension = Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default();
        Self::from_extension(extension)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DatasetLimits {
    pub max_rows: usize,
    pub max_columns: usize,
}

impl Default for DatasetLimits {
    fn default() -> Self {
        Self {
            max_rows: 50_000,
            max_columns: 256,
        }
    }
}

/// Optional columns that unlock features, matched by alias.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRole {
    Gender,
    Class,
    Participant,
}

impl ColumnRole {
    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            ColumnRole::Gender => &["gender", "gend"],
            ColumnRole::Class => &["class", "student_class"],
            ColumnRole::Participant => &["participant_id", "name"],
        }
    }

    pub fn describe_aliases(self) -> String {
        self.aliases()
            .iter()
            .map(|alias| format!("'{alias}'"))
            .collect::<Vec<_>>()
            .join(" or ")
    }
}

/// An uploaded table with normalized headers and untouched cells.
#[derive(Debug, Clone)]
pub struct RawDataset {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
    pre: usize,
    post: usize,
}

impl RawDataset {
    pub fn load(
        bytes: &[u8],
        format: DatasetFormat,
        limits: DatasetLimits,
    ) -> Result<Self, DatasetError> {
        let (headers, rows) = match format {
            DatasetFormat::Csv => read_csv(bytes, limits)?,
            DatasetFormat::Xlsx => read_xlsx(bytes, limits)?,
        };
        Self::from_table(headers, rows, limits)
    }

    pub fn from_table(
        headers: Vec<String>,
        rows: Vec<Vec<String>>,
        limits: DatasetLimits,
    ) -> Result<Self, DatasetError> {
        if headers.len() > limits.max_columns {
            return Err(DatasetError::TooLarge {
                what: "columns",
                found: headers.len(),
                limit: limits.max_columns,
            });
        }
        if rows.len() > limits.max_rows {
            return Err(DatasetError::TooLarge {
                what: "rows",
                found: rows.len(),
                limit: limits.max_rows,
            });
        }

        let columns: Vec<String> = headers
            .iter()
            .map(|header| normalize_header(header))
            .collect();
        let position = |name: &str| columns.iter().position(|column| column == name);
        let (Some(pre), Some(post)) = (position(PRE_TEST), position(POST_TEST)) else {
            return Err(DatasetError::schema(
                "Dataset must contain 'pre_test' and 'post_test' columns.",
            ));
        };

        let width = columns.len();
        let rows: Vec<Vec<String>> = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, String::new());
                row
            })
            .collect();

        let dataset = Self {
            columns,
            rows,
            pre,
            post,
        };
        if dataset.valid_row_count() == 0 {
            return Err(DatasetError::schema(
                "No valid data available after filtering: no row has numeric 'pre_test' and 'post_test' values.",
            ));
        }
        Ok(dataset)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    /// First column matching one of the role's aliases, in alias order.
    pub fn find_role(&self, role: ColumnRole) -> Option<usize> {
        role.aliases().iter().find_map(|alias| self.column(alias))
    }

    pub fn has_role(&self, role: ColumnRole) -> bool {
        self.find_role(role).is_some()
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        self.rows
            .get(row)
            .and_then(|cells| cells.get(column))
            .map(String::as_str)
    }

    pub fn numeric(&self, row: usize, column: usize) -> Option<f64> {
        self.cell(row, column).and_then(parse_number)
    }

    fn valid_row_count(&self) -> usize {
        (0..self.rows.len())
            .filter(|&row| {
                self.numeric(row, self.pre).is_some() && self.numeric(row, self.post).is_some()
            })
            .count()
    }

    /// Rows whose `pre_test` and `post_test` both coerce to numbers.
    pub fn score_rows(&self) -> Vec<ScoreRow> {
        let gender = self.find_role(ColumnRole::Gender);
        let class = self.find_role(ColumnRole::Class);
        let participant = self.find_role(ColumnRole::Participant);
        let text = |row: usize, column: Option<usize>| {
            column
                .and_then(|column| self.cell(row, column))
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };

        (0..self.rows.len())
            .filter_map(|row| {
                let pre = self.numeric(row, self.pre)?;
                let post = self.numeric(row, self.post)?;
                Some(ScoreRow {
                    participant: text(row, participant),
                    gender: text(row, gender),
                    class: text(row, class),
                    pre,
                    post,
                })
            })
            .collect()
    }

    /// `pre_<label>` / `post_<label>` column pairs other than the main test pair,
    /// in column order.
    pub fn metric_pairs(&self) -> Vec<(String, usize, usize)> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, name)| name.as_str() != PRE_TEST)
            .filter_map(|(pre, name)| {
                let label = name.strip_prefix("pre_")?;
                if label.is_empty() {
                    return None;
                }
                let post = self.column(&format!("post_{label}"))?;
                Some((label.to_string(), pre, post))
            })
            .collect()
    }
}

pub fn normalize_header(header: &str) -> String {
    header.trim().trim_start_matches('\u{feff}').trim().to_lowercase()
}

/// Numeric coercion for score cells; blanks and non-finite values are missing.
pub fn parse_number(cell: &str) -> Option<f64> {
    let value = cell.trim().parse::<f64>().ok()?;
    value.is_finite().then_some(value)
}

fn read_csv(
    bytes: &[u8],
    limits: DatasetLimits,
) -> Result<(Vec<String>, Vec<Vec<String>>), DatasetError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(bytes);
    let headers: Vec<String> = reader
        .headers()
        .map_err(|err| DatasetError::Unreadable(err.to_string()))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|err| DatasetError::Unreadable(err.to_string()))?;
        if rows.len() == limits.max_rows {
            return Err(DatasetError::TooLarge {
                what: "rows",
                found: rows.len() + 1,
                limit: limits.max_rows,
            });
        }
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok((headers, rows))
}

fn read_xlsx(
    bytes: &[u8],
    limits: DatasetLimits,
) -> Result<(Vec<String>, Vec<Vec<String>>), DatasetError> {
    let mut workbook = Xlsx::new(Cursor::new(bytes))
        .map_err(|err| DatasetError::Unreadable(err.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| DatasetError::Unreadable("workbook has no worksheets".to_string()))?
        .map_err(|err| DatasetError::Unreadable(err.to_string()))?;

    let mut sheet_rows = range.rows();
    let headers: Vec<String> = sheet_rows
        .next()
        .map(|row| row.iter().map(cell_text).collect())
        .unwrap_or_default();

    let mut rows = Vec::new();
    for row in sheet_rows {
        if rows.len() == limits.max_rows {
            return Err(DatasetError::TooLarge {
                what: "rows",
                found: rows.len() + 1,
                limit: limits.max_rows,
            });
        }
        rows.push(row.iter().map(cell_text).collect());
    }
    Ok((headers, rows))
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        other => other.to_string(),
    }
}
