// CSV ingestion (local path or remote URL) and export

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::{
    fs,
    io::{self, Read, Write},
    path::Path,
    time::Duration,
};
use tracing::{debug, info};

use crate::error::CsvError;

// --- Constants ---

/// Local files at or above this size are rejected before reading.
pub const MAX_CSV_FILE_SIZE: u64 = 512_000_000;

/// Default bound on fetching a remote CSV file.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Rows between two progress reports.
const PROGRESS_EVERY: usize = 10_000;

/// A dot with something before it, followed later by a `/`.
static REMOTE_PATH: Lazy<Regex> = Lazy::new(|| Regex::new(r"^.+\..+/").expect("static regex"));

// --- Data Structures ---

/// Column-oriented view of a CSV file whose cells were decoded as JSON.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CsvTable {
    pub columns: Vec<String>,
    /// One entry per column, each holding one decoded cell per row.
    pub data: Vec<Vec<Value>>,
}

impl CsvTable {
    pub fn num_rows(&self) -> usize {
        self.data.first().map_or(0, Vec::len)
    }

    /// Transposes the columns back into rows.
    pub fn rows(&self) -> Vec<Vec<Value>> {
        (0..self.num_rows())
            .map(|row| self.data.iter().map(|column| column[row].clone()).collect())
            .collect()
    }

    fn push_row(&mut self, row: Vec<Value>) {
        if self.data.is_empty() {
            self.data = vec![Vec::new(); row.len()];
        }
        for (column, value) in self.data.iter_mut().zip(row) {
            column.push(value);
        }
    }
}

/// Observer for row counts while a CSV file is read or written.
pub trait Progress: Send + Sync {
    fn rows_processed(&self, label: &str, processed: usize);

    fn finished(&self, label: &str, processed: usize) {
        self.rows_processed(label, processed);
    }
}

/// Discards progress; used in non-interactive runs and tests.
pub struct SilentProgress;

impl Progress for SilentProgress {
    fn rows_processed(&self, _label: &str, _processed: usize) {}
}

/// Prints progress to stderr so stdout stays clean for results.
pub struct StderrProgress;

impl Progress for StderrProgress {
    fn rows_processed(&self, label: &str, processed: usize) {
        eprint!("\r{} {} rows", label, processed);
        let _ = io::stderr().flush();
    }

    fn finished(&self, label: &str, processed: usize) {
        eprintln!("\r{} {} rows. Done.", label, processed);
    }
}

// --- Reading ---

/// Loose check deciding whether `path` is fetched over HTTP instead of opened locally.
///
/// Note that relative paths such as `../data/x.csv` also match.
pub fn is_remote_path(path: &str) -> bool {
    REMOTE_PATH.is_match(path)
}

/// Removes the quote characters users tend to wrap paths in.
pub fn strip_quotes(path: &str) -> String {
    path.chars().filter(|c| *c != '"' && *c != '\'').collect()
}

fn check_suffix(path: &str) -> Result<(), CsvError> {
    if path.is_empty() || !path.ends_with(".csv") {
        return Err(CsvError::InvalidPath(path.to_string()));
    }
    Ok(())
}

/// Reads a CSV file from a local path or a remote URL.
pub async fn read_csv_file(
    path: &str,
    with_header: bool,
    fetch_timeout: Duration,
    progress: &dyn Progress,
) -> Result<CsvTable, CsvError> {
    check_suffix(path)?;
    if is_remote_path(path) {
        read_remote_csv(path, with_header, fetch_timeout, progress).await
    } else {
        read_local_csv(Path::new(path), with_header, progress)
    }
}

pub fn check_file_size(size: u64) -> Result<(), CsvError> {
    if size >= MAX_CSV_FILE_SIZE {
        return Err(CsvError::FileTooLarge {
            size,
            limit: MAX_CSV_FILE_SIZE,
        });
    }
    Ok(())
}

/// Reads a local CSV file, rejecting it up front when it is too large.
pub fn read_local_csv(
    path: &Path,
    with_header: bool,
    progress: &dyn Progress,
) -> Result<CsvTable, CsvError> {
    let shown = path.display().to_string();
    check_suffix(&shown)?;
    info!("Reading file from local path '{}'", shown);

    let io_err = |source| CsvError::Io {
        path: shown.clone(),
        source,
    };
    let size = fs::metadata(path).map_err(io_err)?.len();
    check_file_size(size)?;
    debug!("Opening csv file ({} bytes)", size);
    let file = fs::File::open(path).map_err(io_err)?;
    parse_csv(io::BufReader::new(file), with_header, progress)
}

/// Downloads a CSV file and parses it. Expiry of `timeout` is reported as `NetworkTimeout`.
pub async fn read_remote_csv(
    url: &str,
    with_header: bool,
    timeout: Duration,
    progress: &dyn Progress,
) -> Result<CsvTable, CsvError> {
    info!("Reading file from remote URL '{}'", url);
    let http_err = |source: reqwest::Error| {
        if source.is_timeout() {
            CsvError::NetworkTimeout(url.to_string())
        } else {
            CsvError::Http {
                url: url.to_string(),
                source,
            }
        }
    };

    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(http_err)?;
    let body = client
        .get(url)
        .send()
        .await
        .and_then(|response| response.error_for_status())
        .map_err(http_err)?
        .bytes()
        .await
        .map_err(http_err)?;
    debug!("Downloaded {} bytes from '{}'", body.len(), url);

    let text = std::str::from_utf8(&body).map_err(|_| CsvError::Encoding(url.to_string()))?;
    parse_csv(text.as_bytes(), with_header, progress)
}

/// Streams rows from `reader`, transposing them into columns and decoding every cell as JSON.
pub fn parse_csv<R: Read>(
    reader: R,
    with_header: bool,
    progress: &dyn Progress,
) -> Result<CsvTable, CsvError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .delimiter(b',')
        .from_reader(reader);

    let mut table = CsvTable::default();
    let mut line_count = 0usize;
    for record in csv_reader.records() {
        let record = record?;
        line_count += 1;
        if with_header && line_count == 1 {
            table.columns = record.iter().map(str::to_string).collect();
            table.data = vec![Vec::new(); table.columns.len()];
            continue;
        }
        let row = record
            .iter()
            .enumerate()
            .map(|(idx, cell)| {
                serde_json::from_str(cell).map_err(|source| CsvError::MalformedCell {
                    row: line_count,
                    column: idx + 1,
                    source,
                })
            })
            .collect::<Result<Vec<Value>, _>>()?;
        table.push_row(row);
        if line_count % PROGRESS_EVERY == 0 {
            progress.rows_processed("Reading csv rows...", line_count);
        }
    }
    progress.finished("Reading csv rows...", line_count);
    info!("Column names are {:?}", table.columns);
    info!("Processed {} lines.", line_count);
    Ok(table)
}

// --- Writing ---

/// Writes `rows` to `path`, headers first when given. Cells are written as JSON text so the
/// file reads back through [`read_csv_file`] unchanged.
pub fn write_csv_file(
    path: &Path,
    rows: &[Vec<Value>],
    headers: &[String],
    progress: &dyn Progress,
) -> Result<usize, CsvError> {
    let shown = path.display().to_string();
    if shown.is_empty() {
        return Err(CsvError::InvalidPath(shown));
    }
    let file = fs::File::create(path).map_err(|source| CsvError::Io {
        path: shown.clone(),
        source,
    })?;
    let mut writer = csv::WriterBuilder::new().delimiter(b',').from_writer(file);

    if !headers.is_empty() {
        writer.write_record(headers)?;
    }
    let mut line_count = 0usize;
    for row in rows {
        writer.write_record(row.iter().map(Value::to_string))?;
        line_count += 1;
        if line_count % PROGRESS_EVERY == 0 {
            progress.rows_processed("Writing csv rows...", line_count);
        }
    }
    writer.flush().map_err(|source| CsvError::Io {
        path: shown.clone(),
        source,
    })?;
    progress.finished("Writing csv rows...", line_count);
    info!("Processed {} lines into '{}'.", line_count, shown);
    Ok(line_count)
}
