//! Row producers for csv and workbook uploads.
//!
//! Parsing is blocking work, so it runs on the blocking pool and hands rows
//! to the async side through a bounded channel. A full channel applies
//! backpressure to the parser.

use std::io::Cursor;

use bytes::Bytes;
use calamine::{Data, Range, Reader, Xls, Xlsx};
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::{FileKind, ImportError, ImportResult};

/// One data row keyed by header name.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    /// 1-based line in the source, counting the header as line 1.
    pub line: usize,
    /// Cell text keyed by the header of its column.
    pub fields: Map<String, Value>,
}

impl RawRow {
    /// The row as a JSON object.
    pub fn to_value(&self) -> Value {
        Value::Object(self.fields.clone())
    }
}

/// Starts parsing `data` on the blocking pool.
///
/// The task resolves to the number of rows sent. It stops early, without
/// error, once the receiving side is gone.
pub(crate) fn spawn_reader(
    data: Bytes,
    kind: FileKind,
    sheet: Option<String>,
    rows: mpsc::Sender<RawRow>,
) -> JoinHandle<ImportResult<usize>> {
    tokio::task::spawn_blocking(move || match kind {
        FileKind::Csv => read_csv(&data, &rows),
        FileKind::Xlsx => {
            let workbook: Xlsx<_> = Xlsx::new(Cursor::new(data)).map_err(ImportError::spreadsheet)?;
            read_workbook(workbook, sheet.as_deref(), &rows)
        }
        FileKind::Xls => {
            let workbook: Xls<_> = Xls::new(Cursor::new(data)).map_err(ImportError::spreadsheet)?;
            read_workbook(workbook, sheet.as_deref(), &rows)
        }
    })
}

fn read_csv(data: &[u8], rows: &mpsc::Sender<RawRow>) -> ImportResult<usize> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(data);
    let mut records = reader.records();

    let header: Vec<String> = match records.next() {
        Some(record) => record?.iter().map(|name| name.trim().to_string()).collect(),
        None => return Err(ImportError::MissingHeader),
    };

    let mut sent = 0;
    for (i, record) in records.enumerate() {
        let record = record?;
        let Some(row) = build_row(i + 2, &header, record.iter().map(str::to_string)) else {
            continue;
        };
        if rows.blocking_send(row).is_err() {
            break;
        }
        sent += 1;
    }
    Ok(sent)
}

fn read_workbook<R>(
    mut workbook: R,
    sheet: Option<&str>,
    rows: &mpsc::Sender<RawRow>,
) -> ImportResult<usize>
where
    R: Reader<Cursor<Bytes>>,
    R::Error: std::fmt::Display,
{
    let name = match sheet {
        Some(name) => name.to_string(),
        None => workbook
            .sheet_names()
            .into_iter()
            .next()
            .ok_or(ImportError::MissingHeader)?,
    };
    if !workbook.sheet_names().iter().any(|n| *n == name) {
        return Err(ImportError::SheetNotFound(name));
    }
    let range: Range<Data> = workbook.worksheet_range(&name).map_err(ImportError::spreadsheet)?;

    let mut lines = range.rows();
    let header: Vec<String> = match lines.next() {
        Some(cells) => cells.iter().map(|c| c.to_string().trim().to_string()).collect(),
        None => return Err(ImportError::MissingHeader),
    };

    let mut sent = 0;
    for (i, cells) in lines.enumerate() {
        let Some(row) = build_row(i + 2, &header, cells.iter().map(cell_text)) else {
            continue;
        };
        if rows.blocking_send(row).is_err() {
            break;
        }
        sent += 1;
    }
    Ok(sent)
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        other => other.to_string(),
    }
}

/// Zips cells with header names. Blank rows yield `None`; columns without a
/// header are dropped.
fn build_row(
    line: usize,
    header: &[String],
    cells: impl Iterator<Item = String>,
) -> Option<RawRow> {
    let mut fields = Map::new();
    let mut blank = true;
    for (name, cell) in header.iter().zip(cells) {
        if name.is_empty() {
            continue;
        }
        blank &= cell.trim().is_empty();
        fields.insert(name.clone(), Value::String(cell));
    }
    if blank {
        return None;
    }
    for name in header.iter().filter(|n| !n.is_empty()) {
        fields.entry(name.clone()).or_insert_with(|| Value::String(String::new()));
    }
    Some(RawRow { line, fields })
}
