use crate::d1::types::{Meta, RawResponse, RawResults};
use chrono::{DateTime, NaiveDateTime, Utc};
use common::models::{Field, FieldValues, Frame, FrameMeta, Notice, QueryStat};
use log::{debug, warn};
use serde_json::Value;

pub const NO_DATA: &str = "Query returned no data.";
pub const EXECUTED_NO_DATA: &str = "Query executed successfully, no data returned.";

// SQLite's CURRENT_TIMESTAMP layout, optionally with `subsec` fractions
const SQLITE_DATETIME: &str = "%Y-%m-%d %H:%M:%S%.f";

static MISSING_CELL: Value = Value::Null;

/// How every cell of a column is converted, decided once from the first row.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum ColumnKind {
    Number,
    Time,
    Text,
    Boolean,
    Stringified,
}

impl ColumnKind {
    fn infer(sample: &Value) -> Self {
        match sample {
            Value::Number(_) => ColumnKind::Number,
            Value::String(s) if parse_timestamp(s).is_some() => ColumnKind::Time,
            Value::String(_) => ColumnKind::Text,
            Value::Bool(_) => ColumnKind::Boolean,
            Value::Null | Value::Array(_) | Value::Object(_) => ColumnKind::Stringified,
        }
    }
}

/// Checks the fixed-width `YYYY-MM-DD?HH:MM:SS` prefix and returns the separator byte.
fn datetime_separator(s: &str) -> Option<u8> {
    let bytes = s.as_bytes();
    if bytes.len() < 19 {
        return None;
    }
    let shape_ok = bytes[..19].iter().enumerate().all(|(i, b)| match i {
        4 | 7 => *b == b'-',
        10 => true,
        13 | 16 => *b == b':',
        _ => b.is_ascii_digit(),
    });
    shape_ok.then_some(bytes[10])
}

/// Parses `YYYY-MM-DD HH:MM:SS[.fff]` (taken as UTC), falling back to RFC3339.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    match datetime_separator(s)? {
        b' ' => NaiveDateTime::parse_from_str(s, SQLITE_DATETIME)
            .ok()
            .map(|t| t.and_utc()),
        b'T' | b't' => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        _ => None,
    }
}

fn stringify(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Builds the frame for one query. Data anomalies end up as absent cells or
/// notices, never as errors.
pub fn to_frame(ref_id: &str, query_text: &str, response: &RawResponse) -> Frame {
    let mut frame = Frame::new(ref_id);
    frame.meta = Some(FrameMeta {
        executed_query_string: Some(query_text.to_string()),
        stats: vec![],
    });

    let Some(item) = response.result.first() else {
        debug!("D1 query returned no result items");
        frame.append_notice(Notice::info(NO_DATA));
        return frame;
    };
    if response.result.len() > 1 {
        debug!(
            "Ignoring {} additional D1 result items",
            response.result.len() - 1
        );
    }
    if let Some(meta) = frame.meta.as_mut() {
        meta.stats = stats(&item.meta);
    }

    let results = match &item.results {
        Some(results) if !results.columns.is_empty() => results,
        _ => {
            frame.append_notice(Notice::info(EXECUTED_NO_DATA));
            return frame;
        }
    };

    if results.rows.is_empty() {
        frame.fields = results
            .columns
            .iter()
            .map(|name| Field::new(name.as_str(), FieldValues::String(vec![])))
            .collect();
        frame.append_notice(Notice::info(NO_DATA));
        return frame;
    }

    for (index, name) in results.columns.iter().enumerate() {
        let kind = ColumnKind::infer(cell(&results.rows[0], index));
        debug!("Column `{name}` inferred as {kind:?}");
        let (values, unparsed) = convert_column(results, index, kind);
        if unparsed > 0 {
            frame.append_notice(Notice::warning(format!(
                "{unparsed} value(s) in column `{name}` could not be parsed as timestamps and were left empty"
            )));
        }
        frame.fields.push(Field::new(name.as_str(), values));
    }
    frame
}

fn cell(row: &[Value], index: usize) -> &Value {
    row.get(index).unwrap_or(&MISSING_CELL)
}

/// Returns the column values and the number of strings that failed to parse as timestamps.
fn convert_column(results: &RawResults, index: usize, kind: ColumnKind) -> (FieldValues, usize) {
    let cells = results.rows.iter().map(|row| cell(row, index));
    match kind {
        ColumnKind::Number => (FieldValues::Number(cells.map(Value::as_f64).collect()), 0),
        ColumnKind::Boolean => (FieldValues::Boolean(cells.map(Value::as_bool).collect()), 0),
        ColumnKind::Text => (
            FieldValues::String(cells.map(|v| v.as_str().map(str::to_string)).collect()),
            0,
        ),
        ColumnKind::Stringified => (FieldValues::String(cells.map(stringify).collect()), 0),
        ColumnKind::Time => {
            let mut unparsed = 0;
            let values = cells
                .enumerate()
                .map(|(row, value)| match value {
                    Value::String(s) => {
                        let parsed = parse_timestamp(s);
                        if parsed.is_none() {
                            warn!("Row {row}: `{s}` is not a recognised timestamp");
                            unparsed += 1;
                        }
                        parsed
                    }
                    _ => None,
                })
                .collect();
            (FieldValues::Time(values), unparsed)
        }
    }
}

fn stats(meta: &Meta) -> Vec<QueryStat> {
    let stat = |name: &str, value: Option<f64>, unit: Option<&str>| {
        value.map(|value| QueryStat {
            display_name: name.to_string(),
            value,
            unit: unit.map(str::to_string),
        })
    };
    [
        stat("Rows read", meta.rows_read.map(|v| v as f64), None),
        stat("Rows written", meta.rows_written.map(|v| v as f64), None),
        stat("Changes", meta.changes.map(|v| v as f64), None),
        stat("Duration", meta.duration, Some("ms")),
    ]
    .into_iter()
    .flatten()
    .collect()
}
