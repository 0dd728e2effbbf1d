//! Normalization of tabular kubectl output into dashboard rows.

use serde_json::Value;

use crate::model::WorkloadRow;

/// Turns `kubectl get` column output into rows keyed by header.
///
/// Headers have `-` replaced by `_`, and any header mentioning `PORT` becomes
/// `PORTS`, so `UP-TO-DATE` and `PORT(S)` line up with the keys produced from
/// API objects. A line shorter than the header only fills the columns it has.
/// A line with more fields than the header (`3 (5m ago)` under `RESTARTS`) is
/// cut at the header's column offsets instead.
pub fn parse_table(output: &str) -> Vec<WorkloadRow> {
    let mut lines = output.lines().filter(|line| !line.trim().is_empty());
    let Some(header) = lines.next() else {
        return Vec::new();
    };

    let columns = header_columns(header);

    lines
        .map(|line| {
            let fields = line.split_whitespace().collect::<Vec<_>>();
            if fields.len() <= columns.len() {
                return columns
                    .iter()
                    .zip(fields)
                    .map(|((key, _), value)| (key.clone(), Value::String(value.to_string())))
                    .collect::<WorkloadRow>();
            }
            sliced_row(&columns, line)
        })
        .collect()
}

/// Normalized key and starting byte offset of every header column.
fn header_columns(header: &str) -> Vec<(String, usize)> {
    let mut columns = Vec::new();
    let mut start = None;
    for (offset, ch) in header.char_indices().chain([(header.len(), ' ')]) {
        match (ch.is_whitespace(), start) {
            (false, None) => start = Some(offset),
            (true, Some(begin)) => {
                columns.push((normalize_header(&header[begin..offset]), begin));
                start = None;
            }
            _ => {}
        }
    }
    columns
}

fn sliced_row(columns: &[(String, usize)], line: &str) -> WorkloadRow {
    let mut row = WorkloadRow::new();
    for (index, (key, begin)) in columns.iter().enumerate() {
        let end = columns
            .get(index + 1)
            .map(|(_, next)| *next)
            .unwrap_or(line.len())
            .min(line.len());
        let Some(cell) = line.get((*begin).min(end)..end) else {
            continue;
        };
        let cell = cell.trim();
        if !cell.is_empty() {
            row.insert(key.clone(), Value::String(cell.to_string()));
        }
    }
    row
}

pub fn normalize_header(header: &str) -> String {
    if header.contains("PORT") {
        return "PORTS".to_string();
    }
    header.replace('-', "_")
}

/// Compact age as kubectl prints it, using the largest whole unit.
pub fn format_age(seconds: i64) -> String {
    let seconds = seconds.max(0);
    if seconds >= 86_400 {
        return format!("{}d", seconds / 86_400);
    }

    if seconds >= 3_600 {
        return format!("{}h", seconds / 3_600);
    }

    if seconds >= 60 {
        return format!("{}m", seconds / 60);
    }

    format!("{seconds}s")
}

/// Repository part of an image reference, used for image search.
pub fn image_repository(image: &str) -> &str {
    image.split(':').next().unwrap_or(image)
}
