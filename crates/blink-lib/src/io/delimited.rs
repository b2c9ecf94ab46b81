use anyhow::{anyhow, Context, Result};
use csv::{ReaderBuilder, StringRecord, Trim};
use std::path::Path;

/// Load one numeric column from a delimited file with a header row.
///
/// `column` matches a header name (case-insensitive) or, failing that, a
/// zero-based column index. Empty cells are skipped.
pub fn read_column(path: &Path, column: &str, delimiter: u8) -> Result<Vec<f64>> {
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .trim(Trim::All)
        .from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;
    let headers = reader.headers().context("reading header")?.clone();
    let idx = locate_column(&headers, column)?;
    let mut out = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("reading row {}", row + 1))?;
        let Some(cell) = record.get(idx).filter(|c| !c.is_empty()) else {
            continue;
        };
        let value = cell
            .parse::<f64>()
            .with_context(|| format!("row {}: '{}' is not numeric", row + 1, cell))?;
        out.push(value);
    }
    Ok(out)
}

/// Delimiter guess from the file extension: tab for `.tsv`, comma otherwise.
pub fn delimiter_for(path: &Path) -> u8 {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => b'\t',
        _ => b',',
    }
}

fn locate_column(headers: &StringRecord, requested: &str) -> Result<usize> {
    if let Some(idx) = headers
        .iter()
        .position(|name| name.eq_ignore_ascii_case(requested))
    {
        return Ok(idx);
    }
    match requested.parse::<usize>() {
        Ok(idx) if idx < headers.len() => Ok(idx),
        _ => Err(anyhow!(
            "missing column '{}' (available: {})",
            requested,
            headers.iter().collect::<Vec<_>>().join(", ")
        )),
    }
}
