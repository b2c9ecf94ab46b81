use anyhow::{Context, Result};
use std::{fmt::Write as _, path::Path};

/// Parse a plain-text sample series, ignoring blank/comment lines.
///
/// Each line may hold one value or several separated by whitespace or commas.
pub fn parse_f64_series(text: &str) -> Result<Vec<f64>> {
    let mut out = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        for token in trimmed
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|t| !t.is_empty())
        {
            let val: f64 = token
                .parse()
                .with_context(|| format!("line {} is not f64: {}", idx + 1, token))?;
            out.push(val);
        }
    }
    Ok(out)
}

/// Read a plain-text sample series from disk.
pub fn read_f64_series(path: &Path) -> Result<Vec<f64>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_f64_series(&text)
}

/// One value per line.
pub fn format_f64_series(values: &[f64]) -> String {
    let mut out = String::with_capacity(values.len() * 12);
    for v in values {
        let _ = writeln!(out, "{v}");
    }
    out
}

pub fn write_f64_series(path: &Path, values: &[f64]) -> Result<()> {
    std::fs::write(path, format_f64_series(values))
        .with_context(|| format!("failed to write {}", path.display()))
}
