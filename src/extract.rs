use std::path::Path;
use tracing::info;

use crate::config::SourcesConfig;
use crate::error::{PipelineError, Result};

/// Raw tabular rows as read from a source file. Header names are trimmed and
/// lower-cased; cells stay untyped strings until normalization.
#[derive(Debug, Clone)]
pub struct RawTable {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Read both configured sources, checking that every input exists before
/// reading any of them. Missing input is fatal and pre-transform.
pub fn extract_sources(sources: &SourcesConfig) -> Result<(RawTable, RawTable)> {
    for path in [&sources.results, &sources.winners] {
        if !path.exists() {
            return Err(PipelineError::SourceNotFound(path.clone()));
        }
    }

    let results = read_csv("results", &sources.results)?;
    let winners = read_csv("winners", &sources.winners)?;
    Ok((results, winners))
}

pub fn read_csv(name: &str, path: &Path) -> Result<RawTable> {
    if !path.exists() {
        return Err(PipelineError::SourceNotFound(path.to_path_buf()));
    }

    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_lowercase())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(|cell| cell.to_string()).collect());
    }

    info!(source = name, path = %path.display(), rows = rows.len(), "extracted raw table");
    Ok(RawTable {
        name: name.to_string(),
        headers,
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_is_source_not_found() {
        let err = read_csv("results", Path::new("/nonexistent/results.csv")).unwrap_err();
        assert!(matches!(err, PipelineError::SourceNotFound(_)));
    }

    #[test]
    fn headers_are_trimmed_and_lowercased() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("winners.csv");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, " Year ,Grand_Prix\n2005,Bahrain Grand Prix").unwrap();

        let raw = read_csv("winners", &path).unwrap();
        assert_eq!(raw.headers, vec!["year", "grand_prix"]);
        assert_eq!(raw.rows.len(), 1);
        assert_eq!(raw.rows[0][0], "2005");
    }
}
