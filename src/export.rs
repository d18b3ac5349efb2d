use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::query::ExportFormat;

pub fn export_filename(format: ExportFormat) -> String {
    format!("water-data.{}", format.as_str())
}

/// Writes the server's export body untouched. An existing file is never
/// overwritten; a numbered sibling is used instead.
pub fn save_export(dir: &Path, format: ExportFormat, bytes: &[u8]) -> Result<PathBuf> {
    let mut path = export_path(dir, &export_filename(format))?;
    if path.exists() {
        path = unique_path(&path);
    }
    fs::write(&path, bytes).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

fn export_path(dir: &Path, filename: &str) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    Ok(dir.join(filename))
}

fn unique_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("water-data");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let parent = path.parent().unwrap_or_else(|| Path::new(""));
    let mut i = 1;
    loop {
        let name = if ext.is_empty() {
            format!("{stem}-{i}")
        } else {
            format!("{stem}-{i}.{ext}")
        };
        let candidate = parent.join(name);
        if !candidate.exists() {
            return candidate;
        }
        i += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir() -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("waterwatch-export-{nanos}"))
    }

    #[test]
    fn saves_bytes_verbatim() {
        let dir = temp_dir();
        let path = save_export(&dir, ExportFormat::GeoJson, b"{\"type\":\"FeatureCollection\"}").unwrap();
        assert_eq!(path.file_name().unwrap(), "water-data.geojson");
        assert_eq!(fs::read(&path).unwrap(), b"{\"type\":\"FeatureCollection\"}");
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn existing_file_gets_numbered_sibling() {
        let dir = temp_dir();
        let first = save_export(&dir, ExportFormat::Csv, b"a,b\n").unwrap();
        let second = save_export(&dir, ExportFormat::Csv, b"c,d\n").unwrap();
        assert_ne!(first, second);
        assert_eq!(second.file_name().unwrap(), "water-data-1.csv");
        assert_eq!(fs::read(&first).unwrap(), b"a,b\n");
        let _ = fs::remove_dir_all(dir);
    }
}
