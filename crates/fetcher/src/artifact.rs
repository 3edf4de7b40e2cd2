use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::fs;
use std::path::{Path, PathBuf};
use torfetch_common::utils::artifact_filename;

/// Where the fetched document lands: output dir + URL-derived filename.
pub fn artifact_path(output_dir: &Path, target_url: &str, when: DateTime<Local>) -> PathBuf {
    output_dir.join(artifact_filename(target_url, when))
}

/// Persist the captured document. A failure here surfaces as an overall run
/// failure even after a successful fetch - an artifact that was not
/// delivered is not a success.
pub fn write_artifact(path: &Path, content: &str) -> Result<()> {
    fs::write(path, content)
        .with_context(|| format!("could not write HTML output file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_artifact_path_derivation() {
        let when = Local.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let path = artifact_path(Path::new("/tmp/out"), "https://www.example.com/", when);
        assert_eq!(
            path,
            Path::new("/tmp/out/www.example.com_20240102_030405.html")
        );
    }

    #[test]
    fn test_write_and_read_back() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("torfetch-artifact-test-{}.html", std::process::id()));
        write_artifact(&path, "<html><body>x</body></html>").unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "<html><body>x</body></html>"
        );
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_write_into_missing_directory_fails() {
        let path = Path::new("/nonexistent-torfetch-dir/out.html");
        assert!(write_artifact(path, "x").is_err());
    }
}
