use chrono::{DateTime, Local};

/// Extract domain from URL
pub fn extract_domain(url: &str) -> anyhow::Result<String> {
    url::Url::parse(url)?
        .host_str()
        .map(|h| h.to_string())
        .ok_or_else(|| anyhow::anyhow!("No host in URL"))
}

/// Derive the artifact filename for a fetched document: the URL with its
/// scheme stripped and unsafe characters flattened, plus a timestamp.
///
/// "https://www.example.com/a/b" at 2024-01-02 03:04:05 becomes
/// "www.example.com_a_b_20240102_030405.html".
pub fn artifact_filename(url: &str, when: DateTime<Local>) -> String {
    let stripped = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    let flattened: String = stripped
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = flattened.trim_matches(|c| c == '_' || c == '.' || c == '-');
    format!("{}_{}.html", trimmed, when.format("%Y%m%d_%H%M%S"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()
    }

    #[test]
    fn test_extract_domain() {
        assert_eq!(
            extract_domain("https://example.com/path").unwrap(),
            "example.com"
        );
        assert_eq!(
            extract_domain("http://sub.example.com:8080/path").unwrap(),
            "sub.example.com"
        );
    }

    #[test]
    fn test_artifact_filename_strips_scheme_and_flattens() {
        assert_eq!(
            artifact_filename("https://www.example.com/a/b?q=1", at()),
            "www.example.com_a_b_q_1_20240102_030405.html"
        );
    }

    #[test]
    fn test_artifact_filename_trims_leftover_punctuation() {
        assert_eq!(
            artifact_filename("https://www.example.com/", at()),
            "www.example.com_20240102_030405.html"
        );
    }
}
