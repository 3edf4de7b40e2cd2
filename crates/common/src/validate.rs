//! Multi-criteria response acceptance.
//!
//! A candidate response is accepted only when the transport succeeded, the
//! rendered markup is structurally complete, and the main document's headers
//! were captured. Everything else maps to a rejection with a reason so the
//! retry loop can report why an attempt was thrown away.

use std::collections::HashMap;

/// Classification of a candidate response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    /// The navigation itself failed (non-2xx or no response object).
    RejectedTransport,
    /// Headers captured, but the markup is incomplete.
    RejectedContent,
    /// Markup complete, but no headers were captured.
    RejectedHeaders,
    /// Neither markup nor headers were usable.
    RejectedBoth,
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// A document counts as structurally complete once its closing top-level
/// marker is present. Truncated responses from a collapsing circuit lack it.
pub fn is_structurally_complete(content: &str) -> bool {
    let lower = content.to_lowercase();
    lower.contains("</html>") || lower.contains("</body>")
}

/// Pure decision over the three acceptance criteria. No side effects.
pub fn validate(
    status_ok: bool,
    content: Option<&str>,
    headers: Option<&HashMap<String, String>>,
) -> Verdict {
    if !status_ok {
        return Verdict::RejectedTransport;
    }
    let content_complete = content.is_some_and(is_structurally_complete);
    let headers_present = headers.is_some_and(|h| !h.is_empty());
    match (content_complete, headers_present) {
        (true, true) => Verdict::Accepted,
        (true, false) => Verdict::RejectedHeaders,
        (false, true) => Verdict::RejectedContent,
        (false, false) => Verdict::RejectedBoth,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers() -> HashMap<String, String> {
        HashMap::from([("Content-Type".to_string(), "text/html".to_string())])
    }

    const COMPLETE: &str = "<html><body>hello</body></html>";
    const TRUNCATED: &str = "<html><body>hel";

    #[test]
    fn test_accepts_complete_response() {
        let verdict = validate(true, Some(COMPLETE), Some(&headers()));
        assert_eq!(verdict, Verdict::Accepted);
        assert!(verdict.is_accepted());
    }

    #[test]
    fn test_transport_failure_short_circuits() {
        // Status not ok rejects regardless of content/header quality.
        assert_eq!(
            validate(false, Some(COMPLETE), Some(&headers())),
            Verdict::RejectedTransport
        );
        assert_eq!(validate(false, None, None), Verdict::RejectedTransport);
    }

    #[test]
    fn test_incomplete_content_with_headers() {
        assert_eq!(
            validate(true, Some(TRUNCATED), Some(&headers())),
            Verdict::RejectedContent
        );
    }

    #[test]
    fn test_complete_content_without_headers() {
        assert_eq!(
            validate(true, Some(COMPLETE), Some(&HashMap::new())),
            Verdict::RejectedHeaders
        );
        assert_eq!(
            validate(true, Some(COMPLETE), None),
            Verdict::RejectedHeaders
        );
    }

    #[test]
    fn test_nothing_usable() {
        assert_eq!(
            validate(true, Some(TRUNCATED), Some(&HashMap::new())),
            Verdict::RejectedBoth
        );
        assert_eq!(validate(true, None, None), Verdict::RejectedBoth);
    }

    #[test]
    fn test_marker_case_insensitive() {
        assert!(is_structurally_complete("<HTML><BODY>x</BODY></HTML>"));
        assert!(is_structurally_complete("<html>x</BoDy>"));
        assert!(!is_structurally_complete("<html><body>x"));
    }

    #[test]
    fn test_whitespace_does_not_matter() {
        let padded = format!("\n\n   {}   \n", COMPLETE);
        assert_eq!(validate(true, Some(&padded), Some(&headers())), Verdict::Accepted);
    }

    #[test]
    fn test_header_key_casing_does_not_matter() {
        let upper = HashMap::from([("CONTENT-TYPE".to_string(), "text/html".to_string())]);
        assert_eq!(validate(true, Some(COMPLETE), Some(&upper)), Verdict::Accepted);
    }

    #[test]
    fn test_body_marker_alone_is_enough() {
        assert_eq!(
            validate(true, Some("<body>x</body>"), Some(&headers())),
            Verdict::Accepted
        );
    }
}
