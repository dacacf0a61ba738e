use reqwest::Url;
use tracing::debug;

/// Job boards we recognise, matched against the link's host.
const KNOWN_BOARDS: &[(&str, &str)] = &[
    ("jobsearchmalawi.com", "JobSearch Malawi"),
    ("careersmw.com", "Careers MW"),
    ("glassdoor.com", "Glassdoor"),
];

pub const OTHER_SOURCE: &str = "Other";

/// Display name of the job board a link points at, or "Other".
pub fn source_from_url(link: &str) -> &'static str {
    let host = match Url::parse(link.trim()) {
        Ok(url) => url.host_str().map(str::to_ascii_lowercase),
        Err(e) => {
            debug!(link, error = %e, "Could not parse job link for source");
            None
        }
    };

    host.and_then(|host| {
        KNOWN_BOARDS
            .iter()
            .find(|(domain, _)| host.contains(domain))
            .map(|(_, name)| *name)
    })
    .unwrap_or(OTHER_SOURCE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_boards() {
        assert_eq!(source_from_url("https://www.careersmw.com/jobs/42"), "Careers MW");
        assert_eq!(source_from_url("https://jobsearchmalawi.com/x"), "JobSearch Malawi");
        assert_eq!(source_from_url("https://www.Glassdoor.com/job"), "Glassdoor");
    }

    #[test]
    fn test_unknown_or_invalid_is_other() {
        assert_eq!(source_from_url("https://example.org/jobs/1"), OTHER_SOURCE);
        assert_eq!(source_from_url("not a link"), OTHER_SOURCE);
    }
}
