use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::resilience::TaskError;

/// One scraped listing as the scraper writes it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IngestRecord {
    pub link: String,
    pub company_logo: String,
    pub position: String,
    pub company_name: String,
    pub location: String,
    pub job_type: String,
    pub date_posted: String,
    pub application_deadline: String,
    pub job_description: String,
    pub source: String,
}

/// Structured fields extracted from a listing's description.
///
/// Values stay loosely typed: models answer some of these as a string one
/// time and as a list the next.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListingDetails {
    pub job_title: Value,
    pub organization: Value,
    pub grade: Value,
    pub reporting_to: Value,
    pub responsible_for: Value,
    pub department: Value,
    pub purpose: Value,
    pub key_responsibilities: Value,
    pub required_qualifications: Value,
    pub required_experience: Value,
    pub required_memberships: Value,
    pub contact_details: Value,
    pub additional_notes: Value,
    pub tags: Value,
    pub industry: Value,
    pub domain: Value,
}

const NOT_AVAILABLE: &str = "N/A";

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%B %d, %Y",
    "%b %d, %Y",
    "%d/%m/%Y",
    "%m/%d/%Y",
    "%d-%m-%Y",
    "%m-%d-%Y",
    "%d %b %Y",
    "%d %B %Y",
];

const DATE_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %I:%M %p",
    "%Y-%m-%d %H:%M",
    "%d %B %Y %I:%M %p",
    "%d %B %Y %H:%M",
    "%d %b %Y %I:%M %p",
    "%d %b %Y %H:%M",
];

/// Parses a scraped date in any of the formats job boards commonly use.
/// Blank and placeholder values are `Ok(None)`.
pub fn parse_listing_date(raw: &str) -> Result<Option<DateTime<Utc>>, TaskError> {
    let raw = raw.trim();
    if raw.is_empty()
        || raw.eq_ignore_ascii_case(NOT_AVAILABLE)
        || raw.eq_ignore_ascii_case("Not specified")
    {
        return Ok(None);
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(parsed.with_timezone(&Utc)));
    }
    for format in DATE_TIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(Some(parsed.and_utc()));
        }
    }
    for format in DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(raw, format) {
            if let Some(midnight) = parsed.and_hms_opt(0, 0, 0) {
                return Ok(Some(midnight.and_utc()));
            }
        }
    }

    Err(TaskError::invalid_input(format!(
        "unrecognised date format: {raw:?}"
    )))
}

/// Coerces a string-or-list answer into a list of strings. With
/// `drop_placeholders`, "N/A" and empty entries are removed.
pub fn normalize_string_list(value: Value, drop_placeholders: bool) -> Value {
    let is_placeholder = |s: &str| drop_placeholders && (s.is_empty() || s == NOT_AVAILABLE);

    let items: Vec<Value> = match value {
        Value::Null => Vec::new(),
        Value::String(s) if is_placeholder(&s) => Vec::new(),
        Value::String(s) => vec![Value::String(s)],
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) if is_placeholder(&s) => None,
                Value::String(s) => Some(Value::String(s)),
                other => Some(Value::String(other.to_string())),
            })
            .collect(),
        other => vec![Value::String(other.to_string())],
    };
    Value::Array(items)
}

impl ListingDetails {
    /// Puts the list-shaped fields into list form.
    pub fn normalized(mut self) -> Self {
        self.responsible_for = normalize_string_list(self.responsible_for, false);
        self.required_memberships = normalize_string_list(self.required_memberships, true);
        self
    }
}

/// The document stored for one listing: the scraped fields, parsed dates,
/// extracted details and the upload time.
pub fn listing_document(
    record: &IngestRecord,
    details: &ListingDetails,
    date_posted: Option<DateTime<Utc>>,
    application_deadline: Option<DateTime<Utc>>,
    uploaded_at: DateTime<Utc>,
) -> Value {
    let mut document = json!({
        "link": record.link.trim(),
        "companyLogo": record.company_logo,
        "position": record.position,
        "companyName": record.company_name,
        "location": record.location,
        "jobType": record.job_type,
        "jobDescription": record.job_description,
        "source": record.source,
        "datePosted": date_posted,
        "applicationDeadline": application_deadline,
        "uploadedAt": uploaded_at,
    });

    if let (Value::Object(document), Ok(Value::Object(details))) =
        (&mut document, serde_json::to_value(details))
    {
        document.extend(details);
    }
    document
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::resilience::ErrorKind;

    fn day(y: i32, m: u32, d: u32) -> Option<DateTime<Utc>> {
        Some(Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap())
    }

    #[test]
    fn test_parse_common_date_formats() {
        assert_eq!(parse_listing_date("2025-05-16").unwrap(), day(2025, 5, 16));
        assert_eq!(parse_listing_date("May 30, 2025").unwrap(), day(2025, 5, 30));
        assert_eq!(parse_listing_date("30/05/2025").unwrap(), day(2025, 5, 30));
        // day 30 is not a month, so this falls through to month-first
        assert_eq!(parse_listing_date("05/30/2025").unwrap(), day(2025, 5, 30));
        assert_eq!(parse_listing_date("30 May 2025").unwrap(), day(2025, 5, 30));
        assert_eq!(
            parse_listing_date("2025-05-16 14:30").unwrap(),
            Some(Utc.with_ymd_and_hms(2025, 5, 16, 14, 30, 0).unwrap())
        );
        assert_eq!(
            parse_listing_date("2025-05-16T08:00:00+02:00").unwrap(),
            Some(Utc.with_ymd_and_hms(2025, 5, 16, 6, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_placeholder_dates_are_absent() {
        for raw in ["", "  ", "N/A", "n/a", "Not specified"] {
            assert_eq!(parse_listing_date(raw).unwrap(), None, "{raw:?}");
        }
    }

    #[test]
    fn test_unparseable_date_is_invalid_input() {
        let err = parse_listing_date("as soon as possible").unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidInput);
    }

    #[test]
    fn test_normalize_string_list() {
        assert_eq!(normalize_string_list(json!("Manager"), false), json!(["Manager"]));
        assert_eq!(normalize_string_list(json!("N/A"), false), json!(["N/A"]));
        assert_eq!(normalize_string_list(json!("N/A"), true), json!([]));
        assert_eq!(normalize_string_list(Value::Null, false), json!([]));
        assert_eq!(
            normalize_string_list(json!(["ICAM", "N/A", "", 3]), true),
            json!(["ICAM", "3"])
        );
    }

    #[test]
    fn test_listing_document_merges_details() {
        let record = IngestRecord {
            link: " https://careersmw.com/jobs/1 ".into(),
            position: "Accountant".into(),
            company_name: "Press Corp".into(),
            source: "careersmw".into(),
            ..IngestRecord::default()
        };
        let details = ListingDetails {
            industry: json!("Finance"),
            ..ListingDetails::default()
        };
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();

        let document = listing_document(&record, &details, day(2025, 5, 16), None, now);

        assert_eq!(document["link"], "https://careersmw.com/jobs/1");
        assert_eq!(document["companyName"], "Press Corp");
        assert_eq!(document["industry"], "Finance");
        assert_eq!(document["datePosted"], "2025-05-16T00:00:00Z");
        assert!(document["applicationDeadline"].is_null());
        assert_eq!(document["uploadedAt"], "2025-06-01T12:00:00Z");
    }
}
