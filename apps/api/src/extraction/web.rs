use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use scraper::{ElementRef, Html, Node};
use tracing::debug;

use crate::extraction::ReferenceFetcher;
use crate::resilience::TaskError;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = concat!("tailor-api/", env!("CARGO_PKG_VERSION"));

/// Navigation and sharing phrases that add nothing to a job description.
const BOILERPLATE: &[&str] = &["Post navigation", "Share this:", "Follow us", "Related Posts"];

/// Downloads a job posting and reduces it to its readable text.
#[derive(Clone)]
pub struct WebFetcher {
    client: Client,
}

impl WebFetcher {
    pub fn new() -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: Client::builder()
                .timeout(FETCH_TIMEOUT)
                .user_agent(USER_AGENT)
                .build()?,
        })
    }
}

#[async_trait]
impl ReferenceFetcher for WebFetcher {
    async fn fetch_reference(&self, locator: &str) -> Result<String, TaskError> {
        let url = parse_locator(locator)?;

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| TaskError::transient(format!("request to {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let message = format!("{url} answered HTTP {status}");
            return Err(if is_retryable_status(status) {
                TaskError::transient(message)
            } else {
                TaskError::unrecoverable(message)
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| TaskError::transient(format!("reading {url} failed: {e}")))?;

        let text = html_to_text(&body);
        if text.is_empty() {
            return Err(TaskError::unrecoverable(format!(
                "could not find readable content at {url}"
            )));
        }

        debug!(url = %url, chars = text.len(), "Fetched job posting");
        Ok(text)
    }
}

fn parse_locator(locator: &str) -> Result<Url, TaskError> {
    let url = Url::parse(locator.trim())
        .map_err(|e| TaskError::invalid_input(format!("invalid job link '{locator}': {e}")))?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(TaskError::invalid_input(format!(
            "job link must be http or https, got '{scheme}'"
        ))),
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Picks the main content of a page and flattens it to cleaned text.
///
/// Preference order: the first `<main>` or `<article>`, then the `<div>` with
/// the most text, then `<body>`.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let root = document.root_element();
    let elements = || root.descendants().filter_map(ElementRef::wrap);

    let main = elements().find(|el| matches!(el.value().name(), "main" | "article"));
    let content = main
        .or_else(|| {
            let mut divs = Vec::new();
            measure(root, &mut divs);
            divs.into_iter().max_by_key(|(_, len)| *len).map(|(div, _)| div)
        })
        .or_else(|| elements().find(|el| el.value().name() == "body"))
        .unwrap_or(root);

    let mut text = String::new();
    collect_text(content, &mut text);
    clean_text(&text)
}

fn is_hidden(element: ElementRef<'_>) -> bool {
    matches!(element.value().name(), "script" | "style" | "noscript")
}

/// Visible text length under `element`. Every `<div>` met on the way is
/// recorded with its own length, in document order.
fn measure<'a>(element: ElementRef<'a>, divs: &mut Vec<(ElementRef<'a>, usize)>) -> usize {
    let slot = (element.value().name() == "div").then(|| {
        divs.push((element, 0));
        divs.len() - 1
    });

    let mut len = 0;
    for child in element.children() {
        if let Node::Text(chunk) = child.value() {
            len += chunk.trim().len();
        } else if let Some(child) = ElementRef::wrap(child) {
            if !is_hidden(child) {
                len += measure(child, divs);
            }
        }
    }

    if let Some(slot) = slot {
        divs[slot].1 = len;
    }
    len
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Node::Text(chunk) = child.value() {
            out.push_str(chunk);
            out.push(' ');
        } else if let Some(child) = ElementRef::wrap(child) {
            if !is_hidden(child) {
                collect_text(child, out);
            }
        }
    }
}

/// Collapses whitespace, breaks sentences onto their own lines and strips
/// navigation boilerplate.
pub fn clean_text(raw: &str) -> String {
    let mut text = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    for terminator in [". ", "! ", "? "] {
        let replacement = format!("{}\n", terminator.trim_end());
        text = text.replace(terminator, &replacement);
    }
    for phrase in BOILERPLATE {
        text = text.replace(phrase, "");
    }
    text.trim().to_string()
}
