//! HTTP client for the rainfall source page.
//!
//! - Blocking client using `ureq` (no async), with a request timeout.
//! - The source publishes the day's reading as free text inside an HTML
//!   page, so extraction is a deliberately naive tag-strip plus line scan
//!   for a "Rainfall ... <value> mm" figure. The page structure is not a
//!   contract; when it changes, this fails loudly as `Parse`.

use core::fmt;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;

#[derive(Debug)]
pub enum FetchError {
    Transport(String),
    Http { status: u16, message: String },
    /// Page retrieved but no rainfall figure could be extracted.
    Parse(String),
    /// A figure was extracted but is not a plausible measurement.
    OutOfRange(f64),
}

impl Display for FetchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Transport(s) => write!(f, "transport error: {}", s),
            FetchError::Http { status, message } => write!(f, "http {}: {}", status, message),
            FetchError::Parse(s) => write!(f, "parse error: {}", s),
            FetchError::OutOfRange(v) => write!(f, "rainfall value out of range: {} mm", v),
        }
    }
}

impl Error for FetchError {}

pub struct RainfallSource {
    agent: ureq::Agent,
    url: String,
}

impl RainfallSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        RainfallSource {
            agent,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetch the source page and extract today's rainfall in millimetres.
    pub fn fetch_rainfall_mm(&self) -> Result<f64, FetchError> {
        let response = self.agent.get(&self.url).set("Accept", "text/html").call();
        let body = match response {
            Ok(res) => res
                .into_string()
                .map_err(|e| FetchError::Transport(e.to_string()))?,
            Err(ureq::Error::Transport(t)) => return Err(FetchError::Transport(t.to_string())),
            Err(ureq::Error::Status(status, res)) => {
                let message = res.into_string().unwrap_or_else(|_| String::from("<no body>"));
                return Err(FetchError::Http { status, message });
            }
        };
        extract_rainfall_mm(&body)
    }
}

/// Extract a rainfall reading from raw HTML.
///
/// Scans the tag-stripped text line by line for one mentioning both
/// "rainfall" and "mm", then takes the first numeric token after the word
/// "rainfall". Values must be finite and non-negative.
pub fn extract_rainfall_mm(html: &str) -> Result<f64, FetchError> {
    let text = strip_tags(html);

    for line in text.lines() {
        let lower = line.to_lowercase();
        if !lower.contains("rainfall") || !lower.contains("mm") {
            continue;
        }

        // Take the first numeric token after the word "rainfall".
        let mut seen_rainfall = false;
        for token in line.split_whitespace() {
            if !seen_rainfall {
                seen_rainfall = token.to_lowercase().contains("rainfall");
                continue;
            }
            let cleaned = token.trim_matches(|c: char| !c.is_ascii_digit() && c != '.' && c != '-');
            if cleaned.is_empty() {
                continue;
            }
            if let Ok(value) = cleaned.parse::<f64>() {
                if !value.is_finite() || value < 0.0 {
                    return Err(FetchError::OutOfRange(value));
                }
                return Ok(value);
            }
        }
    }

    Err(FetchError::Parse(
        "no line with a rainfall figure in mm found on the source page".to_string(),
    ))
}

/// Replace tags with spaces, drop script/style blocks, keep the source's own
/// line structure so the extractor can scan line by line.
fn strip_tags(html: &str) -> String {
    let without_scripts = remove_blocks_ci(html, "<script", "</script>");
    let without_styles = remove_blocks_ci(&without_scripts, "<style", "</style>");

    let mut out = String::with_capacity(without_styles.len());
    let mut in_tag = false;
    for ch in without_styles.chars() {
        match ch {
            '<' => {
                in_tag = true;
                out.push(' ');
            }
            '>' if in_tag => in_tag = false,
            _ if in_tag => {}
            _ => out.push(ch),
        }
    }
    out
}

/// Remove every block between an opening pattern and its closing tag,
/// case-insensitive on ASCII.
fn remove_blocks_ci(s: &str, open_pat: &str, close_pat: &str) -> String {
    let lower = s.to_lowercase();
    let open_lower = open_pat.to_lowercase();
    let close_lower = close_pat.to_lowercase();

    let mut out = String::with_capacity(s.len());
    let mut pos = 0;
    while let Some(start_rel) = lower[pos..].find(&open_lower) {
        let start = pos + start_rel;
        out.push_str(&s[pos..start]);
        match lower[start..].find(&close_lower) {
            Some(end_rel) => pos = start + end_rel + close_lower.len(),
            None => return out, // unterminated block, drop the rest
        }
    }
    out.push_str(&s[pos..]);
    out
}
