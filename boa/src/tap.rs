//! TAP synchronous query parameters and response decoding.
//!
//! Queries are sent as `GET <tap>/sync` with the standard TAP parameters and
//! `FORMAT=csv`. A successful response is a CSV document whose header row
//! names the columns. Failures are reported either through the HTTP status or
//! as a VOTable error document carrying `QUERY_STATUS=ERROR`.

use std::borrow::Cow;
use std::sync::OnceLock;

use regex::Regex;

use crate::table::{ResultTable, Value};

/// Row limit applied when the caller does not give one.
pub const DEFAULT_MAX_ROWS: u32 = 5000;

/// Request parameters for a synchronous ADQL query.
pub(crate) fn sync_params(adql: &str, max_rows: u32) -> Vec<(&'static str, String)> {
    vec![
        ("LANG", "ADQL".to_string()),
        ("REQUEST", "doQuery".to_string()),
        ("MAXREC", max_rows.to_string()),
        ("FORMAT", "csv".to_string()),
        ("QUERY", adql.to_string()),
    ]
}

/// Decode a CSV result body into a table.
pub(crate) fn parse_csv(body: &[u8]) -> Result<ResultTable, csv::Error> {
    let width = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(body)
        .headers()?
        .len();

    // A one-column result writes a NULL cell as an empty line, which the
    // csv reader would skip.
    let body = if width == 1 {
        Cow::Owned(quote_empty_lines(body))
    } else {
        Cow::Borrowed(body)
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(body.as_ref());

    let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(Value::infer).collect());
    }

    Ok(ResultTable::new(columns, rows))
}

/// Give every empty line after the header an explicit empty field (`""`).
///
/// Line breaks inside quoted fields are left alone.
fn quote_empty_lines(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + 16);
    let mut in_quotes = false;
    let mut line_start = true;
    let mut line_has_content = false;
    let mut header_seen = false;

    for (i, &b) in body.iter().enumerate() {
        let empty_line = b == b'\n' || (b == b'\r' && body.get(i + 1) == Some(&b'\n'));
        if line_start && header_seen && !in_quotes && empty_line {
            out.extend_from_slice(b"\"\"");
        }
        out.push(b);

        if b == b'"' {
            in_quotes = !in_quotes;
        }
        if b == b'\n' && !in_quotes {
            header_seen |= line_has_content;
            line_start = true;
            line_has_content = false;
        } else {
            line_start = false;
            line_has_content |= b != b'\r';
        }
    }
    out
}

/// Extract the message of a TAP error document, if `body` is one.
pub(crate) fn error_message(body: &str) -> Option<String> {
    static STATUS: OnceLock<Regex> = OnceLock::new();
    static INFO: OnceLock<Regex> = OnceLock::new();

    let status = STATUS.get_or_init(|| {
        Regex::new(r#"(?is)<INFO\b[^>]*name\s*=\s*"QUERY_STATUS"[^>]*value\s*=\s*"ERROR"[^>]*?(?:/>|>(.*?)</INFO>)"#)
            .expect("valid regex")
    });
    if let Some(caps) = status.captures(body) {
        let message = caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
        if !message.is_empty() {
            return Some(unescape(message));
        }
        // Some services put the text in a sibling INFO or DESCRIPTION element.
        let info = INFO.get_or_init(|| {
            Regex::new(r"(?is)<(?:INFO|DESCRIPTION)\b[^>]*>([^<]*)</(?:INFO|DESCRIPTION)>")
                .expect("valid regex")
        });
        let fallback = info
            .captures_iter(body)
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str().trim())
            .find(|s| !s.is_empty())
            .unwrap_or("query failed");
        return Some(unescape(fallback));
    }
    None
}

/// Best human-readable message for a rejected query.
pub(crate) fn rejection_message(body: &str) -> String {
    error_message(body).unwrap_or_else(|| {
        let trimmed = body.trim();
        if trimmed.is_empty() {
            "no message from server".to_string()
        } else {
            trimmed.to_string()
        }
    })
}

/// Decode XML entities, named and numeric, in a single pass.
fn unescape(s: &str) -> String {
    static ENTITY: OnceLock<Regex> = OnceLock::new();
    let re = ENTITY.get_or_init(|| {
        Regex::new(r"&(#[xX][0-9a-fA-F]+|#[0-9]+|lt|gt|quot|apos|amp);").expect("valid regex")
    });

    re.replace_all(s, |caps: &regex::Captures| {
        let entity = &caps[1];
        let decoded = match entity {
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            "amp" => Some('&'),
            _ => {
                let code = match entity.strip_prefix("#x").or_else(|| entity.strip_prefix("#X")) {
                    Some(hex) => u32::from_str_radix(hex, 16).ok(),
                    None => entity[1..].parse::<u32>().ok(),
                };
                code.and_then(char::from_u32)
            }
        };
        match decoded {
            Some(c) => c.to_string(),
            None => caps[0].to_string(),
        }
    })
    .into_owned()
}
