//! Input sanitization middleware.
//!
//! Every string field in a JSON body or query string is scrubbed (null
//! bytes stripped, HTML/script markup removed, whitespace trimmed) and then
//! matched against a table of SQL/NoSQL-injection patterns; any match
//! rejects the whole request before a handler runs.
//!
//! The pattern table is a defense-in-depth heuristic layered on top of the
//! parameterized queries in the credential store, never the protection
//! itself. It knowingly produces false positives on legitimate text that
//! happens to contain a keyword like "select".

use crate::errors::AuthError;
use axum::{
    body::Body,
    http::{
        header::{CONTENT_LENGTH, CONTENT_TYPE},
        uri::{PathAndQuery, Uri},
        HeaderValue, Request,
    },
    middleware::Next,
    response::Response,
};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use tracing::warn;

/// Bodies past this size are rejected before parsing.
const MAX_BODY_BYTES: usize = 1024 * 1024;

lazy_static! {
    static ref SCRIPT_BLOCK: Regex =
        Regex::new(r"(?is)<script[^>]*>.*?</script>").unwrap();
    static ref HTML_TAG: Regex = Regex::new(r"(?s)<[^>]*>").unwrap();
    static ref JS_SCHEME: Regex = Regex::new(r"(?i)javascript\s*:").unwrap();
    static ref SQL_KEYWORD: Regex = Regex::new(
        r"(?i)\b(select|insert|update|delete|drop|truncate|union|create|alter|exec|execute)\b"
    )
    .unwrap();
}

/// MongoDB-style operators that have no business inside user text.
const NOSQL_OPERATORS: &[&str] = &[
    "$where", "$regex", "$ne", "$gt", "$lt", "$gte", "$lte", "$in", "$nin", "$or", "$and",
    "$not", "$exists",
];

const SQL_META: &[&str] = &["--", ";", "/*", "*/"];

/// Strip null bytes and markup, then trim.
pub fn sanitize_text(input: &str) -> String {
    let no_nulls = input.replace('\0', "");
    let no_scripts = SCRIPT_BLOCK.replace_all(&no_nulls, "");
    let no_tags = HTML_TAG.replace_all(&no_scripts, "");
    let no_js = JS_SCHEME.replace_all(&no_tags, "");
    no_js.trim().to_string()
}

/// Heuristic injection check, run on already-sanitized text.
pub fn is_suspicious(input: &str) -> bool {
    if SQL_KEYWORD.is_match(input) {
        return true;
    }
    if SQL_META.iter().any(|m| input.contains(m)) {
        return true;
    }
    let lower = input.to_lowercase();
    NOSQL_OPERATORS.iter().any(|op| lower.contains(op))
}

/// Recursively sanitize every string in a JSON value, failing the whole
/// document on the first injection-pattern match. Object keys are checked
/// too ($where and friends arrive as keys, not values).
pub fn scrub_value(value: &mut Value) -> Result<(), AuthError> {
    match value {
        Value::String(s) => {
            let cleaned = sanitize_text(s);
            if is_suspicious(&cleaned) {
                return Err(AuthError::SuspiciousInput);
            }
            *s = cleaned;
        }
        Value::Array(items) => {
            for item in items {
                scrub_value(item)?;
            }
        }
        Value::Object(map) => {
            for (key, item) in map.iter_mut() {
                if is_suspicious(key) {
                    return Err(AuthError::SuspiciousInput);
                }
                scrub_value(item)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Sanitization middleware: scrubs the query string and any JSON body,
/// passing the cleaned request on. Runs after the limiters (so floods are
/// rejected before this parsing cost) and before every handler.
pub async fn sanitize_request(
    request: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let (mut parts, body) = request.into_parts();

    if let Some(query) = parts.uri.query() {
        let sanitized = sanitize_query(query)?;
        if sanitized != query {
            parts.uri = rewrite_query(&parts.uri, &sanitized)?;
        }
    }

    let bytes = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|_| AuthError::Validation("Request body too large".to_string()))?;

    let is_json = parts
        .headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("application/json"))
        .unwrap_or(false);

    let request = if is_json && !bytes.is_empty() {
        let mut value: Value = serde_json::from_slice(&bytes)
            .map_err(|_| AuthError::Validation("Malformed JSON body".to_string()))?;

        scrub_value(&mut value).map_err(|e| {
            warn!(path = %parts.uri.path(), "Rejected suspicious request body");
            e
        })?;

        let cleaned = serde_json::to_vec(&value)
            .map_err(|_| AuthError::Validation("Malformed JSON body".to_string()))?;
        parts
            .headers
            .insert(CONTENT_LENGTH, HeaderValue::from(cleaned.len() as u64));

        Request::from_parts(parts, Body::from(cleaned))
    } else {
        Request::from_parts(parts, Body::from(bytes))
    };

    Ok(next.run(request).await)
}

/// Decode, scrub, and re-encode the query string.
fn sanitize_query(query: &str) -> Result<String, AuthError> {
    let mut pairs = Vec::new();

    for (key, val) in form_urlencoded::parse(query.as_bytes()) {
        if is_suspicious(&key) {
            warn!("Rejected suspicious query key");
            return Err(AuthError::SuspiciousInput);
        }
        let cleaned = sanitize_text(&val);
        if is_suspicious(&cleaned) {
            warn!("Rejected suspicious query value");
            return Err(AuthError::SuspiciousInput);
        }
        pairs.push((key.into_owned(), cleaned));
    }

    Ok(form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish())
}

fn rewrite_query(uri: &Uri, new_query: &str) -> Result<Uri, AuthError> {
    let path = uri.path();
    let pq = if new_query.is_empty() {
        path.to_string()
    } else {
        format!("{path}?{new_query}")
    };

    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(
        PathAndQuery::try_from(pq.as_str()).map_err(|_| AuthError::Internal)?,
    );
    Uri::from_parts(parts).map_err(|_| AuthError::Internal)
}
