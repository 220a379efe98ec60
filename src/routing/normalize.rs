//! Request path normalization.

use std::borrow::Cow;

/// Lexically clean a request path.
///
/// Repeated slashes collapse, `.` segments drop and `..` removes the
/// previous segment. A trailing slash on the input is kept.
pub fn clean_path(path: &str) -> Cow<'_, str> {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }

    let mut cleaned = String::with_capacity(path.len() + 1);
    for segment in &segments {
        cleaned.push('/');
        cleaned.push_str(segment);
    }
    if cleaned.is_empty() || path.ends_with('/') {
        cleaned.push('/');
    }

    if cleaned == path {
        Cow::Borrowed(path)
    } else {
        Cow::Owned(cleaned)
    }
}

/// Strip a route prefix from a raw request path.
///
/// Segments are compared after percent-decoding, so `/caf%C3%A9/x` is
/// under the prefix `/café` and `/sv%63/x` under `/svc`. A decoded `/`
/// never joins segments. The remainder is returned still encoded and is
/// either empty or starts with `/`.
pub fn strip_route_prefix<'p>(path: &'p str, prefix: &str) -> Option<&'p str> {
    let mut rest = path;
    for expected in prefix.split('/').skip(1) {
        let tail = rest.strip_prefix('/')?;
        let end = tail.find('/').unwrap_or(tail.len());
        if !segment_matches(&tail[..end], expected) {
            return None;
        }
        rest = &tail[end..];
    }
    Some(rest)
}

fn segment_matches(raw: &str, expected: &str) -> bool {
    if raw == expected {
        return true;
    }
    raw.contains('%')
        && urlencoding::decode(raw).is_ok_and(|decoded| decoded == expected)
}

/// Append the query string, if any, to a path.
pub fn with_query(path: &str, query: Option<&str>) -> String {
    match query {
        Some(q) if !q.is_empty() => format!("{path}?{q}"),
        _ => path.to_string(),
    }
}
