//! URL template construction for grain methods.
//!
//! A template is built from up to three layers, outermost first: the gateway
//! prefix, the interface-level prefix and the method's own pattern.
//!
//! | declared pattern      | template                                              |
//! |-----------------------|-------------------------------------------------------|
//! | *(empty)*             | `prefix + iface_prefix + Interface/{id}/Method`       |
//! | `{id}/Get2`           | `prefix + iface_prefix + {id}/Get2`                   |
//! | `/abs/{id}/x`         | `/abs/{id}/x` (verbatim)                              |
//!
//! Templates are compared byte-for-byte. Nothing here collapses `//`.

use percent_encoding::percent_decode_str;

/// Builds the URL template for one method route.
///
/// Returns `None` when an explicitly declared pattern lacks the `{id_token}`
/// placeholder. Callers log and skip such routes instead of failing startup.
pub fn build(
    prefix: &str,
    interface_prefix: &str,
    interface_name: &str,
    method_name: &str,
    declared: &str,
    id_token: &str,
) -> Option<String> {
    let declared = declared.trim();

    if declared.is_empty() {
        return Some(format!(
            "{prefix}{interface_prefix}{interface_name}/{{{id_token}}}/{method_name}"
        ));
    }

    if !placeholders(declared).contains(&id_token) {
        return None;
    }

    if declared.starts_with('/') {
        Some(declared.to_owned())
    } else {
        Some(format!("{prefix}{interface_prefix}{declared}"))
    }
}

/// Returns the names of every `{name}` placeholder in `template`, in order.
pub(crate) fn placeholders(template: &str) -> Vec<&str> {
    let mut names = Vec::new();
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}') else { break };
        names.push(&rest[open + 1..open + close]);
        rest = &rest[open + close + 1..];
    }
    names
}

/// Extracts placeholder values from `path` segment by segment.
///
/// The router matches case-insensitively on a lowercased copy of the path,
/// so captured values are re-read here from the original path to keep their
/// case. A placeholder may sit inside a segment (`v{id}.json`): the static
/// text around it is stripped. Values are percent-decoded; `None` when a
/// value does not decode to UTF-8.
pub(crate) fn capture(template: &str, path: &str) -> Option<Vec<(String, String)>> {
    let template_segments = template.trim_start_matches('/').split('/');
    let path_segments = path.trim_start_matches('/').split('/');

    let mut values = Vec::new();
    for (pattern, segment) in template_segments.zip(path_segments) {
        let Some(open) = pattern.find('{') else { continue };
        let Some(close) = pattern.find('}') else { continue };
        let (head, tail) = (&pattern[..open], &pattern[close + 1..]);
        if segment.len() < head.len() + tail.len() {
            continue;
        }
        let raw = &segment[head.len()..segment.len() - tail.len()];
        let value = percent_decode_str(raw).decode_utf8().ok()?.into_owned();
        values.push((pattern[open + 1..close].to_owned(), value));
    }
    Some(values)
}
