//! `%{a.b.c}` interpolation of path templates.

use strata_ir::Value;

/// Replace every `%{path}` in `template` with the value found by walking
/// `scope` along the dotted path.
///
/// A leading `::` on the path is ignored. Any missing segment, and any
/// unterminated reference, interpolates to the empty string.
pub fn interpolate(template: &str, scope: &Value) -> String {
    expand(template, scope, |_| true)
}

/// [`interpolate`] for file paths.
///
/// A substituted value that is `..`, or that contains a path separator or a
/// NUL byte, could move the path out of its directory; it interpolates to
/// the empty string instead.
pub fn interpolate_path(template: &str, scope: &Value) -> String {
    expand(template, scope, |value| {
        let safe = value != ".." && !value.contains(['/', '\\', '\0']);
        if !safe {
            tracing::warn!(template, value, "refusing path segment from interpolation");
        }
        safe
    })
}

fn expand(template: &str, scope: &Value, accept: impl Fn(&str) -> bool) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("%{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            rest = "";
            break;
        };
        let value = lookup_path(after[..end].trim(), scope);
        if accept(&value) {
            out.push_str(&value);
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    out
}

fn lookup_path(path: &str, scope: &Value) -> String {
    let path = path.trim_start_matches("::");
    if path.is_empty() {
        return String::new();
    }
    let mut current = scope;
    for segment in path.split('.') {
        let next = match current {
            Value::Hash(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
        match next {
            Some(value) => current = value,
            None => return String::new(),
        }
    }
    current.to_string()
}
