//! Literal formatting shared by the generators.

use crate::drawing::Point;

/// Name used when a layer name sanitizes to nothing.
pub const DEFAULT_LAYER_NAME: &str = "DEFAULT_LAYER";
/// AutoCAD's layer name limit, in characters.
pub const MAX_LAYER_NAME_LEN: usize = 255;

const INVALID_LAYER_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Render a real so AutoLISP never reads it as an integer (`100` -> `100.0`).
pub fn lisp_real(value: f64) -> String {
    let text = value.to_string();
    if value.is_finite() && !text.contains('.') {
        format!("{text}.0")
    } else {
        text
    }
}

/// `(x y z)`; 2D points carry `z = 0`.
pub fn lisp_point(point: &Point) -> String {
    format!(
        "({} {} {})",
        lisp_real(point.x),
        lisp_real(point.y),
        lisp_real(point.z)
    )
}

/// `'(x y z)`, a point literal usable as a standalone argument.
pub fn lisp_quoted_point(point: &Point) -> String {
    format!("'{}", lisp_point(point))
}

/// `'((x y z) (x y z) ...)`
pub fn lisp_point_list(points: &[Point]) -> String {
    let inner: Vec<String> = points.iter().map(lisp_point).collect();
    format!("'({})", inner.join(" "))
}

/// Quote a string for AutoLISP: backslashes are doubled first, then quotes
/// are escaped, so the literal is always balanced.
pub fn lisp_string(text: &str) -> String {
    let escaped = text.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

/// Reverse `lisp_string`. Returns `None` for text that is not a literal
/// produced by it.
pub fn unescape_lisp_string(literal: &str) -> Option<String> {
    let inner = literal.strip_prefix('"')?.strip_suffix('"')?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next()? {
                '\\' => out.push('\\'),
                '"' => out.push('"'),
                _ => return None,
            },
            '"' => return None,
            other => out.push(other),
        }
    }
    Some(out)
}

/// Make a name acceptable to AutoCAD's layer table.
///
/// Invalid characters become `_`, a leading digit gets a `_` prefix and the
/// result is cut to 255 characters. Idempotent.
pub fn sanitize_layer_name(name: &str) -> String {
    let mut sanitized: String = name
        .chars()
        .map(|c| if INVALID_LAYER_CHARS.contains(&c) { '_' } else { c })
        .collect();

    if sanitized.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        sanitized.insert(0, '_');
    }

    if sanitized.is_empty() {
        return DEFAULT_LAYER_NAME.to_string();
    }
    sanitized.chars().take(MAX_LAYER_NAME_LEN).collect()
}
