//! Whitespace handling for template fragments.
//!
//! Templates are indented for humans. Each literal fragment has its leading
//! and trailing whitespace runs collapsed to one space so that indentation
//! never reaches the statement, while whitespace between tokens inside the
//! fragment is left alone.

use std::borrow::Cow;

pub(crate) fn is_whitespace(c: char) -> bool {
    c.is_whitespace()
}

/// Collapse the leading and the trailing whitespace run of `text` to a
/// single space each. A fragment made only of whitespace becomes `" "`.
///
/// ```
/// use dynsql::normalize_fragment;
///
/// assert_eq!(normalize_fragment("\n    1=1 \n \n\n"), " 1=1 ");
/// assert_eq!(normalize_fragment("1=1 \n \n\n"), "1=1 ");
/// assert_eq!(normalize_fragment("\n    1\n=1 \n \n\n"), " 1\n=1 ");
/// ```
pub fn normalize_fragment(text: &str) -> Cow<'_, str> {
    let core = text.trim_matches(is_whitespace);
    if core.is_empty() {
        return if text.is_empty() {
            Cow::Borrowed("")
        } else {
            Cow::Borrowed(" ")
        };
    }

    let leading = text.starts_with(is_whitespace);
    let trailing = text.ends_with(is_whitespace);
    let already_single = (!leading || text.starts_with(' ') && !text[1..].starts_with(is_whitespace))
        && (!trailing || text.ends_with(' ') && !text[..text.len() - 1].ends_with(is_whitespace));
    if already_single {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(core.len() + 2);
    if leading {
        out.push(' ');
    }
    out.push_str(core);
    if trailing {
        out.push(' ');
    }
    Cow::Owned(out)
}

/// Collapse every whitespace run of a finished statement to one space and
/// drop the surrounding whitespace.
pub fn shrink_whitespace(sql: &str) -> String {
    sql.split(is_whitespace)
        .filter(|token| !token.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
