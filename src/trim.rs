//! Clause trimming for `<where>`, `<set>` and `<trim>`.
//!
//! A wrapper renders its body into a private buffer, then:
//! - drops surrounding whitespace; an empty body produces nothing at all;
//! - strips one matching prefix override token (longest match wins),
//!   compared case-insensitively against the start of the trimmed body;
//! - strips one matching suffix override token from the end;
//! - prepends `prefix + " "` and appends `" " + suffix` when configured,
//!   unless stripping left nothing but whitespace.
//!
//! An override token is matched including any whitespace written in it
//! (`"AND "` does not match `"ANDROID"`), but only the token's
//! non-whitespace part is removed.

fn is_trim_space(c: char) -> bool {
    c <= ' '
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrimKind {
    Where,
    Set,
    Custom,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrimRule {
    pub kind: TrimKind,
    pub prefix: Option<String>,
    pub prefix_overrides: Vec<String>,
    pub suffix: Option<String>,
    pub suffix_overrides: Vec<String>,
}

/// A `<trim>` override list that yields no token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmptyOverrides {
    pub attribute: &'static str,
}

const WHERE_CONNECTORS: &[&str] = &[
    "AND ", "OR ", "AND\n", "OR\n", "AND\r", "OR\r", "AND\t", "OR\t",
];

impl TrimRule {
    pub fn where_clause() -> Self {
        Self {
            kind: TrimKind::Where,
            prefix: Some("WHERE".to_string()),
            prefix_overrides: WHERE_CONNECTORS.iter().map(|s| s.to_string()).collect(),
            suffix: None,
            suffix_overrides: Vec::new(),
        }
    }

    pub fn set_clause() -> Self {
        Self {
            kind: TrimKind::Set,
            prefix: Some("SET".to_string()),
            prefix_overrides: vec![",".to_string()],
            suffix: None,
            suffix_overrides: vec![",".to_string()],
        }
    }

    /// Build a `<trim>` rule. Overrides are `|`-separated token lists; a
    /// list given but holding no token is rejected.
    pub fn custom(
        prefix: Option<&str>,
        prefix_overrides: Option<&str>,
        suffix: Option<&str>,
        suffix_overrides: Option<&str>,
    ) -> Result<Self, EmptyOverrides> {
        Ok(Self {
            kind: TrimKind::Custom,
            prefix: prefix.map(str::to_string),
            prefix_overrides: parse_overrides(prefix_overrides, "prefixOverrides")?,
            suffix: suffix.map(str::to_string),
            suffix_overrides: parse_overrides(suffix_overrides, "suffixOverrides")?,
        })
    }

    /// Apply the rule to a rendered body.
    pub fn apply(&self, body: &str) -> String {
        let trimmed = body.trim_matches(is_trim_space);
        if trimmed.is_empty() {
            return String::new();
        }

        let mut start = 0;
        let mut end = trimmed.len();
        if let Some(token) = longest_match(&self.prefix_overrides, |t| starts_with_ignore_case(trimmed, t)) {
            start = token.trim_matches(is_trim_space).len();
        }
        if let Some(token) = longest_match(&self.suffix_overrides, |t| ends_with_ignore_case(trimmed, t)) {
            end = end.saturating_sub(token.trim_matches(is_trim_space).len()).max(start);
        }
        let core = &trimmed[start..end];
        if core.trim_matches(is_trim_space).is_empty() {
            return String::new();
        }

        let mut out = String::with_capacity(core.len() + 16);
        if let Some(prefix) = &self.prefix {
            out.push_str(prefix);
            out.push(' ');
        }
        out.push_str(core);
        if let Some(suffix) = &self.suffix {
            out.push(' ');
            out.push_str(suffix);
        }
        out
    }
}

fn parse_overrides(list: Option<&str>, attribute: &'static str) -> Result<Vec<String>, EmptyOverrides> {
    let Some(list) = list else {
        return Ok(Vec::new());
    };
    let tokens: Vec<String> = list
        .split('|')
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect();
    if tokens.is_empty() {
        return Err(EmptyOverrides { attribute });
    }
    Ok(tokens)
}

fn longest_match<'t>(tokens: &'t [String], matches: impl Fn(&str) -> bool) -> Option<&'t str> {
    tokens
        .iter()
        .map(String::as_str)
        .filter(|token| matches(*token))
        .max_by_key(|token| token.len())
}

fn starts_with_ignore_case(s: &str, token: &str) -> bool {
    match s.get(..token.len()) {
        Some(head) => head.to_lowercase() == token.to_lowercase(),
        None => false,
    }
}

fn ends_with_ignore_case(s: &str, token: &str) -> bool {
    match s.len().checked_sub(token.len()).and_then(|at| s.get(at..)) {
        Some(tail) => tail.to_lowercase() == token.to_lowercase(),
        None => false,
    }
}
