//! Markup tokenizer for mapper scripts.
//!
//! Recognized markup: start/end/self-closing tags with quoted attributes,
//! `<!-- comments -->`, `<? processing instructions ?>` and
//! `<![CDATA[ ... ]]>`. A `<` that is not followed by a letter, `/`, `!` or
//! `?` is plain SQL text (`a < b`, `<>`, `<=`).
//!
//! Comments and processing instructions are dropped and the text on both
//! sides comes out as one token, so a comment never splits a fragment.

use crate::error::{Position, TemplateSyntaxError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: String,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Text {
        text: String,
        offset: usize,
    },
    CData {
        text: String,
        offset: usize,
    },
    Open {
        name: String,
        attributes: Vec<Attribute>,
        self_closing: bool,
        offset: usize,
    },
    Close {
        name: String,
        offset: usize,
    },
}

impl Token {
    pub fn offset(&self) -> usize {
        match self {
            Token::Text { offset, .. }
            | Token::CData { offset, .. }
            | Token::Open { offset, .. }
            | Token::Close { offset, .. } => *offset,
        }
    }
}

#[derive(Clone)]
pub struct Tokenizer<'a> {
    input: &'a str,
    cursor: usize,
}

impl<'a> Tokenizer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self { input, cursor: 0 }
    }

    pub fn input(&self) -> &'a str {
        self.input
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.cursor..]
    }

    fn advance(&mut self, n: usize) {
        self.cursor += n;
    }

    fn error(&self, message: impl Into<String>, offset: usize) -> TemplateSyntaxError {
        TemplateSyntaxError::new(message, Position::locate(self.input, offset))
    }

    fn skip_until(&mut self, terminator: &str, what: &str) -> Result<(), TemplateSyntaxError> {
        let start = self.cursor;
        match self.remaining().find(terminator) {
            Some(idx) => {
                self.advance(idx + terminator.len());
                Ok(())
            }
            None => Err(self.error(format!("unterminated {what}"), start)),
        }
    }

    pub fn next_token(&mut self) -> Result<Option<Token>, TemplateSyntaxError> {
        let offset = self.cursor;
        let mut text = String::new();

        loop {
            let rest = self.remaining();
            let Some(c) = rest.chars().next() else {
                break;
            };
            if rest.starts_with("<!--") {
                self.skip_until("-->", "comment")?;
                continue;
            }
            if rest.starts_with("<?") {
                self.skip_until("?>", "processing instruction")?;
                continue;
            }
            if c == '<' && starts_markup(&rest[1..]) {
                break;
            }
            if c == '&' {
                if let Some((decoded, len)) = decode_entity(rest) {
                    text.push(decoded);
                    self.advance(len);
                    continue;
                }
            }
            text.push(c);
            self.advance(c.len_utf8());
        }

        if !text.is_empty() {
            return Ok(Some(Token::Text { text, offset }));
        }
        if self.remaining().is_empty() {
            return Ok(None);
        }
        self.markup().map(Some)
    }

    fn markup(&mut self) -> Result<Token, TemplateSyntaxError> {
        let offset = self.cursor;
        let rest = self.remaining();

        if let Some(body) = rest.strip_prefix("<![CDATA[") {
            let Some(end) = body.find("]]>") else {
                return Err(self.error("unterminated CDATA section", offset));
            };
            let text = body[..end].to_string();
            self.advance("<![CDATA[".len() + end + "]]>".len());
            return Ok(Token::CData { text, offset });
        }
        if rest.starts_with("<!") {
            return Err(self.error("unsupported markup declaration", offset));
        }

        if rest.starts_with("</") {
            self.advance(2);
            let name = self.name();
            if name.is_empty() {
                return Err(self.error("expected tag name after `</`", offset));
            }
            self.skip_spaces();
            if !self.remaining().starts_with('>') {
                return Err(self.error(format!("unterminated end tag `</{name}`"), offset));
            }
            self.advance(1);
            return Ok(Token::Close { name, offset });
        }

        self.advance(1);
        let name = self.name();
        let mut attributes: Vec<Attribute> = Vec::new();
        loop {
            let had_space = self.skip_spaces();
            let rest = self.remaining();
            if rest.starts_with("/>") {
                self.advance(2);
                return Ok(Token::Open {
                    name,
                    attributes,
                    self_closing: true,
                    offset,
                });
            }
            if rest.starts_with('>') {
                self.advance(1);
                return Ok(Token::Open {
                    name,
                    attributes,
                    self_closing: false,
                    offset,
                });
            }
            if rest.is_empty() {
                return Err(self.error(format!("unterminated tag `<{name}`"), offset));
            }
            if !had_space {
                return Err(self.error(format!("malformed tag `<{name}`"), self.cursor));
            }
            let attribute = self.attribute()?;
            if attributes.iter().any(|a| a.name == attribute.name) {
                return Err(self.error(
                    format!("duplicate attribute `{}`", attribute.name),
                    attribute.offset,
                ));
            }
            attributes.push(attribute);
        }
    }

    fn attribute(&mut self) -> Result<Attribute, TemplateSyntaxError> {
        let offset = self.cursor;
        let name = self.name();
        if name.is_empty() {
            return Err(self.error("expected attribute name", offset));
        }
        self.skip_spaces();
        if !self.remaining().starts_with('=') {
            return Err(self.error(format!("expected `=` after attribute `{name}`"), self.cursor));
        }
        self.advance(1);
        self.skip_spaces();

        let rest = self.remaining();
        let quote = match rest.chars().next() {
            Some(q @ ('"' | '\'')) => q,
            _ => {
                return Err(self.error(
                    format!("value of attribute `{name}` must be quoted"),
                    self.cursor,
                ))
            }
        };
        let Some(end) = rest[1..].find(quote) else {
            return Err(self.error(format!("unterminated value of attribute `{name}`"), offset));
        };
        let value = decode_entities(&rest[1..1 + end]);
        self.advance(end + 2);
        Ok(Attribute {
            name,
            value,
            offset,
        })
    }

    fn name(&mut self) -> String {
        let rest = self.remaining();
        let len = rest
            .char_indices()
            .find(|(_, c)| !(c.is_alphanumeric() || matches!(c, '_' | '-' | ':' | '.')))
            .map_or(rest.len(), |(idx, _)| idx);
        self.advance(len);
        rest[..len].to_string()
    }

    fn skip_spaces(&mut self) -> bool {
        let rest = self.remaining();
        let trimmed = rest.trim_start();
        self.advance(rest.len() - trimmed.len());
        rest.len() != trimmed.len()
    }
}

fn starts_markup(after_lt: &str) -> bool {
    after_lt
        .chars()
        .next()
        .is_some_and(|c| c.is_alphabetic() || matches!(c, '/' | '!' | '?'))
}

/// Decode one entity at the start of `s`, returning the character and the
/// number of bytes consumed.
fn decode_entity(s: &str) -> Option<(char, usize)> {
    let end = s.find(';')?;
    if end > 12 {
        return None;
    }
    let name = &s[1..end];
    let decoded = match name {
        "lt" => '<',
        "gt" => '>',
        "amp" => '&',
        "quot" => '"',
        "apos" => '\'',
        _ => {
            let code = if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok()?
            } else {
                name.strip_prefix('#')?.parse::<u32>().ok()?
            };
            char::from_u32(code)?
        }
    };
    Some((decoded, end + 1))
}

fn decode_entities(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        match decode_entity(rest) {
            Some((c, len)) => {
                out.push(c);
                rest = &rest[len..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
