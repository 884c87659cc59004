use crate::ast::*;
use crate::error::{Position, TemplateSyntaxError};
use crate::expr::parse_expression;
use crate::lexer::{Attribute, Token, Tokenizer};
use crate::normalize::{is_whitespace, normalize_fragment};
use crate::trim::TrimRule;
use std::collections::VecDeque;

type ParseResult<T> = Result<T, TemplateSyntaxError>;

/// Compile template source into a node tree.
pub fn compile(source: &str) -> ParseResult<Template> {
    let nodes = Parser::new(source).parse()?;
    Ok(Template {
        source: source.to_string(),
        nodes,
    })
}

impl Template {
    pub fn compile(source: &str) -> ParseResult<Self> {
        compile(source)
    }
}

fn is_blank(text: &str) -> bool {
    text.chars().all(is_whitespace)
}

pub struct Parser<'a> {
    lexer: Tokenizer<'a>,
    buffer: VecDeque<Token>,
}

impl<'a> Parser<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            lexer: Tokenizer::new(input),
            buffer: VecDeque::new(),
        }
    }

    fn peek(&mut self, n: usize) -> ParseResult<Option<&Token>> {
        while self.buffer.len() <= n {
            match self.lexer.next_token()? {
                Some(token) => self.buffer.push_back(token),
                None => return Ok(None),
            }
        }
        Ok(self.buffer.get(n))
    }

    fn consume(&mut self) -> ParseResult<Option<Token>> {
        match self.buffer.pop_front() {
            Some(token) => Ok(Some(token)),
            None => self.lexer.next_token(),
        }
    }

    fn error(&self, message: impl Into<String>, offset: usize) -> TemplateSyntaxError {
        TemplateSyntaxError::new(message, Position::locate(self.lexer.input(), offset))
    }

    /// Parse a whole template, bare or wrapped in `<script>`.
    pub fn parse(&mut self) -> ParseResult<Vec<Node>> {
        let mut skip = 0;
        if let Some(Token::Text { text, .. }) = self.peek(0)? {
            if is_blank(text) {
                skip = 1;
            }
        }
        let wrapped = matches!(self.peek(skip)?, Some(Token::Open { name, .. }) if name == "script");
        if !wrapped {
            return self.parse_nodes(None);
        }

        for _ in 0..skip {
            self.consume()?;
        }
        let Some(Token::Open {
            attributes,
            self_closing,
            offset,
            ..
        }) = self.consume()?
        else {
            return Err(self.error("expected `<script>`", 0));
        };
        if let Some(attr) = attributes.first() {
            return Err(self.error(
                format!("unknown attribute `{}` on `<script>`", attr.name),
                attr.offset,
            ));
        }
        let nodes = if self_closing {
            Vec::new()
        } else {
            self.parse_nodes(Some(("script", offset)))?
        };
        while let Some(token) = self.consume()? {
            match token {
                Token::Text { text, .. } if is_blank(&text) => {}
                other => {
                    return Err(self.error("content after `</script>`", other.offset()));
                }
            }
        }
        Ok(nodes)
    }

    /// Parse sibling nodes until the end tag of `parent` (or end of input
    /// when there is no parent).
    fn parse_nodes(&mut self, parent: Option<(&str, usize)>) -> ParseResult<Vec<Node>> {
        let mut nodes = Vec::new();
        loop {
            let Some(token) = self.consume()? else {
                return match parent {
                    Some((name, offset)) => Err(self.error(format!("unterminated `<{name}>`"), offset)),
                    None => Ok(nodes),
                };
            };
            match token {
                Token::Text { text, offset } | Token::CData { text, offset } => {
                    nodes.push(Node::Text(self.fragment(&text, offset)?));
                }
                Token::Close { name, offset } => {
                    return match parent {
                        Some((expected, _)) if expected == name => Ok(nodes),
                        Some((expected, _)) => Err(self.error(
                            format!("expected `</{expected}>`, found `</{name}>`"),
                            offset,
                        )),
                        None => Err(self.error(format!("unexpected `</{name}>`"), offset)),
                    };
                }
                Token::Open {
                    name,
                    attributes,
                    self_closing,
                    offset,
                } => {
                    let element = Element {
                        name,
                        attributes,
                        self_closing,
                        offset,
                    };
                    nodes.push(self.parse_element(element)?);
                }
            }
        }
    }

    fn parse_element(&mut self, element: Element) -> ParseResult<Node> {
        let node = match element.name.as_str() {
            "if" => {
                let attrs = self.attributes(&element, &["test"])?;
                let test = self.expression(attrs.require("test")?)?;
                let body = self.body(&element)?;
                Node::Conditional(Branch { test, body })
            }
            "choose" => {
                self.attributes(&element, &[])?;
                self.parse_choose(&element)?
            }
            "foreach" => self.parse_loop(&element)?,
            "bind" => {
                let attrs = self.attributes(&element, &["name", "value"])?;
                let name = attrs.require("name")?.value.clone();
                let value = self.expression(attrs.require("value")?)?;
                if self.body(&element)?.iter().any(|node| !is_blank_text(node)) {
                    return Err(self.error("`<bind>` cannot have content", element.offset));
                }
                Node::Bind { name, value }
            }
            "where" | "set" => {
                self.attributes(&element, &[])?;
                let rule = if element.name == "where" {
                    TrimRule::where_clause()
                } else {
                    TrimRule::set_clause()
                };
                Node::TrimWrapper {
                    rule,
                    body: self.body(&element)?,
                }
            }
            "trim" => {
                let attrs = self.attributes(
                    &element,
                    &["prefix", "prefixOverrides", "suffix", "suffixOverrides"],
                )?;
                let rule = TrimRule::custom(
                    attrs.value("prefix"),
                    attrs.value("prefixOverrides"),
                    attrs.value("suffix"),
                    attrs.value("suffixOverrides"),
                )
                .map_err(|empty| {
                    self.error(
                        format!("`{}` of `<trim>` lists no token", empty.attribute),
                        element.offset,
                    )
                })?;
                Node::TrimWrapper {
                    rule,
                    body: self.body(&element)?,
                }
            }
            "when" | "otherwise" => {
                return Err(self.error(
                    format!("`<{}>` outside of `<choose>`", element.name),
                    element.offset,
                ))
            }
            "script" => {
                return Err(self.error(
                    "`<script>` may only wrap the whole template",
                    element.offset,
                ))
            }
            other => {
                return Err(self.error(format!("unknown directive `<{other}>`"), element.offset))
            }
        };
        Ok(node)
    }

    fn parse_choose(&mut self, choose: &Element) -> ParseResult<Node> {
        let mut branches = Vec::new();
        let mut otherwise: Option<Vec<Node>> = None;
        if choose.self_closing {
            return Ok(Node::Choice { branches, otherwise });
        }

        loop {
            let Some(token) = self.consume()? else {
                return Err(self.error("unterminated `<choose>`", choose.offset));
            };
            match token {
                Token::Text { text, .. } | Token::CData { text, .. } if is_blank(&text) => {}
                Token::Text { offset, .. } | Token::CData { offset, .. } => {
                    return Err(self.error("text is not allowed directly inside `<choose>`", offset));
                }
                Token::Close { name, .. } if name == "choose" => break,
                Token::Close { name, offset } => {
                    return Err(self.error(
                        format!("expected `</choose>`, found `</{name}>`"),
                        offset,
                    ));
                }
                Token::Open {
                    name,
                    attributes,
                    self_closing,
                    offset,
                } => {
                    let element = Element {
                        name,
                        attributes,
                        self_closing,
                        offset,
                    };
                    match element.name.as_str() {
                        "when" => {
                            if otherwise.is_some() {
                                return Err(self.error("`<when>` after `<otherwise>`", offset));
                            }
                            let attrs = self.attributes(&element, &["test"])?;
                            let test = self.expression(attrs.require("test")?)?;
                            let body = self.body(&element)?;
                            branches.push(Branch { test, body });
                        }
                        "otherwise" => {
                            if otherwise.is_some() {
                                return Err(self.error("too many `<otherwise>` elements", offset));
                            }
                            self.attributes(&element, &[])?;
                            otherwise = Some(self.body(&element)?);
                        }
                        other => {
                            return Err(self.error(
                                format!("`<{other}>` is not allowed inside `<choose>`"),
                                offset,
                            ));
                        }
                    }
                }
            }
        }
        Ok(Node::Choice { branches, otherwise })
    }

    fn parse_loop(&mut self, element: &Element) -> ParseResult<Node> {
        let attrs = self.attributes(
            element,
            &["collection", "item", "index", "open", "close", "separator", "nullable"],
        )?;
        let collection = self.expression(attrs.require("collection")?)?;
        let nullable = match attrs.get("nullable") {
            None => None,
            Some(attr) => match attr.value.trim() {
                "true" => Some(true),
                "false" => Some(false),
                other => {
                    return Err(self.error(
                        format!("`nullable` must be `true` or `false`, found `{other}`"),
                        attr.offset,
                    ))
                }
            },
        };
        let variable = |name: &str| -> ParseResult<Option<String>> {
            match attrs.get(name) {
                None => Ok(None),
                Some(attr) if is_identifier(&attr.value) => Ok(Some(attr.value.clone())),
                Some(attr) => Err(self.error(
                    format!("`{name}` must be a variable name, found `{}`", attr.value),
                    attr.offset,
                )),
            }
        };
        let item = variable("item")?;
        let index = variable("index")?;
        let text = |name: &str| attrs.value(name).map(|v| normalize_fragment(v).into_owned());
        let open = text("open");
        let close = text("close");
        let separator = text("separator");
        let body = self.body(element)?;
        Ok(Node::Loop(Box::new(Loop {
            collection,
            item,
            index,
            open,
            close,
            separator,
            nullable,
            body,
        })))
    }

    fn body(&mut self, element: &Element) -> ParseResult<Vec<Node>> {
        if element.self_closing {
            return Ok(Vec::new());
        }
        self.parse_nodes(Some((&element.name, element.offset)))
    }

    fn attributes<'e>(&self, element: &'e Element, allowed: &[&str]) -> ParseResult<Attributes<'e>> {
        for attr in &element.attributes {
            if !allowed.contains(&attr.name.as_str()) {
                return Err(self.error(
                    format!("unknown attribute `{}` on `<{}>`", attr.name, element.name),
                    attr.offset,
                ));
            }
        }
        Ok(Attributes {
            element,
            position: Position::locate(self.lexer.input(), element.offset),
        })
    }

    fn expression(&self, attr: &Attribute) -> ParseResult<Expression> {
        self.compile_expression(&attr.value, attr.offset)
    }

    fn compile_expression(&self, source: &str, offset: usize) -> ParseResult<Expression> {
        let ast = parse_expression(source).map_err(|e| {
            self.error(
                format!(
                    "invalid expression `{source}`: {} at offset {}",
                    e.message, e.offset
                ),
                offset,
            )
        })?;
        Ok(Expression {
            source: source.trim().to_string(),
            ast,
        })
    }

    /// Normalize a text fragment and split it at `#{}` / `${}` markers.
    fn fragment(&self, raw: &str, offset: usize) -> ParseResult<Fragment> {
        let text = normalize_fragment(raw);
        let s = text.as_ref();
        let bytes = s.as_bytes();
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut lit_start = 0;
        let mut i = 0;

        while i < bytes.len() {
            let b = bytes[i];
            if b == b'\\' && (s[i + 1..].starts_with("#{") || s[i + 1..].starts_with("${")) {
                literal.push_str(&s[lit_start..i]);
                lit_start = i + 1;
                i += 3;
                continue;
            }
            if (b == b'#' || b == b'$') && s[i + 1..].starts_with('{') {
                literal.push_str(&s[lit_start..i]);
                let content_start = i + 2;
                let Some(len) = closing_brace(&s[content_start..]) else {
                    return Err(self.error(
                        format!("unterminated `{}{{`", b as char),
                        offset,
                    ));
                };
                let content = &s[content_start..content_start + len];
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(if b == b'#' {
                    Segment::Placeholder(self.placeholder(content, offset)?)
                } else {
                    Segment::Substitution(self.substitution(content, offset)?)
                });
                i = content_start + len + 1;
                lit_start = i;
                continue;
            }
            i += 1;
        }
        literal.push_str(&s[lit_start..]);
        if !literal.is_empty() || segments.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        Ok(Fragment { segments })
    }

    fn substitution(&self, content: &str, offset: usize) -> ParseResult<Expression> {
        if is_blank(content) {
            return Err(self.error("empty `${}`", offset));
        }
        self.compile_expression(content, offset)
    }

    /// `#{expr, key=value, ...}`
    fn placeholder(&self, content: &str, offset: usize) -> ParseResult<Placeholder> {
        let mut parts = split_top_level(content).into_iter();
        let expression = parts.next().unwrap_or_default();
        if is_blank(expression) {
            return Err(self.error("empty `#{}`", offset));
        }
        let expression = self.compile_expression(expression, offset)?;
        let mut options = Vec::new();
        for part in parts {
            let Some((key, value)) = part.split_once('=') else {
                return Err(self.error(
                    format!("malformed placeholder option `{}`", part.trim()),
                    offset,
                ));
            };
            let (key, value) = (key.trim(), value.trim());
            if !is_identifier(key) || value.is_empty() {
                return Err(self.error(
                    format!("malformed placeholder option `{}`", part.trim()),
                    offset,
                ));
            }
            options.push((key.to_string(), value.to_string()));
        }
        Ok(Placeholder {
            expression,
            options,
        })
    }
}

struct Element {
    name: String,
    attributes: Vec<Attribute>,
    self_closing: bool,
    offset: usize,
}

struct Attributes<'e> {
    element: &'e Element,
    position: Position,
}

impl<'e> Attributes<'e> {
    fn get(&self, name: &str) -> Option<&'e Attribute> {
        self.element.attributes.iter().find(|a| a.name == name)
    }

    fn value(&self, name: &str) -> Option<&'e str> {
        self.get(name).map(|a| a.value.as_str())
    }

    fn require(&self, name: &str) -> ParseResult<&'e Attribute> {
        self.get(name).ok_or_else(|| {
            TemplateSyntaxError::new(
                format!("`<{}>` requires attribute `{name}`", self.element.name),
                self.position,
            )
        })
    }
}

fn is_blank_text(node: &Node) -> bool {
    match node {
        Node::Text(fragment) => fragment
            .segments
            .iter()
            .all(|s| matches!(s, Segment::Literal(text) if is_blank(text))),
        _ => false,
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

/// Split on commas that are not inside quotes or brackets.
/// Offset of the `}` closing a `#{`/`${` marker, skipping quoted text and
/// nested brackets.
fn closing_brace(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (idx, c) in s.char_indices() {
        match (quote, c) {
            (Some(_), _) if escaped => escaped = false,
            (Some(_), '\\') => escaped = true,
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '(' | '[' | '{') => depth += 1,
            (None, '}') if depth == 0 => return Some(idx),
            (None, ')' | ']' | '}') => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    None
}

fn split_top_level(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (idx, c) in s.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '(' | '[' | '{') => depth += 1,
            (None, ')' | ']' | '}') => depth = depth.saturating_sub(1),
            (None, ',') if depth == 0 => {
                parts.push(&s[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}
