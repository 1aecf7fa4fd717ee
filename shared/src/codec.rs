//! Text form of [`Envelope`]s.
//!
//! The grammar is deliberately small: an `@tag(headers)` prefix naming the
//! envelope kind, followed by an optional structural body. It only needs to
//! round-trip every envelope the engine can emit.

use thiserror::Error;

use crate::envelope::{Envelope, HostAddressed, LaneAddressed, LinkAddressed};
use crate::value::{Item, Value};

/// Errors that can occur while parsing envelope text
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Input ended before the envelope was complete
    #[error("unexpected end of envelope text")]
    UnexpectedEnd,

    /// A character that no production accepts
    #[error("unexpected character {found:?} at offset {pos}")]
    UnexpectedChar { pos: usize, found: char },

    /// The leading attribute names no envelope kind
    #[error("unknown envelope tag {tag:?}")]
    UnknownTag { tag: String },

    /// A lane-addressed envelope is missing a required header
    #[error("envelope missing required {header:?} header")]
    MissingHeader { header: &'static str },

    /// A prio/rate header that does not parse as a number
    #[error("malformed numeric header at offset {pos}")]
    BadNumber { pos: usize },
}

// Writing

fn write_text(out: &mut String, text: &str) {
    out.push('"');
    for ch in text.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            _ => out.push(ch),
        }
    }
    out.push('"');
}

fn write_items(out: &mut String, items: &[Item]) {
    let mut first = true;
    for item in items {
        if !first {
            out.push(',');
        }
        first = false;
        match item {
            Item::Attr(tag, body) => {
                out.push('@');
                out.push_str(tag);
                match body {
                    Value::Extant | Value::Absent => {}
                    Value::Record(inner) => {
                        out.push('(');
                        write_items(out, inner);
                        out.push(')');
                    }
                    other => {
                        out.push('(');
                        write_value_into(out, other);
                        out.push(')');
                    }
                }
            }
            Item::Slot(key, value) => {
                write_value_into(out, key);
                out.push(':');
                write_value_into(out, value);
            }
            Item::Item(value) => write_value_into(out, value),
        }
    }
}

fn write_value_into(out: &mut String, value: &Value) {
    match value {
        Value::Absent => {}
        Value::Extant => out.push_str("()"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Int(n) => out.push_str(&n.to_string()),
        Value::Text(text) => write_text(out, text),
        Value::Record(items) => {
            out.push('{');
            write_items(out, items);
            out.push('}');
        }
    }
}

pub fn write_value(value: &Value) -> String {
    let mut out = String::new();
    write_value_into(&mut out, value);
    out
}

fn write_lane_header(out: &mut String, tag: &str, node_uri: &str, lane_uri: &str) {
    out.push('@');
    out.push_str(tag);
    out.push_str("(node:");
    write_text(out, node_uri);
    out.push_str(",lane:");
    write_text(out, lane_uri);
    out.push(')');
}

fn write_link_header(out: &mut String, tag: &str, inner: &LinkAddressed) {
    out.push('@');
    out.push_str(tag);
    out.push_str("(node:");
    write_text(out, &inner.node_uri);
    out.push_str(",lane:");
    write_text(out, &inner.lane_uri);
    if inner.prio != 0.0 {
        out.push_str(",prio:");
        out.push_str(&inner.prio.to_string());
    }
    if inner.rate != 0.0 {
        out.push_str(",rate:");
        out.push_str(&inner.rate.to_string());
    }
    out.push(')');
}

impl Envelope {
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let body = match self {
            Envelope::Event(inner) => {
                write_lane_header(&mut out, "event", &inner.node_uri, &inner.lane_uri);
                &inner.body
            }
            Envelope::Command(inner) => {
                write_lane_header(&mut out, "command", &inner.node_uri, &inner.lane_uri);
                &inner.body
            }
            Envelope::Unlink(inner) => {
                write_lane_header(&mut out, "unlink", &inner.node_uri, &inner.lane_uri);
                &inner.body
            }
            Envelope::Unlinked(inner) => {
                write_lane_header(&mut out, "unlinked", &inner.node_uri, &inner.lane_uri);
                &inner.body
            }
            Envelope::Link(inner) => {
                write_link_header(&mut out, "link", inner);
                &inner.body
            }
            Envelope::Linked(inner) => {
                write_link_header(&mut out, "linked", inner);
                &inner.body
            }
            Envelope::Sync(inner) => {
                write_link_header(&mut out, "sync", inner);
                &inner.body
            }
            Envelope::Synced(inner) => {
                write_link_header(&mut out, "synced", inner);
                &inner.body
            }
            Envelope::Auth(inner) => {
                out.push_str("@auth");
                &inner.body
            }
            Envelope::Authed(inner) => {
                out.push_str("@authed");
                &inner.body
            }
            Envelope::Deauth(inner) => {
                out.push_str("@deauth");
                &inner.body
            }
            Envelope::Deauthed(inner) => {
                out.push_str("@deauthed");
                &inner.body
            }
        };
        if body.is_defined() {
            write_value_into(&mut out, body);
        }
        out
    }

    pub fn parse(text: &str) -> Result<Envelope, CodecError> {
        Parser::new(text).envelope()
    }
}

// Parsing

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

struct Headers {
    node_uri: Option<String>,
    lane_uri: Option<String>,
    prio: f32,
    rate: f32,
}

impl Parser {
    fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Result<char, CodecError> {
        let ch = self.peek().ok_or(CodecError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(ch)
    }

    fn expect(&mut self, expected: char) -> Result<(), CodecError> {
        let ch = self.bump()?;
        if ch != expected {
            return Err(CodecError::UnexpectedChar {
                pos: self.pos - 1,
                found: ch,
            });
        }
        Ok(())
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(ch) if ch.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            return true;
        }
        false
    }

    fn ident(&mut self) -> Result<String, CodecError> {
        let mut out = String::new();
        while matches!(self.peek(), Some(ch) if ch.is_ascii_alphanumeric() || ch == '_' || ch == '-')
        {
            out.push(self.bump()?);
        }
        if out.is_empty() {
            return match self.peek() {
                Some(found) => Err(CodecError::UnexpectedChar {
                    pos: self.pos,
                    found,
                }),
                None => Err(CodecError::UnexpectedEnd),
            };
        }
        Ok(out)
    }

    fn string(&mut self) -> Result<String, CodecError> {
        self.expect('"')?;
        let mut out = String::new();
        loop {
            match self.bump()? {
                '"' => return Ok(out),
                '\\' => match self.bump()? {
                    'n' => out.push('\n'),
                    other => out.push(other),
                },
                ch => out.push(ch),
            }
        }
    }

    fn number(&mut self) -> Result<i64, CodecError> {
        let start = self.pos;
        let mut out = String::new();
        if self.peek() == Some('-') {
            out.push(self.bump()?);
        }
        while matches!(self.peek(), Some(ch) if ch.is_ascii_digit()) {
            out.push(self.bump()?);
        }
        out.parse()
            .map_err(|_| CodecError::BadNumber { pos: start })
    }

    fn float(&mut self) -> Result<f32, CodecError> {
        let start = self.pos;
        let mut out = String::new();
        while matches!(self.peek(), Some(ch) if ch.is_ascii_digit() || ch == '.' || ch == '-') {
            out.push(self.bump()?);
        }
        out.parse()
            .map_err(|_| CodecError::BadNumber { pos: start })
    }

    fn value(&mut self) -> Result<Value, CodecError> {
        self.skip_ws();
        match self.peek().ok_or(CodecError::UnexpectedEnd)? {
            '"' => Ok(Value::Text(self.string()?)),
            '{' => {
                self.expect('{')?;
                let items = self.items('}')?;
                self.expect('}')?;
                Ok(Value::Record(items))
            }
            '(' => {
                self.expect('(')?;
                self.skip_ws();
                self.expect(')')?;
                Ok(Value::Extant)
            }
            't' | 'f' => {
                let word = self.ident()?;
                match word.as_str() {
                    "true" => Ok(Value::Bool(true)),
                    "false" => Ok(Value::Bool(false)),
                    _ => Ok(Value::Text(word)),
                }
            }
            ch if ch.is_ascii_digit() || ch == '-' => Ok(Value::Int(self.number()?)),
            found => Err(CodecError::UnexpectedChar {
                pos: self.pos,
                found,
            }),
        }
    }

    /// Comma-separated items up to (not including) `term`.
    fn items(&mut self, term: char) -> Result<Vec<Item>, CodecError> {
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() == Some(term) || self.peek().is_none() {
                return Ok(items);
            }
            if self.eat('@') {
                let tag = self.ident()?;
                let body = if self.eat('(') {
                    let inner = self.items(')')?;
                    self.expect(')')?;
                    match inner.as_slice() {
                        [] => Value::Extant,
                        [Item::Item(value)] => value.clone(),
                        _ => Value::Record(inner),
                    }
                } else {
                    Value::Extant
                };
                items.push(Item::Attr(tag, body));
            } else {
                let first = self.value()?;
                self.skip_ws();
                if self.eat(':') {
                    let second = self.value()?;
                    items.push(Item::Slot(first, second));
                } else {
                    items.push(Item::Item(first));
                }
            }
            self.skip_ws();
            if !self.eat(',') {
                return Ok(items);
            }
        }
    }

    fn headers(&mut self) -> Result<Headers, CodecError> {
        let mut headers = Headers {
            node_uri: None,
            lane_uri: None,
            prio: 0.0,
            rate: 0.0,
        };
        if !self.eat('(') {
            return Ok(headers);
        }
        loop {
            self.skip_ws();
            if self.eat(')') {
                return Ok(headers);
            }
            let key = self.ident()?;
            self.expect(':')?;
            self.skip_ws();
            match key.as_str() {
                "node" => headers.node_uri = Some(self.string()?),
                "lane" => headers.lane_uri = Some(self.string()?),
                "prio" => headers.prio = self.float()?,
                "rate" => headers.rate = self.float()?,
                _ => {
                    // Tolerate and discard headers this client does not know.
                    self.value()?;
                }
            }
            self.skip_ws();
            self.eat(',');
        }
    }

    fn body(&mut self) -> Result<Value, CodecError> {
        self.skip_ws();
        if self.peek().is_none() {
            return Ok(Value::Absent);
        }
        self.value()
    }

    fn envelope(&mut self) -> Result<Envelope, CodecError> {
        self.skip_ws();
        self.expect('@')?;
        let tag = self.ident()?;
        let headers = self.headers()?;
        let body = self.body()?;

        let lane = |headers: Headers, body: Value| -> Result<LaneAddressed, CodecError> {
            Ok(LaneAddressed {
                node_uri: headers
                    .node_uri
                    .ok_or(CodecError::MissingHeader { header: "node" })?,
                lane_uri: headers
                    .lane_uri
                    .ok_or(CodecError::MissingHeader { header: "lane" })?,
                body,
            })
        };
        let link = |headers: Headers, body: Value| -> Result<LinkAddressed, CodecError> {
            Ok(LinkAddressed {
                prio: headers.prio,
                rate: headers.rate,
                node_uri: headers
                    .node_uri
                    .ok_or(CodecError::MissingHeader { header: "node" })?,
                lane_uri: headers
                    .lane_uri
                    .ok_or(CodecError::MissingHeader { header: "lane" })?,
                body,
            })
        };

        match tag.as_str() {
            "event" => Ok(Envelope::Event(lane(headers, body)?)),
            "command" => Ok(Envelope::Command(lane(headers, body)?)),
            "unlink" => Ok(Envelope::Unlink(lane(headers, body)?)),
            "unlinked" => Ok(Envelope::Unlinked(lane(headers, body)?)),
            "link" => Ok(Envelope::Link(link(headers, body)?)),
            "linked" => Ok(Envelope::Linked(link(headers, body)?)),
            "sync" => Ok(Envelope::Sync(link(headers, body)?)),
            "synced" => Ok(Envelope::Synced(link(headers, body)?)),
            "auth" => Ok(Envelope::Auth(HostAddressed { body })),
            "authed" => Ok(Envelope::Authed(HostAddressed { body })),
            "deauth" => Ok(Envelope::Deauth(HostAddressed { body })),
            "deauthed" => Ok(Envelope::Deauthed(HostAddressed { body })),
            _ => Err(CodecError::UnknownTag { tag }),
        }
    }
}
