//! XML-RPC envelope encoding and decoding.
//!
//! # Wire Format
//!
//! ```text
//! <?xml version="1.0" encoding="utf-8"?>
//! <methodCall>
//!   <methodName>execute</methodName>
//!   <params><param><value><string>acme</string></value></param>...</params>
//! </methodCall>
//! ```
//!
//! Responses carry either `<params>` with exactly one value or a `<fault>`
//! whose value is a struct with `faultCode` and `faultString` members.
//!
//! # Normalization
//!
//! Servers are not consistent about list results: a list with exactly one
//! element can come back as the bare element. Every caller that expects a
//! list goes through [`normalize_list`] (or the typed [`normalize_ids`] /
//! [`normalize_records`]) instead of matching on the shape itself.

use chrono::NaiveDateTime;
use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::{Result, RpcError};
use crate::value::{Fault, Record, RpcCall, RpcResult, Value, DATETIME_FORMAT};

/// Message used when a fault struct carries no readable text.
const UNDEFINED_FAULT: &str = "Undefined fault string";

// =============================================================================
// Encoding
// =============================================================================

/// Check that `charset` names UTF-8, the only encoding documents are
/// produced in.
///
/// # Errors
///
/// `RpcError::InvalidConfig` for any other charset.
pub fn check_charset(charset: &str) -> Result<()> {
    let normalized = charset.trim().to_ascii_lowercase();
    if normalized == "utf-8" || normalized == "utf8" {
        Ok(())
    } else {
        Err(RpcError::InvalidConfig(format!(
            "unsupported charset {:?}: only utf-8 is supported",
            charset
        )))
    }
}

/// Encode a method call as an XML-RPC request document.
///
/// # Errors
///
/// - `RpcError::InvalidConfig` if `charset` is not UTF-8
/// - `RpcError::Encode` for values XML-RPC cannot carry (non-finite doubles)
pub fn encode_call(call: &RpcCall, charset: &str) -> Result<String> {
    let mut out = xml_declaration(charset)?;
    out.push_str("<methodCall><methodName>");
    out.push_str(&escape(call.method.as_str()));
    out.push_str("</methodName><params>");
    for arg in &call.args {
        out.push_str("<param>");
        encode_value(arg, &mut out)?;
        out.push_str("</param>");
    }
    out.push_str("</params></methodCall>");
    Ok(out)
}

/// Encode a response document. Used by test servers and fixtures.
pub fn encode_response(result: &RpcResult, charset: &str) -> Result<String> {
    let mut out = xml_declaration(charset)?;
    out.push_str("<methodResponse>");
    match result {
        RpcResult::Success(value) => {
            out.push_str("<params><param>");
            encode_value(value, &mut out)?;
            out.push_str("</param></params>");
        }
        RpcResult::Fault(fault) => {
            let mut members = Record::new();
            members.insert("faultCode".to_string(), Value::Int(fault.code));
            members.insert(
                "faultString".to_string(),
                Value::String(fault.message.clone()),
            );
            out.push_str("<fault>");
            encode_value(&Value::Struct(members), &mut out)?;
            out.push_str("</fault>");
        }
    }
    out.push_str("</methodResponse>");
    Ok(out)
}

fn xml_declaration(charset: &str) -> Result<String> {
    check_charset(charset)?;
    Ok("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n".to_string())
}

/// Append one `<value>` element.
fn encode_value(value: &Value, out: &mut String) -> Result<()> {
    out.push_str("<value>");
    match value {
        Value::Bool(b) => {
            out.push_str(if *b {
                "<boolean>1</boolean>"
            } else {
                "<boolean>0</boolean>"
            });
        }
        Value::Int(i) => {
            // <int> is 32-bit on the wire; wider values need the i8 extension.
            if i32::try_from(*i).is_ok() {
                out.push_str(&format!("<int>{}</int>", i));
            } else {
                out.push_str(&format!("<i8>{}</i8>", i));
            }
        }
        Value::Double(d) => {
            if !d.is_finite() {
                return Err(RpcError::Encode(format!("double {} has no XML-RPC form", d)));
            }
            out.push_str(&format!("<double>{}</double>", d));
        }
        Value::String(s) => {
            out.push_str("<string>");
            out.push_str(&escape(s.as_str()));
            out.push_str("</string>");
        }
        Value::Array(items) => {
            out.push_str("<array><data>");
            for item in items {
                encode_value(item, out)?;
            }
            out.push_str("</data></array>");
        }
        Value::Struct(members) => {
            out.push_str("<struct>");
            for (name, member) in members {
                out.push_str("<member><name>");
                out.push_str(&escape(name.as_str()));
                out.push_str("</name>");
                encode_value(member, out)?;
                out.push_str("</member>");
            }
            out.push_str("</struct>");
        }
        Value::DateTime(dt) => {
            out.push_str("<dateTime.iso8601>");
            out.push_str(&dt.format(DATETIME_FORMAT).to_string());
            out.push_str("</dateTime.iso8601>");
        }
        Value::Nil => out.push_str("<nil/>"),
    }
    out.push_str("</value>");
    Ok(())
}

// =============================================================================
// Decoding
// =============================================================================

/// Decode a response document into a value or a fault.
///
/// The fault branch is checked first; a faulted response never yields a
/// success value.
///
/// # Errors
///
/// Returns `RpcError::Decode` for malformed XML or unknown value tags.
pub fn decode_response(body: &str) -> Result<RpcResult> {
    let mut parser = Parser::new(body)?;
    parser.expect_open("methodResponse")?;

    let result = match parser.next_significant()? {
        Token::Open(tag) if tag == "fault" => {
            let value = parser.parse_value()?;
            parser.expect_close("fault")?;
            RpcResult::Fault(fault_from_value(&value))
        }
        Token::Open(tag) if tag == "params" => {
            let value = match parser.next_significant()? {
                Token::Open(tag) if tag == "param" => {
                    let value = parser.parse_value()?;
                    parser.expect_close("param")?;
                    parser.expect_close("params")?;
                    value
                }
                Token::Close(tag) if tag == "params" => Value::Nil,
                other => return Err(unexpected("<param>", &other)),
            };
            RpcResult::Success(value)
        }
        Token::Empty(tag) if tag == "params" => RpcResult::Success(Value::Nil),
        other => return Err(unexpected("<params> or <fault>", &other)),
    };

    parser.expect_close("methodResponse")?;
    Ok(result)
}

/// Decode a request document. Used by test servers and for diagnostics on
/// [`crate::transport::XmlRpcTransport::last_request`].
pub fn decode_call(body: &str) -> Result<RpcCall> {
    let mut parser = Parser::new(body)?;
    parser.expect_open("methodCall")?;
    parser.expect_open("methodName")?;
    let method = parser.collect_text("methodName")?.trim().to_string();

    let mut args = Vec::new();
    match parser.next_significant()? {
        Token::Open(tag) if tag == "params" => loop {
            match parser.next_significant()? {
                Token::Open(tag) if tag == "param" => {
                    args.push(parser.parse_value()?);
                    parser.expect_close("param")?;
                }
                Token::Close(tag) if tag == "params" => break,
                other => return Err(unexpected("<param>", &other)),
            }
        },
        Token::Empty(tag) if tag == "params" => {}
        Token::Close(tag) if tag == "methodCall" => return Ok(RpcCall { method, args }),
        other => return Err(unexpected("<params>", &other)),
    }

    parser.expect_close("methodCall")?;
    Ok(RpcCall { method, args })
}

/// Extract code and message from a fault struct by member name.
///
/// A string `faultCode` wins outright: code 0, message taken from it. This is
/// how the server reports most errors (the `faultString` then holds a
/// traceback). Otherwise an integer `faultCode` is kept and the message comes
/// from `faultString`.
pub fn fault_from_value(value: &Value) -> Fault {
    let mut fault = Fault {
        code: 0,
        message: UNDEFINED_FAULT.to_string(),
    };

    let Some(members) = value.as_struct() else {
        return fault;
    };

    match members.get("faultCode") {
        Some(Value::String(text)) => {
            fault.message = text.clone();
            return fault;
        }
        Some(Value::Int(code)) => fault.code = *code,
        _ => {}
    }

    if let Some(Value::String(text)) = members.get("faultString") {
        fault.message = text.clone();
    }

    fault
}

// =============================================================================
// List normalization
// =============================================================================

/// Re-wrap a collapsed single-element result into a list.
///
/// - `Array` yields its items
/// - `Nil` yields an empty list
/// - any other value is taken as the sole element
pub fn normalize_list(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Nil => Vec::new(),
        single => vec![single],
    }
}

/// Normalize a result that must be a list of integer ids.
///
/// # Errors
///
/// `RpcError::ShapeNormalization` if any element is not an integer.
pub fn normalize_ids(value: Value) -> Result<Vec<i64>> {
    normalize_list(value)
        .into_iter()
        .map(|item| match item {
            Value::Int(id) => Ok(id),
            other => Err(RpcError::ShapeNormalization(format!(
                "expected int id, found {}",
                other.kind()
            ))),
        })
        .collect()
}

/// Normalize a result that must be a list of records.
///
/// # Errors
///
/// `RpcError::ShapeNormalization` if any element is not a struct.
pub fn normalize_records(value: Value) -> Result<Vec<Record>> {
    normalize_list(value)
        .into_iter()
        .map(|item| match item {
            Value::Struct(record) => Ok(record),
            other => Err(RpcError::ShapeNormalization(format!(
                "expected struct record, found {}",
                other.kind()
            ))),
        })
        .collect()
}

// =============================================================================
// Parser
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Open(String),
    Close(String),
    Empty(String),
    Text(String),
    Eof,
}

fn describe(token: &Token) -> String {
    match token {
        Token::Open(tag) => format!("<{}>", tag),
        Token::Close(tag) => format!("</{}>", tag),
        Token::Empty(tag) => format!("<{}/>", tag),
        Token::Text(text) => format!("text {:?}", text),
        Token::Eof => "end of document".to_string(),
    }
}

fn unexpected(expected: &str, found: &Token) -> RpcError {
    RpcError::Decode(format!("expected {}, found {}", expected, describe(found)))
}

/// Recursive-descent reader over a flattened token list.
struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(body: &str) -> Result<Self> {
        Ok(Self {
            tokens: tokenize(body)?,
            pos: 0,
        })
    }

    fn next(&mut self) -> Token {
        let token = self.tokens.get(self.pos).cloned().unwrap_or(Token::Eof);
        self.pos += 1;
        token
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    /// Next token that is not inter-element whitespace.
    fn next_significant(&mut self) -> Result<Token> {
        loop {
            match self.next() {
                Token::Text(text) if text.trim().is_empty() => continue,
                Token::Text(text) => {
                    return Err(RpcError::Decode(format!("unexpected text {:?}", text)))
                }
                token => return Ok(token),
            }
        }
    }

    fn expect_open(&mut self, tag: &str) -> Result<()> {
        match self.next_significant()? {
            Token::Open(found) if found == tag => Ok(()),
            other => Err(unexpected(&format!("<{}>", tag), &other)),
        }
    }

    fn expect_close(&mut self, tag: &str) -> Result<()> {
        match self.next_significant()? {
            Token::Close(found) if found == tag => Ok(()),
            other => Err(unexpected(&format!("</{}>", tag), &other)),
        }
    }

    /// Concatenate text up to the closing tag, whitespace included.
    fn collect_text(&mut self, tag: &str) -> Result<String> {
        let mut text = String::new();
        loop {
            match self.next() {
                Token::Text(chunk) => text.push_str(&chunk),
                Token::Close(found) if found == tag => return Ok(text),
                other => return Err(unexpected(&format!("</{}>", tag), &other)),
            }
        }
    }

    fn parse_value(&mut self) -> Result<Value> {
        match self.next_significant()? {
            Token::Open(tag) if tag == "value" => {}
            Token::Empty(tag) if tag == "value" => return Ok(Value::String(String::new())),
            other => return Err(unexpected("<value>", &other)),
        }

        // Untyped content defaults to string.
        if matches!(self.peek(), Token::Text(_) | Token::Close(_)) {
            let mut text = String::new();
            while let Token::Text(chunk) = self.peek() {
                text.push_str(chunk);
                self.pos += 1;
            }
            if !matches!(self.peek(), Token::Close(tag) if tag == "value") {
                // Whitespace around a typed element, not an untyped string.
                if text.trim().is_empty() {
                    let value = self.parse_typed()?;
                    self.expect_close("value")?;
                    return Ok(value);
                }
            }
            self.expect_close("value")?;
            return Ok(Value::String(text));
        }

        let value = self.parse_typed()?;
        self.expect_close("value")?;
        Ok(value)
    }

    fn parse_typed(&mut self) -> Result<Value> {
        match self.next_significant()? {
            Token::Empty(tag) => empty_value(&tag),
            Token::Open(tag) => match tag.as_str() {
                "int" | "i4" | "i8" => {
                    let text = self.collect_text(&tag)?;
                    text.trim()
                        .parse::<i64>()
                        .map(Value::Int)
                        .map_err(|e| RpcError::Decode(format!("bad <{}> {:?}: {}", tag, text, e)))
                }
                "boolean" => {
                    let text = self.collect_text(&tag)?;
                    match text.trim() {
                        "1" | "true" => Ok(Value::Bool(true)),
                        "0" | "false" => Ok(Value::Bool(false)),
                        other => Err(RpcError::Decode(format!("bad <boolean> {:?}", other))),
                    }
                }
                "double" => {
                    let text = self.collect_text(&tag)?;
                    text.trim()
                        .parse::<f64>()
                        .map(Value::Double)
                        .map_err(|e| RpcError::Decode(format!("bad <double> {:?}: {}", text, e)))
                }
                "string" => Ok(Value::String(self.collect_text(&tag)?)),
                "base64" => Ok(Value::String(self.collect_text(&tag)?.trim().to_string())),
                "dateTime.iso8601" => {
                    let text = self.collect_text(&tag)?;
                    parse_datetime(text.trim()).map(Value::DateTime)
                }
                "nil" => {
                    self.expect_close("nil")?;
                    Ok(Value::Nil)
                }
                "array" => self.parse_array(),
                "struct" => self.parse_struct(),
                other => Err(RpcError::Decode(format!("unknown value type <{}>", other))),
            },
            other => Err(unexpected("typed value", &other)),
        }
    }

    fn parse_array(&mut self) -> Result<Value> {
        let mut items = Vec::new();
        match self.next_significant()? {
            Token::Open(tag) if tag == "data" => loop {
                if matches!(self.peek_significant(), Token::Close(tag) if tag == "data") {
                    self.expect_close("data")?;
                    break;
                }
                items.push(self.parse_value()?);
            },
            Token::Empty(tag) if tag == "data" => {}
            Token::Close(tag) if tag == "array" => return Ok(Value::Array(items)),
            other => return Err(unexpected("<data>", &other)),
        }
        self.expect_close("array")?;
        Ok(Value::Array(items))
    }

    fn parse_struct(&mut self) -> Result<Value> {
        let mut members = Record::new();
        loop {
            match self.next_significant()? {
                Token::Open(tag) if tag == "member" => {
                    let (name, value) = self.parse_member()?;
                    members.insert(name, value);
                }
                Token::Close(tag) if tag == "struct" => break,
                other => return Err(unexpected("<member>", &other)),
            }
        }
        Ok(Value::Struct(members))
    }

    /// A member's `<name>` and `<value>` are accepted in either order.
    fn parse_member(&mut self) -> Result<(String, Value)> {
        let mut name = None;
        let mut value = None;
        loop {
            match self.peek_significant() {
                Token::Open(tag) if tag == "name" => {
                    self.expect_open("name")?;
                    name = Some(self.collect_text("name")?);
                }
                Token::Empty(tag) if tag == "name" => {
                    self.next_significant()?;
                    name = Some(String::new());
                }
                Token::Open(tag) | Token::Empty(tag) if tag == "value" => {
                    value = Some(self.parse_value()?);
                }
                Token::Close(tag) if tag == "member" => {
                    self.expect_close("member")?;
                    break;
                }
                other => return Err(unexpected("<name> or <value>", &other)),
            }
        }

        match (name, value) {
            (Some(name), Some(value)) => Ok((name, value)),
            (None, _) => Err(RpcError::Decode("struct member without <name>".into())),
            (Some(name), None) => Err(RpcError::Decode(format!(
                "struct member {:?} without <value>",
                name
            ))),
        }
    }

    /// Peek past whitespace without consuming the significant token.
    fn peek_significant(&mut self) -> Token {
        while let Some(Token::Text(text)) = self.tokens.get(self.pos) {
            if !text.trim().is_empty() {
                break;
            }
            self.pos += 1;
        }
        self.peek().clone()
    }
}

fn empty_value(tag: &str) -> Result<Value> {
    match tag {
        "string" | "base64" => Ok(Value::String(String::new())),
        "nil" => Ok(Value::Nil),
        "array" => Ok(Value::Array(Vec::new())),
        "struct" => Ok(Value::Struct(Record::new())),
        other => Err(RpcError::Decode(format!("empty <{}/> has no value", other))),
    }
}

fn parse_datetime(text: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text, DATETIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S"))
        .map_err(|e| RpcError::Decode(format!("bad dateTime.iso8601 {:?}: {}", text, e)))
}

/// Flatten the document into element and text tokens.
fn tokenize(body: &str) -> Result<Vec<Token>> {
    let mut reader = Reader::from_str(body);
    let mut tokens = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => tokens.push(Token::Open(tag_name(e.name().as_ref())?)),
            Event::End(e) => tokens.push(Token::Close(tag_name(e.name().as_ref())?)),
            Event::Empty(e) => tokens.push(Token::Empty(tag_name(e.name().as_ref())?)),
            Event::Text(e) => tokens.push(Token::Text(e.unescape()?.into_owned())),
            Event::CData(e) => {
                let text = String::from_utf8(e.into_inner().into_owned())
                    .map_err(|e| RpcError::Decode(format!("CDATA is not UTF-8: {}", e)))?;
                tokens.push(Token::Text(text));
            }
            Event::Eof => break,
            // Declaration, comments, processing instructions, doctype.
            _ => {}
        }
    }

    Ok(tokens)
}

fn tag_name(raw: &[u8]) -> Result<String> {
    std::str::from_utf8(raw)
        .map(str::to_string)
        .map_err(|e| RpcError::Decode(format!("tag name is not UTF-8: {}", e)))
}
