//! Sandboxed extraction of scalars from response bodies
//!
//! Backends answer lookups with arbitrary text: JSON, XML, or a bare address.
//! This module evaluates small extraction programs against that text to pull
//! out a single scalar (the address, or the TTL). A program is an expression
//! over one variable, `body`, bound to the full response text:
//!
//! ```text
//! fromJSON(body).ip_address
//! fromJSON(body).records[0].addr
//! fromXML(body).record.ip
//! split(body, "/")[0]
//! trim(lower(body))
//! ```
//!
//! The language is deliberately tiny and closed: a fixed function table
//! (`fromJSON`, `fromXML`, `split`, `upper`, `lower`, `trim`), field access,
//! indexing, and literals. There is no way to reach the process environment,
//! the filesystem, or the network from a program, which keeps the capability
//! surface of operator-supplied extractors auditable.
//!
//! Programs are compiled to an AST once and cached by source text, so the same
//! extractor shared by thousands of lookups parses a single time. Failed
//! compilations are never cached; a corrected source compiles fresh.

use dashmap::DashMap;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::cache::DEFAULT_TTL;
use crate::error::ExtractError;

/// Name of the variable bound to the response text.
pub const BODY_VAR: &str = "body";

/// Compiled extraction program: a tagged-variant expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// The response body variable.
    Body,
    /// String literal.
    Str(String),
    /// Integer literal.
    Int(i64),
    /// Built-in function application.
    Call(Func, Vec<Expr>),
    /// Field access: `expr.name`.
    Field(Box<Expr>, String),
    /// Index access: `expr[index]`.
    Index(Box<Expr>, Box<Expr>),
}

/// The closed set of built-in functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Func {
    FromJson,
    FromXml,
    Split,
    Upper,
    Lower,
    Trim,
}

impl Func {
    fn from_name(name: &str) -> Option<Func> {
        match name {
            "fromJSON" => Some(Func::FromJson),
            "fromXML" => Some(Func::FromXml),
            "split" => Some(Func::Split),
            "upper" => Some(Func::Upper),
            "lower" => Some(Func::Lower),
            "trim" => Some(Func::Trim),
            _ => None,
        }
    }

    fn arity(self) -> usize {
        match self {
            Func::Split => 2,
            _ => 1,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Func::FromJson => "fromJSON",
            Func::FromXml => "fromXML",
            Func::Split => "split",
            Func::Upper => "upper",
            Func::Lower => "lower",
            Func::Trim => "trim",
        }
    }
}

/// Compiles and evaluates extraction programs, caching compiled forms.
///
/// One `Extractor` is shared by all lookups of a resolver. The program cache
/// maps source text to its compiled AST; when two lookups race to compile the
/// same source, the first insert wins and the loser's identical AST is dropped.
///
/// # Examples
///
/// ```
/// use fetchdns::extract::Extractor;
///
/// let extractor = Extractor::new();
/// let body = r#"{"ip_address":"10.0.0.5","ttl":3600}"#;
/// let ip = extractor.extract("fromJSON(body).ip_address", body).unwrap();
/// assert_eq!(ip, "10.0.0.5");
///
/// // An empty program is the identity: the body passes through verbatim.
/// assert_eq!(extractor.extract("", "10.0.0.2").unwrap(), "10.0.0.2");
/// ```
#[derive(Debug, Default)]
pub struct Extractor {
    programs: DashMap<String, Arc<Expr>>,
}

impl Extractor {
    /// Creates an extractor with an empty program cache.
    pub fn new() -> Self {
        Self {
            programs: DashMap::new(),
        }
    }

    /// Runs the program in `source` against `body` and returns the scalar
    /// result.
    ///
    /// An empty `source` returns `body` verbatim, which is the default when no
    /// extractor is configured: a backend that answers with a bare address
    /// needs zero extraction configuration.
    pub fn extract(&self, source: &str, body: &str) -> Result<String, ExtractError> {
        if source.is_empty() {
            return Ok(body.to_string());
        }
        let program = self.compile(source)?;
        let value = eval(&program, body)?;
        render(value)
    }

    /// Extracts a TTL in seconds from `body`, falling back to
    /// [`DEFAULT_TTL`] when no extractor is configured, the program fails, or
    /// the result is not a nonnegative integer. TTL problems are warnings,
    /// never lookup failures.
    pub fn extract_ttl(&self, source: Option<&str>, body: &str) -> Duration {
        let Some(source) = source.filter(|s| !s.is_empty()) else {
            return DEFAULT_TTL;
        };
        match self.extract(source, body) {
            Ok(text) => match text.trim().parse::<u64>() {
                Ok(seconds) => Duration::from_secs(seconds),
                Err(_) => {
                    warn!(
                        "TTL {:?} is not a nonnegative integer, falling back to {}s",
                        text,
                        DEFAULT_TTL.as_secs()
                    );
                    DEFAULT_TTL
                }
            },
            Err(e) => {
                warn!(
                    "could not extract TTL from response, falling back to {}s: {}",
                    DEFAULT_TTL.as_secs(),
                    e
                );
                DEFAULT_TTL
            }
        }
    }

    /// Number of distinct program sources compiled so far.
    pub fn cached_programs(&self) -> usize {
        self.programs.len()
    }

    fn compile(&self, source: &str) -> Result<Arc<Expr>, ExtractError> {
        if let Some(program) = self.programs.get(source) {
            return Ok(Arc::clone(&program));
        }
        let program = Arc::new(parse(source)?);
        debug!("compiled extraction program: {}", source);
        self.programs
            .entry(source.to_string())
            .or_insert_with(|| Arc::clone(&program));
        Ok(program)
    }
}

// ---------------------------------------------------------------------------
// Tokenizer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Int(i64),
    Dot,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
}

fn parse_err(pos: usize, message: impl Into<String>) -> ExtractError {
    ExtractError::Parse {
        pos,
        message: message.into(),
    }
}

fn tokenize(source: &str) -> Result<Vec<(Token, usize)>, ExtractError> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let start = i;
        match bytes[i] {
            b' ' | b'\t' | b'\r' | b'\n' => i += 1,
            b'.' => {
                tokens.push((Token::Dot, start));
                i += 1;
            }
            b',' => {
                tokens.push((Token::Comma, start));
                i += 1;
            }
            b'(' => {
                tokens.push((Token::LParen, start));
                i += 1;
            }
            b')' => {
                tokens.push((Token::RParen, start));
                i += 1;
            }
            b'[' => {
                tokens.push((Token::LBracket, start));
                i += 1;
            }
            b']' => {
                tokens.push((Token::RBracket, start));
                i += 1;
            }
            quote @ (b'"' | b'\'') => {
                i += 1;
                let mut text = String::new();
                loop {
                    match bytes.get(i) {
                        None => return Err(parse_err(start, "unterminated string literal")),
                        Some(&b) if b == quote => {
                            i += 1;
                            break;
                        }
                        Some(b'\\') => {
                            let escaped = bytes
                                .get(i + 1)
                                .ok_or_else(|| parse_err(i, "dangling escape"))?;
                            text.push(match escaped {
                                b'n' => '\n',
                                b't' => '\t',
                                b'\\' => '\\',
                                b'"' => '"',
                                b'\'' => '\'',
                                other => {
                                    return Err(parse_err(
                                        i,
                                        format!("unsupported escape \\{}", *other as char),
                                    ))
                                }
                            });
                            i += 2;
                        }
                        Some(&b) => {
                            // Keep multi-byte UTF-8 sequences intact.
                            let ch_len = utf8_len(b);
                            text.push_str(
                                std::str::from_utf8(&bytes[i..i + ch_len])
                                    .map_err(|_| parse_err(i, "invalid UTF-8 in string"))?,
                            );
                            i += ch_len;
                        }
                    }
                }
                tokens.push((Token::Str(text), start));
            }
            b'0'..=b'9' => {
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
                let literal = &source[start..i];
                let value = literal
                    .parse::<i64>()
                    .map_err(|_| parse_err(start, format!("integer {} out of range", literal)))?;
                tokens.push((Token::Int(value), start));
            }
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => {
                while i < bytes.len()
                    && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_')
                {
                    i += 1;
                }
                tokens.push((Token::Ident(source[start..i].to_string()), start));
            }
            other => {
                return Err(parse_err(
                    start,
                    format!("unexpected character {:?}", other as char),
                ))
            }
        }
    }

    Ok(tokens)
}

fn utf8_len(first_byte: u8) -> usize {
    match first_byte {
        b if b < 0x80 => 1,
        b if b >= 0xF0 => 4,
        b if b >= 0xE0 => 3,
        _ => 2,
    }
}

// ---------------------------------------------------------------------------
// Parser (recursive descent)
// ---------------------------------------------------------------------------

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    source_len: usize,
}

fn parse(source: &str) -> Result<Expr, ExtractError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        source_len: source.len(),
    };
    let expr = parser.expr()?;
    if let Some((token, pos)) = parser.peek() {
        return Err(parse_err(pos, format!("unexpected trailing {:?}", token)));
    }
    Ok(expr)
}

impl Parser {
    fn peek(&self) -> Option<(Token, usize)> {
        self.tokens.get(self.pos).cloned()
    }

    fn next(&mut self) -> Option<(Token, usize)> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: Token, what: &str) -> Result<(), ExtractError> {
        match self.next() {
            Some((token, _)) if token == expected => Ok(()),
            Some((token, pos)) => Err(parse_err(pos, format!("expected {}, found {:?}", what, token))),
            None => Err(parse_err(self.source_len, format!("expected {}", what))),
        }
    }

    fn expr(&mut self) -> Result<Expr, ExtractError> {
        let mut expr = self.primary()?;
        loop {
            match self.peek() {
                Some((Token::Dot, _)) => {
                    self.next();
                    match self.next() {
                        Some((Token::Ident(name), _)) => expr = Expr::Field(Box::new(expr), name),
                        Some((token, pos)) => {
                            return Err(parse_err(
                                pos,
                                format!("expected field name after '.', found {:?}", token),
                            ))
                        }
                        None => {
                            return Err(parse_err(self.source_len, "expected field name after '.'"))
                        }
                    }
                }
                Some((Token::LBracket, _)) => {
                    self.next();
                    let index = self.expr()?;
                    self.expect(Token::RBracket, "']'")?;
                    expr = Expr::Index(Box::new(expr), Box::new(index));
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn primary(&mut self) -> Result<Expr, ExtractError> {
        match self.next() {
            Some((Token::Ident(name), pos)) => {
                if matches!(self.peek(), Some((Token::LParen, _))) {
                    let func = Func::from_name(&name)
                        .ok_or_else(|| parse_err(pos, format!("unknown function {}", name)))?;
                    self.next();
                    let args = self.args()?;
                    if args.len() != func.arity() {
                        return Err(parse_err(
                            pos,
                            format!(
                                "{} takes {} argument(s), got {}",
                                func.name(),
                                func.arity(),
                                args.len()
                            ),
                        ));
                    }
                    Ok(Expr::Call(func, args))
                } else if name == BODY_VAR {
                    Ok(Expr::Body)
                } else {
                    Err(parse_err(pos, format!("unknown variable {}", name)))
                }
            }
            Some((Token::Str(text), _)) => Ok(Expr::Str(text)),
            Some((Token::Int(value), _)) => Ok(Expr::Int(value)),
            Some((Token::LParen, _)) => {
                let expr = self.expr()?;
                self.expect(Token::RParen, "')'")?;
                Ok(expr)
            }
            Some((token, pos)) => Err(parse_err(pos, format!("unexpected {:?}", token))),
            None => Err(parse_err(self.source_len, "empty expression")),
        }
    }

    fn args(&mut self) -> Result<Vec<Expr>, ExtractError> {
        let mut args = Vec::new();
        if matches!(self.peek(), Some((Token::RParen, _))) {
            self.next();
            return Ok(args);
        }
        loop {
            args.push(self.expr()?);
            match self.next() {
                Some((Token::Comma, _)) => continue,
                Some((Token::RParen, _)) => return Ok(args),
                Some((token, pos)) => {
                    return Err(parse_err(
                        pos,
                        format!("expected ',' or ')', found {:?}", token),
                    ))
                }
                None => return Err(parse_err(self.source_len, "unclosed argument list")),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// Intermediate value produced while evaluating a program.
#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Num(i64),
    Json(serde_json::Value),
    Xml(XmlElement),
    List(Vec<Value>),
}

impl Value {
    fn kind(&self) -> &'static str {
        match self {
            Value::Str(_) => "string",
            Value::Num(_) => "integer",
            Value::Json(_) => "JSON value",
            Value::Xml(_) => "XML element",
            Value::List(_) => "list",
        }
    }
}

fn eval_err(message: impl Into<String>) -> ExtractError {
    ExtractError::Eval {
        message: message.into(),
    }
}

fn eval(expr: &Expr, body: &str) -> Result<Value, ExtractError> {
    match expr {
        Expr::Body => Ok(Value::Str(body.to_string())),
        Expr::Str(text) => Ok(Value::Str(text.clone())),
        Expr::Int(value) => Ok(Value::Num(*value)),
        Expr::Call(func, args) => {
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(eval(arg, body)?);
            }
            apply(*func, values)
        }
        Expr::Field(inner, name) => field(eval(inner, body)?, name),
        Expr::Index(inner, index) => {
            let collection = eval(inner, body)?;
            let index = eval(index, body)?;
            index_into(collection, index)
        }
    }
}

fn apply(func: Func, mut args: Vec<Value>) -> Result<Value, ExtractError> {
    match func {
        Func::FromJson => {
            let text = render(args.remove(0))?;
            let value = serde_json::from_str(&text)
                .map_err(|e| eval_err(format!("fromJSON: invalid JSON: {}", e)))?;
            Ok(Value::Json(value))
        }
        Func::FromXml => {
            let text = render(args.remove(0))?;
            Ok(Value::Xml(parse_xml(&text)?))
        }
        Func::Split => {
            let delimiter = render(args.remove(1))?;
            let text = render(args.remove(0))?;
            if delimiter.is_empty() {
                return Err(eval_err("split: delimiter must not be empty"));
            }
            Ok(Value::List(
                text.split(&delimiter)
                    .map(|part| Value::Str(part.to_string()))
                    .collect(),
            ))
        }
        Func::Upper => Ok(Value::Str(render(args.remove(0))?.to_uppercase())),
        Func::Lower => Ok(Value::Str(render(args.remove(0))?.to_lowercase())),
        Func::Trim => Ok(Value::Str(render(args.remove(0))?.trim().to_string())),
    }
}

fn field(value: Value, name: &str) -> Result<Value, ExtractError> {
    match value {
        Value::Json(serde_json::Value::Object(map)) => map
            .get(name)
            .cloned()
            .map(Value::Json)
            .ok_or_else(|| eval_err(format!("no field {} in JSON object", name))),
        Value::Xml(element) => element
            .children
            .iter()
            .find(|child| child.name == name)
            .cloned()
            .map(Value::Xml)
            .ok_or_else(|| {
                eval_err(format!(
                    "no element <{}> under <{}>",
                    name,
                    if element.name.is_empty() {
                        "document root"
                    } else {
                        &element.name
                    }
                ))
            }),
        other => Err(eval_err(format!(
            "cannot access field {} on a {}",
            name,
            other.kind()
        ))),
    }
}

fn index_into(collection: Value, index: Value) -> Result<Value, ExtractError> {
    match (collection, index) {
        (Value::List(items), index) => {
            let i = as_index(&index, items.len())?;
            Ok(items[i].clone())
        }
        (Value::Json(serde_json::Value::Array(items)), index) => {
            let i = as_index(&index, items.len())?;
            Ok(Value::Json(items[i].clone()))
        }
        (json @ Value::Json(serde_json::Value::Object(_)), Value::Str(name)) => field(json, &name),
        (collection, index) => Err(eval_err(format!(
            "cannot index a {} with a {}",
            collection.kind(),
            index.kind()
        ))),
    }
}

fn as_index(value: &Value, len: usize) -> Result<usize, ExtractError> {
    let raw = match value {
        Value::Num(n) => *n,
        Value::Json(serde_json::Value::Number(n)) => n
            .as_i64()
            .ok_or_else(|| eval_err(format!("index {} is not an integer", n)))?,
        other => return Err(eval_err(format!("index must be an integer, got {}", other.kind()))),
    };
    let index = usize::try_from(raw)
        .map_err(|_| eval_err(format!("index {} is negative", raw)))?;
    if index >= len {
        return Err(eval_err(format!(
            "index {} out of bounds for length {}",
            index, len
        )));
    }
    Ok(index)
}

/// Renders a value to the scalar string handed back to the orchestrator.
///
/// JSON `null` renders as the empty string so a backend answering
/// `{"ip_address": null}` flows into the "no record found" path.
fn render(value: Value) -> Result<String, ExtractError> {
    match value {
        Value::Str(text) => Ok(text),
        Value::Num(value) => Ok(value.to_string()),
        Value::Json(serde_json::Value::String(text)) => Ok(text),
        Value::Json(serde_json::Value::Null) => Ok(String::new()),
        Value::Json(serde_json::Value::Number(n)) => Ok(n.to_string()),
        Value::Json(serde_json::Value::Bool(b)) => Ok(b.to_string()),
        Value::Json(compound) => serde_json::to_string(&compound)
            .map_err(|e| eval_err(format!("cannot render JSON value: {}", e))),
        Value::Xml(element) => Ok(element.text.trim().to_string()),
        Value::List(_) => Err(eval_err("expected a scalar, got a list; index into it")),
    }
}

// ---------------------------------------------------------------------------
// XML support
// ---------------------------------------------------------------------------

/// Minimal XML element tree: tag name, accumulated text content, children.
/// Attributes and namespaces are not modeled; namespace prefixes are stripped
/// from tag names so `fromXML(body).record.ip` works regardless of prefixing.
#[derive(Debug, Clone, PartialEq)]
struct XmlElement {
    name: String,
    text: String,
    children: Vec<XmlElement>,
}

fn parse_xml(input: &str) -> Result<XmlElement, ExtractError> {
    let mut reader = Reader::from_str(input);
    // Synthetic document node so the root element is addressable by name.
    let mut stack = vec![XmlElement {
        name: String::new(),
        text: String::new(),
        children: Vec::new(),
    }];

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                stack.push(XmlElement {
                    name: String::from_utf8_lossy(e.local_name().as_ref()).into_owned(),
                    text: String::new(),
                    children: Vec::new(),
                });
            }
            Ok(Event::Empty(e)) => {
                let element = XmlElement {
                    name: String::from_utf8_lossy(e.local_name().as_ref()).into_owned(),
                    text: String::new(),
                    children: Vec::new(),
                };
                // stack always holds at least the document node
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(element);
                }
            }
            Ok(Event::Text(t)) => {
                let text = t
                    .unescape()
                    .map_err(|e| eval_err(format!("fromXML: bad text content: {}", e)))?;
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&text);
                }
            }
            Ok(Event::CData(t)) => {
                if let Some(current) = stack.last_mut() {
                    current
                        .text
                        .push_str(&String::from_utf8_lossy(&t.into_inner()));
                }
            }
            Ok(Event::End(_)) => {
                let finished = match stack.pop() {
                    Some(element) if !stack.is_empty() => element,
                    _ => return Err(eval_err("fromXML: unbalanced closing tag")),
                };
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(finished);
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(eval_err(format!(
                    "fromXML: malformed XML at position {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
        }
    }

    if stack.len() != 1 {
        return Err(eval_err("fromXML: unclosed element"));
    }
    // Length checked above; the document node is the sole remaining element.
    Ok(stack.swap_remove(0))
}
