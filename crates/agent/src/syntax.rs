//! Call syntax shared by `!commands` in chat and by action scripts.
//!
//! Both use `name(arg, ...)` where each argument is a quoted string, a
//! number, a boolean, or (commands only) a bare word.

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static COMMAND_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r#"!(\w+)(?:\(((?:[^)(]+|'[^']*'|"[^"]*")*)\))?"#).ok()
});

static CALL_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)\s*\((.*)\)$").ok());

/// One parsed argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgValue {
    Bool(bool),
    Num(f64),
    Str(String),
    /// An unquoted word, e.g. `hunting` in `!setMode(hunting, false)`
    Bare(String),
}

impl ArgValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ArgValue::Str(s) | ArgValue::Bare(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ArgValue::Num(n) => Some(*n),
            ArgValue::Str(s) | ArgValue::Bare(s) => s.trim().parse().ok(),
            ArgValue::Bool(_) => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ArgValue::Bool(b) => Some(*b),
            ArgValue::Str(s) | ArgValue::Bare(s) => match s.trim() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
            ArgValue::Num(_) => None,
        }
    }
}

impl std::fmt::Display for ArgValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArgValue::Bool(b) => write!(f, "{b}"),
            ArgValue::Num(n) => write!(f, "{n}"),
            ArgValue::Str(s) | ArgValue::Bare(s) => write!(f, "{s}"),
        }
    }
}

/// A `!command` found in free text.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandCall {
    /// Includes the leading `!`
    pub name: String,
    pub args: Vec<ArgValue>,
    /// Byte offset of the `!`
    pub start: usize,
    /// Byte offset just past the closing parenthesis (or the name)
    pub end: usize,
}

/// Find the first `!command` in `text`.
///
/// Returns `Err` with a reason when the command is present but its
/// argument list is malformed.
pub fn find_command(text: &str) -> Option<Result<CommandCall, String>> {
    let re = COMMAND_RE.as_ref()?;
    let caps = re.captures(text)?;
    let whole = caps.get(0)?;
    let name = format!("!{}", caps.get(1)?.as_str());
    let args = match caps.get(2) {
        Some(raw) => match parse_args(raw.as_str()) {
            Ok(args) => args,
            Err(reason) => return Some(Err(reason)),
        },
        None => Vec::new(),
    };
    Some(Ok(CommandCall {
        name,
        args,
        start: whole.start(),
        end: whole.end(),
    }))
}

/// The name of the first `!command` in `text`, if any.
pub fn contains_command(text: &str) -> Option<String> {
    let re = COMMAND_RE.as_ref()?;
    let caps = re.captures(text)?;
    Some(format!("!{}", caps.get(1)?.as_str()))
}

/// Everything up to and including the first command; trailing text is dropped.
pub fn truncate_command_message(text: &str) -> &str {
    match COMMAND_RE.as_ref().and_then(|re| re.find(text)) {
        Some(m) => &text[..m.end()],
        None => text,
    }
}

/// Split `name(args)` into its parts. Whitespace around the call is ignored.
pub fn parse_call(statement: &str) -> Result<(String, Vec<ArgValue>), String> {
    let statement = statement.trim();
    let re = CALL_RE
        .as_ref()
        .ok_or_else(|| "call pattern unavailable".to_string())?;
    let caps = re
        .captures(statement)
        .ok_or_else(|| format!("expected a call like name(args), got '{statement}'"))?;
    let name = caps.get(1).map(|m| m.as_str()).unwrap_or_default().to_string();
    let args = parse_args(caps.get(2).map(|m| m.as_str()).unwrap_or_default())?;
    Ok((name, args))
}

/// Parse a comma-separated argument list. Commas inside quotes don't split.
pub fn parse_args(raw: &str) -> Result<Vec<ArgValue>, String> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    split_outside_quotes(raw, &[','])?
        .into_iter()
        .map(|piece| parse_arg(piece.trim()))
        .collect()
}

fn parse_arg(piece: &str) -> Result<ArgValue, String> {
    if piece.is_empty() {
        return Err("empty argument".into());
    }
    let bytes = piece.as_bytes();
    let first = bytes[0];
    if first == b'"' || first == b'\'' {
        if piece.len() < 2 || bytes[piece.len() - 1] != first {
            return Err(format!("unterminated string {piece}"));
        }
        return Ok(ArgValue::Str(piece[1..piece.len() - 1].to_string()));
    }
    match piece {
        "true" => return Ok(ArgValue::Bool(true)),
        "false" => return Ok(ArgValue::Bool(false)),
        _ => {}
    }
    if let Ok(n) = piece.parse::<f64>() {
        return Ok(ArgValue::Num(n));
    }
    Ok(ArgValue::Bare(piece.to_string()))
}

/// Split `source` into statements on newlines and `;`, dropping `//`
/// comments. Separators inside quotes are kept.
pub fn split_statements(source: &str) -> Result<Vec<String>, String> {
    let mut statements = Vec::new();
    for line in source.lines() {
        let line = strip_comment(line);
        for piece in split_outside_quotes(line, &[';'])? {
            let piece = piece.trim();
            if !piece.is_empty() {
                statements.push(piece.to_string());
            }
        }
    }
    Ok(statements)
}

fn strip_comment(line: &str) -> &str {
    let mut quote: Option<char> = None;
    let mut prev_slash = false;
    for (i, c) in line.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => quote = Some(c),
            None if c == '/' && prev_slash => return &line[..i - 1],
            None => {}
        }
        prev_slash = quote.is_none() && c == '/';
    }
    line
}

fn split_outside_quotes<'a>(s: &'a str, separators: &[char]) -> Result<Vec<&'a str>, String> {
    let mut pieces = Vec::new();
    let mut quote: Option<char> = None;
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '"' | '\'' => quote = Some(c),
                '(' => depth += 1,
                ')' => depth = depth.saturating_sub(1),
                c if depth == 0 && separators.contains(&c) => {
                    pieces.push(&s[start..i]);
                    start = i + c.len_utf8();
                }
                _ => {}
            },
        }
    }
    if quote.is_some() {
        return Err("unterminated string".into());
    }
    pieces.push(&s[start..]);
    Ok(pieces)
}
