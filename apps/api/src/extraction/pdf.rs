//! PDF text extraction as an ordered chain of strategies.
//!
//! 1. `text_layer`: the PDF text layer via `pdf-extract` (primary)
//! 2. `text_operators`: text-show operators (`Tj`, `TJ`, `'`, `"`) in content
//!    streams, with literal-string escapes decoded
//! 3. `printable_runs`: printable-ASCII runs inside stream regions
//! 4. `literal_strings`: every parenthesized literal string in the file
//!
//! Streams are inflated through `lopdf` when the file parses; otherwise the
//! raw `stream … endstream` regions are scanned as-is. The first strategy whose
//! normalized output reaches the readable-text floor wins.

use std::cell::OnceCell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, LazyLock};

use regex::bytes::Regex;
use tracing::{debug, warn};

use crate::extraction::text::{normalize_text, readable_chars};
use crate::extraction::{ExtractedText, ExtractionError};

static RE_STREAM_REGION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)stream\r?\n(.*?)\r?\nendstream").unwrap());

/// Streams with more non-text bytes than this are treated as binary (images, fonts).
const MAX_BINARY_RATIO: f64 = 0.3;
const MIN_PRINTABLE_RUN: usize = 4;
/// Negative `TJ` kerning beyond this (thousandths of an em) reads as a word gap.
const TJ_WORD_GAP: f64 = -200.0;

/// A PDF and its decoded streams, computed lazily because the primary
/// strategy does not need them.
pub struct PdfSource<'a> {
    pub raw: &'a [u8],
    streams: OnceCell<Vec<Vec<u8>>>,
}

impl<'a> PdfSource<'a> {
    pub fn new(raw: &'a [u8]) -> Self {
        Self {
            raw,
            streams: OnceCell::new(),
        }
    }

    /// Decoded text-bearing streams; falls back to the raw bytes when the file
    /// has no recognizable stream regions.
    pub fn streams(&self) -> &[Vec<u8>] {
        self.streams.get_or_init(|| {
            let streams = load_streams(self.raw);
            if streams.is_empty() {
                vec![self.raw.to_vec()]
            } else {
                streams
            }
        })
    }
}

pub trait PdfStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn extract(&self, source: &PdfSource<'_>) -> Result<String, ExtractionError>;
}

#[derive(Clone)]
pub struct PdfExtractor {
    strategies: Arc<[Box<dyn PdfStrategy>]>,
    min_chars: usize,
}

impl PdfExtractor {
    pub fn new(strategies: Vec<Box<dyn PdfStrategy>>, min_chars: usize) -> Self {
        Self {
            strategies: Arc::from(strategies),
            min_chars,
        }
    }

    pub fn with_default_chain(min_chars: usize) -> Self {
        Self::new(
            vec![
                Box::new(TextLayer),
                Box::new(TextOperatorScan),
                Box::new(PrintableRunScan),
                Box::new(LiteralStringScan),
            ],
            min_chars,
        )
    }

    pub fn extract(&self, raw: &[u8]) -> Result<ExtractedText, ExtractionError> {
        let source = PdfSource::new(raw);
        let mut best: Option<(&'static str, usize)> = None;

        for strategy in self.strategies.iter() {
            let name = strategy.name();
            let outcome = catch_unwind(AssertUnwindSafe(|| strategy.extract(&source)))
                .unwrap_or_else(|_| {
                    Err(ExtractionError::Strategy {
                        strategy: name,
                        message: "strategy panicked".to_string(),
                    })
                });

            let raw_text = match outcome {
                Ok(t) => t,
                Err(e) => {
                    warn!(strategy = name, error = %e, "PDF strategy failed, trying next");
                    continue;
                }
            };

            let text = normalize_text(&raw_text);
            let chars = readable_chars(&text);
            if chars >= self.min_chars {
                debug!(strategy = name, chars, "PDF strategy accepted");
                return Ok(ExtractedText {
                    text,
                    strategy: name,
                    readable_chars: chars,
                    invocation: None,
                });
            }

            warn!(
                strategy = name,
                chars,
                min = self.min_chars,
                "PDF strategy below readable-text floor, trying next"
            );
            if best.map_or(true, |(_, c)| chars > c) {
                best = Some((name, chars));
            }
        }

        let (best_strategy, best_chars) = best.unwrap_or(("none", 0));
        Err(ExtractionError::InsufficientText {
            best_strategy,
            best_chars,
            min_chars: self.min_chars,
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Strategies
// ────────────────────────────────────────────────────────────────────────────

pub struct TextLayer;

impl PdfStrategy for TextLayer {
    fn name(&self) -> &'static str {
        "text_layer"
    }

    fn extract(&self, source: &PdfSource<'_>) -> Result<String, ExtractionError> {
        pdf_extract::extract_text_from_mem(source.raw).map_err(|e| ExtractionError::Strategy {
            strategy: self.name(),
            message: e.to_string(),
        })
    }
}

pub struct TextOperatorScan;

impl PdfStrategy for TextOperatorScan {
    fn name(&self) -> &'static str {
        "text_operators"
    }

    fn extract(&self, source: &PdfSource<'_>) -> Result<String, ExtractionError> {
        let mut out = String::new();
        for stream in source.streams() {
            let text = scan_text_operators(stream);
            if !text.trim().is_empty() {
                out.push_str(&text);
                out.push('\n');
            }
        }
        Ok(out)
    }
}

pub struct PrintableRunScan;

impl PdfStrategy for PrintableRunScan {
    fn name(&self) -> &'static str {
        "printable_runs"
    }

    fn extract(&self, source: &PdfSource<'_>) -> Result<String, ExtractionError> {
        let runs: Vec<String> = source
            .streams()
            .iter()
            .flat_map(|s| printable_runs(s, MIN_PRINTABLE_RUN))
            .collect();
        Ok(runs.join("\n"))
    }
}

pub struct LiteralStringScan;

impl PdfStrategy for LiteralStringScan {
    fn name(&self) -> &'static str {
        "literal_strings"
    }

    fn extract(&self, source: &PdfSource<'_>) -> Result<String, ExtractionError> {
        let mut parts = literal_strings(source.raw);
        for stream in source.streams() {
            if stream.as_slice() != source.raw {
                parts.extend(literal_strings(stream));
            }
        }
        Ok(parts.join(" "))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Stream loading
// ────────────────────────────────────────────────────────────────────────────

fn load_streams(raw: &[u8]) -> Vec<Vec<u8>> {
    let parsed = catch_unwind(AssertUnwindSafe(|| lopdf::Document::load_mem(raw)));
    let streams: Vec<Vec<u8>> = match parsed {
        Ok(Ok(doc)) => doc
            .objects
            .values()
            .filter_map(|obj| match obj {
                lopdf::Object::Stream(stream) => Some(
                    stream
                        .decompressed_content()
                        .unwrap_or_else(|_| stream.content.clone()),
                ),
                _ => None,
            })
            .collect(),
        _ => {
            debug!("lopdf could not parse document, scanning raw stream regions");
            RE_STREAM_REGION
                .captures_iter(raw)
                .filter_map(|c| c.get(1).map(|m| m.as_bytes().to_vec()))
                .collect()
        }
    };

    streams.into_iter().filter(|s| !is_binary(s)).collect()
}

fn is_binary(data: &[u8]) -> bool {
    if data.is_empty() {
        return true;
    }
    let non_text = data
        .iter()
        .filter(|&&b| !(b.is_ascii_graphic() || b.is_ascii_whitespace()))
        .count();
    non_text as f64 / data.len() as f64 > MAX_BINARY_RATIO
}

// ────────────────────────────────────────────────────────────────────────────
// Content-stream lexing
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, PartialEq)]
enum Token {
    Str(Vec<u8>),
    ArrayStart,
    ArrayEnd,
    Number(f64),
    Operator(String),
    Other,
}

struct Lexer<'a> {
    data: &'a [u8],
    pos: usize,
}

fn is_delimiter(b: u8) -> bool {
    matches!(b, b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%')
}

fn is_pdf_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\n' | b'\x0c' | b'\0')
}

impl<'a> Lexer<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    fn skip_whitespace_and_comments(&mut self) {
        while let Some(b) = self.peek() {
            if is_pdf_whitespace(b) {
                self.pos += 1;
            } else if b == b'%' {
                while let Some(c) = self.peek() {
                    if c == b'\n' || c == b'\r' {
                        break;
                    }
                    self.pos += 1;
                }
            } else {
                break;
            }
        }
    }

    fn regular_word(&mut self) -> &'a [u8] {
        let data = self.data;
        let start = self.pos;
        while let Some(b) = self.peek() {
            if is_pdf_whitespace(b) || is_delimiter(b) {
                break;
            }
            self.pos += 1;
        }
        &data[start..self.pos]
    }
}

impl Iterator for Lexer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        self.skip_whitespace_and_comments();
        let b = self.peek()?;

        let token = match b {
            b'(' => {
                let (bytes, end) = parse_literal(self.data, self.pos + 1);
                self.pos = end;
                Token::Str(bytes)
            }
            b'<' if self.data.get(self.pos + 1) == Some(&b'<') => {
                self.pos += 2;
                Token::Other
            }
            b'<' => {
                let start = self.pos + 1;
                let end = self.data[start..]
                    .iter()
                    .position(|&c| c == b'>')
                    .map_or(self.data.len(), |p| start + p);
                let bytes = decode_hex(&self.data[start..end]);
                self.pos = (end + 1).min(self.data.len());
                Token::Str(bytes)
            }
            b'>' => {
                self.pos += if self.data.get(self.pos + 1) == Some(&b'>') { 2 } else { 1 };
                Token::Other
            }
            b'[' => {
                self.pos += 1;
                Token::ArrayStart
            }
            b']' => {
                self.pos += 1;
                Token::ArrayEnd
            }
            b'/' => {
                self.pos += 1;
                self.regular_word();
                Token::Other
            }
            b')' | b'{' | b'}' => {
                self.pos += 1;
                Token::Other
            }
            _ => {
                let word = self.regular_word();
                if word.is_empty() {
                    self.pos += 1;
                    Token::Other
                } else if let Some(n) = std::str::from_utf8(word)
                    .ok()
                    .filter(|w| w.starts_with(|c: char| c.is_ascii_digit() || "+-.".contains(c)))
                    .and_then(|w| w.parse::<f64>().ok())
                {
                    Token::Number(n)
                } else {
                    Token::Operator(String::from_utf8_lossy(word).into_owned())
                }
            }
        };

        Some(token)
    }
}

/// Parses a literal string whose opening parenthesis sits just before `start`.
/// Returns the decoded bytes and the position after the closing parenthesis.
fn parse_literal(data: &[u8], start: usize) -> (Vec<u8>, usize) {
    let mut out = Vec::new();
    let mut depth = 1usize;
    let mut i = start;

    while i < data.len() {
        let b = data[i];
        match b {
            b'\\' => {
                i += 1;
                let Some(&next) = data.get(i) else {
                    break;
                };
                match next {
                    b'n' => out.push(b'\n'),
                    b'r' => out.push(b'\r'),
                    b't' => out.push(b'\t'),
                    b'b' => out.push(0x08),
                    b'f' => out.push(0x0c),
                    b'0'..=b'7' => {
                        let mut value: u32 = 0;
                        let mut digits = 0;
                        while digits < 3 {
                            match data.get(i) {
                                Some(&d @ b'0'..=b'7') => {
                                    value = value * 8 + (d - b'0') as u32;
                                    i += 1;
                                    digits += 1;
                                }
                                _ => break,
                            }
                        }
                        out.push((value & 0xff) as u8);
                        continue;
                    }
                    // line continuation
                    b'\r' => {
                        if data.get(i + 1) == Some(&b'\n') {
                            i += 1;
                        }
                    }
                    b'\n' => {}
                    other => out.push(other),
                }
                i += 1;
            }
            b'(' => {
                depth += 1;
                out.push(b);
                i += 1;
            }
            b')' => {
                depth -= 1;
                i += 1;
                if depth == 0 {
                    return (out, i);
                }
                out.push(b);
            }
            _ => {
                out.push(b);
                i += 1;
            }
        }
    }

    (out, data.len())
}

fn decode_hex(hex: &[u8]) -> Vec<u8> {
    let digits: Vec<u8> = hex
        .iter()
        .filter_map(|&c| (c as char).to_digit(16).map(|d| d as u8))
        .collect();
    digits
        .chunks(2)
        .map(|pair| (pair[0] << 4) | pair.get(1).copied().unwrap_or(0))
        .collect()
}

/// Decodes PDF string bytes: UTF-16BE when BOM-prefixed, Latin-1 otherwise.
/// Control characters other than newlines are dropped.
fn decode_pdf_string(bytes: &[u8]) -> String {
    if bytes.starts_with(&[0xfe, 0xff]) {
        let units: Vec<u16> = bytes[2..]
            .chunks(2)
            .map(|c| u16::from_be_bytes([c[0], c.get(1).copied().unwrap_or(0)]))
            .collect();
        return String::from_utf16_lossy(&units)
            .chars()
            .filter(|c| !c.is_control() || *c == '\n')
            .collect();
    }

    bytes
        .iter()
        .map(|&b| b as char)
        .filter(|c| !c.is_control() || *c == '\n')
        .collect()
}

fn looks_textual(s: &str) -> bool {
    let total = s.chars().count();
    if total == 0 {
        return false;
    }
    let printable = s
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_ascii_punctuation() || *c == ' ')
        .count();
    printable as f64 / total as f64 >= 0.8
}

fn push_break(out: &mut String, sep: char) {
    match out.chars().last() {
        None | Some('\n') => {}
        Some(' ') if sep == ' ' => {}
        Some(' ') => {
            out.pop();
            out.push(sep);
        }
        Some(_) => out.push(sep),
    }
}

/// Collects the text shown by `Tj`, `TJ`, `'` and `"` operators inside
/// `BMC`/`BDC` ... `EMC` marked-content blocks. A stream with no marked text
/// is read whole.
fn scan_text_operators(content: &[u8]) -> String {
    let mut marked = String::new();
    let mut unmarked = String::new();
    let mut depth = 0usize;
    let mut last_string: Option<String> = None;
    let mut numbers: Vec<f64> = Vec::new();
    let mut in_array = false;
    let mut array_text = String::new();
    let mut pending_array: Option<String> = None;

    for token in Lexer::new(content) {
        match token {
            Token::Str(bytes) => {
                let s = decode_pdf_string(&bytes);
                if in_array {
                    array_text.push_str(&s);
                } else {
                    last_string = Some(s);
                }
            }
            Token::Number(n) if in_array => {
                if n < TJ_WORD_GAP && !array_text.ends_with(' ') {
                    array_text.push(' ');
                }
            }
            Token::Number(n) => numbers.push(n),
            Token::ArrayStart => {
                in_array = true;
                array_text.clear();
            }
            Token::ArrayEnd => {
                in_array = false;
                pending_array = Some(std::mem::take(&mut array_text));
            }
            Token::Operator(op) => {
                let out = if depth > 0 { &mut marked } else { &mut unmarked };
                match op.as_str() {
                    "BMC" | "BDC" => depth += 1,
                    "EMC" => depth = depth.saturating_sub(1),
                    "Tj" => {
                        if let Some(s) = last_string.take().filter(|s| looks_textual(s)) {
                            out.push_str(&s);
                        }
                    }
                    "'" | "\"" => {
                        push_break(out, '\n');
                        if let Some(s) = last_string.take().filter(|s| looks_textual(s)) {
                            out.push_str(&s);
                        }
                    }
                    "TJ" => {
                        if let Some(s) = pending_array.take().filter(|s| looks_textual(s)) {
                            out.push_str(&s);
                        }
                    }
                    "Td" | "TD" => {
                        let dy = numbers.last().copied().unwrap_or(0.0);
                        push_break(out, if dy != 0.0 { '\n' } else { ' ' });
                    }
                    "T*" | "Tm" | "ET" => push_break(out, '\n'),
                    _ => {}
                }
                last_string = None;
                pending_array = None;
                numbers.clear();
            }
            Token::Other => {}
        }
    }

    if marked.trim().is_empty() {
        unmarked
    } else {
        marked
    }
}

fn printable_runs(data: &[u8], min_run: usize) -> Vec<String> {
    data.split(|b| !(b.is_ascii_graphic() || *b == b' ' || *b == b'\t'))
        .filter(|run| run.len() >= min_run)
        .filter(|run| run.iter().filter(|b| b.is_ascii_alphabetic()).count() >= 3)
        .map(|run| String::from_utf8_lossy(run).trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn literal_strings(data: &[u8]) -> Vec<String> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < data.len() {
        if data[i] == b'(' {
            let (bytes, end) = parse_literal(data, i + 1);
            let s = decode_pdf_string(&bytes);
            if s.chars().filter(|c| c.is_alphabetic()).count() >= 2 && looks_textual(&s) {
                out.push(s.trim().to_string());
            }
            i = end;
        } else {
            i += 1;
        }
    }
    out
}
