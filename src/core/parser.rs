use super::decode::{self, DecodeError};
use super::diagnostic::{Diagnostic, DiagnosticKind};
use super::lexer::{Keyword, Lexer, Spanned, Token};
use super::value::{Dictionary, ObjectId, PdfString, StreamValue, Value};
use memchr::memmem;

/// Maximum nesting of arrays and dictionaries the parser follows.
pub const MAX_DEPTH: usize = 256;

/// PDF Parser for building values from tokens.
///
/// The parser keeps a 2-token lookahead buffer so that it can tell an
/// indirect reference (`N G R`) apart from two adjacent integers and detect
/// a dictionary that is followed by `stream`.
///
/// Parsing never fails. Malformed input is recovered from locally and the
/// problem is recorded as a [`Diagnostic`].
pub struct Parser<'a> {
    /// The lexer that provides tokens
    lexer: Lexer<'a>,

    /// First lookahead token
    buf1: Spanned,

    /// Second lookahead token
    buf2: Spanned,

    /// Decode stream payloads, capped at this many bytes
    decode_limit: Option<usize>,
}

impl<'a> Parser<'a> {
    /// Creates a parser reading from `offset` in `data`.
    pub fn new(data: &'a [u8], offset: usize) -> Self {
        let mut lexer = Lexer::at(data, offset);
        let buf1 = lexer.next_token();
        let buf2 = lexer.next_token();
        Parser {
            lexer,
            buf1,
            buf2,
            decode_limit: None,
        }
    }

    /// Enables filter decoding of stream payloads with the given size cap.
    pub fn with_stream_decoding(mut self, limit: Option<usize>) -> Self {
        self.decode_limit = limit;
        self
    }

    pub fn data(&self) -> &'a [u8] {
        self.lexer.data()
    }

    /// The next unconsumed token.
    pub fn peek(&self) -> &Spanned {
        &self.buf1
    }

    /// The token after [`peek`](Self::peek).
    pub fn peek_second(&self) -> &Spanned {
        &self.buf2
    }

    /// Start offset of the next unconsumed token.
    pub fn position(&self) -> usize {
        self.buf1.start
    }

    /// Consumes and returns the next raw token.
    pub fn next_token(&mut self) -> Spanned {
        let next = self.lexer.next_token();
        let second = std::mem::replace(&mut self.buf2, next);
        std::mem::replace(&mut self.buf1, second)
    }

    /// Restarts parsing at `offset`.
    pub fn seek(&mut self, offset: usize) {
        self.lexer.set_position(offset);
        self.refill();
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        self.lexer.take_diagnostics()
    }

    fn refill(&mut self) {
        self.buf1 = self.lexer.next_token();
        self.buf2 = self.lexer.next_token();
    }

    fn shift(&mut self) {
        self.next_token();
    }

    fn diagnostic(&mut self, kind: DiagnosticKind, offset: usize, message: impl Into<String>) {
        self.lexer
            .push_diagnostic(Diagnostic::new(kind, offset, message));
    }

    /// Returns true when the lookahead token ends the current value:
    /// end of input or a file-structure keyword other than `R`.
    fn at_structural_boundary(&self) -> bool {
        match &self.buf1.token {
            Token::EOF => true,
            Token::Keyword(k) => *k != Keyword::R,
            _ => false,
        }
    }

    /// Parses one complete value.
    ///
    /// Handles:
    /// - Arrays: [ obj1 obj2 ... ]
    /// - Dictionaries: << /Key1 value1 /Key2 value2 ... >>
    /// - Streams: a top-level dictionary followed by `stream`
    /// - Indirect references: N1 N2 R
    /// - Simple values: numbers, strings, names, booleans, null
    ///
    /// Where no value can start (end of input, `endobj`, ...) this returns
    /// `Null` without consuming anything.
    pub fn parse_value(&mut self) -> Value {
        self.parse_value_at(0)
    }

    fn parse_value_at(&mut self, depth: usize) -> Value {
        while let Token::Unknown(_) = self.buf1.token {
            self.shift();
        }

        if self.at_structural_boundary() {
            let offset = self.buf1.start;
            if self.buf1.token != Token::EOF {
                self.diagnostic(
                    DiagnosticKind::UnexpectedToken,
                    offset,
                    "expected a value, found a file-structure keyword",
                );
            }
            return Value::Null;
        }

        let Spanned { token, start, .. } = self.next_token();

        match token {
            Token::ArrayStart | Token::DictStart if depth >= MAX_DEPTH => {
                self.diagnostic(
                    DiagnosticKind::DepthExceeded,
                    start,
                    format!("nesting deeper than {} levels", MAX_DEPTH),
                );
                self.skip_container();
                Value::Null
            }

            Token::ArrayStart => self.parse_array(start, depth + 1),

            Token::DictStart => self.parse_dictionary(start, depth + 1),

            Token::Integer(n) => {
                // Check if this is an indirect reference: N1 N2 R
                if let Token::Integer(generation) = self.buf1.token {
                    if self.buf2.token.is_keyword(Keyword::R) {
                        if let (Ok(number), Ok(generation)) =
                            (u32::try_from(n), u16::try_from(generation))
                        {
                            self.shift(); // Consume generation number
                            self.shift(); // Consume 'R'
                            return Value::Reference(ObjectId::new(number, generation));
                        }
                    }
                }
                Value::Number(n as f64)
            }

            Token::Real(n) => Value::Number(n),
            Token::Boolean(b) => Value::Boolean(b),
            Token::Null => Value::Null,
            Token::String(s) => Value::String(PdfString::literal(s)),
            Token::HexString(s) => Value::String(PdfString::hex(s)),
            Token::Name(n) => Value::Name(n),

            Token::Command(word) => {
                self.diagnostic(
                    DiagnosticKind::UnexpectedToken,
                    start,
                    format!("bare word '{}' where a value was expected", word),
                );
                Value::Null
            }

            Token::ArrayEnd | Token::DictEnd | Token::Keyword(_) => {
                self.diagnostic(
                    DiagnosticKind::UnexpectedToken,
                    start,
                    "unbalanced closing token",
                );
                Value::Null
            }

            Token::Unknown(_) | Token::EOF => Value::Null,
        }
    }

    /// Parses an array after its `[`.
    fn parse_array(&mut self, open: usize, depth: usize) -> Value {
        let mut array = Vec::new();

        loop {
            match &self.buf1.token {
                Token::ArrayEnd => {
                    self.shift(); // Consume the ']'
                    break;
                }
                Token::Unknown(_) => self.shift(),
                Token::DictEnd => {
                    let offset = self.buf1.start;
                    self.diagnostic(
                        DiagnosticKind::UnexpectedToken,
                        offset,
                        "'>>' inside array",
                    );
                    self.shift();
                }
                _ if self.at_structural_boundary() => {
                    self.diagnostic(
                        DiagnosticKind::UnterminatedContainer,
                        open,
                        "array is missing its closing ']'",
                    );
                    break;
                }
                _ => array.push(self.parse_value_at(depth)),
            }
        }

        Value::Array(array)
    }

    /// Parses a dictionary after its `<<`, promoting it to a stream when
    /// `stream` follows at the top level.
    fn parse_dictionary(&mut self, open: usize, depth: usize) -> Value {
        let mut dict = Dictionary::new();

        loop {
            match &self.buf1.token {
                Token::DictEnd => break,
                Token::Unknown(_) => {
                    self.shift();
                    continue;
                }
                _ if self.at_structural_boundary() => {
                    self.diagnostic(
                        DiagnosticKind::UnterminatedContainer,
                        open,
                        "dictionary is missing its closing '>>'",
                    );
                    return Value::Dictionary(dict);
                }
                _ => {}
            }

            // The key must be a name
            let key = match &self.buf1.token {
                Token::Name(name) => name.clone(),
                _ => {
                    let offset = self.buf1.start;
                    self.diagnostic(
                        DiagnosticKind::UnexpectedToken,
                        offset,
                        "dictionary key is not a name",
                    );
                    // Skip the whole stray value so a nested container does
                    // not desynchronise key/value pairing.
                    self.parse_value_at(depth);
                    continue;
                }
            };
            self.shift(); // Consume the key

            if self.buf1.token == Token::DictEnd {
                dict.insert(key, Value::Null);
                break;
            }
            if self.at_structural_boundary() {
                dict.insert(key, Value::Null);
                continue;
            }

            let value = self.parse_value_at(depth);
            dict.insert(key, value);
        }

        // buf1 is '>>'. A stream keyword in buf2 means the lexer sits right
        // after `stream`, so the payload is read from there without shifting.
        if depth == 1 && self.buf2.token.is_keyword(Keyword::Stream) {
            let after_keyword = self.buf2.end;
            return self.parse_stream(dict, after_keyword);
        }

        self.shift(); // Consume the '>>'
        Value::Dictionary(dict)
    }

    /// Reads a stream payload that starts after the `stream` keyword.
    ///
    /// `/Length` is trusted only when it is a direct non-negative integer and
    /// `endstream` follows the counted bytes. Otherwise the payload extends
    /// to the next `endstream`.
    fn parse_stream(&mut self, dict: Dictionary, after_keyword: usize) -> Value {
        let data = self.lexer.data();
        let data_start = skip_stream_eol(data, after_keyword);

        let declared = dict.get("Length");
        let direct_length = declared
            .and_then(Value::as_integer)
            .and_then(|n| usize::try_from(n).ok());

        let counted_end = direct_length
            .and_then(|len| data_start.checked_add(len))
            .filter(|end| *end <= data.len())
            .filter(|end| endstream_follows(data, *end));

        let (payload_end, resume_at) = match counted_end {
            Some(end) => {
                let keyword = skip_whitespace(data, end);
                (end, keyword + b"endstream".len())
            }
            None => {
                let scanned = scan_for_endstream(data, data_start);
                match declared {
                    Some(Value::Reference(id)) => self.diagnostic(
                        DiagnosticKind::LengthUnresolved,
                        data_start,
                        format!("/Length is the indirect reference {}", id),
                    ),
                    Some(_) => {
                        let found = scanned.map(|(end, _)| end - data_start);
                        self.diagnostic(
                            DiagnosticKind::LengthMismatch,
                            data_start,
                            match (direct_length, found) {
                                (Some(len), Some(actual)) => format!(
                                    "/Length {} does not match the {} bytes before endstream",
                                    len, actual
                                ),
                                _ => "/Length is not a usable byte count".to_string(),
                            },
                        );
                    }
                    None => self.diagnostic(
                        DiagnosticKind::MissingLength,
                        data_start,
                        "stream dictionary has no /Length",
                    ),
                }

                match scanned {
                    Some(found) => found,
                    None => {
                        self.diagnostic(
                            DiagnosticKind::MissingEndstream,
                            data_start,
                            "no endstream keyword after stream data",
                        );
                        let end = memmem::find(&data[data_start..], b"endobj")
                            .map(|p| trim_trailing_eol(data, data_start, data_start + p))
                            .unwrap_or(data.len());
                        (end, end)
                    }
                }
            }
        };

        let raw_data = data[data_start..payload_end].to_vec();
        let decoded_data = self.decode_limit.and_then(|limit| {
            match decode::decode_stream(&dict, &raw_data, limit) {
                Ok(decoded) => Some(decoded),
                Err(err) => {
                    let kind = match err {
                        DecodeError::Failed(_) => DiagnosticKind::DecodeFailed,
                        DecodeError::Unsupported(_) | DecodeError::ImageCodec(_) => {
                            DiagnosticKind::UnsupportedFilter
                        }
                    };
                    self.diagnostic(kind, data_start, err.to_string());
                    None
                }
            }
        });

        self.seek(resume_at);

        Value::Stream(StreamValue {
            dict,
            raw_data,
            decoded_data,
        })
    }

    /// Skips a container whose opening token was just consumed.
    fn skip_container(&mut self) {
        let mut level = 1usize;
        while level > 0 {
            match self.next_token().token {
                Token::ArrayStart | Token::DictStart => level += 1,
                Token::ArrayEnd | Token::DictEnd => level -= 1,
                Token::EOF => break,
                _ => {}
            }
        }
    }
}

/// Skips the end-of-line marker that follows the `stream` keyword.
///
/// Tolerates stray spaces before the EOL and a bare CR.
fn skip_stream_eol(data: &[u8], mut pos: usize) -> usize {
    let start = pos;
    while matches!(data.get(pos), Some(b' ' | b'\t')) {
        pos += 1;
    }
    match data.get(pos) {
        Some(b'\r') if data.get(pos + 1) == Some(&b'\n') => pos + 2,
        Some(b'\r' | b'\n') => pos + 1,
        _ => start,
    }
}

fn skip_whitespace(data: &[u8], mut pos: usize) -> usize {
    while data.get(pos).is_some_and(|b| Lexer::is_whitespace(*b)) {
        pos += 1;
    }
    pos
}

fn endstream_follows(data: &[u8], end: usize) -> bool {
    data[skip_whitespace(data, end)..].starts_with(b"endstream")
}

/// Finds the next `endstream` at or after `from`. Returns the payload end
/// (with one trailing EOL trimmed) and the offset just past the keyword.
fn scan_for_endstream(data: &[u8], from: usize) -> Option<(usize, usize)> {
    let keyword = from + memmem::find(&data[from..], b"endstream")?;
    Some((
        trim_trailing_eol(data, from, keyword),
        keyword + b"endstream".len(),
    ))
}

fn trim_trailing_eol(data: &[u8], floor: usize, mut end: usize) -> usize {
    if end > floor && data[end - 1] == b'\n' {
        end -= 1;
    }
    if end > floor && data[end - 1] == b'\r' {
        end -= 1;
    }
    end
}
