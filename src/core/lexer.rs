use super::diagnostic::{Diagnostic, DiagnosticKind};

/// Structural keywords of the PDF file syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Obj,
    EndObj,
    Stream,
    EndStream,
    XRef,
    Trailer,
    StartXRef,
    /// The `R` of an indirect reference
    R,
}

impl Keyword {
    fn from_bytes(word: &[u8]) -> Option<Keyword> {
        match word {
            b"obj" => Some(Keyword::Obj),
            b"endobj" => Some(Keyword::EndObj),
            b"stream" => Some(Keyword::Stream),
            b"endstream" => Some(Keyword::EndStream),
            b"xref" => Some(Keyword::XRef),
            b"trailer" => Some(Keyword::Trailer),
            b"startxref" => Some(Keyword::StartXRef),
            b"R" => Some(Keyword::R),
            _ => None,
        }
    }
}

/// PDF token types returned by the Lexer.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// End of input marker
    EOF,

    /// Boolean value
    Boolean(bool),

    /// Null value
    Null,

    /// Integer value (no decimal point)
    Integer(i64),

    /// Real value
    Real(f64),

    /// String value (from literal strings like (hello))
    String(Vec<u8>),

    /// Hex string value (from hex strings like <48656c6c6f>)
    HexString(Vec<u8>),

    /// Name value (from /Name), `#xx` escapes decoded
    Name(String),

    /// File-structure keyword (obj, endobj, stream, ...)
    Keyword(Keyword),

    /// Any other bare word
    Command(String),

    /// Array start '['
    ArrayStart,

    /// Array end ']'
    ArrayEnd,

    /// Dictionary start '<<'
    DictStart,

    /// Dictionary end '>>'
    DictEnd,

    /// A byte that cannot start a token; scanning resumes after it
    Unknown(u8),
}

impl Token {
    pub fn is_keyword(&self, keyword: Keyword) -> bool {
        matches!(self, Token::Keyword(k) if *k == keyword)
    }
}

/// A token together with the byte range it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub start: usize,
    pub end: usize,
}

/// PDF Lexer for tokenizing PDF syntax.
///
/// The lexer works directly on the in-memory file buffer and never fails:
/// malformed input produces `Token::Unknown` placeholders and diagnostics,
/// and scanning resynchronises at the next byte.
///
/// The lexer handles:
/// - Whitespace and comment skipping
/// - Number parsing (integers and reals)
/// - String parsing (literal and hexadecimal)
/// - Name parsing
/// - Keywords and bare commands
/// - Special characters ([, ], <<, >>)
pub struct Lexer<'a> {
    /// The input buffer
    data: &'a [u8],

    /// Current read position
    pos: usize,

    /// Buffer for building strings
    str_buf: Vec<u8>,

    /// Problems noticed so far
    diagnostics: Vec<Diagnostic>,
}

impl<'a> Lexer<'a> {
    /// Creates a new Lexer positioned at the start of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self::at(data, 0)
    }

    /// Creates a new Lexer positioned at `pos`.
    pub fn at(data: &'a [u8], pos: usize) -> Self {
        Lexer {
            data,
            pos: pos.min(data.len()),
            str_buf: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn set_position(&mut self, pos: usize) {
        self.pos = pos.min(self.data.len());
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Removes and returns the diagnostics collected so far.
    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    pub(crate) fn push_diagnostic(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    fn current(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    fn peek(&self, ahead: usize) -> Option<u8> {
        self.data.get(self.pos + ahead).copied()
    }

    /// Checks if a byte is whitespace per ISO 32000-1 table 1.
    ///
    /// PDF whitespace: NUL, TAB, LF, FF, CR, SPACE
    pub fn is_whitespace(ch: u8) -> bool {
        matches!(ch, 0x00 | 0x09 | 0x0A | 0x0C | 0x0D | 0x20)
    }

    /// Checks if a byte is a delimiter per ISO 32000-1 table 2.
    ///
    /// PDF delimiters: ( ) < > [ ] { } / %
    pub fn is_delimiter(ch: u8) -> bool {
        matches!(
            ch,
            b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
        )
    }

    /// Checks if a byte is special (whitespace or delimiter).
    pub fn is_special(ch: u8) -> bool {
        Self::is_whitespace(ch) || Self::is_delimiter(ch)
    }

    /// Converts a hex character to its numeric value.
    fn to_hex_digit(ch: u8) -> Option<u8> {
        match ch {
            b'0'..=b'9' => Some(ch - b'0'),
            b'A'..=b'F' => Some(ch - b'A' + 10),
            b'a'..=b'f' => Some(ch - b'a' + 10),
            _ => None,
        }
    }

    /// Skips whitespace and comments.
    pub fn skip_whitespace_and_comments(&mut self) {
        let mut comment = false;

        while let Some(ch) = self.current() {
            if comment {
                if ch == b'\n' || ch == b'\r' {
                    comment = false;
                }
            } else if ch == b'%' {
                comment = true;
            } else if !Self::is_whitespace(ch) {
                break;
            }
            self.pos += 1;
        }
    }

    /// Gets the next token from the buffer together with its byte range.
    pub fn next_token(&mut self) -> Spanned {
        self.skip_whitespace_and_comments();

        let start = self.pos;
        let token = match self.current() {
            None => Token::EOF,

            Some(b'0'..=b'9' | b'+' | b'-' | b'.') => self.get_number(),

            Some(b'(') => self.get_string(),

            Some(b'/') => self.get_name(),

            Some(b'[') => {
                self.pos += 1;
                Token::ArrayStart
            }

            Some(b']') => {
                self.pos += 1;
                Token::ArrayEnd
            }

            Some(b'<') => {
                if self.peek(1) == Some(b'<') {
                    self.pos += 2;
                    Token::DictStart
                } else {
                    self.pos += 1;
                    self.get_hex_string()
                }
            }

            Some(b'>') => {
                if self.peek(1) == Some(b'>') {
                    self.pos += 2;
                    Token::DictEnd
                } else {
                    self.unknown(b'>')
                }
            }

            Some(ch @ (b')' | b'{' | b'}')) => self.unknown(ch),

            Some(_) => self.get_command(),
        };

        Spanned {
            token,
            start,
            end: self.pos,
        }
    }

    fn unknown(&mut self, ch: u8) -> Token {
        self.diagnostics.push(Diagnostic::new(
            DiagnosticKind::UnknownToken,
            self.pos,
            format!("unexpected byte 0x{:02X} ('{}')", ch, ch as char),
        ));
        self.pos += 1;
        Token::Unknown(ch)
    }

    /// Parses a number token.
    ///
    /// Integers and reals are kept apart so that the parser can recognise
    /// `<int> <int> R` and `<int> <int> obj` sequences. Double signs and
    /// stray minus signs inside the digits are ignored, as PDF readers do.
    fn get_number(&mut self) -> Token {
        let start = self.pos;
        let mut negative = false;

        match self.current() {
            Some(b'-') => {
                negative = true;
                self.pos += 1;
                if self.current() == Some(b'-') {
                    self.pos += 1;
                }
            }
            Some(b'+') => self.pos += 1,
            _ => {}
        }

        let mut int_part: i64 = 0;
        let mut overflow = false;
        let mut digits = 0usize;
        let mut fraction_digits = 0.0f64;
        let mut divide_by = 1.0f64;
        let mut is_real = false;

        while let Some(ch) = self.current() {
            match ch {
                b'0'..=b'9' => {
                    let digit = (ch - b'0') as i64;
                    digits += 1;
                    if is_real {
                        divide_by *= 10.0;
                        fraction_digits = fraction_digits * 10.0 + digit as f64;
                    } else if let Some(v) =
                        int_part.checked_mul(10).and_then(|v| v.checked_add(digit))
                    {
                        int_part = v;
                    } else {
                        overflow = true;
                    }
                }
                b'.' if !is_real => is_real = true,
                b'-' if digits > 0 => {}
                _ => break,
            }
            self.pos += 1;
        }

        if digits == 0 {
            // A lone sign or dot followed by a delimiter reads as zero; anything
            // else is a bare word that happens to start like a number.
            if self.current().is_none_or(Self::is_special) {
                return Token::Integer(0);
            }
            self.pos = start;
            return self.get_command();
        }

        if is_real || overflow {
            let magnitude = if overflow {
                Self::parse_lossy_float(&self.data[start..self.pos])
            } else {
                int_part as f64 + fraction_digits / divide_by
            };
            let value = if negative { -magnitude.abs() } else { magnitude.abs() };
            Token::Real(value)
        } else if negative {
            Token::Integer(-int_part)
        } else {
            Token::Integer(int_part)
        }
    }

    fn parse_lossy_float(bytes: &[u8]) -> f64 {
        let text: String = bytes
            .iter()
            .filter(|b| b.is_ascii_digit() || **b == b'.')
            .map(|b| *b as char)
            .collect();
        text.parse().unwrap_or(0.0)
    }

    /// Parses a literal string token.
    ///
    /// Handles nested parentheses and escape sequences.
    fn get_string(&mut self) -> Token {
        let open = self.pos;
        let mut num_paren = 1;
        self.str_buf.clear();
        self.pos += 1; // Consume opening '('

        loop {
            let Some(ch) = self.current() else {
                self.diagnostics.push(Diagnostic::new(
                    DiagnosticKind::UnterminatedString,
                    open,
                    "literal string runs to end of input",
                ));
                break;
            };
            self.pos += 1;

            match ch {
                b'(' => {
                    num_paren += 1;
                    self.str_buf.push(b'(');
                }

                b')' => {
                    num_paren -= 1;
                    if num_paren == 0 {
                        break;
                    }
                    self.str_buf.push(b')');
                }

                b'\\' => {
                    let Some(esc) = self.current() else {
                        continue;
                    };
                    self.pos += 1;

                    match esc {
                        b'n' => self.str_buf.push(b'\n'),
                        b'r' => self.str_buf.push(b'\r'),
                        b't' => self.str_buf.push(b'\t'),
                        b'b' => self.str_buf.push(0x08),
                        b'f' => self.str_buf.push(0x0C),
                        b'\\' | b'(' | b')' => self.str_buf.push(esc),
                        b'0'..=b'7' => {
                            // Octal escape \ddd (1-3 digits), high-order overflow ignored
                            let mut x = (esc - b'0') as u32;
                            for _ in 0..2 {
                                match self.current() {
                                    Some(d @ b'0'..=b'7') => {
                                        x = (x << 3) + (d - b'0') as u32;
                                        self.pos += 1;
                                    }
                                    _ => break,
                                }
                            }
                            self.str_buf.push((x & 0xFF) as u8);
                        }
                        b'\r' => {
                            // Line continuation, CR LF counts as one EOL
                            if self.current() == Some(b'\n') {
                                self.pos += 1;
                            }
                        }
                        b'\n' => {}
                        other => {
                            self.diagnostics.push(Diagnostic::new(
                                DiagnosticKind::MalformedEscape,
                                self.pos - 2,
                                format!("undefined escape sequence '\\{}'", other as char),
                            ));
                            self.str_buf.push(other);
                        }
                    }
                }

                _ => self.str_buf.push(ch),
            }
        }

        Token::String(self.str_buf.clone())
    }

    /// Parses a hex string token (the opening '<' is already consumed).
    ///
    /// Whitespace is ignored and an odd final digit is padded with 0.
    fn get_hex_string(&mut self) -> Token {
        let open = self.pos.saturating_sub(1);
        self.str_buf.clear();
        let mut first_digit: Option<u8> = None;
        let mut reported_invalid = false;

        loop {
            let Some(ch) = self.current() else {
                self.diagnostics.push(Diagnostic::new(
                    DiagnosticKind::UnterminatedString,
                    open,
                    "hex string runs to end of input",
                ));
                break;
            };
            self.pos += 1;

            if ch == b'>' {
                break;
            }
            if Self::is_whitespace(ch) {
                continue;
            }

            match Self::to_hex_digit(ch) {
                Some(digit) => match first_digit.take() {
                    Some(high) => self.str_buf.push((high << 4) | digit),
                    None => first_digit = Some(digit),
                },
                None => {
                    if !reported_invalid {
                        reported_invalid = true;
                        self.diagnostics.push(Diagnostic::new(
                            DiagnosticKind::InvalidHexDigit,
                            self.pos - 1,
                            format!("invalid hex digit 0x{:02X} in hex string", ch),
                        ));
                    }
                }
            }
        }

        if let Some(high) = first_digit {
            self.str_buf.push(high << 4);
        }

        Token::HexString(self.str_buf.clone())
    }

    /// Parses a name token.
    ///
    /// Names start with '/' and continue until whitespace or delimiter.
    /// Handles '#' escape sequences like #20 for space.
    fn get_name(&mut self) -> Token {
        self.str_buf.clear();
        self.pos += 1; // Skip the initial '/'

        while let Some(ch) = self.current() {
            if Self::is_special(ch) {
                break;
            }
            self.pos += 1;

            if ch == b'#' {
                let high = self.current().and_then(Self::to_hex_digit);
                let low = self.peek(1).and_then(Self::to_hex_digit);
                if let (Some(high), Some(low)) = (high, low) {
                    self.str_buf.push((high << 4) | low);
                    self.pos += 2;
                    continue;
                }
            }
            self.str_buf.push(ch);
        }

        Token::Name(String::from_utf8_lossy(&self.str_buf).into_owned())
    }

    /// Parses a keyword or command token.
    ///
    /// Reads regular characters up to the next special character and maps
    /// the structural keywords and `true`/`false`/`null`.
    fn get_command(&mut self) -> Token {
        let start = self.pos;
        while let Some(ch) = self.current() {
            if Self::is_special(ch) {
                break;
            }
            self.pos += 1;
        }
        let word = &self.data[start..self.pos];

        match word {
            b"true" => Token::Boolean(true),
            b"false" => Token::Boolean(false),
            b"null" => Token::Null,
            _ => match Keyword::from_bytes(word) {
                Some(keyword) => Token::Keyword(keyword),
                None => Token::Command(String::from_utf8_lossy(word).into_owned()),
            },
        }
    }
}
