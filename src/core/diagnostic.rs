/// Kinds of local, recoverable problems noticed while scanning and parsing.
///
/// Diagnostics are attached to the object they were found in and later
/// surfaced as issues by the `stream` and `xref` validation rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    /// A byte that cannot start any token (stray `)`, `>`, `{`, `}`)
    UnknownToken,
    /// A backslash escape that is not defined for literal strings
    MalformedEscape,
    /// A non-hex, non-whitespace byte inside a hex string
    InvalidHexDigit,
    /// A literal or hex string ran into end of input
    UnterminatedString,
    /// An array or dictionary ran into end of input
    UnterminatedContainer,
    /// A token that is not valid in its position (e.g. a number as a key)
    UnexpectedToken,
    /// Nesting deeper than the parser is willing to follow
    DepthExceeded,
    /// `/Length` did not match the actual stream extent
    LengthMismatch,
    /// `/Length` was an indirect reference and could not be trusted
    LengthUnresolved,
    /// Stream dictionary without `/Length`
    MissingLength,
    /// `endstream` keyword could not be found at all
    MissingEndstream,
    /// Filter is recognised but not decoded by this crate
    UnsupportedFilter,
    /// A supported filter failed on the stream data
    DecodeFailed,
    /// Object body without a closing `endobj`
    MissingEndobj,
}

impl DiagnosticKind {
    /// Returns true for problems that concern stream payloads.
    pub fn is_stream_related(&self) -> bool {
        matches!(
            self,
            DiagnosticKind::LengthMismatch
                | DiagnosticKind::LengthUnresolved
                | DiagnosticKind::MissingLength
                | DiagnosticKind::MissingEndstream
                | DiagnosticKind::UnsupportedFilter
                | DiagnosticKind::DecodeFailed
        )
    }
}

/// A recoverable problem with its byte offset in the scanned buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub offset: usize,
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, offset: usize, message: impl Into<String>) -> Self {
        Diagnostic {
            kind,
            offset,
            message: message.into(),
        }
    }
}
