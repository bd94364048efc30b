use super::error::{PDFError, PDFResult};
use super::lexer::{Keyword, Lexer, Token};
use super::locator::LocatedObject;
use super::parser::Parser;
use super::value::{Dictionary, ObjectId, Value};
use memchr::memmem;
use rustc_hash::FxHashSet;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Cross-reference table entry.
///
/// Each entry describes where an indirect object is stored, or that its
/// object number is free.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefEntry {
    /// Free entry - object number is available for reuse
    Free { next_free: u32, generation: u16 },

    /// In-use entry - object is stored uncompressed at the given offset
    InUse { offset: usize, generation: u16 },

    /// Compressed entry - object is stored in an object stream
    Compressed { stream: u32, index: u32 },
}

impl XRefEntry {
    /// Returns true if this entry is free.
    pub fn is_free(&self) -> bool {
        matches!(self, XRefEntry::Free { .. })
    }

    /// Returns the generation number for this entry.
    pub fn generation(&self) -> u16 {
        match self {
            XRefEntry::Free { generation, .. } => *generation,
            XRefEntry::InUse { generation, .. } => *generation,
            XRefEntry::Compressed { .. } => 0,
        }
    }
}

/// How a section was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefKind {
    /// Classic `xref` table followed by `trailer`
    Table,
    /// `/Type /XRef` stream (PDF 1.5+)
    Stream,
}

/// One cross-reference section of the `/Prev` chain.
#[derive(Debug, Clone, PartialEq)]
pub struct XRefSection {
    pub offset: usize,
    pub kind: XRefKind,
    pub entries: Vec<(u32, XRefEntry)>,
    pub trailer: Dictionary,
}

impl XRefSection {
    fn prev(&self) -> Option<usize> {
        self.trailer
            .get_integer("Prev")
            .and_then(|p| usize::try_from(p).ok())
    }

    fn xref_stm(&self) -> Option<usize> {
        self.trailer
            .get_integer("XRefStm")
            .and_then(|p| usize::try_from(p).ok())
    }
}

/// Result of walking the cross-reference chain.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XRefResolution {
    /// Sections in the order they were read (most recent first)
    pub sections: Vec<XRefSection>,

    /// Entry per object number; the most recent section wins
    pub entries: BTreeMap<u32, XRefEntry>,

    /// Union of all trailers; the most recent keys win
    pub trailer: Dictionary,

    /// Why the chain could not be read, if it could not
    pub failure: Option<String>,

    /// A `/Prev` offset was visited twice
    pub loop_detected: bool,

    /// The walk stopped at the hop limit
    pub hop_limit_hit: bool,

    /// `startxref` was wrong and the section was found at this offset instead
    pub repaired_start: Option<usize>,
}

impl XRefResolution {
    /// Returns the merged entry for `number`.
    pub fn entry(&self, number: u32) -> Option<&XRefEntry> {
        self.entries.get(&number)
    }

    /// The declared offset of an in-use object with this identity.
    pub fn declared_offset(&self, id: ObjectId) -> Option<usize> {
        match self.entries.get(&id.number)? {
            XRefEntry::InUse { offset, generation } if *generation == id.generation => {
                Some(*offset)
            }
            _ => None,
        }
    }

    fn merge(&mut self, section: XRefSection, with_trailer: bool) {
        for (number, entry) in &section.entries {
            self.entries.entry(*number).or_insert(*entry);
        }
        if with_trailer {
            // Chain linkage describes one section, not the document
            let own: Dictionary = section
                .trailer
                .iter()
                .filter(|(key, _)| !matches!(key.as_str(), "Prev" | "XRefStm"))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect();
            self.trailer.merge_missing(&own);
        }
        self.sections.push(section);
    }
}

/// Finds the byte offset recorded after the last `startxref` keyword.
///
/// Format:
/// ```text
/// ...
/// startxref
/// 12345
/// %%EOF
/// ```
pub fn find_startxref(data: &[u8]) -> PDFResult<usize> {
    let keyword = b"startxref";
    let pos = memmem::rfind(data, keyword)
        .ok_or_else(|| PDFError::XRef("startxref not found".to_string()))?;

    let mut lexer = Lexer::at(data, pos + keyword.len());
    match lexer.next_token().token {
        Token::Integer(offset) if offset >= 0 => Ok(offset as usize),
        _ => Err(PDFError::Expected {
            expected: "offset after startxref",
            offset: pos + keyword.len(),
        }),
    }
}

/// Walks the cross-reference chain starting at `start_xref`.
///
/// Never fails: problems are recorded on the returned resolution. At most
/// `hop_limit` sections are read, and a `/Prev` offset seen before ends the
/// walk.
pub fn resolve(
    data: &[u8],
    start_xref: Option<usize>,
    hop_limit: usize,
    decode_limit: usize,
) -> XRefResolution {
    let mut resolution = XRefResolution::default();

    let Some(start) = start_xref else {
        resolution.failure = Some("no startxref offset found".to_string());
        return resolution;
    };

    let first = match parse_section_at(data, start, decode_limit) {
        Ok(section) => section,
        Err(err) => match nearest_xref_keyword(data, start)
            .and_then(|alt| parse_section_at(data, alt, decode_limit).ok())
        {
            Some(section) => {
                warn!(
                    startxref = start,
                    found = section.offset,
                    "startxref is wrong, using nearest xref section"
                );
                resolution.repaired_start = Some(section.offset);
                section
            }
            None => {
                warn!(startxref = start, error = %err, "Cross-reference data unreadable");
                resolution.failure = Some(err.to_string());
                return resolution;
            }
        },
    };

    let mut seen = FxHashSet::default();
    seen.insert(start);
    seen.insert(first.offset);
    let mut next = Some(first);
    let mut hops = 0usize;

    while let Some(section) = next.take() {
        hops += 1;
        debug!(
            offset = section.offset,
            kind = ?section.kind,
            entries = section.entries.len(),
            "Parsed xref section"
        );

        let prev = section.prev();
        let xref_stm = section.xref_stm();
        resolution.merge(section, true);

        // Hybrid files: entries of the /XRefStm stream sit beneath the table's
        if let Some(stm) = xref_stm {
            if seen.insert(stm) {
                match parse_section_at(data, stm, decode_limit) {
                    Ok(hidden) => resolution.merge(hidden, false),
                    Err(err) => warn!(offset = stm, error = %err, "Unreadable /XRefStm section"),
                }
            }
        }

        let Some(prev) = prev else {
            break;
        };
        if !seen.insert(prev) {
            warn!(offset = prev, "Detected xref /Prev loop");
            resolution.loop_detected = true;
            break;
        }
        if hops >= hop_limit {
            warn!(hop_limit, "Xref chain exceeds hop limit");
            resolution.hop_limit_hit = true;
            break;
        }

        match parse_section_at(data, prev, decode_limit) {
            Ok(section) => next = Some(section),
            Err(err) => {
                warn!(offset = prev, error = %err, "Unreadable /Prev section");
                resolution.failure = Some(format!("/Prev section at {}: {}", prev, err));
            }
        }
    }

    resolution
}

/// Parses one section (table or stream) at `offset`, tolerating leading
/// whitespace.
pub fn parse_section_at(data: &[u8], offset: usize, decode_limit: usize) -> PDFResult<XRefSection> {
    if offset >= data.len() {
        return Err(PDFError::InvalidOffset {
            offset,
            length: data.len(),
        });
    }

    let mut parser = Parser::new(data, offset).with_stream_decoding(Some(decode_limit));
    if parser.peek().token.is_keyword(Keyword::XRef) {
        parse_table(&mut parser)
    } else {
        parse_stream_section(&mut parser)
    }
}

/// Reads a classic table and its trailer.
///
/// Example xref table format:
/// ```text
/// xref
/// 0 6
/// 0000000000 65535 f
/// 0000000015 00000 n
/// trailer
/// << /Size 6 /Root 1 0 R >>
/// ```
fn parse_table(parser: &mut Parser) -> PDFResult<XRefSection> {
    let offset = parser.next_token().start; // "xref"
    let mut entries = Vec::new();

    loop {
        let token = parser.next_token();
        match token.token {
            Token::Keyword(Keyword::Trailer) => break,
            Token::Integer(first) if first >= 0 => {
                let count = expect_integer(parser, "subsection count")?;
                for i in 0..count {
                    let number = first
                        .checked_add(i)
                        .and_then(|n| u32::try_from(n).ok())
                        .ok_or_else(|| {
                            PDFError::XRef(format!("subsection {} {} out of range", first, count))
                        })?;
                    entries.push((number, read_table_entry(parser)?));
                }
            }
            _ => {
                return Err(PDFError::Expected {
                    expected: "subsection header or trailer",
                    offset: token.start,
                });
            }
        }
    }

    let trailer_at = parser.position();
    match parser.parse_value() {
        Value::Dictionary(trailer) => Ok(XRefSection {
            offset,
            kind: XRefKind::Table,
            entries,
            trailer,
        }),
        _ => Err(PDFError::Expected {
            expected: "trailer dictionary",
            offset: trailer_at,
        }),
    }
}

fn expect_integer(parser: &mut Parser, expected: &'static str) -> PDFResult<i64> {
    let token = parser.next_token();
    match token.token {
        Token::Integer(n) if n >= 0 => Ok(n),
        _ => Err(PDFError::Expected {
            expected,
            offset: token.start,
        }),
    }
}

/// Reads a single table entry: `offset generation n|f`.
fn read_table_entry(parser: &mut Parser) -> PDFResult<XRefEntry> {
    let offset = expect_integer(parser, "entry offset")?;
    let generation = expect_integer(parser, "entry generation")?;
    let generation = u16::try_from(generation).unwrap_or(u16::MAX);

    let token = parser.next_token();
    match token.token {
        Token::Command(ref kind) if kind == "n" => Ok(XRefEntry::InUse {
            offset: offset as usize,
            generation,
        }),
        Token::Command(ref kind) if kind == "f" => Ok(XRefEntry::Free {
            next_free: u32::try_from(offset).unwrap_or(0),
            generation,
        }),
        _ => Err(PDFError::Expected {
            expected: "'n' or 'f' in xref entry",
            offset: token.start,
        }),
    }
}

/// Reads a `/Type /XRef` stream object.
fn parse_stream_section(parser: &mut Parser) -> PDFResult<XRefSection> {
    let header = parser.next_token();
    let offset = header.start;
    let is_header = matches!(header.token, Token::Integer(_))
        && matches!(parser.next_token().token, Token::Integer(_))
        && parser.next_token().token.is_keyword(Keyword::Obj);
    if !is_header {
        return Err(PDFError::Expected {
            expected: "xref table or xref stream object",
            offset,
        });
    }

    let Value::Stream(stream) = parser.parse_value() else {
        return Err(PDFError::XRef(format!(
            "object at {} is not a stream",
            offset
        )));
    };
    if !stream.dict.has_name("Type", "XRef") {
        return Err(PDFError::XRef(format!(
            "stream at {} is not /Type /XRef",
            offset
        )));
    }
    let data = stream.decoded_data.as_deref().ok_or_else(|| {
        PDFError::XRef(format!("xref stream at {} could not be decoded", offset))
    })?;

    let entries = decode_stream_entries(&stream.dict, data)?;
    Ok(XRefSection {
        offset,
        kind: XRefKind::Stream,
        entries,
        trailer: stream.dict,
    })
}

/// Decodes the binary rows of an xref stream according to `/W` and `/Index`.
pub fn decode_stream_entries(dict: &Dictionary, data: &[u8]) -> PDFResult<Vec<(u32, XRefEntry)>> {
    let widths: Vec<usize> = dict
        .get_array("W")
        .ok_or_else(|| PDFError::XRef("xref stream without /W".to_string()))?
        .iter()
        .map(|w| w.as_integer().and_then(|w| usize::try_from(w).ok()))
        .collect::<Option<_>>()
        .ok_or_else(|| PDFError::XRef("invalid /W entry".to_string()))?;
    if widths.len() < 3 || widths.iter().any(|w| *w > 8) {
        return Err(PDFError::XRef(format!("unsupported /W {:?}", widths)));
    }
    let row_len: usize = widths[..3].iter().sum();
    if row_len == 0 {
        return Err(PDFError::XRef("/W describes empty rows".to_string()));
    }

    let size = dict.get_integer("Size").unwrap_or(0).max(0);
    let index: Vec<i64> = match dict.get_array("Index") {
        Some(items) => items.iter().filter_map(Value::as_integer).collect(),
        None => vec![0, size],
    };

    let mut entries = Vec::new();
    let mut rows = data.chunks_exact(row_len);

    for pair in index.chunks_exact(2) {
        let (first, count) = (pair[0].max(0), pair[1].max(0));
        for i in 0..count {
            let Some(row) = rows.next() else {
                return Ok(entries);
            };
            let Some(number) = first.checked_add(i).and_then(|n| u32::try_from(n).ok()) else {
                continue;
            };

            let (f1, rest) = row.split_at(widths[0]);
            let (f2, f3) = rest.split_at(widths[1]);
            let kind = if widths[0] == 0 { 1 } else { read_be(f1) };
            let (f2, f3) = (read_be(f2), read_be(f3));

            let entry = match kind {
                0 => XRefEntry::Free {
                    next_free: f2 as u32,
                    generation: f3.min(u16::MAX as u64) as u16,
                },
                1 => XRefEntry::InUse {
                    offset: f2 as usize,
                    generation: f3.min(u16::MAX as u64) as u16,
                },
                2 => XRefEntry::Compressed {
                    stream: f2 as u32,
                    index: f3 as u32,
                },
                // Unknown types are references to the null object
                _ => continue,
            };
            entries.push((number, entry));
        }
    }

    Ok(entries)
}

fn read_be(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64)
}

/// Finds the standalone `xref` keyword closest to `offset`.
fn nearest_xref_keyword(data: &[u8], offset: usize) -> Option<usize> {
    memmem::find_iter(data, b"xref")
        .filter(|&pos| {
            let before_ok = pos == 0 || Lexer::is_whitespace(data[pos - 1]);
            let after_ok = data.get(pos + 4).is_none_or(|b| Lexer::is_whitespace(*b));
            before_ok && after_ok
        })
        .min_by_key(|&pos| pos.abs_diff(offset))
}

/// `trailer` standing alone, not part of a longer name or word.
fn is_trailer_keyword(data: &[u8], pos: usize) -> bool {
    let before_ok = pos == 0 || Lexer::is_whitespace(data[pos - 1]);
    let after_ok = data
        .get(pos + b"trailer".len())
        .is_none_or(|b| Lexer::is_whitespace(*b) || *b == b'<');
    before_ok && after_ok
}

/// Whether `pos` falls inside a terminated object, such as a stream payload.
fn inside_object(located: &[LocatedObject], pos: usize) -> bool {
    let after = located.partition_point(|o| o.start <= pos);
    located[..after]
        .iter()
        .rev()
        .any(|o| o.has_endobj && pos < o.end)
}

/// Where the document trailer came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrailerSource {
    /// The cross-reference chain
    Chain,
    /// A `trailer` dictionary found by scanning the file
    Scanned,
    /// The dictionary of a located `/Type /XRef` stream
    XRefStream,
    /// Built from a located `/Type /Catalog` object
    Synthesized,
    /// Nothing usable was found
    Missing,
}

/// Recovers a trailer when the chain could not provide one.
///
/// Tries, in order: the last `trailer` dictionary in the file that names a
/// `/Root` (else the last one at all), the last `/Type /XRef` stream
/// dictionary, and a dictionary synthesised from a `/Type /Catalog` object.
pub fn recover_trailer(data: &[u8], located: &[LocatedObject]) -> (Dictionary, TrailerSource) {
    let mut fallback = None;
    let keyword_positions: Vec<usize> = memmem::find_iter(data, b"trailer")
        .filter(|&pos| is_trailer_keyword(data, pos))
        .filter(|&pos| !inside_object(located, pos))
        .collect();
    for pos in keyword_positions.into_iter().rev() {
        let mut parser = Parser::new(data, pos + b"trailer".len());
        if let Value::Dictionary(dict) = parser.parse_value() {
            if dict.contains_key("Root") {
                debug!(offset = pos, "Recovered trailer dictionary by scanning");
                return (dict, TrailerSource::Scanned);
            }
            fallback.get_or_insert(dict);
        }
    }
    if let Some(dict) = fallback {
        return (dict, TrailerSource::Scanned);
    }

    if let Some(stream) = located
        .iter()
        .rev()
        .filter_map(|o| o.value.as_stream())
        .find(|s| s.dict.has_name("Type", "XRef"))
    {
        debug!("Recovered trailer from xref stream dictionary");
        return (stream.dict.clone(), TrailerSource::XRefStream);
    }

    let catalog = located.iter().rev().find(|o| {
        o.value
            .as_dict()
            .is_some_and(|d| d.has_name("Type", "Catalog"))
    });
    if let Some(catalog) = catalog {
        let size = located.iter().map(|o| o.id.number).max().unwrap_or(0) as i64 + 1;
        let mut dict = Dictionary::new();
        dict.insert("Root", Value::Reference(catalog.id));
        dict.insert("Size", Value::integer(size));
        debug!(root = %catalog.id, "Synthesised trailer from catalog");
        return (dict, TrailerSource::Synthesized);
    }

    (Dictionary::new(), TrailerSource::Missing)
}
