//! Finds every `N G obj ... endobj` region by scanning the raw bytes.
//!
//! The scan does not consult cross-reference data. It is the record of what
//! the file body actually contains.

use super::diagnostic::{Diagnostic, DiagnosticKind};
use super::lexer::{Keyword, Lexer, Token};
use super::options::ParseOptions;
use super::parser::Parser;
use super::value::{ObjectId, Value};
use memchr::memmem;
use tracing::{debug, trace, warn};

/// An indirect object found in the file body.
#[derive(Debug, Clone)]
pub struct LocatedObject {
    pub id: ObjectId,
    /// Offset of the object number
    pub start: usize,
    /// Offset just past `endobj` (or past the body when `endobj` is missing)
    pub end: usize,
    /// Offset of the first byte after `obj`
    pub body_start: usize,
    pub value: Value,
    pub has_endobj: bool,
    pub diagnostics: Vec<Diagnostic>,
}

impl LocatedObject {
    /// The bytes of the whole object, header to `endobj`.
    pub fn raw<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        &data[self.start..self.end]
    }
}

/// Scans `data` for indirect objects and returns them in file order.
///
/// Stream payloads are skipped verbatim, so `obj`-like bytes in binary data
/// never produce a match. Scanning stops after `options.max_objects`.
pub fn locate_objects(data: &[u8], options: &ParseOptions) -> Vec<LocatedObject> {
    let finder = memmem::Finder::new(b"obj");
    let mut objects = Vec::new();
    let mut pos = 0usize;

    while let Some(found) = finder.find(&data[pos..]) {
        let keyword = pos + found;
        pos = keyword + 3;

        let Some((id, start)) = object_header_before(data, keyword) else {
            continue;
        };
        if data.get(keyword + 3).is_some_and(|b| !Lexer::is_special(*b)) {
            continue;
        }

        if objects.len() >= options.max_objects {
            warn!(
                max_objects = options.max_objects,
                offset = start,
                "Object limit reached, stopping scan"
            );
            break;
        }

        let located = parse_object_at(data, id, start, keyword + 3, options);
        trace!(
            object = %located.id,
            start = located.start,
            end = located.end,
            "Located object"
        );
        pos = located.end.max(pos);
        objects.push(located);
    }

    debug!(count = objects.len(), "Object scan finished");
    objects
}

/// Checks that `N G ` precedes the `obj` keyword at `keyword`, with `N`
/// starting at a token boundary. Returns the id and the offset of `N`.
fn object_header_before(data: &[u8], keyword: usize) -> Option<(ObjectId, usize)> {
    let mut pos = keyword;
    while pos > 0 && Lexer::is_whitespace(data[pos - 1]) {
        pos -= 1;
    }

    let (generation, gen_start) = digits_before(data, pos, 5)?;
    if gen_start == 0 || !Lexer::is_whitespace(data[gen_start - 1]) {
        return None;
    }

    let mut pos = gen_start;
    while pos > 0 && Lexer::is_whitespace(data[pos - 1]) {
        pos -= 1;
    }

    let (number, num_start) = digits_before(data, pos, 10)?;
    if num_start > 0 && !Lexer::is_special(data[num_start - 1]) {
        return None;
    }

    let id = ObjectId::new(
        u32::try_from(number).ok()?,
        u16::try_from(generation).ok()?,
    );
    Some((id, num_start))
}

/// Reads the run of decimal digits ending at `end`, at most `max_digits`.
fn digits_before(data: &[u8], end: usize, max_digits: usize) -> Option<(u64, usize)> {
    let mut start = end;
    while start > 0 && data[start - 1].is_ascii_digit() {
        start -= 1;
        if end - start > max_digits {
            return None;
        }
    }
    if start == end {
        return None;
    }
    let value = data[start..end]
        .iter()
        .fold(0u64, |acc, d| acc * 10 + (d - b'0') as u64);
    Some((value, start))
}

/// Parses the body of an object whose header ends at `body_start`.
pub(crate) fn parse_object_at(
    data: &[u8],
    id: ObjectId,
    start: usize,
    body_start: usize,
    options: &ParseOptions,
) -> LocatedObject {
    let mut parser = Parser::new(data, body_start).with_stream_decoding(options.decode_limit());
    let mut value = parser.parse_value();

    let (end, has_endobj) = match parser.peek().token {
        Token::Keyword(Keyword::EndObj) => (parser.peek().end, true),
        // An unterminated body may have swallowed the next object's header
        Token::Keyword(Keyword::Obj) => {
            let next_header = object_header_before(data, parser.position())
                .map(|(_, header_start)| header_start)
                .filter(|header_start| *header_start >= body_start);
            (next_header.unwrap_or(parser.position()), false)
        }
        _ => (parser.position().max(body_start), false),
    };

    let mut diagnostics = parser.take_diagnostics();
    let (end, has_endobj) = if has_endobj {
        (end, true)
    } else {
        match resync_bound(data, body_start) {
            // The body ran past the next object; parse it again cut at the bound
            Some(bound) if bound.limit() < end => {
                debug!(object = %id, bound = bound.limit(), "Resynchronising after overrun");
                let mut bounded = Parser::new(&data[..bound.limit()], body_start)
                    .with_stream_decoding(options.decode_limit());
                value = bounded.parse_value();
                diagnostics = bounded.take_diagnostics();
                match bound {
                    Bound::EndObj(pos) => (pos + b"endobj".len(), true),
                    Bound::NextHeader(pos) => (pos, false),
                }
            }
            _ => (end, false),
        }
    };
    if !has_endobj {
        diagnostics.push(Diagnostic::new(
            DiagnosticKind::MissingEndobj,
            start,
            format!("object {} has no endobj", id),
        ));
    }

    LocatedObject {
        id,
        start,
        end,
        body_start,
        value,
        has_endobj,
        diagnostics,
    }
}

/// Where a body that lost its `endobj` has to stop.
#[derive(Debug, Clone, Copy)]
enum Bound {
    /// A token-bounded `endobj` keyword at this offset
    EndObj(usize),
    /// The start of the next `N G obj` header
    NextHeader(usize),
}

impl Bound {
    fn limit(self) -> usize {
        match self {
            Bound::EndObj(pos) | Bound::NextHeader(pos) => pos,
        }
    }
}

/// Byte scan from `body_start` for the first `endobj` or object header,
/// ignoring the token structure in between.
fn resync_bound(data: &[u8], body_start: usize) -> Option<Bound> {
    let endobj = memmem::find_iter(&data[body_start..], b"endobj")
        .map(|found| body_start + found)
        .find(|&pos| {
            let before_ok = pos == 0 || Lexer::is_special(data[pos - 1]);
            let after_ok = data.get(pos + 6).is_none_or(|b| Lexer::is_special(*b));
            before_ok && after_ok
        });
    let search_end = endobj.unwrap_or(data.len());
    let header = memmem::find_iter(&data[body_start..search_end], b"obj")
        .map(|found| body_start + found)
        .filter(|&keyword| data.get(keyword + 3).is_none_or(|b| Lexer::is_special(*b)))
        .find_map(|keyword| {
            object_header_before(data, keyword)
                .map(|(_, start)| start)
                .filter(|start| *start >= body_start)
        });

    match (header, endobj) {
        (Some(start), _) => Some(Bound::NextHeader(start)),
        (None, Some(pos)) => Some(Bound::EndObj(pos)),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn locate(data: &[u8]) -> Vec<LocatedObject> {
        locate_objects(data, &ParseOptions::default())
    }

    #[test]
    fn test_locates_objects_in_order() {
        let data = b"%PDF-1.4\n1 0 obj\n<< /Type /Catalog >>\nendobj\n2 0 obj\n42\nendobj\n";
        let objects = locate(data);
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].id, ObjectId::new(1, 0));
        assert_eq!(objects[0].start, 9);
        assert!(objects[0].raw(data).ends_with(b"endobj"));
        assert_eq!(objects[1].value, Value::integer(42));
        assert!(objects.iter().all(|o| o.has_endobj));
    }

    #[test]
    fn test_ignores_endobj_and_references() {
        let data = b"1 0 obj\n<< /Pages 2 0 R >>\nendobj\n";
        let objects = locate(data);
        assert_eq!(objects.len(), 1);
    }

    #[test]
    fn test_rejects_glued_number() {
        let objects = locate(b"x12 0 obj 1 endobj");
        assert!(objects.is_empty());
    }

    #[test]
    fn test_skips_stream_payload() {
        let data = b"1 0 obj\n<< /Length 19 >>\nstream\n9 0 obj fake endobj\nendstream\nendobj\n2 0 obj\n(x)\nendobj\n";
        let objects = locate(data);
        let ids: Vec<u32> = objects.iter().map(|o| o.id.number).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_wrong_length_does_not_hide_following_objects() {
        let data = b"1 0 obj\n<< /Length 9999 >>\nstream\nabc\nendstream\nendobj\n2 0 obj\n7\nendobj\n";
        let objects = locate(data);
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].value.as_stream().unwrap().raw_data, b"abc");
        assert_eq!(
            objects[0].diagnostics[0].kind,
            DiagnosticKind::LengthMismatch
        );
    }

    #[test]
    fn test_missing_endobj() {
        let data = b"1 0 obj\n<< /A 1 >>\n2 0 obj\n5\nendobj\n";
        let objects = locate(data);
        assert_eq!(objects.len(), 2);
        assert!(!objects[0].has_endobj);
        assert!(
            objects[0]
                .diagnostics
                .iter()
                .any(|d| d.kind == DiagnosticKind::MissingEndobj)
        );
        assert_eq!(objects[1].id, ObjectId::new(2, 0));
    }

    #[test]
    fn test_generation_numbers() {
        let objects = locate(b"7 3 obj null endobj");
        assert_eq!(objects[0].id, ObjectId::new(7, 3));
    }

    #[test]
    fn test_max_objects() {
        let options = ParseOptions {
            max_objects: 1,
            ..ParseOptions::default()
        };
        let objects = locate_objects(b"1 0 obj 1 endobj 2 0 obj 2 endobj", &options);
        assert_eq!(objects.len(), 1);
    }

    #[test]
    fn test_unterminated_body_keeps_next_object() {
        let data = b"1 0 obj\n[1 2\n2 0 obj\n5\nendobj\n";
        let objects = locate(data);
        let ids: Vec<u32> = objects.iter().map(|o| o.id.number).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(objects[1].value, Value::integer(5));
    }

    #[test]
    fn test_unterminated_string_does_not_hide_following_objects() {
        let data = b"1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n\
3 0 obj\n<< /Title (broken >>\nendobj\n\
2 0 obj\n<< /Type /Pages /Kids [] /Count 0 >>\nendobj\n\
4 0 obj\n(fine)\nendobj\n";
        let objects = locate(data);
        let ids: Vec<u32> = objects.iter().map(|o| o.id.number).collect();
        assert_eq!(ids, vec![1, 3, 2, 4]);

        let broken = &objects[1];
        assert!(broken.has_endobj);
        assert!(broken.raw(data).ends_with(b"endobj"));
        assert!(
            broken
                .diagnostics
                .iter()
                .any(|d| d.kind == DiagnosticKind::UnterminatedString)
        );
        assert!(objects[2].value.as_dict().is_some_and(|d| d.has_name("Type", "Pages")));
    }

    #[test]
    fn test_resync_stops_at_next_header_without_endobj() {
        let data = b"1 0 obj\n(runaway\n2 0 obj\n5\nendobj\n";
        let objects = locate(data);
        let ids: Vec<u32> = objects.iter().map(|o| o.id.number).collect();
        assert_eq!(ids, vec![1, 2]);
        assert!(!objects[0].has_endobj);
        assert_eq!(objects[0].end, 17);
        assert_eq!(objects[1].value, Value::integer(5));
    }
}
