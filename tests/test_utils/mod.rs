//! Shared helpers for integration tests.
//!
//! `PdfBuilder` writes small documents with byte-exact xref offsets so tests
//! can tell declared and discovered structure apart.

#![allow(dead_code)]

use std::fmt::Write as _;

/// Builds a PDF file from object bodies.
#[derive(Debug, Clone)]
pub struct PdfBuilder {
    version: String,
    objects: Vec<(u32, u16, Vec<u8>)>,
    trailer_extra: String,
}

impl Default for PdfBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PdfBuilder {
    pub fn new() -> Self {
        PdfBuilder {
            version: "1.7".to_string(),
            objects: Vec::new(),
            trailer_extra: String::new(),
        }
    }

    pub fn version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }

    /// Adds object `number 0 obj <body> endobj`.
    pub fn object(self, number: u32, body: &str) -> Self {
        self.object_bytes(number, 0, body.as_bytes())
    }

    pub fn object_bytes(mut self, number: u32, generation: u16, body: &[u8]) -> Self {
        self.objects.push((number, generation, body.to_vec()));
        self
    }

    /// Adds a stream object whose `/Length` matches `payload`.
    pub fn stream(self, number: u32, dict_entries: &str, payload: &[u8]) -> Self {
        let mut body = format!("<< /Length {} {} >>\nstream\n", payload.len(), dict_entries)
            .into_bytes();
        body.extend_from_slice(payload);
        body.extend_from_slice(b"\nendstream");
        self.object_bytes(number, 0, &body)
    }

    /// Extra trailer entries, e.g. `"/Info 9 0 R"`.
    pub fn trailer(mut self, extra: &str) -> Self {
        self.trailer_extra = extra.to_string();
        self
    }

    fn size(&self) -> u32 {
        self.objects.iter().map(|(n, _, _)| *n).max().unwrap_or(0) + 1
    }

    fn header(&self) -> Vec<u8> {
        let mut out = format!("%PDF-{}\n", self.version).into_bytes();
        out.extend_from_slice(b"%\xE2\xE3\xCF\xD3\n");
        out
    }

    fn write_object(out: &mut Vec<u8>, number: u32, generation: u16, body: &[u8]) -> usize {
        let offset = out.len();
        out.extend_from_slice(format!("{} {} obj\n", number, generation).as_bytes());
        out.extend_from_slice(body);
        out.extend_from_slice(b"\nendobj\n");
        offset
    }

    fn xref_table(entries: &[(u32, u16, usize)], with_free_head: bool) -> String {
        let mut table = String::from("xref\n");
        if with_free_head {
            table.push_str("0 1\n0000000000 65535 f \n");
        }
        for (number, generation, offset) in entries {
            let _ = write!(table, "{} 1\n{:010} {:05} n \n", number, offset, generation);
        }
        table
    }

    /// A complete file with one xref table.
    pub fn build(&self) -> Vec<u8> {
        self.build_with_sections(1)
    }

    /// A complete file whose objects are split across `sections` incremental
    /// updates, each with its own xref table linked by `/Prev`.
    pub fn build_with_sections(&self, sections: usize) -> Vec<u8> {
        let sections = sections.max(1);
        let per_section = self.objects.len().div_ceil(sections).max(1);
        let mut out = self.header();
        let mut prev: Option<usize> = None;

        for (i, chunk) in self.objects.chunks(per_section).enumerate() {
            let entries: Vec<(u32, u16, usize)> = chunk
                .iter()
                .map(|(n, g, body)| (*n, *g, Self::write_object(&mut out, *n, *g, body)))
                .collect();

            let xref_offset = out.len();
            out.extend_from_slice(Self::xref_table(&entries, i == 0).as_bytes());
            let prev_entry = prev.map(|p| format!(" /Prev {}", p)).unwrap_or_default();
            out.extend_from_slice(
                format!(
                    "trailer\n<< /Size {} /Root 1 0 R{} {} >>\nstartxref\n{}\n%%EOF\n",
                    self.size(),
                    prev_entry,
                    self.trailer_extra,
                    xref_offset
                )
                .as_bytes(),
            );
            prev = Some(xref_offset);
        }
        out
    }

    /// Objects and a trailer, but no xref table or `startxref`.
    pub fn build_without_xref(&self) -> Vec<u8> {
        let mut out = self.header();
        for (n, g, body) in &self.objects {
            Self::write_object(&mut out, *n, *g, body);
        }
        out.extend_from_slice(
            format!(
                "trailer\n<< /Size {} /Root 1 0 R {} >>\n%%EOF\n",
                self.size(),
                self.trailer_extra
            )
            .as_bytes(),
        );
        out
    }

    /// The usual three-object document: catalog, page tree, one page.
    pub fn minimal() -> Self {
        PdfBuilder::new()
            .object(1, "<< /Type /Catalog /Pages 2 0 R >>")
            .object(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>")
            .object(
                3,
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Resources << >> >>",
            )
    }
}

/// Offset of the first occurrence of `needle`.
pub fn find(data: &[u8], needle: &str) -> usize {
    data.windows(needle.len())
        .position(|w| w == needle.as_bytes())
        .unwrap_or_else(|| panic!("{:?} not found", needle))
}

/// Replaces the first occurrence of `from` with `to`.
pub fn replace(data: &[u8], from: &str, to: &str) -> Vec<u8> {
    let at = find(data, from);
    let mut out = data[..at].to_vec();
    out.extend_from_slice(to.as_bytes());
    out.extend_from_slice(&data[at + from.len()..]);
    out
}

/// zlib-compresses `data` with flate2.
pub fn deflate(data: &[u8]) -> Vec<u8> {
    use flate2::Compression;
    use flate2::write::ZlibEncoder;
    use std::io::Write;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}
