//! Cross-reference (xref) tests
//!
//! Classic tables, incremental updates, xref streams and the fallbacks used
//! when the declared data is wrong or missing.

mod test_utils;

use pdf_xray::core::xref::TrailerSource;
use pdf_xray::core::*;
use test_utils::*;

fn xref_issues(doc: &DocumentStructure, level: Level) -> Vec<String> {
    doc.issues_by_category(Category::XRef)
        .into_iter()
        .filter(|i| i.level == level)
        .map(|i| i.message.clone())
        .collect()
}

fn four_objects() -> PdfBuilder {
    PdfBuilder::minimal().object(4, "<< /Producer (xref test) >>")
}

// ============================================================================
// Traditional XRef Tables
// ============================================================================

#[test]
fn test_single_table_agrees_with_discovery() {
    let data = four_objects().build();
    let doc = parse(&data).unwrap();

    assert_eq!(doc.physical.xref_sections.len(), 1);
    assert_eq!(doc.physical.xref_sections[0].kind, XRefKind::Table);
    let status = &doc.physical.xref_status;
    assert!(status.failure.is_none());
    assert!(status.offset_mismatches.is_empty());
    assert!(status.missing.is_empty());
    assert!(status.unlisted.is_empty());
    assert!(doc.issues_by_category(Category::XRef).is_empty());
}

#[test]
fn test_prev_chain_equals_flattened_table() {
    let builder = four_objects().trailer("/ID [<AA> <AA>]");
    let flat = parse(&builder.build()).unwrap();

    for depth in [2, 4] {
        let data = builder.build_with_sections(depth);
        let chained = parse(&data).unwrap();

        assert_eq!(chained.physical.xref_sections.len(), depth);
        assert_eq!(chained.physical.trailer, flat.physical.trailer);
        assert!(!chained.physical.trailer.contains_key("Prev"));

        let status = &chained.physical.xref_status;
        assert!(status.offset_mismatches.is_empty());
        assert!(status.missing.is_empty());
        assert!(status.unlisted.is_empty());
        assert!(!status.loop_detected);

        let values = |doc: &DocumentStructure| -> Vec<(ObjectId, Value)> {
            doc.objects().iter().map(|o| (o.id, o.value.clone())).collect()
        };
        assert_eq!(values(&chained), values(&flat));
        assert_eq!(chained.issues, flat.issues);
    }
}

#[test]
fn test_declared_offset_disagreement() {
    let data = four_objects().build();
    let actual = find(&data, "2 0 obj");
    let data = replace(
        &data,
        &format!("{:010} 00000 n", actual),
        &format!("{:010} 00000 n", actual + 3),
    );

    let doc = parse(&data).unwrap();
    let mismatches = &doc.physical.xref_status.offset_mismatches;
    assert_eq!(mismatches.len(), 1);
    assert_eq!(mismatches[0].id, ObjectId::new(2, 0));
    assert_eq!(mismatches[0].declared, actual + 3);
    assert_eq!(mismatches[0].actual, actual);
    assert_eq!(xref_issues(&doc, Level::Warning).len(), 1);

    // Discovery wins
    assert_eq!(doc.get_object(2, 0).unwrap().offset, actual);
    assert_eq!(doc.pages().len(), 1);
}

#[test]
fn test_entry_with_wrong_generation() {
    let data = four_objects().build();
    let actual = find(&data, "4 0 obj");
    let data = replace(
        &data,
        &format!("{:010} 00000 n", actual),
        &format!("{:010} 00001 n", actual),
    );

    let doc = parse(&data).unwrap();
    let status = &doc.physical.xref_status;
    assert_eq!(status.missing.len(), 1);
    assert_eq!(status.missing[0].id, ObjectId::new(4, 1));
    assert_eq!(status.unlisted, vec![ObjectId::new(4, 0)]);
    assert_eq!(xref_issues(&doc, Level::Warning).len(), 1);
    assert_eq!(xref_issues(&doc, Level::Info).len(), 1);
}

#[test]
fn test_incremental_update_redefines_object() {
    let mut data = PdfBuilder::minimal().build();
    let prev = find(&data, "xref\n");

    let updated = data.len();
    data.extend_from_slice(
        b"3 0 obj\n<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Resources << >> /Rotate 90 >>\nendobj\n",
    );
    let xref = data.len();
    data.extend_from_slice(
        format!(
            "xref\n3 1\n{:010} 00000 n \ntrailer\n<< /Size 4 /Root 1 0 R /Prev {} >>\nstartxref\n{}\n%%EOF\n",
            updated, prev, xref
        )
        .as_bytes(),
    );

    let doc = parse(&data).unwrap();
    let page = doc.get_object(3, 0).unwrap();
    assert_eq!(page.offset, updated);
    assert_eq!(page.properties.get_integer("Rotate"), Some(90));

    let redefined = &doc.physical.xref_status.redefined;
    assert_eq!(redefined.len(), 1);
    assert_eq!(redefined[0].kept_offset, updated);
    assert!(xref_issues(&doc, Level::Warning).is_empty());
    assert_eq!(xref_issues(&doc, Level::Info).len(), 1);
}

#[test]
fn test_prev_loop_is_detected() {
    let mut data = PdfBuilder::minimal().build();
    let second = data.len();
    data.extend_from_slice(
        format!(
            "xref\n0 0\ntrailer\n<< /Size 4 /Root 1 0 R /Prev {} >>\nstartxref\n{}\n%%EOF\n",
            second, second
        )
        .as_bytes(),
    );

    let doc = parse(&data).unwrap();
    assert!(doc.physical.xref_status.loop_detected);
    assert!(
        xref_issues(&doc, Level::Warning)
            .iter()
            .any(|m| m.contains("loops"))
    );
    assert_eq!(doc.pages().len(), 1);
}

// ============================================================================
// Fallbacks
// ============================================================================

#[test]
fn test_startxref_off_by_whitespace() {
    let data = four_objects().build();
    let xref = find(&data, "xref\n");
    let patched = replace(
        &data,
        &format!("startxref\n{}\n", xref),
        &format!("startxref\n{}\n", xref - 1),
    );
    let doc = parse(&patched).unwrap();

    assert!(doc.physical.xref_status.failure.is_none());
    assert!(doc.physical.xref_status.repaired_start.is_none());
    assert_eq!(doc.physical.xref_sections.len(), 1);
}

#[test]
fn test_startxref_pointing_nowhere_is_repaired() {
    let data = four_objects().build();
    let xref = find(&data, "xref\n");
    let patched = replace(
        &data,
        &format!("startxref\n{}\n", xref),
        &format!("startxref\n{}\n", xref - 20),
    );
    let doc = parse(&patched).unwrap();

    assert_eq!(
        doc.physical.xref_status.repaired_start,
        Some((xref - 20, xref))
    );
    assert_eq!(doc.physical.xref_sections.len(), 1);
    assert!(
        xref_issues(&doc, Level::Warning)
            .iter()
            .any(|m| m.contains("startxref"))
    );
}

#[test]
fn test_missing_xref_falls_back_to_scan() {
    let data = four_objects().build_without_xref();
    let doc = parse(&data).unwrap();

    assert_eq!(doc.objects().len(), 4);
    assert_eq!(doc.physical.xref_status.trailer_source, TrailerSource::Scanned);
    assert_eq!(doc.logical.catalog, Some(ObjectId::new(1, 0)));
    assert_eq!(doc.pages().len(), 1);
    assert!(!xref_issues(&doc, Level::Warning).is_empty());
}

#[test]
fn test_trailer_synthesised_from_catalog() {
    let mut data = b"%PDF-1.4\n".to_vec();
    data.extend_from_slice(b"7 0 obj\n<< /Type /Catalog /Pages 8 0 R >>\nendobj\n");
    data.extend_from_slice(b"8 0 obj\n<< /Type /Pages /Kids [] /Count 0 >>\nendobj\n%%EOF\n");

    let doc = parse(&data).unwrap();
    assert_eq!(doc.physical.xref_status.trailer_source, TrailerSource::Synthesized);
    assert_eq!(doc.physical.trailer.get_reference("Root"), Some(ObjectId::new(7, 0)));
    assert_eq!(doc.physical.trailer.get_integer("Size"), Some(9));
    assert_eq!(doc.logical.catalog, Some(ObjectId::new(7, 0)));
}

// ============================================================================
// XRef Streams and Object Streams
// ============================================================================

fn row(kind: u8, field2: u32, field3: u16) -> Vec<u8> {
    let mut row = vec![kind];
    row.extend_from_slice(&field2.to_be_bytes());
    row.extend_from_slice(&field3.to_be_bytes());
    row
}

/// Catalog and page tree direct, the page inside object stream 4, and a
/// compressed xref stream as object 5.
fn object_stream_document() -> Vec<u8> {
    let mut data = b"%PDF-1.5\n".to_vec();
    let obj1 = data.len();
    data.extend_from_slice(b"1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n");
    let obj2 = data.len();
    data.extend_from_slice(b"2 0 obj\n<< /Type /Pages /Kids [3 0 R] /Count 1 >>\nendobj\n");

    let page = "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Resources << >> >>";
    let header = "3 0 ";
    let payload = deflate(format!("{}{}", header, page).as_bytes());
    let obj4 = data.len();
    data.extend_from_slice(
        format!(
            "4 0 obj\n<< /Type /ObjStm /N 1 /First {} /Filter /FlateDecode /Length {} >>\nstream\n",
            header.len(),
            payload.len()
        )
        .as_bytes(),
    );
    data.extend_from_slice(&payload);
    data.extend_from_slice(b"\nendstream\nendobj\n");

    let obj5 = data.len();
    let mut rows = Vec::new();
    rows.extend(row(0, 0, 0xFFFF));
    rows.extend(row(1, obj1 as u32, 0));
    rows.extend(row(1, obj2 as u32, 0));
    rows.extend(row(2, 4, 0));
    rows.extend(row(1, obj4 as u32, 0));
    rows.extend(row(1, obj5 as u32, 0));
    let rows = deflate(&rows);
    data.extend_from_slice(
        format!(
            "5 0 obj\n<< /Type /XRef /Size 6 /W [1 4 2] /Root 1 0 R /Filter /FlateDecode /Length {} >>\nstream\n",
            rows.len()
        )
        .as_bytes(),
    );
    data.extend_from_slice(&rows);
    data.extend_from_slice(format!("\nendstream\nendobj\nstartxref\n{}\n%%EOF\n", obj5).as_bytes());
    data
}

#[test]
fn test_xref_stream_and_object_stream() {
    let doc = parse(&object_stream_document()).unwrap();

    assert_eq!(doc.physical.xref_sections.len(), 1);
    assert_eq!(doc.physical.xref_sections[0].kind, XRefKind::Stream);
    assert_eq!(
        doc.physical.xref_sections[0].entries[3],
        (3, XRefEntry::Compressed { stream: 4, index: 0 })
    );

    let page = doc.get_object(3, 0).unwrap();
    assert_eq!(page.object_type, "Page");
    assert_eq!(
        page.source,
        ObjectSource::ObjectStream {
            stream: ObjectId::new(4, 0),
            index: 0
        }
    );
    assert_eq!(doc.pages().len(), 1);
    assert!(doc.physical.xref_status.missing.is_empty());
    assert!(doc.physical.xref_status.unlisted.is_empty());
    assert!(doc.issues_by_category(Category::Reference).is_empty());
}

#[test]
fn test_object_streams_can_be_left_unexpanded() {
    let options = ParseOptions {
        expand_object_streams: false,
        ..ParseOptions::default()
    };
    let doc = parse_with_options(&object_stream_document(), &options).unwrap();

    assert!(doc.get_object(3, 0).is_none());
    assert!(doc.physical.xref_status.missing.is_empty());
    assert_eq!(doc.issues_by_category(Category::Reference).len(), 1);
}
