//! Assembly of the physical and logical views of a document.
//!
//! The physical view is every object as found in the file, reconciled with
//! the cross-reference data. The logical view is what the catalog reaches:
//! the page tree, the outline tree and the document information.

use super::diagnostic::Diagnostic;
use super::error::DuplicateObject;
use super::lexer::Lexer;
use super::locator::LocatedObject;
use super::object_stream::{self, CompressedObject};
use super::options::ParseOptions;
use super::parser::MAX_DEPTH;
use super::value::{Dictionary, ObjectId, Value};
use super::xref::{self, TrailerSource, XRefEntry, XRefResolution, XRefSection};
use memchr::memmem;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// How far into the file the `%PDF-` marker is searched for.
pub const HEADER_SEARCH_WINDOW: usize = 1024;

/// Action types recognised when inferring the type of an untyped dictionary.
const ACTION_TYPES: &[&str] = &[
    "GoTo",
    "GoToR",
    "GoToE",
    "Launch",
    "Thread",
    "URI",
    "Sound",
    "Movie",
    "Hide",
    "Named",
    "SubmitForm",
    "ResetForm",
    "ImportData",
    "JavaScript",
    "SetOCGState",
    "Rendition",
    "Trans",
    "GoTo3DView",
];

/// The `%PDF-x.y` file header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub version: String,
    pub offset: usize,
}

/// Finds the `%PDF-` marker in the first [`HEADER_SEARCH_WINDOW`] bytes.
pub fn find_header(data: &[u8]) -> Option<Header> {
    let window = &data[..data.len().min(HEADER_SEARCH_WINDOW)];
    let offset = memmem::find(window, b"%PDF-")?;
    let version: String = data[offset + 5..]
        .iter()
        .take_while(|b| b.is_ascii_digit() || **b == b'.')
        .map(|b| *b as char)
        .collect();
    Some(Header { version, offset })
}

/// Where an object's body was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectSource {
    /// The file body
    Direct,
    /// Entry `index` of the object stream `stream`
    ObjectStream { stream: ObjectId, index: usize },
}

/// An indirect object of the document.
#[derive(Debug, Clone, PartialEq)]
pub struct RawObject {
    pub id: ObjectId,
    pub object_type: String,
    /// The dictionary of the body (or of the stream), empty otherwise
    pub properties: Dictionary,
    pub value: Value,
    pub raw_content: Vec<u8>,
    pub is_stream: bool,
    /// Offset of the object in the file (of its object stream for
    /// compressed objects)
    pub offset: usize,
    pub source: ObjectSource,
    /// Syntax problems noticed while parsing this object
    pub diagnostics: Vec<Diagnostic>,
}

impl RawObject {
    /// Builds an object, inferring its type and properties from `value`.
    pub fn new(
        id: ObjectId,
        value: Value,
        raw_content: Vec<u8>,
        offset: usize,
        source: ObjectSource,
    ) -> Self {
        RawObject {
            id,
            object_type: infer_object_type(&value),
            properties: value.as_dict().cloned().unwrap_or_default(),
            is_stream: matches!(value, Value::Stream(_)),
            value,
            raw_content,
            offset,
            source,
            diagnostics: Vec::new(),
        }
    }

    fn from_located(located: LocatedObject, data: &[u8]) -> Self {
        let raw_content = located.raw(data).to_vec();
        let mut object = RawObject::new(
            located.id,
            located.value,
            raw_content,
            located.start,
            ObjectSource::Direct,
        );
        object.diagnostics = located.diagnostics;
        object
    }

    fn from_compressed(compressed: CompressedObject, stream_offset: usize) -> Self {
        RawObject::new(
            compressed.id,
            compressed.value,
            compressed.raw_content,
            stream_offset,
            ObjectSource::ObjectStream {
                stream: compressed.stream,
                index: compressed.index,
            },
        )
    }

    pub fn dict(&self) -> Option<&Dictionary> {
        self.value.as_dict()
    }
}

/// Infers the type of an object body.
///
/// The `/Type` name wins; otherwise streams are `Stream` and dictionaries are
/// classified by their keys, falling back to the value kind.
pub fn infer_object_type(value: &Value) -> String {
    let Some(dict) = value.as_dict() else {
        return value.kind().to_string();
    };
    if let Some(name) = dict.get_name("Type") {
        return name.to_string();
    }
    if value.as_stream().is_some() {
        return "Stream".to_string();
    }

    let kind = if dict.contains_key("Kids") && dict.contains_key("Count") {
        "Pages"
    } else if dict.contains_key("Parent")
        && (dict.contains_key("MediaBox") || dict.contains_key("Contents"))
    {
        "Page"
    } else if dict
        .get_name("S")
        .is_some_and(|s| ACTION_TYPES.contains(&s))
    {
        "Action"
    } else if ["FontFile", "FontFile2", "FontFile3"]
        .iter()
        .any(|k| dict.contains_key(k))
    {
        "FontDescriptor"
    } else {
        "Dictionary"
    };
    kind.to_string()
}

/// Objects in discovery order with an identity index.
#[derive(Debug, Clone, Default)]
pub struct ObjectTable {
    objects: Vec<RawObject>,
    index: FxHashMap<ObjectId, usize>,
}

impl ObjectTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an object. Identities are unique within a table.
    pub fn insert(&mut self, object: RawObject) -> Result<(), DuplicateObject> {
        if self.index.contains_key(&object.id) {
            return Err(DuplicateObject(object.id));
        }
        self.index.insert(object.id, self.objects.len());
        self.objects.push(object);
        Ok(())
    }

    pub fn get(&self, id: ObjectId) -> Option<&RawObject> {
        self.index.get(&id).map(|&i| &self.objects[i])
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RawObject> {
        self.objects.iter()
    }

    /// Follows references until a direct value is reached. Returns `None`
    /// for a reference to a missing object or a reference chain that loops.
    pub fn resolve<'a>(&'a self, mut value: &'a Value) -> Option<&'a Value> {
        for _ in 0..8 {
            match value {
                Value::Reference(id) => value = &self.get(*id)?.value,
                direct => return Some(direct),
            }
        }
        None
    }

    /// Resolves `value` and returns its dictionary (or stream dictionary).
    pub fn resolve_dict<'a>(&'a self, value: &'a Value) -> Option<&'a Dictionary> {
        self.resolve(value)?.as_dict()
    }

    /// Highest object number in the table.
    pub fn max_object_number(&self) -> Option<u32> {
        self.objects.iter().map(|o| o.id.number).max()
    }
}

impl<'a> IntoIterator for &'a ObjectTable {
    type Item = &'a RawObject;
    type IntoIter = std::slice::Iter<'a, RawObject>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// A declared xref offset that does not match where the object was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffsetMismatch {
    pub id: ObjectId,
    pub declared: usize,
    pub actual: usize,
}

/// An in-use xref entry whose object does not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissingObject {
    pub id: ObjectId,
    pub entry: XRefEntry,
}

/// A superseded copy of an object defined more than once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Redefinition {
    pub id: ObjectId,
    pub offset: usize,
    pub kept_offset: usize,
}

/// Outcome of reading and reconciling the cross-reference data.
#[derive(Debug, Clone, PartialEq)]
pub struct XRefStatus {
    pub failure: Option<String>,
    pub loop_detected: bool,
    pub hop_limit_hit: bool,
    /// `(declared, actual)` when `startxref` had to be corrected
    pub repaired_start: Option<(usize, usize)>,
    pub trailer_source: TrailerSource,
    pub offset_mismatches: Vec<OffsetMismatch>,
    pub missing: Vec<MissingObject>,
    pub unlisted: Vec<ObjectId>,
    pub redefined: Vec<Redefinition>,
    pub object_stream_failures: Vec<(ObjectId, String)>,
}

impl Default for XRefStatus {
    fn default() -> Self {
        XRefStatus {
            failure: None,
            loop_detected: false,
            hop_limit_hit: false,
            repaired_start: None,
            trailer_source: TrailerSource::Missing,
            offset_mismatches: Vec::new(),
            missing: Vec::new(),
            unlisted: Vec::new(),
            redefined: Vec::new(),
            object_stream_failures: Vec::new(),
        }
    }
}

/// The file as found: header, objects, cross-reference sections, trailer.
#[derive(Debug, Clone)]
pub struct PhysicalStructure {
    pub header: Option<Header>,
    pub objects: ObjectTable,
    pub xref_sections: Vec<XRefSection>,
    pub trailer: Dictionary,
    pub start_xref: Option<usize>,
    pub file_size: usize,
    pub has_eof_marker: bool,
    pub xref_status: XRefStatus,
}

/// Builds the physical structure from located objects and the resolved
/// cross-reference chain.
pub fn assemble_physical(
    data: &[u8],
    header: Option<Header>,
    located: Vec<LocatedObject>,
    resolution: XRefResolution,
    start_xref: Option<usize>,
    options: &ParseOptions,
) -> PhysicalStructure {
    let mut status = XRefStatus {
        failure: resolution.failure.clone(),
        loop_detected: resolution.loop_detected,
        hop_limit_hit: resolution.hop_limit_hit,
        repaired_start: start_xref.zip(resolution.repaired_start),
        ..XRefStatus::default()
    };

    let chain_usable = !resolution.sections.is_empty();
    let (trailer, trailer_source) = if chain_usable && !resolution.trailer.is_empty() {
        (resolution.trailer.clone(), TrailerSource::Chain)
    } else {
        xref::recover_trailer(data, &located)
    };
    status.trailer_source = trailer_source;

    let mut objects = merge_located(data, located, &resolution, &mut status);
    if options.expand_object_streams {
        expand_object_streams(&mut objects, options, &mut status);
    }
    if chain_usable {
        reconcile(data, &objects, &resolution, options, &mut status);
    }

    debug!(
        objects = objects.len(),
        sections = resolution.sections.len(),
        mismatches = status.offset_mismatches.len(),
        missing = status.missing.len(),
        "Physical structure assembled"
    );

    PhysicalStructure {
        header,
        objects,
        xref_sections: resolution.sections,
        trailer,
        start_xref,
        file_size: data.len(),
        has_eof_marker: memmem::rfind(data, b"%%EOF").is_some(),
        xref_status: status,
    }
}

fn skip_whitespace(data: &[u8], mut pos: usize) -> usize {
    while data.get(pos).is_some_and(|b| Lexer::is_whitespace(*b)) {
        pos += 1;
    }
    pos
}

/// Keeps one copy per identity: the one at the declared offset if any,
/// otherwise the last one in the file.
fn merge_located(
    data: &[u8],
    located: Vec<LocatedObject>,
    resolution: &XRefResolution,
    status: &mut XRefStatus,
) -> ObjectTable {
    let mut occurrences: FxHashMap<ObjectId, Vec<usize>> = FxHashMap::default();
    for (i, object) in located.iter().enumerate() {
        occurrences.entry(object.id).or_default().push(i);
    }

    let mut keep = vec![false; located.len()];
    for (id, indices) in &occurrences {
        let declared = resolution
            .declared_offset(*id)
            .map(|offset| skip_whitespace(data, offset));
        let winner = indices
            .iter()
            .copied()
            .find(|&i| Some(located[i].start) == declared)
            .or_else(|| indices.last().copied());
        let Some(winner) = winner else {
            continue;
        };
        keep[winner] = true;

        for &i in indices.iter().filter(|&&i| i != winner) {
            status.redefined.push(Redefinition {
                id: *id,
                offset: located[i].start,
                kept_offset: located[winner].start,
            });
        }
    }
    status.redefined.sort_by_key(|r| (r.id, r.offset));

    let mut table = ObjectTable::new();
    for (object, keep) in located.into_iter().zip(keep) {
        if keep {
            // Identities are unique after the winner selection above
            let _ = table.insert(RawObject::from_located(object, data));
        }
    }
    table
}

/// Adds the members of `/Type /ObjStm` streams that were not found directly.
fn expand_object_streams(table: &mut ObjectTable, options: &ParseOptions, status: &mut XRefStatus) {
    let streams: Vec<(ObjectId, usize)> = table
        .iter()
        .filter(|o| o.value.as_stream().is_some_and(object_stream::is_object_stream))
        .map(|o| (o.id, o.offset))
        .collect();

    for (stream_id, stream_offset) in streams {
        let budget = options.max_objects.saturating_sub(table.len());
        if budget == 0 {
            warn!(max_objects = options.max_objects, "Object limit reached, skipping object streams");
            break;
        }
        let Some(stream) = table.get(stream_id).and_then(|o| o.value.as_stream()) else {
            continue;
        };
        match object_stream::expand_object_stream(stream_id, stream, budget) {
            Ok(members) => {
                debug!(stream = %stream_id, members = members.len(), "Expanded object stream");
                for member in members {
                    if !table.contains(member.id) {
                        let _ = table.insert(RawObject::from_compressed(member, stream_offset));
                    }
                }
            }
            Err(err) => {
                warn!(stream = %stream_id, error = %err, "Object stream could not be expanded");
                status.object_stream_failures.push((stream_id, err.to_string()));
            }
        }
    }
}

/// Compares declared entries with the objects actually present.
fn reconcile(
    data: &[u8],
    table: &ObjectTable,
    resolution: &XRefResolution,
    options: &ParseOptions,
    status: &mut XRefStatus,
) {
    for (&number, entry) in &resolution.entries {
        match *entry {
            XRefEntry::InUse { offset, generation } => {
                let id = ObjectId::new(number, generation);
                match table.get(id) {
                    Some(object) if object.source == ObjectSource::Direct => {
                        if skip_whitespace(data, offset) != object.offset {
                            status.offset_mismatches.push(OffsetMismatch {
                                id,
                                declared: offset,
                                actual: object.offset,
                            });
                        }
                    }
                    Some(_) => {}
                    None => status.missing.push(MissingObject { id, entry: *entry }),
                }
            }
            XRefEntry::Compressed { .. } => {
                let id = ObjectId::new(number, 0);
                if options.expand_object_streams && !table.contains(id) {
                    status.missing.push(MissingObject { id, entry: *entry });
                }
            }
            XRefEntry::Free { .. } => {}
        }
    }

    for object in table {
        let listed = match resolution.entry(object.id.number) {
            Some(XRefEntry::InUse { generation, .. }) => *generation == object.id.generation,
            Some(XRefEntry::Compressed { .. }) => object.id.generation == 0,
            Some(XRefEntry::Free { .. }) | None => false,
        };
        if !listed {
            status.unlisted.push(object.id);
        }
    }
}

/// A node of the page tree as walked from the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct PageTreeNode {
    pub id: ObjectId,
    /// A `/Page` leaf (or a node without `/Kids`)
    pub is_leaf: bool,
    /// The node this one was reached from
    pub parent: Option<ObjectId>,
    pub children: Vec<PageTreeNode>,
    /// Number of leaves below (1 for a leaf)
    pub leaf_count: usize,
}

impl PageTreeNode {
    /// Visits this node and its descendants depth-first.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a PageTreeNode)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }
}

/// A node of the document outline.
#[derive(Debug, Clone, PartialEq)]
pub struct OutlineNode {
    pub id: ObjectId,
    pub title: Option<String>,
    pub children: Vec<OutlineNode>,
}

impl OutlineNode {
    /// Total number of nodes in this subtree, this node included.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(OutlineNode::node_count).sum::<usize>()
    }
}

/// What the catalog reaches.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogicalStructure {
    pub catalog: Option<ObjectId>,
    pub page_tree: Option<PageTreeNode>,
    /// Leaf pages in document order
    pub pages: Vec<ObjectId>,
    pub outlines: Option<OutlineNode>,
    /// `(node, kid)` pairs where a kid is already on the path from the root
    pub page_tree_cycles: Vec<(ObjectId, ObjectId)>,
    /// `(node, kid)` pairs where a kid does not resolve
    pub broken_kids: Vec<(ObjectId, ObjectId)>,
    /// Nodes whose kids were skipped once the walk hit its depth or visit limit
    pub truncated_page_nodes: Vec<ObjectId>,
    pub info: Option<ObjectId>,
}

/// Builds the logical structure from the trailer and the object table.
pub fn build_logical(objects: &ObjectTable, trailer: &Dictionary) -> LogicalStructure {
    let mut logical = LogicalStructure {
        info: trailer.get_reference("Info").filter(|id| objects.contains(*id)),
        ..LogicalStructure::default()
    };

    let Some(catalog_id) = trailer.get_reference("Root").filter(|id| objects.contains(*id))
    else {
        debug!("No reachable catalog");
        return logical;
    };
    logical.catalog = Some(catalog_id);
    let Some(catalog) = objects.get(catalog_id).and_then(RawObject::dict) else {
        return logical;
    };

    if let Some(root) = catalog
        .get_reference("Pages")
        .filter(|id| objects.contains(*id))
    {
        let mut walk = PageWalk {
            objects,
            path: FxHashSet::default(),
            budget: objects.len() * 4 + 16,
            pages: Vec::new(),
            cycles: Vec::new(),
            broken: Vec::new(),
            truncated: Vec::new(),
        };
        let tree = walk.visit(root, None, 0);
        logical.page_tree = Some(tree);
        logical.pages = walk.pages;
        logical.page_tree_cycles = walk.cycles;
        logical.broken_kids = walk.broken;
        logical.truncated_page_nodes = walk.truncated;
    }

    if let Some(root) = catalog
        .get_reference("Outlines")
        .filter(|id| objects.contains(*id))
    {
        let mut visited = FxHashSet::default();
        visited.insert(root);
        logical.outlines = Some(build_outline(objects, root, &mut visited, 0));
    }

    debug!(
        pages = logical.pages.len(),
        cycles = logical.page_tree_cycles.len(),
        broken_kids = logical.broken_kids.len(),
        truncated = logical.truncated_page_nodes.len(),
        "Logical structure built"
    );
    logical
}

struct PageWalk<'t> {
    objects: &'t ObjectTable,
    /// Nodes on the path from the root to the current node
    path: FxHashSet<ObjectId>,
    /// Remaining node visits; shared subtrees are walked once per parent
    budget: usize,
    pages: Vec<ObjectId>,
    cycles: Vec<(ObjectId, ObjectId)>,
    broken: Vec<(ObjectId, ObjectId)>,
    truncated: Vec<ObjectId>,
}

impl PageWalk<'_> {
    fn visit(&mut self, id: ObjectId, parent: Option<ObjectId>, depth: usize) -> PageTreeNode {
        let dict = self.objects.get(id).and_then(RawObject::dict);
        let is_leaf = match dict.and_then(|d| d.get_name("Type")) {
            Some("Page") => true,
            Some("Pages") => false,
            _ => !dict.is_some_and(|d| d.contains_key("Kids")),
        };

        let mut node = PageTreeNode {
            id,
            is_leaf,
            parent,
            children: Vec::new(),
            leaf_count: 0,
        };

        if is_leaf {
            self.pages.push(id);
            node.leaf_count = 1;
            return node;
        }

        let kids: Vec<ObjectId> = dict
            .and_then(|d| d.get_array("Kids"))
            .map(|kids| kids.iter().filter_map(Value::as_reference).collect())
            .unwrap_or_default();

        self.path.insert(id);
        for kid in kids {
            if self.path.contains(&kid) {
                self.cycles.push((id, kid));
            } else if !self.objects.contains(kid) {
                self.broken.push((id, kid));
            } else if self.budget == 0 || depth >= MAX_DEPTH {
                if !self.truncated.contains(&id) {
                    warn!(node = %id, depth, "Page tree walk limit reached");
                    self.truncated.push(id);
                }
            } else {
                self.budget -= 1;
                let child = self.visit(kid, Some(id), depth + 1);
                node.leaf_count += child.leaf_count;
                node.children.push(child);
            }
        }
        self.path.remove(&id);

        node
    }
}

/// Walks `/First` and `/Next` links. `id` must already be in `visited`.
fn build_outline(
    objects: &ObjectTable,
    id: ObjectId,
    visited: &mut FxHashSet<ObjectId>,
    depth: usize,
) -> OutlineNode {
    let dict = objects.get(id).and_then(RawObject::dict);
    let title = dict.and_then(|d| match d.get("Title") {
        Some(Value::String(s)) => Some(s.to_text()),
        _ => None,
    });

    let mut children = Vec::new();
    let mut next = dict.and_then(|d| d.get_reference("First"));
    while let Some(child) = next {
        if depth >= MAX_DEPTH || !objects.contains(child) || !visited.insert(child) {
            break;
        }
        children.push(build_outline(objects, child, visited, depth + 1));
        next = objects
            .get(child)
            .and_then(RawObject::dict)
            .and_then(|d| d.get_reference("Next"));
    }

    OutlineNode {
        id,
        title,
        children,
    }
}

/// Summary figures over all objects.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Stats {
    pub object_count: usize,
    pub type_histogram: BTreeMap<String, usize>,
    pub avg_object_size: f64,
    pub compression_ratio: f64,
    pub has_javascript: bool,
    pub has_embedded_files: bool,
    pub has_external_links: bool,
    pub stream_count: usize,
    pub page_count: usize,
}

impl Stats {
    /// Computes the statistics in one pass over the object table.
    pub fn compute(objects: &ObjectTable, logical: &LogicalStructure) -> Stats {
        let mut stats = Stats {
            object_count: objects.len(),
            page_count: logical.pages.len(),
            ..Stats::default()
        };

        let mut total_size = 0usize;
        let mut raw_stream_bytes = 0usize;
        let mut decoded_stream_bytes = 0usize;

        for object in objects {
            *stats
                .type_histogram
                .entry(object.object_type.clone())
                .or_insert(0) += 1;
            total_size += object.raw_content.len();

            if let Some(stream) = object.value.as_stream() {
                stats.stream_count += 1;
                raw_stream_bytes += stream.raw_data.len();
                decoded_stream_bytes += stream
                    .decoded_data
                    .as_ref()
                    .map_or(stream.raw_data.len(), Vec::len);
            }

            if matches!(object.object_type.as_str(), "EmbeddedFile" | "Filespec") {
                stats.has_embedded_files = true;
            }

            object.value.for_each_dict(&mut |dict| {
                if has_javascript(dict) {
                    stats.has_javascript = true;
                }
                if dict.contains_key("EF") || dict.contains_key("EmbeddedFiles") {
                    stats.has_embedded_files = true;
                }
                if is_external_action(dict) {
                    stats.has_external_links = true;
                }
            });
        }

        if !objects.is_empty() {
            stats.avg_object_size = total_size as f64 / objects.len() as f64;
        }
        stats.compression_ratio = if raw_stream_bytes == 0 {
            1.0
        } else {
            decoded_stream_bytes as f64 / raw_stream_bytes as f64
        };

        stats
    }
}

/// A dictionary that carries or names JavaScript.
pub fn has_javascript(dict: &Dictionary) -> bool {
    dict.contains_key("JS") || dict.contains_key("JavaScript") || dict.has_name("S", "JavaScript")
}

/// An action that leaves the document.
pub fn is_external_action(dict: &Dictionary) -> bool {
    matches!(
        dict.get_name("S"),
        Some("URI" | "Launch" | "GoToR" | "SubmitForm")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::value::PdfString;

    fn object(number: u32, value: Value) -> RawObject {
        RawObject::new(
            ObjectId::new(number, 0),
            value,
            Vec::new(),
            0,
            ObjectSource::Direct,
        )
    }

    fn dict(entries: &[(&str, Value)]) -> Value {
        Value::Dictionary(
            entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    fn table(objects: Vec<RawObject>) -> ObjectTable {
        let mut table = ObjectTable::new();
        for object in objects {
            table.insert(object).unwrap();
        }
        table
    }

    #[test]
    fn test_find_header() {
        let header = find_header(b"%PDF-1.7\n%\xE2\xE3\xCF\xD3\n").unwrap();
        assert_eq!(header.version, "1.7");
        assert_eq!(header.offset, 0);

        let header = find_header(b"junk\n%PDF-2.0\n").unwrap();
        assert_eq!(header.offset, 5);
        assert!(find_header(b"not a pdf").is_none());
    }

    #[test]
    fn test_header_outside_window() {
        let mut data = vec![b' '; HEADER_SEARCH_WINDOW + 10];
        data.extend_from_slice(b"%PDF-1.4");
        assert!(find_header(&data).is_none());
    }

    #[test]
    fn test_infer_object_type() {
        assert_eq!(infer_object_type(&dict(&[("Type", Value::name("Font"))])), "Font");
        assert_eq!(
            infer_object_type(&dict(&[
                ("Kids", Value::Array(vec![])),
                ("Count", Value::integer(0))
            ])),
            "Pages"
        );
        assert_eq!(
            infer_object_type(&dict(&[
                ("Parent", Value::reference(2, 0)),
                ("MediaBox", Value::Array(vec![]))
            ])),
            "Page"
        );
        assert_eq!(
            infer_object_type(&dict(&[("S", Value::name("URI"))])),
            "Action"
        );
        assert_eq!(
            infer_object_type(&dict(&[("FontFile2", Value::reference(9, 0))])),
            "FontDescriptor"
        );
        assert_eq!(infer_object_type(&dict(&[])), "Dictionary");
        assert_eq!(infer_object_type(&Value::integer(3)), "Number");
        assert_eq!(infer_object_type(&Value::Array(vec![])), "Array");
    }

    #[test]
    fn test_object_table_insert_and_get() {
        let mut table = ObjectTable::new();
        table.insert(object(1, Value::integer(1))).unwrap();
        assert_eq!(
            table.insert(object(1, Value::integer(2))),
            Err(DuplicateObject(ObjectId::new(1, 0)))
        );
        assert_eq!(table.get(ObjectId::new(1, 0)).unwrap().value, Value::integer(1));
        assert!(table.get(ObjectId::new(1, 1)).is_none());
        assert!(table.get(ObjectId::new(2, 0)).is_none());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_resolve_follows_references() {
        let table = table(vec![
            object(1, Value::reference(2, 0)),
            object(2, Value::integer(7)),
            object(3, Value::reference(3, 0)),
        ]);
        assert_eq!(table.resolve(&Value::reference(1, 0)), Some(&Value::integer(7)));
        assert_eq!(table.resolve(&Value::reference(9, 0)), None);
        assert_eq!(table.resolve(&Value::reference(3, 0)), None);
    }

    fn page_tree_table(root_kids: Vec<Value>) -> ObjectTable {
        table(vec![
            object(
                1,
                dict(&[("Type", Value::name("Catalog")), ("Pages", Value::reference(2, 0))]),
            ),
            object(
                2,
                dict(&[
                    ("Type", Value::name("Pages")),
                    ("Kids", Value::Array(root_kids)),
                    ("Count", Value::integer(2)),
                ]),
            ),
            object(
                3,
                dict(&[
                    ("Type", Value::name("Pages")),
                    ("Parent", Value::reference(2, 0)),
                    ("Kids", Value::Array(vec![Value::reference(4, 0), Value::reference(2, 0)])),
                    ("Count", Value::integer(1)),
                ]),
            ),
            object(
                4,
                dict(&[("Type", Value::name("Page")), ("Parent", Value::reference(3, 0))]),
            ),
            object(
                5,
                dict(&[("Type", Value::name("Page")), ("Parent", Value::reference(2, 0))]),
            ),
        ])
    }

    fn trailer() -> Dictionary {
        let mut trailer = Dictionary::new();
        trailer.insert("Root", Value::reference(1, 0));
        trailer
    }

    #[test]
    fn test_page_tree_walk_records_cycles_and_broken_kids() {
        let objects = page_tree_table(vec![
            Value::reference(3, 0),
            Value::reference(5, 0),
            Value::reference(99, 0),
        ]);
        let logical = build_logical(&objects, &trailer());

        assert_eq!(logical.catalog, Some(ObjectId::new(1, 0)));
        assert_eq!(logical.pages, vec![ObjectId::new(4, 0), ObjectId::new(5, 0)]);
        assert_eq!(
            logical.page_tree_cycles,
            vec![(ObjectId::new(3, 0), ObjectId::new(2, 0))]
        );
        assert_eq!(
            logical.broken_kids,
            vec![(ObjectId::new(2, 0), ObjectId::new(99, 0))]
        );
        let root = logical.page_tree.unwrap();
        assert_eq!(root.leaf_count, 2);
        assert_eq!(root.children[0].parent, Some(ObjectId::new(2, 0)));
    }

    #[test]
    fn test_page_walk_budget_is_recorded() {
        // Ten levels, each node listing its only child twice
        let mut objects = vec![object(
            1,
            dict(&[("Type", Value::name("Catalog")), ("Pages", Value::reference(2, 0))]),
        )];
        for n in 2..12 {
            let kid = Value::reference(n + 1, 0);
            objects.push(object(
                n,
                dict(&[
                    ("Type", Value::name("Pages")),
                    ("Kids", Value::Array(vec![kid.clone(), kid])),
                ]),
            ));
        }
        objects.push(object(12, dict(&[("Type", Value::name("Page"))])));
        let objects = table(objects);

        let logical = build_logical(&objects, &trailer());
        assert!(!logical.truncated_page_nodes.is_empty());
        assert!(logical.pages.len() < 1 << 10);
        assert!(logical.page_tree_cycles.is_empty());

        let mut seen = FxHashSet::default();
        assert!(logical.truncated_page_nodes.iter().all(|id| seen.insert(*id)));
    }

    #[test]
    fn test_missing_root() {
        let objects = page_tree_table(vec![]);
        let logical = build_logical(&objects, &Dictionary::new());
        assert_eq!(logical.catalog, None);
        assert!(logical.page_tree.is_none());
    }

    #[test]
    fn test_outline_walk_stops_on_loop() {
        let objects = table(vec![
            object(
                1,
                dict(&[("Type", Value::name("Catalog")), ("Outlines", Value::reference(10, 0))]),
            ),
            object(10, dict(&[("First", Value::reference(11, 0))])),
            object(
                11,
                dict(&[
                    ("Title", Value::String(PdfString::literal(b"One".to_vec()))),
                    ("Next", Value::reference(12, 0)),
                ]),
            ),
            object(12, dict(&[("Next", Value::reference(11, 0))])),
        ]);
        let logical = build_logical(&objects, &trailer());
        let outlines = logical.outlines.unwrap();
        assert_eq!(outlines.children.len(), 2);
        assert_eq!(outlines.children[0].title.as_deref(), Some("One"));
        assert_eq!(outlines.node_count(), 3);
    }

    #[test]
    fn test_stats() {
        let stream = Value::Stream(crate::core::value::StreamValue {
            dict: Dictionary::new(),
            raw_data: vec![0; 10],
            decoded_data: Some(vec![0; 40]),
        });
        let objects = table(vec![
            object(1, dict(&[("S", Value::name("JavaScript")), ("JS", Value::reference(2, 0))])),
            object(2, stream),
            object(
                3,
                dict(&[(
                    "A",
                    dict(&[("S", Value::name("URI")), ("URI", Value::name("x"))]),
                )]),
            ),
        ]);
        let stats = Stats::compute(&objects, &LogicalStructure::default());
        assert_eq!(stats.object_count, 3);
        assert_eq!(stats.stream_count, 1);
        assert!(stats.has_javascript);
        assert!(stats.has_external_links);
        assert!(!stats.has_embedded_files);
        assert_eq!(stats.compression_ratio, 4.0);
        assert_eq!(stats.type_histogram.get("Stream"), Some(&1));
    }

    #[test]
    fn test_stats_without_streams() {
        let stats = Stats::compute(&ObjectTable::new(), &LogicalStructure::default());
        assert_eq!(stats.compression_ratio, 1.0);
        assert_eq!(stats.avg_object_size, 0.0);
    }
}
