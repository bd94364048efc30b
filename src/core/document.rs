use super::error::ParseError;
use super::graph::RelationshipGraph;
use super::issue::{Category, Issue, Level};
use super::locator::locate_objects;
use super::options::ParseOptions;
use super::rules::{ValidationContext, Validator};
use super::structure::{
    HEADER_SEARCH_WINDOW, LogicalStructure, ObjectTable, PhysicalStructure, RawObject, Stats,
    assemble_physical, build_logical, find_header,
};
use super::value::{ObjectId, Value};
use super::xref;
use tracing::{debug, info, info_span};

/// The parsed and validated structure of one PDF file.
///
/// Built once by [`parse`] and read-only afterwards.
#[derive(Debug, Clone)]
pub struct DocumentStructure {
    pub physical: PhysicalStructure,
    pub logical: LogicalStructure,
    pub issues: Vec<Issue>,
    pub stats: Stats,
    pub graph: RelationshipGraph,
}

/// Parses `data` with the default options.
///
/// # Example
/// ```no_run
/// let data = std::fs::read("document.pdf").unwrap();
/// let doc = pdf_xray::parse(&data).unwrap();
/// for issue in &doc.issues {
///     println!("{}", issue);
/// }
/// ```
pub fn parse(data: &[u8]) -> Result<DocumentStructure, ParseError> {
    parse_with_options(data, &ParseOptions::default())
}

/// Parses `data`, building the physical and logical structure, the
/// reference graph, statistics and validation issues.
///
/// Fails only on empty input or when no `%PDF-` header appears in the first
/// [`HEADER_SEARCH_WINDOW`] bytes. Every other problem is reported as an
/// [`Issue`].
pub fn parse_with_options(
    data: &[u8],
    options: &ParseOptions,
) -> Result<DocumentStructure, ParseError> {
    let span = info_span!("parse", bytes = data.len());
    let _guard = span.enter();

    if data.is_empty() {
        return Err(ParseError::Empty);
    }
    let header = find_header(data).ok_or(ParseError::MissingHeader {
        searched: HEADER_SEARCH_WINDOW,
    })?;
    debug!(version = %header.version, offset = header.offset, "Found header");

    let located = locate_objects(data, options);
    let start_xref = xref::find_startxref(data).ok();
    let hop_limit = located.len().max(1);
    let resolution = xref::resolve(data, start_xref, hop_limit, options.max_decoded_stream_size);

    let physical = assemble_physical(data, Some(header), located, resolution, start_xref, options);
    let logical = build_logical(&physical.objects, &physical.trailer);
    let stats = Stats::compute(&physical.objects, &logical);
    let graph = RelationshipGraph::build(&physical.objects);

    let issues = {
        let ctx = ValidationContext {
            physical: &physical,
            logical: &logical,
            graph: &graph,
            stats: &stats,
            options,
        };
        Validator::with_default_rules().run(&ctx, options.parallel_validation)
    };

    info!(
        objects = stats.object_count,
        pages = stats.page_count,
        issues = issues.len(),
        "Parsed document"
    );

    Ok(DocumentStructure {
        physical,
        logical,
        issues,
        stats,
        graph,
    })
}

impl DocumentStructure {
    pub fn objects(&self) -> &ObjectTable {
        &self.physical.objects
    }

    /// Looks an object up by identity.
    pub fn get_object(&self, number: u32, generation: u16) -> Option<&RawObject> {
        self.physical.objects.get(ObjectId::new(number, generation))
    }

    /// Objects whose inferred type is `object_type`, in discovery order.
    pub fn find_objects_by_type(&self, object_type: &str) -> Vec<&RawObject> {
        self.physical
            .objects
            .iter()
            .filter(|o| o.object_type == object_type)
            .collect()
    }

    /// Objects whose dictionary has `key` equal to `value`.
    pub fn find_objects_by_property(&self, key: &str, value: &Value) -> Vec<&RawObject> {
        self.physical
            .objects
            .iter()
            .filter(|o| o.properties.get(key) == Some(value))
            .collect()
    }

    pub fn issues_by_category(&self, category: Category) -> Vec<&Issue> {
        self.issues.iter().filter(|i| i.category == category).collect()
    }

    pub fn issues_by_level(&self, level: Level) -> Vec<&Issue> {
        self.issues.iter().filter(|i| i.level == level).collect()
    }

    /// Leaf pages in document order.
    pub fn pages(&self) -> Vec<&RawObject> {
        self.logical
            .pages
            .iter()
            .filter_map(|id| self.physical.objects.get(*id))
            .collect()
    }

    pub fn catalog(&self) -> Option<&RawObject> {
        self.logical
            .catalog
            .and_then(|id| self.physical.objects.get(id))
    }

    /// The header version, e.g. `"1.7"`.
    pub fn version(&self) -> Option<&str> {
        self.physical.header.as_ref().map(|h| h.version.as_str())
    }

    pub fn has_errors(&self) -> bool {
        self.issues.iter().any(|i| i.level == Level::Error)
    }
}
