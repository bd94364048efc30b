use super::{Rule, ValidationContext};
use crate::core::issue::{Category, Issue, Location};
use crate::core::structure::{HEADER_SEARCH_WINDOW, PageTreeNode, RawObject};
use crate::core::value::{Dictionary, ObjectId, Value};
use crate::core::xref::{TrailerSource, XRefEntry};
use rustc_hash::{FxHashMap, FxHashSet};

const KNOWN_VERSIONS: &[&str] = &[
    "1.0", "1.1", "1.2", "1.3", "1.4", "1.5", "1.6", "1.7", "2.0",
];

/// Header marker, its position and version, and the end-of-file marker.
pub struct HeaderRule;

impl Rule for HeaderRule {
    fn category(&self) -> Category {
        Category::Header
    }

    fn check(&self, ctx: &ValidationContext<'_>) -> Vec<Issue> {
        let mut issues = Vec::new();
        match &ctx.physical.header {
            None => issues.push(Issue::error(
                Category::Header,
                Location::Document,
                "missing %PDF- header",
            )),
            Some(header) => {
                if header.offset > HEADER_SEARCH_WINDOW {
                    issues.push(Issue::error(
                        Category::Header,
                        Location::Offset(header.offset),
                        format!("header found at offset {}, beyond the first {} bytes", header.offset, HEADER_SEARCH_WINDOW),
                    ));
                } else if header.offset > 0 {
                    issues.push(Issue::warning(
                        Category::Header,
                        Location::Offset(header.offset),
                        format!("{} bytes of junk before the header", header.offset),
                    ));
                }
                if !KNOWN_VERSIONS.contains(&header.version.as_str()) {
                    issues.push(Issue::warning(
                        Category::Header,
                        Location::Offset(header.offset),
                        format!("unknown PDF version {:?}", header.version),
                    ));
                }
            }
        }

        if !ctx.physical.has_eof_marker {
            issues.push(Issue::warning(
                Category::Header,
                Location::Offset(ctx.physical.file_size),
                "missing %%EOF marker",
            ));
        }
        issues
    }
}

/// Presence and shape of the document catalog.
pub struct CatalogRule;

impl Rule for CatalogRule {
    fn category(&self) -> Category {
        Category::Catalog
    }

    fn check(&self, ctx: &ValidationContext<'_>) -> Vec<Issue> {
        let mut issues = Vec::new();

        let catalogs: Vec<ObjectId> = ctx
            .objects()
            .iter()
            .filter(|o| o.object_type == "Catalog")
            .map(|o| o.id)
            .collect();
        if catalogs.len() > 1 {
            let list: Vec<String> = catalogs.iter().map(ObjectId::to_string).collect();
            issues.push(Issue::warning(
                Category::Catalog,
                Location::Document,
                format!("{} catalog objects: {}", catalogs.len(), list.join(", ")),
            ));
        }

        let Some(id) = ctx.logical.catalog else {
            issues.push(Issue::error(
                Category::Catalog,
                Location::Document,
                "no catalog reachable from the trailer /Root",
            ));
            return issues;
        };
        let location = Location::Object(id);
        let Some(catalog) = ctx.objects().get(id).and_then(RawObject::dict) else {
            issues.push(Issue::error(
                Category::Catalog,
                location,
                "catalog is not a dictionary",
            ));
            return issues;
        };

        match catalog.get_name("Type") {
            Some("Catalog") => {}
            Some(other) => issues.push(Issue::error(
                Category::Catalog,
                location,
                format!("catalog has /Type /{}", other),
            )),
            None => issues.push(Issue::error(
                Category::Catalog,
                location,
                "catalog has no /Type",
            )),
        }
        if !catalog.contains_key("Pages") {
            issues.push(Issue::error(
                Category::Catalog,
                location,
                "catalog has no /Pages",
            ));
        }
        if let Some(version) = catalog.get_name("Version") {
            issues.push(Issue::info(
                Category::Catalog,
                location,
                format!("catalog overrides the header version with {}", version),
            ));
        }
        issues
    }
}

/// Page tree shape, counts and kids.
pub struct PagesRule;

impl Rule for PagesRule {
    fn category(&self) -> Category {
        Category::Pages
    }

    fn check(&self, ctx: &ValidationContext<'_>) -> Vec<Issue> {
        let mut issues = Vec::new();
        let Some(root) = &ctx.logical.page_tree else {
            issues.push(Issue::error(
                Category::Pages,
                Location::Document,
                "no page tree",
            ));
            return issues;
        };

        let root_type = ctx
            .objects()
            .get(root.id)
            .and_then(RawObject::dict)
            .and_then(|d| d.get_name("Type"));
        if root_type != Some("Pages") {
            issues.push(Issue::warning(
                Category::Pages,
                Location::Object(root.id),
                format!("page tree root has /Type {}", root_type.unwrap_or("(none)")),
            ));
        }

        // Leaf counts below a truncated node are partial
        let counts_complete = ctx.logical.truncated_page_nodes.is_empty();
        let mut checked = FxHashSet::default();
        root.walk(&mut |node| {
            if node.is_leaf || !checked.insert(node.id) {
                return;
            }
            let Some(dict) = ctx.objects().get(node.id).and_then(RawObject::dict) else {
                return;
            };
            match dict.get("Count").map(|v| (v, v.as_integer())) {
                Some((_, Some(count))) => {
                    if counts_complete && usize::try_from(count).ok() != Some(node.leaf_count) {
                        issues.push(Issue::warning(
                            Category::Pages,
                            Location::Object(node.id),
                            format!(
                                "/Count is {} but {} pages were found below",
                                count, node.leaf_count
                            ),
                        ));
                    }
                }
                Some((value, None)) => issues.push(Issue::warning(
                    Category::Pages,
                    Location::Object(node.id),
                    format!("/Count is not an integer: {}", value),
                )),
                None => issues.push(Issue::warning(
                    Category::Pages,
                    Location::Object(node.id),
                    "pages node has no /Count",
                )),
            }
        });

        for (node, kid) in &ctx.logical.broken_kids {
            issues.push(Issue::error(
                Category::Pages,
                Location::Object(*node),
                format!("/Kids entry {} does not resolve", kid),
            ));
        }

        for node in &ctx.logical.truncated_page_nodes {
            issues.push(Issue::info(
                Category::Pages,
                Location::Object(*node),
                "page tree walk stopped at its depth or visit limit below this node",
            ));
        }

        if ctx.logical.pages.is_empty() {
            issues.push(Issue::warning(
                Category::Pages,
                Location::Object(root.id),
                "document has no pages",
            ));
        }
        issues
    }
}

/// Per-page attributes, including inherited ones.
pub struct PageRule;

impl PageRule {
    /// Looks `key` up on the page, then on its ancestors.
    fn inherited<'a>(
        ctx: &ValidationContext<'a>,
        parents: &FxHashMap<ObjectId, ObjectId>,
        page: ObjectId,
        key: &str,
    ) -> Option<&'a Value> {
        let mut seen = FxHashSet::default();
        let mut current = Some(page);
        while let Some(id) = current {
            if !seen.insert(id) {
                break;
            }
            if let Some(value) = ctx
                .objects()
                .get(id)
                .and_then(RawObject::dict)
                .and_then(|d| d.get(key))
            {
                return Some(value);
            }
            current = parents.get(&id).copied();
        }
        None
    }

    fn check_page(
        ctx: &ValidationContext<'_>,
        parents: &FxHashMap<ObjectId, ObjectId>,
        node: &PageTreeNode,
        dict: &Dictionary,
        issues: &mut Vec<Issue>,
    ) {
        let location = Location::Object(node.id);
        match (dict.get("Parent"), node.parent) {
            (None, _) => issues.push(Issue::warning(Category::Page, location, "page has no /Parent")),
            (Some(value), Some(parent)) if value.as_reference() != Some(parent) => {
                issues.push(Issue::warning(
                    Category::Page,
                    location,
                    format!("/Parent is {} but the page is a kid of {}", value, parent),
                ))
            }
            _ => {}
        }

        match Self::inherited(ctx, parents, node.id, "MediaBox") {
            None => issues.push(Issue::error(
                Category::Page,
                location,
                "no /MediaBox on the page or its ancestors",
            )),
            Some(value) => {
                if !is_rectangle(ctx, value) {
                    issues.push(Issue::error(
                        Category::Page,
                        location,
                        format!("malformed /MediaBox {}", value),
                    ));
                }
            }
        }

        if Self::inherited(ctx, parents, node.id, "Resources").is_none() {
            issues.push(Issue::warning(
                Category::Page,
                location,
                "no /Resources on the page or its ancestors",
            ));
        }

        if let Some(contents) = dict.get("Contents") {
            // Dangling references are reported by the reference rule
            if let Some(resolved) = ctx.objects().resolve(contents) {
                if !matches!(resolved, Value::Stream(_) | Value::Array(_)) {
                    issues.push(Issue::warning(
                        Category::Page,
                        location,
                        format!("/Contents is a {}, not a stream or array", resolved.kind()),
                    ));
                }
            }
        }
    }
}

/// Four numbers, possibly behind a reference.
fn is_rectangle(ctx: &ValidationContext<'_>, value: &Value) -> bool {
    ctx.objects()
        .resolve(value)
        .and_then(Value::as_array)
        .is_some_and(|items| {
            items.len() == 4
                && items
                    .iter()
                    .all(|v| ctx.objects().resolve(v).and_then(Value::as_number).is_some())
        })
}

impl Rule for PageRule {
    fn category(&self) -> Category {
        Category::Page
    }

    fn check(&self, ctx: &ValidationContext<'_>) -> Vec<Issue> {
        let mut issues = Vec::new();
        let Some(root) = &ctx.logical.page_tree else {
            return issues;
        };

        let mut parents = FxHashMap::default();
        let mut leaves = Vec::new();
        root.walk(&mut |node| {
            if let Some(parent) = node.parent {
                parents.entry(node.id).or_insert(parent);
            }
            if node.is_leaf {
                leaves.push(node);
            }
        });

        let mut checked = FxHashSet::default();
        for node in leaves {
            if !checked.insert(node.id) {
                continue;
            }
            if let Some(dict) = ctx.objects().get(node.id).and_then(RawObject::dict) {
                Self::check_page(ctx, &parents, node, dict, &mut issues);
            }
        }
        issues
    }
}

/// Required and advisory trailer keys.
pub struct TrailerRule;

impl Rule for TrailerRule {
    fn category(&self) -> Category {
        Category::Trailer
    }

    fn check(&self, ctx: &ValidationContext<'_>) -> Vec<Issue> {
        let trailer = &ctx.physical.trailer;
        let mut issues = Vec::new();
        if trailer.is_empty() {
            issues.push(Issue::error(
                Category::Trailer,
                Location::Document,
                "no trailer dictionary",
            ));
            return issues;
        }

        match trailer.get("Root") {
            None => issues.push(Issue::error(
                Category::Trailer,
                Location::Document,
                "trailer has no /Root",
            )),
            Some(Value::Reference(_)) => {}
            Some(other) => issues.push(Issue::warning(
                Category::Trailer,
                Location::Document,
                format!("trailer /Root is a {}, not a reference", other.kind()),
            )),
        }

        match trailer.get_integer("Size") {
            None => issues.push(Issue::warning(
                Category::Trailer,
                Location::Document,
                "trailer has no /Size",
            )),
            Some(size) => {
                if let Some(max) = ctx.objects().max_object_number() {
                    if size <= i64::from(max) {
                        issues.push(Issue::warning(
                            Category::Trailer,
                            Location::Document,
                            format!("/Size {} does not exceed the highest object number {}", size, max),
                        ));
                    }
                }
            }
        }

        if !trailer.contains_key("ID") {
            issues.push(Issue::info(
                Category::Trailer,
                Location::Document,
                "trailer has no /ID",
            ));
        }
        if trailer.contains_key("Encrypt") {
            issues.push(Issue::info(
                Category::Trailer,
                Location::Document,
                "document is encrypted",
            ));
        }
        issues
    }
}

/// Cross-reference outcome, reconciliation findings and object syntax.
pub struct XRefRule;

impl Rule for XRefRule {
    fn category(&self) -> Category {
        Category::XRef
    }

    fn check(&self, ctx: &ValidationContext<'_>) -> Vec<Issue> {
        let status = &ctx.physical.xref_status;
        let mut issues = Vec::new();

        if let Some(reason) = &status.failure {
            issues.push(Issue::warning(
                Category::XRef,
                Location::Document,
                format!("cross-reference data unusable: {}", reason),
            ));
        }
        if let Some((declared, actual)) = status.repaired_start {
            issues.push(Issue::warning(
                Category::XRef,
                Location::Offset(declared),
                format!("startxref points to {} but the section is at {}", declared, actual),
            ));
        }
        let recovered_from = match status.trailer_source {
            TrailerSource::Chain => None,
            TrailerSource::Scanned => Some("a scanned trailer dictionary"),
            TrailerSource::XRefStream => Some("an xref stream dictionary"),
            TrailerSource::Synthesized => Some("the catalog object"),
            TrailerSource::Missing => Some("nothing"),
        };
        if let Some(source) = recovered_from {
            issues.push(Issue::info(
                Category::XRef,
                Location::Document,
                format!("trailer recovered from {}", source),
            ));
        }
        if status.loop_detected {
            issues.push(Issue::warning(
                Category::XRef,
                Location::Document,
                "/Prev chain loops back on itself",
            ));
        }
        if status.hop_limit_hit {
            issues.push(Issue::warning(
                Category::XRef,
                Location::Document,
                "/Prev chain is longer than the number of objects",
            ));
        }

        for mismatch in &status.offset_mismatches {
            issues.push(Issue::warning(
                Category::XRef,
                Location::Object(mismatch.id),
                format!(
                    "declared at offset {} but found at {}",
                    mismatch.declared, mismatch.actual
                ),
            ));
        }
        for missing in &status.missing {
            let (location, detail) = match missing.entry {
                XRefEntry::InUse { offset, .. } => {
                    (Location::Offset(offset), format!("at offset {}", offset))
                }
                XRefEntry::Compressed { stream, index } => (
                    Location::Document,
                    format!("in object stream {} at index {}", stream, index),
                ),
                XRefEntry::Free { .. } => (Location::Document, String::new()),
            };
            issues.push(Issue::warning(
                Category::XRef,
                location,
                format!("xref lists {} {} but no such object exists", missing.id, detail),
            ));
        }
        for id in &status.unlisted {
            issues.push(Issue::info(
                Category::XRef,
                Location::Object(*id),
                "object is not listed in the cross-reference data",
            ));
        }
        for redefinition in &status.redefined {
            issues.push(Issue::info(
                Category::XRef,
                Location::Object(redefinition.id),
                format!(
                    "object defined again; copy at {} superseded by the one at {}",
                    redefinition.offset, redefinition.kept_offset
                ),
            ));
        }
        for (stream, reason) in &status.object_stream_failures {
            issues.push(Issue::warning(
                Category::XRef,
                Location::Object(*stream),
                format!("object stream not expanded: {}", reason),
            ));
        }

        for object in ctx.objects() {
            for diagnostic in object
                .diagnostics
                .iter()
                .filter(|d| !d.kind.is_stream_related())
            {
                issues.push(Issue::info(
                    Category::XRef,
                    Location::Object(object.id),
                    format!("{} (offset {})", diagnostic.message, diagnostic.offset),
                ));
            }
        }
        issues
    }
}
