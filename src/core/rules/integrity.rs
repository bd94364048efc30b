use super::{Rule, ValidationContext};
use crate::core::issue::{Category, Issue, Location};
use crate::core::structure::{RawObject, has_javascript, is_external_action};
use crate::core::value::{Dictionary, Value};

/// Dangling references and page tree cycles.
pub struct ReferenceRule;

impl Rule for ReferenceRule {
    fn category(&self) -> Category {
        Category::Reference
    }

    fn check(&self, ctx: &ValidationContext<'_>) -> Vec<Issue> {
        let mut issues: Vec<Issue> = ctx
            .graph
            .dangling_edges()
            .map(|edge| {
                let key = if edge.key.is_empty() {
                    String::new()
                } else {
                    format!(" under /{}", edge.key)
                };
                Issue::error(
                    Category::Reference,
                    Location::DanglingReference {
                        from: edge.from,
                        target: edge.to,
                    },
                    format!("reference to missing object {}{}", edge.to, key),
                )
            })
            .collect();

        for (node, kid) in &ctx.logical.page_tree_cycles {
            issues.push(Issue::error(
                Category::Reference,
                Location::Object(*node),
                format!("page tree cycle: /Kids entry {} is an ancestor", kid),
            ));
        }
        issues
    }
}

/// Active content, embedded files, external actions, encryption and forms.
pub struct SecurityRule;

impl SecurityRule {
    fn check_object(ctx: &ValidationContext<'_>, object: &RawObject, issues: &mut Vec<Issue>) {
        let location = Location::Object(object.id);
        let mut javascript = false;
        let mut auto_javascript = false;
        let mut embedded = object.object_type == "EmbeddedFile";
        let mut launch = false;
        let mut external = Vec::new();

        object.value.for_each_dict(&mut |dict| {
            javascript |= has_javascript(dict);
            embedded |= dict.contains_key("EF") || dict.contains_key("EmbeddedFiles");
            if dict.has_name("S", "Launch") {
                launch = true;
            } else if is_external_action(dict) {
                if let Some(kind) = dict.get_name("S") {
                    if !external.contains(&kind) {
                        external.push(kind);
                    }
                }
            }
            auto_javascript |= Self::automatic_javascript(ctx, dict);
        });

        if javascript {
            issues.push(Issue::warning(
                Category::Security,
                location,
                "contains JavaScript",
            ));
        }
        if auto_javascript {
            issues.push(Issue::warning(
                Category::Security,
                location,
                "automatic action (/OpenAction or /AA) runs JavaScript",
            ));
        }
        if embedded {
            issues.push(Issue::warning(
                Category::Security,
                location,
                "embedded file",
            ));
        }
        if launch {
            issues.push(Issue::warning(
                Category::Security,
                location,
                "/Launch action starts an external application",
            ));
        }
        for kind in external {
            issues.push(Issue::info(
                Category::Security,
                location,
                format!("/{} action leaves the document", kind),
            ));
        }
    }

    /// `/OpenAction` or any `/AA` trigger resolving to a JavaScript action.
    fn automatic_javascript(ctx: &ValidationContext<'_>, dict: &Dictionary) -> bool {
        let runs_js = |value: &Value| {
            ctx.objects()
                .resolve_dict(value)
                .is_some_and(has_javascript)
        };
        let open_action = dict.get("OpenAction").is_some_and(runs_js);
        let additional = dict
            .get("AA")
            .and_then(|aa| ctx.objects().resolve_dict(aa))
            .is_some_and(|aa| aa.iter().any(|(_, action)| runs_js(action)));
        open_action || additional
    }
}

impl Rule for SecurityRule {
    fn category(&self) -> Category {
        Category::Security
    }

    fn check(&self, ctx: &ValidationContext<'_>) -> Vec<Issue> {
        let mut issues = Vec::new();
        for object in ctx.objects() {
            Self::check_object(ctx, object, &mut issues);
        }

        if ctx.physical.trailer.contains_key("Encrypt") {
            issues.push(Issue::info(
                Category::Security,
                Location::Document,
                "document is encrypted",
            ));
        }

        let acro_form = ctx
            .logical
            .catalog
            .and_then(|id| ctx.objects().get(id))
            .and_then(RawObject::dict)
            .and_then(|catalog| catalog.get("AcroForm"))
            .and_then(|form| ctx.objects().resolve_dict(form));
        if acro_form.is_some_and(|form| form.contains_key("XFA")) {
            issues.push(Issue::info(
                Category::Security,
                Location::Document,
                "interactive form uses XFA",
            ));
        }
        issues
    }
}

/// Large objects, wide fan-out and suspicious decompression ratios.
pub struct PerformanceRule;

impl Rule for PerformanceRule {
    fn category(&self) -> Category {
        Category::Performance
    }

    fn check(&self, ctx: &ValidationContext<'_>) -> Vec<Issue> {
        let options = ctx.options;
        let mut issues = Vec::new();
        for object in ctx.objects() {
            let location = Location::Object(object.id);

            if object.raw_content.len() > options.large_object_threshold {
                issues.push(Issue::info(
                    Category::Performance,
                    location,
                    format!("large object ({} bytes)", object.raw_content.len()),
                ));
            }

            let fan_out = ctx.graph.fan_out(object.id);
            if fan_out > options.max_fan_out {
                issues.push(Issue::info(
                    Category::Performance,
                    location,
                    format!("references {} distinct objects", fan_out),
                ));
            }

            if let Some(stream) = object.value.as_stream() {
                if let Some(decoded) = &stream.decoded_data {
                    if !stream.raw_data.is_empty() {
                        let ratio = decoded.len() as f64 / stream.raw_data.len() as f64;
                        if ratio > options.max_decompression_ratio {
                            issues.push(Issue::info(
                                Category::Performance,
                                location,
                                format!(
                                    "stream expands {:.0}x ({} to {} bytes)",
                                    ratio,
                                    stream.raw_data.len(),
                                    decoded.len()
                                ),
                            ));
                        }
                    }
                }
            }
        }
        issues
    }
}
