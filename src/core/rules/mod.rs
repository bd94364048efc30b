//! Validation rules.
//!
//! Each rule covers one [`Category`] and reads the finished structure
//! without modifying it. Rules are independent, so the [`Validator`] may run
//! them on a rayon pool; results are merged in category order either way.

mod integrity;
mod resources;
mod structure;

pub use integrity::{PerformanceRule, ReferenceRule, SecurityRule};
pub use resources::{FontRule, StreamRule, XObjectRule};
pub use structure::{CatalogRule, HeaderRule, PageRule, PagesRule, TrailerRule, XRefRule};

use super::graph::RelationshipGraph;
use super::issue::{Category, Issue};
use super::options::ParseOptions;
use super::structure::{LogicalStructure, ObjectTable, PhysicalStructure, Stats};
use std::time::Instant;
use tracing::debug;

/// Everything a rule may look at.
#[derive(Debug, Clone, Copy)]
pub struct ValidationContext<'a> {
    pub physical: &'a PhysicalStructure,
    pub logical: &'a LogicalStructure,
    pub graph: &'a RelationshipGraph,
    pub stats: &'a Stats,
    pub options: &'a ParseOptions,
}

impl<'a> ValidationContext<'a> {
    pub fn objects(&self) -> &'a ObjectTable {
        &self.physical.objects
    }
}

/// One category of checks.
pub trait Rule: Send + Sync {
    fn category(&self) -> Category;

    fn check(&self, ctx: &ValidationContext<'_>) -> Vec<Issue>;
}

/// An ordered set of rules.
pub struct Validator {
    rules: Vec<Box<dyn Rule>>,
}

impl Validator {
    /// A validator with no rules.
    pub fn new() -> Self {
        Validator { rules: Vec::new() }
    }

    /// One rule per category.
    pub fn with_default_rules() -> Self {
        let mut validator = Validator::new();
        validator.add(HeaderRule);
        validator.add(CatalogRule);
        validator.add(PagesRule);
        validator.add(PageRule);
        validator.add(FontRule);
        validator.add(XObjectRule);
        validator.add(StreamRule);
        validator.add(XRefRule);
        validator.add(TrailerRule);
        validator.add(ReferenceRule);
        validator.add(SecurityRule);
        validator.add(PerformanceRule);
        validator
    }

    pub fn add(&mut self, rule: impl Rule + 'static) {
        self.rules.push(Box::new(rule));
    }

    pub fn rules(&self) -> impl Iterator<Item = &dyn Rule> {
        self.rules.iter().map(|r| r.as_ref())
    }

    /// Runs every rule and returns the issues ordered by category, then by
    /// the order each rule reported them.
    pub fn run(&self, ctx: &ValidationContext<'_>, parallel: bool) -> Vec<Issue> {
        let mut results: Vec<(Category, Vec<Issue>)> = if parallel {
            self.run_parallel(ctx)
        } else {
            self.rules.iter().map(|rule| run_rule(rule.as_ref(), ctx)).collect()
        };

        results.sort_by_key(|(category, _)| *category);
        results.into_iter().flat_map(|(_, issues)| issues).collect()
    }

    #[cfg(feature = "parallel")]
    fn run_parallel(&self, ctx: &ValidationContext<'_>) -> Vec<(Category, Vec<Issue>)> {
        use rayon::prelude::*;
        self.rules
            .par_iter()
            .map(|rule| run_rule(rule.as_ref(), ctx))
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    fn run_parallel(&self, ctx: &ValidationContext<'_>) -> Vec<(Category, Vec<Issue>)> {
        self.rules.iter().map(|rule| run_rule(rule.as_ref(), ctx)).collect()
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::with_default_rules()
    }
}

fn run_rule(rule: &dyn Rule, ctx: &ValidationContext<'_>) -> (Category, Vec<Issue>) {
    let started = Instant::now();
    let issues = rule.check(ctx);
    debug!(
        category = %rule.category(),
        issues = issues.len(),
        elapsed_us = started.elapsed().as_micros() as u64,
        "Rule finished"
    );
    (rule.category(), issues)
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    const MINIMAL: &[&str] = &[
        "<< /Type /Catalog /Pages 2 0 R >>",
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>",
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Resources << >> >>",
    ];

    #[test]
    fn test_default_rules_cover_every_category() {
        let validator = Validator::with_default_rules();
        let categories: Vec<Category> = validator.rules().map(|r| r.category()).collect();
        assert_eq!(categories, Category::ALL.to_vec());
    }

    #[test]
    fn test_results_are_ordered_and_deterministic() {
        let data = pdf(MINIMAL, "<< /Root 1 0 R /Size 4 /Parent 9 0 R >>");
        with_context(&data, |ctx| {
            let validator = Validator::with_default_rules();
            let sequential = validator.run(ctx, false);
            let parallel = validator.run(ctx, true);
            assert_eq!(sequential, parallel);
            assert!(
                sequential
                    .windows(2)
                    .all(|w| w[0].category <= w[1].category)
            );
        });
    }
}
