//! Structural parser and validator for PDF files.
//!
//! [`parse`] turns a byte buffer into a [`DocumentStructure`]: the objects as
//! found in the file, the tree reachable from the catalog, a reference graph,
//! summary statistics and a list of validation issues.

pub mod core;

// Re-export main types for convenience
pub use core::{
    Category, Dictionary, DocumentStructure, Issue, Level, Location, ObjectId, ObjectTable,
    ParseError, ParseOptions, RawObject, RelationshipGraph, Stats, Value, parse,
    parse_with_options,
};
