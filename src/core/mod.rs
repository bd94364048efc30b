pub mod decode;
pub mod diagnostic;
pub mod document;
pub mod error;
pub mod graph;
pub mod issue;
pub mod lexer;
pub mod locator;
pub mod object_stream;
pub mod options;
pub mod parser;
pub mod rules;
pub mod structure;
pub mod value;
pub mod xref;

pub use diagnostic::{Diagnostic, DiagnosticKind};
pub use document::{DocumentStructure, parse, parse_with_options};
pub use error::{DuplicateObject, PDFError, PDFResult, ParseError};
pub use graph::{Edge, RelationshipGraph};
pub use issue::{Category, Issue, Level, Location};
pub use lexer::{Keyword, Lexer, Spanned, Token};
pub use options::ParseOptions;
pub use parser::Parser;
pub use structure::{
    Header, LogicalStructure, ObjectSource, ObjectTable, OutlineNode, PageTreeNode,
    PhysicalStructure, RawObject, Stats, XRefStatus,
};
pub use value::{Dictionary, ObjectId, PdfString, StreamValue, StringFormat, Value};
pub use xref::{XRefEntry, XRefKind, XRefSection};
