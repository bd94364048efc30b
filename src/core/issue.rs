use super::value::ObjectId;
use std::fmt;

/// Severity of a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Level {
    Error,
    Warning,
    Info,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Level::Error => "error",
            Level::Warning => "warning",
            Level::Info => "info",
        })
    }
}

/// The rule category that produced a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Header,
    Catalog,
    Pages,
    Page,
    Font,
    XObject,
    Stream,
    XRef,
    Trailer,
    Reference,
    Security,
    Performance,
}

impl Category {
    /// Every category, in reporting order.
    pub const ALL: [Category; 12] = [
        Category::Header,
        Category::Catalog,
        Category::Pages,
        Category::Page,
        Category::Font,
        Category::XObject,
        Category::Stream,
        Category::XRef,
        Category::Trailer,
        Category::Reference,
        Category::Security,
        Category::Performance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Header => "header",
            Category::Catalog => "catalog",
            Category::Pages => "pages",
            Category::Page => "page",
            Category::Font => "font",
            Category::XObject => "xobject",
            Category::Stream => "stream",
            Category::XRef => "xref",
            Category::Trailer => "trailer",
            Category::Reference => "reference",
            Category::Security => "security",
            Category::Performance => "performance",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a finding applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Location {
    /// An object present in the object table
    Object(ObjectId),
    /// A byte offset in the file
    Offset(usize),
    /// A reference from an existing object to one that does not exist
    DanglingReference { from: ObjectId, target: ObjectId },
    /// The document as a whole
    Document,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Object(id) => write!(f, "object {}", id),
            Location::Offset(offset) => write!(f, "offset {}", offset),
            Location::DanglingReference { from, target } => {
                write!(f, "object {} -> {}", from, target)
            }
            Location::Document => f.write_str("document"),
        }
    }
}

/// A validation finding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub level: Level,
    pub category: Category,
    pub location: Location,
    pub message: String,
}

impl Issue {
    pub fn new(
        level: Level,
        category: Category,
        location: Location,
        message: impl Into<String>,
    ) -> Self {
        Issue {
            level,
            category,
            location,
            message: message.into(),
        }
    }

    pub fn error(category: Category, location: Location, message: impl Into<String>) -> Self {
        Self::new(Level::Error, category, location, message)
    }

    pub fn warning(category: Category, location: Location, message: impl Into<String>) -> Self {
        Self::new(Level::Warning, category, location, message)
    }

    pub fn info(category: Category, location: Location, message: impl Into<String>) -> Self {
        Self::new(Level::Info, category, location, message)
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} ({}): {}",
            self.level, self.category, self.location, self.message
        )
    }
}
