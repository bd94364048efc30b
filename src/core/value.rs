use indexmap::IndexMap;
use std::fmt;

/// Identity of an indirect object: object number plus generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId {
    pub number: u32,
    pub generation: u16,
}

impl ObjectId {
    pub const fn new(number: u32, generation: u16) -> Self {
        ObjectId { number, generation }
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} R", self.number, self.generation)
    }
}

/// How a string was written in the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringFormat {
    Literal,
    Hex,
}

/// A PDF string. Equality compares the bytes only, so `(A)` equals `<41>`.
#[derive(Debug, Clone)]
pub struct PdfString {
    pub bytes: Vec<u8>,
    pub format: StringFormat,
}

impl PdfString {
    pub fn literal(bytes: impl Into<Vec<u8>>) -> Self {
        PdfString {
            bytes: bytes.into(),
            format: StringFormat::Literal,
        }
    }

    pub fn hex(bytes: impl Into<Vec<u8>>) -> Self {
        PdfString {
            bytes: bytes.into(),
            format: StringFormat::Hex,
        }
    }

    /// Lossy text rendering, decoding UTF-16BE when a BOM is present.
    pub fn to_text(&self) -> String {
        if self.bytes.starts_with(&[0xFE, 0xFF]) {
            let units: Vec<u16> = self.bytes[2..]
                .chunks_exact(2)
                .map(|c| u16::from_be_bytes([c[0], c[1]]))
                .collect();
            String::from_utf16_lossy(&units)
        } else {
            self.bytes.iter().map(|b| *b as char).collect()
        }
    }
}

impl PartialEq for PdfString {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

/// A dictionary value. Keys are unique and keep their first insertion
/// position; re-inserting a key replaces the value in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dictionary {
    entries: IndexMap<String, Value>,
}

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.entries.insert(key.into(), value)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    /// Returns the name stored under `key`, if it is a name.
    pub fn get_name(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_name)
    }

    /// Returns true if `key` holds the name `name`.
    pub fn has_name(&self, key: &str, name: &str) -> bool {
        self.get_name(key) == Some(name)
    }

    pub fn get_integer(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Value::as_integer)
    }

    pub fn get_number(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(Value::as_number)
    }

    pub fn get_reference(&self, key: &str) -> Option<ObjectId> {
        self.get(key).and_then(Value::as_reference)
    }

    pub fn get_dict(&self, key: &str) -> Option<&Dictionary> {
        self.get(key).and_then(Value::as_dict)
    }

    pub fn get_array(&self, key: &str) -> Option<&[Value]> {
        self.get(key).and_then(Value::as_array)
    }

    /// Copies every entry of `other` that is not already present.
    pub fn merge_missing(&mut self, other: &Dictionary) {
        for (key, value) in other.iter() {
            if !self.contains_key(key) {
                self.entries.insert(key.clone(), value.clone());
            }
        }
    }
}

impl FromIterator<(String, Value)> for Dictionary {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut dict = Dictionary::new();
        for (key, value) in iter {
            dict.insert(key, value);
        }
        dict
    }
}

/// A stream: its dictionary, the raw payload as found in the file, and the
/// decoded payload when every filter could be applied.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamValue {
    pub dict: Dictionary,
    pub raw_data: Vec<u8>,
    pub decoded_data: Option<Vec<u8>>,
}

impl StreamValue {
    /// Filter names in application order as written in `/Filter`.
    pub fn filters(&self) -> Vec<&str> {
        match self.dict.get("Filter") {
            Some(Value::Name(name)) => vec![name.as_str()],
            Some(Value::Array(items)) => items.iter().filter_map(Value::as_name).collect(),
            _ => Vec::new(),
        }
    }
}

/// PDF value as defined by the file syntax.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Number(f64),
    String(PdfString),
    Name(String),
    Array(Vec<Value>),
    Dictionary(Dictionary),
    Reference(ObjectId),
    Stream(StreamValue),
}

impl Value {
    pub fn name(name: impl Into<String>) -> Value {
        Value::Name(name.into())
    }

    pub fn integer(n: i64) -> Value {
        Value::Number(n as f64)
    }

    pub fn reference(number: u32, generation: u16) -> Value {
        Value::Reference(ObjectId::new(number, generation))
    }

    pub fn as_name(&self) -> Option<&str> {
        match self {
            Value::Name(name) => Some(name),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the number when it has no fractional part.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Number(n) if n.fract() == 0.0 && n.is_finite() => Some(*n as i64),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<ObjectId> {
        match self {
            Value::Reference(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the dictionary of a dictionary or a stream.
    pub fn as_dict(&self) -> Option<&Dictionary> {
        match self {
            Value::Dictionary(dict) => Some(dict),
            Value::Stream(stream) => Some(&stream.dict),
            _ => None,
        }
    }

    pub fn as_stream(&self) -> Option<&StreamValue> {
        match self {
            Value::Stream(stream) => Some(stream),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short kind name used for type inference and messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Boolean(_) => "Boolean",
            Value::Number(_) => "Number",
            Value::String(_) => "String",
            Value::Name(_) => "Name",
            Value::Array(_) => "Array",
            Value::Dictionary(_) => "Dictionary",
            Value::Reference(_) => "Reference",
            Value::Stream(_) => "Stream",
        }
    }

    /// Calls `visit` for every reference contained in this value, together
    /// with the dictionary key it was found under (the nearest one for
    /// array members).
    pub fn for_each_reference<'v, F>(&'v self, visit: &mut F)
    where
        F: FnMut(&'v str, ObjectId),
    {
        self.walk_references("", visit);
    }

    fn walk_references<'v, F>(&'v self, key: &'v str, visit: &mut F)
    where
        F: FnMut(&'v str, ObjectId),
    {
        match self {
            Value::Reference(id) => visit(key, *id),
            Value::Array(items) => {
                for item in items {
                    item.walk_references(key, visit);
                }
            }
            Value::Dictionary(dict) => {
                for (k, v) in dict.iter() {
                    v.walk_references(k, visit);
                }
            }
            Value::Stream(stream) => {
                for (k, v) in stream.dict.iter() {
                    v.walk_references(k, visit);
                }
            }
            _ => {}
        }
    }

    /// Calls `visit` for every dictionary nested anywhere in this value,
    /// including this one and stream dictionaries.
    pub fn for_each_dict<'v, F>(&'v self, visit: &mut F)
    where
        F: FnMut(&'v Dictionary),
    {
        match self {
            Value::Dictionary(dict) => {
                visit(dict);
                for (_, v) in dict.iter() {
                    v.for_each_dict(visit);
                }
            }
            Value::Stream(stream) => {
                visit(&stream.dict);
                for (_, v) in stream.dict.iter() {
                    v.for_each_dict(visit);
                }
            }
            Value::Array(items) => {
                for item in items {
                    item.for_each_dict(visit);
                }
            }
            _ => {}
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{}", n)
                }
            }
            Value::String(s) => match s.format {
                StringFormat::Literal => write!(f, "({})", s.to_text()),
                StringFormat::Hex => {
                    write!(f, "<")?;
                    for b in &s.bytes {
                        write!(f, "{:02X}", b)?;
                    }
                    write!(f, ">")
                }
            },
            Value::Name(name) => write!(f, "/{}", name),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Dictionary(dict) => write_dict(f, dict),
            Value::Reference(id) => write!(f, "{}", id),
            Value::Stream(stream) => {
                write_dict(f, &stream.dict)?;
                write!(f, " stream[{} bytes]", stream.raw_data.len())
            }
        }
    }
}

fn write_dict(f: &mut fmt::Formatter<'_>, dict: &Dictionary) -> fmt::Result {
    write!(f, "<<")?;
    for (key, value) in dict.iter() {
        write!(f, " /{} {}", key, value)?;
    }
    write!(f, " >>")
}
