use super::{Rule, ValidationContext};
use crate::core::diagnostic::DiagnosticKind;
use crate::core::issue::{Category, Issue, Level, Location};
use crate::core::structure::RawObject;
use crate::core::value::Value;

const FONT_SUBTYPES: &[&str] = &[
    "Type0",
    "Type1",
    "MMType1",
    "Type3",
    "TrueType",
    "CIDFontType0",
    "CIDFontType2",
];

const STANDARD_14: &[&str] = &[
    "Times-Roman",
    "Times-Bold",
    "Times-Italic",
    "Times-BoldItalic",
    "Helvetica",
    "Helvetica-Bold",
    "Helvetica-Oblique",
    "Helvetica-BoldOblique",
    "Courier",
    "Courier-Bold",
    "Courier-Oblique",
    "Courier-BoldOblique",
    "Symbol",
    "ZapfDingbats",
];

/// Font dictionaries.
pub struct FontRule;

impl FontRule {
    fn check_font(object: &RawObject, issues: &mut Vec<Issue>) {
        let dict = &object.properties;
        let location = Location::Object(object.id);

        let Some(subtype) = dict.get_name("Subtype") else {
            issues.push(Issue::error(Category::Font, location, "font has no /Subtype"));
            return;
        };
        if !FONT_SUBTYPES.contains(&subtype) {
            issues.push(Issue::warning(
                Category::Font,
                location,
                format!("unknown font subtype /{}", subtype),
            ));
        }

        let base_font = dict.get_name("BaseFont");
        if base_font.is_none() && subtype != "Type3" {
            issues.push(Issue::warning(Category::Font, location, "font has no /BaseFont"));
        }

        let simple = matches!(subtype, "Type1" | "MMType1" | "TrueType");
        let standard = base_font.is_some_and(|name| STANDARD_14.contains(&name));
        if simple && !standard && !dict.contains_key("FontDescriptor") {
            issues.push(Issue::warning(
                Category::Font,
                location,
                format!(
                    "non-standard font {} has no /FontDescriptor",
                    base_font.unwrap_or("(unnamed)")
                ),
            ));
        }

        if subtype == "Type0" && !dict.contains_key("DescendantFonts") {
            issues.push(Issue::error(
                Category::Font,
                location,
                "Type0 font has no /DescendantFonts",
            ));
        }
    }
}

impl Rule for FontRule {
    fn category(&self) -> Category {
        Category::Font
    }

    fn check(&self, ctx: &ValidationContext<'_>) -> Vec<Issue> {
        let mut issues = Vec::new();
        for object in ctx.objects().iter().filter(|o| o.object_type == "Font") {
            Self::check_font(object, &mut issues);
        }
        issues
    }
}

/// Image and form XObjects.
pub struct XObjectRule;

impl XObjectRule {
    fn is_xobject(object: &RawObject) -> bool {
        object.object_type == "XObject"
            || (object.is_stream
                && !object.properties.contains_key("Type")
                && matches!(object.properties.get_name("Subtype"), Some("Image" | "Form")))
    }

    fn check_xobject(object: &RawObject, issues: &mut Vec<Issue>) {
        let dict = &object.properties;
        let location = Location::Object(object.id);

        match dict.get_name("Subtype") {
            None => issues.push(Issue::error(
                Category::XObject,
                location,
                "XObject has no /Subtype",
            )),
            Some("Image") => {
                for key in ["Width", "Height"] {
                    if !dict.contains_key(key) {
                        issues.push(Issue::error(
                            Category::XObject,
                            location,
                            format!("image has no /{}", key),
                        ));
                    }
                }

                let is_mask = matches!(dict.get("ImageMask"), Some(Value::Boolean(true)));
                let is_jpx = object
                    .value
                    .as_stream()
                    .is_some_and(|s| s.filters().contains(&"JPXDecode"));
                if !is_mask && !is_jpx {
                    if !dict.contains_key("ColorSpace") {
                        issues.push(Issue::warning(
                            Category::XObject,
                            location,
                            "image has no /ColorSpace",
                        ));
                    }
                    if !dict.contains_key("BitsPerComponent") {
                        issues.push(Issue::warning(
                            Category::XObject,
                            location,
                            "image has no /BitsPerComponent",
                        ));
                    }
                }
            }
            Some("Form") => {
                if !dict.contains_key("BBox") {
                    issues.push(Issue::error(
                        Category::XObject,
                        location,
                        "form XObject has no /BBox",
                    ));
                }
            }
            Some(_) => {}
        }
    }
}

impl Rule for XObjectRule {
    fn category(&self) -> Category {
        Category::XObject
    }

    fn check(&self, ctx: &ValidationContext<'_>) -> Vec<Issue> {
        let mut issues = Vec::new();
        for object in ctx.objects().iter().filter(|o| Self::is_xobject(o)) {
            Self::check_xobject(object, &mut issues);
        }
        issues
    }
}

/// Stream extent and decoding problems recorded while parsing.
pub struct StreamRule;

impl StreamRule {
    /// An indirect `/Length` is checked against the payload once the
    /// referenced object is known.
    fn indirect_length(ctx: &ValidationContext<'_>, object: &RawObject) -> Option<Issue> {
        let stream = object.value.as_stream()?;
        let length = stream.dict.get("Length")?;
        let location = Location::Object(object.id);
        match ctx.objects().resolve(length).and_then(Value::as_integer) {
            Some(n) if usize::try_from(n).ok() == Some(stream.raw_data.len()) => None,
            Some(n) => Some(Issue::warning(
                Category::Stream,
                location,
                format!(
                    "indirect /Length {} does not match the {} bytes before endstream",
                    n,
                    stream.raw_data.len()
                ),
            )),
            None => Some(Issue::info(
                Category::Stream,
                location,
                format!("/Length {} could not be resolved", length),
            )),
        }
    }
}

impl Rule for StreamRule {
    fn category(&self) -> Category {
        Category::Stream
    }

    fn check(&self, ctx: &ValidationContext<'_>) -> Vec<Issue> {
        let mut issues = Vec::new();
        for object in ctx.objects() {
            for diagnostic in object
                .diagnostics
                .iter()
                .filter(|d| d.kind.is_stream_related())
            {
                let level = match diagnostic.kind {
                    DiagnosticKind::LengthUnresolved => {
                        issues.extend(Self::indirect_length(ctx, object));
                        continue;
                    }
                    DiagnosticKind::UnsupportedFilter | DiagnosticKind::DecodeFailed => Level::Info,
                    _ => Level::Warning,
                };
                issues.push(Issue::new(
                    level,
                    Category::Stream,
                    Location::Object(object.id),
                    diagnostic.message.clone(),
                ));
            }
        }
        issues
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::core::value::ObjectId;

    #[test]
    fn test_font_rule() {
        let data = pdf(
            &[
                "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>",
                "<< /Type /Font /BaseFont /Foo >>",
                "<< /Type /Font /Subtype /TrueType /BaseFont /Arial >>",
                "<< /Type /Font /Subtype /Type0 /BaseFont /X >>",
                "<< /Type /Font /Subtype /Type3 /FontMatrix [1 0 0 1 0 0] >>",
                "<< /Type /Font /Subtype /Weird /BaseFont /Courier >>",
            ],
            "<< /Root 1 0 R >>",
        );
        let issues = check(&FontRule, &data);
        let summary: Vec<(u32, Level)> = issues
            .iter()
            .map(|i| match i.location {
                Location::Object(id) => (id.number, i.level),
                _ => (0, i.level),
            })
            .collect();
        assert_eq!(
            summary,
            vec![
                (2, Level::Error),
                (3, Level::Warning),
                (4, Level::Error),
                (6, Level::Warning),
            ]
        );
    }

    #[test]
    fn test_xobject_rule() {
        let data = pdf(
            &[
                "<< /Type /XObject /Subtype /Image /Width 1 /Height 1 /ColorSpace /DeviceGray /BitsPerComponent 8 /Length 1 >>\nstream\nA\nendstream",
                "<< /Type /XObject /Subtype /Image /Length 1 >>\nstream\nA\nendstream",
                "<< /Subtype /Form /Length 1 >>\nstream\nA\nendstream",
                "<< /Type /XObject /Subtype /Image /Width 1 /Height 1 /ImageMask true /Length 1 >>\nstream\nA\nendstream",
                "<< /Type /XObject /Length 1 >>\nstream\nA\nendstream",
            ],
            "<< /Root 1 0 R >>",
        );
        let issues = check(&XObjectRule, &data);
        let at = |n: u32| {
            issues
                .iter()
                .filter(|i| i.location == Location::Object(ObjectId::new(n, 0)))
                .count()
        };
        assert_eq!(at(1), 0);
        assert_eq!(at(2), 4);
        assert_eq!(at(3), 1);
        assert_eq!(at(4), 0);
        assert_eq!(at(5), 1);
    }

    #[test]
    fn test_stream_rule_levels() {
        let data = pdf(
            &[
                "<< /Length 99 >>\nstream\nabc\nendstream",
                "<< >>\nstream\nabc\nendstream",
                "<< /Length 3 /Filter /DCTDecode >>\nstream\nabc\nendstream",
                "<< /Length 3 /Filter /FlateDecode >>\nstream\nabc\nendstream",
            ],
            "<< /Root 1 0 R >>",
        );
        let issues = check(&StreamRule, &data);
        let levels: Vec<Level> = issues.iter().map(|i| i.level).collect();
        assert_eq!(
            levels,
            vec![Level::Warning, Level::Warning, Level::Info, Level::Info]
        );
    }

    #[test]
    fn test_indirect_length_is_resolved() {
        let data = pdf(
            &[
                "<< /Length 2 0 R >>\nstream\nabc\nendstream",
                "3",
                "<< /Length 4 0 R >>\nstream\nabc\nendstream",
                "10",
                "<< /Length 99 0 R >>\nstream\nabc\nendstream",
            ],
            "<< /Root 1 0 R >>",
        );
        let issues = check(&StreamRule, &data);
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].level, Level::Warning);
        assert_eq!(issues[0].location, Location::Object(ObjectId::new(3, 0)));
        assert_eq!(issues[1].level, Level::Info);
    }
}
