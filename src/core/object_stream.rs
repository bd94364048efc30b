use super::error::{PDFError, PDFResult};
use super::lexer::{Lexer, Token};
use super::parser::Parser;
use super::value::{ObjectId, StreamValue, Value};

/// An object stored inside a `/Type /ObjStm` stream.
#[derive(Debug, Clone, PartialEq)]
pub struct CompressedObject {
    pub id: ObjectId,
    pub stream: ObjectId,
    pub index: usize,
    pub value: Value,
    pub raw_content: Vec<u8>,
}

/// Returns true if the stream is an object stream.
pub fn is_object_stream(stream: &StreamValue) -> bool {
    stream.dict.has_name("Type", "ObjStm")
}

/// Extracts the objects stored in an object stream.
///
/// The decoded payload starts with `/N` pairs of `object-number offset`,
/// followed at `/First` by the object bodies. Objects in a stream always
/// have generation 0. At most `limit` objects are returned.
pub fn expand_object_stream(
    stream_id: ObjectId,
    stream: &StreamValue,
    limit: usize,
) -> PDFResult<Vec<CompressedObject>> {
    let data = stream.decoded_data.as_deref().ok_or_else(|| {
        PDFError::Generic(format!("object stream {} was not decoded", stream_id))
    })?;

    let count = stream
        .dict
        .get_integer("N")
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| PDFError::Generic(format!("object stream {} has no /N", stream_id)))?;
    let first = stream
        .dict
        .get_integer("First")
        .and_then(|n| usize::try_from(n).ok())
        .filter(|first| *first <= data.len())
        .ok_or_else(|| {
            PDFError::Generic(format!("object stream {} has a bad /First", stream_id))
        })?;

    let mut header = Vec::with_capacity(count.min(limit));
    let mut lexer = Lexer::new(&data[..first]);
    for _ in 0..count.min(limit) {
        let number = lexer.next_token();
        let offset = lexer.next_token();
        match (number.token, offset.token) {
            (Token::Integer(number), Token::Integer(offset)) => {
                let (Ok(number), Ok(offset)) = (u32::try_from(number), usize::try_from(offset))
                else {
                    return Err(PDFError::Generic(format!(
                        "object stream {} has a negative header entry",
                        stream_id
                    )));
                };
                header.push((number, first.saturating_add(offset)));
            }
            _ => break,
        }
    }

    let mut objects = Vec::with_capacity(header.len());
    for (index, &(number, start)) in header.iter().enumerate() {
        if start >= data.len() {
            continue;
        }
        let end = header
            .get(index + 1)
            .map(|(_, next)| *next)
            .filter(|next| *next > start && *next <= data.len())
            .unwrap_or(data.len());

        let value = Parser::new(data, start).parse_value();
        objects.push(CompressedObject {
            id: ObjectId::new(number, 0),
            stream: stream_id,
            index,
            value,
            raw_content: data[start..end].to_vec(),
        });
    }

    Ok(objects)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::value::Dictionary;

    fn object_stream(header: &str, body: &str, n: i64) -> StreamValue {
        let payload = format!("{}{}", header, body);
        let mut dict = Dictionary::new();
        dict.insert("Type", Value::name("ObjStm"));
        dict.insert("N", Value::integer(n));
        dict.insert("First", Value::integer(header.len() as i64));
        StreamValue {
            dict,
            raw_data: payload.clone().into_bytes(),
            decoded_data: Some(payload.into_bytes()),
        }
    }

    #[test]
    fn test_expand_object_stream() {
        let stream = object_stream("11 0 12 15 ", "<< /A 1 >>     [1 2 0 R]", 2);
        assert!(is_object_stream(&stream));

        let objects = expand_object_stream(ObjectId::new(10, 0), &stream, 100).unwrap();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].id, ObjectId::new(11, 0));
        assert_eq!(objects[0].value.as_dict().and_then(|d| d.get_integer("A")), Some(1));
        assert_eq!(objects[1].id, ObjectId::new(12, 0));
        assert_eq!(objects[1].index, 1);
        assert_eq!(objects[1].stream, ObjectId::new(10, 0));
        assert_eq!(
            objects[1].value,
            Value::Array(vec![Value::integer(1), Value::reference(2, 0)])
        );
    }

    #[test]
    fn test_expand_respects_limit() {
        let stream = object_stream("1 0 2 2 ", "1 2", 2);
        let objects = expand_object_stream(ObjectId::new(9, 0), &stream, 1).unwrap();
        assert_eq!(objects.len(), 1);
    }

    #[test]
    fn test_undecoded_stream_is_an_error() {
        let mut stream = object_stream("1 0 ", "1", 1);
        stream.decoded_data = None;
        assert!(expand_object_stream(ObjectId::new(9, 0), &stream, 10).is_err());
    }
}
