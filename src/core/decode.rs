/// Stream decoding and decompression utilities.
///
/// PDF streams can be encoded with a chain of filters named in `/Filter`,
/// each with optional parameters in `/DecodeParms`. This module undoes the
/// general-purpose filters; image codecs are recognised but left encoded.
use super::error::{PDFError, PDFResult};
use super::value::{Dictionary, Value};
use flate2::read::{DeflateDecoder, ZlibDecoder};
use std::io::Read;
use thiserror::Error;

/// Filters that only make sense to an image decoder.
const IMAGE_FILTERS: &[&str] = &[
    "DCTDecode",
    "DCT",
    "JPXDecode",
    "JBIG2Decode",
    "CCITTFaxDecode",
    "CCF",
];

/// Why a stream could not be decoded.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    /// The filter is not known to this crate
    #[error("unsupported filter {0}")]
    Unsupported(String),

    /// The filter is an image codec, which is intentionally not decoded
    #[error("image filter {0} is not decoded")]
    ImageCodec(String),

    /// A supported filter rejected the data
    #[error(transparent)]
    Failed(#[from] PDFError),
}

/// Returns true if `name` is an image-only codec.
pub fn is_image_filter(name: &str) -> bool {
    IMAGE_FILTERS.contains(&name)
}

/// PNG predictor algorithm types (the tag byte in front of each row)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PngPredictor {
    /// No prediction
    None = 0,
    /// Sub - predicts from left pixel
    Sub = 1,
    /// Up - predicts from pixel above
    Up = 2,
    /// Average - predicts from average of left and above
    Average = 3,
    /// Paeth - uses Paeth predictor algorithm
    Paeth = 4,
}

impl PngPredictor {
    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(PngPredictor::None),
            1 => Some(PngPredictor::Sub),
            2 => Some(PngPredictor::Up),
            3 => Some(PngPredictor::Average),
            4 => Some(PngPredictor::Paeth),
            _ => None,
        }
    }
}

/// Predictor parameters read from `/DecodeParms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PredictorParams {
    pub predictor: i64,
    pub colors: usize,
    pub bits_per_component: usize,
    pub columns: usize,
}

impl Default for PredictorParams {
    fn default() -> Self {
        PredictorParams {
            predictor: 1,
            colors: 1,
            bits_per_component: 8,
            columns: 1,
        }
    }
}

impl PredictorParams {
    pub fn from_dict(parms: Option<&Dictionary>) -> Self {
        let mut params = PredictorParams::default();
        let Some(parms) = parms else {
            return params;
        };
        let positive = |key: &str| {
            parms
                .get_integer(key)
                .filter(|v| *v > 0)
                .map(|v| v as usize)
        };
        if let Some(p) = parms.get_integer("Predictor") {
            params.predictor = p;
        }
        if let Some(c) = positive("Colors") {
            params.colors = c;
        }
        if let Some(b) = positive("BitsPerComponent") {
            params.bits_per_component = b;
        }
        if let Some(c) = positive("Columns") {
            params.columns = c;
        }
        params
    }

    fn pixel_bytes(&self) -> usize {
        self.colors
            .saturating_mul(self.bits_per_component)
            .div_ceil(8)
            .max(1)
    }

    fn row_bytes(&self) -> usize {
        self.columns
            .saturating_mul(self.colors)
            .saturating_mul(self.bits_per_component)
            .div_ceil(8)
    }
}

/// Decodes a FlateDecode (zlib/deflate) compressed stream.
///
/// Tries the zlib container first and falls back to a raw deflate stream,
/// which some producers write. Output beyond `limit` bytes is an error.
pub fn decode_flate(compressed_data: &[u8], limit: usize) -> PDFResult<Vec<u8>> {
    let cap = (limit as u64).saturating_add(1);
    let mut decompressed = Vec::new();

    let zlib_err = match ZlibDecoder::new(compressed_data)
        .take(cap)
        .read_to_end(&mut decompressed)
    {
        Ok(_) => return check_limit("FlateDecode", decompressed, limit),
        Err(e) => e,
    };

    decompressed.clear();
    match DeflateDecoder::new(compressed_data)
        .take(cap)
        .read_to_end(&mut decompressed)
    {
        Ok(_) => check_limit("FlateDecode", decompressed, limit),
        Err(deflate_err) => Err(PDFError::Filter {
            filter: "FlateDecode".to_string(),
            reason: format!(
                "zlib failed ({}), raw deflate failed ({}); {} input bytes",
                zlib_err,
                deflate_err,
                compressed_data.len()
            ),
        }),
    }
}

fn check_limit(filter: &str, data: Vec<u8>, limit: usize) -> PDFResult<Vec<u8>> {
    if data.len() > limit {
        return Err(PDFError::Filter {
            filter: filter.to_string(),
            reason: format!("decoded size exceeds limit of {} bytes", limit),
        });
    }
    Ok(data)
}

/// Undoes PNG row prediction (predictor values 10-15).
///
/// Every row carries its own algorithm tag, so the `/Predictor` value only
/// selects PNG mode. A trailing partial row is decoded as far as it goes.
pub fn decode_png_predictor(data: &[u8], params: &PredictorParams) -> PDFResult<Vec<u8>> {
    let pix_bytes = params.pixel_bytes();
    // Rows longer than the data cannot occur, whatever /Columns says
    let row_bytes = params.row_bytes().min(data.len());
    if row_bytes == 0 {
        return Ok(data.to_vec());
    }

    // Each row has: 1 predictor byte + row_bytes data
    let stride = 1 + row_bytes;
    let mut output = Vec::with_capacity(data.len() / stride * row_bytes);
    let mut prev_row = vec![0u8; row_bytes];
    let mut row = vec![0u8; row_bytes];

    for chunk in data.chunks(stride) {
        let tag = chunk[0];
        let raw_bytes = &chunk[1..];
        let predictor = PngPredictor::from_tag(tag).ok_or_else(|| PDFError::Filter {
            filter: "FlateDecode".to_string(),
            reason: format!("unsupported PNG predictor tag {}", tag),
        })?;

        for i in 0..raw_bytes.len() {
            let left = if i >= pix_bytes { row[i - pix_bytes] } else { 0 };
            let up = prev_row[i];
            let up_left = if i >= pix_bytes { prev_row[i - pix_bytes] } else { 0 };

            let base = match predictor {
                PngPredictor::None => 0,
                PngPredictor::Sub => left,
                PngPredictor::Up => up,
                PngPredictor::Average => ((left as u16 + up as u16) / 2) as u8,
                PngPredictor::Paeth => paeth(left, up, up_left),
            };
            row[i] = base.wrapping_add(raw_bytes[i]);
        }

        output.extend_from_slice(&row[..raw_bytes.len()]);
        prev_row.copy_from_slice(&row);
    }

    Ok(output)
}

fn paeth(left: u8, up: u8, up_left: u8) -> u8 {
    let p = left as i32 + up as i32 - up_left as i32;
    let pa = (p - left as i32).abs();
    let pb = (p - up as i32).abs();
    let pc = (p - up_left as i32).abs();
    if pa <= pb && pa <= pc {
        left
    } else if pb <= pc {
        up
    } else {
        up_left
    }
}

/// Undoes TIFF predictor 2 (horizontal differencing) for 8-bit components.
pub fn decode_tiff_predictor(data: &[u8], params: &PredictorParams) -> PDFResult<Vec<u8>> {
    if params.bits_per_component != 8 {
        return Err(PDFError::Filter {
            filter: "FlateDecode".to_string(),
            reason: format!(
                "TIFF predictor with {} bits per component",
                params.bits_per_component
            ),
        });
    }

    let row_bytes = params.row_bytes().max(1);
    let colors = params.colors;
    let mut output = data.to_vec();
    for row in output.chunks_mut(row_bytes) {
        for i in colors..row.len() {
            row[i] = row[i].wrapping_add(row[i - colors]);
        }
    }
    Ok(output)
}

/// Applies the predictor named in `params`, if any.
pub fn apply_predictor(data: Vec<u8>, params: &PredictorParams) -> PDFResult<Vec<u8>> {
    match params.predictor {
        1 => Ok(data),
        2 => decode_tiff_predictor(&data, params),
        10..=15 => decode_png_predictor(&data, params),
        other => Err(PDFError::Filter {
            filter: "FlateDecode".to_string(),
            reason: format!("unknown predictor {}", other),
        }),
    }
}

/// Decodes ASCIIHex-encoded data.
///
/// Whitespace is ignored, `>` ends the data and an odd final digit is
/// padded with 0.
pub fn decode_ascii_hex(data: &[u8]) -> PDFResult<Vec<u8>> {
    let mut result = Vec::with_capacity(data.len() / 2);
    let mut high: Option<u8> = None;

    for &byte in data {
        if byte == b'>' {
            break;
        }
        if byte.is_ascii_whitespace() || byte == 0 {
            continue;
        }
        let digit = match byte {
            b'0'..=b'9' => byte - b'0',
            b'a'..=b'f' => byte - b'a' + 10,
            b'A'..=b'F' => byte - b'A' + 10,
            _ => {
                return Err(PDFError::Filter {
                    filter: "ASCIIHexDecode".to_string(),
                    reason: format!("invalid character 0x{:02X}", byte),
                });
            }
        };
        match high.take() {
            Some(h) => result.push((h << 4) | digit),
            None => high = Some(digit),
        }
    }

    if let Some(h) = high {
        result.push(h << 4);
    }
    Ok(result)
}

/// Decodes ASCII85 (Base85) encoded data.
///
/// Five characters encode four bytes; `z` stands for four zero bytes and
/// `~>` ends the data.
pub fn decode_ascii85(data: &[u8]) -> PDFResult<Vec<u8>> {
    let mut result = Vec::with_capacity(data.len() * 4 / 5);
    let mut tuple = 0u64;
    let mut count = 0usize;

    let data = data.strip_prefix(b"<~").unwrap_or(data);

    for &byte in data {
        match byte {
            b'~' => break,
            b'z' if count == 0 => result.extend_from_slice(&[0u8; 4]),
            b'!'..=b'u' => {
                tuple = tuple * 85 + (byte - b'!') as u64;
                count += 1;
                if count == 5 {
                    if tuple > u32::MAX as u64 {
                        return Err(PDFError::Filter {
                            filter: "ASCII85Decode".to_string(),
                            reason: "group value out of range".to_string(),
                        });
                    }
                    result.extend_from_slice(&(tuple as u32).to_be_bytes());
                    tuple = 0;
                    count = 0;
                }
            }
            b if b.is_ascii_whitespace() || b == 0 => {}
            other => {
                return Err(PDFError::Filter {
                    filter: "ASCII85Decode".to_string(),
                    reason: format!("invalid character 0x{:02X}", other),
                });
            }
        }
    }

    // A final partial group of n characters yields n - 1 bytes
    if count > 1 {
        for _ in count..5 {
            tuple = tuple * 85 + 84;
        }
        let bytes = ((tuple & 0xFFFF_FFFF) as u32).to_be_bytes();
        result.extend_from_slice(&bytes[..count - 1]);
    }

    Ok(result)
}

/// Decodes RunLengthDecode data.
pub fn decode_run_length(data: &[u8]) -> PDFResult<Vec<u8>> {
    let mut result = Vec::with_capacity(data.len() * 2);
    let mut i = 0;

    while i < data.len() {
        let length = data[i];
        i += 1;
        match length {
            128 => break,
            0..=127 => {
                let n = length as usize + 1;
                let end = (i + n).min(data.len());
                result.extend_from_slice(&data[i..end]);
                i = end;
            }
            _ => {
                let Some(&byte) = data.get(i) else {
                    break;
                };
                result.extend(std::iter::repeat_n(byte, 257 - length as usize));
                i += 1;
            }
        }
    }

    Ok(result)
}

/// Applies a single filter to data.
fn apply_filter(
    data: &[u8],
    filter_name: &str,
    parms: Option<&Dictionary>,
    limit: usize,
) -> Result<Vec<u8>, DecodeError> {
    let decoded = match filter_name {
        "FlateDecode" | "Fl" => {
            let inflated = decode_flate(data, limit)?;
            apply_predictor(inflated, &PredictorParams::from_dict(parms))?
        }
        "ASCIIHexDecode" | "AHx" => decode_ascii_hex(data)?,
        "ASCII85Decode" | "A85" => decode_ascii85(data)?,
        "RunLengthDecode" | "RL" => decode_run_length(data)?,
        name if is_image_filter(name) => return Err(DecodeError::ImageCodec(name.to_string())),
        name => return Err(DecodeError::Unsupported(name.to_string())),
    };
    Ok(check_limit(filter_name, decoded, limit)?)
}

/// Decodes a stream payload according to the `/Filter` and `/DecodeParms`
/// entries of its dictionary.
///
/// Filters are undone in the order they are listed. A stream without
/// filters decodes to its raw bytes.
pub fn decode_stream(dict: &Dictionary, raw: &[u8], limit: usize) -> Result<Vec<u8>, DecodeError> {
    let filters: Vec<&str> = match dict.get("Filter") {
        Some(Value::Name(name)) => vec![name.as_str()],
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_name).collect(),
        _ => Vec::new(),
    };

    if filters.is_empty() {
        return Ok(check_limit("none", raw.to_vec(), limit)?);
    }

    let parms_entry = dict.get("DecodeParms");
    let parms_for = |index: usize| -> Option<&Dictionary> {
        match parms_entry {
            Some(Value::Dictionary(d)) if index == 0 => Some(d),
            Some(Value::Array(items)) => items.get(index).and_then(Value::as_dict),
            _ => None,
        }
    };

    let mut current = raw.to_vec();
    for (index, filter_name) in filters.iter().enumerate() {
        current = apply_filter(&current, filter_name, parms_for(index), limit)?;
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::ZlibEncoder;
    use std::io::Write;

    const LIMIT: usize = 1 << 20;

    fn zlib(data: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn dict_with(entries: &[(&str, Value)]) -> Dictionary {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_decode_flate_simple() {
        let original = b"Hello, PDF world! This is test data.";
        let decompressed = decode_flate(&zlib(original), LIMIT).unwrap();
        assert_eq!(&decompressed[..], original);
    }

    #[test]
    fn test_decode_flate_raw_deflate_fallback() {
        use flate2::write::DeflateEncoder;
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"raw deflate body").unwrap();
        let raw = encoder.finish().unwrap();
        assert_eq!(decode_flate(&raw, LIMIT).unwrap(), b"raw deflate body");
    }

    #[test]
    fn test_decode_flate_garbage() {
        assert!(decode_flate(b"definitely not deflate", LIMIT).is_err());
    }

    #[test]
    fn test_decode_flate_limit() {
        let big = vec![b'a'; 10_000];
        let err = decode_flate(&zlib(&big), 100).unwrap_err();
        assert!(err.to_string().contains("exceeds limit"));
    }

    #[test]
    fn test_png_up_predictor() {
        let params = PredictorParams {
            predictor: 12,
            colors: 1,
            bits_per_component: 8,
            columns: 3,
        };
        // Row 1: None [1,2,3]; Row 2: Up [1,1,1] -> [2,3,4]
        let data = [0, 1, 2, 3, 2, 1, 1, 1];
        assert_eq!(
            decode_png_predictor(&data, &params).unwrap(),
            vec![1, 2, 3, 2, 3, 4]
        );
    }

    #[test]
    fn test_png_sub_predictor() {
        let params = PredictorParams {
            predictor: 11,
            colors: 1,
            bits_per_component: 8,
            columns: 4,
        };
        let data = [1, 5, 1, 1, 1];
        assert_eq!(
            decode_png_predictor(&data, &params).unwrap(),
            vec![5, 6, 7, 8]
        );
    }

    #[test]
    fn test_tiff_predictor() {
        let params = PredictorParams {
            predictor: 2,
            colors: 1,
            bits_per_component: 8,
            columns: 3,
        };
        assert_eq!(
            decode_tiff_predictor(&[10, 1, 1, 5, 5, 5], &params).unwrap(),
            vec![10, 11, 12, 5, 10, 15]
        );
    }

    #[test]
    fn test_decode_ascii_hex() {
        assert_eq!(decode_ascii_hex(b"48 65 6c6c 6f>").unwrap(), b"Hello");
        assert_eq!(decode_ascii_hex(b"414>").unwrap(), vec![0x41, 0x40]);
        assert!(decode_ascii_hex(b"4G>").is_err());
    }

    #[test]
    fn test_decode_ascii85() {
        assert_eq!(decode_ascii85(b"87cURD]i,\"Ebo7~>").unwrap(), b"Hello World");
        assert_eq!(decode_ascii85(b"z~>").unwrap(), vec![0, 0, 0, 0]);
        assert_eq!(decode_ascii85(b"<~87cURD]i,\"Ebo80~>").unwrap(), b"Hello World!");
    }

    #[test]
    fn test_decode_run_length() {
        // 2 literal bytes, then 'x' repeated 3 times, then EOD
        let data = [1, b'a', b'b', 254, b'x', 128];
        assert_eq!(decode_run_length(&data).unwrap(), b"abxxx");
    }

    #[test]
    fn test_decode_stream_without_filter() {
        let dict = Dictionary::new();
        assert_eq!(decode_stream(&dict, b"plain", LIMIT).unwrap(), b"plain");
    }

    #[test]
    fn test_decode_stream_filter_chain_in_listed_order() {
        let original = b"chained filters";
        let compressed = zlib(original);
        let hex: String = compressed.iter().map(|b| format!("{:02x}", b)).collect();
        let dict = dict_with(&[(
            "Filter",
            Value::Array(vec![Value::name("ASCIIHexDecode"), Value::name("FlateDecode")]),
        )]);
        assert_eq!(
            decode_stream(&dict, hex.as_bytes(), LIMIT).unwrap(),
            original
        );
    }

    #[test]
    fn test_decode_stream_with_png_parms() {
        let rows = [2u8, 1, 1, 2, 1, 1];
        let dict = dict_with(&[
            ("Filter", Value::name("FlateDecode")),
            (
                "DecodeParms",
                Value::Dictionary(dict_with(&[
                    ("Predictor", Value::integer(12)),
                    ("Columns", Value::integer(2)),
                ])),
            ),
        ]);
        assert_eq!(
            decode_stream(&dict, &zlib(&rows), LIMIT).unwrap(),
            vec![1, 1, 2, 2]
        );
    }

    #[test]
    fn test_decode_stream_unsupported_and_image_filters() {
        let lzw = dict_with(&[("Filter", Value::name("LZWDecode"))]);
        assert_eq!(
            decode_stream(&lzw, b"data", LIMIT),
            Err(DecodeError::Unsupported("LZWDecode".to_string()))
        );

        let jpeg = dict_with(&[("Filter", Value::name("DCTDecode"))]);
        assert_eq!(
            decode_stream(&jpeg, b"data", LIMIT),
            Err(DecodeError::ImageCodec("DCTDecode".to_string()))
        );
    }
}
