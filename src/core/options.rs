/// Parsing limits and switches.
///
/// The defaults suit interactive inspection of ordinary documents. Every
/// limit bounds work on hostile input; none of them makes parsing fail.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseOptions {
    /// Stop locating objects after this many
    pub max_objects: usize,

    /// Largest decoded size of a single stream, in bytes
    pub max_decoded_stream_size: usize,

    /// Decode stream payloads through their filters
    pub decode_streams: bool,

    /// Add the objects stored inside `/Type /ObjStm` streams
    pub expand_object_streams: bool,

    /// Run rule categories on the rayon pool (needs the `parallel` feature)
    pub parallel_validation: bool,

    /// Objects with more raw bytes than this are reported by the performance rule
    pub large_object_threshold: usize,

    /// Objects referencing more distinct objects than this are reported
    pub max_fan_out: usize,

    /// Decoded/raw size ratio above which a stream is reported
    pub max_decompression_ratio: f64,
}

impl Default for ParseOptions {
    fn default() -> Self {
        ParseOptions {
            max_objects: 500_000,
            max_decoded_stream_size: 64 * 1024 * 1024,
            decode_streams: true,
            expand_object_streams: true,
            parallel_validation: true,
            large_object_threshold: 1024 * 1024,
            max_fan_out: 1000,
            max_decompression_ratio: 100.0,
        }
    }
}

impl ParseOptions {
    /// Decode limit handed to the value parser, `None` when decoding is off.
    pub(crate) fn decode_limit(&self) -> Option<usize> {
        self.decode_streams.then_some(self.max_decoded_stream_size)
    }
}
