use crate::kafka::api::ApiKey;
use crate::kafka::record::Compression;

pub type Result<T, E = CodecError> = std::result::Result<T, E>;

/// Failures of building, sizing or (de)serializing protocol entities.
///
/// All of these are detected while the request is still in memory, i.e., before any byte of it
/// reaches the transport.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// A value cannot be represented in its fixed-width wire field.
    #[error("{what} of {len} does not fit, the maximum is {max}")]
    EncodingOverflow {
        what: &'static str,
        len: usize,
        max: usize,
    },

    /// An entity was finalized without one of its required fields.
    #[error("{entity} is missing required field {field}")]
    IncompleteEntity {
        entity: &'static str,
        field: &'static str,
    },

    #[error("unsupported API key: {0}")]
    UnsupportedApiKey(i16),

    #[error("unsupported {api_key:?} version: v{version}")]
    UnsupportedVersion { api_key: ApiKey, version: i16 },

    #[error("record batch compression is not supported: {0:?}")]
    UnsupportedCompression(Compression),

    #[error("invalid record batch attributes: {0:#06x}")]
    InvalidAttributes(i16),

    #[error("request header is for {header:?} but the body is {body:?}")]
    ApiKeyMismatch { header: ApiKey, body: ApiKey },

    #[error("expected at least {needed} more bytes, got {remaining}")]
    UnexpectedEof { needed: usize, remaining: usize },

    #[error("malformed varint")]
    MalformedVarint,

    #[error("invalid {what} length: {len}")]
    InvalidLength { what: &'static str, len: i64 },

    #[error("invalid UTF-8 data")]
    InvalidUtf8(#[from] std::str::Utf8Error),
}

impl CodecError {
    #[inline]
    pub(crate) fn overflow(what: &'static str, len: usize, max: usize) -> Self {
        Self::EncodingOverflow { what, len, max }
    }

    #[inline]
    pub(crate) fn incomplete(entity: &'static str, field: &'static str) -> Self {
        Self::IncompleteEntity { entity, field }
    }
}

/// Convert a byte or item count into the signed INT32 the wire format uses for lengths.
#[inline]
pub(crate) fn i32_len(what: &'static str, len: usize) -> Result<i32> {
    i32::try_from(len).map_err(|_| CodecError::overflow(what, len, i32::MAX as usize))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lengths_beyond_int32_overflow() {
        assert_eq!(i32_len("array length", 7).expect("small length"), 7);

        let err = i32_len("array length", i32::MAX as usize + 1).expect_err("overflow");
        assert!(matches!(
            err,
            CodecError::EncodingOverflow {
                what: "array length",
                max,
                ..
            } if max == i32::MAX as usize
        ));
    }
}
