use bytes::{Buf, BufMut, Bytes};

use crate::kafka::error::{i32_len, CodecError, Result};
use crate::kafka::{Deserialize, Encode, Serialize};

/// Longest base-128 encoding of a 64-bit value.
const MAX_VARINT_LEN: usize = 10;

#[inline]
fn ensure_remaining<B: Buf>(buf: &B, needed: usize) -> Result<()> {
    let remaining = buf.remaining();
    if remaining < needed {
        return Err(CodecError::UnexpectedEof { needed, remaining });
    }
    Ok(())
}

/// INT8, INT16, INT32, INT64 and UINT32
///
/// Fixed-width integers, all big-endian on the wire.
macro_rules! fixed_width {
    ($($ty:ty => $put:ident, $get:ident;)*) => {
        $(
            impl Serialize for $ty {
                const SIZE: usize = std::mem::size_of::<$ty>();

                #[inline]
                fn encode_size(&self, _version: i16) -> usize {
                    Self::SIZE
                }
            }

            impl Encode for $ty {
                #[inline]
                fn encode<B: BufMut>(&self, buf: &mut B, _version: i16) -> Result<()> {
                    buf.$put(*self);
                    Ok(())
                }
            }

            impl Deserialize for $ty {
                #[inline]
                fn decode<B: Buf>(buf: &mut B, _version: i16) -> Result<(Self, usize)> {
                    ensure_remaining(buf, Self::SIZE)?;
                    Ok((buf.$get(), Self::SIZE))
                }
            }
        )*
    };
}

fixed_width! {
    i8 => put_i8, get_i8;
    i16 => put_i16, get_i16;
    i32 => put_i32, get_i32;
    i64 => put_i64, get_i64;
    u32 => put_u32, get_u32;
}

/// Number of bytes of the base-128 encoding of `value`, computed from its bit length.
#[inline]
const fn uvarint_len(value: u64) -> usize {
    // `| 1` makes zero take one byte
    let bits = (u64::BITS - (value | 1).leading_zeros()) as usize;
    (bits + 6) / 7
}

#[inline]
fn put_uvarint<B: BufMut>(buf: &mut B, mut value: u64) {
    while value >= 0x80 {
        buf.put_u8((value as u8) | 0x80);
        value >>= 7;
    }
    buf.put_u8(value as u8);
}

fn get_uvarint<B: Buf>(buf: &mut B) -> Result<(u64, usize)> {
    let mut value = 0;

    for i in 0..MAX_VARINT_LEN {
        ensure_remaining(buf, 1)?;
        let b = buf.get_u8();
        value |= u64::from(b & 0x7f) << (i * 7);
        if b < 0x80 {
            return Ok((value, i + 1));
        }
    }

    Err(CodecError::MalformedVarint)
}

/// VARINT
///
/// Represents an integer between -2^31 and 2^31-1 inclusive. Encoding follows the
/// variable-length zig-zag encoding from Google Protocol Buffers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(transparent)]
pub struct VarInt(pub i32);

impl VarInt {
    #[inline]
    pub const fn zigzag(self) -> u32 {
        ((self.0 << 1) ^ (self.0 >> 31)) as u32
    }
}

impl Serialize for VarInt {
    #[inline]
    fn encode_size(&self, _version: i16) -> usize {
        uvarint_len(self.zigzag() as u64)
    }
}

impl Encode for VarInt {
    #[inline]
    fn encode<B: BufMut>(&self, buf: &mut B, _version: i16) -> Result<()> {
        put_uvarint(buf, self.zigzag() as u64);
        Ok(())
    }
}

impl Deserialize for VarInt {
    fn decode<B: Buf>(buf: &mut B, _version: i16) -> Result<(Self, usize)> {
        let (zigzag, n) = get_uvarint(buf)?;
        let zigzag = u32::try_from(zigzag).map_err(|_| CodecError::MalformedVarint)?;
        let value = ((zigzag >> 1) as i32) ^ -((zigzag & 1) as i32);
        Ok((Self(value), n))
    }
}

/// VARLONG
///
/// Represents an integer between -2^63 and 2^63-1 inclusive. Encoding follows the
/// variable-length zig-zag encoding from Google Protocol Buffers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(transparent)]
pub struct VarLong(pub i64);

impl VarLong {
    #[inline]
    pub const fn zigzag(self) -> u64 {
        ((self.0 << 1) ^ (self.0 >> 63)) as u64
    }
}

impl Serialize for VarLong {
    #[inline]
    fn encode_size(&self, _version: i16) -> usize {
        uvarint_len(self.zigzag())
    }
}

impl Encode for VarLong {
    #[inline]
    fn encode<B: BufMut>(&self, buf: &mut B, _version: i16) -> Result<()> {
        put_uvarint(buf, self.zigzag());
        Ok(())
    }
}

impl Deserialize for VarLong {
    fn decode<B: Buf>(buf: &mut B, _version: i16) -> Result<(Self, usize)> {
        let (zigzag, n) = get_uvarint(buf)?;
        let value = ((zigzag >> 1) as i64) ^ -((zigzag & 1) as i64);
        Ok((Self(value), n))
    }
}

/// STRING (`Str`)
///
/// Represents a sequence of characters. First the length N is given as an INT16. Then N bytes
/// follow which are the UTF-8 encoding of the character sequence. Length must not be negative.
///
/// NULLABLE_STRING (`Option<Str>`)
///
/// Represents a sequence of characters or null. For non-null strings, first the length N is
/// given as an INT16. Then N bytes follow which are the UTF-8 encoding of the character
/// sequence. A null value is encoded with length of -1 and there are no following bytes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[repr(transparent)]
pub struct Str(Bytes);

impl Str {
    #[inline]
    pub fn as_str(&self) -> &str {
        // NOTE: constructed only from `str`/`String` or validated on decode
        std::str::from_utf8(&self.0).unwrap_or_default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&'static str> for Str {
    #[inline]
    fn from(s: &'static str) -> Self {
        Self(Bytes::from_static(s.as_bytes()))
    }
}

impl From<String> for Str {
    #[inline]
    fn from(s: String) -> Self {
        Self(Bytes::from(s))
    }
}

impl Serialize for Str {
    // length encoded as INT16
    const SIZE: usize = 2;

    #[inline]
    fn encode_size(&self, _version: i16) -> usize {
        Self::SIZE + self.0.len()
    }
}

impl Serialize for Option<Str> {
    const SIZE: usize = Str::SIZE;

    #[inline]
    fn encode_size(&self, version: i16) -> usize {
        // NOTE: null strings still encode as -1 (INT16)
        self.as_ref().map_or(Self::SIZE, |s| s.encode_size(version))
    }
}

impl Encode for Str {
    fn encode<B: BufMut>(&self, buf: &mut B, _version: i16) -> Result<()> {
        let len = i16::try_from(self.0.len())
            .map_err(|_| CodecError::overflow("string length", self.0.len(), i16::MAX as usize))?;

        buf.put_i16(len);
        buf.put_slice(&self.0);
        Ok(())
    }
}

impl Encode for Option<Str> {
    #[inline]
    fn encode<B: BufMut>(&self, buf: &mut B, version: i16) -> Result<()> {
        match self {
            Some(s) => s.encode(buf, version),
            None => {
                buf.put_i16(-1);
                Ok(())
            }
        }
    }
}

impl Deserialize for Option<Str> {
    fn decode<B: Buf>(buf: &mut B, version: i16) -> Result<(Self, usize)> {
        let (len, n) = i16::decode(buf, version)?;

        match len {
            -1 => Ok((None, n)),
            len if len < -1 => Err(CodecError::InvalidLength {
                what: "string",
                len: len.into(),
            }),
            len => {
                let len = len as usize;
                ensure_remaining(buf, len)?;

                let bytes = buf.copy_to_bytes(len);
                std::str::from_utf8(&bytes)?;

                Ok((Some(Str(bytes)), n + len))
            }
        }
    }
}

impl Deserialize for Str {
    fn decode<B: Buf>(buf: &mut B, version: i16) -> Result<(Self, usize)> {
        match <Option<Str>>::decode(buf, version)? {
            (Some(s), n) => Ok((s, n)),
            (None, _) => Err(CodecError::InvalidLength {
                what: "string",
                len: -1,
            }),
        }
    }
}

/// BYTES (`Bytes`) | NULLABLE_BYTES (`Option<Bytes>`)
///
/// Represents a raw sequence of bytes. First the length N is given as an INT32. Then N bytes
/// follow. A null value is encoded with length of -1 and there are no following bytes.
impl Serialize for Bytes {
    const SIZE: usize = 4;

    #[inline]
    fn encode_size(&self, _version: i16) -> usize {
        Self::SIZE + self.len()
    }
}

impl Serialize for Option<Bytes> {
    const SIZE: usize = Bytes::SIZE;

    #[inline]
    fn encode_size(&self, version: i16) -> usize {
        self.as_ref().map_or(Self::SIZE, |b| b.encode_size(version))
    }
}

impl Encode for Bytes {
    fn encode<B: BufMut>(&self, buf: &mut B, _version: i16) -> Result<()> {
        buf.put_i32(i32_len("bytes length", self.len())?);
        buf.put_slice(self);
        Ok(())
    }
}

impl Encode for Option<Bytes> {
    #[inline]
    fn encode<B: BufMut>(&self, buf: &mut B, version: i16) -> Result<()> {
        match self {
            Some(bytes) => bytes.encode(buf, version),
            None => {
                buf.put_i32(-1);
                Ok(())
            }
        }
    }
}

/// Record key, value or header value.
///
/// Unlike [`Bytes`], these are written *without* a length prefix. The record they belong to
/// carries a separate varint length field right in front of them (see [`Self::len_field`]).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[repr(transparent)]
pub struct RecordBytes(pub Option<Bytes>);

impl RecordBytes {
    /// The varint length the enclosing record writes before these bytes (`-1` for null).
    pub fn len_field(&self) -> Result<VarInt> {
        match &self.0 {
            Some(bytes) => i32_len("record bytes length", bytes.len()).map(VarInt),
            None => Ok(VarInt(-1)),
        }
    }
}

impl Serialize for RecordBytes {
    #[inline]
    fn encode_size(&self, _version: i16) -> usize {
        self.0.as_ref().map_or(0, Bytes::len)
    }
}

impl Encode for RecordBytes {
    #[inline]
    fn encode<B: BufMut>(&self, buf: &mut B, _version: i16) -> Result<()> {
        if let Some(bytes) = &self.0 {
            buf.put_slice(bytes);
        }
        Ok(())
    }
}

/// How to encode an [`Array`] that ends up with no items.
///
/// The protocol distinguishes an empty array (count `0`) from a null one (count `-1`). Brokers
/// generally expect the former for produce requests, hence the default.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EmptyArray {
    #[default]
    Empty,
    Null,
}

impl EmptyArray {
    /// Resolve the items of an array field according to this policy.
    #[inline]
    pub fn apply<T>(self, items: Vec<T>) -> Option<Vec<T>> {
        match self {
            Self::Null if items.is_empty() => None,
            _ => Some(items),
        }
    }
}

impl std::str::FromStr for EmptyArray {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "empty" => Ok(Self::Empty),
            "null" => Ok(Self::Null),
            other => Err(format!("unknown empty array encoding: {other}")),
        }
    }
}

// Array item helpers
impl<T: Serialize> Serialize for [T] {
    #[inline]
    fn encode_size(&self, version: i16) -> usize {
        self.iter().map(|x| x.encode_size(version)).sum::<usize>()
    }
}

/// ARRAY
///
/// Represents a sequence of objects of a given type T. Type T can be either a primitive type
/// (e.g. STRING) or a structure. First, the length N is given as an INT32. Then N instances of
/// type T follow. A null array is represented with a length of -1.
///
/// In protocol documentation an array of T instances is referred to as [T].
#[derive(Debug)]
#[repr(transparent)]
pub struct Array<T>(pub T);

impl<T: Serialize> Serialize for Array<&[T]> {
    // array length encoded as INT32
    const SIZE: usize = 4;

    #[inline]
    fn encode_size(&self, version: i16) -> usize {
        Self::SIZE + self.0.encode_size(version)
    }
}

impl<T: Serialize> Serialize for Array<Option<&[T]>> {
    const SIZE: usize = 4;

    #[inline]
    fn encode_size(&self, version: i16) -> usize {
        self.0
            .map_or(Self::SIZE, |array| Array(array).encode_size(version))
    }
}

impl<T: Encode> Encode for Array<&[T]> {
    fn encode<B: BufMut>(&self, buf: &mut B, version: i16) -> Result<()> {
        buf.put_i32(i32_len("array length", self.0.len())?);
        RecordArray(self.0).encode(buf, version)
    }
}

impl<T: Encode> Encode for Array<Option<&[T]>> {
    fn encode<B: BufMut>(&self, buf: &mut B, version: i16) -> Result<()> {
        match self.0 {
            Some(array) => Array(array).encode(buf, version),
            None => {
                buf.put_i32(-1);
                Ok(())
            }
        }
    }
}

/// A sequence of objects without its own length prefix.
///
/// The number of items lives elsewhere in the enclosing structure (e.g., `records_count` of a
/// record batch or `headers_count` of a record).
#[derive(Debug)]
#[repr(transparent)]
pub struct RecordArray<T>(pub T);

impl<T: Serialize> Serialize for RecordArray<&[T]> {
    #[inline]
    fn encode_size(&self, version: i16) -> usize {
        self.0.encode_size(version)
    }
}

impl<T: Encode> Encode for RecordArray<&[T]> {
    fn encode<B: BufMut>(&self, buf: &mut B, version: i16) -> Result<()> {
        for item in self.0 {
            item.encode(buf, version)?;
        }
        Ok(())
    }
}
