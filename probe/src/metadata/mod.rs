//! See <https://github.com/ggerganov/ggml/blob/master/docs/gguf.md#file-structure>.

mod collection;

pub use collection::{GGufMetaError, GGufMetaMap, GGufMetaMapExt};

use crate::{GGufReadError, GGufReader};
use std::borrow::Cow;

pub const DEFAULT_ALIGNMENT: usize = 32;
pub const GENERAL_ALIGNMENT: &str = "general.alignment";

/// Deepest array nesting the decoder follows.
pub const MAX_NESTING: usize = 64;

#[derive(num_enum::TryFromPrimitive, Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[repr(u32)]
pub enum GGufMetaDataValueType {
    /// The value is a 8-bit unsigned integer.
    U8 = 0,
    /// The value is a 8-bit signed integer.
    I8 = 1,
    /// The value is a 16-bit unsigned little-endian integer.
    U16 = 2,
    /// The value is a 16-bit signed little-endian integer.
    I16 = 3,
    /// The value is a 32-bit unsigned little-endian integer.
    U32 = 4,
    /// The value is a 32-bit signed little-endian integer.
    I32 = 5,
    /// The value is a 32-bit IEEE754 floating point number.
    F32 = 6,
    /// The value is a boolean.
    ///
    /// 1-byte value where 0 is false and 1 is true.
    /// Anything else is invalid, and should be treated as either the model being invalid or the reader being buggy.
    Bool = 7,
    /// The value is a UTF-8 non-null-terminated string, with length prepended.
    String = 8,
    /// The value is an array of other values, with the length and type prepended.
    ///
    /// Arrays can be nested, and the length of the array is the number of elements in the array, not the number of bytes.
    Array = 9,
    /// The value is a 64-bit unsigned little-endian integer.
    U64 = 10,
    /// The value is a 64-bit signed little-endian integer.
    I64 = 11,
    /// The value is a 64-bit IEEE754 floating point number.
    F64 = 12,
}

impl GGufMetaDataValueType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::U8 => "u8",
            Self::I8 => "i8",
            Self::U16 => "u16",
            Self::I16 => "i16",
            Self::U32 => "u32",
            Self::I32 => "i32",
            Self::F32 => "f32",
            Self::Bool => "bool",
            Self::String => "str",
            Self::Array => "arr",
            Self::I64 => "i64",
            Self::F64 => "f64",
            Self::U64 => "u64",
        }
    }

    /// Encoded width of a scalar, `None` for the length-prefixed string and array.
    pub const fn nbytes(self) -> Option<usize> {
        match self {
            Self::U8 | Self::I8 | Self::Bool => Some(1),
            Self::U16 | Self::I16 => Some(2),
            Self::U32 | Self::I32 | Self::F32 => Some(4),
            Self::U64 | Self::I64 | Self::F64 => Some(8),
            Self::String | Self::Array => None,
        }
    }
}

/// One decoded metadata value.
#[derive(Clone, PartialEq, Debug)]
pub enum GGufMetaValue<'a> {
    U8(u8),
    I8(i8),
    U16(u16),
    I16(i16),
    U32(u32),
    I32(i32),
    F32(f32),
    Bool(bool),
    String(Cow<'a, str>),
    Array(GGufMetaArray<'a>),
    U64(u64),
    I64(i64),
    F64(f64),
    /// A bool byte other than 0 or 1; one byte was consumed for it.
    InvalidBool(u8),
    /// A value type tag this decoder does not know; nothing was consumed for it.
    Unknown(u32),
}

/// An array value: the raw element tag, the declared length and the decoded items.
///
/// `items` is shorter than `len` only when the element type is unknown and the
/// remaining items could not be measured.
#[derive(Clone, PartialEq, Debug)]
pub struct GGufMetaArray<'a> {
    pub ty: u32,
    pub len: u64,
    pub items: Vec<GGufMetaValue<'a>>,
}

impl GGufMetaValue<'_> {
    /// The type tag this value was decoded from.
    pub fn ty(&self) -> Result<GGufMetaDataValueType, u32> {
        use GGufMetaDataValueType as Ty;
        Ok(match self {
            Self::U8(_) => Ty::U8,
            Self::I8(_) => Ty::I8,
            Self::U16(_) => Ty::U16,
            Self::I16(_) => Ty::I16,
            Self::U32(_) => Ty::U32,
            Self::I32(_) => Ty::I32,
            Self::F32(_) => Ty::F32,
            Self::Bool(_) | Self::InvalidBool(_) => Ty::Bool,
            Self::String(_) => Ty::String,
            Self::Array(_) => Ty::Array,
            Self::U64(_) => Ty::U64,
            Self::I64(_) => Ty::I64,
            Self::F64(_) => Ty::F64,
            Self::Unknown(ty) => return Err(*ty),
        })
    }

    /// The first type tag whose byte length could not be determined, if any.
    ///
    /// When this is `Some`, the reader stopped inside this value and every byte
    /// after it is out of sync.
    pub fn unknown_type(&self) -> Option<u32> {
        match self {
            Self::Unknown(ty) => Some(*ty),
            Self::Array(arr) => arr.unknown_type(),
            _ => None,
        }
    }

    #[inline]
    pub fn is_resolved(&self) -> bool {
        self.unknown_type().is_none()
    }

    /// The first bool byte other than 0 or 1 in this value, arrays included.
    pub fn invalid_bool(&self) -> Option<u8> {
        match self {
            Self::InvalidBool(b) => Some(*b),
            Self::Array(arr) => arr.items.iter().find_map(GGufMetaValue::invalid_bool),
            _ => None,
        }
    }
}

impl GGufMetaArray<'_> {
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.items.len() as u64 == self.len
    }

    fn unknown_type(&self) -> Option<u32> {
        self.items
            .iter()
            .find_map(GGufMetaValue::unknown_type)
            .or_else(|| (!self.is_complete()).then_some(self.ty))
    }
}

/// One key/value entry of the metadata section.
#[derive(Clone, PartialEq, Debug)]
pub struct GGufMetaKV<'a> {
    pub key: Cow<'a, str>,
    pub value: GGufMetaValue<'a>,
}

impl<'a> GGufReader<'a> {
    pub fn read_meta_kv(&mut self) -> Result<GGufMetaKV<'a>, GGufReadError> {
        let key = self.read_str()?;
        let ty = self.read()?;
        let value = self.read_meta_value(ty)?;
        Ok(GGufMetaKV { key, value })
    }

    /// Decodes one value of type `ty`.
    ///
    /// An unknown tag yields [`GGufMetaValue::Unknown`] without consuming anything,
    /// since its length cannot be known.
    pub fn read_meta_value(&mut self, ty: u32) -> Result<GGufMetaValue<'a>, GGufReadError> {
        self.read_meta_value_nested(ty, 0)
    }

    fn read_meta_value_nested(
        &mut self,
        ty: u32,
        depth: usize,
    ) -> Result<GGufMetaValue<'a>, GGufReadError> {
        use GGufMetaDataValueType as Ty;
        use GGufMetaValue as V;

        let Ok(ty) = Ty::try_from(ty) else {
            return Ok(V::Unknown(ty));
        };
        #[rustfmt::skip]
        let value = match ty {
            Ty::U8     => V::U8    (self.read()?),
            Ty::I8     => V::I8    (self.read()?),
            Ty::U16    => V::U16   (self.read()?),
            Ty::I16    => V::I16   (self.read()?),
            Ty::U32    => V::U32   (self.read()?),
            Ty::I32    => V::I32   (self.read()?),
            Ty::F32    => V::F32   (self.read()?),
            Ty::U64    => V::U64   (self.read()?),
            Ty::I64    => V::I64   (self.read()?),
            Ty::F64    => V::F64   (self.read()?),
            Ty::Bool   => match self.read_u8()? {
                0 => V::Bool(false),
                1 => V::Bool(true),
                b => V::InvalidBool(b),
            },
            Ty::String => V::String(self.read_str()?),
            Ty::Array  => V::Array (self.read_meta_array(depth)?),
        };
        Ok(value)
    }

    fn read_meta_array(&mut self, depth: usize) -> Result<GGufMetaArray<'a>, GGufReadError> {
        if depth >= MAX_NESTING {
            return Err(GGufReadError::NestingTooDeep(MAX_NESTING));
        }
        let (ty, len) = self.read_arr_header()?;
        if GGufMetaDataValueType::try_from(ty).is_err() {
            return Ok(GGufMetaArray {
                ty,
                len,
                items: Vec::new(),
            });
        }

        // every element takes at least one byte
        let capacity = len.min(self.remaining() as u64) as usize;
        let mut items = Vec::with_capacity(capacity);
        for _ in 0..len {
            let item = self.read_meta_value_nested(ty, depth + 1)?;
            let resolved = item.is_resolved();
            items.push(item);
            if !resolved {
                break;
            }
        }
        Ok(GGufMetaArray { ty, len, items })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::write::GGufBuilder;

    fn decode(ty: GGufMetaDataValueType, bytes: &[u8]) -> (GGufMetaValue, usize) {
        let mut reader = GGufReader::new(bytes);
        let value = reader.read_meta_value(ty as _).unwrap();
        (value, reader.position())
    }

    #[test]
    fn test_scalars() {
        use GGufMetaDataValueType as Ty;
        use GGufMetaValue as V;
        assert_eq!(decode(Ty::U8, &[7]), (V::U8(7), 1));
        assert_eq!(decode(Ty::I8, &[0xff]), (V::I8(-1), 1));
        assert_eq!(decode(Ty::U16, &[1, 1]), (V::U16(257), 2));
        assert_eq!(decode(Ty::I16, &(-2i16).to_le_bytes()), (V::I16(-2), 2));
        assert_eq!(decode(Ty::U32, &7u32.to_le_bytes()), (V::U32(7), 4));
        assert_eq!(decode(Ty::I32, &(-7i32).to_le_bytes()), (V::I32(-7), 4));
        assert_eq!(decode(Ty::F32, &0.5f32.to_le_bytes()), (V::F32(0.5), 4));
        assert_eq!(decode(Ty::Bool, &[1]), (V::Bool(true), 1));
        assert_eq!(decode(Ty::U64, &u64::MAX.to_le_bytes()), (V::U64(u64::MAX), 8));
        assert_eq!(decode(Ty::I64, &i64::MIN.to_le_bytes()), (V::I64(i64::MIN), 8));
        assert_eq!(decode(Ty::F64, &2.25f64.to_le_bytes()), (V::F64(2.25), 8));
    }

    #[test]
    fn test_widths_match_decoding() {
        for tag in 0..=12 {
            let ty = GGufMetaDataValueType::try_from(tag).unwrap();
            if let Some(n) = ty.nbytes() {
                let bytes = [0u8; 8];
                let (value, consumed) = decode(ty, &bytes);
                assert_eq!(consumed, n);
                assert_eq!(value.ty(), Ok(ty));
            }
        }
    }

    #[test]
    fn test_string() {
        let bytes = GGufBuilder::new().write_str("llama").finish();
        let (value, consumed) = decode(GGufMetaDataValueType::String, &bytes);
        assert_eq!(value, GGufMetaValue::String("llama".into()));
        assert_eq!(consumed, 8 + 5);

        // declared length runs past the end
        let mut reader = GGufReader::new(&bytes[..10]);
        assert!(matches!(
            reader.read_meta_value(GGufMetaDataValueType::String as _),
            Err(GGufReadError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_empty_array_consumes_header_only() {
        let bytes = GGufBuilder::new()
            .write_u32(GGufMetaDataValueType::U32 as _)
            .write_u64(0)
            .write_u32(0xdead)
            .finish();
        let mut reader = GGufReader::new(&bytes);
        let value = reader
            .read_meta_value(GGufMetaDataValueType::Array as _)
            .unwrap();
        assert_eq!(
            value,
            GGufMetaValue::Array(GGufMetaArray {
                ty: GGufMetaDataValueType::U32 as _,
                len: 0,
                items: vec![],
            })
        );
        assert_eq!(reader.position(), 12);
        assert_eq!(reader.read_u32(), Ok(0xdead));
    }

    #[test]
    fn test_array_of_strings() {
        let value = GGufMetaValue::Array(GGufMetaArray {
            ty: GGufMetaDataValueType::String as _,
            len: 3,
            items: vec![
                GGufMetaValue::String("<s>".into()),
                GGufMetaValue::String("".into()),
                GGufMetaValue::String("</s>".into()),
            ],
        });
        let bytes = GGufBuilder::new().write_value(&value).finish();
        let (decoded, consumed) = decode(GGufMetaDataValueType::Array, &bytes);
        assert_eq!(decoded, value);
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn test_nested_arrays() {
        let inner = |items: Vec<i32>| {
            GGufMetaValue::Array(GGufMetaArray {
                ty: GGufMetaDataValueType::I32 as _,
                len: items.len() as _,
                items: items.into_iter().map(GGufMetaValue::I32).collect(),
            })
        };
        let value = GGufMetaValue::Array(GGufMetaArray {
            ty: GGufMetaDataValueType::Array as _,
            len: 2,
            items: vec![inner(vec![1, 2]), inner(vec![-3])],
        });
        let bytes = GGufBuilder::new().write_value(&value).finish();
        let (decoded, consumed) = decode(GGufMetaDataValueType::Array, &bytes);
        assert_eq!(decoded, value);
        assert_eq!(consumed, bytes.len());
        assert!(decoded.is_resolved());
    }

    #[test]
    fn test_unknown_tags() {
        let mut reader = GGufReader::new(&[1, 2, 3, 4]);
        let value = reader.read_meta_value(13).unwrap();
        assert_eq!(value, GGufMetaValue::Unknown(13));
        assert_eq!(value.unknown_type(), Some(13));
        assert_eq!(reader.position(), 0);

        // an array of unknown elements cannot be measured unless it is empty
        let bytes = GGufBuilder::new().write_u32(42).write_u64(2).finish();
        let mut reader = GGufReader::new(&bytes);
        let value = reader
            .read_meta_value(GGufMetaDataValueType::Array as _)
            .unwrap();
        assert_eq!(value.unknown_type(), Some(42));
        assert_eq!(reader.position(), 12);

        let bytes = GGufBuilder::new().write_u32(42).write_u64(0).finish();
        let mut reader = GGufReader::new(&bytes);
        let value = reader
            .read_meta_value(GGufMetaDataValueType::Array as _)
            .unwrap();
        assert!(value.is_resolved());
    }

    #[test]
    fn test_unknown_inside_nested_array() {
        let bytes = GGufBuilder::new()
            .write_u32(GGufMetaDataValueType::Array as _)
            .write_u64(1)
            .write_u32(99)
            .write_u64(3)
            .finish();
        let mut reader = GGufReader::new(&bytes);
        let value = reader
            .read_meta_value(GGufMetaDataValueType::Array as _)
            .unwrap();
        assert_eq!(value.unknown_type(), Some(99));
    }

    #[test]
    fn test_invalid_bool_keeps_width() {
        use GGufMetaDataValueType as Ty;
        use GGufMetaValue as V;
        assert_eq!(decode(Ty::Bool, &[2, 0xff]), (V::InvalidBool(2), 1));

        let bytes = GGufBuilder::new()
            .write_u32(Ty::Bool as _)
            .write_u64(3)
            .write_bytes(&[1, 0x55, 0])
            .write_u8(9)
            .finish();
        let mut reader = GGufReader::new(&bytes);
        let value = reader.read_meta_value(Ty::Array as _).unwrap();
        assert_eq!(
            value,
            V::Array(GGufMetaArray {
                ty: Ty::Bool as _,
                len: 3,
                items: vec![V::Bool(true), V::InvalidBool(0x55), V::Bool(false)],
            })
        );
        assert!(value.is_resolved());
        assert_eq!(value.invalid_bool(), Some(0x55));
        assert_eq!(value.ty(), Ok(Ty::Array));
        assert_eq!(reader.read_u8(), Ok(9));
    }

    #[test]
    fn test_nesting_limit() {
        let mut builder = GGufBuilder::new();
        for _ in 0..=MAX_NESTING {
            builder = builder
                .write_u32(GGufMetaDataValueType::Array as _)
                .write_u64(1);
        }
        let bytes = builder.finish();
        let mut reader = GGufReader::new(&bytes);
        assert_eq!(
            reader.read_meta_value(GGufMetaDataValueType::Array as _),
            Err(GGufReadError::NestingTooDeep(MAX_NESTING))
        );
    }

    #[test]
    fn test_huge_declared_count() {
        let bytes = GGufBuilder::new()
            .write_u32(GGufMetaDataValueType::U8 as _)
            .write_u64(u64::MAX)
            .write_u8(1)
            .finish();
        let mut reader = GGufReader::new(&bytes);
        assert!(matches!(
            reader.read_meta_value(GGufMetaDataValueType::Array as _),
            Err(GGufReadError::OutOfBounds { .. })
        ));
    }
}
