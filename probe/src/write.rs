//! Little-endian encoder used to build container fixtures in tests.

use crate::{pad, GGufFileHeader, GGufMetaDataValueType as Ty, GGufMetaValue};

#[derive(Default)]
#[repr(transparent)]
pub(crate) struct GGufBuilder(Vec<u8>);

macro_rules! write_primitive {
    ($($name:ident: $ty:ty),+ $(,)?) => {
        $(
            pub fn $name(mut self, val: $ty) -> Self {
                self.0.extend_from_slice(&val.to_le_bytes());
                self
            }
        )+
    };
}

impl GGufBuilder {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn written_bytes(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn finish(self) -> Vec<u8> {
        self.0
    }

    write_primitive! {
        write_u8: u8,
        write_i8: i8,
        write_u16: u16,
        write_i16: i16,
        write_u32: u32,
        write_i32: i32,
        write_u64: u64,
        write_i64: i64,
        write_f32: f32,
        write_f64: f64,
    }

    pub fn write_bytes(mut self, val: &[u8]) -> Self {
        self.0.extend_from_slice(val);
        self
    }

    pub fn write_str(self, val: impl AsRef<str>) -> Self {
        let val = val.as_ref().as_bytes();
        self.write_u64(val.len() as _).write_bytes(val)
    }

    pub fn write_header(self, header: &GGufFileHeader) -> Self {
        self.write_bytes(&header.magic)
            .write_u32(header.version)
            .write_u64(header.tensor_count)
            .write_u64(header.metadata_kv_count)
    }

    /// Writes the value body, without its type tag.
    pub fn write_value(self, val: &GGufMetaValue) -> Self {
        use GGufMetaValue as V;
        match val {
            V::U8(v) => self.write_u8(*v),
            V::I8(v) => self.write_i8(*v),
            V::U16(v) => self.write_u16(*v),
            V::I16(v) => self.write_i16(*v),
            V::U32(v) => self.write_u32(*v),
            V::I32(v) => self.write_i32(*v),
            V::F32(v) => self.write_f32(*v),
            V::Bool(v) => self.write_u8(*v as _),
            V::InvalidBool(b) => self.write_u8(*b),
            V::String(v) => self.write_str(v),
            V::U64(v) => self.write_u64(*v),
            V::I64(v) => self.write_i64(*v),
            V::F64(v) => self.write_f64(*v),
            V::Array(arr) => arr
                .items
                .iter()
                .fold(self.write_u32(arr.ty).write_u64(arr.len), Self::write_value),
            V::Unknown(_) => self,
        }
    }

    pub fn write_meta_kv(self, key: &str, val: &GGufMetaValue) -> Self {
        let ty = match val.ty() {
            Ok(ty) => ty as u32,
            Err(ty) => ty,
        };
        self.write_str(key).write_u32(ty).write_value(val)
    }

    pub fn write_alignment(self, alignment: u32) -> Self {
        self.write_str(crate::GENERAL_ALIGNMENT)
            .write_u32(Ty::U32 as _)
            .write_u32(alignment)
    }

    pub fn write_tensor_info(self, name: &str, shape: &[u64], ty: u32, offset: u64) -> Self {
        shape
            .iter()
            .fold(self.write_str(name).write_u32(shape.len() as _), |b, &d| {
                b.write_u64(d)
            })
            .write_u32(ty)
            .write_u64(offset)
    }

    /// Zero-pads up to the next multiple of `align`.
    pub fn pad_to(self, align: usize) -> Self {
        let n = pad(self.written_bytes() as _, align as _) as usize;
        self.write_bytes(&vec![0; n])
    }
}
