use crate::{describe, GGufReadError, GGufReader, TypeDescription};
use std::borrow::Cow;

/// One entry of the tensor table. The payload itself is never copied.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct GGufTensorInfo<'a> {
    name: Cow<'a, str>,
    shape: Vec<u64>,
    ty: u32,
    offset: u64,
}

impl<'a> GGufReader<'a> {
    /// Decodes name, dimension count, shape, element type and data offset, in file order.
    pub fn read_tensor_info(&mut self) -> Result<GGufTensorInfo<'a>, GGufReadError> {
        let name = self.read_str()?;
        let ndim: u32 = self.read()?;
        let mut shape = Vec::with_capacity((ndim as usize).min(self.remaining() / size_of::<u64>()));
        for _ in 0..ndim {
            shape.push(self.read()?);
        }
        let ty = self.read()?;
        let offset = self.read()?;
        Ok(GGufTensorInfo {
            name,
            shape,
            ty,
            offset,
        })
    }

    /// Steps over one tensor entry without materializing it.
    pub(crate) fn skip_tensor_info(&mut self) -> Result<&mut Self, GGufReadError> {
        let ndim: u32 = self.skip_str()?.read()?;
        self.skip_n::<u64>(ndim as _)?
            .skip_n::<u32>(1)?
            .skip_n::<u64>(1)
    }
}

impl<'a> GGufTensorInfo<'a> {
    #[inline]
    pub fn new(name: impl Into<Cow<'a, str>>, shape: Vec<u64>, ty: u32, offset: u64) -> Self {
        Self {
            name: name.into(),
            shape,
            ty,
            offset,
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub(crate) fn key(&self) -> Cow<'a, str> {
        self.name.clone()
    }

    #[inline]
    pub fn n_dims(&self) -> u32 {
        self.shape.len() as _
    }

    #[inline]
    pub fn shape(&self) -> &[u64] {
        &self.shape
    }

    #[inline]
    pub fn ty(&self) -> TypeDescription {
        describe(self.ty)
    }

    /// Payload offset, relative to the start of the data section.
    #[inline]
    pub const fn offset(&self) -> u64 {
        self.offset
    }

    pub fn nelements(&self) -> Option<u64> {
        self.shape
            .iter()
            .try_fold(1u64, |acc, &d| acc.checked_mul(d))
    }

    /// Payload size in bytes, `None` when the type is unknown or the shape does not fit it.
    #[inline]
    pub fn nbytes(&self) -> Option<u64> {
        self.ty().nbytes(&self.shape)
    }

    /// Whether the payload starts inside a buffer of `buf_len` bytes whose data section begins at `data_start`.
    pub fn is_offset_within(&self, data_start: u64, buf_len: u64) -> bool {
        data_start
            .checked_add(self.offset)
            .is_some_and(|abs| abs < buf_len)
    }
}
