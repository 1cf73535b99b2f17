use crate::{GGufError, GGufReader};
use std::str::{from_utf8, Utf8Error};

pub const GGUF_MAGIC: [u8; 4] = *b"GGUF";

#[derive(Clone, Default, PartialEq, Eq, Debug)]
pub struct GGufFileHeader {
    pub magic: [u8; 4],
    pub version: u32,
    pub tensor_count: u64,
    pub metadata_kv_count: u64,
}

impl GGufFileHeader {
    /// Size of the fixed header: magic, version and two counts.
    pub const NBYTES: usize = 4 + 4 + 8 + 8;

    #[inline]
    pub const fn new(version: u32, tensor_count: u64, metadata_kv_count: u64) -> Self {
        Self {
            magic: GGUF_MAGIC,
            version,
            tensor_count,
            metadata_kv_count,
        }
    }

    /// Reads the header, checking the magic before any other field is touched.
    ///
    /// The version is recorded as is, unknown versions are not rejected.
    pub fn read(reader: &mut GGufReader) -> Result<Self, GGufError> {
        let len = reader.position() + reader.remaining();
        let truncated = |_| GGufError::Truncated { len };

        let magic = reader.read_bytes(GGUF_MAGIC.len()).map_err(truncated)?;
        let magic = [magic[0], magic[1], magic[2], magic[3]];
        if magic != GGUF_MAGIC {
            return Err(GGufError::NotGGuf(magic));
        }

        Ok(Self {
            magic,
            version: reader.read().map_err(truncated)?,
            tensor_count: reader.read().map_err(truncated)?,
            metadata_kv_count: reader.read().map_err(truncated)?,
        })
    }

    #[inline]
    pub const fn magic(&self) -> Result<&str, Utf8Error> {
        from_utf8(&self.magic)
    }
}
