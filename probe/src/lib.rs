#![doc = include_str!("../README.md")]

mod diagnose;
mod file;
mod header;
mod metadata;
mod read;
mod tensor;
mod types;
#[cfg(test)]
mod write;

pub use diagnose::{analyze, has_packing_risk, AlignmentReport, SAMPLE_NBYTES};
pub use file::{GGufError, GGufFile, GGufWarning, ParseOptions, ParseStatus, Phase, WarningKind};
pub use header::{GGufFileHeader, GGUF_MAGIC};
pub use metadata::{
    GGufMetaArray, GGufMetaDataValueType, GGufMetaError, GGufMetaKV, GGufMetaMap, GGufMetaMapExt,
    GGufMetaValue, DEFAULT_ALIGNMENT, GENERAL_ALIGNMENT, MAX_NESTING,
};
pub use read::{GGufReadError, GGufReader, Primitive};
pub use tensor::GGufTensorInfo;
pub use types::{
    describe, GGmlType, GGmlTypeSize, TypeDescription, PACKED_TERNARY_BITS, PACKED_TERNARY_CODES,
};

#[inline(always)]
const fn pad(pos: u64, align: u64) -> u64 {
    (align - pos % align) % align
}
