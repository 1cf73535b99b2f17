use std::{fmt, ops::RangeInclusive};

/// Standard ggml tensor element types.
#[derive(num_enum::TryFromPrimitive, Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[repr(u32)]
pub enum GGmlType {
    F32 = 0,
    F16 = 1,
    Q4_0 = 2,
    Q4_1 = 3,
    /// Support removed from ggml, size unknown.
    Q4_2 = 4,
    /// Support removed from ggml, size unknown.
    Q4_3 = 5,
    Q5_0 = 6,
    Q5_1 = 7,
    Q8_0 = 8,
    Q8_1 = 9,
    Q2K = 10,
    Q3K = 11,
    Q4K = 12,
    Q5K = 13,
    Q6K = 14,
    Q8K = 15,
    IQ2XXS = 16,
    IQ2XS = 17,
    IQ3XXS = 18,
    IQ1S = 19,
    IQ4NL = 20,
    IQ3S = 21,
    IQ2S = 22,
    IQ4XS = 23,
    I8 = 24,
    I16 = 25,
    I32 = 26,
    I64 = 27,
    F64 = 28,
    IQ1M = 29,
    BF16 = 30,
    Q4_0_4_4 = 31,
    Q4_0_4_8 = 32,
    Q4_0_8_8 = 33,
}

/// Vendor codes of the sub-byte packed ternary family.
pub const PACKED_TERNARY_CODES: RangeInclusive<u32> = 100..=110;
/// Bits spent on one element of a packed ternary tensor.
pub const PACKED_TERNARY_BITS: u64 = 2;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct GGmlTypeSize {
    pub block_size: u32,
    pub type_size: u32,
}

impl GGmlTypeSize {
    /// Payload bytes of a tensor with `shape`.
    ///
    /// The first dimension must be a multiple of the block size; `None` on mismatch or overflow.
    pub fn elements_to_bytes(&self, shape: &[u64]) -> Option<u64> {
        let blk = self.block_size as u64;
        let ele = self.type_size as u64;
        match shape {
            [] => (blk == 1).then_some(ele),
            [first, others @ ..] => {
                if first % blk != 0 {
                    return None;
                }
                others
                    .iter()
                    .try_fold(first / blk, |acc, &d| acc.checked_mul(d))?
                    .checked_mul(ele)
            }
        }
    }
}

impl GGmlType {
    pub const fn name(self) -> &'static str {
        #[rustfmt::skip]
        let name = match self {
            Self::F32      => "F32",
            Self::F16      => "F16",
            Self::Q4_0     => "Q4_0",
            Self::Q4_1     => "Q4_1",
            Self::Q4_2     => "Q4_2",
            Self::Q4_3     => "Q4_3",
            Self::Q5_0     => "Q5_0",
            Self::Q5_1     => "Q5_1",
            Self::Q8_0     => "Q8_0",
            Self::Q8_1     => "Q8_1",
            Self::Q2K      => "Q2_K",
            Self::Q3K      => "Q3_K",
            Self::Q4K      => "Q4_K",
            Self::Q5K      => "Q5_K",
            Self::Q6K      => "Q6_K",
            Self::Q8K      => "Q8_K",
            Self::IQ2XXS   => "IQ2_XXS",
            Self::IQ2XS    => "IQ2_XS",
            Self::IQ3XXS   => "IQ3_XXS",
            Self::IQ1S     => "IQ1_S",
            Self::IQ4NL    => "IQ4_NL",
            Self::IQ3S     => "IQ3_S",
            Self::IQ2S     => "IQ2_S",
            Self::IQ4XS    => "IQ4_XS",
            Self::I8       => "I8",
            Self::I16      => "I16",
            Self::I32      => "I32",
            Self::I64      => "I64",
            Self::F64      => "F64",
            Self::IQ1M     => "IQ1_M",
            Self::BF16     => "BF16",
            Self::Q4_0_4_4 => "Q4_0_4_4",
            Self::Q4_0_4_8 => "Q4_0_4_8",
            Self::Q4_0_8_8 => "Q4_0_8_8",
        };
        name
    }

    /// Block and byte sizes, `None` for the removed types.
    pub const fn size(self) -> Option<GGmlTypeSize> {
        // See: GGML_QUANT_SIZES in <https://github.com/ggerganov/llama.cpp/blob/master/gguf-py/gguf/constants.py>
        const QK_K: u32 = 256;
        const fn unit<T>() -> (u32, u32) {
            (1, size_of::<T>() as _)
        }
        #[rustfmt::skip]
        let (block_size, type_size) = match self {
            Self::F32      => unit::<f32>(),
            Self::F16      => unit::<u16>(),
            Self::Q4_0     => ( 32, 2 + 16),
            Self::Q4_1     => ( 32, 2 + 2 + 16),
            Self::Q4_2 |
            Self::Q4_3     => return None,
            Self::Q5_0     => ( 32, 2 + 4 + 16),
            Self::Q5_1     => ( 32, 2 + 2 + 4 + 16),
            Self::Q8_0     => ( 32, 2 + 32),
            Self::Q8_1     => ( 32, 4 + 4 + 32),
            Self::Q2K      => (256, 2 + 2 + QK_K / 16 + QK_K / 4),
            Self::Q3K      => (256, 2 + QK_K / 4 + QK_K / 8 + 12),
            Self::Q4K      => (256, 2 + 2 + QK_K / 2 + 12),
            Self::Q5K      => (256, 2 + 2 + QK_K / 2 + QK_K / 8 + 12),
            Self::Q6K      => (256, 2 + QK_K / 2 + QK_K / 4 + QK_K / 16),
            Self::Q8K      => (256, 4 + QK_K + QK_K / 8),
            Self::IQ2XXS   => (256, 2 + QK_K / 4),
            Self::IQ2XS    => (256, 2 + QK_K / 4 + QK_K / 32),
            Self::IQ3XXS   => (256, 2 + QK_K / 4 + QK_K / 8),
            Self::IQ1S     => (256, 2 + QK_K / 8 + QK_K / 16),
            Self::IQ4NL    => ( 32, 2 + 16),
            Self::IQ3S     => (256, 2 + QK_K / 4 + QK_K / 8 + QK_K / 32 + 4),
            Self::IQ2S     => (256, 2 + QK_K / 4 + QK_K / 16),
            Self::IQ4XS    => (256, 2 + 2 + QK_K / 2 + QK_K / 64),
            Self::I8       => unit::<i8 >(),
            Self::I16      => unit::<i16>(),
            Self::I32      => unit::<i32>(),
            Self::I64      => unit::<i64>(),
            Self::F64      => unit::<f64>(),
            Self::IQ1M     => (256, QK_K / 8 + QK_K / 16  + QK_K / 32),
            Self::BF16     => unit::<u16>(),
            Self::Q4_0_4_4 => (32, 2 + 16),
            Self::Q4_0_4_8 => (32, 2 + 16),
            Self::Q4_0_8_8 => (32, 2 + 16),
        };
        Some(GGmlTypeSize {
            block_size,
            type_size,
        })
    }
}

/// What the registry knows about a tensor element type code.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum TypeDescription {
    Standard(GGmlType),
    /// Vendor ternary code, elements packed below one byte each.
    PackedTernary(u32),
    Unrecognized(u32),
}

/// Looks up an element type code. Never fails: unknown codes are described as such.
pub fn describe(code: u32) -> TypeDescription {
    if let Ok(ty) = GGmlType::try_from(code) {
        TypeDescription::Standard(ty)
    } else if PACKED_TERNARY_CODES.contains(&code) {
        TypeDescription::PackedTernary(code)
    } else {
        TypeDescription::Unrecognized(code)
    }
}

impl TypeDescription {
    pub const fn code(self) -> u32 {
        match self {
            Self::Standard(ty) => ty as _,
            Self::PackedTernary(code) | Self::Unrecognized(code) => code,
        }
    }

    #[inline]
    pub const fn is_packed(self) -> bool {
        matches!(self, Self::PackedTernary(_))
    }

    #[inline]
    pub const fn is_recognized(self) -> bool {
        !matches!(self, Self::Unrecognized(_))
    }

    /// Fixed block layout, absent for packed and unknown codes.
    pub const fn fixed_size(self) -> Option<GGmlTypeSize> {
        match self {
            Self::Standard(ty) => ty.size(),
            Self::PackedTernary(_) | Self::Unrecognized(_) => None,
        }
    }

    /// Payload bytes of a tensor with `shape`.
    ///
    /// Packed codes are sized as `ceil(elements * bits / 8)` rather than by a per-element width.
    pub fn nbytes(self, shape: &[u64]) -> Option<u64> {
        match self {
            Self::Standard(ty) => ty.size()?.elements_to_bytes(shape),
            Self::PackedTernary(_) => shape
                .iter()
                .try_fold(1u64, |acc, &d| acc.checked_mul(d))?
                .checked_mul(PACKED_TERNARY_BITS)
                .map(|bits| bits.div_ceil(8)),
            Self::Unrecognized(_) => None,
        }
    }
}

impl fmt::Display for TypeDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Standard(ty) => f.write_str(ty.name()),
            Self::PackedTernary(code) => write!(f, "I2_S({code})"),
            Self::Unrecognized(code) => write!(f, "unrecognized type {code}"),
        }
    }
}

#[test]
fn test_standard_codes() {
    for code in 0..=33 {
        let desc = describe(code);
        assert!(matches!(desc, TypeDescription::Standard(_)));
        assert_eq!(desc.code(), code);
    }
    assert_eq!(describe(0).to_string(), "F32");
    assert_eq!(describe(10).to_string(), "Q2_K");
    assert_eq!(describe(30).to_string(), "BF16");
    assert_eq!(describe(4).fixed_size(), None);
}

#[test]
fn test_standard_sizes() {
    use TypeDescription::Standard;
    assert_eq!(Standard(GGmlType::F32).nbytes(&[4, 3]), Some(48));
    assert_eq!(Standard(GGmlType::F16).nbytes(&[]), Some(2));
    assert_eq!(Standard(GGmlType::Q4_0).nbytes(&[64, 2]), Some(4 * 18));
    assert_eq!(Standard(GGmlType::Q6K).nbytes(&[256]), Some(210));
    // rows must hold whole blocks
    assert_eq!(Standard(GGmlType::Q8_0).nbytes(&[33]), None);
    assert_eq!(Standard(GGmlType::Q8_0).nbytes(&[]), None);
    assert_eq!(Standard(GGmlType::F32).nbytes(&[u64::MAX, 2]), None);
}

#[test]
fn test_packed_ternary() {
    assert_eq!(describe(99), TypeDescription::Unrecognized(99));
    for code in 100..=110 {
        let desc = describe(code);
        assert!(desc.is_packed());
        assert_eq!(desc.fixed_size(), None);
    }
    assert_eq!(describe(111), TypeDescription::Unrecognized(111));

    let desc = describe(101);
    assert_eq!(desc.to_string(), "I2_S(101)");
    assert_eq!(desc.nbytes(&[16]), Some(4));
    assert_eq!(desc.nbytes(&[5]), Some(2));
    assert_eq!(desc.nbytes(&[3, 3]), Some(3));
    assert_eq!(desc.nbytes(&[u64::MAX]), None);
}

#[test]
fn test_unrecognized() {
    let desc = describe(77);
    assert!(!desc.is_recognized());
    assert_eq!(desc.to_string(), "unrecognized type 77");
    assert_eq!(desc.nbytes(&[1]), None);
}
