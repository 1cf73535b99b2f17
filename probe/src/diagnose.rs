//! Alignment classes and the packing-risk lint for tensor payloads.
//!
//! Everything here is advisory: a report never turns a successful parse into a failure.

use crate::GGufTensorInfo;

/// Payload bytes inspected by the packing-risk lint.
pub const SAMPLE_NBYTES: usize = 64;

/// Alignment facts about one tensor payload.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct AlignmentReport {
    /// `data_start + offset`, saturated on overflow.
    pub absolute_offset: u64,
    pub residue_4: u8,
    pub residue_8: u8,
    pub residue_16: u8,
    /// The payload starts inside the buffer.
    pub offset_in_bounds: bool,
    /// The whole payload fits in the buffer; `None` when its size is unknown.
    pub payload_in_bounds: Option<bool>,
    /// Sampled payload words carry alternating bit runs typical of a bad sub-byte interleave.
    pub packing_risk: bool,
}

impl AlignmentReport {
    #[inline]
    pub const fn is_aligned_4(&self) -> bool {
        self.residue_4 == 0
    }

    #[inline]
    pub const fn is_aligned_8(&self) -> bool {
        self.residue_8 == 0
    }

    #[inline]
    pub const fn is_aligned_16(&self) -> bool {
        self.residue_16 == 0
    }

    /// The widest of 16, 8, 4 the offset is aligned to, 1 otherwise.
    pub const fn alignment_class(&self) -> u32 {
        if self.is_aligned_16() {
            16
        } else if self.is_aligned_8() {
            8
        } else if self.is_aligned_4() {
            4
        } else {
            1
        }
    }
}

/// Computes the alignment report of `tensor` whose data section starts at `data_start` in `data`.
///
/// Only tensors of the packed ternary family are sampled for packing risk.
pub fn analyze(tensor: &GGufTensorInfo, data_start: u64, data: &[u8]) -> AlignmentReport {
    let absolute_offset = data_start.saturating_add(tensor.offset());
    let buf_len = data.len() as u64;
    let payload_in_bounds = tensor
        .nbytes()
        .map(|n| absolute_offset.checked_add(n).is_some_and(|end| end <= buf_len));

    let packing_risk = tensor.ty().is_packed()
        && usize::try_from(absolute_offset)
            .ok()
            .and_then(|start| data.get(start..))
            .is_some_and(|payload| has_packing_risk(&payload[..payload.len().min(SAMPLE_NBYTES)]));

    AlignmentReport {
        absolute_offset,
        residue_4: (absolute_offset % 4) as _,
        residue_8: (absolute_offset % 8) as _,
        residue_16: (absolute_offset % 16) as _,
        offset_in_bounds: tensor.is_offset_within(data_start, buf_len),
        payload_in_bounds,
        packing_risk,
    }
}

/// Scans `sample` as little-endian u32 words.
///
/// A non-zero word is risky when its 32-digit binary form contains `10101010` or `01010101`.
/// All-zero words are padding and exempt; a trailing partial word is ignored.
pub fn has_packing_risk(sample: &[u8]) -> bool {
    sample
        .chunks_exact(size_of::<u32>())
        .map(|word| u32::from_le_bytes([word[0], word[1], word[2], word[3]]))
        .filter(|&word| word != 0)
        .any(has_alternating_run)
}

/// Any 8-bit window of `word` reading `10101010` or `01010101`.
fn has_alternating_run(word: u32) -> bool {
    (0..=u32::BITS - 8).any(|shift| matches!((word >> shift) & 0xff, 0xaa | 0x55))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GGmlType;

    fn tensor(ty: u32, offset: u64) -> GGufTensorInfo<'static> {
        GGufTensorInfo::new("blk.0.ffn_up.weight", vec![64], ty, offset)
    }

    #[test]
    fn test_alignment_classes() {
        let data = [0u8; 256];
        let report = analyze(&tensor(GGmlType::F32 as _, 64), 0, &data);
        assert_eq!(report.absolute_offset, 64);
        assert!(report.is_aligned_4() && report.is_aligned_8() && report.is_aligned_16());
        assert_eq!(report.alignment_class(), 16);

        let report = analyze(&tensor(GGmlType::F32 as _, 36), 0, &data);
        assert!(report.is_aligned_4());
        assert!(!report.is_aligned_8());
        assert!(!report.is_aligned_16());
        assert_eq!(report.alignment_class(), 4);

        let report = analyze(&tensor(GGmlType::F32 as _, 3), 21, &data);
        assert_eq!(report.absolute_offset, 24);
        assert_eq!((report.residue_4, report.residue_8, report.residue_16), (0, 0, 8));
        assert_eq!(report.alignment_class(), 8);

        let report = analyze(&tensor(GGmlType::F32 as _, 1), 0, &data);
        assert_eq!(report.alignment_class(), 1);
    }

    #[test]
    fn test_bounds() {
        let data = [0u8; 300];
        // 64 f32 elements are 256 bytes
        let report = analyze(&tensor(GGmlType::F32 as _, 40), 0, &data);
        assert!(report.offset_in_bounds);
        assert_eq!(report.payload_in_bounds, Some(true));

        let report = analyze(&tensor(GGmlType::F32 as _, 48), 0, &data);
        assert!(report.offset_in_bounds);
        assert_eq!(report.payload_in_bounds, Some(false));

        let report = analyze(&tensor(GGmlType::F32 as _, 400), 0, &data);
        assert!(!report.offset_in_bounds);

        let report = analyze(&tensor(77, 0), 0, &data);
        assert_eq!(report.payload_in_bounds, None);

        let report = analyze(&tensor(GGmlType::F32 as _, u64::MAX), 8, &data);
        assert_eq!(report.absolute_offset, u64::MAX);
        assert!(!report.offset_in_bounds);
    }

    #[test]
    fn test_zero_payload_is_not_risky() {
        let data = [0u8; 64];
        let report = analyze(&tensor(101, 0), 0, &data);
        assert!(!report.packing_risk);
    }

    #[test]
    fn test_alternating_word_is_risky() {
        let mut data = [0u8; 64];
        data[8..12].copy_from_slice(&0xaaaaaaaau32.to_le_bytes());
        let report = analyze(&tensor(101, 0), 0, &data);
        assert!(report.packing_risk);

        // only the packed family is sampled
        let report = analyze(&tensor(GGmlType::I8 as _, 0), 0, &data);
        assert!(!report.packing_risk);
    }

    #[test]
    fn test_sample_window() {
        let mut data = [0u8; 128];
        data[64..68].copy_from_slice(&0x55u32.to_le_bytes());
        assert!(!analyze(&tensor(105, 0), 0, &data).packing_risk);
        assert!(analyze(&tensor(105, 4), 0, &data).packing_risk);
        // payload past the end cannot be sampled
        assert!(!analyze(&tensor(105, 1000), 0, &data).packing_risk);
    }

    #[test]
    fn test_bit_runs() {
        assert!(has_alternating_run(0xaa));
        assert!(has_alternating_run(0x55 << 24));
        // 0b0101_0101 across a byte boundary
        assert!(has_alternating_run(0x0550));
        assert!(!has_alternating_run(0xffff_ffff));
        assert!(!has_alternating_run(0x0f0f_0f0f));
        assert!(!has_alternating_run(0x0000_00a0));
        // a partial trailing word is ignored
        assert!(!has_packing_risk(&[0xaa, 0xaa, 0xaa]));
    }
}
