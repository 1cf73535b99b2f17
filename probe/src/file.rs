use crate::{
    analyze, pad, AlignmentReport, GGufFileHeader, GGufMetaKV, GGufMetaMap, GGufMetaMapExt,
    GGufMetaValue, GGufReadError, GGufReader, GGufTensorInfo, DEFAULT_ALIGNMENT,
};
use indexmap::IndexMap;
use log::{debug, warn};
use std::{borrow::Cow, error::Error, fmt};

/// A decoded container: header, metadata in file order, the tensor table and warnings.
///
/// Borrows the buffer it was parsed from; payload bytes are never copied.
pub struct GGufFile<'a> {
    pub header: GGufFileHeader,
    pub meta_kvs: Vec<GGufMetaKV<'a>>,
    pub tensors: Vec<GGufTensorInfo<'a>>,
    /// Position right after the tensor table, `None` when the table was not walked to its end.
    pub data_section_start: Option<u64>,
    pub warnings: Vec<GGufWarning>,
    meta_index: IndexMap<Cow<'a, str>, usize>,
    tensor_index: IndexMap<Cow<'a, str>, usize>,
    data: &'a [u8],
}

/// Header-level rejection. No partial result exists in this case.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum GGufError {
    /// The buffer ends inside the fixed-size header.
    Truncated { len: usize },
    /// The first four bytes are not `GGUF`.
    NotGGuf([u8; 4]),
}

impl fmt::Display for GGufError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated { len } => write!(
                f,
                "truncated header: {len} bytes, need {}",
                GGufFileHeader::NBYTES
            ),
            Self::NotGGuf(magic) => write!(f, "not a gguf file, magic is {magic:02x?}"),
        }
    }
}

impl Error for GGufError {}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Phase {
    Metadata,
    Tensors,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum WarningKind {
    /// A read crossed the end of the buffer, or hit an invalid encoding.
    Truncated(GGufReadError),
    /// A value type tag of unknown width; nothing after it can be located.
    UnknownValueType(u32),
    /// A bool byte other than 0 or 1; the entry is kept and decoding goes on.
    InvalidBool { key: String, byte: u8 },
    DuplicateKey(String),
    DuplicateTensorName(String),
}

/// A non-fatal decode fault, located at the start of the entry it concerns.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct GGufWarning {
    pub phase: Phase,
    pub offset: usize,
    pub kind: WarningKind,
}

impl GGufWarning {
    /// Whether the phase stopped at this warning.
    #[inline]
    pub const fn is_truncation(&self) -> bool {
        matches!(
            self.kind,
            WarningKind::Truncated(_) | WarningKind::UnknownValueType(_)
        )
    }
}

impl fmt::Display for GGufWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self {
            phase,
            offset,
            kind,
        } = self;
        write!(f, "{phase:?} @ {offset:#x}: ")?;
        match kind {
            WarningKind::Truncated(e) => write!(f, "stopped, {e}"),
            WarningKind::UnknownValueType(ty) => write!(f, "stopped, unknown value type {ty}"),
            WarningKind::InvalidBool { key, byte } => {
                write!(f, "invalid bool byte {byte:#04x} in meta {key}")
            }
            WarningKind::DuplicateKey(key) => write!(f, "duplicate meta key {key}"),
            WarningKind::DuplicateTensorName(name) => write!(f, "duplicate tensor name {name}"),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum ParseStatus {
    /// Every phase ran to its end.
    Complete,
    /// Some phase stopped early, see the warnings.
    Partial,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ParseOptions {
    /// Tensor entries to materialize at most.
    pub max_tensors: usize,
    /// Walk the entries past `max_tensors` without decoding them,
    /// so that the data section start is still found.
    /// Without it, a limited parse leaves the data section unlocated.
    pub locate_data_section: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            max_tensors: usize::MAX,
            locate_data_section: true,
        }
    }
}

// smallest encodings: empty key, type tag, one byte value
const MIN_META_KV_NBYTES: usize = 8 + 4 + 1;
// empty name, no dimensions, type, offset
const MIN_TENSOR_NBYTES: usize = 8 + 4 + 4 + 8;

impl<'a> GGufFile<'a> {
    #[inline]
    pub fn new(data: &'a [u8]) -> Result<Self, GGufError> {
        Self::with_options(data, ParseOptions::default())
    }

    pub fn with_options(data: &'a [u8], options: ParseOptions) -> Result<Self, GGufError> {
        let mut reader = GGufReader::new(data);
        let header = GGufFileHeader::read(&mut reader)?;
        debug!(
            "gguf v{} with {} meta kvs and {} tensors",
            header.version, header.metadata_kv_count, header.tensor_count
        );

        let mut ans = Self {
            header,
            meta_kvs: Vec::new(),
            tensors: Vec::new(),
            data_section_start: None,
            warnings: Vec::new(),
            meta_index: IndexMap::new(),
            tensor_index: IndexMap::new(),
            data,
        };
        ans.read_meta_kvs(&mut reader);
        let walked = ans.read_tensors(&mut reader, options);
        // after a fault the cursor is not at the end of the table
        if walked && ans.status() == ParseStatus::Complete {
            ans.data_section_start = Some(reader.position() as _);
        }
        match ans.data_section_start {
            Some(start) => debug!(
                "data section starts at {start:#x}, {} warnings",
                ans.warnings.len()
            ),
            None => debug!(
                "data section not located, {} warnings",
                ans.warnings.len()
            ),
        }
        Ok(ans)
    }

    fn read_meta_kvs(&mut self, reader: &mut GGufReader<'a>) {
        let count = self.header.metadata_kv_count;
        self.meta_kvs
            .reserve(capacity(count, reader.remaining() / MIN_META_KV_NBYTES));

        for _ in 0..count {
            let offset = reader.position();
            let kv = match reader.read_meta_kv() {
                Ok(kv) => kv,
                Err(e) => {
                    self.warn(Phase::Metadata, offset, WarningKind::Truncated(e));
                    break;
                }
            };
            let unknown = kv.value.unknown_type();
            if let Some(byte) = kv.value.invalid_bool() {
                let key = kv.key.to_string();
                self.warn(Phase::Metadata, offset, WarningKind::InvalidBool { key, byte });
            }

            let idx = self.meta_kvs.len();
            if let Some(&first) = self.meta_index.get(&kv.key) {
                debug!("meta key {} repeats entry {first}", kv.key);
                let key = kv.key.to_string();
                self.warn(Phase::Metadata, offset, WarningKind::DuplicateKey(key));
            } else {
                self.meta_index.insert(kv.key.clone(), idx);
            }
            self.meta_kvs.push(kv);

            if let Some(ty) = unknown {
                self.warn(Phase::Metadata, offset, WarningKind::UnknownValueType(ty));
                break;
            }
        }
    }

    /// Returns whether the whole table was walked.
    fn read_tensors(&mut self, reader: &mut GGufReader<'a>, options: ParseOptions) -> bool {
        let count = self.header.tensor_count;
        let limit = count.min(options.max_tensors as u64);
        self.tensors
            .reserve(capacity(limit, reader.remaining() / MIN_TENSOR_NBYTES));

        for i in 0..count {
            let offset = reader.position();
            if i >= limit {
                if !options.locate_data_section {
                    return false;
                }
                if let Err(e) = reader.skip_tensor_info() {
                    self.warn(Phase::Tensors, offset, WarningKind::Truncated(e));
                    return false;
                }
                continue;
            }

            let info = match reader.read_tensor_info() {
                Ok(info) => info,
                Err(e) => {
                    self.warn(Phase::Tensors, offset, WarningKind::Truncated(e));
                    return false;
                }
            };
            let idx = self.tensors.len();
            if self.tensor_index.contains_key(info.name()) {
                let name = info.name().to_string();
                self.warn(Phase::Tensors, offset, WarningKind::DuplicateTensorName(name));
            } else {
                self.tensor_index.insert(info.key(), idx);
            }
            self.tensors.push(info);
        }
        true
    }

    fn warn(&mut self, phase: Phase, offset: usize, kind: WarningKind) {
        let warning = GGufWarning {
            phase,
            offset,
            kind,
        };
        warn!("{warning}");
        self.warnings.push(warning);
    }

    /// The buffer this file was parsed from.
    #[inline]
    pub const fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn status(&self) -> ParseStatus {
        if self.warnings.iter().any(GGufWarning::is_truncation) {
            ParseStatus::Partial
        } else {
            ParseStatus::Complete
        }
    }

    pub fn tensor(&self, name: &str) -> Option<&GGufTensorInfo<'a>> {
        self.tensor_index.get(name).map(|&i| &self.tensors[i])
    }

    /// Data section alignment from `general.alignment`, or the default.
    pub fn alignment(&self) -> usize {
        match self.general_alignment() {
            Ok(align) if align > 0 => align,
            _ => DEFAULT_ALIGNMENT,
        }
    }

    /// Where tensor payloads begin: the data section start padded to [`alignment`](Self::alignment).
    pub fn tensor_data_start(&self) -> Option<u64> {
        let align = self.alignment() as u64;
        self.data_section_start
            .map(|start| start.saturating_add(pad(start, align)))
    }

    /// Alignment reports of the decoded tensors, in table order.
    ///
    /// `None` when the data section was not located, since every absolute offset would be wrong.
    pub fn diagnose(
        &self,
    ) -> Option<impl Iterator<Item = (&GGufTensorInfo<'a>, AlignmentReport)> + '_> {
        let data_start = self.tensor_data_start()?;
        Some(
            self.tensors
                .iter()
                .map(move |t| (t, analyze(t, data_start, self.data))),
        )
    }
}

impl GGufMetaMap for GGufFile<'_> {
    fn get(&self, key: &str) -> Option<&GGufMetaValue> {
        self.meta_index
            .get(key)
            .map(|&i| &self.meta_kvs[i].value)
    }
}

fn capacity(count: u64, fits: usize) -> usize {
    usize::try_from(count).map_or(fits, |n| n.min(fits))
}
