use std::{borrow::Cow, error::Error, fmt};

/// Little-endian cursor over an immutable byte buffer.
///
/// Every read is bounds-checked: a read that would cross the end of the buffer
/// fails with [`GGufReadError::OutOfBounds`] and leaves the position where it was.
#[derive(Clone)]
pub struct GGufReader<'a> {
    data: &'a [u8],
    cursor: usize,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum GGufReadError {
    /// Reading `len` bytes at `offset` would cross the end of the buffer.
    OutOfBounds { offset: usize, len: usize },
    /// A boolean byte other than 0 or 1.
    InvalidBool(u8),
    /// Arrays nested deeper than [`MAX_NESTING`](crate::MAX_NESTING).
    NestingTooDeep(usize),
}

impl fmt::Display for GGufReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfBounds { offset, len } => {
                write!(f, "read of {len} bytes at offset {offset} is out of bounds")
            }
            Self::InvalidBool(b) => write!(f, "invalid bool byte {b:#04x}"),
            Self::NestingTooDeep(depth) => write!(f, "arrays nested deeper than {depth} levels"),
        }
    }
}

impl Error for GGufReadError {}

/// A fixed-width value stored little-endian in the container.
pub trait Primitive: Copy + 'static {
    const NBYTES: usize;

    fn from_le_slice(bytes: &[u8]) -> Self;
}

macro_rules! primitive {
    ($($ty:ty)+) => {
        $(
            impl Primitive for $ty {
                const NBYTES: usize = size_of::<$ty>();

                #[inline]
                fn from_le_slice(bytes: &[u8]) -> Self {
                    let mut buf = [0; size_of::<$ty>()];
                    buf.copy_from_slice(bytes);
                    <$ty>::from_le_bytes(buf)
                }
            }
        )+
    };
}

primitive!(u8 i8 u16 i16 u32 i32 u64 i64 f32 f64);

macro_rules! read_primitive {
    ($($name:ident: $ty:ty),+ $(,)?) => {
        $(
            #[inline]
            pub fn $name(&mut self) -> Result<$ty, GGufReadError> {
                self.read()
            }
        )+
    };
}

impl<'a> GGufReader<'a> {
    #[inline]
    pub const fn new(data: &'a [u8]) -> Self {
        Self { data, cursor: 0 }
    }

    /// Current read position, counted from the start of the buffer.
    #[inline]
    pub const fn position(&self) -> usize {
        self.cursor
    }

    #[inline]
    pub const fn remaining(&self) -> usize {
        self.data.len() - self.cursor
    }

    fn checked_end(&self, len: usize) -> Result<usize, GGufReadError> {
        self.cursor
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or(GGufReadError::OutOfBounds {
                offset: self.cursor,
                len,
            })
    }

    pub fn skip(&mut self, len: usize) -> Result<&mut Self, GGufReadError> {
        self.cursor = self.checked_end(len)?;
        Ok(self)
    }

    /// Skips `count` values of `T`.
    pub(crate) fn skip_n<T: Primitive>(&mut self, count: u64) -> Result<&mut Self, GGufReadError> {
        let len = usize::try_from(count)
            .ok()
            .and_then(|n| n.checked_mul(T::NBYTES))
            .unwrap_or(usize::MAX);
        self.skip(len)
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], GGufReadError> {
        let end = self.checked_end(len)?;
        let bytes = &self.data[self.cursor..end];
        self.cursor = end;
        Ok(bytes)
    }

    pub fn read<T: Primitive>(&mut self) -> Result<T, GGufReadError> {
        self.read_bytes(T::NBYTES).map(T::from_le_slice)
    }

    read_primitive! {
        read_u8: u8,
        read_u16: u16,
        read_u32: u32,
        read_u64: u64,
        read_i8: i8,
        read_i16: i16,
        read_i32: i32,
        read_i64: i64,
        read_f32: f32,
        read_f64: f64,
    }

    pub fn read_bool(&mut self) -> Result<bool, GGufReadError> {
        match self.read::<u8>()? {
            0 => Ok(false),
            1 => Ok(true),
            e => Err(GGufReadError::InvalidBool(e)),
        }
    }

    /// Reads `len` bytes as text.
    ///
    /// Invalid UTF-8 sequences are replaced with U+FFFD; valid text is borrowed from the buffer.
    pub fn read_string(&mut self, len: u64) -> Result<Cow<'a, str>, GGufReadError> {
        let len = usize::try_from(len).unwrap_or(usize::MAX);
        self.read_bytes(len).map(String::from_utf8_lossy)
    }

    /// Reads a string prefixed by its u64 byte length.
    pub fn read_str(&mut self) -> Result<Cow<'a, str>, GGufReadError> {
        let start = self.cursor;
        let len = self.read::<u64>()?;
        self.read_string(len).inspect_err(|_| self.cursor = start)
    }

    pub(crate) fn skip_str(&mut self) -> Result<&mut Self, GGufReadError> {
        let len = self.read::<u64>()?;
        self.skip_n::<u8>(len)
    }

    /// Reads an array header: the element type tag followed by the u64 element count.
    pub fn read_arr_header(&mut self) -> Result<(u32, u64), GGufReadError> {
        Ok((self.read()?, self.read()?))
    }
}

#[test]
fn test_primitives_little_endian() {
    let data = [
        0x01, // u8
        0x02, 0x01, // u16
        0x04, 0x03, 0x02, 0x01, // u32
        0x08, 0x07, 0x06, 0x05, 0x04, 0x03, 0x02, 0x01, // u64
        0xff, // i8
        0xfe, 0xff, // i16
        0xfd, 0xff, 0xff, 0xff, // i32
        0x00, 0x00, 0x80, 0x3f, // f32
    ];
    let mut reader = GGufReader::new(&data);
    assert_eq!(reader.read_u8(), Ok(0x01));
    assert_eq!(reader.read_u16(), Ok(0x0102));
    assert_eq!(reader.read_u32(), Ok(0x01020304));
    assert_eq!(reader.read_u64(), Ok(0x0102030405060708));
    assert_eq!(reader.read_i8(), Ok(-1));
    assert_eq!(reader.read_i16(), Ok(-2));
    assert_eq!(reader.read_i32(), Ok(-3));
    assert_eq!(reader.read_f32(), Ok(1.));
    assert_eq!(reader.remaining(), 0);
    assert_eq!(reader.position(), data.len());
}

#[test]
fn test_out_of_bounds_keeps_position() {
    let data = [1, 2, 3];
    let mut reader = GGufReader::new(&data);
    assert_eq!(reader.read_u8(), Ok(1));
    assert_eq!(
        reader.read_u32(),
        Err(GGufReadError::OutOfBounds { offset: 1, len: 4 })
    );
    assert_eq!(reader.position(), 1);
    assert!(reader.skip(3).is_err());
    assert_eq!(reader.read_bytes(2), Ok(&data[1..]));
    assert_eq!(reader.remaining(), 0);
    assert!(reader.read_u8().is_err());
    assert_eq!(reader.position(), 3);
}

#[test]
fn test_huge_lengths_do_not_overflow() {
    let mut data = u64::MAX.to_le_bytes().to_vec();
    data.extend_from_slice(b"abc");
    let mut reader = GGufReader::new(&data);
    assert!(matches!(
        reader.read_str(),
        Err(GGufReadError::OutOfBounds { .. })
    ));
    assert_eq!(reader.position(), 0);
    assert!(reader.skip_n::<u64>(u64::MAX).is_err());
    assert!(reader.skip(usize::MAX).is_err());
    assert_eq!(reader.position(), 0);
}

#[test]
fn test_strings() {
    let mut data = 5u64.to_le_bytes().to_vec();
    data.extend_from_slice(b"hello");
    data.extend_from_slice(&[0x66, 0xff, 0x6f]);
    let mut reader = GGufReader::new(&data);
    assert_eq!(reader.read_str().as_deref(), Ok("hello"));
    assert_eq!(reader.read_string(3).as_deref(), Ok("f\u{fffd}o"));
    assert_eq!(reader.remaining(), 0);
}

#[test]
fn test_bool() {
    let mut reader = GGufReader::new(&[0, 1, 2]);
    assert_eq!(reader.read_bool(), Ok(false));
    assert_eq!(reader.read_bool(), Ok(true));
    assert_eq!(reader.read_bool(), Err(GGufReadError::InvalidBool(2)));
}
