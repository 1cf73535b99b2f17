use super::{GGufMetaDataValueType as Ty, GGufMetaValue, GENERAL_ALIGNMENT};
use std::{error::Error, fmt};

pub trait GGufMetaMap {
    /// The first value stored under `key`.
    fn get(&self, key: &str) -> Option<&GGufMetaValue>;
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum GGufMetaError {
    NotExist,
    TypeMismatch(Result<Ty, u32>),
    OutOfRange,
}

impl fmt::Display for GGufMetaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotExist => f.write_str("key not exist"),
            Self::TypeMismatch(Ok(ty)) => write!(f, "unexpected value type {}", ty.name()),
            Self::TypeMismatch(Err(ty)) => write!(f, "unexpected value type {ty}"),
            Self::OutOfRange => f.write_str("value out of range"),
        }
    }
}

impl Error for GGufMetaError {}

pub trait GGufMetaMapExt: GGufMetaMap {
    fn get_value(&self, key: &str) -> Result<&GGufMetaValue, GGufMetaError> {
        self.get(key).ok_or(GGufMetaError::NotExist)
    }

    fn get_str(&self, key: &str) -> Result<&str, GGufMetaError> {
        match self.get_value(key)? {
            GGufMetaValue::String(s) => Ok(&**s),
            val => Err(GGufMetaError::TypeMismatch(val.ty())),
        }
    }

    fn get_usize(&self, key: &str) -> Result<usize, GGufMetaError> {
        use GGufMetaValue as V;

        macro_rules! convert {
            ($val:expr) => {
                usize::try_from(*$val).map_err(|_| GGufMetaError::OutOfRange)?
            };
        }

        #[rustfmt::skip]
        let ans = match self.get_value(key)? {
            V::U8  (v) => convert!(v),
            V::U16 (v) => convert!(v),
            V::U32 (v) => convert!(v),
            V::U64 (v) => convert!(v),
            V::I8  (v) => convert!(v),
            V::I16 (v) => convert!(v),
            V::I32 (v) => convert!(v),
            V::I64 (v) => convert!(v),
            V::Bool(v) => *v as _,
            val        => return Err(GGufMetaError::TypeMismatch(val.ty())),
        };
        Ok(ans)
    }

    fn get_u32(&self, key: &str) -> Result<u32, GGufMetaError> {
        match self.get_value(key)? {
            GGufMetaValue::U32(v) => Ok(*v),
            val => Err(GGufMetaError::TypeMismatch(val.ty())),
        }
    }

    fn get_f32(&self, key: &str) -> Result<f32, GGufMetaError> {
        match self.get_value(key)? {
            GGufMetaValue::F32(v) => Ok(*v),
            val => Err(GGufMetaError::TypeMismatch(val.ty())),
        }
    }

    fn get_bool(&self, key: &str) -> Result<bool, GGufMetaError> {
        match self.get_value(key)? {
            GGufMetaValue::Bool(v) => Ok(*v),
            GGufMetaValue::InvalidBool(_) => Err(GGufMetaError::OutOfRange),
            val => Err(GGufMetaError::TypeMismatch(val.ty())),
        }
    }

    #[inline]
    fn general_architecture(&self) -> Result<&str, GGufMetaError> {
        self.get_str("general.architecture")
    }

    #[inline]
    fn general_name(&self) -> Result<&str, GGufMetaError> {
        self.get_str("general.name")
    }

    #[inline]
    fn general_quantization_version(&self) -> Result<usize, GGufMetaError> {
        self.get_usize("general.quantization_version")
    }

    #[inline]
    fn general_alignment(&self) -> Result<usize, GGufMetaError> {
        self.get_usize(GENERAL_ALIGNMENT)
    }
}

impl<T: GGufMetaMap> GGufMetaMapExt for T {}
