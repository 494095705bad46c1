//! Mapping between Rust values and stored elements.
//!
//! A type becomes storable by describing its element layout and by knowing
//! how to encode and decode one element. Plain structs get an implementation
//! from [`impl_storable_compound!`](crate::impl_storable_compound).

use crate::codec::{Decoder, Encoder};
use crate::types::{CompoundField, CompoundType, EnumType, FloatType, IntegerType, TypeDescriptor};
use crate::{Error, Result};

/// A value that can be stored as one container element.
pub trait Storable: Sized + 'static {
    /// Layout this type writes.
    fn type_descriptor() -> TypeDescriptor;

    /// Returns true if elements stored as `stored` can be read as `Self`.
    fn accepts(stored: &TypeDescriptor) -> bool {
        stored.matches(&Self::type_descriptor())
    }

    /// Encodes `self` into an element of type `target`.
    ///
    /// `target` always matches [`Storable::type_descriptor`].
    ///
    /// # Errors
    /// Returns an error if the element region is too small.
    fn encode(&self, encoder: &mut Encoder<'_>, target: &TypeDescriptor) -> Result<()>;

    /// Decodes an element of type `stored`.
    ///
    /// `stored` is always accepted by [`Storable::accepts`].
    ///
    /// # Errors
    /// Returns an error if the element holds a value `Self` cannot represent.
    fn decode(decoder: &mut Decoder<'_>, stored: &TypeDescriptor) -> Result<Self>;
}

macro_rules! impl_storable_number {
    ($($ty:ty => $desc:expr),+ $(,)?) => {$(
        impl Storable for $ty {
            fn type_descriptor() -> TypeDescriptor {
                $desc
            }

            fn encode(&self, encoder: &mut Encoder<'_>, _target: &TypeDescriptor) -> Result<()> {
                encoder.write_le(&self.to_le_bytes())
            }

            fn decode(decoder: &mut Decoder<'_>, _stored: &TypeDescriptor) -> Result<Self> {
                Ok(<$ty>::from_le_bytes(decoder.read_le()?))
            }
        }
    )+};
}

impl_storable_number!(
    u8 => TypeDescriptor::Integer(IntegerType::U8),
    u16 => TypeDescriptor::Integer(IntegerType::U16),
    u32 => TypeDescriptor::Integer(IntegerType::U32),
    u64 => TypeDescriptor::Integer(IntegerType::U64),
    i8 => TypeDescriptor::Integer(IntegerType::I8),
    i16 => TypeDescriptor::Integer(IntegerType::I16),
    i32 => TypeDescriptor::Integer(IntegerType::I32),
    i64 => TypeDescriptor::Integer(IntegerType::I64),
    f32 => TypeDescriptor::Float(FloatType::F32),
    f64 => TypeDescriptor::Float(FloatType::F64),
);

/// Booleans are stored as the enum `{FALSE = 0, TRUE = 1}` over `u8`.
///
/// Reading also accepts the same enum over any other integer width or
/// signedness, which is how some writers label their flags. Any stored
/// value other than 0 or 1 is rejected.
impl Storable for bool {
    fn type_descriptor() -> TypeDescriptor {
        TypeDescriptor::Enum(EnumType::boolean(IntegerType::U8))
    }

    fn accepts(stored: &TypeDescriptor) -> bool {
        match stored {
            TypeDescriptor::Enum(ty) => ty.same_members(&EnumType::boolean(ty.base())),
            _ => false,
        }
    }

    fn encode(&self, encoder: &mut Encoder<'_>, _target: &TypeDescriptor) -> Result<()> {
        encoder.write_le(&[u8::from(*self)])
    }

    fn decode(decoder: &mut Decoder<'_>, stored: &TypeDescriptor) -> Result<Self> {
        match decoder.read_uint(stored.size())? {
            0 => Ok(false),
            1 => Ok(true),
            value => Err(Error::InvalidEnumValue {
                value,
                ty: stored.to_string(),
            }),
        }
    }
}

/// Strings are stored as variable-length UTF-8.
impl Storable for String {
    fn type_descriptor() -> TypeDescriptor {
        TypeDescriptor::VariableString
    }

    fn encode(&self, encoder: &mut Encoder<'_>, _target: &TypeDescriptor) -> Result<()> {
        encoder.write_heap(self.as_bytes())
    }

    fn decode(decoder: &mut Decoder<'_>, _stored: &TypeDescriptor) -> Result<Self> {
        let bytes = decoder.read_heap()?;
        String::from_utf8(bytes.to_vec())
            .map_err(|err| Error::InvalidFormat(format!("stored string is not UTF-8: {err}")))
    }
}

impl<T: Storable, const N: usize> Storable for [T; N] {
    fn type_descriptor() -> TypeDescriptor {
        TypeDescriptor::array_of(T::type_descriptor(), N)
    }

    fn accepts(stored: &TypeDescriptor) -> bool {
        match stored {
            TypeDescriptor::FixedArray { element, len } => *len == N && T::accepts(element),
            _ => false,
        }
    }

    fn encode(&self, encoder: &mut Encoder<'_>, target: &TypeDescriptor) -> Result<()> {
        let element = array_element(target)?;
        let size = element.size();
        for (i, value) in self.iter().enumerate() {
            value.encode(&mut encoder.sub(i * size, size)?, element)?;
        }
        Ok(())
    }

    fn decode(decoder: &mut Decoder<'_>, stored: &TypeDescriptor) -> Result<Self> {
        let element = array_element(stored)?;
        let size = element.size();
        let values = (0..N)
            .map(|i| T::decode(&mut decoder.sub(i * size, size)?, element))
            .collect::<Result<Vec<T>>>()?;
        values
            .try_into()
            .map_err(|_| Error::ShapeMismatch(format!("expected {N} array elements")))
    }
}

fn array_element(ty: &TypeDescriptor) -> Result<&TypeDescriptor> {
    match ty {
        TypeDescriptor::FixedArray { element, .. } => Ok(element),
        other => Err(Error::TypeMismatch {
            expected: "fixed array".to_string(),
            found: other.to_string(),
        }),
    }
}

/// Handle to another group or dataset in the same file.
///
/// Obtained from [`Location::reference`](crate::Location::reference) and
/// resolved with [`File::dereference`](crate::File::dereference).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObjectReference(pub(crate) u64);

impl ObjectReference {
    /// Stable node id inside the file.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl Storable for ObjectReference {
    fn type_descriptor() -> TypeDescriptor {
        TypeDescriptor::Reference
    }

    fn encode(&self, encoder: &mut Encoder<'_>, _target: &TypeDescriptor) -> Result<()> {
        encoder.write_le(&self.0.to_le_bytes())
    }

    fn decode(decoder: &mut Decoder<'_>, _stored: &TypeDescriptor) -> Result<Self> {
        Ok(Self(u64::from_le_bytes(decoder.read_le()?)))
    }
}

/// Tag written for [`Opaque`] elements.
pub const OPAQUE_TAG: &str = "voxie:bytes";

/// Fixed-size block of uninterpreted bytes.
///
/// Reads accept opaque elements of the right size under any tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Opaque<const N: usize>(pub [u8; N]);

impl<const N: usize> Storable for Opaque<N> {
    fn type_descriptor() -> TypeDescriptor {
        TypeDescriptor::Opaque {
            size: N,
            tag: OPAQUE_TAG.to_string(),
        }
    }

    fn accepts(stored: &TypeDescriptor) -> bool {
        matches!(stored, TypeDescriptor::Opaque { size, .. } if *size == N)
    }

    fn encode(&self, encoder: &mut Encoder<'_>, _target: &TypeDescriptor) -> Result<()> {
        encoder.write_raw(&self.0)
    }

    fn decode(decoder: &mut Decoder<'_>, _stored: &TypeDescriptor) -> Result<Self> {
        Ok(Self(decoder.read_raw()?))
    }
}

/// Fields of a compound descriptor.
///
/// # Errors
/// Returns [`Error::TypeMismatch`] for any other class.
#[doc(hidden)]
pub fn compound_fields(ty: &TypeDescriptor) -> Result<&[CompoundField]> {
    match ty {
        TypeDescriptor::Compound(compound) => Ok(compound.fields()),
        other => Err(Error::TypeMismatch {
            expected: "compound".to_string(),
            found: other.to_string(),
        }),
    }
}

/// Checks a stored compound against the layout a type writes.
///
/// Field names, offsets and the total size must agree; each field type is
/// checked with the corresponding field's own `accepts`.
#[doc(hidden)]
#[must_use]
pub fn compound_accepts(
    stored: &TypeDescriptor,
    expected: &TypeDescriptor,
    field_accepts: &[fn(&TypeDescriptor) -> bool],
) -> bool {
    let (TypeDescriptor::Compound(stored), TypeDescriptor::Compound(expected)) = (stored, expected)
    else {
        return false;
    };
    stored.size() == expected.size()
        && stored.fields().len() == expected.fields().len()
        && stored.fields().len() == field_accepts.len()
        && stored
            .fields()
            .iter()
            .zip(expected.fields())
            .zip(field_accepts)
            .all(|((s, e), accepts)| s.name == e.name && s.offset == e.offset && accepts(&s.ty))
}

/// Encodes one compound field at its offset.
///
/// # Errors
/// Returns an error if the field is missing or does not fit the element.
#[doc(hidden)]
pub fn encode_field<F: Storable>(
    value: &F,
    encoder: &mut Encoder<'_>,
    field: Option<&CompoundField>,
) -> Result<()> {
    let field = field.ok_or_else(missing_field)?;
    value.encode(&mut encoder.sub(field.offset, field.ty.size())?, &field.ty)
}

/// Decodes one compound field from its offset.
///
/// # Errors
/// Returns an error if the field is missing or its value is invalid.
/// Packed compound descriptor for the fields of a Rust struct or tuple.
#[doc(hidden)]
pub fn struct_descriptor<I>(fields: I) -> TypeDescriptor
where
    I: IntoIterator<Item = (&'static str, TypeDescriptor)>,
{
    TypeDescriptor::Compound(CompoundType::from_rust_fields(fields))
}

#[doc(hidden)]
pub fn decode_field<F: Storable>(
    decoder: &mut Decoder<'_>,
    field: Option<&CompoundField>,
) -> Result<F> {
    let field = field.ok_or_else(missing_field)?;
    F::decode(&mut decoder.sub(field.offset, field.ty.size())?, &field.ty)
}

fn missing_field() -> Error {
    Error::InvalidFormat("compound element has fewer fields than its type".to_string())
}

macro_rules! impl_storable_tuple {
    ($($name:ident : $idx:tt),+) => {
        impl<$($name: Storable),+> Storable for ($($name,)+) {
            fn type_descriptor() -> TypeDescriptor {
                struct_descriptor([
                    $((stringify!($idx), $name::type_descriptor())),+
                ])
            }

            fn accepts(stored: &TypeDescriptor) -> bool {
                compound_accepts(
                    stored,
                    &Self::type_descriptor(),
                    &[$($name::accepts as fn(&TypeDescriptor) -> bool),+],
                )
            }

            fn encode(&self, encoder: &mut Encoder<'_>, target: &TypeDescriptor) -> Result<()> {
                let mut fields = compound_fields(target)?.iter();
                $(encode_field(&self.$idx, encoder, fields.next())?;)+
                Ok(())
            }

            fn decode(decoder: &mut Decoder<'_>, stored: &TypeDescriptor) -> Result<Self> {
                let mut fields = compound_fields(stored)?.iter();
                Ok(($(decode_field::<$name>(decoder, fields.next())?,)+))
            }
        }
    };
}

impl_storable_tuple!(A: 0);
impl_storable_tuple!(A: 0, B: 1);
impl_storable_tuple!(A: 0, B: 1, C: 2);
impl_storable_tuple!(A: 0, B: 1, C: 2, D: 3);

/// Implements [`Storable`] for a struct with named fields.
///
/// Fields are laid out back to back in the listed order and stored under
/// their Rust names.
///
/// ```
/// use voxie_io::impl_storable_compound;
///
/// #[derive(Debug, PartialEq)]
/// struct Pixel {
///     x: u16,
///     y: u16,
///     tot: f32,
/// }
///
/// impl_storable_compound!(Pixel { x: u16, y: u16, tot: f32 });
/// ```
#[macro_export]
macro_rules! impl_storable_compound {
    ($ty:ty { $($field:ident : $fty:ty),+ $(,)? }) => {
        impl $crate::Storable for $ty {
            fn type_descriptor() -> $crate::TypeDescriptor {
                $crate::storable::struct_descriptor([
                    $((
                        stringify!($field),
                        <$fty as $crate::Storable>::type_descriptor(),
                    )),+
                ])
            }

            fn accepts(stored: &$crate::TypeDescriptor) -> bool {
                $crate::storable::compound_accepts(
                    stored,
                    &<Self as $crate::Storable>::type_descriptor(),
                    &[$(
                        <$fty as $crate::Storable>::accepts
                            as fn(&$crate::TypeDescriptor) -> bool
                    ),+],
                )
            }

            fn encode(
                &self,
                encoder: &mut $crate::Encoder<'_>,
                target: &$crate::TypeDescriptor,
            ) -> $crate::Result<()> {
                let mut fields = $crate::storable::compound_fields(target)?.iter();
                $($crate::storable::encode_field(&self.$field, encoder, fields.next())?;)+
                Ok(())
            }

            fn decode(
                decoder: &mut $crate::Decoder<'_>,
                stored: &$crate::TypeDescriptor,
            ) -> $crate::Result<Self> {
                let mut fields = $crate::storable::compound_fields(stored)?.iter();
                Ok(Self {
                    $($field: $crate::storable::decode_field::<$fty>(decoder, fields.next())?,)+
                })
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ByteOrder;

    fn encode_one<T: Storable>(value: &T, order: ByteOrder) -> (Vec<u8>, Vec<u8>) {
        let ty = T::type_descriptor();
        let mut bytes = vec![0_u8; ty.size()];
        let mut heap = Vec::new();
        value
            .encode(&mut Encoder::new(&mut bytes, &mut heap, order), &ty)
            .unwrap();
        (bytes, heap)
    }

    fn decode_one<T: Storable>(bytes: &[u8], heap: &[u8], stored: &TypeDescriptor) -> Result<T> {
        T::decode(&mut Decoder::new(bytes, heap, ByteOrder::LittleEndian), stored)
    }

    #[test]
    fn test_bool_encoding() {
        let (bytes, _) = encode_one(&true, ByteOrder::LittleEndian);
        assert_eq!(bytes, vec![1]);
        let (bytes, _) = encode_one(&false, ByteOrder::BigEndian);
        assert_eq!(bytes, vec![0]);
    }

    #[test]
    fn test_bool_rejects_other_values() {
        let stored = bool::type_descriptor();
        let err = decode_one::<bool>(&[2], &[], &stored).unwrap_err();
        assert!(matches!(err, Error::InvalidEnumValue { value: 2, .. }));
    }

    #[test]
    fn test_bool_accepts_signed_and_wide_bases() {
        let signed = TypeDescriptor::Enum(EnumType::boolean(IntegerType::I8));
        let wide = TypeDescriptor::Enum(EnumType::boolean(IntegerType::U16));
        assert!(bool::accepts(&signed));
        assert!(bool::accepts(&wide));
        assert!(decode_one::<bool>(&[1, 0], &[], &wide).unwrap());

        let err = decode_one::<bool>(&[2, 0], &[], &wide).unwrap_err();
        assert!(matches!(err, Error::InvalidEnumValue { value: 2, .. }));

        let other = TypeDescriptor::Enum(
            EnumType::new(IntegerType::U8, [("NO", 0), ("YES", 1)]).unwrap(),
        );
        assert!(!bool::accepts(&other));
        assert!(!bool::accepts(&u8::type_descriptor()));
    }

    #[test]
    fn test_numbers_follow_byte_order() {
        let (bytes, _) = encode_one(&0x0102_i16, ByteOrder::BigEndian);
        assert_eq!(bytes, vec![0x01, 0x02]);
        let (bytes, _) = encode_one(&0x0102_i16, ByteOrder::LittleEndian);
        assert_eq!(bytes, vec![0x02, 0x01]);
    }

    #[test]
    fn test_string_in_heap() {
        let (bytes, heap) = encode_one(&"hello".to_string(), ByteOrder::LittleEndian);
        assert_eq!(bytes.len(), 16);
        assert_eq!(heap, b"hello");
        let value: String = decode_one(&bytes, &heap, &String::type_descriptor()).unwrap();
        assert_eq!(value, "hello");
    }

    #[test]
    fn test_tuple_layout() {
        let ty = <(u8, f64, i16)>::type_descriptor();
        let TypeDescriptor::Compound(compound) = &ty else {
            panic!("tuple should be a compound");
        };
        let names: Vec<&str> = compound.fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["0", "1", "2"]);
        assert_eq!(compound.size(), 11);

        let (bytes, heap) = encode_one(&(7_u8, 1.5_f64, -3_i16), ByteOrder::LittleEndian);
        let back: (u8, f64, i16) = decode_one(&bytes, &heap, &ty).unwrap();
        assert_eq!(back, (7, 1.5, -3));
    }

    #[test]
    fn test_tuple_rejects_reordered_fields() {
        assert!(!<(u8, u16)>::accepts(&<(u16, u8)>::type_descriptor()));
        assert!(!<(u8, u16)>::accepts(&<(u8, u16, u8)>::type_descriptor()));
    }

    #[test]
    fn test_array_of_bools_with_wide_stored_element() {
        let stored =
            TypeDescriptor::fixed_array(TypeDescriptor::Enum(EnumType::boolean(IntegerType::I16)), 2)
                .unwrap();
        assert!(<[bool; 2]>::accepts(&stored));
        let back: [bool; 2] = decode_one(&[0, 0, 1, 0], &[], &stored).unwrap();
        assert_eq!(back, [false, true]);
        assert!(!<[bool; 3]>::accepts(&stored));
    }

    #[test]
    fn test_opaque_ignores_tag() {
        let stored = TypeDescriptor::Opaque {
            size: 4,
            tag: "vendor".to_string(),
        };
        assert!(Opaque::<4>::accepts(&stored));
        assert!(!Opaque::<3>::accepts(&stored));
    }
}
