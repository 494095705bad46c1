//! On-disk type descriptors.
//!
//! A [`TypeDescriptor`] describes how one element of a dataset or attribute
//! is laid out in the container: its class, byte size and, for composite
//! classes, its members. Descriptors are immutable once built and are shared
//! through [`Arc`] by every payload that uses them.

use crate::{Error, Result};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Element size of a variable-length string: heap offset and length.
pub const VARIABLE_STRING_SIZE: usize = 16;

/// Element size of an object reference.
pub const REFERENCE_SIZE: usize = 8;

/// Byte order of raw element data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ByteOrder {
    /// Least significant byte first.
    LittleEndian,
    /// Most significant byte first.
    BigEndian,
}

impl ByteOrder {
    /// Byte order of the host.
    #[must_use]
    pub const fn native() -> Self {
        if cfg!(target_endian = "big") {
            Self::BigEndian
        } else {
            Self::LittleEndian
        }
    }
}

impl Default for ByteOrder {
    fn default() -> Self {
        Self::native()
    }
}

/// Fixed-width two's complement or unsigned integer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct IntegerType {
    size: usize,
    signed: bool,
}

impl IntegerType {
    pub const U8: Self = Self::of(1, false);
    pub const U16: Self = Self::of(2, false);
    pub const U32: Self = Self::of(4, false);
    pub const U64: Self = Self::of(8, false);
    pub const I8: Self = Self::of(1, true);
    pub const I16: Self = Self::of(2, true);
    pub const I32: Self = Self::of(4, true);
    pub const I64: Self = Self::of(8, true);

    const fn of(size: usize, signed: bool) -> Self {
        Self { size, signed }
    }

    /// Creates an integer type of 1, 2, 4 or 8 bytes.
    ///
    /// # Errors
    /// Returns [`Error::InvalidTypeDescriptor`] for any other size.
    pub fn new(size: usize, signed: bool) -> Result<Self> {
        match size {
            1 | 2 | 4 | 8 => Ok(Self { size, signed }),
            _ => Err(Error::InvalidTypeDescriptor(format!(
                "integer size must be 1, 2, 4 or 8 bytes, got {size}"
            ))),
        }
    }

    /// Size in bytes.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Whether values are two's complement signed.
    #[must_use]
    pub const fn is_signed(&self) -> bool {
        self.signed
    }

    /// Width in bits.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn bits(&self) -> u32 {
        (self.size * 8) as u32
    }

    /// Returns true if `value` is representable.
    #[must_use]
    pub fn fits(&self, value: i128) -> bool {
        let bits = self.bits();
        if self.signed {
            let half = 1_i128 << (bits - 1);
            (-half..half).contains(&value)
        } else {
            (0..(1_i128 << bits)).contains(&value)
        }
    }

    /// Raw bit pattern of a representable value, zero-extended to 64 bits.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn to_bits(&self, value: i128) -> u64 {
        (value as u64) & self.mask()
    }

    /// Interprets a raw bit pattern as a value of this type.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub fn from_bits(&self, raw: u64) -> i128 {
        let raw = raw & self.mask();
        if self.signed {
            let shift = 64 - self.bits();
            i128::from(((raw << shift) as i64) >> shift)
        } else {
            i128::from(raw)
        }
    }

    fn mask(&self) -> u64 {
        if self.size == 8 {
            u64::MAX
        } else {
            (1_u64 << self.bits()) - 1
        }
    }
}

impl fmt::Display for IntegerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = if self.signed { 'i' } else { 'u' };
        write!(f, "{prefix}{}", self.bits())
    }
}

/// IEEE 754 floating point number.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FloatType {
    size: usize,
}

impl FloatType {
    pub const F32: Self = Self { size: 4 };
    pub const F64: Self = Self { size: 8 };

    /// Creates a float type of 4 or 8 bytes.
    ///
    /// # Errors
    /// Returns [`Error::InvalidTypeDescriptor`] for any other size.
    pub fn new(size: usize) -> Result<Self> {
        match size {
            4 | 8 => Ok(Self { size }),
            _ => Err(Error::InvalidTypeDescriptor(format!(
                "float size must be 4 or 8 bytes, got {size}"
            ))),
        }
    }

    /// Size in bytes.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }
}

/// A named member of an enumerated type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EnumMember {
    /// Member name.
    pub name: String,
    /// Raw bit pattern in the base integer type, zero-extended.
    pub value: u64,
}

/// Integer type whose values carry names.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EnumType {
    base: IntegerType,
    members: Vec<EnumMember>,
}

impl EnumType {
    /// Builds an enum over `base` from `(name, value)` pairs, keeping their order.
    ///
    /// # Errors
    /// Returns [`Error::InvalidTypeDescriptor`] if a value does not fit into
    /// `base` or if a name or value appears twice.
    pub fn new<N, I>(base: IntegerType, members: I) -> Result<Self>
    where
        N: Into<String>,
        I: IntoIterator<Item = (N, i128)>,
    {
        let mut raw = Vec::new();
        for (name, value) in members {
            let name = name.into();
            if !base.fits(value) {
                return Err(Error::InvalidTypeDescriptor(format!(
                    "enum member {name} = {value} does not fit into {base}"
                )));
            }
            raw.push(EnumMember {
                name,
                value: base.to_bits(value),
            });
        }
        Self::from_raw(base, raw)
    }

    /// Builds an enum from members given as raw bit patterns.
    ///
    /// # Errors
    /// Returns [`Error::InvalidTypeDescriptor`] if a bit pattern is wider than
    /// `base` or if a name or value appears twice.
    pub fn from_raw(base: IntegerType, members: Vec<EnumMember>) -> Result<Self> {
        let mut names = HashSet::new();
        let mut values = HashSet::new();
        for member in &members {
            if member.value != base.to_bits(i128::from(member.value)) {
                return Err(Error::InvalidTypeDescriptor(format!(
                    "enum member {} bit pattern {:#x} is wider than {base}",
                    member.name, member.value
                )));
            }
            if !names.insert(member.name.as_str()) {
                return Err(Error::InvalidTypeDescriptor(format!(
                    "duplicate enum member name {}",
                    member.name
                )));
            }
            if !values.insert(member.value) {
                return Err(Error::InvalidTypeDescriptor(format!(
                    "duplicate enum member value {:#x}",
                    member.value
                )));
            }
        }
        Ok(Self { base, members })
    }

    /// The `FALSE = 0`, `TRUE = 1` enum used to store booleans.
    pub(crate) fn boolean(base: IntegerType) -> Self {
        Self {
            base,
            members: vec![
                EnumMember {
                    name: "FALSE".to_string(),
                    value: 0,
                },
                EnumMember {
                    name: "TRUE".to_string(),
                    value: 1,
                },
            ],
        }
    }

    /// Underlying storage type.
    #[must_use]
    pub fn base(&self) -> IntegerType {
        self.base
    }

    /// Members in declaration order.
    #[must_use]
    pub fn members(&self) -> &[EnumMember] {
        &self.members
    }

    /// Name of the member with the given bit pattern.
    #[must_use]
    pub fn name_of(&self, raw: u64) -> Option<&str> {
        self.members
            .iter()
            .find(|member| member.value == raw)
            .map(|member| member.name.as_str())
    }

    /// Bit pattern of the named member.
    #[must_use]
    pub fn value_of(&self, name: &str) -> Option<u64> {
        self.members
            .iter()
            .find(|member| member.name == name)
            .map(|member| member.value)
    }

    /// Whether both enums name the same values, ignoring member order.
    #[must_use]
    pub fn same_members(&self, other: &EnumType) -> bool {
        self.members.len() == other.members.len()
            && self
                .members
                .iter()
                .all(|member| other.value_of(&member.name) == Some(member.value))
    }
}

/// A named member of a compound type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CompoundField {
    /// Field name.
    pub name: String,
    /// Field type.
    pub ty: Arc<TypeDescriptor>,
    /// Byte offset from the start of the compound element.
    pub offset: usize,
}

impl CompoundField {
    /// Creates a field.
    pub fn new(name: impl Into<String>, ty: impl Into<Arc<TypeDescriptor>>, offset: usize) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
            offset,
        }
    }

    /// First byte past the field, or `None` if it does not fit in `usize`.
    fn end(&self) -> Option<usize> {
        self.offset.checked_add(self.ty.size())
    }

    fn checked_end(&self) -> Result<usize> {
        self.end().ok_or_else(|| {
            Error::InvalidTypeDescriptor(format!(
                "compound field {} at offset {} does not fit in memory",
                self.name, self.offset
            ))
        })
    }
}

/// Struct-like type with explicitly placed fields.
///
/// The layout is exactly what the fields say: no implicit alignment is
/// added, so any padding must be expressed through offsets or an explicit
/// total size.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CompoundType {
    fields: Vec<CompoundField>,
    size: usize,
}

impl CompoundType {
    /// Creates a compound whose size is the end of its last field.
    ///
    /// # Errors
    /// Returns [`Error::InvalidTypeDescriptor`] if fields overlap, are out of
    /// offset order, or share a name.
    pub fn new(fields: Vec<CompoundField>) -> Result<Self> {
        let mut size = 0;
        for field in &fields {
            size = size.max(field.checked_end()?);
        }
        Self::with_size(fields, size)
    }

    /// Creates a compound with trailing padding up to `size`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidTypeDescriptor`] if fields overlap, are out of
    /// offset order, share a name, or extend past `size`.
    pub fn with_size(fields: Vec<CompoundField>, size: usize) -> Result<Self> {
        check_layout(&fields, size)?;
        Ok(Self { fields, size })
    }

    /// Lays fields out back to back in the given order.
    ///
    /// # Errors
    /// Returns [`Error::InvalidTypeDescriptor`] if two fields share a name or
    /// the total size overflows.
    pub fn packed<N, I>(fields: I) -> Result<Self>
    where
        N: Into<String>,
        I: IntoIterator<Item = (N, TypeDescriptor)>,
    {
        let mut offset = 0;
        let mut placed = Vec::new();
        for (name, ty) in fields {
            let field = CompoundField::new(name, ty, offset);
            offset = field.checked_end()?;
            placed.push(field);
        }
        Self::with_size(placed, offset)
    }

    /// Packed layout for the fields of a Rust struct or tuple.
    ///
    /// Field names are unique and the stored size never exceeds the size of
    /// the Rust value, so the layout checks of [`packed`](Self::packed)
    /// cannot fail here. Sizes saturate instead of wrapping.
    pub(crate) fn from_rust_fields<I>(fields: I) -> Self
    where
        I: IntoIterator<Item = (&'static str, TypeDescriptor)>,
    {
        let mut offset: usize = 0;
        let fields: Vec<CompoundField> = fields
            .into_iter()
            .map(|(name, ty)| {
                let field = CompoundField::new(name, ty, offset);
                offset = offset.saturating_add(field.ty.size());
                field
            })
            .collect();
        Self {
            fields,
            size: offset,
        }
    }

    /// Re-runs the layout checks, including those of nested field types.
    ///
    /// # Errors
    /// Returns [`Error::InvalidTypeDescriptor`] for an invalid layout.
    pub fn validate(&self) -> Result<()> {
        check_layout(&self.fields, self.size)
    }

    /// Fields in offset order.
    #[must_use]
    pub fn fields(&self) -> &[CompoundField] {
        &self.fields
    }

    /// Looks up a field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&CompoundField> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Total element size in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }
}

fn check_layout(fields: &[CompoundField], size: usize) -> Result<()> {
    let mut names = HashSet::new();
    let mut previous_end: Option<(&str, usize)> = None;
    for field in fields {
        field.ty.validate()?;
        if !names.insert(field.name.as_str()) {
            return Err(Error::InvalidTypeDescriptor(format!(
                "duplicate compound field {}",
                field.name
            )));
        }
        let end = field.checked_end()?;
        if let Some((prev, prev_end)) = previous_end {
            if field.offset < prev_end {
                return Err(Error::InvalidTypeDescriptor(format!(
                    "compound field {} at offset {} overlaps {prev} ending at {prev_end}",
                    field.name, field.offset
                )));
            }
        }
        if end > size {
            return Err(Error::InvalidTypeDescriptor(format!(
                "compound field {} ends at {end} past compound size {size}",
                field.name
            )));
        }
        previous_end = Some((field.name.as_str(), end));
    }
    Ok(())
}

/// Class of a [`TypeDescriptor`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TypeClass {
    Integer,
    Float,
    Enum,
    Compound,
    FixedArray,
    VariableString,
    Opaque,
    Reference,
}

/// Description of one stored element.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeDescriptor {
    /// Fixed-width integer.
    Integer(IntegerType),
    /// IEEE float.
    Float(FloatType),
    /// Named integer values.
    Enum(EnumType),
    /// Struct with placed fields.
    Compound(CompoundType),
    /// `len` consecutive elements of one type.
    FixedArray {
        element: Arc<TypeDescriptor>,
        len: usize,
    },
    /// UTF-8 string stored in the payload heap.
    VariableString,
    /// Uninterpreted bytes with a descriptive tag.
    Opaque { size: usize, tag: String },
    /// Reference to another node of the same container.
    Reference,
}

impl TypeDescriptor {
    /// Creates a fixed array descriptor.
    ///
    /// # Errors
    /// Returns [`Error::InvalidTypeDescriptor`] if the array size overflows.
    pub fn fixed_array(element: impl Into<Arc<TypeDescriptor>>, len: usize) -> Result<Self> {
        let ty = Self::array_of(element, len);
        ty.validate()?;
        Ok(ty)
    }

    /// Fixed array of a Rust array type, whose size is bounded by the
    /// in-memory array.
    pub(crate) fn array_of(element: impl Into<Arc<TypeDescriptor>>, len: usize) -> Self {
        Self::FixedArray {
            element: element.into(),
            len,
        }
    }

    /// Checks the invariants the constructors enforce, recursively.
    ///
    /// Descriptors assembled directly from enum variants bypass the
    /// constructors; containers call this before accepting a type.
    ///
    /// # Errors
    /// Returns [`Error::InvalidTypeDescriptor`] for overlapping or duplicate
    /// compound fields, or sizes that overflow.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Compound(ty) => ty.validate(),
            Self::FixedArray { element, len } => {
                element.validate()?;
                element
                    .size()
                    .checked_mul(*len)
                    .map(|_| ())
                    .ok_or_else(|| {
                        Error::InvalidTypeDescriptor(format!(
                            "array of {len} {element} elements does not fit in memory"
                        ))
                    })
            }
            _ => Ok(()),
        }
    }

    /// Class of this descriptor.
    #[must_use]
    pub fn class(&self) -> TypeClass {
        match self {
            Self::Integer(_) => TypeClass::Integer,
            Self::Float(_) => TypeClass::Float,
            Self::Enum(_) => TypeClass::Enum,
            Self::Compound(_) => TypeClass::Compound,
            Self::FixedArray { .. } => TypeClass::FixedArray,
            Self::VariableString => TypeClass::VariableString,
            Self::Opaque { .. } => TypeClass::Opaque,
            Self::Reference => TypeClass::Reference,
        }
    }

    /// Size of one element in bytes.
    ///
    /// Saturates for descriptors that [`validate`](Self::validate) rejects.
    #[must_use]
    pub fn size(&self) -> usize {
        match self {
            Self::Integer(ty) => ty.size(),
            Self::Float(ty) => ty.size(),
            Self::Enum(ty) => ty.base().size(),
            Self::Compound(ty) => ty.size(),
            Self::FixedArray { element, len } => element.size().saturating_mul(*len),
            Self::VariableString => VARIABLE_STRING_SIZE,
            Self::Opaque { size, .. } => *size,
            Self::Reference => REFERENCE_SIZE,
        }
    }

    /// Structural equality.
    ///
    /// Like `==`, except that enum members are compared as a set and
    /// compound fields are compared recursively with this rule.
    #[must_use]
    pub fn matches(&self, other: &TypeDescriptor) -> bool {
        match (self, other) {
            (Self::Enum(a), Self::Enum(b)) => a.base() == b.base() && a.same_members(b),
            (Self::Compound(a), Self::Compound(b)) => {
                a.size() == b.size()
                    && a.fields().len() == b.fields().len()
                    && a.fields().iter().zip(b.fields()).all(|(x, y)| {
                        x.name == y.name && x.offset == y.offset && x.ty.matches(&y.ty)
                    })
            }
            (
                Self::FixedArray {
                    element: a,
                    len: a_len,
                },
                Self::FixedArray {
                    element: b,
                    len: b_len,
                },
            ) => a_len == b_len && a.matches(b),
            _ => self == other,
        }
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(ty) => write!(f, "{ty}"),
            Self::Float(ty) => write!(f, "f{}", ty.size() * 8),
            Self::Enum(ty) => {
                write!(f, "enum {} {{", ty.base())?;
                for (i, member) in ty.members().iter().enumerate() {
                    let sep = if i == 0 { "" } else { ", " };
                    write!(
                        f,
                        "{sep}{} = {}",
                        member.name,
                        ty.base().from_bits(member.value)
                    )?;
                }
                write!(f, "}}")
            }
            Self::Compound(ty) => {
                write!(f, "compound[{}] {{", ty.size())?;
                for (i, field) in ty.fields().iter().enumerate() {
                    let sep = if i == 0 { "" } else { ", " };
                    write!(f, "{sep}{} @{}: {}", field.name, field.offset, field.ty)?;
                }
                write!(f, "}}")
            }
            Self::FixedArray { element, len } => write!(f, "[{element}; {len}]"),
            Self::VariableString => write!(f, "string"),
            Self::Opaque { size, tag } => write!(f, "opaque[{size}] {tag:?}"),
            Self::Reference => write!(f, "reference"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_bit_patterns() {
        assert_eq!(IntegerType::I8.to_bits(-1), 0xFF);
        assert_eq!(IntegerType::I8.from_bits(0xFF), -1);
        assert_eq!(IntegerType::U16.from_bits(0xFFFF), 65535);
        assert_eq!(IntegerType::I64.from_bits(u64::MAX), -1);
        assert!(IntegerType::U8.fits(255));
        assert!(!IntegerType::U8.fits(256));
        assert!(!IntegerType::U8.fits(-1));
        assert!(IntegerType::I8.fits(-128));
        assert!(!IntegerType::I8.fits(128));
        assert!(IntegerType::new(3, false).is_err());
    }

    #[test]
    fn test_enum_rejects_wide_literal() {
        let err = EnumType::new(IntegerType::U8, [("A", 0), ("B", 256)]).unwrap_err();
        assert!(matches!(err, Error::InvalidTypeDescriptor(_)));

        let err = EnumType::new(IntegerType::I8, [("NEG", -129)]).unwrap_err();
        assert!(matches!(err, Error::InvalidTypeDescriptor(_)));
    }

    #[test]
    fn test_enum_rejects_duplicates() {
        assert!(EnumType::new(IntegerType::U8, [("A", 0), ("A", 1)]).is_err());
        assert!(EnumType::new(IntegerType::U8, [("A", 0), ("B", 0)]).is_err());
    }

    #[test]
    fn test_enum_keeps_member_order() {
        let ty = EnumType::new(IntegerType::I16, [("LOW", -2), ("HIGH", 7)]).unwrap();
        let names: Vec<&str> = ty.members().iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["LOW", "HIGH"]);
        assert_eq!(ty.value_of("LOW"), Some(0xFFFE));
        assert_eq!(ty.name_of(7), Some("HIGH"));
    }

    #[test]
    fn test_enum_member_set_comparison() {
        let a = TypeDescriptor::Enum(EnumType::new(IntegerType::U8, [("X", 0), ("Y", 1)]).unwrap());
        let b = TypeDescriptor::Enum(EnumType::new(IntegerType::U8, [("Y", 1), ("X", 0)]).unwrap());
        let c = TypeDescriptor::Enum(EnumType::new(IntegerType::U8, [("X", 0), ("Z", 1)]).unwrap());
        assert!(a.matches(&b));
        assert_ne!(a, b);
        assert!(!a.matches(&c));
    }

    #[test]
    fn test_compound_rejects_overlap() {
        let fields = vec![
            CompoundField::new("a", TypeDescriptor::Integer(IntegerType::U32), 0),
            CompoundField::new("b", TypeDescriptor::Integer(IntegerType::U32), 2),
        ];
        assert!(matches!(
            CompoundType::new(fields),
            Err(Error::InvalidTypeDescriptor(_))
        ));
    }

    #[test]
    fn test_compound_rejects_descending_offsets() {
        let fields = vec![
            CompoundField::new("a", TypeDescriptor::Integer(IntegerType::U8), 8),
            CompoundField::new("b", TypeDescriptor::Integer(IntegerType::U8), 0),
        ];
        assert!(CompoundType::new(fields).is_err());
    }

    #[test]
    fn test_compound_padding() {
        let fields = vec![
            CompoundField::new("a", TypeDescriptor::Integer(IntegerType::U8), 0),
            CompoundField::new("b", TypeDescriptor::Float(FloatType::F64), 8),
        ];
        let ty = CompoundType::new(fields.clone()).unwrap();
        assert_eq!(ty.size(), 16);

        let padded = CompoundType::with_size(fields.clone(), 24).unwrap();
        assert_eq!(padded.size(), 24);
        assert!(CompoundType::with_size(fields, 12).is_err());
    }

    #[test]
    fn test_packed_layout() {
        let ty = CompoundType::packed([
            ("t", TypeDescriptor::Integer(IntegerType::I64)),
            ("x", TypeDescriptor::Float(FloatType::F32)),
            ("flag", TypeDescriptor::Integer(IntegerType::U8)),
        ])
        .unwrap();
        let offsets: Vec<usize> = ty.fields().iter().map(|f| f.offset).collect();
        assert_eq!(offsets, vec![0, 8, 12]);
        assert_eq!(ty.size(), 13);
    }

    #[test]
    fn test_display() {
        let ty = TypeDescriptor::Enum(EnumType::boolean(IntegerType::U8));
        assert_eq!(ty.to_string(), "enum u8 {FALSE = 0, TRUE = 1}");
        let arr = TypeDescriptor::fixed_array(TypeDescriptor::Float(FloatType::F32), 3).unwrap();
        assert_eq!(arr.to_string(), "[f32; 3]");
        assert_eq!(arr.size(), 12);
    }

    #[test]
    fn test_packed_rejects_duplicate_names() {
        let err = CompoundType::packed([
            ("a", TypeDescriptor::Integer(IntegerType::U8)),
            ("a", TypeDescriptor::Integer(IntegerType::U8)),
        ])
        .unwrap_err();
        assert!(matches!(err, Error::InvalidTypeDescriptor(_)));
    }

    #[test]
    fn test_fixed_array_rejects_overflow() {
        let element = TypeDescriptor::Integer(IntegerType::U64);
        let err = TypeDescriptor::fixed_array(element, usize::MAX / 2).unwrap_err();
        assert!(matches!(err, Error::InvalidTypeDescriptor(_)));

        // Built from the variant directly: size saturates, validation fails.
        let raw = TypeDescriptor::FixedArray {
            element: Arc::new(TypeDescriptor::Integer(IntegerType::U64)),
            len: usize::MAX / 2,
        };
        assert_eq!(raw.size(), usize::MAX);
        assert!(raw.validate().is_err());
    }

    #[test]
    fn test_field_offset_overflow() {
        let fields = vec![CompoundField::new(
            "far",
            TypeDescriptor::Integer(IntegerType::U32),
            usize::MAX - 1,
        )];
        assert!(matches!(
            CompoundType::new(fields.clone()),
            Err(Error::InvalidTypeDescriptor(_))
        ));
        assert!(matches!(
            CompoundType::with_size(fields, usize::MAX),
            Err(Error::InvalidTypeDescriptor(_))
        ));
    }

    #[test]
    fn test_validate_nested_array_in_compound() {
        let raw = TypeDescriptor::FixedArray {
            element: Arc::new(TypeDescriptor::Integer(IntegerType::U16)),
            len: usize::MAX,
        };
        let compound = CompoundType::new(vec![CompoundField::new("big", raw, 0)]);
        assert!(matches!(compound, Err(Error::InvalidTypeDescriptor(_))));
    }
}
