//! HDF5 interoperability.
//!
//! Converts type descriptors to and from the HDF5 type model, checks that a
//! dataset in an HDF5 file can be read as a given [`Storable`] type, and
//! exchanges cluster lists with HDF5 tools as one column per field.

use crate::storable::Storable;
use crate::types::{
    CompoundField, CompoundType, EnumMember, EnumType, FloatType, IntegerType, TypeDescriptor,
};
use crate::{Error, Result};
use hdf5::types::{
    CompoundField as H5CompoundField, CompoundType as H5CompoundType, EnumMember as H5EnumMember,
    EnumType as H5EnumType, FloatSize, H5Type, IntSize, TypeDescriptor as H5TypeDescriptor,
    VarLenUnicode,
};
use hdf5::{File, Group};
use ndarray::ArrayView1;
use std::path::Path;
use std::str::FromStr;
use voxie_algorithms::{Cluster, XrfCorrectionSettings};

const CLUSTER_GROUP: &str = "clusters";

fn int_size(size: usize) -> Result<IntSize> {
    match size {
        1 => Ok(IntSize::U1),
        2 => Ok(IntSize::U2),
        4 => Ok(IntSize::U4),
        8 => Ok(IntSize::U8),
        _ => Err(Error::Unsupported(format!("{size}-byte integer"))),
    }
}

/// Converts a descriptor to its HDF5 counterpart.
///
/// # Errors
/// Returns [`Error::Unsupported`] for opaque and reference types, which the
/// HDF5 type model in use cannot express.
pub fn to_hdf5(ty: &TypeDescriptor) -> Result<H5TypeDescriptor> {
    Ok(match ty {
        TypeDescriptor::Integer(int) if int.is_signed() => {
            H5TypeDescriptor::Integer(int_size(int.size())?)
        }
        TypeDescriptor::Integer(int) => H5TypeDescriptor::Unsigned(int_size(int.size())?),
        TypeDescriptor::Float(float) => H5TypeDescriptor::Float(match float.size() {
            4 => FloatSize::U4,
            _ => FloatSize::U8,
        }),
        TypeDescriptor::Enum(en) => H5TypeDescriptor::Enum(H5EnumType {
            size: int_size(en.base().size())?,
            signed: en.base().is_signed(),
            members: en
                .members()
                .iter()
                .map(|member| H5EnumMember {
                    name: member.name.clone(),
                    value: member.value,
                })
                .collect(),
        }),
        TypeDescriptor::Compound(compound) => H5TypeDescriptor::Compound(H5CompoundType {
            fields: compound
                .fields()
                .iter()
                .enumerate()
                .map(|(index, field)| {
                    Ok(H5CompoundField {
                        name: field.name.clone(),
                        ty: to_hdf5(&field.ty)?,
                        offset: field.offset,
                        index,
                    })
                })
                .collect::<Result<_>>()?,
            size: compound.size(),
        }),
        TypeDescriptor::FixedArray { element, len } => {
            H5TypeDescriptor::FixedArray(Box::new(to_hdf5(element)?), *len)
        }
        TypeDescriptor::VariableString => H5TypeDescriptor::VarLenUnicode,
        TypeDescriptor::Opaque { .. } | TypeDescriptor::Reference => {
            return Err(Error::Unsupported(format!("{ty} in HDF5")));
        }
    })
}

/// Converts an HDF5 descriptor.
///
/// HDF5 booleans become the `FALSE`/`TRUE` enum over a signed byte, which is
/// how HDF5 stores them.
///
/// # Errors
/// Returns [`Error::Unsupported`] for HDF5 types without a counterpart
/// (fixed-length strings, variable-length arrays and others).
pub fn from_hdf5(ty: &H5TypeDescriptor) -> Result<TypeDescriptor> {
    Ok(match ty {
        H5TypeDescriptor::Integer(_) => TypeDescriptor::Integer(IntegerType::new(ty.size(), true)?),
        H5TypeDescriptor::Unsigned(_) => {
            TypeDescriptor::Integer(IntegerType::new(ty.size(), false)?)
        }
        H5TypeDescriptor::Float(_) => TypeDescriptor::Float(FloatType::new(ty.size())?),
        H5TypeDescriptor::Boolean => TypeDescriptor::Enum(EnumType::boolean(IntegerType::I8)),
        H5TypeDescriptor::Enum(en) => {
            let base = IntegerType::new(ty.size(), en.signed)?;
            let members = en
                .members
                .iter()
                .map(|member| EnumMember {
                    name: member.name.clone(),
                    value: member.value,
                })
                .collect();
            TypeDescriptor::Enum(EnumType::from_raw(base, members)?)
        }
        H5TypeDescriptor::Compound(compound) => {
            let mut fields = compound.fields.clone();
            fields.sort_by_key(|field| field.offset);
            let fields = fields
                .iter()
                .map(|field| {
                    let ty = from_hdf5(&field.ty)?;
                    Ok(CompoundField::new(field.name.clone(), ty, field.offset))
                })
                .collect::<Result<Vec<_>>>()?;
            TypeDescriptor::Compound(CompoundType::with_size(fields, compound.size)?)
        }
        H5TypeDescriptor::FixedArray(element, len) => {
            TypeDescriptor::fixed_array(from_hdf5(element)?, *len)?
        }
        H5TypeDescriptor::VarLenUnicode | H5TypeDescriptor::VarLenAscii => {
            TypeDescriptor::VariableString
        }
        other => return Err(Error::Unsupported(format!("HDF5 type {other:?}"))),
    })
}

/// Checks that `dataset` can be read as `T` and returns its stored type.
///
/// # Errors
/// Returns [`Error::TypeMismatch`] if `T` does not accept the stored type.
pub fn check_dataset<T: Storable>(dataset: &hdf5::Dataset) -> Result<TypeDescriptor> {
    let stored = from_hdf5(&dataset.dtype()?.to_descriptor()?)?;
    if T::accepts(&stored) {
        Ok(stored)
    } else {
        Err(Error::TypeMismatch {
            expected: T::type_descriptor().to_string(),
            found: stored.to_string(),
        })
    }
}

/// Writes clusters to an HDF5 file as one column per field.
///
/// # Errors
/// Returns an error if the file or datasets cannot be created.
pub fn export_clusters<P: AsRef<Path>>(
    path: P,
    clusters: &[Cluster],
    settings: Option<&XrfCorrectionSettings>,
) -> Result<()> {
    let file = File::create(path)?;
    let version = VarLenUnicode::from_str(env!("CARGO_PKG_VERSION"))
        .map_err(|e| Error::InvalidFormat(format!("invalid version string: {e}")))?;
    file.new_attr::<VarLenUnicode>()
        .create("voxie_version")?
        .write_scalar(&version)?;

    let group = file.create_group(CLUSTER_GROUP)?;
    let timestamps: Vec<i64> = clusters.iter().map(|c| c.timestamp).collect();
    let xs: Vec<f32> = clusters.iter().map(|c| c.x).collect();
    let ys: Vec<f32> = clusters.iter().map(|c| c.y).collect();
    let energies: Vec<f32> = clusters.iter().map(|c| c.energy).collect();
    write_column(&group, "timestamp", &timestamps)?;
    write_column(&group, "x", &xs)?;
    write_column(&group, "y", &ys)?;
    write_column(&group, "energy", &energies)?;

    if let Some(settings) = settings {
        write_attr(&group, "xrf_enabled", &settings.enabled)?;
        write_attr(&group, "xrf_min_energy", &settings.min_energy)?;
        write_attr(&group, "xrf_max_energy", &settings.max_energy)?;
        write_attr(&group, "xrf_distance_limit", &settings.distance_limit)?;
        write_attr(&group, "xrf_temporal_margin", &settings.temporal_margin)?;
    }
    log::debug!("exported {} clusters to HDF5", clusters.len());
    Ok(())
}

/// Reads clusters written by [`export_clusters`].
///
/// # Errors
/// Returns [`Error::ShapeMismatch`] if the columns differ in length.
pub fn import_clusters<P: AsRef<Path>>(path: P) -> Result<Vec<Cluster>> {
    let file = File::open(path)?;
    let group = file.group(CLUSTER_GROUP)?;
    let timestamps = read_column::<i64>(&group, "timestamp")?;
    let xs = read_column::<f32>(&group, "x")?;
    let ys = read_column::<f32>(&group, "y")?;
    let energies = read_column::<f32>(&group, "energy")?;

    let len = timestamps.len();
    if xs.len() != len || ys.len() != len || energies.len() != len {
        return Err(Error::ShapeMismatch(format!(
            "cluster columns have lengths {len}, {}, {}, {}",
            xs.len(),
            ys.len(),
            energies.len()
        )));
    }

    Ok((0..len)
        .map(|i| Cluster::new(timestamps[i], xs[i], ys[i], energies[i]))
        .collect())
}

fn write_column<T: H5Type>(group: &Group, name: &str, values: &[T]) -> Result<()> {
    let dataset = group.new_dataset::<T>().shape(values.len()).create(name)?;
    dataset.write(ArrayView1::from(values))?;
    Ok(())
}

fn read_column<T: H5Type + Storable>(group: &Group, name: &str) -> Result<Vec<T>> {
    let dataset = group.dataset(name)?;
    check_dataset::<T>(&dataset)?;
    Ok(dataset.read_raw::<T>()?)
}

fn write_attr<T: H5Type>(group: &Group, name: &str, value: &T) -> Result<()> {
    group.new_attr::<T>().create(name)?.write_scalar(value)?;
    Ok(())
}
