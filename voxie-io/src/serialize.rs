//! Whole-value entry points.
//!
//! Application code stores and loads values through these functions and
//! never touches encoders directly; the element layout comes from the
//! value's [`Storable`] implementation.

use crate::container::{Dataset, File};
use crate::storable::Storable;
use crate::Result;
use std::path::Path;

/// Writes `value` as the single element of `dataset`.
///
/// # Errors
/// Returns [`Error::TypeMismatch`](crate::Error::TypeMismatch) if the
/// dataset was created for another type and
/// [`Error::ShapeMismatch`](crate::Error::ShapeMismatch) if it does not hold
/// exactly one element.
pub fn write_value<T: Storable>(dataset: &Dataset, value: &T) -> Result<()> {
    dataset.write_scalar(value)
}

/// Reads the single element of `dataset` as `T`.
///
/// # Errors
/// Returns [`Error::TypeMismatch`](crate::Error::TypeMismatch) if the stored
/// type does not match `T`.
pub fn read_value<T: Storable>(dataset: &Dataset) -> Result<T> {
    dataset.read_scalar()
}

/// Creates (or replaces) the file at `path` holding `value` as the scalar
/// dataset `name`.
///
/// # Errors
/// Returns I/O errors from creating the file.
pub fn serialize<T: Storable>(path: impl AsRef<Path>, name: &str, value: &T) -> Result<()> {
    let file = File::create(path)?;
    let dataset = file.new_dataset::<T>(name, &[])?;
    write_value(&dataset, value)?;
    file.close()
}

/// Loads the scalar dataset `name` from the file at `path`.
///
/// # Errors
/// Returns [`Error::NotFound`](crate::Error::NotFound) if the file or
/// dataset is missing.
pub fn deserialize<T: Storable>(path: impl AsRef<Path>, name: &str) -> Result<T> {
    let file = File::open(path)?;
    let value = read_value(&file.dataset(name)?)?;
    file.close()?;
    Ok(value)
}
