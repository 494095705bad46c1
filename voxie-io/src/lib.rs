//! voxie-io: self-describing typed container files.
//!
//! Values are stored through the [`Storable`] trait, which maps a Rust type
//! to a [`TypeDescriptor`] and encodes it element by element. Containers are
//! hierarchical: a [`File`] holds [`Group`]s and [`Dataset`]s, and every
//! object can carry typed attributes.
//!
//! ```no_run
//! use voxie_io::{deserialize, serialize};
//!
//! serialize("settings.vxc", "threshold", &(12_u32, true))?;
//! let value: (u32, bool) = deserialize("settings.vxc", "threshold")?;
//! # Ok::<(), voxie_io::Error>(())
//! ```

pub mod clusters;
mod codec;
mod container;
mod error;
mod format;
#[cfg(feature = "hdf5")]
pub mod hdf5;
mod node;
mod registry;
pub mod serialize;
#[doc(hidden)]
pub mod storable;
mod types;

pub use clusters::{read_clusters, read_xrf_settings, write_clusters, write_xrf_settings};
pub use codec::{Decoder, Encoder};
pub use container::{Dataset, File, FileOptions, Group, Location, OpenMode};
pub use error::{Error, Result};
pub use registry::TypeRegistry;
pub use serialize::{deserialize, read_value, serialize, write_value};
pub use storable::{ObjectReference, Opaque, Storable, OPAQUE_TAG};
pub use types::{
    ByteOrder, CompoundField, CompoundType, EnumMember, EnumType, FloatType, IntegerType,
    TypeClass, TypeDescriptor, REFERENCE_SIZE, VARIABLE_STRING_SIZE,
};
