//! Files, groups, datasets and attributes.
//!
//! A [`File`] owns the object tree of one container. [`Group`] and
//! [`Dataset`] handles share that tree and stop working with
//! [`Error::UseAfterClose`] once the file is closed or dropped. Changes are
//! kept in memory and written back on [`File::flush`], [`File::close`] or
//! drop.

use crate::format;
use crate::node::{Node, NodeId, NodeKind, Payload, Tree, ROOT};
use crate::registry::TypeRegistry;
use crate::storable::{ObjectReference, Storable};
use crate::types::{ByteOrder, TypeDescriptor};
use crate::{Error, Result};
use ndarray::{ArrayD, ArrayView, Dimension, IxDyn};
use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::ops::{Deref, Range};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use voxie_core::Operation;

/// How a container file is opened.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OpenMode {
    /// Open an existing file for reading.
    #[default]
    ReadOnly,
    /// Open an existing file for reading and writing.
    ReadWrite,
    /// Create a file, replacing any existing one.
    CreateTruncate,
    /// Create a file, failing if it already exists.
    CreateExclusive,
}

impl OpenMode {
    /// Returns true if files opened this way accept changes.
    #[must_use]
    pub fn is_writable(self) -> bool {
        self != Self::ReadOnly
    }
}

/// Builder for opening or creating a [`File`].
///
/// ```no_run
/// use voxie_io::{ByteOrder, File, OpenMode};
///
/// let file = File::options()
///     .mode(OpenMode::CreateExclusive)
///     .byte_order(ByteOrder::BigEndian)
///     .open("run_0042.vxc")?;
/// # Ok::<(), voxie_io::Error>(())
/// ```
#[derive(Clone, Debug, Default)]
pub struct FileOptions {
    mode: OpenMode,
    byte_order: ByteOrder,
}

impl FileOptions {
    /// Read-only access in native byte order.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the open mode.
    #[must_use]
    pub fn mode(mut self, mode: OpenMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the element byte order of newly created files.
    ///
    /// Existing files keep the byte order they were written with.
    #[must_use]
    pub fn byte_order(mut self, byte_order: ByteOrder) -> Self {
        self.byte_order = byte_order;
        self
    }

    /// Opens the file.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] if an existing file was requested but is
    /// missing, [`Error::AlreadyExists`] for an exclusive create of an
    /// existing path, and I/O or format errors otherwise.
    pub fn open(&self, path: impl AsRef<Path>) -> Result<File> {
        let path = path.as_ref().to_path_buf();
        let state = match self.mode {
            OpenMode::ReadOnly | OpenMode::ReadWrite => {
                let tree = format::read_file(&path).map_err(|err| match err {
                    Error::Io(io) if io.kind() == ErrorKind::NotFound => {
                        Error::NotFound(path.display().to_string())
                    }
                    other => other,
                })?;
                FileState {
                    path,
                    mode: self.mode,
                    tree,
                    dirty: false,
                }
            }
            OpenMode::CreateTruncate | OpenMode::CreateExclusive => {
                let mut options = OpenOptions::new();
                options.write(true);
                if self.mode == OpenMode::CreateExclusive {
                    options.create_new(true);
                } else {
                    options.create(true).truncate(true);
                }
                options.open(&path).map_err(|err| match err.kind() {
                    ErrorKind::AlreadyExists => Error::AlreadyExists(path.display().to_string()),
                    _ => Error::Io(err),
                })?;

                let mut state = FileState {
                    path,
                    mode: self.mode,
                    tree: Tree::new(self.byte_order),
                    dirty: true,
                };
                state.save()?;
                state
            }
        };

        log::debug!("opened {} as {:?}", state.path.display(), state.mode);
        Ok(File {
            root: Group {
                location: Location {
                    shared: Arc::new(Mutex::new(Some(state))),
                    id: ROOT,
                },
            },
        })
    }
}

struct FileState {
    path: PathBuf,
    mode: OpenMode,
    tree: Tree,
    dirty: bool,
}

impl FileState {
    fn save(&mut self) -> Result<()> {
        format::write_file(&self.path, &self.tree)?;
        self.dirty = false;
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        if self.mode.is_writable() && self.dirty {
            self.save()?;
        }
        Ok(())
    }
}

type Shared = Arc<Mutex<Option<FileState>>>;

fn lock(shared: &Shared) -> MutexGuard<'_, Option<FileState>> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

fn mismatch(expected: &TypeDescriptor, found: &TypeDescriptor) -> Error {
    Error::TypeMismatch {
        expected: expected.to_string(),
        found: found.to_string(),
    }
}

/// An open container file.
///
/// Dereferences to its root [`Group`].
pub struct File {
    root: Group,
}

impl File {
    /// Returns a builder with read-only defaults.
    #[must_use]
    pub fn options() -> FileOptions {
        FileOptions::new()
    }

    /// Opens an existing file read-only.
    ///
    /// # Errors
    /// See [`FileOptions::open`].
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        FileOptions::new().mode(OpenMode::ReadOnly).open(path)
    }

    /// Opens an existing file for reading and writing.
    ///
    /// # Errors
    /// See [`FileOptions::open`].
    pub fn open_rw(path: impl AsRef<Path>) -> Result<Self> {
        FileOptions::new().mode(OpenMode::ReadWrite).open(path)
    }

    /// Creates a file in native byte order, replacing any existing one.
    ///
    /// # Errors
    /// See [`FileOptions::open`].
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        FileOptions::new().mode(OpenMode::CreateTruncate).open(path)
    }

    /// Root group.
    #[must_use]
    pub fn root(&self) -> &Group {
        &self.root
    }

    /// Mode the file was opened with.
    ///
    /// # Errors
    /// Returns [`Error::UseAfterClose`] if the file is closed.
    pub fn mode(&self) -> Result<OpenMode> {
        self.root.with_state(|state| Ok(state.mode))
    }

    /// Byte order of element data.
    ///
    /// # Errors
    /// Returns [`Error::UseAfterClose`] if the file is closed.
    pub fn byte_order(&self) -> Result<ByteOrder> {
        self.root.with_state(|state| Ok(state.tree.byte_order))
    }

    /// Path the file was opened from.
    ///
    /// # Errors
    /// Returns [`Error::UseAfterClose`] if the file is closed.
    pub fn path(&self) -> Result<PathBuf> {
        self.root.with_state(|state| Ok(state.path.clone()))
    }

    /// Writes pending changes to disk.
    ///
    /// # Errors
    /// Returns an I/O error if writing fails.
    pub fn flush(&self) -> Result<()> {
        let mut guard = lock(&self.root.shared);
        guard.as_mut().ok_or(Error::UseAfterClose)?.sync()
    }

    /// Writes pending changes and closes the file.
    ///
    /// Every handle obtained from this file becomes unusable.
    ///
    /// # Errors
    /// Returns an I/O error if the final write fails.
    pub fn close(self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&self) -> Result<()> {
        let state = lock(&self.root.shared).take();
        match state {
            Some(mut state) => {
                state.sync()?;
                log::debug!("closed {}", state.path.display());
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Resolves a reference to a dataset.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] if the target was unlinked or is a group.
    pub fn dereference(&self, reference: ObjectReference) -> Result<Dataset> {
        self.root.with_state(|state| {
            state.tree.payload(reference.id())?;
            Ok(())
        })?;
        Ok(Dataset::at(&self.root.shared, reference.id()))
    }

    /// Resolves a reference to a group.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] if the target was unlinked or is a dataset.
    pub fn dereference_group(&self, reference: ObjectReference) -> Result<Group> {
        self.root.with_state(|state| {
            state.tree.children(reference.id())?;
            Ok(())
        })?;
        Ok(Group::at(&self.root.shared, reference.id()))
    }
}

impl Deref for File {
    type Target = Group;

    fn deref(&self) -> &Group {
        &self.root
    }
}

impl Drop for File {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            log::warn!("failed to write container on drop: {err}");
        }
    }
}

/// A group or dataset inside a file. Carries attributes.
#[derive(Clone)]
pub struct Location {
    shared: Shared,
    id: NodeId,
}

impl Location {
    fn with_state<R>(&self, f: impl FnOnce(&FileState) -> Result<R>) -> Result<R> {
        let guard = lock(&self.shared);
        f(guard.as_ref().ok_or(Error::UseAfterClose)?)
    }

    fn with_state_mut<R>(&self, f: impl FnOnce(&mut FileState) -> Result<R>) -> Result<R> {
        let mut guard = lock(&self.shared);
        let state = guard.as_mut().ok_or(Error::UseAfterClose)?;
        if !state.mode.is_writable() {
            return Err(Error::ReadOnly);
        }
        let out = f(state)?;
        state.dirty = true;
        Ok(out)
    }

    /// Returns true while the file is open and the object is linked.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.with_state(|state| state.tree.node(self.id).map(|_| ()))
            .is_ok()
    }

    /// A reference that can be stored and later resolved through
    /// [`File::dereference`].
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] if the object was unlinked.
    pub fn reference(&self) -> Result<ObjectReference> {
        self.with_state(|state| {
            state.tree.node(self.id)?;
            Ok(ObjectReference(self.id))
        })
    }

    /// Stores a scalar attribute, replacing any previous value.
    ///
    /// # Errors
    /// Returns [`Error::ReadOnly`] on read-only files and
    /// [`Error::InvalidName`] for an empty name.
    pub fn set_attr<T: Storable>(&self, name: &str, value: &T) -> Result<()> {
        if name.is_empty() {
            return Err(Error::InvalidName(name.to_string()));
        }
        self.with_state_mut(|state| {
            let payload = Payload::from_values(
                TypeRegistry::describe::<T>(),
                Vec::new(),
                std::iter::once(value),
                state.tree.byte_order,
            )?;
            state
                .tree
                .node_mut(self.id)?
                .attrs
                .insert(name.to_string(), payload);
            Ok(())
        })
    }

    /// Reads a scalar attribute.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] if the attribute is missing and
    /// [`Error::TypeMismatch`] if it is not stored as `T`.
    pub fn attr<T: Storable>(&self, name: &str) -> Result<T> {
        self.with_state(|state| {
            let payload = state
                .tree
                .node(self.id)?
                .attrs
                .get(name)
                .ok_or_else(|| Error::NotFound(format!("attribute {name}")))?;
            if !T::accepts(&payload.dtype) {
                return Err(mismatch(&T::type_descriptor(), &payload.dtype));
            }
            let count = payload.element_count();
            if count != 1 {
                return Err(Error::ShapeMismatch(format!(
                    "attribute {name} holds {count} elements"
                )));
            }
            let mut values = payload.decode_range(0, 1, state.tree.byte_order, |_| {})?;
            values
                .pop()
                .ok_or_else(|| Error::NotFound(format!("attribute {name}")))
        })
    }

    /// Element type of an attribute.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] if the attribute is missing.
    pub fn attr_dtype(&self, name: &str) -> Result<Arc<TypeDescriptor>> {
        self.with_state(|state| {
            state
                .tree
                .node(self.id)?
                .attrs
                .get(name)
                .map(|payload| Arc::clone(&payload.dtype))
                .ok_or_else(|| Error::NotFound(format!("attribute {name}")))
        })
    }

    /// Attribute names in sorted order.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] if the object was unlinked.
    pub fn attr_names(&self) -> Result<Vec<String>> {
        self.with_state(|state| Ok(state.tree.node(self.id)?.attrs.keys().cloned().collect()))
    }

    /// Returns true if the attribute exists.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] if the object was unlinked.
    pub fn has_attr(&self, name: &str) -> Result<bool> {
        self.with_state(|state| Ok(state.tree.node(self.id)?.attrs.contains_key(name)))
    }

    /// Removes an attribute.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] if the attribute is missing.
    pub fn delete_attr(&self, name: &str) -> Result<()> {
        self.with_state_mut(|state| {
            state
                .tree
                .node_mut(self.id)?
                .attrs
                .remove(name)
                .map(|_| ())
                .ok_or_else(|| Error::NotFound(format!("attribute {name}")))
        })
    }
}

/// A named collection of groups and datasets.
#[derive(Clone)]
pub struct Group {
    location: Location,
}

impl Group {
    fn at(shared: &Shared, id: NodeId) -> Self {
        Self {
            location: Location {
                shared: Arc::clone(shared),
                id,
            },
        }
    }

    /// Creates a subgroup. `name` may be a slash-separated path whose
    /// intermediate groups already exist.
    ///
    /// # Errors
    /// Returns [`Error::AlreadyExists`] if the name is taken.
    pub fn create_group(&self, name: &str) -> Result<Group> {
        let id = self.with_state_mut(|state| state.tree.insert(self.id, name, Node::group()))?;
        Ok(Group::at(&self.shared, id))
    }

    /// Opens a subgroup.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] if there is no group at `name`.
    pub fn group(&self, name: &str) -> Result<Group> {
        let id = self.with_state(|state| {
            let id = state.tree.resolve(self.id, name)?;
            state.tree.children(id)?;
            Ok(id)
        })?;
        Ok(Group::at(&self.shared, id))
    }

    /// Creates a zero-filled dataset with an explicit element type.
    ///
    /// # Errors
    /// Returns [`Error::AlreadyExists`] if the name is taken. An existing
    /// dataset must be unlinked before it can be recreated. Returns
    /// [`Error::InvalidTypeDescriptor`] if `dtype` fails validation.
    pub fn create_dataset(
        &self,
        name: &str,
        dtype: impl Into<Arc<TypeDescriptor>>,
        shape: &[usize],
    ) -> Result<Dataset> {
        let dtype = dtype.into();
        dtype.validate()?;
        let payload = Payload::zeroed(dtype, shape.to_vec())?;
        let id = self.with_state_mut(|state| {
            state.tree.insert(self.id, name, Node::dataset(payload))
        })?;
        Ok(Dataset::at(&self.shared, id))
    }

    /// Creates a zero-filled dataset of `T` elements.
    ///
    /// # Errors
    /// Returns [`Error::AlreadyExists`] if the name is taken.
    pub fn new_dataset<T: Storable>(&self, name: &str, shape: &[usize]) -> Result<Dataset> {
        self.create_dataset(name, TypeRegistry::describe::<T>(), shape)
    }

    /// Opens a dataset.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] if there is no dataset at `name`.
    pub fn dataset(&self, name: &str) -> Result<Dataset> {
        let id = self.with_state(|state| {
            let id = state.tree.resolve(self.id, name)?;
            state.tree.payload(id)?;
            Ok(id)
        })?;
        Ok(Dataset::at(&self.shared, id))
    }

    /// Returns true if `name` resolves to a group or dataset.
    ///
    /// # Errors
    /// Returns [`Error::UseAfterClose`] if the file is closed.
    pub fn exists(&self, name: &str) -> Result<bool> {
        self.with_state(|state| match state.tree.resolve(self.id, name) {
            Ok(_) => Ok(true),
            Err(Error::NotFound(_)) => Ok(false),
            Err(err) => Err(err),
        })
    }

    /// Names of direct members in sorted order.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] if this group was unlinked.
    pub fn member_names(&self) -> Result<Vec<String>> {
        self.with_state(|state| Ok(state.tree.children(self.id)?.keys().cloned().collect()))
    }

    /// Returns true if `name` is a group.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] if `name` does not exist.
    pub fn is_group(&self, name: &str) -> Result<bool> {
        self.with_state(|state| {
            let id = state.tree.resolve(self.id, name)?;
            Ok(matches!(state.tree.node(id)?.kind, NodeKind::Group(_)))
        })
    }

    /// Removes a member and everything below it.
    ///
    /// Existing handles and references to removed objects report
    /// [`Error::NotFound`] from then on.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] if `name` does not exist.
    pub fn unlink(&self, name: &str) -> Result<()> {
        self.with_state_mut(|state| state.tree.unlink(self.id, name))
    }
}

impl Deref for Group {
    type Target = Location;

    fn deref(&self) -> &Location {
        &self.location
    }
}

/// A typed n-dimensional array of elements.
#[derive(Clone)]
pub struct Dataset {
    location: Location,
}

impl Dataset {
    fn at(shared: &Shared, id: NodeId) -> Self {
        Self {
            location: Location {
                shared: Arc::clone(shared),
                id,
            },
        }
    }

    fn with_payload<R>(&self, f: impl FnOnce(&Payload, ByteOrder) -> Result<R>) -> Result<R> {
        self.with_state(|state| f(state.tree.payload(self.id)?, state.tree.byte_order))
    }

    fn with_payload_mut<R>(
        &self,
        f: impl FnOnce(&mut Payload, ByteOrder) -> Result<R>,
    ) -> Result<R> {
        self.with_state_mut(|state| {
            let order = state.tree.byte_order;
            f(state.tree.payload_mut(self.id)?, order)
        })
    }

    /// Element type.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] if the dataset was unlinked.
    pub fn dtype(&self) -> Result<Arc<TypeDescriptor>> {
        self.with_payload(|payload, _| Ok(Arc::clone(&payload.dtype)))
    }

    /// Dimensions. Empty for scalars.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] if the dataset was unlinked.
    pub fn shape(&self) -> Result<Vec<usize>> {
        self.with_payload(|payload, _| Ok(payload.shape.clone()))
    }

    /// Total number of elements.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] if the dataset was unlinked.
    pub fn len(&self) -> Result<usize> {
        self.with_payload(|payload, _| Ok(payload.element_count()))
    }

    /// Returns true if the dataset holds no elements.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] if the dataset was unlinked.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Bytes used by element data and string heap.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] if the dataset was unlinked.
    pub fn storage_size(&self) -> Result<usize> {
        self.with_payload(|payload, _| Ok(payload.data.len() + payload.heap.len()))
    }

    fn check_write<T: Storable>(payload: &Payload) -> Result<()> {
        let own = T::type_descriptor();
        if own.matches(&payload.dtype) {
            Ok(())
        } else {
            Err(mismatch(&payload.dtype, &own))
        }
    }

    fn check_read<T: Storable>(payload: &Payload) -> Result<()> {
        if T::accepts(&payload.dtype) {
            Ok(())
        } else {
            Err(mismatch(&T::type_descriptor(), &payload.dtype))
        }
    }

    /// Replaces all elements, in row-major order.
    ///
    /// # Errors
    /// Returns [`Error::TypeMismatch`] if the dataset was not created for
    /// `T`, and [`Error::ShapeMismatch`] if the number of values differs
    /// from the number of elements.
    pub fn write<T: Storable>(&self, values: &[T]) -> Result<()> {
        self.write_iter(values.iter())
    }

    fn write_iter<'v, T, I>(&self, values: I) -> Result<()>
    where
        T: Storable,
        I: ExactSizeIterator<Item = &'v T>,
    {
        self.with_payload_mut(|payload, order| {
            Self::check_write::<T>(payload)?;
            let fresh = Payload::from_values(
                Arc::clone(&payload.dtype),
                payload.shape.clone(),
                values,
                order,
            )?;
            *payload = fresh;
            Ok(())
        })
    }

    /// Writes the only element of a scalar or single-element dataset.
    ///
    /// # Errors
    /// Returns [`Error::ShapeMismatch`] if the dataset holds more than one
    /// element.
    pub fn write_scalar<T: Storable>(&self, value: &T) -> Result<()> {
        self.write_iter(std::iter::once(value))
    }

    /// Replaces all elements from an array of the same shape.
    ///
    /// # Errors
    /// Returns [`Error::ShapeMismatch`] if the shapes differ.
    pub fn write_array<T: Storable, D: Dimension>(&self, array: ArrayView<'_, T, D>) -> Result<()> {
        let shape = self.shape()?;
        if array.shape() != shape.as_slice() {
            return Err(Error::ShapeMismatch(format!(
                "array of shape {:?} for dataset of shape {shape:?}",
                array.shape()
            )));
        }
        self.write_iter(array.iter())
    }

    /// Writes consecutive elements of a one-dimensional dataset starting at
    /// `start`, growing it when the values run past the end.
    ///
    /// # Errors
    /// Returns [`Error::ShapeMismatch`] for datasets that are not
    /// one-dimensional.
    pub fn write_slice<T: Storable>(&self, start: usize, values: &[T]) -> Result<()> {
        self.with_payload_mut(|payload, order| {
            Self::check_write::<T>(payload)?;
            if payload.shape.len() != 1 {
                return Err(Error::ShapeMismatch(format!(
                    "slice write into dataset of shape {:?}",
                    payload.shape
                )));
            }
            let end = start + values.len();
            if end > payload.shape[0] {
                payload.resize_leading(&[end])?;
            }
            payload.encode_at(start, values.iter(), order)
        })
    }

    /// Changes the first dimension, keeping existing elements in front and
    /// zero-filling new ones.
    ///
    /// # Errors
    /// Returns [`Error::ShapeMismatch`] if any other dimension would change.
    pub fn resize(&self, shape: &[usize]) -> Result<()> {
        self.with_payload_mut(|payload, order| {
            payload.resize_leading(shape)?;
            payload.compact(order)
        })
    }

    /// Reads all elements in row-major order.
    ///
    /// # Errors
    /// Returns [`Error::TypeMismatch`] if the stored type cannot be read as
    /// `T`, and [`Error::InvalidEnumValue`] if an element holds a value `T`
    /// cannot represent.
    pub fn read<T: Storable>(&self) -> Result<Vec<T>> {
        self.with_payload(|payload, order| {
            Self::check_read::<T>(payload)?;
            payload.decode_range(0, payload.element_count(), order, |_| {})
        })
    }

    /// Reads elements `range` of the flattened dataset.
    ///
    /// # Errors
    /// Returns [`Error::ShapeMismatch`] if the range is out of bounds.
    pub fn read_range<T: Storable>(&self, range: Range<usize>) -> Result<Vec<T>> {
        self.with_payload(|payload, order| {
            Self::check_read::<T>(payload)?;
            payload.decode_range(range.start, range.end, order, |_| {})
        })
    }

    /// Reads the only element of a scalar or single-element dataset.
    ///
    /// # Errors
    /// Returns [`Error::ShapeMismatch`] if the dataset holds more than one
    /// element.
    pub fn read_scalar<T: Storable>(&self) -> Result<T> {
        self.with_payload(|payload, order| {
            Self::check_read::<T>(payload)?;
            let count = payload.element_count();
            if count != 1 {
                return Err(Error::ShapeMismatch(format!(
                    "scalar read from {count} elements"
                )));
            }
            let mut values = payload.decode_range(0, 1, order, |_| {})?;
            values
                .pop()
                .ok_or_else(|| Error::ShapeMismatch("empty dataset".to_string()))
        })
    }

    /// Reads all elements into an array of the dataset's shape.
    ///
    /// # Errors
    /// Same as [`Dataset::read`].
    pub fn read_array<T: Storable>(&self) -> Result<ArrayD<T>> {
        let shape = self.shape()?;
        let values = self.read::<T>()?;
        ArrayD::from_shape_vec(IxDyn(&shape), values)
            .map_err(|err| Error::ShapeMismatch(err.to_string()))
    }

    /// Reads all elements on behalf of a cancellable operation.
    ///
    /// Cancellation is checked once before the read starts; progress is
    /// reported while elements are decoded.
    ///
    /// # Errors
    /// Returns [`Error::CoreError`] if the operation was cancelled, otherwise
    /// the same errors as [`Dataset::read`].
    pub fn read_with<T: Storable>(&self, operation: &dyn Operation) -> Result<Vec<T>> {
        operation.check_cancelled()?;
        self.with_payload(|payload, order| {
            Self::check_read::<T>(payload)?;
            payload.decode_range(0, payload.element_count(), order, |fraction| {
                if let Err(err) = operation.update_progress(fraction) {
                    log::warn!("progress update failed: {err}");
                }
            })
        })
    }
}

impl Deref for Dataset {
    type Target = Location;

    fn deref(&self) -> &Location {
        &self.location
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_scalar_dataset_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scalar.vxc");

        let file = File::create(&path).unwrap();
        file.new_dataset::<f64>("value", &[])
            .unwrap()
            .write_scalar(&2.5)
            .unwrap();
        file.close().unwrap();

        let file = File::open(&path).unwrap();
        let value: f64 = file.dataset("value").unwrap().read_scalar().unwrap();
        assert!((value - 2.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_mutation_on_read_only_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ro.vxc");
        File::create(&path).unwrap().close().unwrap();

        let file = File::open(&path).unwrap();
        assert!(matches!(file.create_group("g"), Err(Error::ReadOnly)));
        assert!(matches!(file.set_attr("a", &1_u8), Err(Error::ReadOnly)));
    }

    #[test]
    fn test_handles_fail_after_close() {
        let dir = tempdir().unwrap();
        let file = File::create(dir.path().join("closed.vxc")).unwrap();
        let group = file.create_group("g").unwrap();
        let dataset = group.new_dataset::<u8>("d", &[2]).unwrap();
        file.close().unwrap();

        assert!(matches!(group.member_names(), Err(Error::UseAfterClose)));
        assert!(matches!(dataset.read::<u8>(), Err(Error::UseAfterClose)));
        assert!(!dataset.is_valid());
    }

    #[test]
    fn test_drop_writes_changes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("drop.vxc");
        {
            let file = File::create(&path).unwrap();
            file.create_group("kept").unwrap();
        }
        let file = File::open(&path).unwrap();
        assert!(file.exists("kept").unwrap());
    }

    #[test]
    fn test_slice_write_grows_dataset() {
        let dir = tempdir().unwrap();
        let file = File::create(dir.path().join("grow.vxc")).unwrap();
        let dataset = file.new_dataset::<u16>("counts", &[2]).unwrap();
        dataset.write(&[1_u16, 2]).unwrap();
        dataset.write_slice(1, &[7_u16, 8, 9]).unwrap();

        assert_eq!(dataset.shape().unwrap(), vec![4]);
        assert_eq!(dataset.read::<u16>().unwrap(), vec![1, 7, 8, 9]);
        assert_eq!(dataset.read_range::<u16>(1..3).unwrap(), vec![7, 8]);
    }
}
