//! In-memory object tree of an open container.

use crate::codec::{Decoder, Encoder};
use crate::storable::Storable;
use crate::types::{ByteOrder, TypeDescriptor, VARIABLE_STRING_SIZE};
use crate::{Error, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Index into the node table. Ids never change while the file exists.
pub(crate) type NodeId = u64;

/// The root group is always the first node.
pub(crate) const ROOT: NodeId = 0;

/// Element type, shape and raw bytes of a dataset or attribute.
#[derive(Clone, Debug)]
pub(crate) struct Payload {
    pub dtype: Arc<TypeDescriptor>,
    pub shape: Vec<usize>,
    pub data: Vec<u8>,
    pub heap: Vec<u8>,
}

impl Payload {
    /// Zero-filled payload.
    pub fn zeroed(dtype: Arc<TypeDescriptor>, shape: Vec<usize>) -> Result<Self> {
        let len = byte_len(&dtype, &shape)?;
        Ok(Self {
            dtype,
            shape,
            data: vec![0; len],
            heap: Vec::new(),
        })
    }

    /// Payload holding `values` in order.
    pub fn from_values<'v, T, I>(
        dtype: Arc<TypeDescriptor>,
        shape: Vec<usize>,
        values: I,
        order: ByteOrder,
    ) -> Result<Self>
    where
        T: Storable,
        I: ExactSizeIterator<Item = &'v T>,
    {
        let mut payload = Self::zeroed(dtype, shape)?;
        let count = payload.element_count();
        if values.len() != count {
            return Err(Error::ShapeMismatch(format!(
                "{} values for {count} elements of shape {:?}",
                values.len(),
                payload.shape
            )));
        }
        payload.encode_at(0, values, order)?;
        Ok(payload)
    }

    pub fn element_count(&self) -> usize {
        self.shape.iter().product()
    }

    /// Encodes `values` into consecutive elements starting at `start`.
    ///
    /// On error the payload is left unchanged.
    pub fn encode_at<'v, T, I>(&mut self, start: usize, values: I, order: ByteOrder) -> Result<()>
    where
        T: Storable,
        I: ExactSizeIterator<Item = &'v T>,
    {
        let size = self.dtype.size();
        let count = values.len();
        if start + count > self.element_count() {
            return Err(Error::ShapeMismatch(format!(
                "elements {start}..{} outside {} elements",
                start + count,
                self.element_count()
            )));
        }

        let heap_len = self.heap.len();
        let mut staged = vec![0_u8; count * size];
        let encoded = values.enumerate().try_for_each(|(i, value)| {
            let region = &mut staged[i * size..(i + 1) * size];
            value.encode(&mut Encoder::new(region, &mut self.heap, order), &self.dtype)
        });
        if let Err(err) = encoded {
            self.heap.truncate(heap_len);
            return Err(err);
        }

        let range = start * size..(start + count) * size;
        let slots = heap_slots(&self.dtype);
        if slots.is_empty() {
            self.data[range].copy_from_slice(&staged);
            return Ok(());
        }

        // Overwritten elements leave heap bytes behind that nothing points to.
        let mut data = self.data.clone();
        data[range].copy_from_slice(&staged);
        match compact_heap(&slots, size, &mut data, &self.heap, order) {
            Ok(heap) => {
                self.data = data;
                self.heap = heap;
                Ok(())
            }
            Err(err) => {
                self.heap.truncate(heap_len);
                Err(err)
            }
        }
    }

    /// Drops heap bytes no element refers to.
    pub fn compact(&mut self, order: ByteOrder) -> Result<()> {
        let slots = heap_slots(&self.dtype);
        if slots.is_empty() || self.heap.is_empty() {
            return Ok(());
        }
        let mut data = self.data.clone();
        self.heap = compact_heap(&slots, self.dtype.size(), &mut data, &self.heap, order)?;
        self.data = data;
        Ok(())
    }

    /// Decodes elements `start..end`, calling `progress` with the fraction done.
    pub fn decode_range<T: Storable>(
        &self,
        start: usize,
        end: usize,
        order: ByteOrder,
        mut progress: impl FnMut(f64),
    ) -> Result<Vec<T>> {
        const STRIDE: usize = 1 << 16;

        if start > end || end > self.element_count() {
            return Err(Error::ShapeMismatch(format!(
                "elements {start}..{end} outside {} elements",
                self.element_count()
            )));
        }

        let size = self.dtype.size();
        let total = end - start;
        let mut values = Vec::with_capacity(total);
        for (done, i) in (start..end).enumerate() {
            let region = &self.data[i * size..(i + 1) * size];
            values.push(T::decode(
                &mut Decoder::new(region, &self.heap, order),
                &self.dtype,
            )?);
            if done % STRIDE == STRIDE - 1 {
                #[allow(clippy::cast_precision_loss)]
                progress((done + 1) as f64 / total as f64);
            }
        }
        progress(1.0);
        Ok(values)
    }

    /// Changes the leading dimension, truncating or zero-extending the data.
    pub fn resize_leading(&mut self, shape: &[usize]) -> Result<()> {
        if shape.len() != self.shape.len() || shape.get(1..) != self.shape.get(1..) {
            return Err(Error::ShapeMismatch(format!(
                "cannot resize {:?} to {shape:?}: only the first dimension may change",
                self.shape
            )));
        }
        let len = byte_len(&self.dtype, shape)?;
        self.data.resize(len, 0);
        self.shape = shape.to_vec();
        Ok(())
    }
}

/// Offsets of the heap locations inside one element of `dtype`.
fn heap_slots(dtype: &TypeDescriptor) -> Vec<usize> {
    let mut slots = Vec::new();
    collect_heap_slots(dtype, 0, &mut slots);
    slots
}

fn collect_heap_slots(dtype: &TypeDescriptor, base: usize, slots: &mut Vec<usize>) {
    match dtype {
        TypeDescriptor::VariableString => slots.push(base),
        TypeDescriptor::Compound(ty) => {
            for field in ty.fields() {
                collect_heap_slots(&field.ty, base + field.offset, slots);
            }
        }
        TypeDescriptor::FixedArray { element, len } => {
            let inner = heap_slots(element);
            if inner.is_empty() {
                return;
            }
            let size = element.size();
            for i in 0..*len {
                slots.extend(inner.iter().map(|slot| base + i * size + slot));
            }
        }
        _ => {}
    }
}

/// Copies the heap bytes referenced from `data` into a fresh heap, in
/// element order, and points the locations at their new offsets.
fn compact_heap(
    slots: &[usize],
    size: usize,
    data: &mut [u8],
    heap: &[u8],
    order: ByteOrder,
) -> Result<Vec<u8>> {
    let mut compacted = Vec::new();
    for element in data.chunks_exact_mut(size) {
        for &slot in slots {
            let location = &mut element[slot..slot + VARIABLE_STRING_SIZE];
            let bytes = Decoder::new(location, heap, order).read_heap()?.to_vec();
            Encoder::new(location, &mut compacted, order).write_heap(&bytes)?;
        }
    }
    Ok(compacted)
}

fn byte_len(dtype: &TypeDescriptor, shape: &[usize]) -> Result<usize> {
    shape
        .iter()
        .try_fold(dtype.size(), |acc, &dim| acc.checked_mul(dim))
        .ok_or_else(|| Error::ShapeMismatch(format!("shape {shape:?} of {dtype} is too large")))
}

#[derive(Clone, Debug)]
pub(crate) enum NodeKind {
    Group(BTreeMap<String, NodeId>),
    Dataset(Payload),
}

#[derive(Clone, Debug)]
pub(crate) struct Node {
    pub kind: NodeKind,
    pub attrs: BTreeMap<String, Payload>,
}

impl Node {
    pub fn group() -> Self {
        Self {
            kind: NodeKind::Group(BTreeMap::new()),
            attrs: BTreeMap::new(),
        }
    }

    pub fn dataset(payload: Payload) -> Self {
        Self {
            kind: NodeKind::Dataset(payload),
            attrs: BTreeMap::new(),
        }
    }
}

/// The whole object tree. Unlinked nodes leave a `None` behind so that ids
/// held by references stay valid.
#[derive(Clone, Debug)]
pub(crate) struct Tree {
    pub byte_order: ByteOrder,
    pub nodes: Vec<Option<Node>>,
}

impl Tree {
    pub fn new(byte_order: ByteOrder) -> Self {
        Self {
            byte_order,
            nodes: vec![Some(Node::group())],
        }
    }

    pub fn node(&self, id: NodeId) -> Result<&Node> {
        usize::try_from(id)
            .ok()
            .and_then(|index| self.nodes.get(index))
            .and_then(Option::as_ref)
            .ok_or_else(|| Error::NotFound(format!("object #{id}")))
    }

    pub fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        usize::try_from(id)
            .ok()
            .and_then(|index| self.nodes.get_mut(index))
            .and_then(Option::as_mut)
            .ok_or_else(|| Error::NotFound(format!("object #{id}")))
    }

    pub fn children(&self, id: NodeId) -> Result<&BTreeMap<String, NodeId>> {
        match &self.node(id)?.kind {
            NodeKind::Group(children) => Ok(children),
            NodeKind::Dataset(_) => Err(Error::NotFound(format!("group #{id}"))),
        }
    }

    pub fn payload(&self, id: NodeId) -> Result<&Payload> {
        match &self.node(id)?.kind {
            NodeKind::Dataset(payload) => Ok(payload),
            NodeKind::Group(_) => Err(Error::NotFound(format!("dataset #{id}"))),
        }
    }

    pub fn payload_mut(&mut self, id: NodeId) -> Result<&mut Payload> {
        match &mut self.node_mut(id)?.kind {
            NodeKind::Dataset(payload) => Ok(payload),
            NodeKind::Group(_) => Err(Error::NotFound(format!("dataset #{id}"))),
        }
    }

    /// Follows a slash-separated path. A leading `/` starts at the root.
    pub fn resolve(&self, from: NodeId, path: &str) -> Result<NodeId> {
        let (mut current, rest) = match path.strip_prefix('/') {
            Some(rest) => (ROOT, rest),
            None => (from, path),
        };
        self.node(current)?;
        for component in rest.split('/').filter(|c| !c.is_empty()) {
            current = *self
                .children(current)
                .ok()
                .and_then(|children| children.get(component))
                .ok_or_else(|| Error::NotFound(path.to_string()))?;
        }
        Ok(current)
    }

    /// Adds `node` under the last component of `path`.
    pub fn insert(&mut self, from: NodeId, path: &str, node: Node) -> Result<NodeId> {
        let (start, rest) = match path.strip_prefix('/') {
            Some(rest) => (ROOT, rest),
            None => (from, path),
        };
        let rest = rest.trim_end_matches('/');
        let (parent, name) = rest.rsplit_once('/').unwrap_or(("", rest));
        validate_name(name)?;

        let parent = self.resolve(start, parent)?;
        if self.children(parent)?.contains_key(name) {
            return Err(Error::AlreadyExists(path.to_string()));
        }

        let id = self.nodes.len() as NodeId;
        self.nodes.push(Some(node));
        if let NodeKind::Group(children) = &mut self.node_mut(parent)?.kind {
            children.insert(name.to_string(), id);
        }
        Ok(id)
    }

    /// Detaches the object at `path` and drops it with all its descendants.
    pub fn unlink(&mut self, from: NodeId, path: &str) -> Result<()> {
        let id = self.resolve(from, path)?;
        if id == ROOT {
            return Err(Error::InvalidName(path.to_string()));
        }
        let trimmed = path.trim_end_matches('/');
        let (parent_path, name) = trimmed.rsplit_once('/').unwrap_or(("", trimmed));
        let parent_path = if parent_path.is_empty() && trimmed.starts_with('/') {
            "/"
        } else {
            parent_path
        };
        let parent = self.resolve(from, parent_path)?;
        if let NodeKind::Group(children) = &mut self.node_mut(parent)?.kind {
            children.remove(name);
        }

        let mut pending = vec![id];
        while let Some(id) = pending.pop() {
            let removed = usize::try_from(id)
                .ok()
                .and_then(|index| self.nodes.get_mut(index))
                .and_then(Option::take);
            if let Some(Node {
                kind: NodeKind::Group(children),
                ..
            }) = removed
            {
                pending.extend(children.into_values());
            }
        }
        Ok(())
    }
}

/// Checks a single path component.
pub(crate) fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') {
        Err(Error::InvalidName(name.to_string()))
    } else {
        Ok(())
    }
}
