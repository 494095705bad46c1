//! On-disk container layout.
//!
//! ```text
//! header     magic "VXCT" | version u16 | byte order u8 | reserved u8
//! type table count u32 | descriptor*
//! node table count u64 | node*
//! node       kind u8 (0 unlinked, 1 group, 2 dataset)
//!            group:   count u32 | (name, child id u64)*
//!            dataset: payload
//!            then attributes: count u32 | (name, payload)*
//! payload    type index u32 | rank u32 | dim u64* | data bytes | heap bytes
//! ```
//!
//! Structural fields are little-endian. Element data inside payloads uses
//! the byte order recorded in the header. Names and byte blocks are
//! length-prefixed (u32 and u64 respectively).

use crate::node::{Node, NodeKind, Payload, Tree, ROOT};
use crate::types::{
    ByteOrder, CompoundField, CompoundType, EnumMember, EnumType, FloatType, IntegerType,
    TypeDescriptor,
};
use crate::{Error, Result};
use memmap2::Mmap;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

pub(crate) const MAGIC: &[u8; 4] = b"VXCT";
pub(crate) const VERSION: u16 = 1;

/// Deepest descriptor nesting accepted when reading.
const MAX_TYPE_DEPTH: usize = 32;

const TYPE_INTEGER: u8 = 0;
const TYPE_FLOAT: u8 = 1;
const TYPE_ENUM: u8 = 2;
const TYPE_COMPOUND: u8 = 3;
const TYPE_ARRAY: u8 = 4;
const TYPE_STRING: u8 = 5;
const TYPE_OPAQUE: u8 = 6;
const TYPE_REFERENCE: u8 = 7;

const NODE_UNLINKED: u8 = 0;
const NODE_GROUP: u8 = 1;
const NODE_DATASET: u8 = 2;

/// Reads a container file through a memory map.
pub(crate) fn read_file(path: &Path) -> Result<Tree> {
    let file = fs::File::open(path)?;
    if file.metadata()?.len() == 0 {
        return Err(Error::InvalidFormat(format!("{} is empty", path.display())));
    }

    // SAFETY: the map is only read while parsing and dropped before this
    // function returns; all parsed data is copied out.
    #[allow(unsafe_code)]
    let mmap = unsafe { Mmap::map(&file)? };
    let tree = decode_tree(&mmap)?;
    log::debug!(
        "read {} ({} bytes, {} nodes)",
        path.display(),
        mmap.len(),
        tree.nodes.len()
    );
    Ok(tree)
}

/// Writes a container file, replacing any previous contents.
pub(crate) fn write_file(path: &Path, tree: &Tree) -> Result<()> {
    let bytes = encode_tree(tree)?;
    let file = fs::File::create(path)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(&bytes)?;
    writer.flush()?;
    log::debug!("wrote {} ({} bytes)", path.display(), bytes.len());
    Ok(())
}

pub(crate) fn encode_tree(tree: &Tree) -> Result<Vec<u8>> {
    let mut types = TypeTable::default();
    for node in tree.nodes.iter().flatten() {
        if let NodeKind::Dataset(payload) = &node.kind {
            types.intern(&payload.dtype);
        }
        for payload in node.attrs.values() {
            types.intern(&payload.dtype);
        }
    }

    let mut out = Writer::default();
    out.bytes.extend_from_slice(MAGIC);
    out.u16(VERSION);
    out.u8(match tree.byte_order {
        ByteOrder::LittleEndian => 0,
        ByteOrder::BigEndian => 1,
    });
    out.u8(0);

    out.u32(len_u32(types.order.len())?);
    for ty in &types.order {
        out.descriptor(ty)?;
    }

    out.u64(tree.nodes.len() as u64);
    for node in &tree.nodes {
        let Some(node) = node else {
            out.u8(NODE_UNLINKED);
            continue;
        };
        match &node.kind {
            NodeKind::Group(children) => {
                out.u8(NODE_GROUP);
                out.u32(len_u32(children.len())?);
                for (name, id) in children {
                    out.str(name)?;
                    out.u64(*id);
                }
            }
            NodeKind::Dataset(payload) => {
                out.u8(NODE_DATASET);
                out.payload(payload, &types)?;
            }
        }
        out.u32(len_u32(node.attrs.len())?);
        for (name, payload) in &node.attrs {
            out.str(name)?;
            out.payload(payload, &types)?;
        }
    }
    Ok(out.bytes)
}

pub(crate) fn decode_tree(bytes: &[u8]) -> Result<Tree> {
    let mut input = Reader { bytes, pos: 0 };
    if input.take(4)? != MAGIC {
        return Err(Error::InvalidFormat("missing container signature".to_string()));
    }
    let version = input.u16()?;
    if version != VERSION {
        return Err(Error::InvalidFormat(format!(
            "unsupported container version {version}"
        )));
    }
    let byte_order = match input.u8()? {
        0 => ByteOrder::LittleEndian,
        1 => ByteOrder::BigEndian,
        flag => {
            return Err(Error::InvalidFormat(format!("unknown byte order flag {flag}")));
        }
    };
    input.u8()?;

    let type_count = input.u32()?;
    let mut types = Vec::new();
    for _ in 0..type_count {
        types.push(Arc::new(input.descriptor(0)?));
    }

    let node_count = input.count_u64()?;
    let mut nodes = Vec::new();
    for _ in 0..node_count {
        let kind = match input.u8()? {
            NODE_UNLINKED => {
                nodes.push(None);
                continue;
            }
            NODE_GROUP => {
                let mut children = BTreeMap::new();
                for _ in 0..input.u32()? {
                    let name = input.str()?;
                    let id = input.u64()?;
                    if children.insert(name.clone(), id).is_some() {
                        return Err(Error::InvalidFormat(format!("duplicate member {name}")));
                    }
                }
                NodeKind::Group(children)
            }
            NODE_DATASET => NodeKind::Dataset(input.payload(&types)?),
            tag => return Err(Error::InvalidFormat(format!("unknown node kind {tag}"))),
        };
        let mut attrs = BTreeMap::new();
        for _ in 0..input.u32()? {
            let name = input.str()?;
            attrs.insert(name, input.payload(&types)?);
        }
        nodes.push(Some(Node { kind, attrs }));
    }

    if input.pos != bytes.len() {
        return Err(Error::InvalidFormat(format!(
            "{} trailing bytes",
            bytes.len() - input.pos
        )));
    }

    let tree = Tree { byte_order, nodes };
    check_links(&tree)?;
    Ok(tree)
}

/// Every child id must name a live node with exactly one parent, and the
/// root must be a group nobody links to.
fn check_links(tree: &Tree) -> Result<()> {
    tree.children(ROOT)
        .map_err(|_| Error::InvalidFormat("root is not a group".to_string()))?;

    let mut parents = vec![0_u32; tree.nodes.len()];
    for node in tree.nodes.iter().flatten() {
        if let NodeKind::Group(children) = &node.kind {
            for (name, &id) in children {
                tree.node(id)
                    .map_err(|_| Error::InvalidFormat(format!("member {name} links to #{id}")))?;
                let index = usize::try_from(id)
                    .map_err(|_| Error::InvalidFormat(format!("node id {id} out of range")))?;
                parents[index] += 1;
                if id == ROOT || parents[index] > 1 {
                    return Err(Error::InvalidFormat(format!(
                        "node #{id} is linked more than once"
                    )));
                }
            }
        }
    }
    Ok(())
}

fn len_u32(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| Error::InvalidFormat(format!("{len} entries exceed u32")))
}

/// Distinct descriptors in first-seen order.
#[derive(Default)]
struct TypeTable<'a> {
    order: Vec<&'a TypeDescriptor>,
    index: HashMap<&'a TypeDescriptor, u32>,
}

impl<'a> TypeTable<'a> {
    fn intern(&mut self, ty: &'a TypeDescriptor) {
        if !self.index.contains_key(ty) {
            #[allow(clippy::cast_possible_truncation)]
            self.index.insert(ty, self.order.len() as u32);
            self.order.push(ty);
        }
    }

    fn get(&self, ty: &TypeDescriptor) -> Result<u32> {
        self.index
            .get(ty)
            .copied()
            .ok_or_else(|| Error::InvalidFormat(format!("type {ty} missing from type table")))
    }
}

#[derive(Default)]
struct Writer {
    bytes: Vec<u8>,
}

impl Writer {
    fn u8(&mut self, value: u8) {
        self.bytes.push(value);
    }

    fn u16(&mut self, value: u16) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    fn u32(&mut self, value: u32) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    fn u64(&mut self, value: u64) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    fn size(&mut self, value: usize) {
        self.u64(value as u64);
    }

    fn str(&mut self, value: &str) -> Result<()> {
        self.u32(len_u32(value.len())?);
        self.bytes.extend_from_slice(value.as_bytes());
        Ok(())
    }

    fn block(&mut self, value: &[u8]) {
        self.size(value.len());
        self.bytes.extend_from_slice(value);
    }

    fn descriptor(&mut self, ty: &TypeDescriptor) -> Result<()> {
        match ty {
            TypeDescriptor::Integer(int) => {
                self.u8(TYPE_INTEGER);
                self.integer(*int);
            }
            TypeDescriptor::Float(float) => {
                self.u8(TYPE_FLOAT);
                #[allow(clippy::cast_possible_truncation)]
                self.u8(float.size() as u8);
            }
            TypeDescriptor::Enum(en) => {
                self.u8(TYPE_ENUM);
                self.integer(en.base());
                self.u32(len_u32(en.members().len())?);
                for member in en.members() {
                    self.str(&member.name)?;
                    self.u64(member.value);
                }
            }
            TypeDescriptor::Compound(compound) => {
                self.u8(TYPE_COMPOUND);
                self.size(compound.size());
                self.u32(len_u32(compound.fields().len())?);
                for field in compound.fields() {
                    self.str(&field.name)?;
                    self.size(field.offset);
                    self.descriptor(&field.ty)?;
                }
            }
            TypeDescriptor::FixedArray { element, len } => {
                self.u8(TYPE_ARRAY);
                self.size(*len);
                self.descriptor(element)?;
            }
            TypeDescriptor::VariableString => self.u8(TYPE_STRING),
            TypeDescriptor::Opaque { size, tag } => {
                self.u8(TYPE_OPAQUE);
                self.size(*size);
                self.str(tag)?;
            }
            TypeDescriptor::Reference => self.u8(TYPE_REFERENCE),
        }
        Ok(())
    }

    #[allow(clippy::cast_possible_truncation)]
    fn integer(&mut self, ty: IntegerType) {
        self.u8(ty.size() as u8);
        self.u8(u8::from(ty.is_signed()));
    }

    fn payload(&mut self, payload: &Payload, types: &TypeTable<'_>) -> Result<()> {
        self.u32(types.get(&payload.dtype)?);
        self.u32(len_u32(payload.shape.len())?);
        for &dim in &payload.shape {
            self.size(dim);
        }
        self.block(&payload.data);
        self.block(&payload.heap);
        Ok(())
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| {
                Error::InvalidFormat(format!(
                    "truncated: need {len} bytes at offset {}",
                    self.pos
                ))
            })?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0_u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.array::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    fn size(&mut self) -> Result<usize> {
        let value = self.u64()?;
        usize::try_from(value)
            .map_err(|_| Error::InvalidFormat(format!("size {value} exceeds address space")))
    }

    /// A count that must be backed by at least one byte per entry.
    fn count_u64(&mut self) -> Result<usize> {
        let count = self.size()?;
        if count > self.bytes.len() - self.pos {
            return Err(Error::InvalidFormat(format!(
                "count {count} exceeds remaining input"
            )));
        }
        Ok(count)
    }

    fn str(&mut self) -> Result<String> {
        let len = self.u32()? as usize;
        let raw = self.take(len)?;
        String::from_utf8(raw.to_vec())
            .map_err(|_| Error::InvalidFormat("name is not UTF-8".to_string()))
    }

    fn block(&mut self) -> Result<Vec<u8>> {
        let len = self.size()?;
        Ok(self.take(len)?.to_vec())
    }

    fn integer(&mut self) -> Result<IntegerType> {
        let size = usize::from(self.u8()?);
        let signed = match self.u8()? {
            0 => false,
            1 => true,
            flag => return Err(Error::InvalidFormat(format!("bad sign flag {flag}"))),
        };
        IntegerType::new(size, signed)
    }

    fn descriptor(&mut self, depth: usize) -> Result<TypeDescriptor> {
        if depth > MAX_TYPE_DEPTH {
            return Err(Error::InvalidFormat("type nesting too deep".to_string()));
        }
        let ty = match self.u8()? {
            TYPE_INTEGER => TypeDescriptor::Integer(self.integer()?),
            TYPE_FLOAT => TypeDescriptor::Float(FloatType::new(usize::from(self.u8()?))?),
            TYPE_ENUM => {
                let base = self.integer()?;
                let mut members = Vec::new();
                for _ in 0..self.u32()? {
                    let name = self.str()?;
                    let value = self.u64()?;
                    members.push(EnumMember { name, value });
                }
                TypeDescriptor::Enum(EnumType::from_raw(base, members).map_err(corrupt_type)?)
            }
            TYPE_COMPOUND => {
                let size = self.size()?;
                let mut fields = Vec::new();
                for _ in 0..self.u32()? {
                    let name = self.str()?;
                    let offset = self.size()?;
                    let ty = self.descriptor(depth + 1)?;
                    fields.push(CompoundField::new(name, ty, offset));
                }
                TypeDescriptor::Compound(
                    CompoundType::with_size(fields, size).map_err(corrupt_type)?,
                )
            }
            TYPE_ARRAY => {
                let len = self.size()?;
                let element = self.descriptor(depth + 1)?;
                TypeDescriptor::fixed_array(element, len).map_err(corrupt_type)?
            }
            TYPE_STRING => TypeDescriptor::VariableString,
            TYPE_OPAQUE => {
                let size = self.size()?;
                let tag = self.str()?;
                TypeDescriptor::Opaque { size, tag }
            }
            TYPE_REFERENCE => TypeDescriptor::Reference,
            tag => return Err(Error::InvalidFormat(format!("unknown type class {tag}"))),
        };
        Ok(ty)
    }

    fn payload(&mut self, types: &[Arc<TypeDescriptor>]) -> Result<Payload> {
        let index = self.u32()? as usize;
        let dtype = types
            .get(index)
            .cloned()
            .ok_or_else(|| Error::InvalidFormat(format!("type index {index} out of range")))?;
        let rank = self.u32()? as usize;
        let mut shape = Vec::new();
        for _ in 0..rank {
            shape.push(self.size()?);
        }
        let data = self.block()?;
        let heap = self.block()?;

        let expected = shape
            .iter()
            .try_fold(dtype.size(), |acc, &dim| acc.checked_mul(dim));
        if expected != Some(data.len()) {
            return Err(Error::InvalidFormat(format!(
                "payload of {} bytes does not fit shape {shape:?} of {dtype}",
                data.len()
            )));
        }
        Ok(Payload {
            dtype,
            shape,
            data,
            heap,
        })
    }
}

/// A stored descriptor that fails validation means the file is damaged.
fn corrupt_type(err: Error) -> Error {
    match err {
        Error::InvalidTypeDescriptor(msg) => Error::InvalidFormat(format!("stored type: {msg}")),
        other => other,
    }
}
