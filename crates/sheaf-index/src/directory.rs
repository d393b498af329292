//! Directory boxes.
//!
//! A directory is one flat map from name to entry, stored as the byte stream
//! of a `Directory` container:
//!
//! ```text
//! varint(count)
//! per entry, sorted by name:
//!   varint(name_len) name  u8(flags)  Ref(data)  varint(n) Ref(attribute)*n
//! ```
//!
//! Flag bit 0 marks a file. Subdirectories are decoded only when a path
//! walk first enters them and stay cached on their entry while edited.

use std::collections::BTreeMap;
use std::sync::Arc;

use sheaf_format::{read_varint, write_varint, ByteReader, ChunkingConfig, ContainerType, FormatError, Ref};
use sheaf_store::ChunkAccessor;
use sheaf_tree::{Container, RandomDataAccess};
use tracing::debug;

use crate::error::{IndexError, IndexResult};

const FLAG_FILE: u8 = 0b1;

/// What a name in a directory points at.
#[derive(Clone, Debug)]
pub struct DirectoryEntry {
    pub is_file: bool,
    /// The file's data container, or the subdirectory's directory container.
    pub data: Ref,
    pub attributes: Vec<Ref>,
    /// Decoded subdirectory, resident once entered.
    pub(crate) child: Option<Box<DirectoryBox>>,
}

impl DirectoryEntry {
    pub fn file(data: Ref) -> Self {
        Self {
            is_file: true,
            data,
            attributes: Vec::new(),
            child: None,
        }
    }

    pub fn directory(data: Ref) -> Self {
        Self {
            is_file: false,
            data,
            attributes: Vec::new(),
            child: None,
        }
    }

    /// A new subdirectory that exists only in memory until built.
    pub(crate) fn new_directory() -> Self {
        let mut dir = DirectoryBox::new();
        dir.dirty = true;
        Self {
            is_file: false,
            data: Ref::default(),
            attributes: Vec::new(),
            child: Some(Box::new(dir)),
        }
    }

    /// The subdirectory behind this entry, loading it on first use.
    pub(crate) fn load_dir(
        &mut self,
        accessor: &Arc<dyn ChunkAccessor>,
    ) -> IndexResult<&mut DirectoryBox> {
        let child = match self.child.take() {
            Some(child) => child,
            None => Box::new(read_directory(Arc::clone(accessor), &self.data)?),
        };
        let dir: &mut DirectoryBox = self.child.insert(child);
        Ok(dir)
    }
}

impl PartialEq for DirectoryEntry {
    fn eq(&self, other: &Self) -> bool {
        self.is_file == other.is_file && self.data == other.data && self.attributes == other.attributes
    }
}

impl Eq for DirectoryEntry {}

/// One directory level.
#[derive(Clone, Debug, Default)]
pub struct DirectoryBox {
    pub(crate) entries: BTreeMap<String, DirectoryEntry>,
    /// Changed since it was last built, here or below.
    pub(crate) dirty: bool,
}

impl DirectoryBox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn get(&self, name: &str) -> Option<&DirectoryEntry> {
        self.entries.get(name)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &DirectoryEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn insert(&mut self, name: &str, entry: DirectoryEntry) -> IndexResult<Option<DirectoryEntry>> {
        validate_name(name)?;
        self.dirty = true;
        Ok(self.entries.insert(name.to_string(), entry))
    }

    pub fn remove(&mut self, name: &str) -> Option<DirectoryEntry> {
        let removed = self.entries.remove(name);
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        write_varint(&mut buf, self.entries.len() as u64);
        for (name, entry) in &self.entries {
            write_varint(&mut buf, name.len() as u64);
            buf.extend_from_slice(name.as_bytes());
            buf.push(if entry.is_file { FLAG_FILE } else { 0 });
            entry.data.encode(&mut buf);
            write_varint(&mut buf, entry.attributes.len() as u64);
            for attribute in &entry.attributes {
                attribute.encode(&mut buf);
            }
        }
        buf
    }

    pub fn decode(bytes: &[u8]) -> IndexResult<Self> {
        let mut reader = ByteReader::new(bytes);
        let count = read_varint(&mut reader)?;
        let mut entries = BTreeMap::new();
        for _ in 0..count {
            let len = read_varint(&mut reader)? as usize;
            let name = std::str::from_utf8(reader.read_bytes(len)?)
                .map_err(|e| FormatError::MalformedText(e.to_string()))?
                .to_string();
            let is_file = reader.read_u8()? & FLAG_FILE != 0;
            let data = Ref::decode(&mut reader)?;
            let attribute_count = read_varint(&mut reader)?;
            let mut attributes = Vec::new();
            for _ in 0..attribute_count {
                attributes.push(Ref::decode(&mut reader)?);
            }
            entries.insert(
                name,
                DirectoryEntry {
                    is_file,
                    data,
                    attributes,
                    child: None,
                },
            );
        }
        reader.expect_end()?;
        Ok(Self { entries, dirty: false })
    }
}

/// A single path component.
pub fn validate_name(name: &str) -> IndexResult<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') {
        return Err(IndexError::InvalidPath(name.to_string()));
    }
    Ok(())
}

/// Load the directory behind `r`.
pub fn read_directory(accessor: Arc<dyn ChunkAccessor>, r: &Ref) -> IndexResult<DirectoryBox> {
    let container_type = r.header().container_type;
    if container_type != ContainerType::Directory {
        return Err(IndexError::WrongContainer(container_type));
    }
    let bytes = RandomDataAccess::new(Container::read(accessor, r)?).read_to_end()?;
    DirectoryBox::decode(&bytes)
}

/// Store `dir` as it is now, ignoring resident children.
pub fn write_directory(
    accessor: Arc<dyn ChunkAccessor>,
    chunking: ChunkingConfig,
    dir: &DirectoryBox,
) -> IndexResult<Ref> {
    let mut container = Container::new(accessor, ContainerType::Directory, chunking)?;
    container.append(&dir.encode())?;
    let r = container.to_ref()?;
    debug!(entries = dir.len(), data_hash = %r.data_hash().short_hex(), "wrote directory");
    Ok(r)
}
