//! Commit records and their box encoding.
//!
//! ```text
//! plain:     Ref(tree) varint(n) Ref(parent)*n varint(len) message
//! signature: ExtensionBuffer { 0: key id, 1: signature }
//! ```
//!
//! The box is the plain part followed by the signature extension, which is
//! empty for unsigned commits. The plain hash is the digest of the plain part
//! alone.

use std::sync::Arc;

use sheaf_crypto::{CommitSigner, CommitVerifier, HashAlgorithm};
use sheaf_format::{
    read_varint, write_varint, ByteReader, ChunkingConfig, ContainerType, ExtensionBuffer, Ref,
};
use sheaf_store::ChunkAccessor;
use sheaf_tree::{Container, RandomDataAccess};
use sheaf_types::Hash;
use tracing::debug;

use crate::error::{DagError, DagResult};

const TAG_KEY_ID: u64 = 0;
const TAG_SIGNATURE: u64 = 1;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitSignature {
    pub key_id: Vec<u8>,
    pub signature: Vec<u8>,
}

/// An immutable snapshot: a tree plus the commits it follows.
///
/// No parents means a root commit; two or more means a merge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Commit {
    pub tree: Ref,
    pub parents: Vec<Ref>,
    pub message: Vec<u8>,
    pub signature: Option<CommitSignature>,
}

impl Commit {
    pub fn new(tree: Ref, parents: Vec<Ref>, message: impl Into<Vec<u8>>) -> Self {
        Self {
            tree,
            parents,
            message: message.into(),
            signature: None,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }

    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }

    /// First line of the message, lossily decoded.
    pub fn summary(&self) -> String {
        let text = String::from_utf8_lossy(&self.message);
        text.lines().next().unwrap_or_default().to_string()
    }

    /// The signed portion: tree, parents and message.
    pub fn plain_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(128 * (1 + self.parents.len()) + self.message.len());
        self.tree.encode(&mut buf);
        write_varint(&mut buf, self.parents.len() as u64);
        for parent in &self.parents {
            parent.encode(&mut buf);
        }
        write_varint(&mut buf, self.message.len() as u64);
        buf.extend_from_slice(&self.message);
        buf
    }

    /// Commit identity.
    pub fn plain_hash(&self, algorithm: HashAlgorithm) -> Hash {
        algorithm.digest(&self.plain_bytes())
    }

    pub fn sign(&mut self, signer: &dyn CommitSigner) {
        self.signature = Some(CommitSignature {
            key_id: signer.key_id(),
            signature: signer.sign_commit(&self.plain_bytes()),
        });
    }

    pub fn verify(&self, verifier: &dyn CommitVerifier) -> DagResult<()> {
        let sig = self.signature.as_ref().ok_or(DagError::Unsigned)?;
        verifier.verify_commit(&sig.key_id, &self.plain_bytes(), &sig.signature)?;
        Ok(())
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = self.plain_bytes();
        let mut ext = ExtensionBuffer::new();
        if let Some(sig) = &self.signature {
            ext.put_bytes(TAG_KEY_ID, sig.key_id.clone());
            ext.put_bytes(TAG_SIGNATURE, sig.signature.clone());
        }
        ext.encode(&mut buf);
        buf
    }

    pub fn decode(bytes: &[u8]) -> DagResult<Self> {
        let mut reader = ByteReader::new(bytes);
        let tree = Ref::decode(&mut reader)?;
        let count = read_varint(&mut reader)?;
        let mut parents = Vec::new();
        for _ in 0..count {
            parents.push(Ref::decode(&mut reader)?);
        }
        let len = read_varint(&mut reader)?;
        let message = reader.read_bytes(len as usize)?.to_vec();
        let ext = ExtensionBuffer::decode(&mut reader)?;
        reader.expect_end()?;

        let signature = match (ext.get_bytes(TAG_KEY_ID), ext.get_bytes(TAG_SIGNATURE)) {
            (Some(key_id), Some(signature)) => Some(CommitSignature {
                key_id: key_id.to_vec(),
                signature: signature.to_vec(),
            }),
            _ => None,
        };
        Ok(Self {
            tree,
            parents,
            message,
            signature,
        })
    }
}

/// Store `commit` as a commit container and publish its ref.
pub fn write_commit(
    accessor: Arc<dyn ChunkAccessor>,
    chunking: ChunkingConfig,
    commit: &Commit,
) -> DagResult<Ref> {
    let mut container = Container::new(accessor, ContainerType::Commit, chunking)?;
    container.append(&commit.encode())?;
    let r = container.to_ref()?;
    debug!(
        commit = %commit.plain_hash(container.hash_algorithm()).short_hex(),
        parents = commit.parents.len(),
        "wrote commit"
    );
    Ok(r)
}

/// Load the commit behind `r`.
pub fn read_commit(accessor: Arc<dyn ChunkAccessor>, r: &Ref) -> DagResult<Commit> {
    let container_type = r.header().container_type;
    if container_type != ContainerType::Commit {
        return Err(DagError::NotACommit(container_type));
    }
    let bytes = RandomDataAccess::new(Container::read(accessor, r)?).read_to_end()?;
    Commit::decode(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sheaf_crypto::{Ed25519Verifier, SigningKey};
    use sheaf_format::{CompressionType, DataPart, Header};
    use sheaf_store::{BoxChunkAccessor, InMemoryChunkStore};

    fn accessor() -> Arc<dyn ChunkAccessor> {
        Arc::new(BoxChunkAccessor::new(
            Arc::new(InMemoryChunkStore::new()),
            HashAlgorithm::Blake3,
            CompressionType::Zstd,
        ))
    }

    fn tree_ref(seed: u8) -> Ref {
        let header = Header::new(ContainerType::Directory, ChunkingConfig::default(), HashAlgorithm::Blake3);
        Ref {
            data: DataPart {
                data_hash: Hash::from_hash([seed; 32]),
                header,
            },
            ..Ref::default()
        }
    }

    #[test]
    fn encode_decode_with_parents() {
        let mut commit = Commit::new(tree_ref(1), vec![tree_ref(2), tree_ref(3)], "merge\nbody");
        assert!(commit.is_merge());
        assert_eq!(Commit::decode(&commit.encode()).unwrap(), commit);
        commit.signature = Some(CommitSignature {
            key_id: vec![1; 32],
            signature: vec![2; 64],
        });
        assert_eq!(Commit::decode(&commit.encode()).unwrap(), commit);
        assert_eq!(commit.summary(), "merge");
    }

    #[test]
    fn plain_hash_ignores_signature() {
        let unsigned = Commit::new(tree_ref(1), Vec::new(), "root");
        let mut signed = unsigned.clone();
        signed.sign(&SigningKey::generate());
        assert_ne!(unsigned.encode(), signed.encode());
        assert_eq!(
            unsigned.plain_hash(HashAlgorithm::Blake3),
            signed.plain_hash(HashAlgorithm::Blake3)
        );
    }

    #[test]
    fn signature_verifies_and_detects_tamper() {
        let mut commit = Commit::new(tree_ref(1), Vec::new(), "signed");
        assert!(matches!(commit.verify(&Ed25519Verifier), Err(DagError::Unsigned)));
        commit.sign(&SigningKey::generate());
        commit.verify(&Ed25519Verifier).unwrap();
        commit.message = b"forged".to_vec();
        assert!(matches!(commit.verify(&Ed25519Verifier), Err(DagError::Signature(_))));
    }

    #[test]
    fn trailing_bytes_rejected() {
        let mut bytes = Commit::new(tree_ref(1), Vec::new(), "x").encode();
        bytes.push(0);
        assert!(matches!(Commit::decode(&bytes), Err(DagError::Decode(_))));
    }

    #[test]
    fn stored_commit_roundtrip() {
        let acc = accessor();
        let commit = Commit::new(tree_ref(9), vec![tree_ref(8)], "hello");
        let r = write_commit(Arc::clone(&acc), ChunkingConfig::default(), &commit).unwrap();
        assert_eq!(r.header().container_type, ContainerType::Commit);
        assert_eq!(read_commit(acc, &r).unwrap(), commit);
    }

    #[test]
    fn non_commit_ref_rejected() {
        assert!(matches!(
            read_commit(accessor(), &tree_ref(1)),
            Err(DagError::NotACommit(ContainerType::Directory))
        ));
    }
}
