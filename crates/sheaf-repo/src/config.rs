//! Repository configuration, loadable from TOML.
//!
//! ```toml
//! branch = "master"
//! hash_algorithm = "blake3"
//! compression = "zstd"
//! merge_preference = "theirs"
//!
//! [chunking]
//! kind = "rabin"
//! target = 8192
//! min = 2048
//! max = 65536
//!
//! [cache]
//! target_capacity = 10
//! trigger_capacity = 15
//! kept_metadata_levels = 2
//! ```
//!
//! Every key is optional.

use std::path::Path;

use serde::{Deserialize, Serialize};
use sheaf_crypto::HashAlgorithm;
use sheaf_format::{ChunkingConfig, CompressionType};
use sheaf_merge::Preference;
use sheaf_refs::validate_branch_name;
use sheaf_tree::CacheConfig;

use crate::error::{RepoError, RepoResult};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// Branch whose log this repository appends to.
    pub branch: String,
    pub hash_algorithm: HashAlgorithm,
    pub compression: CompressionType,
    /// Side that wins conflicting file edits in the default merge.
    pub merge_preference: Preference,
    pub chunking: ChunkingConfig,
    pub cache: CacheConfig,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            branch: "master".to_string(),
            hash_algorithm: HashAlgorithm::Blake3,
            compression: CompressionType::Zstd,
            merge_preference: Preference::Theirs,
            chunking: ChunkingConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl RepositoryConfig {
    pub fn from_toml_str(text: &str) -> RepoResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> RepoResult<Self> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    pub fn to_toml_string(&self) -> RepoResult<String> {
        Ok(toml::to_string(self)?)
    }

    pub fn validate(&self) -> RepoResult<()> {
        validate_branch_name(&self.branch)?;
        self.chunking
            .validate()
            .map_err(|e| RepoError::InvalidConfig(e.to_string()))?;
        if self.cache.target_capacity == 0 {
            return Err(RepoError::InvalidConfig("cache target_capacity must be > 0".into()));
        }
        Ok(())
    }
}
