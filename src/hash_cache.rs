use std::{
    collections::BTreeSet,
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::Context;
use sha1::{Digest, Sha1};

/// Hex SHA-1 of an index page as fetched, the form existing hash files hold.
pub fn content_hash(bytes: &[u8]) -> String {
    format!("{:x}", Sha1::digest(bytes))
}

/// Hashes of index pages that were already processed, one per line on disk.
#[derive(Debug)]
pub struct HashCache {
    path: PathBuf,
    hashes: BTreeSet<String>,
}

impl HashCache {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let hashes = match fs::read_to_string(path) {
            Ok(contents) => contents
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(String::from)
                .collect(),
            Err(e) if e.kind() == ErrorKind::NotFound => BTreeSet::new(),
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", path.display()));
            }
        };
        Ok(Self {
            path: path.to_path_buf(),
            hashes,
        })
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.hashes.contains(hash)
    }

    pub fn insert(&mut self, hash: String) -> bool {
        self.hashes.insert(hash)
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn save(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let contents = self.hashes.iter().cloned().collect::<Vec<_>>().join("\n");
        fs::write(&self.path, contents)
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        Ok(())
    }
}
