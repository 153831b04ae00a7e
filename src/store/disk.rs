use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use super::{CredentialRecord, RegistryBackend, StoreError};

pub const REGISTRY_FILE: &str = "registry.cbor";
const FORMAT_VERSION: u8 = 1;

#[derive(Deserialize)]
struct RegistryFile {
    version: u8,
    records: Vec<CredentialRecord>,
}

#[derive(Serialize)]
struct RegistryFileRef<'a> {
    version: u8,
    records: &'a [CredentialRecord],
}

/// Whole-registry CBOR file, replaced via temp file + rename.
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    /// Backend storing `dir/registry.cbor`. The directory must exist.
    pub fn new(dir: &Path) -> Self {
        Self {
            path: dir.join(REGISTRY_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn quarantine_path(&self) -> PathBuf {
        self.path.with_extension("cbor.corrupt")
    }

    /// Move an undecodable file aside so the next write does not destroy it.
    fn quarantine(&self) {
        let target = self.quarantine_path();
        match std::fs::rename(&self.path, &target) {
            Ok(()) => tracing::warn!(path = %target.display(), "Moved corrupt registry file aside"),
            Err(e) => tracing::warn!(path = %self.path.display(), error = %e, "Could not move corrupt registry file"),
        }
    }
}

/// Flush the directory entry so the rename itself survives a power loss.
#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<(), StoreError> {
    std::fs::File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<(), StoreError> {
    Ok(())
}

impl RegistryBackend for FileBackend {
    fn read(&self) -> Result<Option<Vec<CredentialRecord>>, StoreError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let file: RegistryFile = match ciborium::from_reader(bytes.as_slice()) {
            Ok(file) => file,
            Err(e) => {
                self.quarantine();
                return Err(StoreError::Corrupt(e.to_string()));
            }
        };
        if file.version != FORMAT_VERSION {
            self.quarantine();
            return Err(StoreError::Corrupt(format!(
                "unsupported format version {}",
                file.version
            )));
        }
        Ok(Some(file.records))
    }

    fn replace(&self, records: &[CredentialRecord]) -> Result<(), StoreError> {
        let mut buf = Vec::new();
        ciborium::into_writer(
            &RegistryFileRef {
                version: FORMAT_VERSION,
                records,
            },
            &mut buf,
        )
        .map_err(|e| StoreError::Serialization(e.to_string()))?;

        // Same directory as the target so the rename never crosses filesystems.
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&buf)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)
            .map_err(|e| StoreError::Persist(e.error.to_string()))?;
        // The new contents are already in place; failing here would leave
        // memory behind disk.
        if let Err(e) = sync_dir(dir) {
            tracing::warn!(path = %dir.display(), error = %e, "Could not sync registry directory");
        }
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
