use crate::error::{KspError, Result};
use crate::export::KeyName;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Writes exported blobs to `<dir>/<key name>.pem`, byte for byte.
///
/// The blob is written to a temporary file in the same directory and renamed
/// into place, so a failed write never leaves a partial `.pem` behind.
#[derive(Clone, Debug)]
pub struct PemFileSink {
    dir: PathBuf,
    overwrite: bool,
}

impl PemFileSink {
    pub fn new(dir: impl Into<PathBuf>, overwrite: bool) -> Self {
        Self {
            dir: dir.into(),
            overwrite,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn target(&self, name: &KeyName) -> PathBuf {
        self.dir.join(format!("{name}.pem"))
    }

    pub fn write(&self, name: &KeyName, blob: &[u8]) -> Result<PathBuf> {
        let path = self.target(name);
        if !self.overwrite && path.exists() {
            return Err(KspError::io(
                path,
                io::Error::new(io::ErrorKind::AlreadyExists, "file exists"),
            ));
        }

        let mut tmp = tempfile::Builder::new()
            .prefix(".cngexport-")
            .suffix(".tmp")
            .tempfile_in(&self.dir)
            .map_err(|e| KspError::io(&self.dir, e))?;
        tmp.write_all(blob).map_err(|e| KspError::io(tmp.path(), e))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| KspError::io(tmp.path(), e))?;

        let persisted = if self.overwrite {
            tmp.persist(&path)
        } else {
            tmp.persist_noclobber(&path)
        };
        persisted.map_err(|e| KspError::io(&path, e.error))?;
        tracing::info!(path = %path.display(), len = blob.len(), "key blob written");
        Ok(path)
    }
}
