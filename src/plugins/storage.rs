use crate::core::model::FetchMode;
use crate::plugins::registry::StorageResolver;
use std::io;
use std::path::PathBuf;

/// `<base>/audio` and `<base>/video`, created on demand.
#[derive(Debug, Clone)]
pub struct ModeDirStorage {
    base: PathBuf,
}

impl ModeDirStorage {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }
}

impl StorageResolver for ModeDirStorage {
    fn output_dir(&self, mode: FetchMode) -> io::Result<PathBuf> {
        let dir = self.base.join(mode.dir_name());
        std::fs::create_dir_all(&dir)?;
        let meta = std::fs::metadata(&dir)?;
        if meta.permissions().readonly() {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("{} is read-only", dir.display()),
            ));
        }
        Ok(dir)
    }
}
