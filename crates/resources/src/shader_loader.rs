//! Shader bytecode sources.
//!
//! The renderer treats bytecode as an opaque blob; validation of the SPIR-V
//! header happens when the module is created.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{ResourceError, ResourceResult};

/// Anything that can hand out compiled shader bytecode by name.
pub trait ShaderSource {
    fn load_shader_bytecode(&self, path: &Path) -> ResourceResult<Vec<u8>>;
}

/// Loads bytecode from files under a root directory.
#[derive(Debug, Clone)]
pub struct ShaderDirectory {
    root: PathBuf,
}

impl ShaderDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ShaderSource for ShaderDirectory {
    /// Reads `root/path`. Absolute paths are used as given.
    fn load_shader_bytecode(&self, path: &Path) -> ResourceResult<Vec<u8>> {
        let full = self.root.join(path);
        let bytes = std::fs::read(&full).map_err(|source| ResourceError::Io {
            path: full.clone(),
            source,
        })?;
        debug!("Loaded {} bytes of shader bytecode from {}", bytes.len(), full.display());
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_relative_to_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("tri.vert.spv"), [3u8, 2, 35, 7]).unwrap();

        let source = ShaderDirectory::new(dir.path());
        let bytes = source
            .load_shader_bytecode(Path::new("tri.vert.spv"))
            .unwrap();
        assert_eq!(bytes, vec![3, 2, 35, 7]);
    }

    #[test]
    fn test_missing_file_reports_full_path() {
        let dir = tempfile::tempdir().unwrap();
        let source = ShaderDirectory::new(dir.path());

        let err = source
            .load_shader_bytecode(Path::new("absent.spv"))
            .unwrap_err();
        match err {
            ResourceError::Io { path, .. } => assert_eq!(path, dir.path().join("absent.spv")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
