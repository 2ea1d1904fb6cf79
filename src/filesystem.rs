// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::audio::AudioError;

/// Supplies raw asset bytes by path.
pub trait Filesystem: Send + Sync {
    fn read_bytes(&self, path: &Path) -> Result<Vec<u8>, AudioError>;
}

/// Reads from the host filesystem, optionally relative to an asset root.
#[derive(Debug, Clone, Default)]
pub struct OsFilesystem {
    root: Option<PathBuf>,
}

impl OsFilesystem {
    /// Resolves relative paths against `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> OsFilesystem {
        OsFilesystem {
            root: Some(root.into()),
        }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }
}

impl Filesystem for OsFilesystem {
    fn read_bytes(&self, path: &Path) -> Result<Vec<u8>, AudioError> {
        Ok(fs::read(self.resolve(path))?)
    }
}
