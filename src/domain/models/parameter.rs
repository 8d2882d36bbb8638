//! Parameter tree records, persisted as `{"files": [...], "dirs": [...]}`.

use serde::{Deserialize, Serialize};

use crate::domain::errors::{ParameterError, ParameterResult};

/// A virtual directory. `parent_id = None` means the root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directory {
    pub id: usize,
    pub parent_id: Option<usize>,
    pub name: String,
}

/// A named, multi-revision parameter file.
///
/// `revisions` only grows; `using_ver` always indexes into it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    pub id: usize,
    pub dir_id: Option<usize>,
    pub name: String,
    pub using_ver: usize,
    pub revisions: Vec<String>,
}

impl Component {
    /// Path of the revision currently in use.
    pub fn current_path(&self) -> &str {
        &self.revisions[self.using_ver]
    }
}

/// The whole parameter tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterDocument {
    #[serde(default)]
    pub files: Vec<Component>,
    #[serde(default)]
    pub dirs: Vec<Directory>,
}

impl ParameterDocument {
    /// Check id density, reference integrity and revision indices.
    pub fn validate(&self) -> ParameterResult<()> {
        for (index, dir) in self.dirs.iter().enumerate() {
            if dir.id != index {
                return Err(ParameterError::DanglingReference(format!(
                    "directory at index {index} has id {}",
                    dir.id
                )));
            }
            if let Some(parent) = dir.parent_id {
                if parent >= self.dirs.len() {
                    return Err(ParameterError::DanglingReference(format!(
                        "directory {} has unknown parent {parent}",
                        dir.id
                    )));
                }
            }
        }
        for (index, file) in self.files.iter().enumerate() {
            if file.id != index {
                return Err(ParameterError::DanglingReference(format!(
                    "component at index {index} has id {}",
                    file.id
                )));
            }
            if let Some(dir_id) = file.dir_id {
                if dir_id >= self.dirs.len() {
                    return Err(ParameterError::DanglingReference(format!(
                        "component {} has unknown directory {dir_id}",
                        file.id
                    )));
                }
            }
            if file.using_ver >= file.revisions.len() {
                return Err(ParameterError::InvalidVersion {
                    comp_id: file.id,
                    using_ver: file.using_ver,
                    revisions: file.revisions.len(),
                });
            }
        }
        Ok(())
    }
}
