//! Versioned parameter files organized in a virtual directory tree.
//!
//! The tree lives in memory and in a single JSON document. Every mutation
//! is checked against the current tree first, then applied to a copy which
//! is written atomically; the in-memory tree only changes once the write
//! succeeded.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::errors::{ParameterError, ParameterResult};
use crate::domain::models::{Component, Directory, ParameterDocument};
use crate::infrastructure::storage::{self, StorageError};

/// Arguments of [`ParameterStore::update_component`].
///
/// With `comp_id` set, at most one of `name` (rename), `using_ver` (rollback)
/// and `src_path` (new version) may be given. Without it the call creates a
/// component in `dir_id`, or adds a version when the name is already taken.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentUpdate {
    pub comp_id: Option<usize>,
    pub dir_id: Option<usize>,
    pub name: Option<String>,
    pub using_ver: Option<usize>,
    pub src_path: Option<PathBuf>,
}

/// A checked component mutation.
enum ComponentChange {
    Rename(usize, String),
    Rollback(usize, usize),
    NewVersion(usize),
    Unchanged(usize),
    Create { dir_id: Option<usize>, name: String },
}

/// The parameter tree plus the content-addressed files it points to.
///
/// Not synchronized; [`crate::UmpireEnv`] hands it out behind a mutex.
pub struct ParameterStore {
    document_path: PathBuf,
    parameters_dir: PathBuf,
    document: ParameterDocument,
}

impl ParameterStore {
    /// Load the parameter document, starting from an empty tree when the
    /// file does not exist yet.
    pub fn open(
        document_path: impl Into<PathBuf>,
        parameters_dir: impl Into<PathBuf>,
    ) -> ParameterResult<Self> {
        let document_path = document_path.into();
        let document = if document_path.exists() {
            let text = std::fs::read_to_string(&document_path).map_err(|source| {
                ParameterError::Io {
                    path: document_path.clone(),
                    source,
                }
            })?;
            let document: ParameterDocument = serde_json::from_str(&text)?;
            document.validate()?;
            document
        } else {
            ParameterDocument::default()
        };
        Ok(Self {
            document_path,
            parameters_dir: parameters_dir.into(),
            document,
        })
    }

    /// The whole tree.
    pub fn info(&self) -> &ParameterDocument {
        &self.document
    }

    pub fn component(&self, comp_id: usize) -> Option<&Component> {
        self.document.files.get(comp_id)
    }

    pub fn directory(&self, dir_id: usize) -> Option<&Directory> {
        self.document.dirs.get(dir_id)
    }

    /// `<parameters_dir>/<file name>.<md5 of content>`.
    pub fn get_parameter_dst_path(&self, src_path: &Path) -> ParameterResult<PathBuf> {
        let name = storage::content_addressed_name(src_path).map_err(storage_error)?;
        Ok(self.parameters_dir.join(name))
    }

    /// Copy `src_path` into the parameters directory. Re-adding identical
    /// content is a no-op.
    pub fn add_parameter_file(&self, src_path: &Path) -> ParameterResult<PathBuf> {
        let dst_path = self.get_parameter_dst_path(src_path)?;
        if dst_path.exists() {
            return Ok(dst_path);
        }
        let contents = std::fs::read(src_path).map_err(|source| ParameterError::Io {
            path: src_path.to_path_buf(),
            source,
        })?;
        storage::atomic_write(&dst_path, &contents).map_err(storage_error)?;
        info!(src = %src_path.display(), dst = %dst_path.display(), "parameter file added");
        Ok(dst_path)
    }

    /// Create, rename, roll back or add a version to a component.
    pub fn update_component(&mut self, update: ComponentUpdate) -> ParameterResult<Component> {
        let change = self.plan_component_change(&update)?;
        let dst_path = match &update.src_path {
            Some(src) => Some(self.add_parameter_file(src)?.to_string_lossy().into_owned()),
            None => None,
        };

        let mut next = self.document.clone();
        let comp_id = match change {
            ComponentChange::Rename(id, name) => {
                next.files[id].name = name;
                id
            }
            ComponentChange::Rollback(id, using_ver) => {
                next.files[id].using_ver = using_ver;
                id
            }
            ComponentChange::NewVersion(id) => {
                let file = &mut next.files[id];
                file.revisions.extend(dst_path);
                file.using_ver = file.revisions.len() - 1;
                id
            }
            ComponentChange::Unchanged(id) => id,
            ComponentChange::Create { dir_id, name } => {
                let id = next.files.len();
                next.files.push(Component {
                    id,
                    dir_id,
                    name,
                    using_ver: 0,
                    revisions: dst_path.into_iter().collect(),
                });
                id
            }
        };
        self.commit(next)?;

        let component = self.document.files[comp_id].clone();
        info!(
            comp_id,
            name = %component.name,
            using_ver = component.using_ver,
            revisions = component.revisions.len(),
            "parameter component updated"
        );
        Ok(component)
    }

    fn plan_component_change(&self, update: &ComponentUpdate) -> ParameterResult<ComponentChange> {
        if let Some(comp_id) = update.comp_id {
            let component = self
                .component(comp_id)
                .ok_or(ParameterError::ComponentNotFound(comp_id))?;
            let rename = update
                .name
                .as_ref()
                .filter(|name| **name != component.name);
            if let Some(name) = rename {
                if self.find_component(component.dir_id, name).is_some() {
                    return Err(ParameterError::DuplicateComponentName {
                        name: name.clone(),
                        dir_id: component.dir_id,
                    });
                }
            }
            return Self::plan_existing(component, rename.cloned(), update);
        }

        let name = update
            .name
            .clone()
            .ok_or(ParameterError::MissingName("component"))?;
        if let Some(dir_id) = update.dir_id {
            self.directory(dir_id)
                .ok_or(ParameterError::DirectoryNotFound(dir_id))?;
        }
        if let Some(existing) = self.find_component(update.dir_id, &name) {
            // Same name in the same directory: treated as a new version.
            return Self::plan_existing(existing, None, update);
        }
        if update.using_ver.is_some() {
            return Err(ParameterError::UsingVersionOnCreate);
        }
        if update.src_path.is_none() {
            return Err(ParameterError::MissingSource(name));
        }
        Ok(ComponentChange::Create {
            dir_id: update.dir_id,
            name,
        })
    }

    fn plan_existing(
        component: &Component,
        rename: Option<String>,
        update: &ComponentUpdate,
    ) -> ParameterResult<ComponentChange> {
        let requested = [
            rename.is_some(),
            update.using_ver.is_some(),
            update.src_path.is_some(),
        ];
        if requested.iter().filter(|r| **r).count() > 1 {
            return Err(ParameterError::MultipleOperations);
        }
        if update.src_path.is_some() {
            return Ok(ComponentChange::NewVersion(component.id));
        }
        if let Some(using_ver) = update.using_ver {
            if using_ver >= component.revisions.len() {
                return Err(ParameterError::InvalidVersion {
                    comp_id: component.id,
                    using_ver,
                    revisions: component.revisions.len(),
                });
            }
            return Ok(ComponentChange::Rollback(component.id, using_ver));
        }
        Ok(match rename {
            Some(name) => ComponentChange::Rename(component.id, name),
            None => ComponentChange::Unchanged(component.id),
        })
    }

    /// Create or rename a directory.
    ///
    /// Creating a directory whose name already exists under `parent_id`
    /// returns the existing one unchanged.
    pub fn update_directory(
        &mut self,
        dir_id: Option<usize>,
        parent_id: Option<usize>,
        name: &str,
    ) -> ParameterResult<Directory> {
        if name.is_empty() {
            return Err(ParameterError::MissingName("directory"));
        }

        if let Some(dir_id) = dir_id {
            let directory = self
                .directory(dir_id)
                .ok_or(ParameterError::DirectoryNotFound(dir_id))?;
            if directory.name == name {
                return Ok(directory.clone());
            }
            if self.find_child_dir(directory.parent_id, name).is_some() {
                return Err(ParameterError::DuplicateDirectoryName {
                    name: name.to_string(),
                    parent_id: directory.parent_id,
                });
            }
            let mut next = self.document.clone();
            next.dirs[dir_id].name = name.to_string();
            self.commit(next)?;
            info!(dir_id, name, "parameter directory renamed");
            return Ok(self.document.dirs[dir_id].clone());
        }

        if let Some(parent) = parent_id {
            self.directory(parent)
                .ok_or(ParameterError::DirectoryNotFound(parent))?;
        }
        if let Some(existing) = self.find_child_dir(parent_id, name) {
            return Ok(existing.clone());
        }
        let mut next = self.document.clone();
        let id = next.dirs.len();
        next.dirs.push(Directory {
            id,
            parent_id,
            name: name.to_string(),
        });
        self.commit(next)?;
        info!(dir_id = id, ?parent_id, name, "parameter directory created");
        Ok(self.document.dirs[id].clone())
    }

    /// `(name, path in use)` of the components under `namespace`, a
    /// `/`-separated directory path (`None` or empty for the root).
    ///
    /// An unknown namespace yields an empty list.
    pub fn query_parameters(
        &self,
        namespace: Option<&str>,
        name: Option<&str>,
    ) -> Vec<(String, PathBuf)> {
        let Some(dir_id) = self.resolve_namespace(namespace) else {
            warn!(?namespace, "intend to request non-existent namespace");
            return Vec::new();
        };
        self.document
            .files
            .iter()
            .filter(|f| f.dir_id == dir_id)
            .filter(|f| name.is_none_or(|n| f.name == n))
            .map(|f| (f.name.clone(), PathBuf::from(f.current_path())))
            .collect()
    }

    /// `Some(None)` is the root; `None` means the path does not resolve.
    fn resolve_namespace(&self, namespace: Option<&str>) -> Option<Option<usize>> {
        let namespace = namespace.unwrap_or_default().trim_matches('/');
        if namespace.is_empty() {
            return Some(None);
        }
        let mut current = None;
        for segment in namespace.split('/') {
            current = Some(self.find_child_dir(current, segment)?.id);
        }
        Some(current)
    }

    fn find_component(&self, dir_id: Option<usize>, name: &str) -> Option<&Component> {
        self.document
            .files
            .iter()
            .find(|f| f.dir_id == dir_id && f.name == name)
    }

    fn find_child_dir(&self, parent_id: Option<usize>, name: &str) -> Option<&Directory> {
        self.document
            .dirs
            .iter()
            .find(|d| d.parent_id == parent_id && d.name == name)
    }

    fn commit(&mut self, next: ParameterDocument) -> ParameterResult<()> {
        let text = serde_json::to_vec_pretty(&next)?;
        storage::atomic_write(&self.document_path, &text).map_err(storage_error)?;
        self.document = next;
        Ok(())
    }
}

fn storage_error(err: StorageError) -> ParameterError {
    match err {
        StorageError::Io { path, source } => ParameterError::Io { path, source },
        StorageError::Collision { dst, .. } => ParameterError::Io {
            path: dst,
            source: std::io::Error::from(std::io::ErrorKind::AlreadyExists),
        },
    }
}
