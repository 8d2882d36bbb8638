//! Resource store port.

use std::path::PathBuf;

/// Read access to the content-addressed resource directory.
pub trait ResourceStore: Send + Sync {
    /// Full path of a resource, whether or not it exists.
    fn resource_path(&self, name: &str) -> PathBuf;

    /// True when the resource file exists.
    fn resource_exists(&self, name: &str) -> bool {
        self.resource_path(name).is_file()
    }

    /// Read the content of a resource.
    fn read_resource(&self, name: &str) -> std::io::Result<Vec<u8>> {
        std::fs::read(self.resource_path(name))
    }
}
