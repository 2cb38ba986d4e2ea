use std::path::Path;

use anyhow::Context;
use cilmixin::Module;

/// Read a module image from disk.
pub fn load_module(path: &Path) -> anyhow::Result<Module> {
    Module::from_file(path).with_context(|| format!("failed to load module: {}", path.display()))
}

/// Read a module image as raw bytes.
pub fn read_image(path: &Path) -> anyhow::Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("failed to read image: {}", path.display()))
}

/// Write an image, creating parent directories as needed.
pub fn write_image(path: &Path, data: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory: {}", parent.display()))?;
    }
    std::fs::write(path, data).with_context(|| format!("failed to write image: {}", path.display()))
}

/// Extract a display-friendly filename from a path.
pub fn file_display_name(path: &Path) -> String {
    path.file_name().map_or_else(
        || path.display().to_string(),
        |f| f.to_string_lossy().to_string(),
    )
}
