use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use lazy_static::lazy_static;

lazy_static! {
    // serializes appends from the parallel sweep workers
    static ref FILE_MUTEX: Mutex<()> = Mutex::new(());
}

/// Create every missing directory above `path`, so that a file can be written at `path`.
pub fn ensure_parent_dir<P: AsRef<Path>>(path: P) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            log::debug!("creating directory {:?}", parent);
            std::fs::create_dir_all(parent)
                .with_context(|| format!("fail to create directory {:?}", parent))?;
        }
    }
    Ok(())
}

pub fn open_with_create_append<P: AsRef<Path>>(path: P) -> Result<std::fs::File> {
    std::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(&path)
        .with_context(|| format!("fail to open or create {:?}", path.as_ref()))
}

pub fn append_to_file<P: AsRef<Path>>(filename: P, content: &str) -> Result<()> {
    let _file_mutex = FILE_MUTEX.lock().unwrap_or_else(|e| e.into_inner());

    ensure_parent_dir(&filename)?;
    let mut f = open_with_create_append(&filename)?;
    writeln!(f, "{}", content)
        .with_context(|| format!("fail to write to {:?}", filename.as_ref()))?;
    Ok(())
}
