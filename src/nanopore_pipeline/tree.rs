use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};

/// Recursively copies the directory `src` to `dst`, which must not exist
/// yet. Regular files are copied byte for byte and the directory
/// structure is preserved. Symbolic links are recreated, not followed.
pub fn copy_tree<P: AsRef<Path>, Q: AsRef<Path>>(src: P, dst: Q) -> Result<()> {
    let src = src.as_ref();
    let dst = dst.as_ref();

    if !src.is_dir() {
        bail!("cannot copy {:?}: not a directory", src);
    }
    if dst.exists() {
        bail!("cannot copy {:?} to {:?}: destination exists", src, dst);
    }

    fs::create_dir_all(dst).with_context(|| format!("creating {:?}", dst))?;

    for entry_res in fs::read_dir(src).with_context(|| format!("listing {:?}", src))? {
        let entry = entry_res?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            copy_tree(&from, &to)?;
        } else if file_type.is_symlink() {
            copy_link(&from, &to)?;
        } else {
            fs::copy(&from, &to).with_context(|| format!("copying {:?} to {:?}", from, to))?;
        }
    }

    Ok(())
}

#[cfg(unix)]
fn copy_link(from: &Path, to: &Path) -> Result<()> {
    let target = fs::read_link(from).with_context(|| format!("reading link {:?}", from))?;
    std::os::unix::fs::symlink(&target, to).with_context(|| format!("linking {:?} to {:?}", to, target))
}

#[cfg(not(unix))]
fn copy_link(from: &Path, to: &Path) -> Result<()> {
    fs::copy(from, to).with_context(|| format!("copying {:?} to {:?}", from, to))?;
    Ok(())
}
