use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use zip::ZipArchive;

use crate::error::WorkshopError;

pub fn extract_zip(zip_path: &Path, target_dir: &Path) -> Result<usize, WorkshopError> {
    let file = fs::File::open(zip_path).map_err(|err| {
        WorkshopError::Extraction(format!("open zip {}: {err}", zip_path.display()))
    })?;
    let mut archive =
        ZipArchive::new(file).map_err(|err| WorkshopError::Extraction(err.to_string()))?;

    let mut written = 0usize;
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| WorkshopError::Extraction(err.to_string()))?;
        let entry_path = match entry.enclosed_name() {
            Some(path) => target_dir.join(path),
            None => {
                return Err(WorkshopError::Extraction(
                    "zip entry path traversal detected".to_string(),
                ));
            }
        };

        if entry.is_dir() {
            fs::create_dir_all(&entry_path)
                .map_err(|err| WorkshopError::Extraction(err.to_string()))?;
            continue;
        }

        if let Some(parent) = entry_path.parent() {
            fs::create_dir_all(parent).map_err(|err| WorkshopError::Extraction(err.to_string()))?;
        }
        let mut outfile = fs::File::create(&entry_path)
            .map_err(|err| WorkshopError::Extraction(err.to_string()))?;
        io::copy(&mut entry, &mut outfile)
            .map_err(|err| WorkshopError::Extraction(err.to_string()))?;
        written += 1;
    }
    Ok(written)
}

pub fn validate_zip(zip_path: &Path) -> Result<(), WorkshopError> {
    let file = fs::File::open(zip_path).map_err(|err| {
        WorkshopError::Extraction(format!("open zip {}: {err}", zip_path.display()))
    })?;
    let mut archive =
        ZipArchive::new(file).map_err(|err| WorkshopError::Extraction(err.to_string()))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| WorkshopError::Extraction(err.to_string()))?;
        if entry.is_dir() {
            continue;
        }
        io::copy(&mut entry, &mut io::sink())
            .map_err(|err| WorkshopError::Extraction(err.to_string()))?;
    }
    Ok(())
}

/// Every regular file under `root`, depth first, siblings in name order.
pub fn walk_files_sorted(root: &Path) -> Result<Vec<PathBuf>, WorkshopError> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let mut entries = fs::read_dir(&dir)
            .map_err(|err| WorkshopError::Filesystem(format!("{}: {err}", dir.display())))?
            .map(|entry| entry.map(|entry| entry.path()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| WorkshopError::Filesystem(err.to_string()))?;
        entries.sort();

        let mut subdirs = Vec::new();
        for path in entries {
            if path.is_dir() {
                subdirs.push(path);
            } else if path.is_file() {
                files.push(path);
            }
        }
        stack.extend(subdirs.into_iter().rev());
    }
    Ok(files)
}

pub fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.iter().any(|want| ext.eq_ignore_ascii_case(want)))
        .unwrap_or(false)
}

/// `extensions` is in priority order: every file carrying the first
/// extension outranks the others, and ties go to walk order.
pub fn find_payload(root: &Path, extensions: &[String]) -> Result<PathBuf, WorkshopError> {
    let files = walk_files_sorted(root)?;
    extensions
        .iter()
        .find_map(|extension| {
            files
                .iter()
                .find(|path| has_extension(path, std::slice::from_ref(extension)))
        })
        .cloned()
        .ok_or_else(|| WorkshopError::PayloadNotFound(root.to_path_buf()))
}

/// Renames `path` in place so its extension is exactly `extension`. Never
/// replaces a different file that already has the target name.
pub fn normalize_extension(path: &Path, extension: &str) -> Result<PathBuf, WorkshopError> {
    let current = path.extension().and_then(|ext| ext.to_str());
    if current == Some(extension) {
        return Ok(path.to_path_buf());
    }
    let target = path.with_extension(extension);
    let case_only = path
        .to_string_lossy()
        .eq_ignore_ascii_case(&target.to_string_lossy());
    if target.exists() && !case_only {
        return Err(WorkshopError::Filesystem(format!(
            "refusing to replace existing {}",
            target.display()
        )));
    }
    fs::rename(path, &target).map_err(|err| {
        WorkshopError::Filesystem(format!(
            "rename {} -> {}: {err}",
            path.display(),
            target.display()
        ))
    })?;
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walk_is_depth_first_in_name_order() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("b")).unwrap();
        fs::write(root.join("b").join("inner.txt"), b"x").unwrap();
        fs::write(root.join("c.txt"), b"x").unwrap();
        fs::write(root.join("a.txt"), b"x").unwrap();

        let names = walk_files_sorted(root)
            .unwrap()
            .into_iter()
            .map(|path| path.strip_prefix(root).unwrap().to_path_buf())
            .collect::<Vec<_>>();
        assert_eq!(
            names,
            vec![
                PathBuf::from("a.txt"),
                PathBuf::from("c.txt"),
                PathBuf::from("b").join("inner.txt"),
            ]
        );
    }

    #[test]
    fn payload_match_is_case_insensitive() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(temp.path().join("readme.txt"), b"x").unwrap();
        fs::write(temp.path().join("Zeta.UDK"), b"x").unwrap();
        fs::write(temp.path().join("Alpha.udk"), b"x").unwrap();

        let found = find_payload(temp.path(), &["upk".to_string(), "udk".to_string()]).unwrap();
        assert_eq!(found.file_name().unwrap(), "Alpha.udk");
    }

    #[test]
    fn earlier_extension_outranks_walk_order() {
        let temp = tempfile::tempdir().unwrap();
        fs::create_dir_all(temp.path().join("a")).unwrap();
        fs::write(temp.path().join("a").join("Map.udk"), b"x").unwrap();
        fs::write(temp.path().join("Map.udk"), b"x").unwrap();
        fs::write(temp.path().join("Map.upk"), b"x").unwrap();

        let found = find_payload(temp.path(), &["upk".to_string(), "udk".to_string()]).unwrap();
        assert_eq!(found, temp.path().join("Map.upk"));
    }

    #[test]
    fn normalize_never_replaces_another_file() {
        let temp = tempfile::tempdir().unwrap();
        let source = temp.path().join("Map.udk");
        let existing = temp.path().join("Map.upk");
        fs::write(&source, b"udk").unwrap();
        fs::write(&existing, b"upk").unwrap();

        let err = normalize_extension(&source, "upk").unwrap_err();
        assert!(matches!(err, WorkshopError::Filesystem(_)));
        assert_eq!(fs::read(&existing).unwrap(), b"upk");
        assert!(source.exists());
    }

    #[test]
    fn normalize_renames_only_when_needed() {
        let temp = tempfile::tempdir().unwrap();
        let source = temp.path().join("Map.UDK");
        fs::write(&source, b"x").unwrap();

        let renamed = normalize_extension(&source, "upk").unwrap();
        assert_eq!(renamed.file_name().unwrap(), "Map.upk");
        assert!(!source.exists());

        let same = normalize_extension(&renamed, "upk").unwrap();
        assert_eq!(same, renamed);
    }
}
