use crate::error::CcliError;
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use tar::Archive;
use walkdir::WalkDir;

enum Kind {
    TarGz,
    Zip,
}

fn kind_of(source: &Path) -> Option<Kind> {
    let name = source.file_name()?.to_string_lossy().to_ascii_lowercase();
    if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        Some(Kind::TarGz)
    } else if name.ends_with(".zip") {
        Some(Kind::Zip)
    } else {
        None
    }
}

/// Unpacks a `.tar.gz`/`.tgz` or `.zip` archive into `target`, creating it first.
pub fn extract_archive(source: &Path, target: &Path) -> Result<(), CcliError> {
    let kind = kind_of(source).ok_or_else(|| {
        CcliError::Archive(format!("unsupported archive type: {}", source.display()))
    })?;
    fs::create_dir_all(target)?;
    match kind {
        Kind::TarGz => {
            let tar_gz = File::open(source)?;
            let mut archive = Archive::new(GzDecoder::new(tar_gz));
            archive.unpack(target).map_err(|e| {
                CcliError::Archive(format!("failed to extract {}: {e}", source.display()))
            })
        }
        Kind::Zip => {
            let output = Command::new("unzip")
                .arg("-o")
                .arg("-q")
                .arg(source)
                .arg("-d")
                .arg(target)
                .output()
                .map_err(|e| match e.kind() {
                    io::ErrorKind::NotFound => CcliError::Archive(
                        "`unzip` is required to extract .zip releases".to_string(),
                    ),
                    _ => CcliError::Archive(format!("failed to run unzip: {e}")),
                })?;
            if !output.status.success() {
                return Err(CcliError::Archive(format!(
                    "unzip {} failed: {}",
                    source.display(),
                    String::from_utf8_lossy(&output.stderr).trim()
                )));
            }
            Ok(())
        }
    }
}

/// First regular file named `file_name` anywhere under `root`.
pub fn find_file(root: &Path, file_name: &str) -> Result<Option<PathBuf>, CcliError> {
    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|e| CcliError::Archive(e.to_string()))?;
        if entry.file_type().is_file() && entry.file_name() == file_name {
            return Ok(Some(entry.into_path()));
        }
    }
    Ok(None)
}
