use crate::error::CcliError;
use std::path::Path;
use std::process::Command;
use tracing::info;

pub trait GitClient {
    fn clone_repo(&self, name: &str, url: &str, dest: &Path) -> Result<(), CcliError>;
}

/// Clones with the `git` binary found on PATH.
pub struct GitCli;

impl GitClient for GitCli {
    fn clone_repo(&self, name: &str, url: &str, dest: &Path) -> Result<(), CcliError> {
        info!(project = name, %url, dest = %dest.display(), "cloning repository");
        let output = Command::new("git")
            .arg("clone")
            .arg("--quiet")
            .arg(url)
            .arg(dest)
            .output()
            .map_err(|e| CcliError::CloneFailed(format!("failed to run git clone: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CcliError::CloneFailed(format!(
                "git clone {url} failed: {}",
                stderr.trim()
            )));
        }
        Ok(())
    }
}
