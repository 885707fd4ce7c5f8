use crate::error::CcliError;
use dirs::home_dir;
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

pub const APP_DIR_NAME: &str = "container-cli";
pub const CONFIG_FILE_NAME: &str = "config.yaml";
pub const BINARY_NAME: &str = "ccli";

/// Locations the CLI reads and writes, resolved once per invocation.
#[derive(Debug, Clone)]
pub struct Paths {
    pub config_path: PathBuf,
    pub bin_dir: PathBuf,
}

impl Paths {
    pub fn resolve(config_override: Option<&PathBuf>) -> Self {
        Self {
            config_path: resolve_config_path(config_override),
            bin_dir: default_bin_dir(),
        }
    }

    pub fn shortcut_path(&self, alias: &str) -> PathBuf {
        self.bin_dir.join(alias)
    }

    /// Parent of the per-release directories (`<bin>/container-cli/<tag>`).
    pub fn versions_dir(&self) -> PathBuf {
        self.bin_dir.join(APP_DIR_NAME)
    }

    pub fn binary_link(&self) -> PathBuf {
        self.bin_dir.join(BINARY_NAME)
    }
}

pub fn home() -> PathBuf {
    home_dir().unwrap_or_else(|| PathBuf::from("."))
}

fn resolve_config_path(override_path: Option<&PathBuf>) -> PathBuf {
    if let Some(path) = override_path {
        return path.clone();
    }
    if let Ok(path) = env::var("CCLI_CONFIG") {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }
    default_config_dir().join(CONFIG_FILE_NAME)
}

pub fn default_config_dir() -> PathBuf {
    if let Ok(path) = env::var("CCLI_CONFIG_DIR") {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }
    let mut base = home();
    base.push(".config");
    base.push(APP_DIR_NAME);
    base
}

pub fn default_bin_dir() -> PathBuf {
    if let Ok(path) = env::var("CCLI_BIN_DIR") {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }
    let mut base = home();
    base.push(".local");
    base.push("bin");
    base
}

/// Where project clones go when `--dest` is not given.
pub fn default_project_root() -> String {
    format!("~/.local/share/{APP_DIR_NAME}")
}

/// Replaces a leading `~` with the home directory. Other inputs are returned unchanged.
pub fn expand_path(input: &str) -> String {
    if input == "~" {
        return home().to_string_lossy().to_string();
    }
    if let Some(stripped) = input.strip_prefix("~/") {
        return home().join(stripped).to_string_lossy().to_string();
    }
    input.to_string()
}

/// True only for regular files; directories do not count.
pub fn file_exists(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
}

pub fn ensure_parent(path: &Path) -> Result<(), CcliError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

fn unique_suffix() -> String {
    static COUNTER: AtomicU32 = AtomicU32::new(0);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{}-{nanos}-{seq}", std::process::id())
}

/// Stages `content` as a hidden sibling of `path`, then renames it over `path`.
/// The staged file is cleaned up if the rename fails.
pub fn replace_file(path: &Path, content: &str, mode: Option<u32>) -> Result<(), CcliError> {
    let name = path
        .file_name()
        .ok_or_else(|| CcliError::Config(format!("{} does not name a file", path.display())))?;
    ensure_parent(path)?;
    let staged = path.with_file_name(format!(
        ".{}.{BINARY_NAME}-partial-{}",
        name.to_string_lossy(),
        unique_suffix()
    ));

    fs::write(&staged, content)?;
    #[cfg(unix)]
    if let Some(mode) = mode {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&staged, fs::Permissions::from_mode(mode))?;
    }
    #[cfg(not(unix))]
    let _ = mode;
    fs::rename(&staged, path).map_err(|err| {
        let _ = fs::remove_file(&staged);
        CcliError::Io(err)
    })
}

/// Removes a file, symlink or directory tree. Returns false when nothing was there.
pub fn remove_path(path: &Path) -> Result<bool, CcliError> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(CcliError::Io(err)),
    };
    if meta.file_type().is_dir() {
        fs::remove_dir_all(path)?;
    } else {
        fs::remove_file(path)?;
    }
    Ok(true)
}

/// Points `link` at `target`. An earlier link or plain file at `link` is replaced;
/// a directory is an error.
pub fn relink(target: &Path, link: &Path) -> Result<(), CcliError> {
    ensure_parent(link)?;
    match fs::symlink_metadata(link) {
        Ok(meta) if meta.is_dir() => {
            return Err(CcliError::Release(format!(
                "{} is a directory; move it aside so {BINARY_NAME} can link {} there",
                link.display(),
                target.display()
            )));
        }
        Ok(_) => fs::remove_file(link)?,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => return Err(CcliError::Io(err)),
    }
    link_to(target, link)
}

#[cfg(unix)]
fn link_to(target: &Path, link: &Path) -> Result<(), CcliError> {
    std::os::unix::fs::symlink(target, link)?;
    Ok(())
}

#[cfg(not(unix))]
fn link_to(target: &Path, link: &Path) -> Result<(), CcliError> {
    Err(CcliError::Release(format!(
        "cannot link {} to {}: versioned installs need symlinks, which this host lacks",
        link.display(),
        target.display()
    )))
}

/// Creates an empty directory under the system temp dir for one download.
pub fn download_dir() -> Result<PathBuf, CcliError> {
    let dir = env::temp_dir().join(format!("{BINARY_NAME}-download-{}", unique_suffix()));
    fs::create_dir_all(&dir)?;
    Ok(dir)
}
