//! Project install pipeline: clone, register, write the shortcut script, build.
//!
//! Stages run in a fixed order and are best effort. Registering the project in the
//! config is the only stage whose failure stops the pipeline; every other failure is
//! logged, recorded in the [`InstallReport`], and the next stage still runs.

use crate::config::{ConfigStore, ProjectRecord, Upsert};
use crate::container::{
    build_image, build_run_args, render_command, Engine, EngineRunner, EngineVars,
};
use crate::error::CcliError;
use crate::git::GitClient;
use crate::paths::{remove_path, replace_file, Paths, BINARY_NAME};
use crate::validate::{
    validate_alias, validate_command, validate_destination, validate_name, validate_url,
};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const SCRIPT_MARKER: &str = "# managed by ccli";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectDescriptor {
    pub name: String,
    pub url: String,
    pub destination: PathBuf,
    pub command: String,
    pub alias: Option<String>,
}

impl ProjectDescriptor {
    pub fn validate(&self) -> Result<(), CcliError> {
        validate_name(&self.name)?;
        validate_url(&self.url)?;
        validate_command(&self.command)?;
        validate_alias(self.alias())?;
        validate_destination(&self.destination.to_string_lossy())?;
        Ok(())
    }

    pub fn local_path(&self) -> PathBuf {
        self.destination.join(&self.name)
    }

    pub fn alias(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    pub fn to_record(&self) -> ProjectRecord {
        ProjectRecord::at(&self.destination, &self.name, &self.command, self.alias())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Uninstall,
    Clone,
    InstallConfig,
    InstallScript,
    BuildContainer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum Outcome {
    Done,
    Skipped(String),
    Failed(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub stage: Stage,
    pub outcome: Outcome,
}

#[derive(Debug, Serialize)]
pub struct InstallReport {
    pub project: String,
    pub engine: Option<String>,
    pub script: PathBuf,
    pub stages: Vec<StageReport>,
    #[serde(skip)]
    last_error: Option<CcliError>,
}

impl InstallReport {
    fn new(project: &str, script: PathBuf) -> Self {
        Self {
            project: project.to_string(),
            engine: None,
            script,
            stages: Vec::new(),
            last_error: None,
        }
    }

    fn done(&mut self, stage: Stage) {
        info!(?stage, "stage done");
        self.stages.push(StageReport {
            stage,
            outcome: Outcome::Done,
        });
        self.last_error = None;
    }

    fn skipped(&mut self, stage: Stage, reason: &str) {
        info!(?stage, reason, "stage skipped");
        self.stages.push(StageReport {
            stage,
            outcome: Outcome::Skipped(reason.to_string()),
        });
        self.last_error = None;
    }

    fn failed(&mut self, stage: Stage, err: CcliError) {
        warn!(?stage, error = %err, "stage failed");
        self.stages.push(StageReport {
            stage,
            outcome: Outcome::Failed(err.to_string()),
        });
        self.last_error = Some(err);
    }

    pub fn outcome(&self, stage: Stage) -> Option<&Outcome> {
        self.stages
            .iter()
            .find(|report| report.stage == stage)
            .map(|report| &report.outcome)
    }

    /// The error of the final stage, when the final stage failed.
    pub fn take_failure(&mut self) -> Option<CcliError> {
        self.last_error.take()
    }
}

pub fn shortcut_script(engine: Engine, run_args: &[String]) -> String {
    format!(
        "#!/usr/bin/env bash\n{SCRIPT_MARKER}\n{} \"$@\"\n",
        render_command(engine, run_args)
    )
}

pub fn is_managed_script(path: &Path) -> bool {
    fs::read_to_string(path)
        .map(|body| body.contains(SCRIPT_MARKER))
        .unwrap_or(false)
}

/// Fails when `path` holds something other than a script written by [`write_shortcut`].
/// Symlinks are never replaced, whatever they point at.
pub fn check_replaceable(path: &Path) -> Result<(), CcliError> {
    match fs::symlink_metadata(path) {
        Err(_) => Ok(()),
        Ok(meta) if meta.is_file() && is_managed_script(path) => Ok(()),
        Ok(_) => Err(CcliError::Process(format!(
            "{} exists and was not written by {BINARY_NAME}; leaving it in place",
            path.display()
        ))),
    }
}

#[cfg(unix)]
pub fn write_shortcut(path: &Path, body: &str) -> Result<(), CcliError> {
    use std::os::unix::fs::PermissionsExt;
    replace_file(path, body, Some(0o755))?;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
    Ok(())
}

#[cfg(not(unix))]
pub fn write_shortcut(_path: &Path, _body: &str) -> Result<(), CcliError> {
    Err(CcliError::Config(
        "shortcut scripts are only supported on unix hosts".to_string(),
    ))
}

pub struct Installer<'a, G: GitClient, R: EngineRunner> {
    pub paths: &'a Paths,
    pub git: &'a G,
    pub runner: &'a R,
    pub vars: EngineVars,
    /// Chosen explicitly by the caller; replaces the stored engine.
    pub engine_override: Option<Engine>,
    /// Used only when the stored config has no engine.
    pub default_engine: Option<Engine>,
}

impl<'a, G: GitClient, R: EngineRunner> Installer<'a, G, R> {
    pub fn install(&self, descriptor: &ProjectDescriptor) -> Result<InstallReport, CcliError> {
        descriptor.validate()?;
        let local_path = descriptor.local_path();
        let script_path = self.paths.shortcut_path(descriptor.alias());
        let mut report = InstallReport::new(&descriptor.name, script_path.clone());
        info!(project = %descriptor.name, path = %local_path.display(), "installing project");

        match remove_path(&local_path) {
            Ok(true) => report.done(Stage::Uninstall),
            Ok(false) => report.skipped(Stage::Uninstall, "no existing clone"),
            Err(err) => report.failed(Stage::Uninstall, err),
        }

        match self.clone_into(descriptor, &local_path) {
            Ok(()) => report.done(Stage::Clone),
            Err(err) => report.failed(Stage::Clone, err),
        }

        let record = descriptor.to_record();
        let engine = match self.register(record.clone()) {
            Ok(engine) => engine,
            Err(err) => {
                warn!(stage = ?Stage::InstallConfig, error = %err, "install aborted");
                return Err(err);
            }
        };
        report.engine = Some(engine.as_str().to_string());
        report.done(Stage::InstallConfig);

        let run_args = build_run_args(&record, &self.vars, &[]);
        let written = check_replaceable(&script_path)
            .and_then(|()| write_shortcut(&script_path, &shortcut_script(engine, &run_args)));
        match written {
            Ok(()) => {
                info!(script = %script_path.display(), "wrote shortcut script");
                report.done(Stage::InstallScript);
            }
            Err(err) => report.failed(Stage::InstallScript, err),
        }

        match build_image(self.runner, engine, &record) {
            Ok(_) => report.done(Stage::BuildContainer),
            Err(err) => report.failed(Stage::BuildContainer, err),
        }

        Ok(report)
    }

    fn clone_into(
        &self,
        descriptor: &ProjectDescriptor,
        local_path: &Path,
    ) -> Result<(), CcliError> {
        fs::create_dir_all(&descriptor.destination)?;
        self.git
            .clone_repo(&descriptor.name, &descriptor.url, local_path)
    }

    fn register(&self, record: ProjectRecord) -> Result<Engine, CcliError> {
        let mut store = ConfigStore::new(self.paths.config_path.clone(), "");
        match store.load() {
            Ok(()) => {}
            Err(CcliError::ConfigNotFound(path)) => {
                info!(path = %path.display(), "creating config");
            }
            Err(err) => return Err(err),
        }
        if let Some(engine) = self.engine_override {
            store.set_engine(engine);
        } else if store.container_engine.trim().is_empty() {
            if let Some(engine) = self.default_engine {
                store.set_engine(engine);
            }
        }
        let engine = store.engine()?;
        let name = record.name.clone();
        match store.upsert_project(record) {
            Upsert::Appended => info!(project = %name, "registered project"),
            Upsert::Replaced => info!(project = %name, "replaced existing project entry"),
        }
        store.save()?;
        Ok(engine)
    }
}

/// Hint printed after a shortcut lands outside PATH.
pub fn path_hint(bin_dir: &Path) -> Option<String> {
    let on_path = std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|p| p == bin_dir))
        .unwrap_or(false);
    if on_path {
        return None;
    }
    Some(format!(
        "{} is not on PATH; add it to run shortcuts (and `{BINARY_NAME}`) by name",
        bin_dir.display()
    ))
}
