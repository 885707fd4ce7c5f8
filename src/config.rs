//! The project registry persisted as `config.yaml`.

use crate::container::Engine;
use crate::error::CcliError;
use crate::paths::{file_exists, replace_file};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRecord {
    pub name: String,
    pub path: String,
    pub dockerfile: String,
    pub build_directory: String,
    pub build_context: String,
    pub default_command: String,
    #[serde(default)]
    pub command_alias: String,
}

impl ProjectRecord {
    /// Record for a project cloned into `<root>/<name>`, with the Dockerfile at its top level.
    pub fn at(root: &Path, name: &str, command: &str, alias: &str) -> Self {
        let local = root.join(name);
        let local_str = local.to_string_lossy().to_string();
        Self {
            name: name.to_string(),
            path: local_str.clone(),
            dockerfile: local.join("Dockerfile").to_string_lossy().to_string(),
            build_directory: local_str.clone(),
            build_context: local_str,
            default_command: command.to_string(),
            command_alias: alias.to_string(),
        }
    }

    /// Shortcut script name; older documents without an alias fall back to the name.
    pub fn alias(&self) -> &str {
        if self.command_alias.is_empty() {
            &self.name
        } else {
            &self.command_alias
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Appended,
    Replaced,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigStore {
    #[serde(default)]
    pub container_engine: String,
    #[serde(default)]
    pub path: PathBuf,
    #[serde(default)]
    pub projects: Vec<ProjectRecord>,
}

impl ConfigStore {
    pub fn new(path: PathBuf, engine: &str) -> Self {
        Self {
            container_engine: engine.to_string(),
            path,
            projects: Vec::new(),
        }
    }

    pub fn exists(&self) -> bool {
        file_exists(&self.path)
    }

    /// Replaces the engine and project list with the file's contents.
    pub fn load(&mut self) -> Result<(), CcliError> {
        if !self.exists() {
            return Err(CcliError::ConfigNotFound(self.path.clone()));
        }
        let content = fs::read_to_string(&self.path)?;
        let stored: ConfigStore = if content.trim().is_empty() {
            ConfigStore::new(self.path.clone(), "")
        } else {
            serde_yaml::from_str(&content)?
        };
        self.container_engine = stored.container_engine;
        self.projects = stored.projects;
        debug!(
            path = %self.path.display(),
            projects = self.projects.len(),
            "loaded config"
        );
        Ok(())
    }

    pub fn save(&self) -> Result<(), CcliError> {
        let content = serde_yaml::to_string(self)?;
        replace_file(&self.path, &content, None)?;
        debug!(path = %self.path.display(), "saved config");
        Ok(())
    }

    pub fn get_project(&self, name: &str) -> Option<&ProjectRecord> {
        self.projects.iter().find(|project| project.name == name)
    }

    pub fn upsert_project(&mut self, record: ProjectRecord) -> Upsert {
        match self.projects.iter_mut().find(|p| p.name == record.name) {
            Some(existing) => {
                *existing = record;
                Upsert::Replaced
            }
            None => {
                self.projects.push(record);
                Upsert::Appended
            }
        }
    }

    pub fn replace_project(&mut self, name: &str, record: ProjectRecord) -> Result<(), CcliError> {
        let existing = self
            .projects
            .iter_mut()
            .find(|p| p.name == name)
            .ok_or_else(|| CcliError::ProjectNotFound(name.to_string()))?;
        *existing = record;
        Ok(())
    }

    pub fn remove_project(&mut self, name: &str) -> Option<ProjectRecord> {
        let idx = self.projects.iter().position(|p| p.name == name)?;
        Some(self.projects.remove(idx))
    }

    pub fn engine(&self) -> Result<Engine, CcliError> {
        self.container_engine.parse()
    }

    pub fn set_engine(&mut self, engine: Engine) {
        self.container_engine = engine.as_str().to_string();
    }
}
