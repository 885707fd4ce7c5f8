use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CcliError {
    #[error("config not found at {}; run `ccli config engine <docker|podman>` or `ccli project install` to create it", .0.display())]
    ConfigNotFound(PathBuf),
    #[error("container engine is not configured; run `ccli config engine <docker|podman>`")]
    EngineNotConfigured,
    #[error("unknown container engine '{0}'; supported: docker, podman")]
    UnknownEngine(String),
    #[error("project not found: {0}")]
    ProjectNotFound(String),
    #[error("invalid name: {0}")]
    InvalidName(String),
    #[error("invalid command: {0}")]
    InvalidCommand(String),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("invalid destination: {0}")]
    InvalidDestination(String),
    #[error("clone failed: {0}")]
    CloneFailed(String),
    #[error("build failed: {0}")]
    BuildFailed(String),
    #[error("run failed: {0}")]
    RunFailed(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("release error: {0}")]
    Release(String),
    #[error("archive error: {0}")]
    Archive(String),
    #[error("process error: {0}")]
    Process(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("prompt error: {0}")]
    Prompt(#[from] dialoguer::Error),
}

impl CcliError {
    /// Short stable code used in `--json` error payloads.
    pub fn code(&self) -> &'static str {
        match self {
            CcliError::ConfigNotFound(_) => "config_not_found",
            CcliError::EngineNotConfigured => "engine_not_configured",
            CcliError::UnknownEngine(_) => "unknown_engine",
            CcliError::ProjectNotFound(_) => "project_not_found",
            CcliError::InvalidName(_) => "invalid_name",
            CcliError::InvalidCommand(_) => "invalid_command",
            CcliError::InvalidUrl(_) => "invalid_url",
            CcliError::InvalidDestination(_) => "invalid_destination",
            CcliError::CloneFailed(_) => "clone_failed",
            CcliError::BuildFailed(_) => "build_failed",
            CcliError::RunFailed(_) => "run_failed",
            CcliError::Config(_) => "config_error",
            CcliError::Release(_) => "release_error",
            CcliError::Archive(_) => "archive_error",
            CcliError::Process(_) => "process_error",
            CcliError::Io(_) => "io_error",
            CcliError::Yaml(_) => "yaml_error",
            CcliError::Json(_) => "json_error",
            CcliError::Http(_) => "http_error",
            CcliError::Prompt(_) => "prompt_error",
        }
    }
}
