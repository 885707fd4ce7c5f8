//! Turns a project record into container engine invocations and executes them.
//!
//! Argument synthesis (`build_run_args`, `build_build_args`) is pure: the only
//! environment it sees is what the caller captured in [`EngineVars`]. Execution
//! goes through [`EngineRunner`] so the pipeline can be exercised without a real
//! engine on the host.

use crate::config::ProjectRecord;
use crate::error::CcliError;
use std::env;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::str::FromStr;
use tracing::{debug, info};

/// Container-side mount point for the invoking user's home directory.
pub const USER_HOME_CONTAINER: &str = "/opt/usr/home";
/// Container-side mount point for the directory the command was invoked from.
pub const CONTEXT_DIR_CONTAINER: &str = "/opt/context";
pub const IMAGE_TAG: &str = "latest";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engine {
    Docker,
    Podman,
}

impl Engine {
    pub const ALL: [Engine; 2] = [Engine::Podman, Engine::Docker];

    pub fn as_str(&self) -> &'static str {
        match self {
            Engine::Docker => "docker",
            Engine::Podman => "podman",
        }
    }

    /// First supported engine found on PATH, podman preferred.
    pub fn detect() -> Option<Engine> {
        Engine::ALL
            .into_iter()
            .find(|engine| which::which(engine.as_str()).is_ok())
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Engine {
    type Err = CcliError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "" => Err(CcliError::EngineNotConfigured),
            "docker" => Ok(Engine::Docker),
            "podman" => Ok(Engine::Podman),
            other => Err(CcliError::UnknownEngine(other.to_string())),
        }
    }
}

/// Host-side values baked into a `run` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineVars {
    pub user_home_host: String,
    pub context_dir_host: String,
    pub display: String,
}

impl EngineVars {
    pub fn from_env() -> Result<Self, CcliError> {
        Ok(Self {
            user_home_host: host_path(dirs::home_dir()),
            context_dir_host: host_path(Some(env::current_dir()?)),
            display: env::var("DISPLAY").unwrap_or_default(),
        })
    }
}

/// An unresolved host path stays empty so its volume mapping is dropped.
fn host_path(path: Option<PathBuf>) -> String {
    path.unwrap_or_default().to_string_lossy().into_owned()
}

fn usable_volume(mapping: &str) -> bool {
    mapping.contains(':') && !mapping.starts_with(':')
}

pub fn build_run_args(record: &ProjectRecord, vars: &EngineVars, extra: &[String]) -> Vec<String> {
    let env_vars = [
        ("CONTEXT_DIR", CONTEXT_DIR_CONTAINER),
        ("VERSION", IMAGE_TAG),
        ("IN_DOCKER", "true"),
        ("DISPLAY", vars.display.as_str()),
    ];
    let volumes = [
        format!("{}:{}", vars.user_home_host, USER_HOME_CONTAINER),
        format!("{}:{}", vars.context_dir_host, CONTEXT_DIR_CONTAINER),
    ];

    let mut args = vec!["run".to_string()];
    for (key, value) in env_vars {
        if !value.is_empty() {
            args.push("--env".to_string());
            args.push(format!("{key}={value}"));
        }
    }
    for volume in volumes {
        if !usable_volume(&volume) {
            debug!(volume = %volume, "skipping volume mapping without a host path");
            continue;
        }
        args.push("--volume".to_string());
        args.push(volume);
    }
    args.push(record.name.clone());
    if !record.default_command.is_empty() {
        args.push(record.default_command.clone());
    }
    args.extend(extra.iter().cloned());
    args
}

pub fn build_build_args(record: &ProjectRecord) -> Vec<String> {
    vec![
        "build".to_string(),
        "-f".to_string(),
        record.dockerfile.clone(),
        "-t".to_string(),
        record.name.clone(),
        record.build_context.clone(),
    ]
}

fn shell_word(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@,+%".contains(c));
    if plain {
        return arg.to_string();
    }
    let mut out = String::from("'");
    for ch in arg.chars() {
        if ch == '\'' {
            out.push_str("'\\''");
        } else {
            out.push(ch);
        }
    }
    out.push('\'');
    out
}

/// Single-line shell form of an engine invocation.
pub fn render_command(engine: Engine, args: &[String]) -> String {
    let mut parts = Vec::with_capacity(args.len() + 1);
    parts.push(engine.as_str().to_string());
    parts.extend(args.iter().map(|arg| shell_word(arg)));
    parts.join(" ")
}

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub status_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status_code == 0
    }
}

pub trait EngineRunner {
    fn run(
        &self,
        engine: Engine,
        args: &[String],
        cwd: Option<&Path>,
        capture_output: bool,
    ) -> Result<CommandOutput, io::Error>;
}

pub struct RealEngineRunner;

impl EngineRunner for RealEngineRunner {
    fn run(
        &self,
        engine: Engine,
        args: &[String],
        cwd: Option<&Path>,
        capture_output: bool,
    ) -> Result<CommandOutput, io::Error> {
        let mut cmd = Command::new(engine.as_str());
        cmd.args(args);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }
        if capture_output {
            let output = cmd.output()?;
            Ok(CommandOutput {
                status_code: exit_code(output.status),
                stdout: output.stdout,
                stderr: output.stderr,
            })
        } else {
            let status = cmd.status()?;
            Ok(CommandOutput {
                status_code: exit_code(status),
                stdout: Vec::new(),
                stderr: Vec::new(),
            })
        }
    }
}

/// Signal-terminated processes have no code; they count as 1.
fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(if status.success() { 0 } else { 1 })
}

fn spawn_failure(engine: Engine, command: &str, cwd: Option<&Path>, err: &io::Error) -> String {
    if let Some(dir) = cwd.filter(|dir| !dir.is_dir()) {
        return format!("cannot run `{command}`: {} does not exist", dir.display());
    }
    if err.kind() == io::ErrorKind::NotFound {
        return format!(
            "`{engine}` was not found on PATH; install it or switch engines with `ccli config engine`"
        );
    }
    format!("failed to start `{command}`: {err}")
}

fn exit_failure(command: &str, output: &CommandOutput) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    if stderr.is_empty() {
        format!("`{command}` exited with status {}", output.status_code)
    } else {
        format!("`{command}` exited with status {}: {stderr}", output.status_code)
    }
}

/// Builds the project image. Engine output is captured and echoed to stderr.
pub fn build_image<R: EngineRunner>(
    runner: &R,
    engine: Engine,
    record: &ProjectRecord,
) -> Result<CommandOutput, CcliError> {
    let args = build_build_args(record);
    let command = render_command(engine, &args);
    info!(%command, "building image");
    let cwd = Path::new(&record.build_context);
    let output = runner
        .run(engine, &args, Some(cwd), true)
        .map_err(|err| CcliError::BuildFailed(spawn_failure(engine, &command, Some(cwd), &err)))?;
    if !output.stdout.is_empty() {
        eprintln!("Output:\n{}", String::from_utf8_lossy(&output.stdout));
    }
    if !output.stderr.is_empty() {
        eprintln!("Error Output:\n{}", String::from_utf8_lossy(&output.stderr));
    }
    if !output.success() {
        return Err(CcliError::BuildFailed(exit_failure(&command, &output)));
    }
    info!(image = %record.name, "image built");
    Ok(output)
}

/// Runs the project container with stdio passed through.
pub fn run_container<R: EngineRunner>(
    runner: &R,
    engine: Engine,
    record: &ProjectRecord,
    vars: &EngineVars,
    extra: &[String],
) -> Result<(), CcliError> {
    let args = build_run_args(record, vars, extra);
    let command = render_command(engine, &args);
    info!(%command, "running container");
    let output = runner
        .run(engine, &args, None, false)
        .map_err(|err| CcliError::RunFailed(spawn_failure(engine, &command, None, &err)))?;
    if !output.success() {
        return Err(CcliError::RunFailed(exit_failure(&command, &output)));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Debug, Clone)]
    pub(crate) struct RecordedCall {
        pub engine: Engine,
        pub args: Vec<String>,
        pub cwd: Option<PathBuf>,
        pub capture_output: bool,
    }

    #[derive(Default)]
    pub(crate) struct MockEngineRunner {
        calls: RefCell<Vec<RecordedCall>>,
        outputs: RefCell<Vec<Result<CommandOutput, io::ErrorKind>>>,
    }

    impl MockEngineRunner {
        pub fn push_output(&self, output: CommandOutput) {
            self.outputs.borrow_mut().push(Ok(output));
        }

        pub fn push_spawn_error(&self, kind: io::ErrorKind) {
            self.outputs.borrow_mut().push(Err(kind));
        }

        pub fn calls(&self) -> Vec<RecordedCall> {
            self.calls.borrow().clone()
        }
    }

    impl EngineRunner for MockEngineRunner {
        fn run(
            &self,
            engine: Engine,
            args: &[String],
            cwd: Option<&Path>,
            capture_output: bool,
        ) -> Result<CommandOutput, io::Error> {
            self.calls.borrow_mut().push(RecordedCall {
                engine,
                args: args.to_vec(),
                cwd: cwd.map(Path::to_path_buf),
                capture_output,
            });
            let mut queued = self.outputs.borrow_mut();
            if queued.is_empty() {
                return Ok(CommandOutput {
                    status_code: 0,
                    stdout: Vec::new(),
                    stderr: Vec::new(),
                });
            }
            queued.remove(0).map_err(io::Error::from)
        }
    }

    pub(crate) fn failed(status_code: i32, stderr: &str) -> CommandOutput {
        CommandOutput {
            status_code,
            stdout: Vec::new(),
            stderr: stderr.as_bytes().to_vec(),
        }
    }

    fn demo_record() -> ProjectRecord {
        ProjectRecord::at(Path::new("/home/me/.local/share/container-cli"), "demo", "bash", "")
    }

    fn vars(home: &str, cwd: &str, display: &str) -> EngineVars {
        EngineVars {
            user_home_host: home.to_string(),
            context_dir_host: cwd.to_string(),
            display: display.to_string(),
        }
    }

    fn env_flags(args: &[String]) -> Vec<String> {
        args.windows(2)
            .filter(|pair| pair[0] == "--env")
            .map(|pair| pair[1].clone())
            .collect()
    }

    fn volume_flags(args: &[String]) -> Vec<String> {
        args.windows(2)
            .filter(|pair| pair[0] == "--volume")
            .map(|pair| pair[1].clone())
            .collect()
    }

    #[test]
    fn run_args_scenario_for_demo_project() {
        let args = build_run_args(&demo_record(), &vars("/home/me", "/work/src", ""), &[]);
        assert_eq!(args.first().map(String::as_str), Some("run"));
        assert_eq!(
            volume_flags(&args),
            vec![
                "/home/me:/opt/usr/home".to_string(),
                "/work/src:/opt/context".to_string()
            ]
        );
        assert_eq!(&args[args.len() - 2..], ["demo", "bash"]);
    }

    #[test]
    fn run_args_append_extra_arguments_in_order() {
        let extra = vec!["--flag".to_string(), "value with space".to_string(), "x".to_string()];
        let args = build_run_args(&demo_record(), &vars("/h", "/c", ""), &extra);
        let tail = &args[args.len() - 5..];
        assert_eq!(tail, ["demo", "bash", "--flag", "value with space", "x"]);
    }

    #[test]
    fn run_args_env_flags_each_appear_once() {
        let args = build_run_args(&demo_record(), &vars("/h", "/c", ":0"), &[]);
        let mut flags = env_flags(&args);
        flags.sort();
        assert_eq!(
            flags,
            vec![
                "CONTEXT_DIR=/opt/context".to_string(),
                "DISPLAY=:0".to_string(),
                "IN_DOCKER=true".to_string(),
                "VERSION=latest".to_string(),
            ]
        );
    }

    #[test]
    fn run_args_omit_empty_display() {
        let args = build_run_args(&demo_record(), &vars("/h", "/c", ""), &[]);
        assert!(env_flags(&args).iter().all(|flag| !flag.starts_with("DISPLAY=")));
        assert_eq!(env_flags(&args).len(), 3);
    }

    #[test]
    fn run_args_skip_volume_without_host_path() {
        let args = build_run_args(&demo_record(), &vars("", "/c", ""), &[]);
        let volumes = volume_flags(&args);
        assert_eq!(volumes, vec!["/c:/opt/context".to_string()]);
        assert!(args.iter().all(|arg| !arg.starts_with(':')));
    }

    #[test]
    fn unresolved_home_drops_the_home_volume() {
        let home = host_path(None);
        assert_eq!(home, "");
        let args = build_run_args(&demo_record(), &vars(&home, "/c", ""), &[]);
        assert!(volume_flags(&args).iter().all(|v| !v.ends_with(USER_HOME_CONTAINER)));
        assert_eq!(host_path(Some(PathBuf::from("/home/me"))), "/home/me");
    }

    #[test]
    fn run_args_omit_empty_default_command() {
        let record = ProjectRecord::at(Path::new("/srv"), "demo", "", "");
        let args = build_run_args(&record, &vars("/h", "/c", ""), &[]);
        assert_eq!(args.last().map(String::as_str), Some("demo"));
        assert!(args.iter().all(|arg| !arg.is_empty()));

        let extra = vec!["--help".to_string()];
        let args = build_run_args(&record, &vars("/h", "/c", ""), &extra);
        assert_eq!(&args[args.len() - 2..], ["demo", "--help"]);
    }

    #[test]
    fn usable_volume_rules() {
        assert!(usable_volume("/h:/opt/usr/home"));
        assert!(!usable_volume(":/opt/usr/home"));
        assert!(!usable_volume("/no-separator"));
    }

    #[test]
    fn build_args_shape() {
        let record = demo_record();
        assert_eq!(
            build_build_args(&record),
            vec![
                "build",
                "-f",
                "/home/me/.local/share/container-cli/demo/Dockerfile",
                "-t",
                "demo",
                "/home/me/.local/share/container-cli/demo",
            ]
        );
    }

    #[test]
    fn engine_parsing() {
        assert_eq!("podman".parse::<Engine>().unwrap(), Engine::Podman);
        assert_eq!(" docker ".parse::<Engine>().unwrap(), Engine::Docker);
        assert!(matches!("".parse::<Engine>(), Err(CcliError::EngineNotConfigured)));
        assert!(matches!(
            "containerd".parse::<Engine>(),
            Err(CcliError::UnknownEngine(_))
        ));
    }

    #[test]
    fn render_command_quotes_only_when_needed() {
        let args = vec![
            "run".to_string(),
            "--env".to_string(),
            "DISPLAY=:0".to_string(),
            "/home/my user:/opt/usr/home".to_string(),
            "it's".to_string(),
        ];
        assert_eq!(
            render_command(Engine::Podman, &args),
            "podman run --env DISPLAY=:0 '/home/my user:/opt/usr/home' 'it'\\''s'"
        );
    }

    #[test]
    fn build_image_runs_in_build_context_and_captures() {
        let runner = MockEngineRunner::default();
        let record = demo_record();
        build_image(&runner, Engine::Podman, &record).unwrap();
        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].engine, Engine::Podman);
        assert!(calls[0].capture_output);
        assert_eq!(calls[0].cwd.as_deref(), Some(Path::new(&record.build_context)));
        assert_eq!(calls[0].args[0], "build");
    }

    #[test]
    fn build_image_failure_wraps_stderr() {
        let runner = MockEngineRunner::default();
        runner.push_output(failed(125, "Error: no such file Dockerfile"));
        let err = build_image(&runner, Engine::Docker, &demo_record()).expect_err("should fail");
        match err {
            CcliError::BuildFailed(message) => {
                assert!(message.contains("status 125"));
                assert!(message.contains("no such file Dockerfile"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn exit_failure_appends_stderr_only_when_present() {
        assert_eq!(
            exit_failure("podman run demo", &failed(2, "  \n")),
            "`podman run demo` exited with status 2"
        );
        assert_eq!(
            exit_failure("podman run demo", &failed(1, "boom\n")),
            "`podman run demo` exited with status 1: boom"
        );
    }

    #[test]
    fn missing_engine_binary_is_reported_with_hint() {
        let runner = MockEngineRunner::default();
        runner.push_spawn_error(io::ErrorKind::NotFound);
        let err = run_container(&runner, Engine::Podman, &demo_record(), &vars("/h", "/c", ""), &[])
            .expect_err("should fail");
        assert!(matches!(err, CcliError::RunFailed(_)));
        assert!(err.to_string().contains("`podman` was not found on PATH"));
    }

    #[test]
    fn missing_build_context_is_named() {
        let runner = MockEngineRunner::default();
        runner.push_spawn_error(io::ErrorKind::NotFound);
        let err = build_image(&runner, Engine::Podman, &demo_record()).expect_err("should fail");
        assert!(matches!(err, CcliError::BuildFailed(ref m) if m.contains("does not exist")));
    }

    #[test]
    fn run_container_streams_and_reports_exit_status() {
        let runner = MockEngineRunner::default();
        runner.push_output(failed(2, ""));
        let err = run_container(
            &runner,
            Engine::Podman,
            &demo_record(),
            &vars("/h", "/c", ""),
            &["--help".to_string()],
        )
        .expect_err("non-zero exit");
        assert!(matches!(err, CcliError::RunFailed(ref m) if m.contains("status 2")));
        let calls = runner.calls();
        assert!(!calls[0].capture_output);
        assert!(calls[0].cwd.is_none());
        assert_eq!(calls[0].args.last().map(String::as_str), Some("--help"));
    }
}
