mod archive;
mod config;
mod container;
mod error;
mod git;
mod install;
mod paths;
mod prompt;
mod update;
mod validate;

use crate::config::ConfigStore;
use crate::container::{
    build_image, run_container, Engine, EngineRunner, EngineVars, RealEngineRunner,
};
use crate::error::CcliError;
use crate::git::GitCli;
use crate::install::{is_managed_script, path_hint, Installer};
use crate::paths::{remove_path, Paths};
use crate::prompt::{choose_engine, fill_descriptor, InstallArgs, TerminalPrompter};
use crate::update::{install_latest, GitlabReleaseFeed, InstalledRelease};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::process::Command;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(name = "ccli", version, about = "Install and run git-backed container projects")]
struct Cli {
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, global = true)]
    json: bool,
    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Install the latest ccli release into the bin directory
    Install,
    /// Install the latest release, then print its version
    Update,
    Version,
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    Project {
        #[command(subcommand)]
        command: ProjectCommand,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    Show,
    /// Set the container engine (docker or podman)
    Engine { engine: String },
}

#[derive(Subcommand, Debug)]
enum ProjectCommand {
    /// Clone a repository, register it, write its shortcut and build its image
    Install {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        dest: Option<String>,
        #[arg(long)]
        command: Option<String>,
        #[arg(long)]
        alias: Option<String>,
        #[arg(long)]
        engine: Option<String>,
    },
    /// Build the project image and run it with the given arguments
    Run {
        name: String,
        #[arg(long, default_value_t = false)]
        no_build: bool,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    List,
    Remove {
        name: String,
        /// Also delete the cloned repository
        #[arg(long, default_value_t = false)]
        purge: bool,
    },
}

#[derive(Debug, Serialize)]
struct JsonResult<T: Serialize> {
    ok: bool,
    result: Option<T>,
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_code: Option<String>,
}

#[derive(Debug, Clone)]
struct Context {
    paths: Paths,
    json: bool,
}

fn main() -> Result<(), CcliError> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);
    let ctx = Context {
        paths: Paths::resolve(cli.config.as_ref()),
        json: cli.json,
    };
    let runner = RealEngineRunner;

    let result = match cli.command {
        Commands::Install => handle_install(&ctx),
        Commands::Update => handle_update(&ctx),
        Commands::Version => handle_version(&ctx),
        Commands::Config { command } => handle_config(&ctx, command),
        Commands::Project { command } => handle_project(&ctx, command, &runner),
    };

    if let Err(err) = result {
        if ctx.json {
            let payload = JsonResult::<serde_json::Value> {
                ok: false,
                result: None,
                error: Some(err.to_string()),
                error_code: Some(err.code().to_string()),
            };
            print_json(&payload)?;
        } else {
            eprintln!("{err}");
        }
        std::process::exit(1);
    }

    Ok(())
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

fn handle_version(ctx: &Context) -> Result<(), CcliError> {
    if ctx.json {
        return output(ctx, json!({ "version": VERSION }));
    }
    println!("Version: {VERSION}");
    Ok(())
}

fn release_payload(installed: &InstalledRelease) -> serde_json::Value {
    json!({
        "tag": installed.tag,
        "binary": installed.binary,
        "link": installed.link,
        "hint": installed.global_link_hint(),
    })
}

fn install_release(ctx: &Context) -> Result<InstalledRelease, CcliError> {
    let feed = GitlabReleaseFeed::from_env();
    let installed = install_latest(&feed, &ctx.paths)?;
    if !ctx.json {
        eprintln!("{}", installed.global_link_hint());
    }
    Ok(installed)
}

fn handle_install(ctx: &Context) -> Result<(), CcliError> {
    let installed = install_release(ctx)?;
    output(ctx, release_payload(&installed))
}

fn handle_update(ctx: &Context) -> Result<(), CcliError> {
    let installed = install_release(ctx)?;
    let link = &installed.link;
    let mut cmd = Command::new(link);
    cmd.arg("version");
    let run_failed =
        |e: io::Error| CcliError::Process(format!("failed to run {}: {e}", link.display()));
    if ctx.json {
        let out = cmd.output().map_err(run_failed)?;
        if !out.status.success() {
            return Err(CcliError::Process(format!(
                "{} version exited with {}",
                link.display(),
                out.status
            )));
        }
        let mut payload = release_payload(&installed);
        payload["version_output"] = json!(String::from_utf8_lossy(&out.stdout).trim());
        return output(ctx, payload);
    }
    let status = cmd.status().map_err(run_failed)?;
    if !status.success() {
        return Err(CcliError::Process(format!(
            "{} version exited with {status}",
            link.display()
        )));
    }
    Ok(())
}

fn load_store(ctx: &Context) -> Result<ConfigStore, CcliError> {
    let mut store = ConfigStore::new(ctx.paths.config_path.clone(), "");
    store.load()?;
    Ok(store)
}

fn handle_config(ctx: &Context, command: ConfigCommand) -> Result<(), CcliError> {
    match command {
        ConfigCommand::Show => {
            let store = load_store(ctx)?;
            if ctx.json {
                return output(ctx, serde_json::to_value(&store)?);
            }
            print!("{}", serde_yaml::to_string(&store)?);
            Ok(())
        }
        ConfigCommand::Engine { engine } => {
            let engine: Engine = engine.parse()?;
            let mut store = ConfigStore::new(ctx.paths.config_path.clone(), "");
            let created = match store.load() {
                Ok(()) => false,
                Err(CcliError::ConfigNotFound(_)) => true,
                Err(err) => return Err(err),
            };
            store.set_engine(engine);
            store.save()?;
            info!(engine = %engine, path = %store.path.display(), "container engine set");
            output(
                ctx,
                json!({ "path": store.path, "engine": engine.as_str(), "created": created }),
            )
        }
    }
}

fn handle_project<R: EngineRunner>(
    ctx: &Context,
    command: ProjectCommand,
    runner: &R,
) -> Result<(), CcliError> {
    match command {
        ProjectCommand::Install {
            name,
            url,
            dest,
            command,
            alias,
            engine,
        } => {
            let args = InstallArgs {
                name,
                url,
                dest,
                command,
                alias,
            };
            project_install(ctx, args, engine, runner)
        }
        ProjectCommand::Run {
            name,
            no_build,
            args,
        } => project_run(ctx, &name, no_build, &args, runner),
        ProjectCommand::List => project_list(ctx),
        ProjectCommand::Remove { name, purge } => project_remove(ctx, &name, purge),
    }
}

fn project_install<R: EngineRunner>(
    ctx: &Context,
    args: InstallArgs,
    engine: Option<String>,
    runner: &R,
) -> Result<(), CcliError> {
    let terminal = TerminalPrompter::default();
    let prompter = if !ctx.json && io::stdin().is_terminal() {
        Some(&terminal)
    } else {
        None
    };
    let descriptor = fill_descriptor(args, prompter)?;
    descriptor.validate()?;

    let engine_override = engine.map(|value| value.parse::<Engine>()).transpose()?;
    let stored_engine = load_store(ctx).ok().and_then(|store| store.engine().ok());
    let default_engine = match (engine_override, stored_engine) {
        (None, None) => choose_engine(prompter)?,
        _ => None,
    };

    let installer = Installer {
        paths: &ctx.paths,
        git: &GitCli,
        runner,
        vars: EngineVars::from_env()?,
        engine_override,
        default_engine,
    };
    let mut report = installer.install(&descriptor)?;
    if let Some(hint) = path_hint(&ctx.paths.bin_dir) {
        warn!("{hint}");
    }
    if let Some(err) = report.take_failure() {
        return Err(err);
    }
    output(ctx, serde_json::to_value(&report)?)
}

fn project_run<R: EngineRunner>(
    ctx: &Context,
    name: &str,
    no_build: bool,
    args: &[String],
    runner: &R,
) -> Result<(), CcliError> {
    let store = load_store(ctx)?;
    let record = store
        .get_project(name)
        .ok_or_else(|| CcliError::ProjectNotFound(name.to_string()))?;
    let engine = store.engine()?;
    if !no_build {
        build_image(runner, engine, record)?;
    }
    let vars = EngineVars::from_env()?;
    run_container(runner, engine, record, &vars, args)?;
    if ctx.json {
        return output(ctx, json!({ "project": name, "engine": engine.as_str() }));
    }
    Ok(())
}

fn project_list(ctx: &Context) -> Result<(), CcliError> {
    let store = load_store(ctx)?;
    if ctx.json {
        return output(ctx, serde_json::to_value(&store.projects)?);
    }
    for project in &store.projects {
        println!("{}\t{}\t{}", project.name, project.alias(), project.path);
    }
    Ok(())
}

fn project_remove(ctx: &Context, name: &str, purge: bool) -> Result<(), CcliError> {
    let mut store = load_store(ctx)?;
    let record = store
        .remove_project(name)
        .ok_or_else(|| CcliError::ProjectNotFound(name.to_string()))?;
    store.save()?;

    let script = ctx.paths.shortcut_path(record.alias());
    let script_removed = if is_managed_script(&script) {
        remove_path(&script)?
    } else {
        if script.exists() {
            warn!(script = %script.display(), "leaving shortcut not written by ccli");
        }
        false
    };
    let clone_removed = if purge {
        remove_path(&PathBuf::from(&record.path))?
    } else {
        false
    };
    info!(project = name, "removed project");
    output(
        ctx,
        json!({
            "removed": name,
            "script_removed": script_removed,
            "clone_removed": clone_removed,
        }),
    )
}

fn output(ctx: &Context, payload: serde_json::Value) -> Result<(), CcliError> {
    if ctx.json {
        let wrapper = JsonResult {
            ok: true,
            result: Some(payload),
            error: None,
            error_code: None,
        };
        print_json(&wrapper)?;
    } else {
        println!("{}", payload);
    }
    Ok(())
}

fn print_json<T: Serialize>(payload: &T) -> Result<(), CcliError> {
    let text = serde_json::to_string_pretty(payload)?;
    println!("{}", text);
    Ok(())
}
