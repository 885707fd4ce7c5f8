use crate::container::Engine;
use crate::error::CcliError;
use crate::install::ProjectDescriptor;
use crate::paths::default_project_root;
use crate::validate::{
    resolve_destination, validate_alias, validate_command, validate_destination, validate_name,
    validate_url,
};
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Input, Select};

type Check = fn(&str) -> Result<(), CcliError>;

pub trait Prompter {
    fn text(&self, prompt: &str, default: Option<&str>, check: Check) -> Result<String, CcliError>;
    fn select_engine(&self, detected: Option<Engine>) -> Result<Engine, CcliError>;
}

#[derive(Default)]
pub struct TerminalPrompter {
    theme: ColorfulTheme,
}

impl Prompter for TerminalPrompter {
    fn text(&self, prompt: &str, default: Option<&str>, check: Check) -> Result<String, CcliError> {
        let mut input = Input::<String>::with_theme(&self.theme)
            .with_prompt(prompt)
            .validate_with(move |value: &String| check(value.trim()));
        if let Some(default) = default {
            input = input.default(default.to_string());
        }
        Ok(input.interact_text()?.trim().to_string())
    }

    fn select_engine(&self, detected: Option<Engine>) -> Result<Engine, CcliError> {
        let items: Vec<&str> = Engine::ALL.iter().map(Engine::as_str).collect();
        let default_idx = detected
            .and_then(|engine| Engine::ALL.iter().position(|e| *e == engine))
            .unwrap_or(0);
        let selection = Select::with_theme(&self.theme)
            .with_prompt("Container engine")
            .items(&items)
            .default(default_idx)
            .interact()?;
        Ok(Engine::ALL[selection])
    }
}

/// Values given on the command line for `project install`.
#[derive(Debug, Clone, Default)]
pub struct InstallArgs {
    pub name: Option<String>,
    pub url: Option<String>,
    pub dest: Option<String>,
    pub command: Option<String>,
    pub alias: Option<String>,
}

fn required<P: Prompter>(
    value: Option<String>,
    flag: &str,
    prompt: &str,
    check: Check,
    prompter: Option<&P>,
) -> Result<String, CcliError> {
    match (value, prompter) {
        (Some(value), _) => Ok(value),
        (None, Some(p)) => p.text(prompt, None, check),
        (None, None) => Err(CcliError::Process(format!(
            "missing {flag}; pass it explicitly when stdin is not a terminal"
        ))),
    }
}

/// Completes a descriptor from flags, asking for anything missing when a prompter is given.
pub fn fill_descriptor<P: Prompter>(
    args: InstallArgs,
    prompter: Option<&P>,
) -> Result<ProjectDescriptor, CcliError> {
    let name = required(args.name, "--name", "Project name", validate_name, prompter)?;
    let url = required(
        args.url,
        "--url",
        "Git repository URL (https:// or ssh://)",
        validate_url,
        prompter,
    )?;
    let default_root = default_project_root();
    let dest = match (args.dest, prompter) {
        (Some(dest), _) => dest,
        (None, Some(p)) => p.text(
            "Destination directory",
            Some(default_root.as_str()),
            validate_destination,
        )?,
        (None, None) => default_root,
    };
    let command = required(
        args.command,
        "--command",
        "Default command run in the container",
        validate_command,
        prompter,
    )?;
    let alias = match (args.alias, prompter) {
        (Some(alias), _) => Some(alias),
        (None, Some(p)) => Some(p.text(
            "Shortcut command name",
            Some(name.as_str()),
            validate_alias,
        )?),
        (None, None) => None,
    };

    Ok(ProjectDescriptor {
        destination: resolve_destination(&dest)?,
        name,
        url,
        command,
        alias,
    })
}

/// Engine for a fresh config: interactive choice when possible, otherwise what is on PATH.
pub fn choose_engine<P: Prompter>(prompter: Option<&P>) -> Result<Option<Engine>, CcliError> {
    let detected = Engine::detect();
    match prompter {
        Some(p) => p.select_engine(detected).map(Some),
        None => Ok(detected),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::expand_path;
    use std::cell::RefCell;
    use std::path::PathBuf;

    #[derive(Default)]
    struct ScriptedPrompter {
        answers: RefCell<Vec<String>>,
        asked: RefCell<Vec<(String, Option<String>)>>,
    }

    impl ScriptedPrompter {
        fn with(answers: &[&str]) -> Self {
            Self {
                answers: RefCell::new(answers.iter().map(|a| a.to_string()).collect()),
                asked: RefCell::default(),
            }
        }
    }

    impl Prompter for ScriptedPrompter {
        fn text(
            &self,
            prompt: &str,
            default: Option<&str>,
            check: Check,
        ) -> Result<String, CcliError> {
            self.asked
                .borrow_mut()
                .push((prompt.to_string(), default.map(str::to_string)));
            let answer = self.answers.borrow_mut().remove(0);
            let answer = if answer.is_empty() {
                default.unwrap_or_default().to_string()
            } else {
                answer
            };
            check(&answer)?;
            Ok(answer)
        }

        fn select_engine(&self, _detected: Option<Engine>) -> Result<Engine, CcliError> {
            Ok(Engine::Docker)
        }
    }

    fn full_args() -> InstallArgs {
        InstallArgs {
            name: Some("demo".to_string()),
            url: Some("https://gitlab.com/locke-codes/demo.git".to_string()),
            dest: Some("/srv/projects".to_string()),
            command: Some("bash".to_string()),
            alias: None,
        }
    }

    #[test]
    fn flags_only_need_no_prompter() {
        let desc = fill_descriptor::<ScriptedPrompter>(full_args(), None).unwrap();
        assert_eq!(desc.name, "demo");
        assert_eq!(desc.destination, PathBuf::from("/srv/projects"));
        assert_eq!(desc.alias, None);
        assert_eq!(desc.alias(), "demo");
    }

    #[test]
    fn non_interactive_names_the_missing_flag() {
        let mut args = full_args();
        args.url = None;
        let err = fill_descriptor::<ScriptedPrompter>(args, None).expect_err("url missing");
        assert!(err.to_string().contains("--url"));
    }

    #[test]
    fn non_interactive_dest_defaults_to_share_dir() {
        let mut args = full_args();
        args.dest = None;
        let desc = fill_descriptor::<ScriptedPrompter>(args, None).unwrap();
        assert_eq!(
            desc.destination,
            PathBuf::from(expand_path("~/.local/share/container-cli"))
        );
    }

    #[test]
    fn prompts_only_for_missing_values() {
        let prompter = ScriptedPrompter::with(&["go-world", "", "gw"]);
        let args = InstallArgs {
            name: None,
            dest: None,
            ..full_args()
        };
        let desc = fill_descriptor(args, Some(&prompter)).unwrap();
        assert_eq!(desc.name, "go-world");
        assert_eq!(desc.alias.as_deref(), Some("gw"));

        let asked = prompter.asked.borrow();
        assert_eq!(asked.len(), 3);
        assert_eq!(asked[0].0, "Project name");
        assert_eq!(asked[1].1.as_deref(), Some("~/.local/share/container-cli"));
        assert_eq!(asked[2].1.as_deref(), Some("go-world"));
    }

    #[test]
    fn prompted_values_are_validated() {
        let prompter = ScriptedPrompter::with(&["big salad"]);
        let args = InstallArgs {
            name: None,
            ..full_args()
        };
        let err = fill_descriptor(args, Some(&prompter)).expect_err("bad name");
        assert!(matches!(err, CcliError::InvalidName(_)));
    }

    #[test]
    fn interactive_engine_choice_uses_prompter() {
        let prompter = ScriptedPrompter::default();
        assert_eq!(choose_engine(Some(&prompter)).unwrap(), Some(Engine::Docker));
    }
}
