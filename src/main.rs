use std::path::PathBuf;

use squad::{Launch, run_dashboard};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct CliArgs {
    program: Option<String>,
    auto_yes: bool,
    direct: bool,
    direct_branch: Option<String>,
    event_log_path: Option<PathBuf>,
}

fn parse_cli_args(args: impl IntoIterator<Item = String>) -> std::io::Result<CliArgs> {
    let mut cli = CliArgs::default();
    let mut args = args.into_iter();

    while let Some(argument) = args.next() {
        match argument.as_str() {
            "--program" => {
                let Some(program) = args.next() else {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        "--program requires a command line",
                    ));
                };
                cli.program = Some(program);
            }
            "--autoyes" => {
                cli.auto_yes = true;
            }
            "--direct" => {
                cli.direct = true;
            }
            "--direct-branch" => {
                let Some(branch) = args.next() else {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        "--direct-branch requires a branch name",
                    ));
                };
                cli.direct_branch = Some(branch);
            }
            "--event-log" => {
                let Some(path) = args.next() else {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        "--event-log requires a file path",
                    ));
                };
                cli.event_log_path = Some(PathBuf::from(path));
            }
            _ => {}
        }
    }

    if cli.direct && cli.direct_branch.is_none() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "--direct requires --direct-branch",
        ));
    }

    Ok(cli)
}

fn probe_host_tools() -> std::io::Result<()> {
    squad::multiplexer::probe_tmux_binary()
        .map_err(|error| std::io::Error::other(format!("tmux is not usable: {error}")))?;
    squad::process::command_output(&["git".to_string(), "--version".to_string()])
        .map_err(|error| std::io::Error::other(format!("git is not usable: {error}")))?;
    Ok(())
}

fn main() -> std::io::Result<()> {
    let cli = parse_cli_args(std::env::args().skip(1))?;

    let config = squad::config::load().map_err(std::io::Error::other)?;
    let program = cli.program.unwrap_or(config.default_program);
    let auto_yes = cli.auto_yes || config.auto_yes;

    probe_host_tools()?;

    run_dashboard(Launch {
        program,
        auto_yes,
        direct_mode: cli.direct,
        direct_branch: cli.direct_branch.unwrap_or_default(),
        event_log_path: cli.event_log_path,
    })
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::{CliArgs, parse_cli_args};

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| (*value).to_string()).collect()
    }

    #[test]
    fn parses_all_flags() {
        let cli = parse_cli_args(args(&[
            "--program",
            "aider --model sonnet",
            "--autoyes",
            "--direct",
            "--direct-branch",
            "feature-x",
            "--event-log",
            "/tmp/squad.jsonl",
        ]))
        .expect("args should parse");

        assert_eq!(
            cli,
            CliArgs {
                program: Some("aider --model sonnet".to_string()),
                auto_yes: true,
                direct: true,
                direct_branch: Some("feature-x".to_string()),
                event_log_path: Some(PathBuf::from("/tmp/squad.jsonl")),
            }
        );
    }

    #[test]
    fn missing_flag_values_are_rejected() {
        assert!(parse_cli_args(args(&["--program"])).is_err());
        assert!(parse_cli_args(args(&["--direct-branch"])).is_err());
        assert!(parse_cli_args(args(&["--event-log"])).is_err());
    }

    #[test]
    fn direct_requires_a_branch() {
        let error = parse_cli_args(args(&["--direct"])).expect_err("parse should fail");
        assert!(error.to_string().contains("--direct-branch"));
    }

    #[test]
    fn unknown_flags_are_ignored() {
        let cli = parse_cli_args(args(&["--unknown", "value"])).expect("args should parse");
        assert_eq!(cli, CliArgs::default());
    }
}
