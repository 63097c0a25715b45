use std::process::{Command, Output};

pub fn stderr_trimmed(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}

pub fn stderr_or_status(output: &Output) -> String {
    let stderr = stderr_trimmed(output);
    if stderr.is_empty() {
        format!("exit status {}", output.status)
    } else {
        stderr
    }
}

pub fn execute_command(command: &[String]) -> std::io::Result<()> {
    let Some((binary, args)) = command.split_first() else {
        return Ok(());
    };

    let output = Command::new(binary).args(args).output()?;
    if output.status.success() {
        return Ok(());
    }

    Err(std::io::Error::other(format!(
        "{binary} failed: {}",
        stderr_or_status(&output)
    )))
}

pub fn command_output(command: &[String]) -> std::io::Result<String> {
    let Some((binary, args)) = command.split_first() else {
        return Ok(String::new());
    };

    let output = Command::new(binary).args(args).output()?;
    if !output.status.success() {
        return Err(std::io::Error::other(format!(
            "{binary} failed: {}",
            stderr_or_status(&output)
        )));
    }

    String::from_utf8(output.stdout)
        .map_err(|error| std::io::Error::other(format!("{binary} output utf8 decode failed: {error}")))
}
