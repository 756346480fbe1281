use crate::OracleError;
use std::io::Write;
use std::process::{Command, Stdio};

/// Run a command to completion and return its stdout. Non-zero exit becomes
/// `OracleError::CommandFailed` with the captured stderr.
pub(crate) fn run_command(bin: &str, args: &[String]) -> Result<String, OracleError> {
    let output = Command::new(bin).args(args).output()?;
    check_output(bin, output)
}

/// Like [`run_command`], but feeds `input` to the child's stdin.
pub(crate) fn run_with_stdin(
    bin: &str,
    args: &[String],
    input: &str,
) -> Result<String, OracleError> {
    let mut child = Command::new(bin)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;
    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(input.as_bytes())?;
    }
    let output = child.wait_with_output()?;
    check_output(bin, output)
}

fn check_output(bin: &str, output: std::process::Output) -> Result<String, OracleError> {
    if !output.status.success() {
        return Err(OracleError::CommandFailed {
            command: bin.to_owned(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
        });
    }
    String::from_utf8(output.stdout).map_err(|e| OracleError::MalformedOutput {
        command: bin.to_owned(),
        detail: format!("stdout is not UTF-8: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_command_captures_stdout() {
        let out = run_command("echo", &["hello".to_owned()]).unwrap();
        assert_eq!(out.trim(), "hello");
    }

    #[test]
    fn run_command_nonzero_exit_fails() {
        let err = run_command("false", &[]).unwrap_err();
        assert!(matches!(err, OracleError::CommandFailed { .. }));
    }

    #[test]
    fn run_command_missing_binary_fails() {
        let err = run_command("capstan-no-such-binary", &[]).unwrap_err();
        assert!(matches!(err, OracleError::Io(_)));
    }

    #[test]
    fn run_with_stdin_feeds_input() {
        let out = run_with_stdin("cat", &[], "piped input").unwrap();
        assert_eq!(out, "piped input");
    }
}
