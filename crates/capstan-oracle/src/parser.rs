use crate::process::run_with_stdin;
use capstan_schema::{ManifestError, ManifestParser, ParsedManifest, VarEnv};
use tracing::debug;

/// Manifest parser backed by an external helper process.
///
/// The helper owns the full manifest grammar and condition language:
/// `<helper> parse` reads manifest text on stdin and emits the parsed JSON
/// shape on stdout; `<helper> eval <expr>` reads the variable environment as
/// JSON on stdin and prints `true` or `false`.
pub struct CommandParser {
    parser_bin: String,
}

impl CommandParser {
    pub fn new(parser_bin: impl Into<String>) -> Self {
        Self {
            parser_bin: parser_bin.into(),
        }
    }
}

impl ManifestParser for CommandParser {
    fn parse(&self, text: &str) -> Result<ParsedManifest, ManifestError> {
        debug!("{} parse ({} bytes)", self.parser_bin, text.len());
        let stdout = run_with_stdin(&self.parser_bin, &["parse".to_owned()], text)
            .map_err(|e| ManifestError::Helper(e.to_string()))?;
        Ok(serde_json::from_str(&stdout)?)
    }

    fn evaluate_condition(&self, expr: &str, vars: &VarEnv) -> Result<bool, ManifestError> {
        let vars_json = serde_json::to_string(vars)?;
        let stdout = run_with_stdin(
            &self.parser_bin,
            &["eval".to_owned(), expr.to_owned()],
            &vars_json,
        )
        .map_err(|e| ManifestError::Helper(e.to_string()))?;
        match stdout.trim() {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(ManifestError::Helper(format!(
                "unexpected condition result '{other}' for '{expr}'"
            ))),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    /// Write an executable helper script and return its path as a string.
    fn helper_script(dir: &std::path::Path, body: &str) -> String {
        let path = dir.join("helper.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path.display().to_string()
    }

    #[test]
    fn parse_decodes_helper_output() {
        let dir = tempfile::tempdir().unwrap();
        // Echo a fixed parsed manifest regardless of input
        let bin = helper_script(
            dir.path(),
            r#"cat > /dev/null; echo '{"deps": {"lib": {"url": "https://example.com/l.git@r1"}}}'"#,
        );
        let parser = CommandParser::new(bin);
        let manifest = parser.parse("deps = {}").unwrap();
        assert_eq!(manifest.deps.len(), 1);
        assert!(manifest.deps.contains_key("lib"));
    }

    #[test]
    fn eval_decodes_boolean() {
        let dir = tempfile::tempdir().unwrap();
        let bin = helper_script(dir.path(), "cat > /dev/null; echo true");
        let parser = CommandParser::new(bin);
        assert!(parser.evaluate_condition("whatever", &VarEnv::new()).unwrap());
    }

    #[test]
    fn helper_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let bin = helper_script(dir.path(), "exit 3");
        let parser = CommandParser::new(bin);
        let err = parser.parse("deps = {}").unwrap_err();
        assert!(matches!(err, ManifestError::Helper(_)));
    }

    #[test]
    fn unexpected_eval_output_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let bin = helper_script(dir.path(), "cat > /dev/null; echo maybe");
        let parser = CommandParser::new(bin);
        let err = parser
            .evaluate_condition("expr", &VarEnv::new())
            .unwrap_err();
        assert!(matches!(err, ManifestError::Helper(_)));
    }
}
