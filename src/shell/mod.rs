//! Shell command normalization for `created_by` history entries.
//!
//! Build steps run through `sh -c` or `bash -c` are parsed and reprinted in a
//! canonical layout. Anything that fails to parse is kept as written and the
//! parse error travels alongside it.

mod ast;
mod lexer;
mod parser;
mod printer;

pub use crate::error::ShellFormatError;

/// Marker the builder puts in history entries that only change image
/// metadata (`ENV`, `LABEL`, `CMD`, ...).
pub const METADATA_MARKER: &str = "#(nop)";

/// Result of normalizing one command string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    pub text: String,
    pub error: Option<ShellFormatError>,
}

impl Normalized {
    fn unchanged(command: &str) -> Self {
        Self {
            text: command.to_string(),
            error: None,
        }
    }
}

pub fn is_metadata_only(command: &str) -> bool {
    command.contains(METADATA_MARKER)
}

/// Last path segment of the command's first whitespace-separated word.
fn shell_name(command: &str) -> &str {
    let program = command.split(char::is_whitespace).next().unwrap_or_default();
    program.rsplit('/').next().unwrap_or(program)
}

pub fn is_shell(command: &str) -> bool {
    matches!(shell_name(command), "sh" | "bash")
}

/// Reprint shell-executed commands canonically.
///
/// Metadata-only and non-shell commands come back untouched. When parsing
/// fails the original text is returned together with the error.
pub fn normalize(command: &str) -> Normalized {
    if is_metadata_only(command) || !is_shell(command) {
        return Normalized::unchanged(command);
    }
    match format(command) {
        Ok(text) => Normalized { text, error: None },
        Err(error) => {
            tracing::debug!(%error, "keeping shell command as written");
            Normalized {
                text: command.to_string(),
                error: Some(error),
            }
        }
    }
}

/// Parse `src` as a shell program and print it back without the trailing
/// newline.
pub fn format(src: &str) -> Result<String, ShellFormatError> {
    let list = parser::parse(src)?;
    let mut text = printer::print(&list);
    if text.ends_with('\n') {
        text.pop();
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_shell_commands_are_identity() {
        for command in [
            "",
            "python3 -c 'print(1)'",
            "/usr/bin/zsh -c echo   hi",
            "/bin/bashrc -c echo   hi",
            "COPY file:abc in /",
        ] {
            assert_eq!(normalize(command), Normalized::unchanged(command));
        }
    }

    #[test]
    fn shell_name_is_matched_exactly() {
        assert!(is_shell("/bin/sh -c true"));
        assert!(is_shell("bash -c true"));
        assert!(is_shell("/usr/local/bin/bash"));
        assert!(!is_shell("/bin/zsh -c true"));
        assert!(!is_shell("/bin/bashrc -c true"));
        assert!(!is_shell("shell -c true"));
    }

    #[test]
    fn metadata_only_commands_pass_through() {
        let command = "/bin/sh -c #(nop)  CMD [\"bash\"]";
        assert_eq!(normalize(command), Normalized::unchanged(command));
    }

    #[test]
    fn collapses_whitespace_in_shell_commands() {
        let normalized = normalize("/bin/sh -c echo   hi");
        assert_eq!(normalized.text, "/bin/sh -c echo hi");
        assert_eq!(normalized.error, None);
    }

    #[test]
    fn quoted_scripts_are_kept_verbatim() {
        let normalized = normalize("/bin/sh -c \"echo   hi\"");
        assert_eq!(normalized.text, "/bin/sh -c \"echo   hi\"");
        assert_eq!(normalized.error, None);
    }

    #[test]
    fn malformed_commands_keep_original_text() {
        let command = "/bin/sh -c \"echo \\\"unterminated";
        let normalized = normalize(command);
        assert_eq!(normalized.text, command);
        let error = normalized.error.expect("parse error");
        assert_eq!(error.line, 1);
        assert!(error.to_string().starts_with("1:12: "));
    }

    #[test]
    fn formats_typical_run_steps() {
        let command = "/bin/sh -c set -eux;     apt-get update;     apt-get install -y --no-install-recommends \t\tca-certificates \t\tcurl \t; \trm -rf /var/lib/apt/lists/*";
        assert_eq!(
            normalize(command).text,
            "/bin/sh -c set -eux; apt-get update; apt-get install -y --no-install-recommends ca-certificates curl; rm -rf /var/lib/apt/lists/*"
        );

        let command = "/bin/sh -c apt-get update \\\n && apt-get install -y git \\\n && rm -rf /var/lib/apt/lists/*";
        assert_eq!(
            normalize(command).text,
            "/bin/sh -c apt-get update &&\n\tapt-get install -y git &&\n\trm -rf /var/lib/apt/lists/*"
        );
    }

    #[test]
    fn command_substitution_of_a_subshell_is_not_made_arithmetic() {
        let normalized = normalize("/bin/sh -c echo $( (cd /src && make) )");
        assert_eq!(normalized.text, "/bin/sh -c echo $( (cd /src && make))");
        assert_eq!(normalized.error, None);
        assert_eq!(normalize(&normalized.text), normalized);
    }

    #[test]
    fn common_dockerfile_shapes_normalize_cleanly() {
        let normalized = normalize("/bin/sh -c apt-get update && \\\n    apt-get install -y curl");
        assert_eq!(normalized.text, "/bin/sh -c apt-get update &&\n\tapt-get install -y curl");

        let normalized = normalize("/bin/sh -c a &&\n# comment\nb");
        assert_eq!(normalized.text, "/bin/sh -c a &&\n\t# comment\n\tb");

        let normalized = normalize("/bin/sh -c echo \"cost: $'5\"");
        assert_eq!(normalized.text, "/bin/sh -c echo \"cost: $'5\"");
        assert_eq!(normalized.error, None);
    }

    #[test]
    fn hostile_nesting_is_a_per_command_error() {
        let command = format!("/bin/sh -c echo {}a{}", "$(".repeat(50_000), ")".repeat(50_000));
        let normalized = normalize(&command);
        assert_eq!(normalized.text, command);
        assert!(normalized.error.is_some());
    }

    #[test]
    fn multi_line_output_drops_only_final_newline() {
        let text = format("if a\nthen\nb\nfi").unwrap();
        assert_eq!(text, "if a; then\n\tb\nfi");
    }
}
