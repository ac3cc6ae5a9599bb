//! `completions`: print a completion script for the given or current shell.

use anyhow::Result;
use clap::CommandFactory;
use clap_complete::{Shell, generate};
use std::io::{self, Write};

use crate::{Cli, CliError};

fn write_completions(shell: Shell, out: &mut dyn Write) {
    let mut cmd = Cli::command();
    let bin = cmd.get_name().to_string();
    generate(shell, &mut cmd, bin, out);
}

/// Generate shell completions to stdout.
///
/// Without an explicit shell, `$SHELL` decides (PowerShell on Windows).
pub(crate) fn cmd_completions(shell: Option<Shell>) -> Result<()> {
    let Some(shell) = shell.or_else(Shell::from_env) else {
        return Err(CliError::Usage(
            "Could not detect the shell; name one, e.g. `uartboot completions bash`".to_string(),
        )
        .into());
    };
    write_completions(shell, &mut io::stdout());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script(shell: Shell) -> String {
        let mut buf = Vec::new();
        write_completions(shell, &mut buf);
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_shell_detection_from_path() {
        assert_eq!(Shell::from_shell_path("/bin/bash"), Some(Shell::Bash));
        assert_eq!(Shell::from_shell_path("/usr/bin/zsh"), Some(Shell::Zsh));
        assert_eq!(Shell::from_shell_path("/usr/local/bin/fish"), Some(Shell::Fish));
        assert_eq!(Shell::from_shell_path("/usr/bin/tcsh"), None);
    }

    #[test]
    fn test_bash_script_names_every_command() {
        let output = script(Shell::Bash);
        for name in ["uartboot", "version", "flash", "run", "list-ports", "completions"] {
            assert!(output.contains(name), "missing {name}");
        }
    }

    #[test]
    fn test_flash_options_are_completed() {
        let output = script(Shell::Zsh);
        assert!(output.contains("--min-line-chars"));
        assert!(output.contains("--no-crc-check"));
    }

    #[test]
    fn test_other_shells_generate_output() {
        for shell in [Shell::Fish, Shell::PowerShell, Shell::Elvish] {
            assert!(!script(shell).is_empty());
        }
    }
}
