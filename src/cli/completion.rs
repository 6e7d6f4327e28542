//! Shell completion generation for scratchdata

use clap::CommandFactory;
use clap_complete::{Shell, generate};
use std::io::Write;

use crate::cli::CliArgs;
use crate::error::Result;

/// Generate a shell completion script
///
/// # Arguments
/// * `shell` - Target shell
/// * `out` - Where to write the script
///
/// # Returns
/// * `Result<()>` - Success or error
pub fn generate_completion<W: Write>(shell: Shell, out: &mut W) -> Result<()> {
    let mut cmd = CliArgs::command();
    let bin_name = cmd.get_name().to_string();
    generate(shell, &mut cmd, bin_name, out);
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bash_completion_lists_subcommands() {
        let mut buffer = Vec::new();
        generate_completion(Shell::Bash, &mut buffer).unwrap();
        let script = String::from_utf8(buffer).unwrap();
        assert!(script.contains("scratchdata"));
        assert!(script.contains("query"));
        assert!(script.contains("serve"));
    }

    #[test]
    fn test_fish_completion() {
        let mut buffer = Vec::new();
        generate_completion(Shell::Fish, &mut buffer).unwrap();
        assert!(!buffer.is_empty());
    }
}
