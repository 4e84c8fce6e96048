//! Config command implementation.

use crate::cli::args::{ConfigCommands, OutputFormat};
use crate::config::{Config, Paths};
use crate::error::OffsyncError;
use crate::output::to_json;

/// Execute config subcommands.
///
/// # Errors
///
/// Returns an error if the config cannot be serialized or written, or if
/// `init` would overwrite an existing file without `--force`.
pub fn config(
    paths: &Paths,
    config: &Config,
    cmd: ConfigCommands,
    format: OutputFormat,
) -> Result<String, OffsyncError> {
    match cmd {
        ConfigCommands::Show => match format {
            OutputFormat::Json => to_json(config),
            OutputFormat::Pretty => Ok(format!(
                "# {}\n{}",
                paths.config_file.display(),
                config.to_yaml()?.trim_end()
            )),
        },
        ConfigCommands::Init { force } => {
            if paths.config_file.exists() && !force {
                return Err(OffsyncError::Config(format!(
                    "{} already exists (use --force to overwrite)",
                    paths.config_file.display()
                )));
            }
            paths.ensure_dirs()?;
            Config::default().save_to_path(&paths.config_file)?;
            Ok(format!("Wrote {}", paths.config_file.display()))
        },
    }
}
