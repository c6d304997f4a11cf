//! The `config` command.

use super::load_settings;
use crate::output::{self, OutputFormat};
use anyhow::Result;

/// Show the effective settings, optionally writing them to the config file.
pub fn config(save: bool, format: &OutputFormat) -> Result<()> {
    let (paths, settings) = load_settings()?;

    if save {
        settings.save(&paths)?;
    }

    let shown = settings.redacted();
    match format {
        OutputFormat::Json => output::print_json(&shown),
        OutputFormat::Text => {
            output::print_heading("Settings");
            output::print_row("Config file", &paths.config_file().display().to_string());
            output::print_row("Project", &shown.project_id);
            output::print_row("Write key", &shown.write_key);
            output::print_row("Collector", &shown.collector_url);
            output::print_row("Sweep interval", &format!("{}s", shown.sweep_interval_secs));
            output::print_row("Sweep batch", &shown.sweep_batch_size.to_string());
            let ceiling = match shown.max_attempts {
                0 => "unlimited".to_string(),
                n => n.to_string(),
            };
            output::print_row("Max attempts", &ceiling);
            let cache = settings
                .resolved_cache_path(&paths)
                .map_or_else(|| "disabled".to_string(), |path| path.display().to_string());
            output::print_row("Cache", &cache);
            output::print_row("Log level", &shown.log_level);
        }
    }

    if save {
        output::print_success(
            &format!("Settings written to {}", paths.config_file().display()),
            format,
        );
    }
    Ok(())
}
