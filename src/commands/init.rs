use std::path::Path;

use anyhow::{Result, bail};
use outagecal_core::config::Settings;

pub fn run(path: Option<&Path>, force: bool) -> Result<()> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => Settings::config_path()?,
    };

    if path.exists() && !force {
        bail!(
            "{} already exists. Use --force to overwrite it.",
            path.display()
        );
    }

    Settings::create_default_config(&path)?;
    println!("Wrote {}", path.display());
    println!("Set your queue and calendar account there, then run `outagecal sync --dry-run`.");

    Ok(())
}
