//! Configuration management commands.

use kiln_core::Config;

use crate::ConfigAction;

pub fn handle(action: ConfigAction, config: &Config) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => {
            println!("# Effective configuration");
            println!("# (defaults < {} < .kiln/config.toml < KILN_* env)\n", Config::config_dir().join("config.toml").display());
            println!("{}", config.to_toml_string()?);
        }
        ConfigAction::Validate => {
            let result = config.validate();
            for issue in result.errors() {
                println!("error   {}: {}", issue.field, issue.message);
            }
            for issue in result.warnings() {
                println!("warning {}: {}", issue.field, issue.message);
            }
            if result.is_ok() {
                println!("Configuration is valid.");
            } else {
                anyhow::bail!("configuration has {} error(s)", result.errors().len());
            }
        }
    }
    Ok(())
}
