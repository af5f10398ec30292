use clap::{Args, Subcommand};

use crate::config::Config;

#[derive(Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show the active configuration
    Show,
    /// Print the config file path
    Path,
}

impl ConfigCommand {
    pub fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            ConfigSubcommand::Show => {
                println!("database_path: {}", config.database_path.display());
                match config.owner_id {
                    Some(owner_id) => println!("owner_id: {}", owner_id),
                    None => println!("owner_id: (not set)"),
                }
                println!("auto_sync: {}", config.auto_sync);
                println!(
                    "remote.base_url: {}",
                    config.remote.base_url.as_deref().unwrap_or("(not set)")
                );
                println!(
                    "remote.api_key: {}",
                    if config.remote.api_key.is_some() {
                        "(set)"
                    } else {
                        "(not set)"
                    }
                );
                println!("remote.bucket: {}", config.remote.bucket);
            }
            ConfigSubcommand::Path => {
                println!("{}", Config::default_config_path().display());
            }
        }
        Ok(())
    }
}
