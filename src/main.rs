//! splitkb CLI
//!
//! Reads and writes the dynamic keymap of VIA split keyboards, one half at a
//! time, and manages a local copy of the keymap.

mod cli;
mod commands;
mod config;

use clap::Parser;
use cli::{Cli, Commands};
use config::AppConfig;
use tracing::debug;

fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let config_path = cli.config.clone().unwrap_or_else(AppConfig::default_path);
    let config = AppConfig::load(&config_path)?.merge_cli(&cli);
    debug!("Using config {:?} from {}", config, config_path.display());

    match cli.command {
        None | Some(Commands::List) => {
            commands::device::list(&config).await?;
        }
        Some(Commands::Info) => {
            commands::device::info(&config).await?;
        }
        Some(Commands::Get { key, layer }) => {
            commands::keymap::get(&config, &key, layer).await?;
        }
        Some(Commands::Set {
            key,
            keycode,
            layer,
            save,
        }) => {
            commands::keymap::set(&config, &key, &keycode, layer, save).await?;
        }
        Some(Commands::Read { layer, half, save }) => {
            commands::keymap::read(&config, layer, half, save).await?;
        }
        Some(Commands::Write { layer, half }) => {
            commands::keymap::write(&config, layer, half).await?;
        }
        Some(Commands::Reset { half, local }) => {
            commands::device::reset(&config, half, local).await?;
        }
        Some(Commands::Bootloader { half }) => {
            commands::device::bootloader(&config, half).await?;
        }
        Some(Commands::Show { layer }) => {
            commands::keymap::show(&config, layer)?;
        }
        Some(Commands::Export { output }) => {
            commands::keymap::export(&config, output.as_deref())?;
        }
        Some(Commands::Import { file }) => {
            commands::keymap::import(&config, &file)?;
        }
        Some(Commands::CopyLayer { from, to }) => {
            commands::keymap::copy_layer(&config, from, to)?;
        }
        Some(Commands::ClearLayer { layer }) => {
            commands::keymap::clear_layer(&config, layer)?;
        }
        Some(Commands::SaveConfig) => {
            config.save(&config_path)?;
            println!("Saved config to {}", config_path.display());
        }
    }

    Ok(())
}
