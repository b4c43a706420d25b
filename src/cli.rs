// CLI definitions using clap

use clap::{Parser, Subcommand};
use splitkb_keyboard::{Half, KeyboardVariant};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "splitkb")]
#[command(author, version, about = "Keymap editor for VIA split keyboards")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Work against a simulated keyboard (no hardware access)
    #[arg(long, global = true)]
    pub demo: bool,

    /// Keyboard variant: main or protoboard
    #[arg(long, global = true)]
    pub variant: Option<KeyboardVariant>,

    /// Per-command response deadline in milliseconds
    #[arg(long = "timeout-ms", global = true, value_name = "MS")]
    pub timeout_ms: Option<u64>,

    /// Config file (default: ~/.config/splitkb/config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set
    #[arg(long = "log-level", global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    // === Device Commands ===
    /// List connected VIA keyboard halves
    #[command(visible_aliases = ["ls", "l"])]
    List,

    /// Show protocol version, layer count and uptime of each half
    #[command(visible_aliases = ["version", "ver", "v"])]
    Info,

    /// Read one keycode from the keyboard
    Get {
        /// Key position (e.g. left-0-3)
        key: String,

        /// Layer number
        #[arg(short, long, default_value = "0")]
        layer: u8,
    },

    /// Write one keycode to the keyboard (e.g. KC_A, MO(1), 0x7E00)
    Set {
        /// Key position (e.g. right-2-4)
        key: String,

        /// Keycode name
        keycode: String,

        /// Layer number
        #[arg(short, long, default_value = "0")]
        layer: u8,

        /// Also record the assignment in the local keymap
        #[arg(long)]
        save: bool,
    },

    /// Read a whole layer from the keyboard
    Read {
        /// Layer number
        #[arg(default_value = "0")]
        layer: u8,

        /// Only read this half (left or right)
        #[arg(long)]
        half: Option<Half>,

        /// Merge the result into the local keymap
        #[arg(long)]
        save: bool,
    },

    /// Push a layer from the local keymap to the keyboard
    #[command(visible_aliases = ["push"])]
    Write {
        /// Layer number
        #[arg(default_value = "0")]
        layer: u8,

        /// Only write this half (left or right)
        #[arg(long)]
        half: Option<Half>,
    },

    /// Restore the firmware's default keymap
    Reset {
        /// Only reset this half (left or right)
        #[arg(long)]
        half: Option<Half>,

        /// Also restore layer 0 of the local keymap
        #[arg(long)]
        local: bool,
    },

    /// Reboot a half into its bootloader
    #[command(visible_aliases = ["dfu"])]
    Bootloader {
        /// Half to reboot
        half: Half,
    },

    // === Local Keymap Commands ===
    /// Print a layer of the local keymap
    Show {
        /// Layer number
        #[arg(default_value = "0")]
        layer: usize,
    },

    /// Export the local keymap as JSON
    Export {
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Import a keymap document, replacing the local keymap
    Import {
        /// JSON file produced by `export`
        file: PathBuf,
    },

    /// Copy one local layer onto another
    #[command(name = "copy-layer")]
    CopyLayer {
        /// Source layer
        from: usize,
        /// Destination layer
        to: usize,
    },

    /// Remove every assignment from a local layer
    #[command(name = "clear-layer")]
    ClearLayer {
        /// Layer number
        layer: usize,
    },

    /// Write the effective settings to the config file
    #[command(name = "save-config")]
    SaveConfig,
}
