use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "lightbox")]
#[command(about = "Live collection of the images in a folder")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan a folder once and list its images by tag
    #[command(visible_alias = "s")]
    Scan {
        /// Folder to scan (default: current directory)
        #[arg(default_value = ".")]
        dir: PathBuf,

        /// Read each image's pixel dimensions
        #[arg(short, long)]
        dimensions: bool,
    },

    /// Watch a folder and report changes until interrupted
    #[command(visible_alias = "w")]
    Watch {
        /// Folder to watch (default: current directory)
        #[arg(default_value = ".")]
        dir: PathBuf,
    },
}
