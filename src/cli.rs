// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines all subcommands and their arguments.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "stackwright")]
#[command(about = "Deploy recipe-defined application stacks to remote machines over SSH")]
#[command(version)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check that a recipe parses and its template renders with defaults
    Validate {
        /// Path to the recipe file
        recipe: PathBuf,
    },

    /// Print a recipe's rendered manifest
    Render {
        /// Path to the recipe file
        recipe: PathBuf,

        /// Option value as key=value (repeatable)
        #[arg(long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,
    },

    /// Deploy a recipe to a target and wait for it to finish
    Deploy {
        /// Path to the recipe file
        recipe: PathBuf,

        /// Target as [user@]host[:port]
        #[arg(short, long)]
        target: String,

        /// Option value as key=value (repeatable)
        #[arg(long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,

        /// Directory of recipes available as dependencies
        #[arg(long)]
        recipes: Option<PathBuf>,

        /// Provision missing dependencies before deploying
        #[arg(long)]
        auto_provision: bool,

        /// Only print the final result
        #[arg(short, long, conflicts_with = "json")]
        quiet: bool,

        /// Print events as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Stop a stack and remove its containers and files
    Remove {
        /// Stack name as printed by deploy
        stack: String,

        /// Target as [user@]host[:port]
        #[arg(short, long)]
        target: String,

        /// Also remove named volumes
        #[arg(long)]
        volumes: bool,
    },
}
