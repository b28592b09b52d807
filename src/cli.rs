// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines all subcommands and their arguments.

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "stevedore")]
#[command(about = "Image housekeeping and registry pushes for Docker and Podman")]
#[command(version)]
pub struct Cli {
    /// Configuration file (default: discovered in the working directory)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP API
    Serve {
        /// Listen address (overrides the config file)
        #[arg(short, long)]
        listen: Option<SocketAddr>,
    },

    /// List local images as JSON
    Images,

    /// Force-remove images and report reclaimed space
    Delete {
        /// Image ids or tags
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Push every tag of the given images to the registry
    Push {
        /// Image ids or tags
        #[arg(required = true)]
        ids: Vec<String>,

        #[arg(short, long)]
        username: String,

        #[arg(short, long, env = "STEVEDORE_PASSWORD", hide_env_values = true)]
        password: String,

        /// http, https or socks5
        #[arg(long, requires = "proxy_server")]
        proxy_type: Option<String>,

        /// Proxy address, e.g. http://10.0.0.1:3128
        #[arg(long, requires = "proxy_type")]
        proxy_server: Option<String>,
    },

    /// Add a tag to an image
    Tag {
        /// Image id or existing tag
        image: String,

        /// New tag; a bare repository gets :latest
        tag: String,
    },

    /// Remove one of an image's tags, keeping the image
    Untag {
        /// Image id
        image: String,

        /// Tag to remove
        tag: String,
    },

    /// Check that a proxy grants a tunnel to the registry
    CheckProxy {
        /// http, https or socks5
        #[arg(long)]
        proxy_type: String,

        /// Proxy address, e.g. socks5://10.0.0.1:1080
        #[arg(long)]
        proxy_server: String,
    },

    /// Log in to the registry without pushing anything
    CheckRegistry {
        #[arg(short, long)]
        username: String,

        #[arg(short, long, env = "STEVEDORE_PASSWORD", hide_env_values = true)]
        password: String,

        /// Registry address (overrides the config file)
        #[arg(long)]
        server: Option<String>,
    },

    /// Initialize a new stevedore.yml configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
