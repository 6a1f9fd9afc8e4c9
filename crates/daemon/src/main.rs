//! RootView Daemon
//!
//! Confined directory browsing and file preview over HTTP.

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use daemon::config::Config;
use daemon::files::{ContentDelivery, DirectoryLister, PathResolver};
use daemon::server::{registry_from_config, HttpServer};
use daemon::protocol::FileEntryKind;
use daemon::MeshData;
use tracing_subscriber::EnvFilter;

/// RootView Daemon - browse and preview files inside allowed roots.
#[derive(Parser, Debug)]
#[command(name = "rootview")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (TOML, or YAML by extension)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for the daemon.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the HTTP server
    Serve {
        /// Address to bind (overrides config)
        #[arg(long)]
        bind: Option<IpAddr>,

        /// Port to listen on (overrides config)
        #[arg(long, short)]
        port: Option<u16>,

        /// Allowed root directory; repeat for several (replaces config roots)
        #[arg(long = "root", value_name = "DIR")]
        roots: Vec<PathBuf>,
    },

    /// Validate configuration and print the canonical roots
    Check,

    /// List a directory inside the allowed roots
    Ls {
        /// Path relative to the roots (default: first root)
        #[arg(default_value = "")]
        path: String,

        /// Output in JSON format
        #[arg(long)]
        json: bool,

        /// Include dotfiles
        #[arg(long, short = 'a')]
        hidden: bool,
    },

    /// Decode a .ply file inside the allowed roots and print a summary
    Mesh {
        /// Path relative to the roots
        path: String,
    },
}

fn init_tracing(config: &Config, verbose: bool) {
    let level = if verbose {
        "debug".to_string()
    } else {
        config.daemon.log_level.to_lowercase()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &cli.config {
        Config::load(config_path)?
    } else {
        Config::load_default()?
    };

    // Apply environment variable overrides, then command-line overrides
    config.apply_env_overrides();
    if let Commands::Serve { bind, port, roots } = &cli.command {
        if let Some(bind) = bind {
            config.server.bind = bind.to_string();
        }
        if let Some(port) = port {
            config.server.port = *port;
        }
        if !roots.is_empty() {
            config.roots.allowed_roots = roots.clone();
        }
    }

    init_tracing(&config, cli.verbose);
    if let Some(config_path) = &cli.config {
        tracing::info!(path = %config_path.display(), "Using config file");
    }

    // Validate configuration
    config.validate()?;

    match cli.command {
        Commands::Serve { .. } => {
            tracing::info!("RootView daemon starting");
            let server = HttpServer::from_config(&config).await?;
            server.run().await?;
        }
        Commands::Check => {
            let registry = registry_from_config(&config)?;
            println!("Configuration OK");
            println!("  Listen:   {}:{}", config.server.bind, config.server.port);
            if registry.is_empty() {
                println!("  Roots:    (none; nothing will be served)");
            }
            for root in registry.to_protocol() {
                println!("  Root {}:   {} ({})", root.index, root.path, root.name);
            }
        }
        Commands::Ls {
            path,
            json,
            hidden,
        } => {
            let registry = Arc::new(registry_from_config(&config)?);
            let resolver =
                PathResolver::new(registry.clone()).with_max_path_len(config.preview.max_path_len);
            let lister = DirectoryLister::new(registry);

            let resolved = resolver
                .resolve(&path)
                .with_context(|| format!("Cannot open {path:?}"))?;
            let listing = lister.listing(&resolved, hidden)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&listing)?);
            } else {
                for entry in &listing.entries {
                    let size = entry.size.map(|s| s.to_string()).unwrap_or_default();
                    println!("{:<5} {:>12}  {}", kind_label(entry.kind), size, entry.name);
                }
            }
        }
        Commands::Mesh { path } => {
            let registry = Arc::new(registry_from_config(&config)?);
            let resolver = PathResolver::new(registry).with_max_path_len(config.preview.max_path_len);
            let delivery = ContentDelivery::new(config.preview.delivery_options());

            let resolved = resolver
                .resolve(&path)
                .with_context(|| format!("Cannot open {path:?}"))?;
            let mesh = delivery.decode_mesh(&resolved).await?;
            print_mesh_summary(&mesh);
        }
    }

    Ok(())
}

fn kind_label(kind: FileEntryKind) -> &'static str {
    match kind {
        FileEntryKind::File => "file",
        FileEntryKind::Directory => "dir",
        FileEntryKind::SymlinkFile => "link",
        FileEntryKind::SymlinkDirectory => "ldir",
        FileEntryKind::Other => "other",
        FileEntryKind::Inaccessible => "?",
    }
}

fn print_mesh_summary(mesh: &MeshData) {
    let mut min = [f64::INFINITY; 3];
    let mut max = [f64::NEG_INFINITY; 3];
    for vertex in &mesh.vertices {
        for axis in 0..3 {
            min[axis] = min[axis].min(vertex.position[axis]);
            max[axis] = max[axis].max(vertex.position[axis]);
        }
    }

    println!("Vertices: {}", mesh.vertices.len());
    match &mesh.faces {
        Some(faces) => println!("Faces:    {} ({} skipped)", faces.len(), mesh.skipped_faces),
        None => println!("Faces:    none (point cloud)"),
    }
    println!("Colors:   {}", if mesh.has_color { "per-vertex" } else { "default" });
    println!(
        "Bounds:   [{:.3}, {:.3}, {:.3}] .. [{:.3}, {:.3}, {:.3}]",
        min[0], min[1], min[2], max[0], max[1], max[2]
    );
}
