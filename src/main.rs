// ABOUTME: Entry point for the stevedore CLI application.
// ABOUTME: Parses arguments, sets up logging and dispatches to the image services.

mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use serde::Serialize;
use serde_json::json;
use std::env;
use std::fs::OpenOptions;
use std::sync::Mutex;
use stevedore::classify::{Operation, StructuredError, classify};
use stevedore::config::{self, Config, LoggingConfig};
use stevedore::error::Result;
use stevedore::images::{
    BatchStatus, PushRequest, add_tag, check_login, delete_images, list_images, push_images,
    remove_tag,
};
use stevedore::proxy::ProxySettings;
use stevedore::runtime::{Engine, EngineConnector, LocalConnector, RegistryCredentials};
use stevedore::server;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

fn init_logging(logging: &LoggingConfig, verbose: bool) -> Result<()> {
    let default = if verbose { "debug" } else { logging.level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    match &logging.dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let name = format!("stevedore-{}.log", chrono::Local::now().format("%Y-%m-%d"));
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(dir.join(name))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(true)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print an error envelope and return the failure exit code.
fn print_error(error: &StructuredError) -> Result<i32> {
    print_json(&json!({ "error": error }))?;
    Ok(1)
}

/// Open an engine connection, or print why not.
fn connect(config: &Config) -> std::result::Result<Box<dyn Engine>, StructuredError> {
    LocalConnector::new(config.engine.clone())
        .connect()
        .map_err(|e| classify(Operation::CreateClient, "", &e))
}

fn exit_code(status: BatchStatus) -> i32 {
    match status {
        BatchStatus::Error => 1,
        BatchStatus::Success | BatchStatus::Partial => 0,
    }
}

async fn run(cli: Cli) -> Result<i32> {
    let cwd = env::current_dir()?;

    if let Commands::Init { force } = cli.command {
        init_logging(&LoggingConfig::default(), cli.verbose)?;
        let path = config::init_config(&cwd, force)?;
        println!("Wrote {}", path.display());
        return Ok(0);
    }

    let config = Config::resolve(cli.config.as_deref(), &cwd)?;
    init_logging(&config.logging, cli.verbose)?;

    match cli.command {
        Commands::Init { .. } => Ok(0),
        Commands::Serve { listen } => {
            let mut config = config;
            if let Some(addr) = listen {
                config.listen = addr;
            }
            server::serve(&config).await?;
            Ok(0)
        }
        Commands::Images => {
            let engine = match connect(&config) {
                Ok(engine) => engine,
                Err(e) => return print_error(&e),
            };
            match list_images(engine.as_ref()).await {
                Ok(images) => {
                    print_json(&images)?;
                    Ok(0)
                }
                Err(e) => print_error(&classify(e.operation(), "", &e)),
            }
        }
        Commands::Delete { ids } => {
            let engine = match connect(&config) {
                Ok(engine) => engine,
                Err(e) => return print_error(&e),
            };
            let report = delete_images(engine.as_ref(), &ids).await;
            print_json(&report)?;
            Ok(exit_code(report.status))
        }
        Commands::Push {
            ids,
            username,
            password,
            proxy_type,
            proxy_server,
        } => {
            let proxy = match ProxySettings::from_request(
                proxy_type.as_deref(),
                proxy_server.as_deref(),
            ) {
                Ok(proxy) => proxy,
                Err(e) => return print_error(&classify(Operation::ParseRequest, "", &e)),
            };
            let request = PushRequest {
                image_ids: ids,
                credentials: RegistryCredentials::new(username, password)
                    .with_server(config.registry.server.as_str()),
                proxy,
            };

            let connector = LocalConnector::new(config.engine.clone());
            let manager = config.proxy.manager();
            match push_images(&connector, &manager, &request).await {
                Ok(report) => {
                    print_json(&report)?;
                    Ok(exit_code(report.status))
                }
                Err(e) => print_error(e.structured()),
            }
        }
        Commands::Tag { image, tag } => {
            let engine = match connect(&config) {
                Ok(engine) => engine,
                Err(e) => return print_error(&e),
            };
            match add_tag(engine.as_ref(), &image, &tag).await {
                Ok(report) => {
                    print_json(&report)?;
                    Ok(0)
                }
                Err(e) => print_error(&classify(e.operation(), &image, &e)),
            }
        }
        Commands::Untag { image, tag } => {
            let engine = match connect(&config) {
                Ok(engine) => engine,
                Err(e) => return print_error(&e),
            };
            match remove_tag(engine.as_ref(), &image, &tag).await {
                Ok(report) => {
                    print_json(&report)?;
                    Ok(0)
                }
                Err(e) => print_error(&classify(e.operation(), &image, &e)),
            }
        }
        Commands::CheckProxy {
            proxy_type,
            proxy_server,
        } => {
            let settings = match proxy_type.parse() {
                Ok(proxy_type) => ProxySettings {
                    proxy_type,
                    address: proxy_server,
                },
                Err(e) => return print_error(&classify(Operation::ParseRequest, "", &e)),
            };
            match config.proxy.checker().check(&settings).await {
                Ok(check) => {
                    print_json(&check)?;
                    Ok(0)
                }
                Err(e) => print_error(&classify(Operation::CheckProxy, "", &e)),
            }
        }
        Commands::CheckRegistry {
            username,
            password,
            server,
        } => {
            let server = server.unwrap_or_else(|| config.registry.server.clone());
            let credentials = RegistryCredentials::new(username, password).with_server(&server);
            let engine = match connect(&config) {
                Ok(engine) => engine,
                Err(e) => return print_error(&e),
            };
            match check_login(engine.as_ref(), &credentials).await {
                Ok(()) => {
                    print_json(&json!({ "status": "success", "server": server }))?;
                    Ok(0)
                }
                Err(e) => print_error(e.structured()),
            }
        }
    }
}
