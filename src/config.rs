//! Command line and environment configuration.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::{composer::Variant, error::StoreError, logging::LogFormat, store::Library};

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_AUTHORS_PORT: u16 = 3001;
pub const DEFAULT_REMOTE_URL: &str = "http://localhost:3001/graphql";

#[derive(Parser, Debug)]
#[command(name = "bookshelf", version, about)]
pub struct Cli {
    /// Log output format.
    #[arg(long, global = true, value_enum, env = "LOG_FORMAT", default_value = "compact")]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve books and authors from this process.
    Local(ServeArgs),
    /// Serve the authors schema for a stitching gateway.
    Authors(ServeArgs),
    /// Serve books, stitching in the schema of a remote authors service.
    Stitched(StitchedArgs),
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    #[arg(long, env = "BOOKSHELF_HOST", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub host: IpAddr,

    /// Defaults to 3001 for `authors` and 3000 otherwise.
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// YAML file with `books` and `authors` tables; the bundled fixture when
    /// omitted.
    #[arg(long, env = "BOOKSHELF_DATA")]
    pub data: Option<PathBuf>,

    /// Seconds in-flight requests get to finish after a shutdown signal.
    #[arg(long, env = "SHUTDOWN_GRACE", default_value_t = 10)]
    pub shutdown_grace: u64,

    /// Do not serve the GraphiQL console.
    #[arg(long)]
    pub no_graphiql: bool,
}

#[derive(Args, Debug)]
pub struct StitchedArgs {
    #[command(flatten)]
    pub serve: ServeArgs,

    /// GraphQL endpoint of the remote authors service.
    #[arg(long, env = "BOOKSHELF_REMOTE_URL", default_value = DEFAULT_REMOTE_URL)]
    pub remote_url: String,

    /// Seconds to wait for any single remote request.
    #[arg(long, default_value_t = 10)]
    pub remote_timeout: u64,
}

/// Resolved settings for one run of the server.
#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    pub variant: Variant,
    pub addr: SocketAddr,
    pub data: Option<PathBuf>,
    pub shutdown_grace: Duration,
    pub graphiql: bool,
}

impl Settings {
    /// Reads the data file when one is configured.
    pub fn library(&self) -> Result<Library, StoreError> {
        match &self.data {
            Some(path) => Library::load(path),
            None => Library::embedded(),
        }
    }
}

impl Cli {
    pub fn settings(&self) -> Settings {
        let (variant, serve, default_port) = match &self.command {
            Command::Local(serve) => (Variant::Local, serve, DEFAULT_PORT),
            Command::Authors(serve) => (Variant::Authors, serve, DEFAULT_AUTHORS_PORT),
            Command::Stitched(stitched) => (
                Variant::Stitched {
                    remote_url: stitched.remote_url.clone(),
                    timeout: Duration::from_secs(stitched.remote_timeout),
                },
                &stitched.serve,
                DEFAULT_PORT,
            ),
        };

        Settings {
            variant,
            addr: SocketAddr::new(serve.host, serve.port.unwrap_or(default_port)),
            data: serve.data.clone(),
            shutdown_grace: Duration::from_secs(serve.shutdown_grace),
            graphiql: !serve.no_graphiql,
        }
    }
}
