use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use bookshelf::{
    FrontDoor, Server, ShutdownSignal,
    config::{Cli, Settings},
    error::{Error, InitError},
    logging,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = logging::init(cli.log_format) {
        eprintln!("Failed to initialize logging: {e}");
    }

    match run(cli.settings()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(settings: Settings) -> Result<(), Error> {
    let shutdown = ShutdownSignal::install().map_err(Error::Signal)?;

    let library = Arc::new(settings.library().map_err(InitError::from)?);
    tracing::info!(
        "Loaded {} books and {} authors",
        library.book_count(),
        library.author_count()
    );

    let schema = bookshelf::compose(&settings.variant, library).await?;
    let front_door = FrontDoor::new(schema, settings.graphiql);
    let server = Server::bind(settings.addr, front_door, settings.shutdown_grace).await?;

    let addr = server.local_addr().unwrap_or(settings.addr);
    tracing::info!(
        "Bookshelf ({}) listening on http://{}/graphql",
        settings.variant,
        addr
    );
    if settings.graphiql {
        tracing::info!("GraphiQL UI available at http://{}/graphiql", addr);
    }

    server.serve(shutdown.recv()).await;
    tracing::info!("Server stopped");
    Ok(())
}
