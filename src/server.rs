//! The HTTP front door: `/graphql`, the GraphiQL console and graceful
//! shutdown of the accept loop.

use std::convert::Infallible;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_graphql::{dynamic::Schema, http::GraphiQLSource};
use bytes::Bytes;
use http_body_util::{BodyExt, Full, combinators::BoxBody};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode, header};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use hyper_util::server::graceful::GracefulShutdown;
use serde_json::json;
use tokio::net::TcpListener;

use crate::error::Error;

type Body = BoxBody<Bytes, hyper::Error>;

// Create a response body from a string
fn full<T: Into<Bytes>>(value: T) -> Body {
    Full::new(value.into())
        .map_err(|never| match never {})
        .boxed()
}

/// Routes requests to the composed schema. Built once the schema is ready
/// and shared read-only by every connection.
pub struct FrontDoor {
    schema: Schema,
    graphiql_html: Option<String>,
}

impl FrontDoor {
    pub fn new(schema: Schema, graphiql: bool) -> Self {
        let graphiql_html = graphiql.then(|| GraphiQLSource::build().endpoint("/graphql").finish());
        FrontDoor {
            schema,
            graphiql_html,
        }
    }

    pub async fn handle(&self, req: Request<Incoming>) -> Result<Response<Body>, Infallible> {
        tracing::debug!("{} {}", req.method(), req.uri().path());

        let response = match (req.method(), req.uri().path()) {
            (&Method::OPTIONS, _) => Response::builder()
                .header("Access-Control-Allow-Methods", "GET, POST, OPTIONS")
                .header("Access-Control-Allow-Headers", "Content-Type, Authorization")
                .body(full("")),

            (&Method::POST, "/graphql") => return Ok(self.graphql(req).await),

            (_, "/graphql") => Response::builder()
                .status(StatusCode::METHOD_NOT_ALLOWED)
                .header(header::ALLOW, "POST")
                .body(full("Method Not Allowed")),

            (&Method::GET, "/graphiql") if self.graphiql_html.is_some() => Response::builder()
                .header(header::CONTENT_TYPE, "text/html; charset=utf-8")
                .body(full(self.graphiql_html.clone().unwrap_or_default())),

            (&Method::GET, "/") if self.graphiql_html.is_some() => Response::builder()
                .status(StatusCode::FOUND)
                .header(header::LOCATION, "/graphiql")
                .body(full("")),

            _ => Response::builder()
                .status(StatusCode::NOT_FOUND)
                .body(full("Not Found")),
        };

        Ok(with_cors(response.unwrap_or_else(|_| internal_server_error())))
    }

    async fn graphql(&self, req: Request<Incoming>) -> Response<Body> {
        let body_bytes = match req.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => return bad_request(format!("Failed to read request body: {e}")),
        };

        let request = match serde_json::from_slice::<async_graphql::Request>(&body_bytes) {
            Ok(request) => request,
            Err(e) => return bad_request(format!("Invalid JSON request: {e}")),
        };

        let response = self.schema.execute(request).await;
        if response.is_err() {
            tracing::debug!("Query completed with {} errors", response.errors.len());
        }

        let response = match serde_json::to_vec(&response) {
            Ok(body) => Response::builder()
                .header(header::CONTENT_TYPE, "application/json")
                .body(full(body))
                .unwrap_or_else(|_| internal_server_error()),
            Err(e) => {
                tracing::error!("Failed to serialize response: {}", e);
                internal_server_error()
            }
        };
        with_cors(response)
    }
}

fn bad_request(message: String) -> Response<Body> {
    let body = json!({ "errors": [{ "message": message }] }).to_string();
    let response = Response::builder()
        .status(StatusCode::BAD_REQUEST)
        .header(header::CONTENT_TYPE, "application/json")
        .body(full(body))
        .unwrap_or_else(|_| internal_server_error());
    with_cors(response)
}

fn with_cors(mut response: Response<Body>) -> Response<Body> {
    response.headers_mut().insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        header::HeaderValue::from_static("*"),
    );
    response
}

// Create a standard internal server error response
fn internal_server_error() -> Response<Body> {
    let mut response = Response::new(full("Internal Server Error"));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
}

/// A bound listener plus the front door it serves. Binding happens only once
/// a schema exists, so a failed composition never opens the port.
pub struct Server {
    listener: TcpListener,
    front_door: Arc<FrontDoor>,
    grace: Duration,
}

impl Server {
    pub async fn bind(addr: SocketAddr, front_door: FrontDoor, grace: Duration) -> Result<Self, Error> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| Error::Bind { addr, source })?;
        Ok(Self::from_listener(listener, front_door, grace))
    }

    pub fn from_listener(listener: TcpListener, front_door: FrontDoor, grace: Duration) -> Self {
        Server {
            listener,
            front_door: Arc::new(front_door),
            grace,
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until `shutdown` completes, then stops accepting
    /// and waits up to the grace period for open connections to finish.
    pub async fn serve<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let Server {
            listener,
            front_door,
            grace,
        } = self;
        let builder = auto::Builder::new(TokioExecutor::new());
        let graceful = GracefulShutdown::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            tracing::warn!("Failed to accept connection: {}", e);
                            continue;
                        }
                    };
                    tracing::debug!("Accepted connection from {}", peer);

                    let front_door = Arc::clone(&front_door);
                    let service = service_fn(move |req| {
                        let front_door = Arc::clone(&front_door);
                        async move { front_door.handle(req).await }
                    });
                    let connection = builder
                        .serve_connection_with_upgrades(TokioIo::new(stream), service)
                        .into_owned();
                    let connection = graceful.watch(connection);
                    tokio::spawn(async move {
                        if let Err(e) = connection.await {
                            tracing::debug!("Error processing connection from {}: {}", peer, e);
                        }
                    });
                }
                () = &mut shutdown => break,
            }
        }

        drop(listener);
        tracing::info!("Stopped accepting connections, draining for up to {:?}", grace);
        tokio::select! {
            () = graceful.shutdown() => tracing::info!("All connections closed"),
            () = tokio::time::sleep(grace) => {
                tracing::warn!("Grace period elapsed with connections still open")
            }
        }
    }
}

/// SIGINT and SIGTERM, registered up front so a signal delivered while the
/// schema is still being composed is not lost.
pub struct ShutdownSignal {
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl ShutdownSignal {
    #[cfg(unix)]
    pub fn install() -> io::Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};

        Ok(ShutdownSignal {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    #[cfg(not(unix))]
    pub fn install() -> io::Result<Self> {
        Ok(ShutdownSignal {})
    }

    #[cfg(unix)]
    pub async fn recv(mut self) {
        tokio::select! {
            _ = self.interrupt.recv() => tracing::info!("Received SIGINT"),
            _ = self.terminate.recv() => tracing::info!("Received SIGTERM"),
        }
        tracing::info!("Shutting down gracefully...");
    }

    #[cfg(not(unix))]
    pub async fn recv(self) {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            return std::future::pending().await;
        }
        tracing::info!("Shutting down gracefully...");
    }
}
