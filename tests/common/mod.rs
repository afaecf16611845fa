#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_graphql::Value;
use async_graphql::dynamic::Schema;
use async_trait::async_trait;
use bookshelf::{
    FrontDoor, GraphQLRequest, GraphQLResponse, Link, Server,
    error::LinkError,
    executable::build_schema,
    resolvers::{ResolverMap, int_argument},
    type_system::TypeSystem,
};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

// A server on an ephemeral port, stopped through its shutdown future
pub struct RunningServer {
    pub addr: SocketAddr,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl RunningServer {
    pub async fn start(schema: Schema) -> Self {
        Self::start_with(FrontDoor::new(schema, true), Duration::from_secs(5)).await
    }

    pub async fn start_with(front_door: FrontDoor, grace: Duration) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server = Server::from_listener(listener, front_door, grace);
        let addr = server.local_addr().unwrap();
        let (stop, stopped) = oneshot::channel::<()>();
        let task = tokio::spawn(server.serve(async move {
            let _ = stopped.await;
        }));
        RunningServer {
            addr,
            stop: Some(stop),
            task,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn graphql_url(&self) -> String {
        self.url("/graphql")
    }

    pub fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }

    pub async fn stopped(mut self) {
        self.shutdown();
        (&mut self.task).await.unwrap();
    }
}

// Execute a GraphQL query against a running server and return the JSON body
pub async fn execute_query(
    url: &str,
    query: &str,
    variables: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut request = GraphQLRequest::new(query);
    request.variables = variables;
    reqwest::Client::new()
        .post(url)
        .json(&request)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

/// Serves GraphQL requests from a schema in this process. Every request
/// except introspection is held for `delay` first, and counted.
pub struct InMemoryLink {
    schema: Schema,
    delay: Duration,
    refuse_delegations: bool,
    pub delegated: AtomicUsize,
}

impl InMemoryLink {
    pub fn new(schema: Schema, delay: Duration) -> Self {
        InMemoryLink {
            schema,
            delay,
            refuse_delegations: false,
            delegated: AtomicUsize::new(0),
        }
    }

    /// Answers introspection, then fails every other request the way an
    /// unavailable upstream would.
    pub fn refusing_delegations(schema: Schema) -> Self {
        InMemoryLink {
            refuse_delegations: true,
            ..InMemoryLink::new(schema, Duration::ZERO)
        }
    }
}

#[async_trait]
impl Link for InMemoryLink {
    fn uri(&self) -> &str {
        "memory://authors"
    }

    async fn execute(&self, request: GraphQLRequest) -> Result<GraphQLResponse, LinkError> {
        if request.operation_name.as_deref() != Some("IntrospectionQuery") {
            self.delegated.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.refuse_delegations {
                return Err(LinkError::Status {
                    uri: self.uri().to_string(),
                    status: reqwest::StatusCode::BAD_GATEWAY,
                });
            }
        }

        let mut graphql_request = async_graphql::Request::new(request.query);
        if let Some(variables) = request.variables {
            graphql_request = graphql_request.variables(async_graphql::Variables::from_json(variables));
        }
        let response = self.schema.execute(graphql_request).await;
        let body = serde_json::to_value(&response).unwrap();
        Ok(serde_json::from_value(body).unwrap())
    }
}

/// An authors service with a failing `bio` field and a `BigInt` echo,
/// built from SDL the way the bundled services are.
pub fn extended_authors() -> Schema {
    let type_system = TypeSystem::parse(
        "extended_authors.graphql",
        r#"
        type Query { author(id: Int): Author counter: Counter }
        type Author { name: String bio: String }
        type Counter { add(amount: BigInt): BigInt }
        scalar BigInt
        "#,
    )
    .unwrap();
    let resolvers = ResolverMap::new()
        .local("Query", "author", |ctx| {
            let id = int_argument(ctx, "id")?.unwrap_or_default();
            Ok(Some(Value::from_json(json!({ "name": format!("Author {id}") }))?))
        })
        .unwrap()
        .local("Query", "counter", |_| Ok(Some(Value::from_json(json!({}))?)))
        .unwrap()
        .local("Author", "bio", |_| Err(async_graphql::Error::new("bio backend down")))
        .unwrap()
        .local("Counter", "add", |ctx| {
            Ok(ctx.args.get("amount").map(|amount| amount.as_value().clone()))
        })
        .unwrap();
    build_schema(type_system, resolvers).unwrap()
}

pub fn count(link: &Arc<InMemoryLink>) -> usize {
    link.delegated.load(Ordering::SeqCst)
}
