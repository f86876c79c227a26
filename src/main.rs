use clap::{Parser, ValueEnum};
use mongo_insights_mcp::{MongoDatabase, MongoServer};
use rmcp::transport::streamable_http_server::{
    session::local::LocalSessionManager, StreamableHttpService,
};
use rmcp::{transport::stdio, ServiceExt};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Transport {
    /// Serve a single host over stdin/stdout
    Stdio,
    /// Streamable HTTP at /mcp
    Http,
}

#[derive(Parser)]
#[command(name = "mongo-insights-mcp")]
#[command(about = "An MCP server exposing a MongoDB database as tools, with a living business insights memo")]
struct Args {
    /// MongoDB connection string
    #[arg(long, env = "DB_URI", hide_env_values = true)]
    db_uri: String,

    /// Database to use instead of the one named in the connection string
    #[arg(long, env = "DB_NAME")]
    database: Option<String>,

    /// Transport to serve MCP over
    #[arg(long, value_enum, env = "MCP_TRANSPORT", default_value = "stdio")]
    transport: Transport,

    /// Port to listen on (http transport)
    #[arg(short, long, default_value = "3000")]
    port: u16,

    /// Host to bind to (http transport)
    #[arg(long, default_value = "127.0.0.1")]
    host: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout belongs to the stdio transport.
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let db = MongoDatabase::connect(&args.db_uri, args.database.as_deref()).await?;
    tracing::info!(database = db.name(), "Starting MongoDB MCP server");
    let server = MongoServer::new(db);

    match args.transport {
        Transport::Stdio => {
            let service = server.serve(stdio()).await?;
            tracing::info!("Server running with stdio transport");
            service.waiting().await?;
        }
        Transport::Http => {
            let service = StreamableHttpService::new(
                move || Ok(server.clone()),
                LocalSessionManager::default().into(),
                Default::default(),
            );

            let app = axum::Router::new().nest_service("/mcp", service);
            let addr = format!("{}:{}", args.host, args.port);
            let listener = tokio::net::TcpListener::bind(&addr).await?;

            tracing::info!("MongoDB MCP server listening on http://{}/mcp", addr);

            axum::serve(listener, app).await?;
        }
    }

    Ok(())
}
