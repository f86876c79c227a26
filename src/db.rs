use crate::insights::InsightLedger;
use mongodb::{bson::Document, Client, Collection, Database};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("{0}")]
    Mongo(#[from] mongodb::error::Error),
    #[error("connection string names no database; pass --database or DB_NAME")]
    NoDatabase,
}

pub type DbResult<T> = Result<T, DbError>;

/// The process-wide MongoDB handle together with the insights ledger.
///
/// The driver connects lazily, so constructing this never touches the network
/// for plain `mongodb://` URIs.
#[derive(Debug)]
pub struct MongoDatabase {
    client: Client,
    db: Database,
    insights: InsightLedger,
}

impl MongoDatabase {
    /// Opens the database named by `database`, falling back to the one in the URI path.
    pub async fn connect(uri: &str, database: Option<&str>) -> DbResult<Self> {
        let client = Client::with_uri_str(uri).await?;
        let db = match database {
            Some(name) => client.database(name),
            None => client.default_database().ok_or(DbError::NoDatabase)?,
        };
        tracing::debug!(database = db.name(), "Initialized MongoDB client");

        Ok(Self {
            client,
            db,
            insights: InsightLedger::new(),
        })
    }

    pub fn name(&self) -> &str {
        self.db.name()
    }

    pub fn insights(&self) -> &InsightLedger {
        &self.insights
    }

    pub(crate) fn database(&self) -> &Database {
        &self.db
    }

    pub(crate) fn collection(&self, name: &str) -> Collection<Document> {
        self.db.collection(name)
    }

    /// Runs an administrative command against the `admin` database.
    pub(crate) async fn admin_command(&self, command: Document) -> DbResult<Document> {
        Ok(self.client.database("admin").run_command(command).await?)
    }
}
