//! MCP handlers for mongo-insights-mcp: MongoDB tools, the insights memo
//! resource and the demo prompt.

use crate::convert::{self, ArgError};
use crate::db::{DbResult, MongoDatabase};
use crate::prompts;
use crate::queries::{CountQuery, ExplainVerbosity, DEFAULT_FIND_LIMIT};
use rmcp::{
    handler::server::{
        router::{prompt::PromptRouter, tool::ToolRouter},
        wrapper::Parameters,
    },
    model::{
        AnnotateAble, CallToolResult, Content, ErrorData as McpError, GetPromptRequestParam,
        GetPromptResult, Implementation, ListPromptsResult, ListResourcesResult,
        PaginatedRequestParam, PromptMessage, PromptMessageRole, ProtocolVersion, RawResource,
        ReadResourceRequestParam, ReadResourceResult, Resource, ResourceContents,
        ServerCapabilities, ServerInfo,
    },
    prompt, prompt_handler, prompt_router, schemars,
    service::RequestContext,
    tool, tool_handler, tool_router, RoleServer, ServerHandler,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub const MEMO_URI: &str = "memo://insights";
const MEMO_SCHEME: &str = "memo";
const MEMO_PATH: &str = "insights";

// =============================================================================
// Parameter types
// =============================================================================

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct QueryParams {
    /// Name of the collection to query.
    pub collection: String,
    /// MongoDB query filter, as an object or a JSON string.
    #[serde(default)]
    pub filter: Option<Value>,
    /// Fields to include/exclude.
    #[serde(default)]
    pub projection: Option<Value>,
    /// Maximum number of documents to return (default: 100).
    #[serde(default)]
    pub limit: Option<i64>,
    /// Return the execution plan instead of documents.
    #[serde(default)]
    pub explain: Option<ExplainVerbosity>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct AggregateParams {
    /// Name of the collection to aggregate.
    pub collection: String,
    /// Aggregation pipeline stages. An empty pipeline returns every document.
    #[serde(default)]
    pub pipeline: Option<Vec<Value>>,
    /// Return the execution plan instead of results.
    #[serde(default)]
    pub explain: Option<ExplainVerbosity>,
}

#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfoParams {
    /// Include a snapshot of serverStatus under "status".
    #[serde(default)]
    pub include_debug_info: bool,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct CountParams {
    /// Name of the collection to count documents in.
    pub collection: String,
    /// MongoDB query filter.
    #[serde(default, alias = "filter")]
    pub query: Option<Value>,
    /// Maximum number of documents to count.
    #[serde(default)]
    pub limit: Option<u64>,
    /// Number of documents to skip before counting.
    #[serde(default)]
    pub skip: Option<u64>,
    /// Index name or key pattern to force the query plan.
    #[serde(default)]
    pub hint: Option<Value>,
    /// Maximum time in milliseconds to allow the count to run.
    #[serde(default, rename = "maxTimeMS")]
    pub max_time_ms: Option<u64>,
}

fn default_name_only() -> bool {
    true
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListCollectionsParams {
    /// Return only collection names (default: true). Set false for full collection info.
    #[serde(default = "default_name_only")]
    pub name_only: bool,
    /// Filter applied to the collection list.
    #[serde(default)]
    pub filter: Option<Value>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct DistinctParams {
    /// Name of the collection.
    pub collection: String,
    /// Field to collect distinct values for.
    pub field: String,
    /// MongoDB query filter.
    #[serde(default)]
    pub filter: Option<Value>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct CreateIndexParams {
    /// Name of the collection.
    pub collection: String,
    /// Index key pattern, e.g. {"region": 1, "createdAt": -1}.
    pub keys: Value,
    /// Index name. Generated by the server when omitted.
    #[serde(default)]
    pub name: Option<String>,
    /// Enforce uniqueness of the indexed fields.
    #[serde(default)]
    pub unique: Option<bool>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct UpdateParams {
    /// Name of the collection.
    pub collection: String,
    /// Selects the documents to update.
    pub filter: Value,
    /// Update operators, e.g. {"$set": {"status": "shipped"}}.
    pub update: Value,
    /// Insert a document when nothing matches.
    #[serde(default)]
    pub upsert: bool,
    /// Update every matching document instead of the first one.
    #[serde(default)]
    pub multi: bool,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct InsertParams {
    /// Name of the collection.
    pub collection: String,
    /// Documents to insert.
    pub documents: Vec<Value>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct AppendInsightParams {
    /// Business insight discovered from the data analysis.
    pub insight: String,
}

#[derive(Debug, Serialize, Deserialize, schemars::JsonSchema)]
pub struct DemoPromptArgs {
    /// Topic to seed the database with initial data.
    pub topic: String,
}

// =============================================================================
// Resource resolution
// =============================================================================

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ResourceError {
    #[error("Unsupported URI scheme: {0}")]
    UnsupportedScheme(String),
    #[error("Unknown resource path: {0}")]
    UnknownPath(String),
}

/// Checks that `uri` names the insights memo.
pub fn resolve_memo_uri(uri: &str) -> Result<(), ResourceError> {
    let (scheme, rest) = uri.split_once(':').unwrap_or(("", uri));
    if !scheme.eq_ignore_ascii_case(MEMO_SCHEME) {
        return Err(ResourceError::UnsupportedScheme(scheme.to_string()));
    }
    match rest.strip_prefix("//") {
        Some(MEMO_PATH) => Ok(()),
        Some(path) => Err(ResourceError::UnknownPath(path.to_string())),
        None => Err(ResourceError::UnknownPath(rest.to_string())),
    }
}

fn memo_resource() -> Resource {
    let mut resource = RawResource::new(MEMO_URI, "Business Insights Memo");
    resource.description = Some("A living document of discovered business insights".to_string());
    resource.mime_type = Some("text/plain".to_string());
    resource.no_annotation()
}

// =============================================================================
// Server implementation
// =============================================================================

/// MCP server exposing a MongoDB database and the insights memo.
#[derive(Clone)]
pub struct MongoServer {
    db: Arc<MongoDatabase>,
    tool_router: ToolRouter<Self>,
    prompt_router: PromptRouter<Self>,
}

impl MongoServer {
    /// Creates a new server with the given database.
    #[must_use]
    pub fn new(db: MongoDatabase) -> Self {
        Self {
            db: Arc::new(db),
            tool_router: Self::tool_router(),
            prompt_router: Self::prompt_router(),
        }
    }

    /// Renders the memo if `uri` names it.
    pub fn read_memo(&self, uri: &str) -> Result<String, ResourceError> {
        resolve_memo_uri(uri)?;
        Ok(self.db.insights().render())
    }
}

fn json_response(value: &Value) -> CallToolResult {
    CallToolResult::success(vec![Content::text(value.to_string())])
}

/// Rejected arguments become in-band `Error: ...` results, like driver failures.
fn checked(
    tool: &'static str,
    outcome: Result<CallToolResult, ArgError>,
) -> Result<CallToolResult, McpError> {
    Ok(outcome.unwrap_or_else(|e| {
        tracing::warn!(tool, error = %e, "Rejected tool arguments");
        CallToolResult::error(vec![Content::text(format!("Error: {e}"))])
    }))
}

/// Driver failures become in-band `Error: ...` results.
fn respond<T>(
    tool: &'static str,
    result: DbResult<T>,
    render: impl FnOnce(T) -> Value,
) -> CallToolResult {
    match result {
        Ok(value) => json_response(&render(value)),
        Err(e) => {
            tracing::error!(tool, error = %e, "MongoDB operation failed");
            CallToolResult::error(vec![Content::text(format!("Error: {e}"))])
        }
    }
}

impl MongoServer {
    async fn run_query(&self, params: QueryParams) -> Result<CallToolResult, ArgError> {
        let collection = convert::collection_name(&params.collection)?;
        let filter = convert::optional_document(params.filter, "filter")?;
        let projection = convert::optional_document(params.projection, "projection")?;
        let limit = match params.limit {
            None => DEFAULT_FIND_LIMIT,
            Some(limit) if limit > 0 => limit,
            Some(_) => return Err(ArgError::NotPositive { field: "limit" }),
        };
        tracing::debug!(collection, limit, "Handling query");

        Ok(match params.explain {
            Some(verbosity) => respond(
                "query",
                self.db
                    .explain_find(collection, filter, projection, limit, verbosity)
                    .await,
                |plan| convert::to_json(plan.into()),
            ),
            None => respond(
                "query",
                self.db.find(collection, filter, projection, limit).await,
                convert::documents_to_json,
            ),
        })
    }

    async fn run_aggregate(&self, params: AggregateParams) -> Result<CallToolResult, ArgError> {
        let collection = convert::collection_name(&params.collection)?;
        let stages = params.pipeline.ok_or(ArgError::Missing { field: "pipeline" })?;
        let pipeline = convert::to_documents(stages, "pipeline stage")?;
        tracing::debug!(collection, stages = pipeline.len(), "Handling aggregate");

        Ok(match params.explain {
            Some(verbosity) => respond(
                "aggregate",
                self.db
                    .explain_aggregate(collection, pipeline, verbosity)
                    .await,
                |plan| convert::to_json(plan.into()),
            ),
            None => respond(
                "aggregate",
                self.db.aggregate(collection, pipeline).await,
                convert::documents_to_json,
            ),
        })
    }

    async fn run_count(&self, params: CountParams) -> Result<CallToolResult, ArgError> {
        let collection = convert::collection_name(&params.collection)?;
        let query = CountQuery {
            filter: convert::optional_document(params.query, "query")?,
            limit: params.limit,
            skip: params.skip,
            hint: params.hint.map(convert::to_hint).transpose()?,
            max_time: params.max_time_ms.map(Duration::from_millis),
        };
        tracing::debug!(collection, "Handling count");

        Ok(respond(
            "count",
            self.db.count(collection, query).await,
            |count| json!(count),
        ))
    }

    async fn run_list_collections(
        &self,
        params: ListCollectionsParams,
    ) -> Result<CallToolResult, ArgError> {
        let filter = convert::optional_document(params.filter, "filter")?;
        tracing::debug!(name_only = params.name_only, "Handling listCollections");

        Ok(if params.name_only {
            respond(
                "listCollections",
                self.db.list_collection_names(filter).await,
                |names| json!(names),
            )
        } else {
            respond(
                "listCollections",
                self.db.list_collection_specs(filter).await,
                convert::documents_to_json,
            )
        })
    }

    async fn run_distinct(&self, params: DistinctParams) -> Result<CallToolResult, ArgError> {
        let collection = convert::collection_name(&params.collection)?;
        if params.field.trim().is_empty() {
            return Err(ArgError::Empty { field: "field" });
        }
        let filter = convert::optional_document(params.filter, "filter")?;
        tracing::debug!(collection, field = %params.field, "Handling distinct");

        Ok(respond(
            "distinct",
            self.db.distinct(collection, &params.field, filter).await,
            |values| Value::Array(values.into_iter().map(convert::to_json).collect()),
        ))
    }

    async fn run_create_index(
        &self,
        params: CreateIndexParams,
    ) -> Result<CallToolResult, ArgError> {
        let collection = convert::collection_name(&params.collection)?;
        let keys = convert::to_document(params.keys, "keys")?;
        if keys.is_empty() {
            return Err(ArgError::Empty { field: "keys" });
        }
        tracing::debug!(collection, "Handling createIndex");

        Ok(respond(
            "createIndex",
            self.db
                .create_index(collection, keys, params.name, params.unique)
                .await,
            |index_name| json!({ "indexName": index_name }),
        ))
    }

    async fn run_update(&self, params: UpdateParams) -> Result<CallToolResult, ArgError> {
        let collection = convert::collection_name(&params.collection)?;
        let filter = convert::to_document(params.filter, "filter")?;
        let update = convert::to_document(params.update, "update")?;
        if update.is_empty() {
            return Err(ArgError::Empty { field: "update" });
        }
        tracing::debug!(collection, multi = params.multi, upsert = params.upsert, "Handling update");

        Ok(respond(
            "update",
            self.db
                .update(collection, filter, update, params.upsert, params.multi)
                .await,
            |result| {
                json!({
                    "matchedCount": result.matched_count,
                    "modifiedCount": result.modified_count,
                    "upsertedId": result.upserted_id.map(convert::to_json),
                })
            },
        ))
    }

    async fn run_insert(&self, params: InsertParams) -> Result<CallToolResult, ArgError> {
        let collection = convert::collection_name(&params.collection)?;
        if params.documents.is_empty() {
            return Err(ArgError::Empty { field: "documents" });
        }
        let documents = convert::to_documents(params.documents, "document")?;
        tracing::debug!(collection, count = documents.len(), "Handling insert");

        Ok(respond(
            "insert",
            self.db.insert(collection, documents).await,
            |ids| json!({ "insertedIds": ids.into_iter().map(convert::to_json).collect::<Vec<_>>() }),
        ))
    }
}

#[tool_router]
impl MongoServer {
    /// Run a find query.
    #[tool(
        description = "Execute a MongoDB query. Returns matching documents as a JSON array (relaxed Extended JSON). Default limit: 100; limit must be positive. Set explain to queryPlanner, executionStats or allPlansExecution to get the execution plan instead. Access to system.* collections is denied."
    )]
    async fn query(
        &self,
        Parameters(params): Parameters<QueryParams>,
    ) -> Result<CallToolResult, McpError> {
        checked("query", self.run_query(params).await)
    }

    /// Run an aggregation pipeline.
    #[tool(
        description = "Execute a MongoDB aggregation pipeline. Returns the resulting documents as a JSON array. An empty pipeline returns every document. Set explain to get the execution plan instead."
    )]
    async fn aggregate(
        &self,
        Parameters(params): Parameters<AggregateParams>,
    ) -> Result<CallToolResult, McpError> {
        checked("aggregate", self.run_aggregate(params).await)
    }

    /// Describe the server build.
    #[tool(
        name = "serverInfo",
        description = "Get MongoDB server information: version, git version, modules, allocator, JavaScript engine, system info, storage engines, debug flag, max BSON object size, OpenSSL, build environment and bits. Set includeDebugInfo for a serverStatus snapshot (host, process, pid, uptime, connections)."
    )]
    async fn server_info(
        &self,
        Parameters(params): Parameters<ServerInfoParams>,
    ) -> Result<CallToolResult, McpError> {
        tracing::debug!(include_debug_info = params.include_debug_info, "Handling serverInfo");
        Ok(respond(
            "serverInfo",
            self.db.server_info(params.include_debug_info).await,
            |info| convert::to_json(info.into()),
        ))
    }

    /// Count matching documents.
    #[tool(
        description = "Count the number of documents in a collection that match a query. Returns the count as a number."
    )]
    async fn count(
        &self,
        Parameters(params): Parameters<CountParams>,
    ) -> Result<CallToolResult, McpError> {
        checked("count", self.run_count(params).await)
    }

    /// List collections in the database.
    #[tool(
        name = "listCollections",
        description = "List all collections in the MongoDB database. Returns a JSON array of names, or full collection info when nameOnly is false."
    )]
    async fn list_collections(
        &self,
        Parameters(params): Parameters<ListCollectionsParams>,
    ) -> Result<CallToolResult, McpError> {
        checked("listCollections", self.run_list_collections(params).await)
    }

    /// Distinct values of a field.
    #[tool(
        description = "Return the distinct values of a field in a collection, optionally restricted by a filter. Returns a JSON array."
    )]
    async fn distinct(
        &self,
        Parameters(params): Parameters<DistinctParams>,
    ) -> Result<CallToolResult, McpError> {
        checked("distinct", self.run_distinct(params).await)
    }

    /// Create an index.
    #[tool(
        name = "createIndex",
        description = "Create an index on a collection. Returns {\"indexName\": \"...\"}."
    )]
    async fn create_index(
        &self,
        Parameters(params): Parameters<CreateIndexParams>,
    ) -> Result<CallToolResult, McpError> {
        checked("createIndex", self.run_create_index(params).await)
    }

    /// Update documents.
    #[tool(
        description = "Update documents in a collection. Updates the first match unless multi is true. Returns {\"matchedCount\", \"modifiedCount\", \"upsertedId\"}."
    )]
    async fn update(
        &self,
        Parameters(params): Parameters<UpdateParams>,
    ) -> Result<CallToolResult, McpError> {
        checked("update", self.run_update(params).await)
    }

    /// Insert documents.
    #[tool(
        description = "Insert new documents into a collection. Returns {\"insertedIds\": [...]} in input order."
    )]
    async fn insert(
        &self,
        Parameters(params): Parameters<InsertParams>,
    ) -> Result<CallToolResult, McpError> {
        checked("insert", self.run_insert(params).await)
    }

    /// Record a business insight.
    #[tool(
        description = "Add a business insight to the memo at memo://insights. Insights are kept in the order they are added for the lifetime of the server."
    )]
    async fn append_insight(
        &self,
        Parameters(params): Parameters<AppendInsightParams>,
    ) -> Result<CallToolResult, McpError> {
        let insights = self.db.insights();
        insights.append(params.insight);
        tracing::debug!(total = insights.len(), "Recorded insight");
        Ok(CallToolResult::success(vec![Content::text(
            "Insight added to memo",
        )]))
    }
}

#[prompt_router]
impl MongoServer {
    /// A prompt to seed the database with initial data and demonstrate what you can do with a MongoDB MCP server
    #[prompt(name = "mcp-demo")]
    async fn mcp_demo(
        &self,
        Parameters(args): Parameters<DemoPromptArgs>,
    ) -> Result<GetPromptResult, McpError> {
        tracing::debug!(topic = %args.topic, "Generated demo prompt");
        Ok(GetPromptResult {
            description: Some(prompts::demo_description(&args.topic)),
            messages: vec![PromptMessage::new_text(
                PromptMessageRole::User,
                prompts::render_demo_prompt(&args.topic),
            )],
        })
    }
}

#[tool_handler]
#[prompt_handler]
impl ServerHandler for MongoServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder()
                .enable_prompts()
                .enable_resources()
                .enable_tools()
                .build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(format!(
                "MongoDB MCP server for database '{}'. Record findings with append_insight and read them back from {MEMO_URI}.",
                self.db.name()
            )),
        }
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParam>,
        _: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, McpError> {
        Ok(ListResourcesResult::with_all_items(vec![memo_resource()]))
    }

    async fn read_resource(
        &self,
        request: ReadResourceRequestParam,
        _: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, McpError> {
        tracing::debug!(uri = %request.uri, "Handling read_resource");
        let memo = self.read_memo(&request.uri).map_err(|e| {
            tracing::error!(error = %e, "Cannot resolve resource");
            McpError::resource_not_found(e.to_string(), Some(json!({ "uri": request.uri })))
        })?;
        Ok(ReadResourceResult {
            contents: vec![ResourceContents::text(memo, request.uri)],
        })
    }
}
