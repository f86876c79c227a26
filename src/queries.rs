use crate::db::{DbResult, MongoDatabase};
use futures::TryStreamExt;
use mongodb::bson::{doc, Bson, Document};
use mongodb::options::{CountOptions, Hint, IndexOptions};
use mongodb::results::UpdateResult;
use mongodb::IndexModel;
use rmcp::schemars;
use serde::Deserialize;
use std::time::Duration;

/// Fields of `buildInfo` passed through by [`MongoDatabase::server_info`].
pub const BUILD_INFO_FIELDS: &[&str] = &[
    "version",
    "gitVersion",
    "modules",
    "allocator",
    "javascriptEngine",
    "sysInfo",
    "storageEngines",
    "debug",
    "maxBsonObjectSize",
    "openssl",
    "buildEnvironment",
    "bits",
    "ok",
];

const SERVER_STATUS_FIELDS: &[&str] = &[
    "host",
    "process",
    "pid",
    "uptime",
    "localTime",
    "connections",
];

pub const DEFAULT_FIND_LIMIT: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum ExplainVerbosity {
    QueryPlanner,
    ExecutionStats,
    AllPlansExecution,
}

impl ExplainVerbosity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::QueryPlanner => "queryPlanner",
            Self::ExecutionStats => "executionStats",
            Self::AllPlansExecution => "allPlansExecution",
        }
    }
}

#[derive(Debug, Default)]
pub struct CountQuery {
    pub filter: Document,
    pub limit: Option<u64>,
    pub skip: Option<u64>,
    pub hint: Option<Hint>,
    pub max_time: Option<Duration>,
}

impl MongoDatabase {
    pub async fn find(
        &self,
        collection: &str,
        filter: Document,
        projection: Document,
        limit: i64,
    ) -> DbResult<Vec<Document>> {
        let cursor = self
            .collection(collection)
            .find(filter)
            .projection(projection)
            .limit(limit)
            .await?;
        Ok(cursor.try_collect().await?)
    }

    pub async fn explain_find(
        &self,
        collection: &str,
        filter: Document,
        projection: Document,
        limit: i64,
        verbosity: ExplainVerbosity,
    ) -> DbResult<Document> {
        let command = doc! {
            "explain": {
                "find": collection,
                "filter": filter,
                "projection": projection,
                "limit": limit,
            },
            "verbosity": verbosity.as_str(),
        };
        Ok(self.database().run_command(command).await?)
    }

    pub async fn aggregate(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> DbResult<Vec<Document>> {
        let cursor = self.collection(collection).aggregate(pipeline).await?;
        Ok(cursor.try_collect().await?)
    }

    pub async fn explain_aggregate(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
        verbosity: ExplainVerbosity,
    ) -> DbResult<Document> {
        let command = doc! {
            "explain": {
                "aggregate": collection,
                "pipeline": pipeline,
                "cursor": {},
            },
            "verbosity": verbosity.as_str(),
        };
        Ok(self.database().run_command(command).await?)
    }

    pub async fn count(&self, collection: &str, query: CountQuery) -> DbResult<u64> {
        let mut options = CountOptions::default();
        options.limit = query.limit;
        options.skip = query.skip;
        options.hint = query.hint;
        options.max_time = query.max_time;

        Ok(self
            .collection(collection)
            .count_documents(query.filter)
            .with_options(options)
            .await?)
    }

    pub async fn distinct(
        &self,
        collection: &str,
        field: &str,
        filter: Document,
    ) -> DbResult<Vec<Bson>> {
        Ok(self.collection(collection).distinct(field, filter).await?)
    }

    pub async fn list_collection_names(&self, filter: Document) -> DbResult<Vec<String>> {
        Ok(self.database().list_collection_names().filter(filter).await?)
    }

    /// Full `listCollections` entries (name, type, options, info, idIndex).
    pub async fn list_collection_specs(&self, filter: Document) -> DbResult<Vec<Document>> {
        let cursor = self
            .database()
            .run_cursor_command(doc! { "listCollections": 1, "filter": filter })
            .await?;
        Ok(cursor.try_collect().await?)
    }

    /// `buildInfo` reduced to [`BUILD_INFO_FIELDS`], plus a `status` section
    /// taken from `serverStatus` when `include_status` is set.
    pub async fn server_info(&self, include_status: bool) -> DbResult<Document> {
        let build_info = self.admin_command(doc! { "buildInfo": 1 }).await?;
        let mut info = pick_fields(&build_info, BUILD_INFO_FIELDS);

        let status = if include_status {
            let server_status = self.admin_command(doc! { "serverStatus": 1 }).await?;
            pick_fields(&server_status, SERVER_STATUS_FIELDS)
        } else {
            Document::new()
        };
        info.insert("status", status);

        Ok(info)
    }

    pub async fn create_index(
        &self,
        collection: &str,
        keys: Document,
        name: Option<String>,
        unique: Option<bool>,
    ) -> DbResult<String> {
        let mut options = IndexOptions::default();
        options.name = name;
        options.unique = unique;
        let model = IndexModel::builder().keys(keys).options(options).build();

        let result = self.collection(collection).create_index(model).await?;
        Ok(result.index_name)
    }

    pub async fn update(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        upsert: bool,
        multi: bool,
    ) -> DbResult<UpdateResult> {
        let coll = self.collection(collection);
        let result = if multi {
            coll.update_many(filter, update).upsert(upsert).await?
        } else {
            coll.update_one(filter, update).upsert(upsert).await?
        };
        Ok(result)
    }

    /// Inserts `documents` and returns their ids in input order.
    pub async fn insert(&self, collection: &str, documents: Vec<Document>) -> DbResult<Vec<Bson>> {
        let result = self.collection(collection).insert_many(documents).await?;
        let mut ids: Vec<(usize, Bson)> = result.inserted_ids.into_iter().collect();
        ids.sort_by_key(|(index, _)| *index);
        Ok(ids.into_iter().map(|(_, id)| id).collect())
    }
}

fn pick_fields(source: &Document, fields: &[&str]) -> Document {
    fields
        .iter()
        .filter_map(|field| source.get(*field).map(|value| (field.to_string(), value.clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pick_fields_keeps_allowlist_order_and_skips_missing() {
        let build_info = doc! {
            "ok": 1.0,
            "version": "7.0.4",
            "gitVersion": "38f3e37",
            "internalFlag": true,
            "bits": 64,
        };

        let picked = pick_fields(&build_info, BUILD_INFO_FIELDS);
        let keys: Vec<&str> = picked.keys().map(String::as_str).collect();
        assert_eq!(keys, ["version", "gitVersion", "bits", "ok"]);
        assert!(!picked.contains_key("internalFlag"));
    }

    #[test]
    fn explain_verbosity_uses_server_names() {
        let parsed: ExplainVerbosity = serde_json::from_str("\"executionStats\"").unwrap();
        assert_eq!(parsed, ExplainVerbosity::ExecutionStats);
        assert_eq!(ExplainVerbosity::AllPlansExecution.as_str(), "allPlansExecution");
        assert!(serde_json::from_str::<ExplainVerbosity>("\"verbose\"").is_err());
    }
}
