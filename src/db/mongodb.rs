//! MongoDB adapter.
//!
//! Queries are JSON documents (see `DocumentQuery`) rather than SQL. Schema is
//! inferred from one sampled document per collection.

use crate::db::adapter::{CONNECT_TIMEOUT, DatabaseAdapter, POOL_MAX_CONNECTIONS, connect_error};
use crate::error::{DbError, DbResult};
use crate::models::{
    Column, ColumnMetadata, ConnectionConfig, DatabaseType, DocumentOperation, DocumentQuery,
    QueryParam, QueryResult, Schema, Table,
};
use async_trait::async_trait;
use futures_util::TryStreamExt;
use mongodb::bson::{Bson, Document, doc};
use mongodb::options::ClientOptions;
use mongodb::{Client, Database};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Aggregation stages that write.
const WRITE_STAGES: &[&str] = &["$out", "$merge"];

#[derive(Debug, Default)]
pub struct MongoAdapter {
    client: Option<Client>,
    database: Option<Database>,
    schema_cache: Option<Arc<Schema>>,
}

impl MongoAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn database(&self) -> DbResult<&Database> {
        self.database
            .as_ref()
            .ok_or_else(|| DbError::no_connection("MongoDB adapter is not connected"))
    }

    /// Build a `mongodb://` connection string with percent-encoded credentials.
    pub fn connection_uri(config: &ConnectionConfig) -> DbResult<String> {
        let port = if config.port == 0 {
            DatabaseType::MongoDB.default_port().unwrap_or(27017)
        } else {
            config.port
        };
        let mut uri = url::Url::parse(&format!("mongodb://{}:{}/", config.host, port))
            .map_err(|e| DbError::invalid_input(format!("Invalid MongoDB host: {}", e)))?;

        if !config.username.is_empty() {
            uri.set_username(&config.username)
                .map_err(|_| DbError::invalid_input("Invalid MongoDB username"))?;
            uri.set_password(Some(&config.password))
                .map_err(|_| DbError::invalid_input("Invalid MongoDB password"))?;
            uri.query_pairs_mut().append_pair("authSource", "admin");
        }
        if config.use_tls {
            uri.query_pairs_mut().append_pair("tls", "true");
        }
        Ok(uri.to_string())
    }

    async fn fetch_schema(db: &Database) -> DbResult<Schema> {
        let mut names = db.list_collection_names().await?;
        names.retain(|n| !n.starts_with("system."));
        names.sort();

        let mut tables = Vec::with_capacity(names.len());
        for name in names {
            let collection = db.collection::<Document>(&name);
            let mut table = Table::new(name.clone(), None);

            match collection.estimated_document_count().await {
                Ok(n) => table.row_count = Some(n),
                Err(e) => warn!(collection = %name, error = %e, "Failed to count documents"),
            }

            if let Some(sample) = collection.find_one(doc! {}).await? {
                table.columns = sample
                    .iter()
                    .map(|(key, value)| {
                        let is_id = key == "_id";
                        Column::new(key.clone(), bson_type_name(value), !is_id).primary_key(is_id)
                    })
                    .collect();
            }
            tables.push(table);
        }

        Ok(Schema::new(tables))
    }

    async fn run_query(db: &Database, query: DocumentQuery) -> DbResult<QueryResult> {
        let start = Instant::now();
        let collection = db.collection::<Document>(&query.collection);
        let limit = query.effective_limit();

        // One extra document tells us whether the cap cut the result
        let cursor = match query.operation {
            DocumentOperation::Find => {
                let filter = optional_document(query.filter.as_ref(), "filter")?;
                let mut find = collection.find(filter).limit((limit + 1) as i64);
                if let Some(projection) = query.projection.as_ref() {
                    find = find.projection(json_to_document(projection, "projection")?);
                }
                if let Some(sort) = query.sort.as_ref() {
                    find = find.sort(json_to_document(sort, "sort")?);
                }
                find.await?
            }
            DocumentOperation::Aggregate => {
                let mut pipeline = query
                    .pipeline
                    .as_deref()
                    .unwrap_or_default()
                    .iter()
                    .map(|stage| json_to_document(stage, "pipeline stage"))
                    .collect::<DbResult<Vec<_>>>()?;
                reject_write_stages(&pipeline)?;
                pipeline.push(doc! { "$limit": (limit + 1) as i64 });
                collection.aggregate(pipeline).await?
            }
        };

        let mut documents: Vec<Document> = cursor.try_collect().await?;
        let truncated = documents.len() as u64 > limit;
        documents.truncate(limit as usize);
        if truncated {
            warn!(row_cap = limit, "Query result truncated");
        }

        let (columns, rows) = documents_to_rows(documents);
        Ok(QueryResult::new(
            columns,
            rows,
            start.elapsed().as_millis() as u64,
            truncated,
        ))
    }
}

/// Short type alias for a BSON value, as shown in schema context.
pub fn bson_type_name(value: &Bson) -> &'static str {
    match value {
        Bson::Double(_) => "double",
        Bson::String(_) => "string",
        Bson::Document(_) => "object",
        Bson::Array(_) => "array",
        Bson::Boolean(_) => "bool",
        Bson::Null => "null",
        Bson::Int32(_) => "int",
        Bson::Int64(_) => "long",
        Bson::ObjectId(_) => "objectId",
        Bson::DateTime(_) => "date",
        Bson::Decimal128(_) => "decimal",
        _ => "mixed",
    }
}

/// Convert extended JSON into a BSON document.
fn json_to_document(value: &JsonValue, what: &str) -> DbResult<Document> {
    match Bson::try_from(value.clone()) {
        Ok(Bson::Document(doc)) => Ok(doc),
        Ok(_) => Err(DbError::invalid_sql(format!(
            "MongoDB {} must be a JSON object",
            what
        ))),
        Err(e) => Err(DbError::invalid_sql(format!("Invalid MongoDB {}: {}", what, e))),
    }
}

fn optional_document(value: Option<&JsonValue>, what: &str) -> DbResult<Document> {
    match value {
        Some(v) => json_to_document(v, what),
        None => Ok(Document::new()),
    }
}

fn reject_write_stages(pipeline: &[Document]) -> DbResult<()> {
    for stage in pipeline {
        for key in stage.keys() {
            if WRITE_STAGES.contains(&key.as_str()) {
                return Err(DbError::dangerous_query(
                    key.clone(),
                    format!("Aggregation stage '{}' writes data and is not allowed", key),
                ));
            }
        }
    }
    Ok(())
}

/// Flatten documents into rows; columns are the union of top-level keys in
/// order of first appearance.
fn documents_to_rows(
    documents: Vec<Document>,
) -> (Vec<ColumnMetadata>, Vec<serde_json::Map<String, JsonValue>>) {
    let mut columns: Vec<ColumnMetadata> = Vec::new();
    let mut rows = Vec::with_capacity(documents.len());

    for document in documents {
        for (key, value) in document.iter() {
            if !columns.iter().any(|c| &c.name == key) {
                columns.push(ColumnMetadata::new(key.clone(), bson_type_name(value)));
            }
        }
        match Bson::Document(document).into_relaxed_extjson() {
            JsonValue::Object(map) => rows.push(map),
            other => {
                let mut map = serde_json::Map::new();
                map.insert("value".to_string(), other);
                rows.push(map);
            }
        }
    }

    (columns, rows)
}

#[async_trait]
impl DatabaseAdapter for MongoAdapter {
    fn db_type(&self) -> DatabaseType {
        DatabaseType::MongoDB
    }

    fn is_connected(&self) -> bool {
        self.database.is_some()
    }

    async fn connect(&mut self, config: &ConnectionConfig) -> DbResult<()> {
        if self.database.is_some() {
            return Ok(());
        }

        if config.database.is_empty() {
            return Err(DbError::invalid_input("MongoDB connections require a database name"));
        }

        let uri = Self::connection_uri(config)?;
        let mut options = ClientOptions::parse(&uri)
            .await
            .map_err(|e| connect_error(DatabaseType::MongoDB, e))?;
        options.app_name = Some("sql-copilot".to_string());
        options.connect_timeout = Some(CONNECT_TIMEOUT);
        options.server_selection_timeout = Some(CONNECT_TIMEOUT);
        options.max_pool_size = Some(POOL_MAX_CONNECTIONS);

        let client =
            Client::with_options(options).map_err(|e| connect_error(DatabaseType::MongoDB, e))?;
        let database = client.database(&config.database);

        // The driver connects lazily; ping to surface bad hosts and credentials now
        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| connect_error(DatabaseType::MongoDB, e))?;

        info!(host = %config.host, database = %config.database, "Connected to MongoDB");
        self.client = Some(client);
        self.database = Some(database);
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.schema_cache = None;
        self.database = None;
        if let Some(client) = self.client.take() {
            client.shutdown().await;
            debug!("MongoDB client shut down");
        }
    }

    async fn test_connection(&mut self) -> bool {
        match &self.database {
            Some(db) => db.run_command(doc! { "ping": 1 }).await.is_ok(),
            None => false,
        }
    }

    async fn get_schema(&mut self) -> DbResult<Arc<Schema>> {
        if let Some(schema) = &self.schema_cache {
            return Ok(Arc::clone(schema));
        }
        let schema = Arc::new(Self::fetch_schema(self.database()?).await?);
        debug!(collections = schema.table_count(), "Fetched MongoDB schema");
        self.schema_cache = Some(Arc::clone(&schema));
        Ok(schema)
    }

    async fn execute_query(
        &mut self,
        query: &str,
        params: &[QueryParam],
    ) -> DbResult<QueryResult> {
        let db = self.database()?;
        if !params.is_empty() {
            return Err(DbError::invalid_input(
                "MongoDB queries do not take positional parameters",
            ));
        }
        let query = DocumentQuery::parse(query)?;
        debug!(collection = %query.collection, operation = ?query.operation, "Executing MongoDB query");
        Self::run_query(db, query).await
    }
}
