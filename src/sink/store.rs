use async_trait::async_trait;
use tokio_postgres::error::SqlState;
use tokio_postgres::{Client, NoTls};
use tracing::{error, info};

use super::{EventSink, SinkAck, SinkError};
use crate::models::IngestedEvent;

// channel the downstream event listener LISTENs on
pub const NOTIFY_CHANNEL: &str = "new_event";

/// Durable sink inserting one row per event into Postgres.
pub struct StoreSink {
    client: Option<Client>,
    table: String,
    insert_sql: String,
}

impl StoreSink {
    /// Connects and bootstraps the table. A failed connection or schema
    /// setup leaves the sink disconnected.
    pub async fn connect(url: &str, table: &str) -> Result<Self, SinkError> {
        validate_table_name(table)?;

        let client = match open_client(url, table).await {
            Ok(client) => {
                info!(table, "Connected to event store");
                Some(client)
            }
            Err(e) => {
                error!(error = %e, table, "Event store connection failed, store sink disabled");
                None
            }
        };

        Ok(Self::with_client(client, table))
    }

    #[cfg(test)]
    pub fn disconnected(table: &str) -> Result<Self, SinkError> {
        validate_table_name(table)?;
        Ok(Self::with_client(None, table))
    }

    fn with_client(client: Option<Client>, table: &str) -> Self {
        Self {
            client,
            table: table.to_string(),
            insert_sql: insert_sql(table),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }
}

async fn open_client(url: &str, table: &str) -> Result<Client, tokio_postgres::Error> {
    let (client, connection) = tokio_postgres::connect(url, NoTls).await?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            error!(error = %e, "Event store connection closed");
        }
    });

    client.batch_execute(&schema_sql(table)).await?;
    Ok(client)
}

/// Table names are spliced into SQL, so only plain identifiers pass.
pub fn validate_table_name(table: &str) -> Result<(), SinkError> {
    let mut chars = table.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && table.len() <= 63;

    if valid {
        Ok(())
    } else {
        Err(SinkError::Rejected(format!("invalid table name {table:?}")))
    }
}

fn insert_sql(table: &str) -> String {
    format!(
        "INSERT INTO {table} (event_name, event_time, payload, webhook_id)
         VALUES ($1, $2, $3, $4)
         RETURNING id"
    )
}

fn schema_sql(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            id BIGSERIAL PRIMARY KEY,
            event_name TEXT NOT NULL,
            event_time TIMESTAMPTZ NOT NULL,
            payload JSONB NOT NULL,
            webhook_id TEXT NOT NULL UNIQUE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        );

        CREATE OR REPLACE FUNCTION {table}_notify() RETURNS trigger AS $$
        BEGIN
            PERFORM pg_notify('{NOTIFY_CHANNEL}', NEW.id::text);
            RETURN NEW;
        END;
        $$ LANGUAGE plpgsql;

        DROP TRIGGER IF EXISTS {table}_notify_insert ON {table};
        CREATE TRIGGER {table}_notify_insert
            AFTER INSERT ON {table}
            FOR EACH ROW EXECUTE FUNCTION {table}_notify();"
    )
}

fn classify(err: tokio_postgres::Error) -> SinkError {
    if err.is_closed() {
        return SinkError::Unavailable(err.to_string());
    }

    match err.code() {
        Some(code) if is_rejection(code) => SinkError::Rejected(err.to_string()),
        _ => SinkError::Failed(err.to_string()),
    }
}

// SQLSTATE class 22 is data exception, class 23 integrity constraint violation
fn is_rejection(code: &SqlState) -> bool {
    matches!(code.code().get(..2), Some("22" | "23"))
}

#[async_trait]
impl EventSink for StoreSink {
    fn name(&self) -> &'static str {
        "store"
    }

    fn is_ready(&self) -> bool {
        self.client.as_ref().is_some_and(|c| !c.is_closed())
    }

    async fn publish(&self, event: &IngestedEvent) -> Result<SinkAck, SinkError> {
        let Some(client) = &self.client else {
            return Err(SinkError::Unavailable("no connection".to_string()));
        };
        if client.is_closed() {
            return Err(SinkError::Unavailable("connection closed".to_string()));
        }

        let webhook_id = event.webhook_id();
        let row = client
            .query_one(
                self.insert_sql.as_str(),
                &[&event.name, &event.occurred_at, &event.payload, &webhook_id],
            )
            .await
            .map_err(classify)?;

        let record_id: i64 = row
            .try_get(0)
            .map_err(|e| SinkError::Failed(format!("read generated id: {e}")))?;

        Ok(SinkAck::Stored {
            record_id,
            webhook_id,
        })
    }
}
