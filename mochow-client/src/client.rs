use crate::model::{
    AnnSearch, CreateTableRequest, DescIndexResponse, DescTableResponse, IndexDescription,
    ListDatabasesResponse, ListTablesResponse, SearchResponse, SearchRow, UpsertResponse,
};
use crate::{ClientConfig, ClientError, ClientResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

/// Blocking Mochow client.
///
/// The underlying keep-alive agent is created by [`MochowClient::connect`]
/// (or lazily by the first request) and dropped by
/// [`MochowClient::disconnect`].
pub struct MochowClient {
    config: ClientConfig,
    agent: Option<ureq::Agent>,
}

impl MochowClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            agent: None,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.agent.is_some()
    }

    /// Open the keep-alive agent. Idempotent.
    pub fn connect(&mut self) {
        if self.agent.is_none() {
            self.agent = Some(self.build_agent());
        }
    }

    /// Drop the agent and its pooled connections.
    pub fn disconnect(&mut self) {
        self.agent = None;
    }

    fn build_agent(&self) -> ureq::Agent {
        ureq::AgentBuilder::new()
            .timeout_connect(self.config.connect_timeout)
            .timeout_read(self.config.read_timeout)
            .timeout_write(self.config.write_timeout)
            .build()
    }

    // ── databases ──

    pub fn create_database(&mut self, database: &str) -> ClientResult<()> {
        require("database", database)?;
        self.send_ack("database", "create", &json!({ "database": database }))
    }

    pub fn list_databases(&mut self) -> ClientResult<Vec<String>> {
        let resp: ListDatabasesResponse = self.send("database", "list", &json!({}))?;
        Ok(resp.databases)
    }

    pub fn drop_database(&mut self, database: &str) -> ClientResult<()> {
        require("database", database)?;
        self.send_ack("database", "drop", &json!({ "database": database }))
    }

    // ── tables ──

    pub fn create_table(&mut self, request: &CreateTableRequest) -> ClientResult<()> {
        require("database", &request.database)?;
        require("table", &request.table)?;
        self.send_ack("table", "create", request)
    }

    pub fn list_tables(&mut self, database: &str) -> ClientResult<Vec<String>> {
        require("database", database)?;
        let resp: ListTablesResponse =
            self.send("table", "list", &json!({ "database": database }))?;
        Ok(resp.tables)
    }

    pub fn describe_table(&mut self, database: &str, table: &str) -> ClientResult<Value> {
        let resp: DescTableResponse = self.send(
            "table",
            "desc",
            &json!({ "database": database, "table": table }),
        )?;
        Ok(resp.table)
    }

    pub fn drop_table(&mut self, database: &str, table: &str) -> ClientResult<()> {
        require("table", table)?;
        self.send_ack(
            "table",
            "drop",
            &json!({ "database": database, "table": table }),
        )
    }

    // ── rows ──

    /// Upsert rows; returns the affected row count reported by the server.
    pub fn upsert_rows(&mut self, database: &str, table: &str, rows: &[Value]) -> ClientResult<u64> {
        let resp: UpsertResponse = self.send(
            "row",
            "upsert",
            &json!({ "database": database, "table": table, "rows": rows }),
        )?;
        Ok(resp.affected_count)
    }

    pub fn search_rows(
        &mut self,
        database: &str,
        table: &str,
        anns: &AnnSearch,
    ) -> ClientResult<Vec<SearchRow>> {
        let resp: SearchResponse = self.send(
            "row",
            "search",
            &json!({
                "database": database,
                "table": table,
                "anns": anns,
                "retrieveVector": false,
            }),
        )?;
        Ok(resp.rows)
    }

    // ── indexes ──

    pub fn rebuild_vector_index(&mut self, database: &str, table: &str, index: &str) -> ClientResult<()> {
        self.send_ack(
            "index",
            "rebuild",
            &json!({ "database": database, "table": table, "indexName": index }),
        )
    }

    pub fn describe_index(
        &mut self,
        database: &str,
        table: &str,
        index: &str,
    ) -> ClientResult<IndexDescription> {
        let resp: DescIndexResponse = self.send(
            "index",
            "desc",
            &json!({ "database": database, "table": table, "indexName": index }),
        )?;
        Ok(resp.index)
    }

    // ── transport ──

    fn send_ack<B: Serialize + ?Sized>(&mut self, resource: &str, action: &str, body: &B) -> ClientResult<()> {
        let _: Value = self.send(resource, action, body)?;
        Ok(())
    }

    fn send<B, R>(&mut self, resource: &str, action: &str, body: &B) -> ClientResult<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = self.config.url(resource, action);
        let authorization = self.config.authorization();
        tracing::debug!(%url, "mochow request");

        if self.agent.is_none() {
            self.connect();
        }
        let agent = self
            .agent
            .as_ref()
            .ok_or_else(|| ClientError::Transport("client is disconnected".into()))?;

        let result = agent
            .post(&url)
            .set("Authorization", &authorization)
            .set("Content-Type", "application/json")
            .send_json(body);

        match result {
            Ok(resp) => {
                let status = resp.status();
                let envelope: Value = resp.into_json()?;
                check_envelope(status, &envelope)?;
                Ok(serde_json::from_value(envelope)?)
            }
            Err(ureq::Error::Status(status, resp)) => {
                let envelope: Value = resp.into_json().unwrap_or(Value::Null);
                Err(server_error(status, &envelope))
            }
            Err(ureq::Error::Transport(t)) => Err(ClientError::Transport(t.to_string())),
        }
    }
}

fn require(what: &str, value: &str) -> ClientResult<()> {
    if value.is_empty() {
        return Err(ClientError::InvalidArgument(format!("{what} name must not be empty")));
    }
    Ok(())
}

fn check_envelope(status: u16, envelope: &Value) -> ClientResult<()> {
    match envelope.get("code").and_then(Value::as_i64) {
        Some(0) | None => Ok(()),
        Some(_) => Err(server_error(status, envelope)),
    }
}

fn server_error(status: u16, envelope: &Value) -> ClientError {
    ClientError::Server {
        status,
        code: envelope.get("code").and_then(Value::as_i64).unwrap_or(-1),
        msg: envelope
            .get("msg")
            .and_then(Value::as_str)
            .unwrap_or("no message")
            .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_code_is_success() {
        assert!(check_envelope(200, &json!({"code": 0, "msg": "Success"})).is_ok());
        assert!(check_envelope(200, &json!({"databases": []})).is_ok());
    }

    #[test]
    fn non_zero_code_is_server_error() {
        let err = check_envelope(200, &json!({"code": 53, "msg": "Database already exists"}))
            .unwrap_err();
        match err {
            ClientError::Server { status, code, msg } => {
                assert_eq!(status, 200);
                assert_eq!(code, 53);
                assert_eq!(msg, "Database already exists");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn empty_names_are_rejected_before_io() {
        let mut client = MochowClient::new(ClientConfig::new("http://127.0.0.1:1", "root", "k"));
        assert!(matches!(
            client.create_database(""),
            Err(ClientError::InvalidArgument(_))
        ));
        assert!(!client.is_connected());
    }

    #[test]
    fn connect_and_disconnect_toggle_agent() {
        let mut client = MochowClient::new(ClientConfig::new("http://127.0.0.1:1", "root", "k"));
        client.connect();
        assert!(client.is_connected());
        client.disconnect();
        assert!(!client.is_connected());
    }
}
