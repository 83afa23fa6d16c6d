//! PostgreSQL collaborator built on tokio-postgres.
//!
//! The command loop is synchronous, so the collaborator owns a current-thread
//! tokio runtime and blocks on each round-trip. The connection driver task
//! only runs inside those calls; it forwards server notices to the handle so
//! procedure results can report them.

use crate::error::CatastoError;
use crate::models::{ConnectionOptions, ConnectionProfile, Table, Value};
use crate::services::collaborator::{Collaborator, ProcedureId, ProcedureResult, QueryId};
use crate::services::sql::{self, Returns};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use futures_util::{stream, StreamExt};
use std::pin::pin;
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_postgres::tls::NoTlsStream;
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::{AsyncMessage, Client, Column, Connection, NoTls, Row, Socket};
use uuid::Uuid;

/// How long to wait for the server to acknowledge a close.
const RELEASE_GRACE: Duration = Duration::from_secs(2);

type BoxedParam = Box<dyn ToSql + Sync + Send>;

/// A live PostgreSQL connection.
pub struct PgHandle {
    /// Identifier used in log records
    id: Uuid,
    client: Client,
    driver: JoinHandle<()>,
    notices: UnboundedReceiver<String>,
}

impl PgHandle {
    /// Identifier used in log records.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Take every notice received so far.
    fn drain_notices(&mut self) -> Vec<String> {
        let mut notices = Vec::new();
        while let Ok(notice) = self.notices.try_recv() {
            notices.push(notice);
        }
        notices
    }
}

/// Collaborator that talks to a real PostgreSQL server.
pub struct PostgresCollaborator {
    runtime: Runtime,
    options: ConnectionOptions,
}

impl PostgresCollaborator {
    /// Create the collaborator and its runtime.
    ///
    /// Fails with [`CatastoError::Driver`] when the runtime cannot be built;
    /// the binary treats that as fatal.
    pub fn new(options: ConnectionOptions) -> Result<Self, CatastoError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| CatastoError::driver(format!("Impossibile avviare il runtime del database: {e}")))?;

        tracing::debug!(
            connect_timeout_secs = ?options.connect_timeout_secs,
            statement_timeout_secs = ?options.statement_timeout_secs,
            "PostgreSQL collaborator initialized"
        );

        Ok(Self { runtime, options })
    }

    /// Options applied to every connection.
    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    fn pg_config(&self, profile: &ConnectionProfile) -> tokio_postgres::Config {
        let mut pg_config = tokio_postgres::Config::new();
        pg_config
            .host(profile.host())
            .port(profile.port())
            .dbname(profile.database())
            .user(profile.user())
            .password(profile.secret().expose())
            .application_name(&self.options.application_name)
            .keepalives(true)
            .keepalives_idle(Duration::from_secs(60));

        if let Some(secs) = self.options.connect_timeout_secs {
            pg_config.connect_timeout(Duration::from_secs(secs.into()));
        }
        if let Some(secs) = self.options.statement_timeout_secs {
            pg_config.options(&format!("-c statement_timeout={secs}s"));
        }
        pg_config
    }
}

impl Collaborator for PostgresCollaborator {
    type Handle = PgHandle;

    fn acquire_connection(&mut self, profile: &ConnectionProfile) -> Result<PgHandle, CatastoError> {
        let pg_config = self.pg_config(profile);

        let (client, connection) =
            self.runtime.block_on(pg_config.connect(NoTls)).map_err(CatastoError::from)?;

        let id = Uuid::new_v4();
        let (tx, notices) = mpsc::unbounded_channel();
        let driver = self.runtime.spawn(drive_connection(id, connection, tx));

        tracing::info!(
            connection_id = %id,
            host = %profile.host(),
            port = profile.port(),
            database = %profile.database(),
            user = %profile.user(),
            "Connection established"
        );

        Ok(PgHandle { id, client, driver, notices })
    }

    fn apply_schema_scope(&mut self, handle: &mut PgHandle, schema: &str) -> Result<(), CatastoError> {
        let statement = sql::search_path_statement(schema)?;
        self.runtime.block_on(handle.client.batch_execute(&statement)).map_err(|e| {
            let message = e
                .as_db_error()
                .map(|db| db.message().to_string())
                .unwrap_or_else(|| e.to_string());
            CatastoError::schema_scope(schema, message)
        })?;
        tracing::debug!(connection_id = %handle.id, schema, "Schema scope applied");
        Ok(())
    }

    fn release_connection(&mut self, handle: PgHandle) {
        let PgHandle { id, client, driver, .. } = handle;
        drop(client);

        match self.runtime.block_on(tokio::time::timeout(RELEASE_GRACE, driver)) {
            Ok(Ok(())) => tracing::info!(connection_id = %id, "Connection closed"),
            Ok(Err(e)) => tracing::warn!(connection_id = %id, error = %e, "Connection task ended abnormally"),
            Err(_) => tracing::warn!(connection_id = %id, "Connection did not close in time"),
        }
    }

    fn run_query(
        &mut self,
        handle: &mut PgHandle,
        query: QueryId,
        params: &[Value],
    ) -> Result<Table, CatastoError> {
        let statement_sql = sql::query_sql(query);
        let client = &handle.client;

        let (statement, rows) = self.runtime.block_on(async {
            let statement = client.prepare(statement_sql).await?;
            let bound = bind_params(params, statement.params())?;
            let rows = client.query(&statement, &param_refs(&bound)).await?;
            Ok::<_, CatastoError>((statement, rows))
        })?;

        Ok(rows_to_table(statement.columns(), &rows))
    }

    fn run_procedure(
        &mut self,
        handle: &mut PgHandle,
        procedure: ProcedureId,
        params: &[Value],
    ) -> Result<ProcedureResult, CatastoError> {
        let call = sql::procedure_sql(procedure);

        let stale = handle.drain_notices();
        if !stale.is_empty() {
            tracing::debug!(connection_id = %handle.id, count = stale.len(), "Discarding earlier notices");
        }

        let client = &handle.client;
        let value = self.runtime.block_on(async {
            let statement = client.prepare(call.sql).await?;
            let bound = bind_params(params, statement.params())?;
            let refs = param_refs(&bound);
            let value = match call.returns {
                Returns::Scalar => {
                    let rows = client.query(&statement, &refs).await?;
                    rows.first().map(|row| cell(row, 0))
                }
                Returns::RowsAffected => {
                    let affected = client.execute(&statement, &refs).await?;
                    Some(Value::Int(i64::try_from(affected).unwrap_or(i64::MAX)))
                }
                Returns::Nothing => {
                    client.execute(&statement, &refs).await?;
                    None
                }
            };
            Ok::<_, CatastoError>(value)
        })?;

        Ok(ProcedureResult {
            value: value.filter(|v| !v.is_null()),
            notices: handle.drain_notices(),
        })
    }
}

/// Drive the connection, forwarding notices until it closes.
async fn drive_connection(
    id: Uuid,
    mut connection: Connection<Socket, NoTlsStream>,
    notices: UnboundedSender<String>,
) {
    let mut messages = pin!(stream::poll_fn(move |cx| connection.poll_message(cx)));

    while let Some(message) = messages.next().await {
        match message {
            Ok(AsyncMessage::Notice(notice)) => {
                tracing::debug!(connection_id = %id, severity = notice.severity(), "{}", notice.message());
                let _ = notices.send(format_notice(notice.severity(), notice.message()));
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(connection_id = %id, error = %e, "Connection error");
                break;
            }
        }
    }
}

/// Render a notice the way psql prints it, without the plain NOTICE prefix.
fn format_notice(severity: &str, message: &str) -> String {
    if severity.eq_ignore_ascii_case("NOTICE") {
        message.trim().to_string()
    } else {
        format!("{}: {}", severity, message.trim())
    }
}

/// NULL of the Rust type matching a declared parameter type.
fn typed_null(ty: &Type) -> BoxedParam {
    if *ty == Type::BOOL {
        Box::new(None::<bool>)
    } else if *ty == Type::INT4 {
        Box::new(None::<i32>)
    } else if *ty == Type::INT8 {
        Box::new(None::<i64>)
    } else if *ty == Type::FLOAT8 {
        Box::new(None::<f64>)
    } else if *ty == Type::DATE {
        Box::new(None::<NaiveDate>)
    } else if *ty == Type::INT4_ARRAY {
        Box::new(None::<Vec<i32>>)
    } else {
        Box::new(None::<String>)
    }
}

/// Box each value for binding; `types` are the statement's declared parameter types.
fn bind_params(params: &[Value], types: &[Type]) -> Result<Vec<BoxedParam>, CatastoError> {
    params
        .iter()
        .enumerate()
        .map(|(i, value)| -> Result<BoxedParam, CatastoError> {
            Ok(match value {
                Value::Null => typed_null(types.get(i).unwrap_or(&Type::TEXT)),
                Value::Bool(b) => Box::new(*b),
                Value::Int(n) => Box::new(i32::try_from(*n).map_err(|_| {
                    CatastoError::input_format(
                        format!("parametro ${}", i + 1),
                        format!("{n} non rientra in una colonna intera"),
                    )
                })?),
                Value::Float(x) => Box::new(*x),
                Value::Text(s) => Box::new(s.clone()),
                Value::Date(d) => Box::new(*d),
                Value::IntArray(values) => Box::new(values.clone()),
            })
        })
        .collect()
}

fn param_refs(bound: &[BoxedParam]) -> Vec<&(dyn ToSql + Sync)> {
    bound.iter().map(|p| p.as_ref() as &(dyn ToSql + Sync)).collect()
}

fn rows_to_table(columns: &[Column], rows: &[Row]) -> Table {
    let mut table = Table::new(columns.iter().map(|c| c.name().to_string()));
    for row in rows {
        table.push_row((0..row.len()).map(|i| cell(row, i)).collect());
    }
    table
}

/// Read one cell, falling back to a type placeholder when it cannot be decoded.
fn cell(row: &Row, idx: usize) -> Value {
    let ty = row.columns()[idx].type_().clone();

    let decoded: Result<Option<Value>, tokio_postgres::Error> = if ty == Type::BOOL {
        row.try_get::<_, Option<bool>>(idx).map(|v| v.map(Value::Bool))
    } else if ty == Type::INT2 {
        row.try_get::<_, Option<i16>>(idx).map(|v| v.map(|n| Value::Int(n.into())))
    } else if ty == Type::INT4 {
        row.try_get::<_, Option<i32>>(idx).map(|v| v.map(|n| Value::Int(n.into())))
    } else if ty == Type::INT8 {
        row.try_get::<_, Option<i64>>(idx).map(|v| v.map(Value::Int))
    } else if ty == Type::FLOAT4 {
        row.try_get::<_, Option<f32>>(idx).map(|v| v.map(|x| Value::Float(x.into())))
    } else if ty == Type::FLOAT8 {
        row.try_get::<_, Option<f64>>(idx).map(|v| v.map(Value::Float))
    } else if ty == Type::DATE {
        row.try_get::<_, Option<NaiveDate>>(idx).map(|v| v.map(Value::Date))
    } else if ty == Type::TIMESTAMP {
        row.try_get::<_, Option<NaiveDateTime>>(idx)
            .map(|v| v.map(|t| Value::Text(t.format("%Y-%m-%d %H:%M:%S").to_string())))
    } else if ty == Type::TIMESTAMPTZ {
        row.try_get::<_, Option<DateTime<Utc>>>(idx)
            .map(|v| v.map(|t| Value::Text(t.format("%Y-%m-%d %H:%M:%S %Z").to_string())))
    } else if ty == Type::INT4_ARRAY {
        row.try_get::<_, Option<Vec<i32>>>(idx).map(|v| v.map(Value::IntArray))
    } else {
        row.try_get::<_, Option<String>>(idx).map(|v| v.map(Value::Text))
    };

    match decoded {
        Ok(Some(value)) => value,
        Ok(None) => Value::Null,
        Err(_) => Value::Text(format!("<{}>", ty.name())),
    }
}
