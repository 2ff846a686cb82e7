//! SQL Server execution capability.
//!
//! Implements [`SqlExecutor`] over Tiberius with bb8 connection pooling.
//! Every call checks out its own connection; the store manipulator serializes
//! DDL sequences above this layer.

use std::time::Duration;

use async_trait::async_trait;
use bb8::{Pool, PooledConnection};
use tiberius::{AuthMethod, Client, ColumnData, Config, EncryptionLevel, FromSql, Row, ToSql};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info, warn};

use crate::config::TargetConfig;
use crate::core::identifier::quote_mssql;
use crate::core::traits::SqlExecutor;
use crate::core::value::{SqlCommand, SqlRow, SqlValue};
use crate::error::{EvolveError, Result};

/// Maximum TDS packet size.
const TDS_MAX_PACKET_SIZE: u32 = 32767;

/// Connection pool timeouts.
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(300);
const POOL_MAX_LIFETIME: Duration = Duration::from_secs(1800);
const TCP_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Connection manager for bb8 pool with Tiberius.
#[derive(Clone)]
pub struct TiberiusConnectionManager {
    config: TargetConfig,
}

impl TiberiusConnectionManager {
    pub fn new(config: TargetConfig) -> Self {
        Self { config }
    }

    fn build_config(&self) -> Config {
        let mut config = Config::new();
        config.host(&self.config.host);
        config.port(self.config.port);
        config.database(&self.config.database);
        config.authentication(AuthMethod::sql_server(
            &self.config.user,
            &self.config.password,
        ));

        if self.config.encrypt {
            config.encryption(EncryptionLevel::Required);
        } else {
            config.encryption(EncryptionLevel::NotSupported);
        }
        if self.config.trust_server_cert {
            config.trust_cert();
        }

        config.packet_size(TDS_MAX_PACKET_SIZE);
        config
    }
}

fn io_error(e: std::io::Error, context: &str) -> tiberius::error::Error {
    tiberius::error::Error::Io {
        kind: e.kind(),
        message: format!("{}: {}", context, e),
    }
}

#[async_trait]
impl bb8::ManageConnection for TiberiusConnectionManager {
    type Connection = Client<Compat<TcpStream>>;
    type Error = tiberius::error::Error;

    async fn connect(&self) -> std::result::Result<Self::Connection, Self::Error> {
        let config = self.build_config();
        let tcp = TcpStream::connect(config.get_addr())
            .await
            .map_err(|e| io_error(e, "Failed to connect"))?;
        tcp.set_nodelay(true).ok();

        let std_tcp = tcp
            .into_std()
            .map_err(|e| io_error(e, "Failed to detach socket"))?;
        let socket = socket2::Socket::from(std_tcp);
        let keepalive = socket2::TcpKeepalive::new()
            .with_time(TCP_KEEPALIVE_INTERVAL)
            .with_interval(TCP_KEEPALIVE_INTERVAL);
        if let Err(e) = socket.set_tcp_keepalive(&keepalive) {
            warn!("Failed to set TCP keepalive on MSSQL connection: {}", e);
        }

        let std_tcp: std::net::TcpStream = socket.into();
        std_tcp.set_nonblocking(true).ok();
        let tcp = TcpStream::from_std(std_tcp).map_err(|e| io_error(e, "Failed to convert socket"))?;

        Client::connect(config, tcp.compat_write()).await
    }

    async fn is_valid(&self, conn: &mut Self::Connection) -> std::result::Result<(), Self::Error> {
        conn.simple_query("SELECT 1").await?.into_row().await?;
        Ok(())
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}

/// Pooled SQL Server executor.
pub struct MssqlExecutor {
    pool: Pool<TiberiusConnectionManager>,
    target: String,
}

impl MssqlExecutor {
    /// Connect to the configured target and verify the connection.
    pub async fn connect(config: &TargetConfig) -> Result<Self> {
        let manager = TiberiusConnectionManager::new(config.clone());
        let pool = Pool::builder()
            .max_size(config.pool_size)
            .min_idle(Some(1))
            .connection_timeout(POOL_CONNECTION_TIMEOUT)
            .idle_timeout(Some(POOL_IDLE_TIMEOUT))
            .max_lifetime(Some(POOL_MAX_LIFETIME))
            .test_on_check_out(true)
            .build(manager)
            .await
            .map_err(|e| EvolveError::pool(e, "creating MSSQL pool"))?;

        let executor = Self {
            pool,
            target: config.describe(),
        };
        executor.ping().await?;

        info!(
            "Connected to MSSQL: {} (pool_size={})",
            executor.target, config.pool_size
        );
        Ok(executor)
    }

    /// Round-trip a trivial query.
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.get_conn().await?;
        conn.simple_query("SELECT 1").await?.into_row().await?;
        Ok(())
    }

    /// Connection target description, without credentials.
    pub fn target(&self) -> &str {
        &self.target
    }

    async fn get_conn(&self) -> Result<PooledConnection<'_, TiberiusConnectionManager>> {
        self.pool
            .get()
            .await
            .map_err(|e| EvolveError::pool(e, "getting MSSQL connection"))
    }
}

#[async_trait]
impl SqlExecutor for MssqlExecutor {
    async fn execute_non_query(&self, sql: &str) -> Result<u64> {
        debug!("Executing: {}", sql);
        let mut conn = self.get_conn().await?;
        let result = conn.execute(sql, &[]).await?;
        Ok(result.total())
    }

    async fn execute_command(&self, command: &SqlCommand) -> Result<u64> {
        debug!(
            "Executing: {} ({} params)",
            command.text,
            command.params.len()
        );
        let params: Vec<Box<dyn ToSql>> = command.params.iter().map(sql_value_to_sql_param).collect();
        let param_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let mut conn = self.get_conn().await?;
        let result = conn.execute(command.text.as_str(), &param_refs).await?;
        Ok(result.total())
    }

    async fn execute_reader(&self, sql: &str) -> Result<Vec<SqlRow>> {
        debug!("Querying: {}", sql);
        let mut conn = self.get_conn().await?;
        let rows = conn.simple_query(sql).await?.into_first_result().await?;
        rows.into_iter().map(convert_row).collect()
    }

    async fn execute_procedure(&self, name: &str, args: &[SqlValue]) -> Result<()> {
        let command = procedure_call(name, args)?;
        self.execute_command(&command).await?;
        Ok(())
    }
}

/// Build `EXEC [proc] @P1, @P2, ...` for a possibly schema-qualified procedure name.
fn procedure_call(name: &str, args: &[SqlValue]) -> Result<SqlCommand> {
    let quoted = name
        .split('.')
        .map(quote_mssql)
        .collect::<Result<Vec<_>>>()?
        .join(".");
    let placeholders: Vec<String> = (1..=args.len()).map(|i| format!("@P{}", i)).collect();

    let mut text = format!("EXEC {}", quoted);
    if !placeholders.is_empty() {
        text.push(' ');
        text.push_str(&placeholders.join(", "));
    }

    Ok(SqlCommand {
        text,
        params: args.to_vec(),
    })
}

fn sql_value_to_sql_param(value: &SqlValue) -> Box<dyn ToSql> {
    match value {
        SqlValue::Null => Box::new(Option::<String>::None),
        SqlValue::Bool(b) => Box::new(*b),
        SqlValue::I64(i) => Box::new(*i),
        SqlValue::F64(f) => Box::new(*f),
        SqlValue::Text(s) => Box::new(s.clone()),
        SqlValue::Uuid(u) => Box::new(*u),
        SqlValue::Decimal(d) => Box::new(*d),
        SqlValue::DateTime(dt) => Box::new(*dt),
    }
}

fn convert_row(row: Row) -> Result<SqlRow> {
    row.into_iter()
        .map(|data| convert_cell(&data))
        .collect::<Result<Vec<_>>>()
        .map(SqlRow::new)
}

/// Convert one result cell. Catalog queries only return names, type codes
/// and ordinals, so unusual types fall back to NULL.
fn convert_cell(data: &ColumnData<'static>) -> Result<SqlValue> {
    let value = match data {
        ColumnData::Bit(v) => v.map(SqlValue::Bool),
        ColumnData::U8(v) => v.map(|v| SqlValue::I64(v as i64)),
        ColumnData::I16(v) => v.map(|v| SqlValue::I64(v as i64)),
        ColumnData::I32(v) => v.map(|v| SqlValue::I64(v as i64)),
        ColumnData::I64(v) => v.map(SqlValue::I64),
        ColumnData::F32(v) => v.map(|v| SqlValue::F64(v as f64)),
        ColumnData::F64(v) => v.map(SqlValue::F64),
        ColumnData::String(v) => v.as_ref().map(|s| SqlValue::Text(s.to_string())),
        ColumnData::Guid(v) => v.map(SqlValue::Uuid),
        ColumnData::Numeric(_) => rust_decimal::Decimal::from_sql(data)?.map(SqlValue::Decimal),
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            chrono::NaiveDateTime::from_sql(data)?.map(SqlValue::DateTime)
        }
        _ => None,
    };
    Ok(value.unwrap_or(SqlValue::Null))
}
