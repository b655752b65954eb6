//! PostgreSQL-protocol target backed by `tokio-postgres`.

use std::error::Error as StdError;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use tokio::sync::Mutex;
use tokio_postgres::config::Host;
use tokio_postgres::types::{FromSql, Type};
use tokio_postgres::{CancelToken, Client, Config, NoTls};
use tracing::{debug, info, warn};

use gaussight_common::{Charset, DbValue};

use crate::config::TargetConfig;
use crate::source::{QuerySource, ResultSet, ServerInfo, SourceError};
use crate::version::parse_version;

const BASE_INFO_SQL: &str = "SELECT version(), current_setting('client_encoding'), \
     pg_is_in_recovery(), current_database()";

const DATABASE_ENCODINGS_SQL: &str =
    "SELECT datname, pg_encoding_to_char(encoding) FROM pg_database";

const APPLICATION_NAME: &str = "gaussight-exporter";

/// A single database server, connected lazily and reconnected on demand.
pub struct PgTarget {
    config: Config,
    address: String,
    connect_timeout: Duration,
    client: Mutex<Option<Arc<Client>>>,
}

impl PgTarget {
    /// Create a target. No connection is made until the first query.
    pub fn new(target: &TargetConfig) -> Result<Self, SourceError> {
        let mut config = match &target.url {
            Some(url) => url
                .parse::<Config>()
                .map_err(|e| SourceError::Connect(format!("invalid connection url: {}", e)))?,
            None => {
                let mut config = Config::new();
                config
                    .host(&target.host)
                    .port(target.port)
                    .dbname(&target.database);
                if let Some(user) = &target.user {
                    config.user(user);
                }
                if let Some(password) = &target.password {
                    config.password(password);
                }
                config
            }
        };

        if config.get_application_name().is_none() {
            config.application_name(APPLICATION_NAME);
        }
        config.connect_timeout(target.connect_timeout());

        let address = address_of(&config);

        Ok(Self {
            config,
            address,
            connect_timeout: target.connect_timeout(),
            client: Mutex::new(None),
        })
    }

    /// Current client, connecting if there is none or the last one closed.
    async fn client(&self) -> Result<Arc<Client>, SourceError> {
        let mut guard = self.client.lock().await;

        if let Some(client) = guard.as_ref()
            && !client.is_closed()
        {
            return Ok(client.clone());
        }

        debug!(server = %self.address, "Connecting to database");

        let (client, connection) =
            tokio::time::timeout(self.connect_timeout, self.config.connect(NoTls))
                .await
                .map_err(|_| SourceError::Connect(format!("timed out after {:?}", self.connect_timeout)))?
                .map_err(|e| SourceError::Connect(describe(&e)))?;

        let address = self.address.clone();
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!(server = %address, error = %e, "Database connection closed");
            }
        });

        info!(server = %self.address, "Connected to database");

        let client = Arc::new(client);
        *guard = Some(client.clone());
        Ok(client)
    }

    /// Drop the cached client after a connection-level failure.
    async fn invalidate(&self) {
        *self.client.lock().await = None;
    }

    async fn map_error(&self, e: tokio_postgres::Error) -> SourceError {
        if e.is_closed() {
            self.invalidate().await;
            SourceError::Connect(describe(&e))
        } else {
            SourceError::Query(describe(&e))
        }
    }
}

#[async_trait]
impl QuerySource for PgTarget {
    fn address(&self) -> &str {
        &self.address
    }

    async fn query(&self, sql: &str) -> Result<ResultSet, SourceError> {
        let client = self.client().await?;
        let mut cancel = CancelOnDrop::new(client.cancel_token());

        let result = match client.prepare(sql).await {
            Ok(statement) => client
                .query(&statement, &[])
                .await
                .map(|rows| (statement, rows)),
            Err(e) => Err(e),
        };
        cancel.disarm();

        let (statement, rows) = match result {
            Ok(r) => r,
            Err(e) => return Err(self.map_error(e).await),
        };

        let columns: Vec<String> = statement
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();

        let mut decoded = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut values = Vec::with_capacity(columns.len());
            for (i, column) in columns.iter().enumerate() {
                let value = row
                    .try_get::<_, Column>(i)
                    .map_err(|e| SourceError::Decode {
                        column: column.clone(),
                        message: describe(&e),
                    })?;
                values.push(value.0);
            }
            decoded.push(values);
        }

        Ok(ResultSet::new(columns, decoded))
    }

    async fn ping(&self) -> Result<(), SourceError> {
        let client = self.client().await?;
        match client.simple_query("SELECT 1").await {
            Ok(_) => Ok(()),
            Err(e) => Err(self.map_error(e).await),
        }
    }

    async fn server_info(&self) -> Result<ServerInfo, SourceError> {
        let client = self.client().await?;

        let row = match client.query_one(BASE_INFO_SQL, &[]).await {
            Ok(row) => row,
            Err(e) => return Err(self.map_error(e).await),
        };
        let decode = |e: tokio_postgres::Error| SourceError::Decode {
            column: "base info".to_string(),
            message: describe(&e),
        };
        let raw_version: String = row.try_get(0).map_err(decode)?;
        let client_encoding: String = row.try_get(1).map_err(decode)?;
        let in_recovery: bool = row.try_get(2).map_err(decode)?;
        let database: String = row.try_get(3).map_err(decode)?;

        let version = parse_version(&raw_version);
        if version.is_none() {
            warn!(server = %self.address, version = %raw_version, "Unrecognized server version");
        }

        let charsets = match client.query(DATABASE_ENCODINGS_SQL, &[]).await {
            Ok(rows) => rows
                .iter()
                .filter_map(|row| {
                    let name: String = row.try_get(0).ok()?;
                    let encoding: String = row.try_get(1).ok()?;
                    let charset = encoding.parse::<Charset>().ok()?;
                    Some((name, charset))
                })
                .collect(),
            Err(e) => {
                warn!(server = %self.address, error = %describe(&e), "Cannot read database encodings");
                Vec::new()
            }
        };

        Ok(ServerInfo {
            raw_version,
            version,
            client_encoding,
            in_recovery,
            database,
            charsets,
        })
    }
}

/// `host:port` of the first configured host.
fn address_of(config: &Config) -> String {
    let host = match config.get_hosts().first() {
        Some(Host::Tcp(host)) => host.clone(),
        #[cfg(unix)]
        Some(Host::Unix(path)) => path.display().to_string(),
        None => "localhost".to_string(),
    };
    let port = config.get_ports().first().copied().unwrap_or(5432);
    format!("{}:{}", host, port)
}

fn describe(e: &tokio_postgres::Error) -> String {
    match e.as_db_error() {
        Some(db) => format!("{} ({})", db.message(), db.code().code()),
        None => match e.source() {
            Some(source) => format!("{}: {}", e, source),
            None => e.to_string(),
        },
    }
}

/// Sends a server-side cancel if a query future is dropped before it finishes.
struct CancelOnDrop {
    token: Option<CancelToken>,
}

impl CancelOnDrop {
    fn new(token: CancelToken) -> Self {
        Self { token: Some(token) }
    }

    fn disarm(&mut self) {
        self.token = None;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        let Some(token) = self.token.take() else {
            return;
        };
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) = token.cancel_query(NoTls).await {
                    debug!(error = %e, "Failed to cancel abandoned query");
                }
            });
        }
    }
}

/// A result cell decoded by its PostgreSQL type.
struct Column(DbValue);

type DecodeError = Box<dyn StdError + Sync + Send>;

impl<'a> FromSql<'a> for Column {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> Result<Self, DecodeError> {
        let value = match ty.name() {
            "bool" => DbValue::Bool(bool::from_sql(ty, raw)?),
            "int1" => DbValue::Int(raw.first().copied().map(i64::from).unwrap_or_default()),
            "int2" => DbValue::Int(i16::from_sql(ty, raw)?.into()),
            "int4" => DbValue::Int(i32::from_sql(ty, raw)?.into()),
            "int8" => DbValue::Int(i64::from_sql(ty, raw)?),
            "oid" | "xid" => DbValue::Int(u32_from_be(raw)?.into()),
            "float4" => DbValue::Float(f32::from_sql(ty, raw)?.into()),
            "float8" => DbValue::Float(f64::from_sql(ty, raw)?),
            "numeric" => DbValue::Text(decode_numeric(raw)?),
            "timestamp" => DbValue::Timestamp(NaiveDateTime::from_sql(ty, raw)?.and_utc()),
            "timestamptz" => DbValue::Timestamp(DateTime::<Utc>::from_sql(ty, raw)?),
            "date" => match NaiveDate::from_sql(ty, raw)?.and_hms_opt(0, 0, 0) {
                Some(dt) => DbValue::Timestamp(dt.and_utc()),
                None => DbValue::Unsupported(ty.name().to_string()),
            },
            "text" | "varchar" | "bpchar" | "name" | "unknown" | "char" => {
                match String::from_utf8(raw.to_vec()) {
                    Ok(s) => DbValue::Text(s),
                    Err(e) => DbValue::Bytes(e.into_bytes()),
                }
            }
            "bytea" => DbValue::Bytes(raw.to_vec()),
            other => DbValue::Unsupported(other.to_string()),
        };
        Ok(Column(value))
    }

    fn from_sql_null(_ty: &Type) -> Result<Self, DecodeError> {
        Ok(Column(DbValue::Null))
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

fn u32_from_be(raw: &[u8]) -> Result<u32, DecodeError> {
    let bytes: [u8; 4] = raw
        .try_into()
        .map_err(|_| format!("expected 4 bytes, got {}", raw.len()))?;
    Ok(u32::from_be_bytes(bytes))
}

const NUMERIC_POS: u16 = 0x0000;
const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

/// Decode a binary NUMERIC into exact decimal text.
///
/// Layout: ndigits, weight, sign, dscale (all 16-bit), then `ndigits`
/// base-10000 digits, most significant first.
fn decode_numeric(raw: &[u8]) -> Result<String, DecodeError> {
    let word = |i: usize| -> Result<u16, DecodeError> {
        raw.get(i..i + 2)
            .map(|b| u16::from_be_bytes([b[0], b[1]]))
            .ok_or_else(|| "numeric value truncated".into())
    };

    let ndigits = word(0)? as usize;
    let weight = word(2)? as i16 as i64;
    let sign = word(4)?;
    let dscale = word(6)? as usize;

    match sign {
        NUMERIC_NAN => return Ok("NaN".to_string()),
        NUMERIC_PINF => return Ok("+Inf".to_string()),
        NUMERIC_NINF => return Ok("-Inf".to_string()),
        NUMERIC_POS | NUMERIC_NEG => {}
        other => return Err(format!("invalid numeric sign {:#06x}", other).into()),
    }

    let digits = (0..ndigits)
        .map(|i| word(8 + 2 * i))
        .collect::<Result<Vec<u16>, _>>()?;
    let digit = |i: i64| -> u16 {
        if i < 0 {
            0
        } else {
            digits.get(i as usize).copied().unwrap_or(0)
        }
    };

    let mut out = String::new();
    if sign == NUMERIC_NEG && ndigits > 0 {
        out.push('-');
    }

    if weight < 0 {
        out.push('0');
    } else {
        for i in 0..=weight {
            if i == 0 {
                let _ = write!(out, "{}", digit(i));
            } else {
                let _ = write!(out, "{:04}", digit(i));
            }
        }
    }

    if dscale > 0 {
        let mut frac = String::with_capacity(dscale + 4);
        let mut i = weight + 1;
        while frac.len() < dscale {
            let _ = write!(frac, "{:04}", digit(i));
            i += 1;
        }
        frac.truncate(dscale);
        out.push('.');
        out.push_str(&frac);
    }

    Ok(out)
}
