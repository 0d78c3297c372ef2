//! Connection pool management.
//!
//! This module provides the production [`Driver`]: a deadpool-managed pool of
//! tiberius clients talking TDS over tokio TCP streams. The per-request
//! query timeout is enforced here; a connection whose request timed out or
//! whose session state could not be restored is discarded instead of being
//! returned to the pool.

use crate::config::Config;
use crate::db::driver::{Driver, DriverError, DriverErrorKind, DriverResponse};
use crate::db::params::{BoundParam, EngineType, rewrite_placeholders};
use crate::db::types::{fields_of, row_to_json};
use crate::error::{DbError, DbResult};
use crate::models::ParamValue;
use async_trait::async_trait;
use deadpool::Runtime;
use deadpool::managed::{self, Metrics, Object, Pool, PoolError, RecycleResult};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tiberius::{AuthMethod, Client, Query};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info, warn};

/// A pooled TDS client.
pub type TdsClient = Client<Compat<TcpStream>>;

type BoxFuture<'c, T> = Pin<Box<dyn Future<Output = Result<T, DriverError>> + Send + 'c>>;

/// SQL Server login failure.
const LOGIN_FAILED: u32 = 18456;

/// deadpool manager creating and health-checking tiberius clients.
pub struct TdsManager {
    config: tiberius::Config,
}

impl TdsManager {
    pub fn new(config: tiberius::Config) -> Self {
        Self { config }
    }
}

impl managed::Manager for TdsManager {
    type Type = TdsClient;
    type Error = tiberius::error::Error;

    async fn create(&self) -> Result<TdsClient, tiberius::error::Error> {
        let tcp = TcpStream::connect(self.config.get_addr()).await?;
        tcp.set_nodelay(true)?;

        match Client::connect(self.config.clone(), tcp.compat_write()).await {
            Ok(client) => Ok(client),
            // Azure SQL gateways redirect to the node hosting the database.
            Err(tiberius::error::Error::Routing { host, port }) => {
                debug!(host = %host, port, "Following server redirect");
                let mut config = self.config.clone();
                config.host(&host);
                config.port(port);
                let tcp = TcpStream::connect(config.get_addr()).await?;
                tcp.set_nodelay(true)?;
                Client::connect(config, tcp.compat_write()).await
            }
            Err(e) => Err(e),
        }
    }

    async fn recycle(
        &self,
        client: &mut TdsClient,
        _: &Metrics,
    ) -> RecycleResult<tiberius::error::Error> {
        client.simple_query("SELECT 1").await?.into_row().await?;
        Ok(())
    }
}

/// Build the TDS client configuration from the server configuration.
pub fn tds_config(config: &Config) -> tiberius::Config {
    let mut tds = tiberius::Config::new();
    tds.host(&config.server);
    tds.port(config.port);
    tds.database(&config.database);
    tds.application_name("mssql-mcp-server");
    tds.authentication(AuthMethod::sql_server(&config.user, &config.password));

    #[cfg(any(feature = "tls-rustls", feature = "tls-native"))]
    if config.trust_server_certificate {
        tds.trust_cert();
    }

    tds
}

/// Production driver backed by a pool of tiberius clients.
pub struct TiberiusDriver {
    pool: Pool<TdsManager>,
    query_timeout: Duration,
    connect_timeout: Duration,
}

impl TiberiusDriver {
    /// Build the pool and open `pool_min` connections up front.
    ///
    /// Opening the warm connections is best effort; the startup ping decides
    /// whether the server is reachable.
    pub async fn connect(config: &Config) -> DbResult<Self> {
        let connect_timeout = config.connect_timeout();
        let pool = Pool::builder(TdsManager::new(tds_config(config)))
            .max_size(config.pool_max as usize)
            .wait_timeout(Some(connect_timeout))
            .create_timeout(Some(connect_timeout))
            .recycle_timeout(Some(connect_timeout))
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| DbError::internal(format!("Failed to build connection pool: {}", e)))?;

        let driver = Self {
            pool,
            query_timeout: config.query_timeout(),
            connect_timeout,
        };
        driver.warm_up(config.pool_min as usize).await;

        info!(
            server = %config.server,
            port = config.port,
            database = %config.database,
            pool_max = config.pool_max,
            "Connection pool ready"
        );
        Ok(driver)
    }

    async fn warm_up(&self, count: usize) {
        let mut held = Vec::with_capacity(count);
        for _ in 0..count {
            match self.pool.get().await {
                Ok(conn) => held.push(conn),
                Err(e) => {
                    warn!(error = %DriverError::from(e), "Could not open warm connection");
                    break;
                }
            }
        }
    }

    /// Close the pool; outstanding connections are dropped when returned.
    pub fn close(&self) {
        self.pool.close();
    }

    async fn acquire(&self) -> Result<Object<TdsManager>, DriverError> {
        self.pool.get().await.map_err(|e| match e {
            PoolError::Timeout(_) => DriverError::connection(format!(
                "Connection pool exhausted: no connection available within {}s",
                self.connect_timeout.as_secs()
            )),
            other => DriverError::from(other),
        })
    }

    /// Run `op` on a pooled connection under the query timeout.
    async fn run<T, F>(&self, op: F) -> Result<T, DriverError>
    where
        T: Send,
        F: for<'c> FnOnce(&'c mut TdsClient) -> BoxFuture<'c, T> + Send,
    {
        let mut conn = self.acquire().await?;
        match timeout(self.query_timeout, op(&mut conn)).await {
            Ok(result) => result,
            Err(_) => {
                // The request may still be in flight on this connection.
                let _ = Object::take(conn);
                Err(DriverError::timeout(format!(
                    "Query exceeded {}ms",
                    self.query_timeout.as_millis()
                )))
            }
        }
    }
}

fn build_query<'a>(sql: &str, params: &[BoundParam]) -> Query<'a> {
    let names: Vec<String> = params.iter().map(|p| p.name.clone()).collect();
    let mut query = Query::new(rewrite_placeholders(sql, &names));
    for param in params {
        bind(&mut query, param);
    }
    query
}

fn bind(query: &mut Query<'_>, param: &BoundParam) {
    match param.engine_type {
        EngineType::NVarChar => query.bind(match &param.value {
            ParamValue::String(s) => Some(s.clone()),
            _ => None,
        }),
        EngineType::BigInt => query.bind(match param.value {
            ParamValue::Int(i) => Some(i),
            _ => None,
        }),
        EngineType::Float => query.bind(match param.value {
            ParamValue::Float(f) => Some(f),
            _ => None,
        }),
        EngineType::Bit => query.bind(match param.value {
            ParamValue::Bool(b) => Some(b),
            _ => None,
        }),
    }
}

#[async_trait]
impl Driver for TiberiusDriver {
    async fn fetch(&self, sql: &str, params: &[BoundParam]) -> Result<DriverResponse, DriverError> {
        let query = build_query(sql, params);
        self.run(move |conn| {
            Box::pin(async move {
                let mut stream = query.query(conn).await?;
                let fields = stream.columns().await?.map(fields_of).unwrap_or_default();
                let rows = stream.into_first_result().await?;
                Ok::<_, DriverError>(DriverResponse {
                    rows: rows.into_iter().map(row_to_json).collect(),
                    fields,
                    rows_affected: Vec::new(),
                })
            })
        })
        .await
    }

    async fn execute(
        &self,
        sql: &str,
        params: &[BoundParam],
    ) -> Result<DriverResponse, DriverError> {
        let query = build_query(sql, params);
        self.run(move |conn| {
            Box::pin(async move {
                let result = query.execute(conn).await?;
                Ok::<_, DriverError>(DriverResponse {
                    rows_affected: result.rows_affected().to_vec(),
                    ..DriverResponse::empty()
                })
            })
        })
        .await
    }

    async fn fetch_showplan(&self, sql: &str) -> Result<DriverResponse, DriverError> {
        let sql = sql.to_string();
        let mut conn = self.acquire().await?;

        let plan = timeout(self.query_timeout, async {
            conn.simple_query("SET SHOWPLAN_XML ON")
                .await?
                .into_results()
                .await?;
            let plan = async {
                let mut stream = conn.simple_query(sql).await?;
                let fields = stream.columns().await?.map(fields_of).unwrap_or_default();
                let rows = stream.into_first_result().await?;
                Ok::<_, tiberius::error::Error>((fields, rows))
            }
            .await;
            let reset = conn
                .simple_query("SET SHOWPLAN_XML OFF")
                .await?
                .into_results()
                .await;
            Ok::<_, tiberius::error::Error>((plan, reset.is_ok()))
        })
        .await;

        match plan {
            Ok(Ok((plan, reset_ok))) => {
                if !reset_ok {
                    // Session is stuck in plan mode; never hand it out again.
                    let _ = Object::take(conn);
                }
                let (fields, rows) = plan?;
                Ok(DriverResponse {
                    rows: rows.into_iter().map(row_to_json).collect(),
                    fields,
                    rows_affected: Vec::new(),
                })
            }
            Ok(Err(e)) => {
                let _ = Object::take(conn);
                Err(e.into())
            }
            Err(_) => {
                let _ = Object::take(conn);
                Err(DriverError::timeout(format!(
                    "Plan request exceeded {}ms",
                    self.query_timeout.as_millis()
                )))
            }
        }
    }
}

impl From<tiberius::error::Error> for DriverError {
    fn from(err: tiberius::error::Error) -> Self {
        use tiberius::error::Error;

        match err {
            Error::Io { kind, message } => {
                let kind = if kind == std::io::ErrorKind::TimedOut {
                    DriverErrorKind::Timeout
                } else {
                    DriverErrorKind::Connection
                };
                DriverError::new(kind, message)
            }
            Error::Tls(message) => DriverError::connection(format!("TLS error: {}", message)),
            Error::Routing { host, port } => {
                DriverError::connection(format!("Server redirected to {}:{}", host, port))
            }
            Error::Server(token) if token.code() == LOGIN_FAILED => {
                DriverError::connection(token.message()).with_code(token.code())
            }
            Error::Server(token) => DriverError::database(token.message()).with_code(token.code()),
            other => DriverError::new(DriverErrorKind::Other, other.to_string()),
        }
    }
}

impl From<PoolError<tiberius::error::Error>> for DriverError {
    fn from(err: PoolError<tiberius::error::Error>) -> Self {
        match err {
            PoolError::Backend(e) => e.into(),
            PoolError::Timeout(_) => {
                DriverError::connection("Connection pool exhausted: no connection available")
            }
            PoolError::Closed => DriverError::connection("Connection pool is closed"),
            other => DriverError::new(DriverErrorKind::Other, other.to_string()),
        }
    }
}
