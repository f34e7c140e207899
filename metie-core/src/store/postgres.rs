//! One-row-per-cycle writer for PostgreSQL.
//!
//! A fresh connection is opened for every write and closed before returning. The
//! polling interval is measured in minutes, so there is nothing to gain from a pool.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    time::timeout,
};
use tokio::net::TcpStream;
use tokio_postgres::{
    Client, Connection, NoTls,
    config::Host,
    tls::NoTlsStream,
    types::ToSql,
};
use tokio_socks::tcp::Socks5Stream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::{
    error::{ConfigError, WriteError},
    metrics::MetricsSink,
    model::Forecast,
    network::{NetworkPolicy, ProxyTarget},
};

use super::ForecastStore;

const DEFAULT_PORT: u16 = 5432;

/// Upper bound for reaching the server: proxy handshake, socket and startup included.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound for the INSERT once connected.
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(30);

type Column<'a> = (&'static str, &'a (dyn ToSql + Sync));

/// Column names paired with their values, in insert order.
///
/// Names and positional parameters come from this single list, so reordering
/// fields in [`Forecast`] cannot shift a value into the wrong column.
fn columns(fc: &Forecast) -> [Column<'_>; 15] {
    [
        ("time", &fc.time),
        ("temperature", &fc.temperature),
        ("wind_deg", &fc.wind_direction),
        ("wind_speed", &fc.wind_speed_mps),
        ("wind_beaufort", &fc.wind_speed_beaufort),
        ("radiation", &fc.solar_radiation),
        ("humidity", &fc.humidity),
        ("pressure", &fc.pressure),
        ("cloudiness", &fc.cloudiness),
        ("clouds_low", &fc.clouds_low),
        ("clouds_medium", &fc.clouds_medium),
        ("clouds_high", &fc.clouds_high),
        ("dewpoint", &fc.dewpoint),
        ("rain", &fc.rain_mm),
        ("rain_probability", &fc.rain_probability),
    ]
}

fn insert_statement(table: &str, names: &[&str]) -> String {
    let placeholders: Vec<String> = (1..=names.len()).map(|i| format!("${i}")).collect();

    format!("INSERT INTO {}({}) VALUES({})", table, names.join(","), placeholders.join(","))
}

#[derive(Debug, Clone)]
pub struct PostgresWriter {
    config: tokio_postgres::Config,
    table: String,
    network: NetworkPolicy,
    metrics: Arc<dyn MetricsSink>,
    connect_timeout: Duration,
    write_timeout: Duration,
}

impl PostgresWriter {
    /// The DSN is parsed up front so a bad one fails at startup, not on the first write.
    pub fn new(
        dsn: &str,
        table: impl Into<String>,
        network: NetworkPolicy,
        metrics: Arc<dyn MetricsSink>,
    ) -> Result<Self, ConfigError> {
        let mut config: tokio_postgres::Config =
            dsn.parse().map_err(|e: tokio_postgres::Error| ConfigError::InvalidDsn {
                reason: e.to_string(),
            })?;
        config.connect_timeout(CONNECT_TIMEOUT);

        Ok(Self {
            config,
            table: table.into(),
            network,
            metrics,
            connect_timeout: CONNECT_TIMEOUT,
            write_timeout: WRITE_TIMEOUT,
        })
    }

    /// Replace the default connect and insert deadlines.
    pub fn with_timeouts(mut self, connect: Duration, write: Duration) -> Self {
        self.config.connect_timeout(connect);
        self.connect_timeout = connect;
        self.write_timeout = write;
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn tcp_endpoint(&self) -> (String, u16) {
        let host = self
            .config
            .get_hosts()
            .iter()
            .find_map(|h| match h {
                Host::Tcp(name) => Some(name.clone()),
                #[allow(unreachable_patterns)]
                _ => None,
            })
            .unwrap_or_else(|| "localhost".to_string());
        let port = self.config.get_ports().first().copied().unwrap_or(DEFAULT_PORT);

        (host, port)
    }

    async fn write_row(&self, fc: &Forecast) -> Result<(), WriteError> {
        let Some(proxy) = &self.network.socks_proxy else {
            let (client, connection) = timeout(self.connect_timeout, self.config.connect(NoTls))
                .await
                .map_err(|_| WriteError::ConnectTimeout(self.connect_timeout))?
                .map_err(WriteError::Connection)?;
            return self.insert(client, connection, fc).await;
        };

        let (client, connection) = timeout(self.connect_timeout, self.connect_via_proxy(proxy))
            .await
            .map_err(|_| WriteError::ConnectTimeout(self.connect_timeout))??;
        self.insert(client, connection, fc).await
    }

    async fn connect_via_proxy(
        &self,
        proxy: &str,
    ) -> Result<(Client, Connection<Socks5Stream<TcpStream>, NoTlsStream>), WriteError> {
        let (host, port) = self.tcp_endpoint();
        let stream = match self.network.proxy_target(&host, port).await? {
            ProxyTarget::Host(host, port) => Socks5Stream::connect(proxy, (host.as_str(), port)).await?,
            ProxyTarget::Addr(addr) => Socks5Stream::connect(proxy, addr).await?,
        };
        debug!(%proxy, %host, port, "connected through SOCKS5 proxy");

        self.config.connect_raw(stream, NoTls).await.map_err(WriteError::Connection)
    }

    async fn insert<S, T>(
        &self,
        client: Client,
        connection: Connection<S, T>,
        fc: &Forecast,
    ) -> Result<(), WriteError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let mut driver = tokio::spawn(async move {
            if let Err(e) = connection.await {
                debug!(error = %e, "database connection closed with error");
            }
        });

        let columns = columns(fc);
        let names: Vec<&str> = columns.iter().map(|(name, _)| *name).collect();
        let values: Vec<&(dyn ToSql + Sync)> = columns.iter().map(|(_, value)| *value).collect();
        let statement = insert_statement(&self.table, &names);

        let result = match timeout(self.write_timeout, client.execute(statement.as_str(), &values)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(WriteError::Write(e)),
            Err(_) => Err(WriteError::WriteTimeout(self.write_timeout)),
        };

        // Dropping the client ends the connection task.
        drop(client);
        if timeout(self.write_timeout, &mut driver).await.is_err() {
            driver.abort();
        }

        result
    }
}

#[async_trait]
impl ForecastStore for PostgresWriter {
    #[instrument(skip(self, forecast, cancel), fields(table = %self.table), level = "info")]
    async fn write(&self, forecast: &Forecast, cancel: &CancellationToken) -> Result<(), WriteError> {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(WriteError::Cancelled),
            result = self.write_row(forecast) => result,
        };

        match &result {
            Ok(()) => {
                debug!("row written");
                self.metrics.write_succeeded();
            }
            Err(err) => self.metrics.write_failed(err.reason()),
        }

        result
    }
}
