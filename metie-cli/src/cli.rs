use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::{Parser, Subcommand};
use metie_core::{
    Config, Forecast, ForecastProvider, MetEireannProvider, NoopMetrics, Poller, PostgresWriter,
    PrometheusMetrics,
};
use prometheus_client::registry::Registry;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{exporter, shutdown};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "metie", version, about = "Store Met Éireann point forecasts in PostgreSQL")]
pub struct Cli {
    /// Path to the configuration file. Defaults to the platform config directory.
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Poll on the configured interval until interrupted.
    Run {
        /// Reach the database through this SOCKS5 proxy (host:port).
        #[arg(long, env = "SOCKS_PROXY")]
        socks_proxy: Option<String>,
    },

    /// Fetch a single forecast and print it. Nothing is written.
    Once {
        /// Print the forecast as JSON.
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        let path = match self.config {
            Some(path) => path,
            None => Config::config_file_path()?,
        };
        let config = Config::load(&path).context("invalid configuration")?;

        let token = CancellationToken::new();
        shutdown::spawn_signal_listener(token.clone());

        match self.command {
            Command::Run { socks_proxy } => run_poller(config, socks_proxy, token).await,
            Command::Once { json } => run_once(&config, json, &token).await,
        }
    }
}

async fn run_poller(
    mut config: Config,
    socks_proxy: Option<String>,
    token: CancellationToken,
) -> anyhow::Result<()> {
    if let Some(proxy) = socks_proxy {
        info!(%proxy, "database connections go through SOCKS5 proxy");
        config.network = config.network.with_socks_proxy(proxy);
        config.validate().context("invalid configuration")?;
    }

    let mut registry = Registry::default();
    let metrics = Arc::new(PrometheusMetrics::register(&mut registry));

    let provider = MetEireannProvider::new(metrics.clone()).context("cannot build HTTP client")?;
    let writer = PostgresWriter::new(&config.dsn, &config.table, config.network.clone(), metrics)
        .context("invalid configuration")?;

    let exporter = config.metrics_listen.map(|addr| {
        let registry = Arc::new(registry);
        let token = token.clone();
        tokio::spawn(async move {
            if let Err(e) = exporter::serve(addr, registry, token).await {
                error!(error = %e, "metrics exporter stopped");
            }
        })
    });

    let poller = Poller::new(
        Arc::new(provider),
        Arc::new(writer),
        config.latitude,
        config.longitude,
        config.interval,
    );
    poller.run(token.clone()).await;

    token.cancel();
    if let Some(handle) = exporter {
        let _ = handle.await;
    }

    Ok(())
}

async fn run_once(config: &Config, json: bool, token: &CancellationToken) -> anyhow::Result<()> {
    let provider = MetEireannProvider::new(Arc::new(NoopMetrics)).context("cannot build HTTP client")?;
    let fc = provider
        .fetch(config.latitude, config.longitude, token)
        .await
        .context("cannot fetch forecast")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&fc)?);
    } else {
        print!("{}", render(&fc));
    }

    Ok(())
}

fn render(fc: &Forecast) -> String {
    const TIME: &str = "%Y-%m-%d %H:%M UTC";

    format!(
        "Forecast {} - {} ({})\n\
         Temperature: {:.2} °C\n\
         Humidity: {:.2}%\n\
         Wind speed: {:.2} m/s (Beaufort {})\n\
         Wind direction: {:.2} {}\n\
         Rain: {:.2} mm ({:.0}% probability)\n",
        fc.from.format(TIME),
        fc.to.format(TIME),
        fc.time.format("%Y-%m-%d %H:%M:%S UTC"),
        fc.temperature,
        fc.humidity,
        fc.wind_speed_mps,
        fc.wind_speed_beaufort,
        fc.wind_direction,
        fc.wind_direction_name,
        fc.rain_mm,
        fc.rain_probability,
    )
}
