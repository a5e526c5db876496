use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, error};

use mackerel_plugin_smart::config::DEFAULT_CONFIG_PATH;
use mackerel_plugin_smart::logging::{init_logging, LogConfig, DEFAULT_SYSLOG_DEVICE};
use mackerel_plugin_smart::schema::wants_schema;
use mackerel_plugin_smart::{PluginConfig, RunError, Runner, SmartctlProbe};
use smart_metrics_types::PLUGIN_META_ENV;

#[derive(Parser, Debug)]
#[command(name = "mackerel-plugin-smart")]
#[command(about = "S.M.A.R.T. disk health metrics for mackerel-agent")]
#[command(version)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Print the graph schema instead of metrics
    #[arg(short, long)]
    print_schema: bool,

    /// Also send log messages to syslog
    #[arg(short = 'l', long)]
    log_to_syslog: bool,

    /// Syslog socket used with --log-to-syslog
    #[arg(long, default_value = DEFAULT_SYSLOG_DEVICE)]
    syslog_device: PathBuf,

    /// Log debug messages
    #[arg(short, long)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&LogConfig {
        debug: args.debug,
        syslog_device: args.log_to_syslog.then(|| args.syslog_device.clone()),
    })?;
    debug!("{:?}", args);

    let config = PluginConfig::load(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;
    let probe = SmartctlProbe::from_config(&config.metrics)
        .context("Failed to start the smartctl runtime")?;
    let runner = Runner::new(&config, probe);

    let stdout = io::stdout();
    let mut out = stdout.lock();

    let meta = std::env::var_os(PLUGIN_META_ENV);
    let result = if wants_schema(args.print_schema, meta.as_deref()) {
        runner.print_schema(&mut out).map(|()| 0)
    } else {
        runner.run(&mut out)
    };
    out.flush()?;

    match result {
        Ok(0) => Ok(()),
        Ok(code) => {
            debug!("exit status {}", code);
            std::process::exit(i32::from(code))
        }
        Err(e @ RunError::Fatal { .. }) => {
            error!("{}", e);
            std::process::exit(e.exit_code())
        }
        Err(e) => Err(e.into()),
    }
}
