use std::panic;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use flexi_logger::{
    colored_opt_format, Age, Cleanup, Criterion, FileSpec, Logger, LoggerHandle, Naming,
};
use log::error;
#[cfg(unix)]
use signal_hook::{consts::TERM_SIGNALS, iterator::Signals};

use mysql_sniffer::config::Config;
use mysql_sniffer::sniffer::Sniffer;

#[derive(Parser)]
#[command(about = "Passive MySQL query observer")]
struct Opts {
    /// MySQL port to observe
    #[arg(short = 'P', long)]
    port: Option<u16>,

    /// Interface to capture on
    #[arg(short = 'i', long)]
    interface: Option<String>,

    /// Unsanitized: publish raw statements instead of fingerprints
    #[arg(short = 'u', long)]
    raw_queries: bool,

    /// Echo every published record to the log
    #[arg(short = 'v', long, action = ArgAction::Set, value_name = "BOOL")]
    verbose: Option<bool>,

    /// Disable canonicalization regardless of verbosity
    #[arg(short = 'n', long)]
    no_clean: bool,

    /// Output template; #s source, #i source ip, #q query, #r route
    #[arg(short = 'f', long)]
    format: Option<String>,

    /// Publisher address, e.g. tcp://127.0.0.1:7388
    #[arg(long = "zmq-addr")]
    zmq_addr: Option<String>,

    #[arg(long)]
    service_id: Option<String>,

    #[arg(long)]
    tenant_id: Option<String>,

    /// Publish topic; defaults to cep.mysql.sniff.<tenant-id>
    #[arg(long)]
    topic: Option<String>,

    /// Keep flows alive after an emit, pairing every query per connection
    #[arg(long)]
    return_to_idle: bool,

    /// Log file; stderr when unset
    #[arg(long)]
    log_file: Option<String>,

    /// Optional YAML config; flags override its values
    #[arg(short = 'c', long)]
    config_file: Option<String>,
}

impl Opts {
    fn apply(self, config: &mut Config) {
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(interface) = self.interface {
            config.interface = interface;
        }
        if self.raw_queries {
            config.raw_queries = true;
        }
        if let Some(verbose) = self.verbose {
            config.verbose = verbose;
        }
        if self.no_clean {
            config.no_clean = true;
        }
        if let Some(format) = self.format {
            config.format = format;
        }
        if let Some(addr) = self.zmq_addr {
            config.publisher_addr = addr;
        }
        if let Some(service_id) = self.service_id {
            config.service_id = service_id;
        }
        if let Some(tenant_id) = self.tenant_id {
            config.tenant_id = tenant_id;
        }
        if let Some(topic) = self.topic {
            config.topic = topic;
        }
        if self.return_to_idle {
            config.return_to_idle = true;
        }
        if let Some(log_file) = self.log_file {
            config.log_file = log_file;
        }
    }
}

fn setup_logger(log_file: &str) -> Result<LoggerHandle> {
    let logger = Logger::try_with_env_or_str("info")?;
    let handle = if log_file.is_empty() {
        logger.format(colored_opt_format).start()?
    } else {
        logger
            .format_for_files(colored_opt_format)
            .log_to_file(FileSpec::try_from(log_file)?)
            .rotate(Criterion::Age(Age::Day), Naming::Timestamps, Cleanup::Never)
            .create_symlink(log_file)
            .append()
            .start()?
    };
    Ok(handle)
}

#[cfg(unix)]
fn wait_on_signals() {
    let mut signals = Signals::new(TERM_SIGNALS).unwrap();
    signals.forever().next();
    signals.handle().close();
}

#[cfg(not(unix))]
fn wait_on_signals() {}

fn main() -> Result<()> {
    let opts = Opts::parse();

    let mut config = match &opts.config_file {
        Some(path) => Config::load_from_file(path)
            .with_context(|| format!("loading config from {}", path))?,
        None => Config::default(),
    };
    opts.apply(&mut config);
    config.normalize();
    config
        .validate()
        .map_err(|e| anyhow::anyhow!(e).context("invalid configuration"))?;

    let _logger = setup_logger(&config.log_file).context("logger setup")?;
    panic::set_hook(Box::new(|panic_info| {
        error!("{:?}", panic_info.to_string());
    }));

    let sniffer = Sniffer::start(config)?;
    wait_on_signals();
    sniffer.stop();

    Ok(())
}
