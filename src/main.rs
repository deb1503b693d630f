use anyhow::Context;
use clap::Parser;
use clap::error::ErrorKind;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

mod config;
use config::Config;

mod downloader;
use downloader::{DispatchError, download};

mod logging;

mod transport;
use transport::{ReqwestTransport, Transport};

mod utils;
use utils::gate::Capacity;
use utils::report::Summary;

const EXIT_USAGE: u8 = 1;
const EXIT_PARTIAL_FAILURE: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "fetchgate")]
#[command(about = "Download a batch of files, a bounded number at a time")]
#[command(version)]
struct Cli {
    #[arg(help = "Directory to write downloaded files into (must exist)")]
    dir: PathBuf,
    #[arg(required = true, num_args = 1.., help = "URLs to download")]
    locators: Vec<String>,
    #[arg(
        short,
        long,
        help = "Maximum simultaneous transfers [default: number of CPUs]"
    )]
    concurrency: Option<usize>,
    #[arg(short, long, value_name = "SECS", help = "Deadline for each transfer")]
    timeout: Option<u64>,
    #[arg(long, value_name = "SECS", help = "Deadline for opening a connection")]
    connect_timeout: Option<u64>,
    #[arg(long, help = "User-Agent header sent with every request")]
    user_agent: Option<String>,
}

impl Cli {
    fn into_parts(self) -> (Config, Vec<String>) {
        let mut config = Config::new(self.dir);
        if let Some(n) = self.concurrency {
            config.capacity = Capacity::new(n);
        }
        config.timeout = self.timeout.map(Duration::from_secs);
        config.connect_timeout = self.connect_timeout.map(Duration::from_secs);
        if let Some(user_agent) = self.user_agent {
            config.user_agent = user_agent;
        }
        (config, self.locators)
    }
}

fn exit_status(summary: &Summary) -> u8 {
    if summary.is_success() {
        0
    } else {
        EXIT_PARTIAL_FAILURE
    }
}

async fn run(
    config: Config,
    locators: Vec<String>,
    transport: Arc<dyn Transport>,
) -> Result<u8, DispatchError> {
    tracing::info!(
        destination = %config.destination.display(),
        capacity = config.capacity.get(),
        locators = locators.len(),
        "starting downloads"
    );
    let summary = download(&config, locators, transport).await?;
    println!("{}", summary);
    Ok(exit_status(&summary))
}

/// Parses the command line. `Err` carries the exit status to stop with:
/// 0 after printing help or version, [`EXIT_USAGE`] after a usage error.
fn parse_cli<I, T>(args: I) -> Result<Cli, u8>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    Cli::try_parse_from(args).map_err(|err| {
        let _ = err.print();
        match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
            _ => EXIT_USAGE,
        }
    })
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match parse_cli(std::env::args_os()) {
        Ok(cli) => cli,
        Err(status) => return ExitCode::from(status),
    };

    logging::init_logging();

    match try_main(cli).await {
        Ok(status) => ExitCode::from(status),
        Err(err) => {
            tracing::error!("{:#}", err);
            ExitCode::FAILURE
        }
    }
}

async fn try_main(cli: Cli) -> anyhow::Result<u8> {
    let (config, locators) = cli.into_parts();
    let transport = ReqwestTransport::new(&config.user_agent, config.connect_timeout)
        .context("failed to build HTTP client")?;

    match run(config, locators, Arc::new(transport)).await {
        Ok(status) => Ok(status),
        Err(DispatchError::NoLocators) => {
            eprintln!("Usage: fetchgate <DIR> <LOCATOR>...");
            Ok(EXIT_USAGE)
        }
        Err(err) => Err(err).context("download run aborted"),
    }
}
