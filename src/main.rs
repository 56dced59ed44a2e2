// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

mod cli;
mod config;
mod ingest;
mod network;
mod scan;
mod sdr;
mod spectrum;

use std::sync::Arc;

use clap::Parser;
use log::{error, info, warn};
use spectrum_sweep::{Frequency, Receiver, ReceiverError};
use tokio::io::{AsyncWrite, BufReader};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::cli::{Cli, Command, ReceiverArgs, ScanArgs, ServeArgs};
use crate::config::AppConfig;
use crate::ingest::IngestConfig;
use crate::network::FeedState;
use crate::scan::ScanOptions;
use crate::sdr::{DemoReceiver, RtlSdrReceiver};
use crate::spectrum::SpectrumState;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        error!("{}", e);
        std::process::exit(1);
    }
}

/// Log to stderr so stdout carries only scan records.
fn init_logging(verbose: u8) {
    let default_filter = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter));
    builder.target(env_logger::Target::Stderr).init();
}

fn load_config() -> AppConfig {
    match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            warn!("Failed to load configuration, using defaults: {}", e);
            AppConfig::default()
        }
    }
}

async fn run(cli: Cli) -> Result<(), BoxError> {
    match cli.command {
        Command::Scan(args) => run_scan(&args).await,
        Command::Serve(args) => run_serve(&args).await,
        Command::Rates(args) => list_rates(&args),
        Command::Config { reset } => show_config(reset),
    }
}

fn open_receiver(args: &ReceiverArgs) -> Result<Box<dyn Receiver>, ReceiverError> {
    if args.demo {
        info!("Using the synthetic receiver");
        return Ok(Box::new(DemoReceiver::default().paced(true)));
    }
    Ok(Box::new(RtlSdrReceiver::open(args.device)?))
}

/// Cancel `token` on Ctrl-C.
fn cancel_on_interrupt(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, shutting down");
            token.cancel();
        }
    });
}

async fn run_scan(args: &ScanArgs) -> Result<(), BoxError> {
    let mut config = load_config();
    args.apply(&mut config);

    let receiver = open_receiver(&args.receiver)?;
    let out: Box<dyn AsyncWrite + Unpin + Send> = match &args.dump {
        Some(path) => {
            info!("Writing records to {}", path.display());
            Box::new(tokio::fs::File::create(path).await?)
        }
        None => Box::new(tokio::io::stdout()),
    };

    let cancel = CancellationToken::new();
    cancel_on_interrupt(cancel.clone());

    let options = ScanOptions {
        sweeps: args.sweeps,
        average_depth: config.average_depth,
    };
    scan::run(receiver, config.hop_config(), options, out, cancel).await?;
    Ok(())
}

async fn run_serve(args: &ServeArgs) -> Result<(), BoxError> {
    let mut config = load_config();
    args.apply(&mut config);

    let spectrum = SpectrumState::shared(config.history_config(), config.average_depth);
    let feed = network::feed_broadcaster(Arc::clone(&spectrum), config.broadcast_config());
    let state = FeedState {
        spectrum: Arc::clone(&spectrum),
        feed: feed.clone(),
        title: Arc::from(config.title.as_str()),
    };

    let cancel = CancellationToken::new();
    cancel_on_interrupt(cancel.clone());

    let listener = TcpListener::bind(config.listen_addr()).await?;
    let server = tokio::spawn(network::serve(listener, state, cancel.clone()));

    let input = BufReader::new(tokio::io::stdin());
    let forward = args.forward.then(tokio::io::stdout);
    ingest::run(
        input,
        forward,
        IngestConfig { offset: args.offset },
        spectrum,
        feed,
        cancel.clone(),
    )
    .await?;

    if !cancel.is_cancelled() {
        info!("Still serving the collected history, press Ctrl-C to exit");
    }
    cancel.cancelled().await;
    server.await?;
    Ok(())
}

fn list_rates(args: &ReceiverArgs) -> Result<(), BoxError> {
    let mut receiver = open_receiver(args)?;
    for rate in receiver.supported_sample_rates() {
        println!("{}", Frequency(rate));
    }
    receiver.close()?;
    Ok(())
}

fn show_config(reset: bool) -> Result<(), BoxError> {
    let config = if reset {
        let config = AppConfig::default();
        config.save()?;
        info!("Configuration reset to defaults");
        config
    } else {
        AppConfig::load()?
    };

    println!("# {}", AppConfig::get_config_path()?.display());
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
