/*
 *  main.rs
 *
 *  lmsign - LED matrix sign
 *	(c) 2020-26 Stuart Hunter
 *
 *	This program is free software: you can redistribute it and/or modify
 *	it under the terms of the GNU General Public License as published by
 *	the Free Software Foundation, either version 3 of the License, or
 *	(at your option) any later version.
 *
 *	This program is distributed in the hope that it will be useful,
 *	but WITHOUT ANY WARRANTY; without even the implied warranty of
 *	MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *	GNU General Public License for more details.
 *
 *	See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *	Public License.
 *
 */

use anyhow::Context;
use clap::Parser;
use env_logger::Env;
use log::{error, info};
use std::time::Duration;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

use lmsign::app::{App, Sources};
use lmsign::config::{self, Cli};
use lmsign::display::DisplayDriverFactory;

include!(concat!(env!("OUT_DIR"), "/build_info.rs"));

/// Waits for SIGINT, SIGTERM or SIGHUP.
#[cfg(unix)]
async fn signal_handler() -> std::io::Result<()> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sighup = signal(SignalKind::hangup())?;

    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT received. Initiating graceful shutdown.");
        }
        _ = sigterm.recv() => {
            info!("SIGTERM received. Initiating graceful shutdown.");
        }
        _ = sighup.recv() => {
            info!("SIGHUP received. Initiating graceful shutdown.");
        }
    }
    Ok(())
}

#[cfg(not(unix))]
async fn signal_handler() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await?;
    info!("Ctrl-C received. Initiating graceful shutdown.");
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load(&cli).context("loading configuration")?;

    if cli.dump_config {
        print!("{}", config::dump(&cfg)?);
        return Ok(());
    }

    let level = cfg.log_level.clone().unwrap_or_else(|| "info".to_string());
    env_logger::Builder::from_env(Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();

    info!("This is {}, the LED matrix sign", env!("CARGO_PKG_NAME"));
    info!("v.{} built {}", env!("CARGO_PKG_VERSION"), BUILD_DATE);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("lmsign")
        .build()
        .context("building tokio runtime")?;

    let result = runtime.block_on(async {
        let sources = Sources::from_config(&cfg).context("creating data sources")?;
        let driver = DisplayDriverFactory::create_from_config(&cfg.display).context("creating display driver")?;

        let signal = async {
            if let Err(e) = signal_handler().await {
                error!("Signal handler failed: {}", e);
            }
        };
        let report = App::new(cfg, sources, driver)
            .run_until(signal)
            .await
            .context("sign stopped")?;
        for (mode, stats) in &report.providers {
            info!(
                "{} provider: {} polls, {} skipped, {} sent, {} dropped",
                mode, stats.polls, stats.skipped, stats.sent, stats.dropped
            );
        }
        anyhow::Ok(())
    });

    // stdin reads park a blocking thread; don't wait on it forever
    runtime.shutdown_timeout(Duration::from_secs(1));
    info!("Main application exiting.");
    result
}
