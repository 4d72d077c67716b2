/*
 *  input.rs
 *
 *  lmsign - LED matrix sign
 *  (c) 2020-26 Stuart Hunter
 *
 *  Control inputs: console commands and the mode button
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use log::{debug, info, warn};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::sync::CancellationToken;

use crate::channel::{BestEffortSender, Delivery};
use crate::providers::transit::Station;
use crate::sign::{ControlError, SignMode, UIMessage};

/// Parse one console line.
///
/// ```text
/// next
/// mode clock | mode 2
/// station park street | station 7 | station place-pktrm
/// ```
pub fn parse_command(line: &str) -> Result<UIMessage, ControlError> {
    let line = line.trim();
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };
    match verb.to_ascii_lowercase().as_str() {
        "next" | "shift" => Ok(UIMessage::ModeShift),
        "mode" => {
            if rest.is_empty() {
                return Err(ControlError::MissingArgument("mode"));
            }
            Ok(UIMessage::ModeChange(rest.parse::<SignMode>()?))
        }
        "station" => {
            if rest.is_empty() {
                return Err(ControlError::MissingArgument("station"));
            }
            Ok(UIMessage::StationChange(rest.parse::<Station>()?))
        }
        _ => Err(ControlError::UnknownCommand(verb.to_string())),
    }
}

async fn post(control: &BestEffortSender<UIMessage>, msg: UIMessage) -> bool {
    match control.send(msg).await {
        Delivery::Sent => true,
        Delivery::Dropped => {
            debug!("Control request {:?} dropped", msg);
            true
        }
        Delivery::Closed => false,
    }
}

/// Read commands line by line until EOF, cancel, or the controller is gone.
/// Returns the number of requests posted.
pub async fn run_console<R>(reader: R, control: BestEffortSender<UIMessage>, shutdown: CancellationToken) -> u64
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut posted = 0;
    loop {
        let line = tokio::select! {
            () = shutdown.cancelled() => break,
            line = lines.next_line() => line,
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!("Console input closed");
                break;
            }
            Err(e) => {
                warn!("Console read failed: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match parse_command(&line) {
            Ok(msg) => {
                if !post(&control, msg).await {
                    break;
                }
                posted += 1;
            }
            Err(e) => warn!("Ignoring console input: {}", e),
        }
    }
    posted
}

/// SIGUSR1 acts as a tap on the mode button.
#[cfg(unix)]
pub async fn run_button_signal(control: BestEffortSender<UIMessage>, shutdown: CancellationToken) -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut taps = signal(SignalKind::user_defined1())?;
    info!("Mode button listening on SIGUSR1");
    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            tap = taps.recv() => {
                if tap.is_none() || !post(&control, UIMessage::ModeShift).await {
                    break;
                }
            }
        }
    }
    Ok(())
}
