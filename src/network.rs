/*
 *  network.rs
 *
 *  lmsign - LED matrix sign
 *  (c) 2020-26 Stuart Hunter
 *
 *  Link health check and reconnect action
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

use async_trait::async_trait;
use log::debug;
use std::process::ExitStatus;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("no reconnect command configured")]
    NotConfigured,
    #[error("reconnect command failed to start: {0}")]
    Io(#[from] std::io::Error),
    #[error("reconnect command exited with {0}")]
    CommandFailed(ExitStatus),
    #[error("reconnect command timed out after {0:?}")]
    Timeout(Duration),
}

/// The network collaborator the connectivity watchdog talks to.
#[async_trait]
pub trait NetworkLink: Send + Sync {
    async fn is_up(&self) -> bool;

    async fn reconnect(&self) -> Result<(), NetworkError>;
}

/// Healthy when a TCP connection to `addr` opens within the timeout.
#[derive(Debug, Clone)]
pub struct TcpCheckLink {
    addr: String,
    timeout: Duration,
    reconnect_command: Vec<String>,
}

const RECONNECT_TIMEOUT: Duration = Duration::from_secs(30);

impl TcpCheckLink {
    pub fn new(addr: impl Into<String>, timeout: Duration, reconnect_command: Vec<String>) -> Self {
        Self {
            addr: addr.into(),
            timeout,
            reconnect_command,
        }
    }
}

#[async_trait]
impl NetworkLink for TcpCheckLink {
    async fn is_up(&self) -> bool {
        match tokio::time::timeout(self.timeout, TcpStream::connect(self.addr.as_str())).await {
            Ok(Ok(_stream)) => true,
            Ok(Err(e)) => {
                debug!("Check of {} failed: {}", self.addr, e);
                false
            }
            Err(_) => {
                debug!("Check of {} timed out", self.addr);
                false
            }
        }
    }

    async fn reconnect(&self) -> Result<(), NetworkError> {
        let Some((program, args)) = self.reconnect_command.split_first() else {
            return Err(NetworkError::NotConfigured);
        };
        debug!("Running reconnect command {:?}", self.reconnect_command);
        let mut child = Command::new(program).args(args).kill_on_drop(true).spawn()?;
        let status = tokio::time::timeout(RECONNECT_TIMEOUT, child.wait())
            .await
            .map_err(|_| NetworkError::Timeout(RECONNECT_TIMEOUT))??;
        if status.success() {
            Ok(())
        } else {
            Err(NetworkError::CommandFailed(status))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_check_open_and_closed_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let link = TcpCheckLink::new(addr.to_string(), Duration::from_millis(500), vec![]);
        assert!(link.is_up().await);

        drop(listener);
        assert!(!link.is_up().await);
    }

    #[tokio::test]
    async fn test_reconnect_without_command() {
        let link = TcpCheckLink::new("127.0.0.1:1", Duration::from_millis(10), vec![]);
        assert!(matches!(link.reconnect().await, Err(NetworkError::NotConfigured)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_reconnect_runs_command() {
        let ok = TcpCheckLink::new("127.0.0.1:1", Duration::from_millis(10), vec!["true".into()]);
        assert!(ok.reconnect().await.is_ok());
        let bad = TcpCheckLink::new("127.0.0.1:1", Duration::from_millis(10), vec!["false".into()]);
        assert!(matches!(bad.reconnect().await, Err(NetworkError::CommandFailed(_))));
    }
}
