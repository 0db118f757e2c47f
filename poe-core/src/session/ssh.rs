//! russh-backed shell transport.
//!
//! Password authentication only. Host keys are accepted without verification.

use super::{wait_for, ShellChannel, ShellConnector};
use crate::config::Target;
use crate::error::SessionError;
use russh::client::{self, Handle, Msg};
use russh::keys::PublicKey;
use russh::{Channel, ChannelMsg, Disconnect};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Host key policy: trust whatever the switch presents.
pub struct AcceptAnyHostKey;

impl client::Handler for AcceptAnyHostKey {
    type Error = russh::Error;

    async fn check_server_key(&mut self, _server_public_key: &PublicKey) -> Result<bool, Self::Error> {
        debug!("Accepting host key without verification");
        Ok(true)
    }
}

pub struct SshConnector {
    config: Arc<client::Config>,
}

impl SshConnector {
    pub fn new(config: client::Config) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

impl Default for SshConnector {
    fn default() -> Self {
        Self::new(client::Config::default())
    }
}

impl ShellConnector for SshConnector {
    type Channel = SshChannel;

    async fn open(&self, target: &Target) -> Result<SshChannel, SessionError> {
        let mut handle = client::connect(
            self.config.clone(),
            (target.host.as_str(), target.port),
            AcceptAnyHostKey,
        )
        .await
        .map_err(|e| SessionError::Connect {
            host: target.host.clone(),
            reason: e.to_string(),
        })?;

        let auth = handle
            .authenticate_password(target.user.as_str(), target.password.as_str())
            .await
            .map_err(SessionError::from)
            .and_then(|auth| {
                if auth.success() {
                    Ok(())
                } else {
                    Err(SessionError::AuthFailed {
                        host: target.host.clone(),
                        user: target.user.clone(),
                    })
                }
            });
        release_on_err(auth, || disconnect(&handle)).await?;

        let channel = release_on_err(open_shell(&handle).await, || disconnect(&handle)).await?;
        Ok(SshChannel { channel, handle })
    }
}

/// Pass `result` through, running `release` first when it is an error.
async fn release_on_err<T, F, Fut>(result: Result<T, SessionError>, release: F) -> Result<T, SessionError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = ()>,
{
    if result.is_err() {
        release().await;
    }
    result
}

async fn disconnect(handle: &Handle<AcceptAnyHostKey>) {
    if let Err(e) = handle.disconnect(Disconnect::ByApplication, "", "en").await {
        debug!("Disconnect after failed setup: {}", e);
    }
}

async fn open_shell(handle: &Handle<AcceptAnyHostKey>) -> Result<Channel<Msg>, SessionError> {
    let channel = handle.channel_open_session().await?;
    channel.request_pty(false, "vt100", 200, 50, 0, 0, &[]).await?;
    channel.request_shell(false).await?;
    Ok(channel)
}

pub struct SshChannel {
    channel: Channel<Msg>,
    handle: Handle<AcceptAnyHostKey>,
}

impl ShellChannel for SshChannel {
    async fn send_line(&mut self, line: &str) -> Result<(), SessionError> {
        let data = format!("{line}\n");
        self.channel.data(data.as_bytes()).await?;
        Ok(())
    }

    async fn read_chunk(&mut self, wait: Option<Duration>) -> Result<Option<Vec<u8>>, SessionError> {
        loop {
            let Some(msg) = wait_for(wait, self.channel.wait()).await else {
                return Ok(None);
            };
            match msg {
                Some(ChannelMsg::Data { data }) => return Ok(Some(data.to_vec())),
                Some(ChannelMsg::ExtendedData { data, .. }) => return Ok(Some(data.to_vec())),
                Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => return Ok(None),
                Some(other) => debug!("Ignoring channel message {:?}", other),
            }
        }
    }

    async fn close(self) -> Result<(), SessionError> {
        let channel_result = self.channel.close().await;
        self.handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await?;
        channel_result?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[tokio::test]
    async fn test_failed_setup_releases_connection() {
        let released = Cell::new(false);
        let flag = &released;

        let result: Result<(), SessionError> = release_on_err(
            Err(SessionError::Channel("transport closed".into())),
            move || async move { flag.set(true) },
        )
        .await;

        assert!(matches!(result, Err(SessionError::Channel(_))));
        assert!(released.get());
    }

    #[tokio::test]
    async fn test_successful_setup_keeps_connection() {
        let released = Cell::new(false);
        let flag = &released;

        let result = release_on_err(Ok(7), move || async move { flag.set(true) }).await;

        assert_eq!(result.unwrap(), 7);
        assert!(!released.get());
    }
}
