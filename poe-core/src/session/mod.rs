//! Remote shell session driver
//!
//! The switch has no RPC interface, so a session is a fixed script typed into
//! an interactive shell:
//! - drain the banner
//! - `enable` + enable password
//! - optionally `configure` + `interface <id>`
//! - the command(s), output captured with a bounded read
//! - `exit` twice when a configuration context was entered
//!
//! Completion of each step is inferred from fixed delays by default. The
//! transport is reached through [`ShellConnector`] / [`ShellChannel`] so the
//! script can run against a scripted fake in tests.

mod ssh;

pub use ssh::{SshChannel, SshConnector};

use crate::config::{CompletionSettings, SessionSettings, Target};
use crate::error::SessionError;
use crate::mapper::InterfaceId;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn, Instrument};

/// An open interactive shell on the switch.
pub trait ShellChannel: Send {
    /// Write `line` followed by a newline.
    fn send_line(&mut self, line: &str) -> impl Future<Output = Result<(), SessionError>> + Send;

    /// Next chunk of output. `None` for `wait` blocks until data arrives.
    /// Returns `Ok(None)` when the wait elapsed or the channel closed.
    fn read_chunk(
        &mut self,
        wait: Option<Duration>,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, SessionError>> + Send;

    /// Close the channel and the underlying connection.
    fn close(self) -> impl Future<Output = Result<(), SessionError>> + Send;
}

/// Opens authenticated shells on a target.
pub trait ShellConnector: Send + Sync {
    type Channel: ShellChannel;

    fn open(&self, target: &Target) -> impl Future<Output = Result<Self::Channel, SessionError>> + Send;
}

/// How to tell that the device finished answering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// Sleep a fixed interval, then read whatever is buffered.
    FixedDelay,
    /// Read until the output ends with a marker, or nothing arrives for `idle_timeout`.
    Prompt {
        markers: Vec<String>,
        idle_timeout: Duration,
    },
}

impl From<&CompletionSettings> for Completion {
    fn from(settings: &CompletionSettings) -> Self {
        match settings {
            CompletionSettings::FixedDelay => Completion::FixedDelay,
            CompletionSettings::Prompt {
                markers,
                idle_timeout_ms,
            } => Completion::Prompt {
                markers: markers.clone(),
                idle_timeout: Duration::from_millis(*idle_timeout_ms),
            },
        }
    }
}

/// What to run once privileged mode is reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionScript {
    /// `configure` + `interface <id>`, run `command`, then back out.
    Interface { interface: InterfaceId, command: String },
    /// Run each command in privileged mode; outputs are concatenated.
    Privileged { commands: Vec<String> },
}

impl SessionScript {
    pub fn interface(interface: InterfaceId, command: impl Into<String>) -> Self {
        SessionScript::Interface {
            interface,
            command: command.into(),
        }
    }

    pub fn privileged<I, S>(commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SessionScript::Privileged {
            commands: commands.into_iter().map(Into::into).collect(),
        }
    }
}

/// Bounded reads over a channel. Bytes past the bound stay pending for the
/// next read, like a socket `recv(n)`.
struct ShellReader<'a, Ch> {
    channel: &'a mut Ch,
    pending: Vec<u8>,
}

impl<'a, Ch: ShellChannel> ShellReader<'a, Ch> {
    fn new(channel: &'a mut Ch) -> Self {
        Self {
            channel,
            pending: Vec::new(),
        }
    }

    async fn send_line(&mut self, line: &str) -> Result<(), SessionError> {
        self.channel.send_line(line).await
    }

    /// Block for the first chunk, then take what is already buffered.
    async fn recv(&mut self, limit: usize) -> Result<String, SessionError> {
        if self.pending.is_empty() {
            match self.channel.read_chunk(None).await? {
                Some(chunk) => self.pending.extend_from_slice(&chunk),
                None => return Ok(String::new()),
            }
        }
        while self.pending.len() < limit {
            match self.channel.read_chunk(Some(Duration::ZERO)).await? {
                Some(chunk) => self.pending.extend_from_slice(&chunk),
                None => break,
            }
        }
        Ok(self.take(limit))
    }

    /// Accumulate until the output ends with a marker or the device goes
    /// quiet. Bytes carried over from the previous step lead the result, but
    /// only output read during this step can end it: a remainder already
    /// ends with the previous prompt.
    async fn recv_until_prompt(
        &mut self,
        markers: &[String],
        idle_timeout: Duration,
        limit: usize,
    ) -> Result<String, SessionError> {
        loop {
            match self.channel.read_chunk(Some(idle_timeout)).await? {
                Some(chunk) => self.pending.extend_from_slice(&chunk),
                None => break,
            }
            if ends_with_marker(&self.pending, markers) {
                break;
            }
        }
        Ok(self.take(limit))
    }

    fn take(&mut self, limit: usize) -> String {
        let cut = limit.min(self.pending.len());
        let rest = self.pending.split_off(cut);
        let taken = std::mem::replace(&mut self.pending, rest);
        String::from_utf8_lossy(&taken).into_owned()
    }
}

fn ends_with_marker(output: &[u8], markers: &[String]) -> bool {
    let text = String::from_utf8_lossy(output);
    let tail = text.trim_end();
    markers.iter().any(|m| tail.ends_with(m.as_str()))
}

/// Runs [`SessionScript`]s against targets, one exclusive connection per run.
pub struct SessionDriver<C> {
    connector: C,
    settings: SessionSettings,
    completion: Completion,
}

impl<C: ShellConnector> SessionDriver<C> {
    pub fn new(connector: C, settings: SessionSettings) -> Self {
        let completion = Completion::from(&settings.completion);
        Self {
            connector,
            settings,
            completion,
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Run `script` on `target` and return the captured command output.
    ///
    /// Any transport or authentication failure aborts the whole run. The
    /// connection is closed on every path, errors included.
    pub async fn run(&self, target: &Target, script: &SessionScript) -> Result<String, SessionError> {
        let span = tracing::info_span!("session", host = %target.host);
        async move {
            info!("Connecting to {}:{}...", target.host, target.port);
            let mut channel = self.connector.open(target).await?;

            let result = self.exchange(&mut channel, target, script).await;

            if let Err(e) = channel.close().await {
                warn!("Failed to close session cleanly: {}", e);
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn exchange(
        &self,
        channel: &mut C::Channel,
        target: &Target,
        script: &SessionScript,
    ) -> Result<String, SessionError> {
        let mut shell = ShellReader::new(channel);
        let step = self.settings.step_delay();
        let small = self.settings.banner_buffer;

        let banner = shell.recv(small).await?;
        debug!("Initial prompt: {:?}", banner);

        shell.send_line("enable").await?;
        let reply = self.settle(&mut shell, step, small).await?;
        debug!("After enable command: {:?}", reply);

        shell.send_line(target.enable_secret()).await?;
        let reply = self.settle(&mut shell, step, small).await?;
        debug!("After enable password: {:?}", reply);

        match script {
            SessionScript::Interface { interface, command } => {
                for line in ["configure".to_string(), format!("interface {interface}")] {
                    shell.send_line(&line).await?;
                    let reply = self.settle(&mut shell, step, small).await?;
                    debug!("After '{}': {:?}", line, reply);
                }

                info!("Sending command: {}", command);
                shell.send_line(command).await?;
                let output = self
                    .settle(&mut shell, self.settings.command_delay(), self.settings.command_output_buffer)
                    .await?;
                debug!("Command output: {:?}", output);

                // interface context, then configuration context
                for _ in 0..2 {
                    shell.send_line("exit").await?;
                    sleep(step).await;
                }
                Ok(output)
            }
            SessionScript::Privileged { commands } => {
                let mut transcript = String::new();
                for (i, command) in commands.iter().enumerate() {
                    if i > 0 {
                        sleep(self.settings.command_gap()).await;
                    }
                    info!("Sending command: {}", command);
                    shell.send_line(command).await?;
                    let output = self
                        .settle(&mut shell, self.settings.command_delay(), self.settings.status_output_buffer)
                        .await?;
                    debug!("Command output: {:?}", output);
                    transcript.push_str(&output);
                }
                Ok(transcript)
            }
        }
    }

    async fn settle(
        &self,
        shell: &mut ShellReader<'_, C::Channel>,
        delay: Duration,
        limit: usize,
    ) -> Result<String, SessionError> {
        match &self.completion {
            Completion::FixedDelay => {
                sleep(delay).await;
                shell.recv(limit).await
            }
            Completion::Prompt {
                markers,
                idle_timeout,
            } => shell.recv_until_prompt(markers, *idle_timeout, limit).await,
        }
    }
}

/// Wait for `fut`, or give up after `wait` (`None` waits forever).
pub(crate) async fn wait_for<F: Future>(wait: Option<Duration>, fut: F) -> Option<F::Output> {
    match wait {
        None => Some(fut.await),
        Some(w) => timeout(w, fut).await.ok(),
    }
}
