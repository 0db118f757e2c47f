/*!
Scripted switch shell

Stands in for the SSH transport: answers like an EdgeSwitch CLI (echo,
`Password:` after `enable`, prompt after every line) and records every line
typed per session so tests can assert on the exact script.
*/

use poe_core::session::{ShellChannel, ShellConnector};
use poe_core::{SessionError, Target};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const DEFAULT_PROMPT: &str = "(UBNT) #";

#[derive(Debug, Clone, Default)]
pub struct SessionLog {
    pub host: String,
    pub lines: Vec<String>,
    pub closed: bool,
}

struct SwitchState {
    prompt: String,
    outputs: HashMap<String, String>,
    unreachable: HashSet<String>,
    reject_auth: bool,
    fail_on: Option<String>,
    sessions: Vec<SessionLog>,
}

#[derive(Clone)]
pub struct MockSwitch {
    state: Arc<Mutex<SwitchState>>,
}

impl Default for MockSwitch {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSwitch {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SwitchState {
                prompt: DEFAULT_PROMPT.to_string(),
                outputs: HashMap::new(),
                unreachable: HashSet::new(),
                reject_auth: false,
                fail_on: None,
                sessions: Vec::new(),
            })),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, SwitchState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Canned output printed when `command` is typed
    pub fn with_output(self, command: impl Into<String>, output: impl Into<String>) -> Self {
        self.state().outputs.insert(command.into(), output.into());
        self
    }

    /// Connection to `host` fails before authentication
    pub fn with_unreachable(self, host: impl Into<String>) -> Self {
        self.state().unreachable.insert(host.into());
        self
    }

    pub fn with_rejected_auth(self) -> Self {
        self.state().reject_auth = true;
        self
    }

    /// The channel breaks when `line` is sent
    pub fn with_failure_on(self, line: impl Into<String>) -> Self {
        self.state().fail_on = Some(line.into());
        self
    }

    pub fn sessions(&self) -> Vec<SessionLog> {
        self.state().sessions.clone()
    }

    pub fn session_count(&self) -> usize {
        self.state().sessions.len()
    }
}

impl ShellConnector for MockSwitch {
    type Channel = MockShell;

    async fn open(&self, target: &Target) -> Result<MockShell, SessionError> {
        let mut state = self.state();
        if state.unreachable.contains(&target.host) {
            return Err(SessionError::Connect {
                host: target.host.clone(),
                reason: "no route to host".into(),
            });
        }
        if state.reject_auth {
            return Err(SessionError::AuthFailed {
                host: target.host.clone(),
                user: target.user.clone(),
            });
        }

        state.sessions.push(SessionLog {
            host: target.host.clone(),
            ..SessionLog::default()
        });
        let banner = format!("\r\n{}", state.prompt.replace('#', ">"));

        Ok(MockShell {
            switch: self.clone(),
            index: state.sessions.len() - 1,
            ready: VecDeque::from([banner.into_bytes()]),
            awaiting_password: false,
        })
    }
}

pub struct MockShell {
    switch: MockSwitch,
    index: usize,
    ready: VecDeque<Vec<u8>>,
    awaiting_password: bool,
}

impl ShellChannel for MockShell {
    async fn send_line(&mut self, line: &str) -> Result<(), SessionError> {
        let mut state = self.switch.state();
        state.sessions[self.index].lines.push(line.to_string());
        if state.fail_on.as_deref() == Some(line) {
            return Err(SessionError::Channel("connection reset by peer".into()));
        }

        let reply = if self.awaiting_password {
            // passwords are not echoed
            self.awaiting_password = false;
            format!("\r\n{}", state.prompt)
        } else if line == "enable" {
            self.awaiting_password = true;
            "enable\r\nPassword:".to_string()
        } else if let Some(output) = state.outputs.get(line) {
            format!("{line}\r\n{output}\r\n{}", state.prompt)
        } else {
            format!("{line}\r\n{}", state.prompt)
        };
        self.ready.push_back(reply.into_bytes());
        Ok(())
    }

    async fn read_chunk(&mut self, _wait: Option<Duration>) -> Result<Option<Vec<u8>>, SessionError> {
        Ok(self.ready.pop_front())
    }

    async fn close(self) -> Result<(), SessionError> {
        self.switch.state().sessions[self.index].closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(host: &str) -> Target {
        serde_json::from_value(serde_json::json!({"host": host, "user": "admin", "password": "pw"})).unwrap()
    }

    #[tokio::test]
    async fn test_records_lines_and_answers() {
        let switch = MockSwitch::new().with_output("show poe status all", "0/1 Good");
        let mut shell = switch.open(&target("sw1")).await.unwrap();

        assert_eq!(shell.read_chunk(None).await.unwrap().unwrap(), b"\r\n(UBNT) >");
        shell.send_line("enable").await.unwrap();
        assert_eq!(shell.read_chunk(None).await.unwrap().unwrap(), b"enable\r\nPassword:");
        shell.send_line("pw").await.unwrap();
        assert_eq!(shell.read_chunk(None).await.unwrap().unwrap(), b"\r\n(UBNT) #");
        shell.send_line("show poe status all").await.unwrap();
        let output = shell.read_chunk(None).await.unwrap().unwrap();
        assert!(String::from_utf8(output).unwrap().contains("0/1 Good"));
        shell.close().await.unwrap();

        let sessions = switch.sessions();
        assert_eq!(sessions[0].lines, ["enable", "pw", "show poe status all"]);
        assert!(sessions[0].closed);
    }

    #[tokio::test]
    async fn test_connect_failures() {
        let switch = MockSwitch::new().with_unreachable("sw2");
        assert!(matches!(switch.open(&target("sw2")).await, Err(SessionError::Connect { .. })));

        let switch = MockSwitch::new().with_rejected_auth();
        assert!(matches!(switch.open(&target("sw1")).await, Err(SessionError::AuthFailed { .. })));
        assert_eq!(switch.session_count(), 0);
    }
}
