/*!
Mock session client for polling without real OLTs.

Replies are scripted per host and per command. Every open, command and
close is recorded, and the number of simultaneously open sessions is
tracked so tests can assert the dispatcher's bound.
*/

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use oltwatch_kernel::models::{Credentials, Device, Dialect};
use oltwatch_kernel::session::{RemoteSession, SessionClient, SessionError};

#[derive(Debug, Clone, Default)]
struct HostScript {
    replies: HashMap<String, String>,
    open_error: Option<String>,
    send_error: Option<String>,
    delay: Option<Duration>,
}

#[derive(Default)]
struct Counters {
    open_now: AtomicUsize,
    max_open: AtomicUsize,
    opens: AtomicUsize,
    closes: AtomicUsize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCommand {
    pub host: String,
    pub dialect: Dialect,
    pub command: String,
}

/// Mock implementation of the kernel's `SessionClient`.
#[derive(Clone, Default)]
pub struct MockSessionClient {
    scripts: Arc<Mutex<HashMap<String, HostScript>>>,
    default_reply: Arc<Mutex<String>>,
    default_delay: Arc<Mutex<Option<Duration>>>,
    counters: Arc<Counters>,
    commands: Arc<Mutex<Vec<RecordedCommand>>>,
}

impl MockSessionClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self, host: &str) -> HostScript {
        self.scripts.lock().get(host).cloned().unwrap_or_default()
    }

    fn edit(&self, host: &str, f: impl FnOnce(&mut HostScript)) -> &Self {
        f(self.scripts.lock().entry(host.to_string()).or_default());
        self
    }

    /// Reply returned by `host` for `command`.
    pub fn reply(&self, host: &str, command: &str, text: impl Into<String>) -> &Self {
        let text = text.into();
        self.edit(host, |s| {
            s.replies.insert(command.to_string(), text);
        })
    }

    /// Reply for any unscripted command on any host.
    pub fn default_reply(&self, text: impl Into<String>) -> &Self {
        *self.default_reply.lock() = text.into();
        self
    }

    pub fn fail_open(&self, host: &str, reason: &str) -> &Self {
        self.edit(host, |s| s.open_error = Some(reason.to_string()))
    }

    pub fn fail_send(&self, host: &str, reason: &str) -> &Self {
        self.edit(host, |s| s.send_error = Some(reason.to_string()))
    }

    /// Time a session to `host` stays open before its first reply.
    pub fn delay(&self, host: &str, delay: Duration) -> &Self {
        self.edit(host, |s| s.delay = Some(delay))
    }

    pub fn delay_all(&self, delay: Duration) -> &Self {
        *self.default_delay.lock() = Some(delay);
        self
    }

    pub fn open_now(&self) -> usize {
        self.counters.open_now.load(Ordering::SeqCst)
    }

    /// Highest number of sessions open at the same time.
    pub fn max_open(&self) -> usize {
        self.counters.max_open.load(Ordering::SeqCst)
    }

    pub fn opens(&self) -> usize {
        self.counters.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.counters.closes.load(Ordering::SeqCst)
    }

    pub fn recorded_commands(&self) -> Vec<RecordedCommand> {
        self.commands.lock().clone()
    }

    pub fn commands_for(&self, host: &str) -> Vec<String> {
        self.commands
            .lock()
            .iter()
            .filter(|c| c.host == host)
            .map(|c| c.command.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.commands.lock().clear();
        self.counters.max_open.store(self.open_now(), Ordering::SeqCst);
        self.counters.opens.store(0, Ordering::SeqCst);
        self.counters.closes.store(0, Ordering::SeqCst);
    }
}

#[async_trait]
impl SessionClient for MockSessionClient {
    async fn open(
        &self,
        device: &Device,
        dialect: Dialect,
        _credentials: &Credentials,
    ) -> Result<Box<dyn RemoteSession>, SessionError> {
        let script = self.script(&device.host);
        if let Some(reason) = &script.open_error {
            log::info!("[MOCK] open {} refused: {}", device.host, reason);
            return Err(SessionError::Open(reason.clone()));
        }

        let now = self.counters.open_now.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.max_open.fetch_max(now, Ordering::SeqCst);
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        log::debug!("[MOCK] opened {} ({} open)", device.host, now);

        let delay = script.delay.or(*self.default_delay.lock());
        Ok(Box::new(MockSession {
            host: device.host.clone(),
            dialect,
            script,
            delay,
            default_reply: self.default_reply.lock().clone(),
            counters: self.counters.clone(),
            commands: self.commands.clone(),
            closed: false,
        }))
    }
}

struct MockSession {
    host: String,
    dialect: Dialect,
    script: HostScript,
    delay: Option<Duration>,
    default_reply: String,
    counters: Arc<Counters>,
    commands: Arc<Mutex<Vec<RecordedCommand>>>,
    closed: bool,
}

impl MockSession {
    fn release(&mut self) {
        if !self.closed {
            self.closed = true;
            self.counters.open_now.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl RemoteSession for MockSession {
    async fn send_command(&mut self, command: &str) -> Result<String, SessionError> {
        if let Some(delay) = self.delay.take() {
            tokio::time::sleep(delay).await;
        }
        self.commands.lock().push(RecordedCommand {
            host: self.host.clone(),
            dialect: self.dialect,
            command: command.to_string(),
        });
        if let Some(reason) = &self.script.send_error {
            return Err(SessionError::Send { command: command.to_string(), reason: reason.clone() });
        }
        Ok(self
            .script
            .replies
            .get(command)
            .cloned()
            .unwrap_or_else(|| self.default_reply.clone()))
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
        self.release();
        Ok(())
    }
}

impl Drop for MockSession {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(host: &str) -> Device {
        Device { name: format!("OLT-{host}"), site: "Lab".into(), host: host.into(), vendor: String::new() }
    }

    #[tokio::test]
    async fn test_scripted_replies_and_counters() {
        let client = MockSessionClient::new();
        client.reply("10.0.0.1", "show a", "A").default_reply("?");

        let mut session = client.open(&device("10.0.0.1"), Dialect::Nokia, &Credentials::default()).await.unwrap();
        assert_eq!(client.open_now(), 1);
        assert_eq!(session.send_command("show a").await.unwrap(), "A");
        assert_eq!(session.send_command("show b").await.unwrap(), "?");
        session.close().await.unwrap();
        drop(session);

        assert_eq!(client.open_now(), 0);
        assert_eq!(client.max_open(), 1);
        assert_eq!(client.closes(), 1);
        assert_eq!(client.commands_for("10.0.0.1"), vec!["show a", "show b"]);
    }

    #[tokio::test]
    async fn test_failures() {
        let client = MockSessionClient::new();
        client.fail_open("10.0.0.1", "auth failed").fail_send("10.0.0.2", "broken pipe");

        let err = client.open(&device("10.0.0.1"), Dialect::Nokia, &Credentials::default()).await.err().unwrap();
        assert!(matches!(err, SessionError::Open(_)));
        assert_eq!(client.opens(), 0);

        let mut session = client.open(&device("10.0.0.2"), Dialect::Huawei, &Credentials::default()).await.unwrap();
        assert!(session.send_command("x").await.is_err());
        drop(session);
        assert_eq!(client.open_now(), 0);
    }
}
