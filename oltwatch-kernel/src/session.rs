//! Remote CLI sessions.
//!
//! The dispatcher only needs "open a session, send commands, get text back,
//! close". `SessionClient` is that seam; `SshProcessClient` implements it by
//! driving the system OpenSSH client as a child process.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::debug;

use crate::extract::decode_lossy;
use crate::models::{CommandOutput, Credentials, Device, Dialect};

/// Sent right after login on secondary-dialect devices to disable paging.
pub const HUAWEI_PREAMBLE: &str = "screen-length 0 temporary";

/// Bytes at the end of the last line searched for the prompt.
const PROMPT_WINDOW: usize = 512;

static NOKIA_PROMPT: Lazy<Regex> = Lazy::new(|| Regex::new(r">#\s*$").unwrap());
static HUAWEI_PROMPT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[<>]\S+[<>]\s*$").unwrap());

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("cannot start session transport: {0}")]
    Spawn(String),
    #[error("open failed: {0}")]
    Open(String),
    #[error("command {command:?} failed: {reason}")]
    Send { command: String, reason: String },
    #[error("close failed: {0}")]
    Close(String),
    #[error("{operation} timed out after {}s", .timeout.as_secs())]
    Timeout { operation: &'static str, timeout: Duration },
    #[error("session I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait SessionClient: Send + Sync {
    async fn open(
        &self,
        device: &Device,
        dialect: Dialect,
        credentials: &Credentials,
    ) -> Result<Box<dyn RemoteSession>, SessionError>;
}

#[async_trait]
pub trait RemoteSession: Send {
    /// One round trip: returns the reply without echo and prompt.
    async fn send_command(&mut self, command: &str) -> Result<String, SessionError>;

    /// Sequential batch; stops at the first failing command.
    async fn send_commands(
        &mut self,
        commands: &[String],
    ) -> Result<Vec<CommandOutput>, SessionError> {
        let mut replies = Vec::with_capacity(commands.len());
        for command in commands {
            let text = self.send_command(command).await?;
            replies.push(CommandOutput { command: command.clone(), text });
        }
        Ok(replies)
    }

    async fn close(&mut self) -> Result<(), SessionError>;
}

fn prompt_for(dialect: Dialect) -> &'static Regex {
    match dialect {
        Dialect::Nokia => &NOKIA_PROMPT,
        Dialect::Huawei => &HUAWEI_PROMPT,
    }
}

/// Runs the configured ssh command line per device, e.g.
/// `sshpass -e ssh -tt -o StrictHostKeyChecking=no {user}@{host}`.
/// The password is passed in the `SSHPASS` environment variable.
#[derive(Debug, Clone)]
pub struct SshProcessClient {
    argv: Vec<String>,
    timeout: Duration,
}

impl SshProcessClient {
    pub fn new(command_template: &str, timeout: Duration) -> Result<Self, SessionError> {
        let argv = shell_words::split(command_template)
            .map_err(|e| SessionError::Spawn(format!("invalid ssh command template: {e}")))?;
        if argv.is_empty() {
            return Err(SessionError::Spawn("empty ssh command template".into()));
        }
        Ok(Self { argv, timeout })
    }

    fn render_argv(&self, device: &Device, credentials: &Credentials) -> Vec<String> {
        self.argv
            .iter()
            .map(|arg| {
                arg.replace("{host}", &device.host)
                    .replace("{user}", &credentials.username)
            })
            .collect()
    }

    async fn connect(
        &self,
        device: &Device,
        dialect: Dialect,
        credentials: &Credentials,
    ) -> Result<SshProcessSession, SessionError> {
        let argv = self.render_argv(device, credentials);
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| SessionError::Spawn("empty ssh command".into()))?;

        let mut child = Command::new(program)
            .args(args)
            .env("SSHPASS", &credentials.password)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SessionError::Spawn(format!("{program}: {e}")))?;

        let stdin = child.stdin.take();
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SessionError::Spawn("child stdout not captured".into()))?;

        let mut session = SshProcessSession {
            child,
            stdin,
            stdout,
            prompt: prompt_for(dialect),
            timeout: self.timeout,
        };

        session.read_until_prompt("open").await.map_err(|e| match e {
            SessionError::Timeout { .. } => e,
            other => SessionError::Open(other.to_string()),
        })?;
        debug!(host = %device.host, dialect = dialect.as_str(), "session opened");

        if dialect == Dialect::Huawei {
            // paging stays on if this fails; the commands still run
            if let Err(e) = session.send_command(HUAWEI_PREAMBLE).await {
                debug!(host = %device.host, error = %e, "preamble rejected");
            }
        }

        Ok(session)
    }
}

#[async_trait]
impl SessionClient for SshProcessClient {
    async fn open(
        &self,
        device: &Device,
        dialect: Dialect,
        credentials: &Credentials,
    ) -> Result<Box<dyn RemoteSession>, SessionError> {
        Ok(Box::new(self.connect(device, dialect, credentials).await?))
    }
}

struct SshProcessSession {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: ChildStdout,
    prompt: &'static Regex,
    timeout: Duration,
}

impl SshProcessSession {
    async fn read_until_prompt(&mut self, operation: &'static str) -> Result<String, SessionError> {
        let prompt = self.prompt;
        let timeout = self.timeout;
        let stdout = &mut self.stdout;

        let read = async move {
            let mut buf: Vec<u8> = Vec::with_capacity(8 * 1024);
            let mut chunk = [0u8; 4096];
            let mut line_start = 0;
            loop {
                let n = stdout.read(&mut chunk).await?;
                if n == 0 {
                    return Err(SessionError::Io(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "remote closed the session",
                    )));
                }
                if let Some(i) = chunk[..n].iter().rposition(|&b| b == b'\n') {
                    line_start = buf.len() + i + 1;
                }
                buf.extend_from_slice(&chunk[..n]);

                // the prompt can only sit at the end of the last line
                let tail_start = line_start.max(buf.len().saturating_sub(PROMPT_WINDOW));
                if prompt.is_match(&decode_lossy(&buf[tail_start..])) {
                    return Ok(decode_lossy(&buf));
                }
            }
        };

        tokio::time::timeout(timeout, read)
            .await
            .map_err(|_| SessionError::Timeout { operation, timeout })?
    }

    async fn write_line(&mut self, line: &str) -> Result<(), SessionError> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| SessionError::Io(std::io::ErrorKind::BrokenPipe.into()))?;
        stdin.write_all(line.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl RemoteSession for SshProcessSession {
    async fn send_command(&mut self, command: &str) -> Result<String, SessionError> {
        let send_err = |e: SessionError| match e {
            SessionError::Timeout { .. } => e,
            other => SessionError::Send { command: command.to_string(), reason: other.to_string() },
        };

        self.write_line(command).await.map_err(send_err)?;
        let raw = self.read_until_prompt("send").await.map_err(send_err)?;
        Ok(strip_echo_and_prompt(&raw, command))
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        if self.write_line("logout").await.is_err() {
            debug!("stdin already closed before logout");
        }
        // EOF on stdin ends the ssh client even if logout was not understood
        self.stdin.take();

        match tokio::time::timeout(self.timeout, self.child.wait()).await {
            Ok(Ok(_status)) => Ok(()),
            Ok(Err(e)) => Err(SessionError::Close(e.to_string())),
            Err(_) => {
                let _ = self.child.kill().await;
                Err(SessionError::Timeout { operation: "close", timeout: self.timeout })
            }
        }
    }
}

/// Drops the echoed command line and the trailing prompt line.
fn strip_echo_and_prompt(raw: &str, command: &str) -> String {
    let normalized = raw.replace("\r\n", "\n");
    let mut lines: Vec<&str> = normalized.lines().collect();

    if let Some(pos) = lines.iter().position(|l| l.trim_end().ends_with(command.trim())) {
        lines.drain(..=pos);
    }
    lines.pop();
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device() -> Device {
        Device { name: "OLT-A".into(), site: "North".into(), host: "10.1.1.1".into(), vendor: "nokia".into() }
    }

    #[test]
    fn test_render_argv_substitutes_placeholders() {
        let client = SshProcessClient::new(
            "sshpass -e ssh -tt -o 'StrictHostKeyChecking no' {user}@{host}",
            Duration::from_secs(60),
        )
        .unwrap();
        let creds = Credentials { username: "isadmin".into(), password: "pw".into() };
        let argv = client.render_argv(&device(), &creds);
        assert_eq!(argv[0], "sshpass");
        assert_eq!(argv[5], "StrictHostKeyChecking no");
        assert_eq!(argv.last().unwrap(), "isadmin@10.1.1.1");
        assert!(!argv.iter().any(|a| a.contains("pw")));
    }

    #[test]
    fn test_invalid_template_rejected() {
        assert!(SshProcessClient::new("ssh 'unterminated", Duration::from_secs(1)).is_err());
        assert!(SshProcessClient::new("   ", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn test_prompts_by_dialect() {
        assert!(prompt_for(Dialect::Nokia).is_match("typ:isadmin>#"));
        assert!(prompt_for(Dialect::Nokia).is_match("typ:isadmin>#  "));
        assert!(!prompt_for(Dialect::Nokia).is_match("ont-idx>#value"));
        assert!(prompt_for(Dialect::Huawei).is_match("<OLT-HW-01>"));
        assert!(!prompt_for(Dialect::Huawei).is_match("display current-configuration"));
    }

    #[test]
    fn test_strip_echo_and_prompt() {
        let raw = "show port-protection\r\nrow one\r\nrow two\r\ntyp:isadmin>#";
        assert_eq!(strip_echo_and_prompt(raw, "show port-protection"), "row one\nrow two");
    }

    const FAKE_OLT: &str = r#"printf 'Welcome\ntyp:isadmin>#'
while read -r cmd; do
  [ "$cmd" = logout ] && exit 0
  printf '%s\nrow one\nrow two\ntyp:isadmin>#' "$cmd"
done"#;

    fn scripted(script: &str, timeout: Duration) -> SshProcessClient {
        let template = format!("sh -c {}", shell_words::quote(script));
        SshProcessClient::new(&template, timeout).unwrap()
    }

    #[tokio::test]
    async fn test_scripted_session_round_trip() {
        let client = scripted(FAKE_OLT, Duration::from_secs(5));
        let creds = Credentials::default();
        let mut session = client.open(&device(), Dialect::Nokia, &creds).await.unwrap();

        let reply = session.send_command("show port-protection").await.unwrap();
        assert_eq!(reply, "row one\nrow two");

        let batch = session
            .send_commands(&["show a".to_string(), "show b".to_string()])
            .await
            .unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[1].command, "show b");
        assert_eq!(batch[1].text, "row one\nrow two");

        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_large_reply_is_read_in_one_pass() {
        let script = r#"printf 'typ:isadmin>#'
read -r cmd
echo "$cmd"
head -c 3000000 /dev/zero | tr '\0' x
printf '\ntyp:isadmin>#'
read -r cmd"#;
        let client = scripted(script, Duration::from_secs(10));
        let creds = Credentials::default();
        let mut session = client.open(&device(), Dialect::Nokia, &creds).await.unwrap();

        let reply = session.send_command("info configure flat").await.unwrap();
        assert_eq!(reply.len(), 3_000_000);
        assert!(reply.bytes().all(|b| b == b'x'));
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_open_times_out_without_prompt() {
        let timeout = Duration::from_millis(200);
        let client = scripted("exec sleep 30", timeout);
        let creds = Credentials::default();

        let started = std::time::Instant::now();
        let err = client.open(&device(), Dialect::Nokia, &creds).await.err().unwrap();
        assert!(matches!(err, SessionError::Timeout { operation: "open", timeout: t } if t == timeout));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_close_timeout_kills_and_reaps_child() {
        let client = scripted("printf 'typ:isadmin>#'; exec sleep 30", Duration::from_millis(300));
        let creds = Credentials::default();
        let mut session = client.connect(&device(), Dialect::Nokia, &creds).await.unwrap();

        let err = session.close().await.unwrap_err();
        assert!(matches!(err, SessionError::Timeout { operation: "close", .. }));
        assert!(session.child.try_wait().unwrap().is_some());
    }

    #[tokio::test]
    async fn test_open_reports_spawn_failure() {
        let client = SshProcessClient::new(
            "/nonexistent/oltwatch-ssh-binary {host}",
            Duration::from_secs(1),
        )
        .unwrap();
        let creds = Credentials::default();
        let err = client.open(&device(), Dialect::Nokia, &creds).await.err().unwrap();
        assert!(matches!(err, SessionError::Spawn(_)));
    }
}
