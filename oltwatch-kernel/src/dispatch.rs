//! Concurrent session dispatcher.
//!
//! One task per device, at most `max_sessions` sessions open at a time, and
//! every outcome delivered through a single channel in completion order. The
//! channel closes once each dispatched device has produced exactly one
//! outcome. In-flight sessions cannot be cancelled from here; they end at
//! completion or at the session layer's own timeout.

use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, info};

use crate::models::{CommandOutput, Credentials, Device, Dialect, Outcome, Roster, SessionOutput};
use crate::session::{SessionClient, SessionError};

pub const DEFAULT_MAX_SESSIONS: usize = 33;

#[derive(Clone)]
pub struct Dispatcher {
    client: Arc<dyn SessionClient>,
    credentials: Arc<Credentials>,
    max_sessions: usize,
}

impl Dispatcher {
    pub fn new(client: Arc<dyn SessionClient>, credentials: Credentials, max_sessions: usize) -> Self {
        Self {
            client,
            credentials: Arc::new(credentials),
            max_sessions: max_sessions.max(1),
        }
    }

    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    /// Sends `commands` to every device of one dialect group.
    pub fn dispatch(
        &self,
        dialect: Dialect,
        devices: Vec<Device>,
        commands: &[String],
    ) -> mpsc::Receiver<Outcome> {
        let (tx, rx) = mpsc::channel(devices.len().max(1));
        let slots = Arc::new(Semaphore::new(self.max_sessions));
        info!(dialect = dialect.as_str(), devices = devices.len(), "dispatching");
        self.spawn_group(dialect, devices, commands, slots, tx);
        rx
    }

    /// Different command list per dialect group, both groups interleaved in
    /// one stream and sharing one pool of session slots.
    pub fn dispatch_all(
        &self,
        roster: Roster,
        primary_commands: &[String],
        secondary_commands: &[String],
    ) -> mpsc::Receiver<Outcome> {
        let (tx, rx) = mpsc::channel(roster.len().max(1));
        let slots = Arc::new(Semaphore::new(self.max_sessions));
        info!(
            primary = roster.primary.len(),
            secondary = roster.secondary.len(),
            "dispatching to all dialects"
        );
        self.spawn_group(Dialect::Nokia, roster.primary, primary_commands, slots.clone(), tx.clone());
        self.spawn_group(Dialect::Huawei, roster.secondary, secondary_commands, slots, tx);
        rx
    }

    fn spawn_group(
        &self,
        dialect: Dialect,
        devices: Vec<Device>,
        commands: &[String],
        slots: Arc<Semaphore>,
        tx: mpsc::Sender<Outcome>,
    ) {
        let commands: Arc<[String]> = commands.into();

        for device in devices {
            let tx = tx.clone();
            let slots = Arc::clone(&slots);
            let client = Arc::clone(&self.client);
            let credentials = Arc::clone(&self.credentials);
            let commands = Arc::clone(&commands);

            tokio::spawn(async move {
                let result = match slots.acquire_owned().await {
                    Ok(_permit) => {
                        poll_device(client.as_ref(), &device, dialect, &credentials, &commands).await
                    }
                    Err(_) => Err(SessionError::Open("session pool closed".into())),
                };

                if let Err(e) = &result {
                    debug!(host = %device.host, error = %e, "device poll failed");
                }
                if tx.send(Outcome { device, dialect, result }).await.is_err() {
                    debug!("outcome receiver dropped");
                }
            });
        }
    }
}

/// open -> send (one round trip, or a sequential batch) -> close.
async fn poll_device(
    client: &dyn SessionClient,
    device: &Device,
    dialect: Dialect,
    credentials: &Credentials,
    commands: &[String],
) -> Result<SessionOutput, SessionError> {
    let mut session = client.open(device, dialect, credentials).await?;

    let sent = match commands {
        [single] => session
            .send_command(single)
            .await
            .map(|text| vec![CommandOutput { command: single.clone(), text }]),
        many => session.send_commands(many).await,
    };
    let closed = session.close().await;

    match (sent, closed) {
        (Ok(replies), Ok(())) => Ok(SessionOutput::from_replies(replies)),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(close_err)) => {
            debug!(host = %device.host, error = %close_err, "close failed after send error");
            Err(e)
        }
    }
}
