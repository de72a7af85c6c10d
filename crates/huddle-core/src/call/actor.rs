//! Call actor
//!
//! One tokio task owns the [`CallCore`] and consumes two queues: UI commands
//! from the [`CallClient`] and room events from the transport. Nothing else
//! touches call state. Pending room events are applied before commands.
//! Backoff retries are scheduled as timer tasks that post
//! a [`CallCommand::RetryConnect`] back onto the command queue. Timers only
//! hold a weak sender, so dropping the last [`CallClient`] closes the queue
//! and ends the call as a local hangup.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::core::{CallCore, CallFlow};
use crate::engine::ParticipantIdentity;
use crate::error::{HuddleError, HuddleResult};
use crate::events::{CallEndReason, NoticeEmitter, NoticeStream, RoomEvent, UiNotice};
use crate::preview::PreviewBindings;
use crate::session::SessionState;

/// UI requests, one per control
#[derive(Debug)]
pub enum CallCommand {
    EndCall,
    ToggleCamera,
    ToggleMicrophone,
    TogglePreview,
    /// Posted by the backoff timer
    RetryConnect,
    /// Ask for a snapshot of the call
    Inspect(oneshot::Sender<CallSnapshot>),
}

/// Point-in-time view of a call
#[derive(Debug, Clone, PartialEq)]
pub struct CallSnapshot {
    pub state: SessionState,
    pub bindings: PreviewBindings,
    pub remote_participants: Vec<ParticipantIdentity>,
    pub connect_attempts: u32,
    pub ended: Option<CallEndReason>,
}

/// Handle to a running call
#[derive(Debug)]
pub struct CallClient {
    commands: mpsc::UnboundedSender<CallCommand>,
    notices: NoticeEmitter,
    task: JoinHandle<CallEndReason>,
}

impl CallClient {
    /// Spawn the actor for a started call
    pub fn spawn(core: CallCore, events: mpsc::UnboundedReceiver<RoomEvent>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let notices = core.notices().clone();
        let task = tokio::spawn(run(core, rx, events, tx.downgrade()));
        Self { commands: tx, notices, task }
    }

    fn send(&self, command: CallCommand) -> HuddleResult<()> {
        self.commands.send(command).map_err(|_| HuddleError::CallEnded)
    }

    pub fn end_call(&self) -> HuddleResult<()> {
        self.send(CallCommand::EndCall)
    }

    pub fn toggle_camera(&self) -> HuddleResult<()> {
        self.send(CallCommand::ToggleCamera)
    }

    pub fn toggle_microphone(&self) -> HuddleResult<()> {
        self.send(CallCommand::ToggleMicrophone)
    }

    pub fn toggle_preview(&self) -> HuddleResult<()> {
        self.send(CallCommand::TogglePreview)
    }

    pub async fn snapshot(&self) -> HuddleResult<CallSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.send(CallCommand::Inspect(tx))?;
        rx.await.map_err(|_| HuddleError::CallEnded)
    }

    /// UI notices as a stream
    pub fn subscribe(&self) -> NoticeStream {
        self.notices.subscribe()
    }

    pub fn notices(&self) -> &NoticeEmitter {
        &self.notices
    }

    /// Wait for the call to end
    pub async fn wait(self) -> HuddleResult<CallEndReason> {
        self.task
            .await
            .map_err(|e| HuddleError::internal_error(format!("call task failed: {e}")))
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

async fn run(
    mut core: CallCore,
    mut commands: mpsc::UnboundedReceiver<CallCommand>,
    mut events: mpsc::UnboundedReceiver<RoomEvent>,
    retries: mpsc::WeakUnboundedSender<CallCommand>,
) -> CallEndReason {
    info!(room = %core.config().room_name, "Call actor started");

    loop {
        let flow = tokio::select! {
            biased;
            Some(event) = events.recv() => core.handle_event(event).await,
            command = commands.recv() => match command {
                Some(command) => {
                    debug!(command = ?command, "Handling command");
                    core.handle_command(command).await
                }
                None => {
                    info!("Call client dropped, hanging up");
                    core.end_call(CallEndReason::LocalHangup)
                }
            },
        };

        match flow {
            CallFlow::Continue => {}
            CallFlow::Reconnect => {
                if let CallFlow::Finished(reason) = core.retry_connect().await {
                    return reason;
                }
            }
            CallFlow::ReconnectAfter(delay) => {
                debug!(delay_ms = delay.as_millis() as u64, "Scheduling connect retry");
                let retries = retries.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if let Some(commands) = retries.upgrade() {
                        let _ = commands.send(CallCommand::RetryConnect);
                    }
                });
            }
            CallFlow::Finished(reason) => {
                info!(reason = %reason, "Call actor finished");
                return reason;
            }
        }
    }
}

/// Collect notices until the call ends or the stream closes
pub async fn collect_until_ended(mut rx: tokio::sync::broadcast::Receiver<UiNotice>) -> Vec<UiNotice> {
    let mut seen = Vec::new();
    while let Ok(notice) = rx.recv().await {
        let done = matches!(notice, UiNotice::CallEnded { .. });
        seen.push(notice);
        if done {
            break;
        }
    }
    seen
}
