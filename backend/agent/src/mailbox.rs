//! Per-conversation mailbox.
//!
//! Every conversation gets its own worker task draining an unbounded queue,
//! so turns for one conversation run one at a time in arrival order while
//! different conversations proceed in parallel. A worker that stays idle
//! for `idle_timeout` removes itself.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::anyhow;
use tokio::sync::{Mutex, mpsc, oneshot};
use tracing::{debug, warn};

use chatrelay_core::{RelayError, TurnOutcome};
use chatrelay_logging::redact_sensitive_data;

use crate::orchestrator::ConversationOrchestrator;

pub type TurnResult = Result<TurnOutcome, RelayError>;

struct Job {
    text: String,
    reply: oneshot::Sender<TurnResult>,
}

struct Worker {
    generation: u64,
    tx: mpsc::UnboundedSender<Job>,
}

struct Shared {
    orchestrator: Arc<ConversationOrchestrator>,
    idle_timeout: Duration,
    workers: Mutex<HashMap<String, Worker>>,
    next_generation: AtomicU64,
}

#[derive(Clone)]
pub struct ConversationMailbox {
    shared: Arc<Shared>,
}

impl ConversationMailbox {
    pub fn new(orchestrator: Arc<ConversationOrchestrator>, idle_timeout: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                orchestrator,
                idle_timeout,
                workers: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(0),
            }),
        }
    }

    /// Queue a message behind any in-flight turn for the same conversation.
    pub async fn dispatch(
        &self,
        conversation_id: &str,
        text: impl Into<String>,
    ) -> oneshot::Receiver<TurnResult> {
        let (reply, rx) = oneshot::channel();
        let mut job = Job {
            text: text.into(),
            reply,
        };

        let mut workers = self.shared.workers.lock().await;
        if let Some(worker) = workers.get(conversation_id) {
            match worker.tx.send(job) {
                Ok(()) => return rx,
                // Worker is gone; reclaim the job and start a fresh one.
                Err(mpsc::error::SendError(returned)) => job = returned,
            }
        }

        let generation = self.shared.next_generation.fetch_add(1, Ordering::Relaxed);
        let (tx, queue) = mpsc::unbounded_channel();
        // The receiver is alive, so this cannot fail.
        let _ = tx.send(job);
        workers.insert(conversation_id.to_string(), Worker { generation, tx });
        drop(workers);

        tokio::spawn(run_worker(
            self.shared.clone(),
            conversation_id.to_string(),
            generation,
            queue,
        ));
        rx
    }

    /// Queue a message and wait for its turn to finish.
    pub async fn handle(&self, conversation_id: &str, text: impl Into<String>) -> TurnResult {
        self.dispatch(conversation_id, text)
            .await
            .await
            .map_err(|_| RelayError::Other(anyhow!("conversation worker stopped")))?
    }

    /// Conversations that currently have a live worker.
    pub async fn active_conversations(&self) -> usize {
        self.shared.workers.lock().await.len()
    }
}

async fn run_worker(
    shared: Arc<Shared>,
    conversation_id: String,
    generation: u64,
    mut queue: mpsc::UnboundedReceiver<Job>,
) {
    debug!(conversation = %redact_sensitive_data(&conversation_id), "Conversation worker started");

    loop {
        let job = match tokio::time::timeout(shared.idle_timeout, queue.recv()).await {
            Ok(Some(job)) => job,
            Ok(None) => break,
            Err(_) => {
                // Senders only enqueue while holding the map lock, so an empty
                // queue seen under the lock is safe to abandon.
                let mut workers = shared.workers.lock().await;
                match queue.try_recv() {
                    Ok(job) => {
                        drop(workers);
                        job
                    }
                    Err(_) => {
                        if workers
                            .get(&conversation_id)
                            .is_some_and(|w| w.generation == generation)
                        {
                            workers.remove(&conversation_id);
                        }
                        break;
                    }
                }
            }
        };

        let result = shared
            .orchestrator
            .handle_inbound_message(&conversation_id, &job.text)
            .await;
        if job.reply.send(result).is_err() {
            warn!("Turn result dropped, caller went away");
        }
    }

    debug!(conversation = %redact_sensitive_data(&conversation_id), "Conversation worker idle, exiting");
}
