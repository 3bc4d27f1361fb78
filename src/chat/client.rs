use crate::chat::completion::CompletionBackend;
use crate::chat::peer::PeerMailbox;
use crate::chat::transcript::CompletionRequest;
use crate::chat::PeerMessage;
use crate::event::AppEvent;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use tokio::runtime::Handle;
use tokio::time::{self, Duration};
use tracing::{debug, warn};

const PEER_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Runs chat traffic on the tokio runtime and reports back through `AppEvent`s.
#[derive(Clone)]
pub struct ChatClient {
    completion: Arc<dyn CompletionBackend>,
    mailbox: Arc<dyn PeerMailbox>,
    tx: mpsc::Sender<AppEvent>,
    runtime_handle: Handle,
    feed_started: Arc<AtomicBool>,
}

impl ChatClient {
    pub fn new(
        completion: Arc<dyn CompletionBackend>,
        mailbox: Arc<dyn PeerMailbox>,
        tx: mpsc::Sender<AppEvent>,
        runtime_handle: Handle,
    ) -> Self {
        Self {
            completion,
            mailbox,
            tx,
            runtime_handle,
            feed_started: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Fires one completion request. Failures become the fallback reply text.
    pub fn request_reply(&self, epoch: u64, request: CompletionRequest) {
        let completion = Arc::clone(&self.completion);
        let tx = self.tx.clone();

        self.runtime_handle.spawn(async move {
            let text = match completion.complete(&request).await {
                Ok(text) => text,
                Err(err) => {
                    warn!("completion failed: {err}");
                    err.fallback_text().to_string()
                }
            };
            let _ = tx.send(AppEvent::AssistantReply { epoch, text });
        });
    }

    pub fn deliver(&self, message: PeerMessage) {
        let mailbox = Arc::clone(&self.mailbox);
        let tx = self.tx.clone();

        self.runtime_handle.spawn(async move {
            let to = message.to.clone();
            if let Err(err) = mailbox.send(message).await {
                warn!(to = %to, "peer message was not delivered: {err}");
                let _ = tx.send(AppEvent::PeerSendFailed(err.to_string()));
            }
        });
    }

    /// Starts the mailbox poller once; later calls are no-ops.
    pub fn start_peer_feed(&self) {
        if self
            .feed_started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        let mailbox = Arc::clone(&self.mailbox);
        let tx = self.tx.clone();
        self.runtime_handle.spawn(async move {
            let mut ticker = time::interval(PEER_POLL_INTERVAL);
            let mut last_seen: Option<Vec<PeerMessage>> = None;

            loop {
                ticker.tick().await;
                match mailbox.snapshot().await {
                    Ok(messages) => {
                        if last_seen.as_ref() == Some(&messages) {
                            continue;
                        }
                        debug!(count = messages.len(), "peer mailbox changed");
                        last_seen = Some(messages.clone());
                        if tx.send(AppEvent::PeerSnapshot(messages)).is_err() {
                            break;
                        }
                    }
                    Err(err) => warn!("failed to poll peer mailbox: {err}"),
                }
            }
        });
    }
}
