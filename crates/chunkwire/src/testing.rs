//! Scripted channel for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use futures::future::{self, BoxFuture, FutureExt};
use tokio::sync::broadcast;

use chunkwire_core::{FieldMap, FieldValue, KeyedMessage};

use crate::channel::{ChannelAdapter, InboundMessage};
use crate::error::ChannelError;

enum Outcome {
    Reject(String),
    Hang,
    Close,
}

/// Records every send. Calls are acknowledged unless scripted otherwise;
/// queued replies are published when a chunk size request goes out.
pub(crate) struct ScriptedChannel {
    fields: FieldMap,
    sent: Mutex<Vec<KeyedMessage>>,
    script: Mutex<HashMap<usize, Outcome>>,
    replies: Mutex<VecDeque<KeyedMessage>>,
    inbound: Mutex<Option<broadcast::Sender<InboundMessage>>>,
}

impl ScriptedChannel {
    pub fn new() -> Arc<Self> {
        let (inbound, _) = broadcast::channel(16);
        Arc::new(Self {
            fields: FieldMap::default(),
            sent: Mutex::new(Vec::new()),
            script: Mutex::new(HashMap::new()),
            replies: Mutex::new(VecDeque::new()),
            inbound: Mutex::new(Some(inbound)),
        })
    }

    /// Reject the `call`-th send (0-based).
    pub fn reject_call(&self, call: usize, reason: &str) {
        self.script
            .lock()
            .unwrap()
            .insert(call, Outcome::Reject(reason.to_string()));
    }

    /// Never acknowledge the `call`-th send.
    pub fn hang_call(&self, call: usize) {
        self.script.lock().unwrap().insert(call, Outcome::Hang);
    }

    /// Acknowledge the `call`-th send, then close the inbound feed.
    pub fn close_on_call(&self, call: usize) {
        self.script.lock().unwrap().insert(call, Outcome::Close);
    }

    /// Publish `message` after the next chunk size request.
    pub fn reply(&self, message: KeyedMessage) {
        self.replies.lock().unwrap().push_back(message);
    }

    pub fn reply_size(&self, value: FieldValue) {
        self.reply(KeyedMessage::from([(self.fields.chunk_size, value)]));
    }

    pub fn sent(&self) -> Vec<KeyedMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn discovery_requests(&self) -> usize {
        self.sent()
            .iter()
            .filter(|m| m.contains_key(&self.fields.chunk_size))
            .count()
    }
}

impl ChannelAdapter for ScriptedChannel {
    fn send_raw(&self, message: KeyedMessage) -> BoxFuture<'static, Result<(), ChannelError>> {
        let is_discovery = message.contains_key(&self.fields.chunk_size);
        let call = {
            let mut sent = self.sent.lock().unwrap();
            sent.push(message);
            sent.len() - 1
        };

        if is_discovery {
            if let Some(inbound) = self.inbound.lock().unwrap().as_ref() {
                for reply in self.replies.lock().unwrap().drain(..) {
                    let _ = inbound.send(reply.into());
                }
            }
        }

        match self.script.lock().unwrap().remove(&call) {
            None => future::ready(Ok(())).boxed(),
            Some(Outcome::Close) => {
                self.inbound.lock().unwrap().take();
                future::ready(Ok(())).boxed()
            }
            Some(Outcome::Reject(reason)) => future::ready(Err(ChannelError::rejected(reason))).boxed(),
            Some(Outcome::Hang) => future::pending().boxed(),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<InboundMessage> {
        match self.inbound.lock().unwrap().as_ref() {
            Some(inbound) => inbound.subscribe(),
            // already closed: hand out a receiver whose sender is gone
            None => broadcast::channel(1).1,
        }
    }
}
