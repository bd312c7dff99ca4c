use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{mpsc, RwLock};
use veou_schema::BusMessage;

#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub enum Topic {
    SuggestionsUpdated,
    PopularPlacesUpdated,
    SummaryStateChanged,
    LocationAuthorizationChanged,
}

impl Topic {
    pub fn from_message(msg: &BusMessage) -> Self {
        match msg {
            BusMessage::SuggestionsUpdated { .. } => Topic::SuggestionsUpdated,
            BusMessage::PopularPlacesUpdated { .. } => Topic::PopularPlacesUpdated,
            BusMessage::SummaryStateChanged { .. } => Topic::SummaryStateChanged,
            BusMessage::LocationAuthorizationChanged { .. } => {
                Topic::LocationAuthorizationChanged
            }
        }
    }
}

type Subscriber = mpsc::Sender<BusMessage>;

pub struct EventBus {
    subscribers: Arc<RwLock<HashMap<Topic, Vec<Subscriber>>>>,
    capacity: usize,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: Arc::new(RwLock::new(HashMap::new())),
            capacity,
        }
    }

    pub async fn subscribe(&self, topic: Topic) -> mpsc::Receiver<BusMessage> {
        let (tx, rx) = mpsc::channel(self.capacity);
        let mut subs = self.subscribers.write().await;
        subs.entry(topic).or_default().push(tx);
        rx
    }

    pub async fn publish(&self, msg: BusMessage) -> Result<()> {
        self.publisher().publish(msg).await
    }

    pub fn publisher(&self) -> BusPublisher {
        BusPublisher {
            subscribers: self.subscribers.clone(),
        }
    }
}

/// Cloneable publishing half handed to controllers.
#[derive(Clone)]
pub struct BusPublisher {
    subscribers: Arc<RwLock<HashMap<Topic, Vec<Subscriber>>>>,
}

impl BusPublisher {
    pub async fn publish(&self, msg: BusMessage) -> Result<()> {
        let topic = Topic::from_message(&msg);
        let mut subs = self.subscribers.write().await;
        if let Some(subscribers) = subs.get_mut(&topic) {
            // Drop receivers that went away; a full queue only loses this message.
            subscribers.retain(|tx| !tx.is_closed());
            for tx in subscribers.iter() {
                if let Err(mpsc::error::TrySendError::Full(_)) = tx.try_send(msg.clone()) {
                    tracing::debug!(?topic, "subscriber queue full, message dropped");
                }
            }
        }
        Ok(())
    }
}
