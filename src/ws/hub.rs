//! Live subscriber registry.
//!
//! Each connection subscribes to exactly one ticker and owns a bounded outbound
//! queue. Broadcasts copy the matching senders under the read lock and push
//! outside it. A connection whose queue is full or closed is dropped instead of
//! slowing the pipeline down; dropping its sender ends its socket task.

use crate::models::PeriodSummary;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub type ConnId = Uuid;

pub const DEFAULT_OUTBOUND_BUFFER: usize = 256;

struct Connection {
    ticker: String,
    tx: mpsc::Sender<String>,
}

pub struct ConnectionHub {
    connections: RwLock<HashMap<ConnId, Connection>>,
    buffer: usize,
}

impl Default for ConnectionHub {
    fn default() -> Self {
        Self::new(DEFAULT_OUTBOUND_BUFFER)
    }
}

impl ConnectionHub {
    pub fn new(buffer: usize) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            buffer: buffer.max(1),
        }
    }

    /// Subscribe a new connection to `ticker` (case-insensitive).
    pub fn register(&self, ticker: &str) -> (ConnId, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(self.buffer);
        let id = Uuid::new_v4();
        let ticker = ticker.to_ascii_uppercase();

        let mut connections = self.connections.write();
        connections.insert(id, Connection { ticker: ticker.clone(), tx });
        info!(conn = %id, ticker = %ticker, total = connections.len(), "subscriber registered");
        (id, rx)
    }

    /// Remove a connection. Safe to call more than once.
    pub fn unregister(&self, id: ConnId) -> bool {
        let mut connections = self.connections.write();
        match connections.remove(&id) {
            Some(conn) => {
                info!(conn = %id, ticker = %conn.ticker, total = connections.len(), "subscriber unregistered");
                true
            }
            None => false,
        }
    }

    /// Push a bare summary object to every subscriber of `ticker`.
    pub fn broadcast(&self, ticker: &str, summary: &PeriodSummary) -> usize {
        match serde_json::to_string(summary) {
            Ok(text) => self.broadcast_text(ticker, &text),
            Err(e) => {
                warn!(ticker = %ticker, error = %e, "failed to encode summary");
                0
            }
        }
    }

    /// Returns how many subscribers accepted the message.
    pub fn broadcast_text(&self, ticker: &str, text: &str) -> usize {
        let ticker = ticker.to_ascii_uppercase();
        let targets: Vec<(ConnId, mpsc::Sender<String>)> = self
            .connections
            .read()
            .iter()
            .filter(|(_, c)| c.ticker == ticker)
            .map(|(id, c)| (*id, c.tx.clone()))
            .collect();

        let mut delivered = 0;
        for (id, tx) in targets {
            match tx.try_send(text.to_string()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(conn = %id, ticker = %ticker, "subscriber too slow; dropping");
                    self.unregister(id);
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(conn = %id, "subscriber gone");
                    self.unregister(id);
                }
            }
        }
        delivered
    }

    pub fn is_subscribed(&self, ticker: &str) -> bool {
        let ticker = ticker.to_ascii_uppercase();
        self.connections.read().values().any(|c| c.ticker == ticker)
    }

    pub fn subscribed_tickers(&self) -> HashSet<String> {
        self.connections
            .read()
            .values()
            .map(|c| c.ticker.clone())
            .collect()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }
}
