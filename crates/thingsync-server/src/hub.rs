//! Connection hub: the table of joined connections keyed by session, and the
//! translation between inbound messages, store operations and broadcasts.
//!
//! Ordering rules:
//! - `join` announces `users/create` to the peers present before it
//!   registered, so the joiner never sees its own join.
//! - `leave` deregisters before broadcasting `users/delete`, so the leaver
//!   is never a recipient of its own leave.
//! - `broadcast` never holds the table lock while queueing frames.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use thingsync_core::{
    ErrorContent, Event, IncomingMessage, Item, ItemCandidate, OutgoingMessage, ProtocolError,
    Resource, SessionKey, User,
};
use thingsync_store::ItemStore;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::connection::Connection;
use crate::error::HubError;

/// Outcome of one broadcast.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub failed: usize,
}

pub struct Hub {
    connections: RwLock<HashMap<SessionKey, Arc<Connection>>>,
    store: Arc<dyn ItemStore>,
    reply_errors: bool,
}

impl Hub {
    pub fn new(store: Arc<dyn ItemStore>, reply_errors: bool) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            store,
            reply_errors,
        }
    }

    pub fn store(&self) -> &Arc<dyn ItemStore> {
        &self.store
    }

    /// Register a connection and send it the handshake.
    ///
    /// A connection for a session that is already joined replaces the older
    /// one: the older one is cancelled and the join is not re-announced.
    /// Whether this is a rejoin, and who hears about it, is decided under the
    /// same write lock as the insert, so a racing `leave` of the older
    /// connection is either fully before or fully after it.
    #[instrument(skip_all, fields(conn_id = %conn.id, user_id = conn.user.id))]
    pub async fn join(&self, conn: &Arc<Connection>) {
        let (peers, replaced) = {
            let mut conns = self.connections.write().await;
            let peers: Option<Vec<Arc<Connection>>> = (!conns.contains_key(&conn.session))
                .then(|| conns.values().cloned().collect());
            let replaced = conns.insert(conn.session.clone(), Arc::clone(conn));
            (peers, replaced)
        };

        if let Some(peers) = peers {
            let _ = deliver(
                &OutgoingMessage::new(Resource::Users, Event::Create, &conn.user),
                &peers,
            );
        }
        if let Some(old) = replaced.filter(|old| old.id != conn.id) {
            info!(superseded = %old.id, "session reconnected, closing older connection");
            old.cancel();
        }

        let _ = conn.mark_joined();
        info!(session = %conn.session.redacted(), "user joined");

        self.send_handshake(conn).await;
    }

    /// Deregister a connection and announce it. Runs at most once per
    /// connection; returns whether a leave was broadcast.
    #[instrument(skip_all, fields(conn_id = %conn.id, user_id = conn.user.id))]
    pub async fn leave(&self, conn: &Connection) -> bool {
        if !conn.begin_leave() {
            return false;
        }

        let removed = {
            let mut conns = self.connections.write().await;
            match conns.get(&conn.session) {
                Some(current) if current.id == conn.id => conns.remove(&conn.session).is_some(),
                _ => false,
            }
        };

        if removed {
            let _ = self
                .broadcast(&OutgoingMessage::new(Resource::Users, Event::Delete, &conn.user))
                .await;
            info!("user left");
        } else {
            debug!("superseded connection closed");
        }
        conn.mark_closed();
        removed
    }

    /// Queue `msg` on every joined connection.
    pub async fn broadcast<T: Serialize>(&self, msg: &OutgoingMessage<T>) -> Delivery {
        let recipients: Vec<Arc<Connection>> =
            self.connections.read().await.values().cloned().collect();
        deliver(msg, &recipients)
    }

    /// Handle one inbound frame and log or reply with any failure.
    pub async fn process(&self, from: &Connection, text: &str) {
        if let Err(e) = self.handle_message(from, text).await {
            warn!(conn_id = %from.id, kind = e.kind(), error = %e, "message rejected");
            if self.reply_errors {
                let reply = OutgoingMessage::new(
                    Resource::Things,
                    Event::Error,
                    ErrorContent {
                        kind: e.kind().to_string(),
                        message: e.to_string(),
                    },
                );
                let _ = send_to(from, &reply);
            }
        }
    }

    /// Parse and apply one inbound frame.
    #[instrument(skip_all, fields(conn_id = %from.id))]
    pub async fn handle_message(&self, from: &Connection, text: &str) -> Result<(), HubError> {
        let msg = IncomingMessage::parse(text)?;
        debug!(%msg, "message received");
        let resource = msg.resource()?;
        let event = msg.event()?;

        match (resource, event) {
            (Resource::Things, Event::List) => {
                let items = self.store.list()?;
                let _ = send_to(from, &OutgoingMessage::new(Resource::Things, Event::List, items));
                Ok(())
            }
            (Resource::Things, Event::Create | Event::Update | Event::Delete) => {
                let candidate = msg.candidate()?;
                let item = self.apply(event, &candidate)?;
                info!(item_id = item.id, %item, %event, "thing changed");
                let _ = self
                    .broadcast(&OutgoingMessage::new(Resource::Things, event, &item))
                    .await;
                Ok(())
            }
            _ => Err(ProtocolError::UnknownEvent(msg.event.clone()).into()),
        }
    }

    fn apply(&self, event: Event, candidate: &ItemCandidate) -> Result<Item, HubError> {
        let item = match event {
            Event::Create => self.store.create(candidate)?,
            Event::Update => self.store.update(candidate)?,
            Event::Delete => self.store.delete(candidate)?,
            Event::List | Event::Error => {
                return Err(ProtocolError::UnknownEvent(event.to_string()).into());
            }
        };
        Ok(item)
    }

    async fn send_handshake(&self, conn: &Connection) {
        let users = self.users().await;
        let _ = send_to(conn, &OutgoingMessage::new(Resource::Users, Event::List, users));
        match self.store.list() {
            Ok(items) => {
                let _ = send_to(conn, &OutgoingMessage::new(Resource::Things, Event::List, items));
            }
            Err(e) => warn!(conn_id = %conn.id, error = %e, "could not list things for handshake"),
        }
    }

    /// Users of every joined connection, ordered by id.
    pub async fn users(&self) -> Vec<User> {
        let mut users: Vec<User> = self
            .connections
            .read()
            .await
            .values()
            .map(|c| c.user.clone())
            .collect();
        users.sort_by_key(|u| u.id);
        users
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Cancel every joined connection.
    pub async fn close_all(&self) {
        for conn in self.connections.read().await.values() {
            conn.cancel();
        }
    }
}

/// Serialize `msg` once and queue it on each of `recipients`.
fn deliver<T: Serialize>(msg: &OutgoingMessage<T>, recipients: &[Arc<Connection>]) -> Delivery {
    let frame = match msg.to_json() {
        Ok(json) => Arc::new(json),
        Err(e) => {
            warn!(resource = %msg.resource, event = %msg.event, error = %e, "failed to serialize broadcast");
            return Delivery::default();
        }
    };

    let mut delivery = Delivery::default();
    for conn in recipients {
        if conn.send(Arc::clone(&frame)) {
            delivery.delivered += 1;
        } else {
            delivery.failed += 1;
            warn!(conn_id = %conn.id, dropped = conn.drop_count(), "failed to queue broadcast");
        }
    }
    debug!(
        resource = %msg.resource,
        event = %msg.event,
        recipients = recipients.len(),
        failed = delivery.failed,
        "broadcast"
    );
    delivery
}

fn send_to<T: Serialize>(conn: &Connection, msg: &OutgoingMessage<T>) -> bool {
    match msg.to_json() {
        Ok(json) => conn.send(Arc::new(json)),
        Err(e) => {
            warn!(conn_id = %conn.id, error = %e, "failed to serialize reply");
            false
        }
    }
}
