//! Outbound transport boundary
//!
//! The chat platform is an opaque collaborator; the core only emits
//! `send(user, message)` calls through this trait. The mock implementation
//! records traffic and can simulate unreachable recipients for rollback
//! tests.

use crate::error::{DuetError, Result};
use crate::types::{OutboundMessage, UserId};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;

/// Trait for delivering messages to users
#[async_trait]
pub trait Outbound: Send + Sync {
    /// Deliver one message; an error means the recipient is unreachable
    async fn send(&self, to: UserId, message: OutboundMessage) -> Result<()>;
}

/// Transport that logs deliveries instead of sending them.
///
/// Used by the standalone binary when no platform adapter is attached,
/// e.g. for dry runs against the embedded store.
#[derive(Debug, Default)]
pub struct TracingOutbound;

#[async_trait]
impl Outbound for TracingOutbound {
    async fn send(&self, to: UserId, message: OutboundMessage) -> Result<()> {
        tracing::debug!("outbound to {}: {:?}", to, message);
        Ok(())
    }
}

/// Mock transport for testing
#[derive(Debug, Default)]
pub struct MockOutbound {
    sent: Mutex<Vec<(UserId, OutboundMessage)>>,
    unreachable: Mutex<HashSet<UserId>>,
}

impl MockOutbound {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every send to `user` fail from now on
    pub fn mark_unreachable(&self, user: UserId) {
        if let Ok(mut unreachable) = self.unreachable.lock() {
            unreachable.insert(user);
        }
    }

    pub fn mark_reachable(&self, user: UserId) {
        if let Ok(mut unreachable) = self.unreachable.lock() {
            unreachable.remove(&user);
        }
    }

    /// Everything sent to `user`, in order
    pub fn sent_to(&self, user: UserId) -> Vec<OutboundMessage> {
        self.sent
            .lock()
            .map(|sent| {
                sent.iter()
                    .filter(|(to, _)| *to == user)
                    .map(|(_, message)| message.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().map(|sent| sent.len()).unwrap_or(0)
    }

    pub fn clear(&self) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.clear();
        }
    }
}

#[async_trait]
impl Outbound for MockOutbound {
    async fn send(&self, to: UserId, message: OutboundMessage) -> Result<()> {
        let unreachable = self
            .unreachable
            .lock()
            .map(|set| set.contains(&to))
            .unwrap_or(false);
        if unreachable {
            return Err(DuetError::PartnerUnreachable { partner: to }.into());
        }

        if let Ok(mut sent) = self.sent.lock() {
            sent.push((to, message));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_records_and_fails() {
        let outbound = MockOutbound::new();

        outbound.send(1, OutboundMessage::text("hi")).await.unwrap();
        assert_eq!(outbound.sent_to(1).len(), 1);

        outbound.mark_unreachable(1);
        assert!(outbound.send(1, OutboundMessage::text("gone")).await.is_err());
        assert_eq!(outbound.sent_to(1).len(), 1);

        outbound.mark_reachable(1);
        assert!(outbound.send(1, OutboundMessage::text("back")).await.is_ok());
        assert_eq!(outbound.sent_to(1).len(), 2);
    }
}
