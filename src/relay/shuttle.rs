//! Message forwarding between paired users
//!
//! Content is forwarded unmodified through the kind-appropriate transport
//! primitive; blocked terms in text cost the sender points (floored at
//! zero) before forwarding. A delivery failure tears the session down on
//! both sides, exactly like an explicit end-chat.

use crate::config::RelaySettings;
use crate::economy::Ledger;
use crate::error::{DuetError, Result};
use crate::matching::MatchEngine;
use crate::metrics::MetricsCollector;
use crate::relay::filter::WordFilter;
use crate::storage::Storage;
use crate::transport::Outbound;
use crate::types::{MediaKind, MessageContent, OutboundMessage, RelayOutcome, UserId};
use std::sync::Arc;
use tracing::{debug, warn};

/// The session relay
pub struct SessionRelay {
    storage: Arc<dyn Storage>,
    ledger: Arc<Ledger>,
    outbound: Arc<dyn Outbound>,
    engine: Arc<MatchEngine>,
    metrics: Arc<MetricsCollector>,
    filter: WordFilter,
    word_penalty: u64,
}

impl SessionRelay {
    pub fn new(
        storage: Arc<dyn Storage>,
        ledger: Arc<Ledger>,
        outbound: Arc<dyn Outbound>,
        engine: Arc<MatchEngine>,
        metrics: Arc<MetricsCollector>,
        settings: &RelaySettings,
    ) -> Self {
        Self {
            storage,
            ledger,
            outbound,
            engine,
            metrics,
            filter: WordFilter::new(&settings.filtered_words),
            word_penalty: settings.word_penalty,
        }
    }

    /// Relay one message from `sender` to their partner.
    ///
    /// Senders without an active session get `Dropped` (the message simply
    /// disappears); unsupported media kinds are dropped the same way.
    pub async fn relay(&self, sender: UserId, content: MessageContent) -> Result<RelayOutcome> {
        let session = match self.storage.find_session_for(sender)? {
            Some(session) => session,
            None => {
                debug!("dropping message from {}: no active session", sender);
                return Ok(RelayOutcome::Dropped);
            }
        };
        let partner = session
            .partner_of(sender)
            .ok_or_else(|| DuetError::Internal {
                message: format!("session {} does not contain {}", session.id, sender),
            })?;

        if let MessageContent::Media {
            kind: MediaKind::Unsupported,
            ..
        } = content
        {
            debug!("dropping unsupported media kind from {}", sender);
            return Ok(RelayOutcome::Dropped);
        }

        let mut penalty = 0;
        if let MessageContent::Text(text) = &content {
            let matched = self.filter.matches(text);
            if matched > 0 {
                penalty = self
                    .ledger
                    .penalize_points(sender, self.word_penalty * matched as u64)?;
                self.metrics.record_word_penalty();
                warn!(
                    "user {} used {} blocked terms, deducted {} points",
                    sender, matched, penalty
                );
                let notice = OutboundMessage::text(format!(
                    "{} points were deducted for using blocked words.",
                    penalty
                ));
                if let Err(err) = self.outbound.send(sender, notice).await {
                    debug!("could not notify {} about penalty: {}", sender, err);
                }
            }
        }

        let kind_label = kind_label(&content);
        if let Err(err) = self
            .outbound
            .send(partner, OutboundMessage::forward(content))
            .await
        {
            warn!(
                "forwarding from {} to {} failed, tearing session down: {}",
                sender, partner, err
            );
            self.engine.teardown(&session)?;
            return Err(DuetError::PartnerUnreachable { partner }.into());
        }

        // Typing pass-through is best-effort decoration
        if kind_label == "text" {
            if let Err(err) = self.outbound.send(partner, OutboundMessage::typing()).await {
                debug!("typing indicator to {} failed: {}", partner, err);
            }
        }

        self.storage.bump_session_messages(session.id)?;
        self.metrics.record_relayed(kind_label);

        Ok(RelayOutcome::Forwarded { penalty })
    }
}

fn kind_label(content: &MessageContent) -> &'static str {
    match content {
        MessageContent::Text(_) => "text",
        MessageContent::Media { kind, .. } => match kind {
            MediaKind::Photo => "photo",
            MediaKind::Video => "video",
            MediaKind::Voice => "voice",
            MediaKind::Document => "document",
            MediaKind::Sticker => "sticker",
            MediaKind::Audio => "audio",
            MediaKind::Unsupported => "unsupported",
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EconomySettings, MatchingSettings};
    use crate::storage::MemoryStorage;
    use crate::transport::MockOutbound;
    use crate::types::UserStatus;

    struct Harness {
        relay: SessionRelay,
        engine: Arc<MatchEngine>,
        storage: Arc<MemoryStorage>,
        ledger: Arc<Ledger>,
        outbound: Arc<MockOutbound>,
    }

    async fn paired_harness() -> Harness {
        let storage = Arc::new(MemoryStorage::new());
        let ledger = Arc::new(Ledger::new(storage.clone(), EconomySettings::default()));
        let outbound = Arc::new(MockOutbound::new());
        let metrics = Arc::new(MetricsCollector::new().unwrap());
        let engine = Arc::new(MatchEngine::new(
            storage.clone(),
            ledger.clone(),
            outbound.clone(),
            metrics.clone(),
            MatchingSettings::default(),
        ));
        let settings = RelaySettings {
            filtered_words: vec!["spam".to_string(), "scam".to_string()],
            word_penalty: 5,
        };
        let relay = SessionRelay::new(
            storage.clone(),
            ledger.clone(),
            outbound.clone(),
            engine.clone(),
            metrics,
            &settings,
        );

        storage.ensure_user(1, "alice").unwrap();
        storage.ensure_user(2, "bob").unwrap();
        engine.start_search(1, None).await.unwrap();
        engine.start_search(2, None).await.unwrap();
        outbound.clear();

        Harness {
            relay,
            engine,
            storage,
            ledger,
            outbound,
        }
    }

    #[tokio::test]
    async fn test_text_is_forwarded_unmodified() {
        let h = paired_harness().await;

        let outcome = h
            .relay
            .relay(1, MessageContent::Text("hello".to_string()))
            .await
            .unwrap();
        assert_eq!(outcome, RelayOutcome::Forwarded { penalty: 0 });

        let delivered = h.outbound.sent_to(2);
        assert_eq!(
            delivered[0].content,
            MessageContent::Text("hello".to_string())
        );
        assert_eq!(h.storage.find_session_for(1).unwrap().unwrap().messages, 1);
    }

    #[tokio::test]
    async fn test_media_kinds_forwarded() {
        let h = paired_harness().await;

        for kind in [
            MediaKind::Photo,
            MediaKind::Video,
            MediaKind::Voice,
            MediaKind::Document,
            MediaKind::Sticker,
            MediaKind::Audio,
        ] {
            let outcome = h
                .relay
                .relay(
                    1,
                    MessageContent::Media {
                        kind,
                        file: "file-ref".to_string(),
                    },
                )
                .await
                .unwrap();
            assert_eq!(outcome, RelayOutcome::Forwarded { penalty: 0 });
        }
        assert_eq!(h.outbound.sent_to(2).len(), 6);
    }

    #[tokio::test]
    async fn test_unsupported_kind_silently_dropped() {
        let h = paired_harness().await;

        let outcome = h
            .relay
            .relay(
                1,
                MessageContent::Media {
                    kind: MediaKind::Unsupported,
                    file: "poll".to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(outcome, RelayOutcome::Dropped);
        assert!(h.outbound.sent_to(2).is_empty());
    }

    #[tokio::test]
    async fn test_no_session_drops_message() {
        let h = paired_harness().await;
        h.engine.end_chat(1).await.unwrap();
        h.outbound.clear();

        let outcome = h
            .relay
            .relay(1, MessageContent::Text("anyone?".to_string()))
            .await
            .unwrap();
        assert_eq!(outcome, RelayOutcome::Dropped);
        assert!(h.outbound.sent_to(2).is_empty());
    }

    #[tokio::test]
    async fn test_word_penalty_floors_at_zero() {
        let h = paired_harness().await;
        h.ledger.add_points(1, 3).unwrap();

        // Two blocked terms would cost 10, but only 3 points exist
        let outcome = h
            .relay
            .relay(1, MessageContent::Text("spam and scam".to_string()))
            .await
            .unwrap();
        assert_eq!(outcome, RelayOutcome::Forwarded { penalty: 3 });
        assert_eq!(h.storage.get_user(1).unwrap().unwrap().points, 0);

        // The original text still reaches the partner unmodified
        let delivered = h.outbound.sent_to(2);
        assert_eq!(
            delivered[0].content,
            MessageContent::Text("spam and scam".to_string())
        );
    }

    #[tokio::test]
    async fn test_unreachable_partner_tears_session_down() {
        let h = paired_harness().await;
        h.outbound.mark_unreachable(2);

        let err = h
            .relay
            .relay(1, MessageContent::Text("hello?".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DuetError>(),
            Some(DuetError::PartnerUnreachable { partner: 2 })
        ));

        assert!(h.storage.find_session_for(1).unwrap().is_none());
        for user in [1, 2] {
            let profile = h.storage.get_user(user).unwrap().unwrap();
            assert_eq!(profile.status, UserStatus::Idle);
        }
    }
}
