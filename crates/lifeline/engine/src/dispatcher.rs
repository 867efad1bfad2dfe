//! Notification dispatcher: channel fan-out with fallback
//!
//! Given one tier and its contact snapshot, the dispatcher attempts
//! channels in each contact's preference order (intersected with the
//! tier's allowed set), retries failures with capped exponential
//! backoff, and fans out across contacts concurrently under a fixed
//! bound so one tier cannot exhaust delivery capacity.
//!
//! The dispatcher reports delivery; it never decides escalation. The
//! tier's acknowledgment clock runs in the scheduler regardless of
//! what happens here.

use crate::adapters::{ChannelAdapter, RenderedMessage, SendOutcome};
use crate::audit_log::AuditLog;
use crate::config::DispatchConfig;
use futures::stream::{self, StreamExt};
use lifeline_types::{
    AttemptOutcome, AuditActor, AuditEvent, Channel, Contact, ContactDispatchStatus,
    ExecutionId, NotificationAttempt, Tier,
};
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;

/// Dispatches one tier's notifications across contacts and channels
pub struct NotificationDispatcher {
    channel_adapter: Arc<dyn ChannelAdapter>,
    audit: Arc<AuditLog>,
    config: DispatchConfig,
}

impl NotificationDispatcher {
    pub fn new(
        channel_adapter: Arc<dyn ChannelAdapter>,
        audit: Arc<AuditLog>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            channel_adapter,
            audit,
            config,
        }
    }

    /// Dispatch one tier to its contacts.
    ///
    /// Concurrent across contacts, bounded by `max_fanout`. The
    /// `abort` flag stops new attempts cooperatively; attempts already
    /// in flight complete and are still audited.
    pub async fn dispatch_tier(
        &self,
        execution_id: &ExecutionId,
        tier_index: u32,
        tier: &Tier,
        contacts: &[Contact],
        messages: &HashMap<String, RenderedMessage>,
        abort: watch::Receiver<bool>,
    ) -> Vec<ContactDispatchStatus> {
        let dispatches: Vec<_> = contacts
            .iter()
            .map(|contact| {
                self.dispatch_contact(
                    execution_id,
                    tier_index,
                    tier,
                    contact,
                    messages,
                    abort.clone(),
                )
            })
            .collect();
        let statuses: Vec<ContactDispatchStatus> = stream::iter(dispatches)
            .buffer_unordered(self.config.max_fanout)
            .collect()
            .await;

        let delivered = statuses.iter().filter(|s| s.delivered).count();
        tracing::info!(
            execution_id = %execution_id,
            tier_index,
            contacts = contacts.len(),
            delivered,
            "Tier dispatch completed"
        );
        statuses
    }

    async fn dispatch_contact(
        &self,
        execution_id: &ExecutionId,
        tier_index: u32,
        tier: &Tier,
        contact: &Contact,
        messages: &HashMap<String, RenderedMessage>,
        abort: watch::Receiver<bool>,
    ) -> ContactDispatchStatus {
        let message = match select_message(messages, &contact.language) {
            Some(message) => message,
            None => {
                tracing::warn!(
                    execution_id = %execution_id,
                    contact_id = %contact.id,
                    "No rendered message available for contact"
                );
                return ContactDispatchStatus {
                    contact_id: contact.id.clone(),
                    delivered: false,
                    attempts: 0,
                };
            }
        };

        let mut attempts = 0u32;
        let mut delivered = false;

        for endpoint in contact.endpoints_for(&tier.channels) {
            if *abort.borrow() {
                break;
            }

            if endpoint.channel.is_voice() {
                // Voice completion is not human acknowledgment: always
                // shadow with a text follow-up after the grace period.
                self.schedule_voice_shadow(execution_id, tier_index, contact, message, &abort);
            }

            let (channel_delivered, channel_attempts) = self
                .attempt_channel(
                    execution_id,
                    tier_index,
                    tier,
                    contact,
                    endpoint.channel,
                    &endpoint.address,
                    message,
                    &abort,
                )
                .await;

            attempts += channel_attempts;
            if channel_delivered {
                delivered = true;
                break;
            }
        }

        ContactDispatchStatus {
            contact_id: contact.id.clone(),
            delivered,
            attempts,
        }
    }

    /// Try one channel up to the tier's `max_attempts`, with capped
    /// exponential backoff between retries.
    #[allow(clippy::too_many_arguments)]
    async fn attempt_channel(
        &self,
        execution_id: &ExecutionId,
        tier_index: u32,
        tier: &Tier,
        contact: &Contact,
        channel: Channel,
        address: &str,
        message: &RenderedMessage,
        abort: &watch::Receiver<bool>,
    ) -> (bool, u32) {
        let mut attempts = 0u32;

        for retry in 0..tier.max_attempts {
            if *abort.borrow() {
                break;
            }

            let outcome = self.send_once(contact, channel, address, message).await;
            attempts += 1;

            let delivered = outcome.is_delivered();
            self.audit.record(
                execution_id,
                AuditActor::System,
                AuditEvent::DispatchAttempted {
                    attempt: NotificationAttempt::new(
                        execution_id.clone(),
                        tier_index,
                        contact.id.clone(),
                        channel,
                        outcome,
                    ),
                },
            );

            if delivered {
                return (true, attempts);
            }

            if retry + 1 < tier.max_attempts {
                tokio::time::sleep(self.backoff_with_jitter(retry)).await;
            }
        }

        (false, attempts)
    }

    async fn send_once(
        &self,
        contact: &Contact,
        channel: Channel,
        address: &str,
        message: &RenderedMessage,
    ) -> AttemptOutcome {
        let send = self
            .channel_adapter
            .send(contact, channel, address, message);
        match tokio::time::timeout(self.config.attempt_timeout(), send).await {
            Ok(SendOutcome::Accepted) => AttemptOutcome::Delivered,
            Ok(SendOutcome::Rejected { reason }) => AttemptOutcome::Failed { reason },
            Err(_) => AttemptOutcome::TimedOut,
        }
    }

    /// Fire-and-forget SMS follow-up to a voice attempt. Runs after a
    /// fixed grace period regardless of the voice outcome; skipped only
    /// if the contact has no text endpoint or dispatch was aborted.
    fn schedule_voice_shadow(
        &self,
        execution_id: &ExecutionId,
        tier_index: u32,
        contact: &Contact,
        message: &RenderedMessage,
        abort: &watch::Receiver<bool>,
    ) {
        let Some(endpoint) = contact
            .endpoints
            .iter()
            .find(|e| e.channel == Channel::Sms)
            .cloned()
        else {
            return;
        };

        let adapter = Arc::clone(&self.channel_adapter);
        let audit = Arc::clone(&self.audit);
        let grace = self.config.voice_fallback_grace();
        let attempt_timeout = self.config.attempt_timeout();
        let execution_id = execution_id.clone();
        let contact = contact.clone();
        let message = message.clone();
        let abort = abort.clone();

        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            if *abort.borrow() {
                return;
            }

            let send = adapter.send(&contact, Channel::Sms, &endpoint.address, &message);
            let outcome = match tokio::time::timeout(attempt_timeout, send).await {
                Ok(SendOutcome::Accepted) => AttemptOutcome::Delivered,
                Ok(SendOutcome::Rejected { reason }) => AttemptOutcome::Failed { reason },
                Err(_) => AttemptOutcome::TimedOut,
            };

            audit.record(
                &execution_id,
                AuditActor::System,
                AuditEvent::DispatchAttempted {
                    attempt: NotificationAttempt::new(
                        execution_id.clone(),
                        tier_index,
                        contact.id.clone(),
                        Channel::Sms,
                        outcome,
                    ),
                },
            );
        });
    }

    fn backoff_with_jitter(&self, retry: u32) -> std::time::Duration {
        let base = self.config.backoff_for(retry);
        let jitter_ms = rand::thread_rng().gen_range(0..=self.config.backoff_base_ms / 2);
        base + std::time::Duration::from_millis(jitter_ms)
    }
}

fn select_message<'a>(
    messages: &'a HashMap<String, RenderedMessage>,
    language: &str,
) -> Option<&'a RenderedMessage> {
    messages
        .get(language)
        .or_else(|| messages.get("en"))
        .or_else(|| messages.values().next())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use lifeline_types::ContactId;
    use std::sync::Mutex;

    /// Adapter that records every send and answers from a script.
    struct ScriptedChannel {
        sends: Mutex<Vec<(ContactId, Channel)>>,
        reject: Vec<Channel>,
    }

    impl ScriptedChannel {
        fn new(reject: Vec<Channel>) -> Self {
            Self {
                sends: Mutex::new(Vec::new()),
                reject,
            }
        }

        fn sends(&self) -> Vec<(ContactId, Channel)> {
            self.sends.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChannelAdapter for ScriptedChannel {
        async fn send(
            &self,
            contact: &Contact,
            channel: Channel,
            _address: &str,
            _message: &RenderedMessage,
        ) -> SendOutcome {
            self.sends.lock().unwrap().push((contact.id.clone(), channel));
            if self.reject.contains(&channel) {
                SendOutcome::Rejected {
                    reason: "carrier unavailable".into(),
                }
            } else {
                SendOutcome::Accepted
            }
        }
    }

    fn make_tier() -> Tier {
        Tier::new("t0")
            .with_max_attempts(2)
            .with_role("provider")
            .with_channel(Channel::Voice)
            .with_channel(Channel::Sms)
            .with_channel(Channel::Push)
    }

    fn make_contact(id: &str) -> Contact {
        Contact::new(ContactId::new(id), "Test Contact", lifeline_types::RoleId::new("provider"))
            .with_endpoint(Channel::Push, format!("push:{id}"))
            .with_endpoint(Channel::Sms, format!("+1555{id}"))
    }

    fn make_messages() -> HashMap<String, RenderedMessage> {
        let mut messages = HashMap::new();
        messages.insert(
            "en".to_string(),
            RenderedMessage {
                template_id: "critical-result".into(),
                language: "en".into(),
                body: "Critical result pending review".into(),
            },
        );
        messages
    }

    fn make_dispatcher(adapter: Arc<ScriptedChannel>) -> NotificationDispatcher {
        NotificationDispatcher::new(adapter, Arc::new(AuditLog::new()), DispatchConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_channel_success_stops_contact() {
        let adapter = Arc::new(ScriptedChannel::new(vec![]));
        let dispatcher = make_dispatcher(Arc::clone(&adapter));
        let (_tx, abort) = watch::channel(false);

        let statuses = dispatcher
            .dispatch_tier(
                &ExecutionId::new("e1"),
                0,
                &make_tier(),
                &[make_contact("c1")],
                &make_messages(),
                abort,
            )
            .await;

        assert_eq!(statuses.len(), 1);
        assert!(statuses[0].delivered);
        assert_eq!(statuses[0].attempts, 1);
        // Push (the contact's first allowed preference) only
        assert_eq!(adapter.sends(), vec![(ContactId::new("c1"), Channel::Push)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_to_next_channel_after_retries() {
        let adapter = Arc::new(ScriptedChannel::new(vec![Channel::Push]));
        let dispatcher = make_dispatcher(Arc::clone(&adapter));
        let (_tx, abort) = watch::channel(false);

        let statuses = dispatcher
            .dispatch_tier(
                &ExecutionId::new("e1"),
                0,
                &make_tier(),
                &[make_contact("c1")],
                &make_messages(),
                abort,
            )
            .await;

        // Push retried twice (max_attempts), then SMS delivered
        assert!(statuses[0].delivered);
        assert_eq!(statuses[0].attempts, 3);
        let channels: Vec<Channel> = adapter.sends().into_iter().map(|(_, c)| c).collect();
        assert_eq!(channels, vec![Channel::Push, Channel::Push, Channel::Sms]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_channels_exhausted_marks_undelivered() {
        let adapter = Arc::new(ScriptedChannel::new(vec![Channel::Push, Channel::Sms]));
        let dispatcher = make_dispatcher(Arc::clone(&adapter));
        let (_tx, abort) = watch::channel(false);

        let statuses = dispatcher
            .dispatch_tier(
                &ExecutionId::new("e1"),
                0,
                &make_tier(),
                &[make_contact("c1")],
                &make_messages(),
                abort,
            )
            .await;

        assert!(!statuses[0].delivered);
        assert_eq!(statuses[0].attempts, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_voice_shadow_sms_fires_even_on_success() {
        let adapter = Arc::new(ScriptedChannel::new(vec![]));
        let dispatcher = make_dispatcher(Arc::clone(&adapter));
        let (_tx, abort) = watch::channel(false);

        let contact = Contact::new(
            ContactId::new("c1"),
            "Dr. Voice",
            lifeline_types::RoleId::new("provider"),
        )
        .with_endpoint(Channel::Voice, "+15550100")
        .with_endpoint(Channel::Sms, "+15550100");

        let statuses = dispatcher
            .dispatch_tier(
                &ExecutionId::new("e1"),
                0,
                &make_tier(),
                &[contact],
                &make_messages(),
                abort,
            )
            .await;
        assert!(statuses[0].delivered);

        // Let the grace period elapse so the shadow task runs
        tokio::time::sleep(std::time::Duration::from_secs(11)).await;

        let channels: Vec<Channel> = adapter.sends().into_iter().map(|(_, c)| c).collect();
        assert!(channels.contains(&Channel::Voice));
        assert!(channels.contains(&Channel::Sms));
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_stops_new_attempts() {
        let adapter = Arc::new(ScriptedChannel::new(vec![]));
        let dispatcher = make_dispatcher(Arc::clone(&adapter));
        let (tx, abort) = watch::channel(true);

        let statuses = dispatcher
            .dispatch_tier(
                &ExecutionId::new("e1"),
                0,
                &make_tier(),
                &[make_contact("c1"), make_contact("c2")],
                &make_messages(),
                abort,
            )
            .await;

        assert!(statuses.iter().all(|s| s.attempts == 0));
        assert!(adapter.sends().is_empty());
        drop(tx);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fanout_covers_all_contacts() {
        let adapter = Arc::new(ScriptedChannel::new(vec![]));
        let dispatcher = make_dispatcher(Arc::clone(&adapter));
        let (_tx, abort) = watch::channel(false);

        let contacts: Vec<Contact> = (0..20).map(|i| make_contact(&format!("c{i}"))).collect();
        let statuses = dispatcher
            .dispatch_tier(
                &ExecutionId::new("e1"),
                0,
                &make_tier(),
                &contacts,
                &make_messages(),
                abort,
            )
            .await;

        assert_eq!(statuses.len(), 20);
        assert!(statuses.iter().all(|s| s.delivered));
    }
}
