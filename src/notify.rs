use dashmap::DashMap;
use tokio::sync::broadcast::{self, error::RecvError};
use ulid::Ulid;

use crate::model::Event;

/// Events buffered per provider before slow receivers start lagging.
const CHANNEL_CAPACITY: usize = 256;

/// Fan-out of committed schedule changes, one channel per provider.
///
/// Channels are created on first subscription and pruned once the last
/// receiver is gone, so providers nobody watches cost nothing.
#[derive(Default)]
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<Event>>,
}

impl NotifyHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every committed change for `provider_id`, blocked slots included.
    pub fn subscribe(&self, provider_id: Ulid) -> broadcast::Receiver<Event> {
        self.channels
            .entry(provider_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Only booking, reschedule, status and removal events for `provider_id`.
    pub fn subscribe_appointments(&self, provider_id: Ulid) -> AppointmentFeed {
        AppointmentFeed {
            rx: self.subscribe(provider_id),
        }
    }

    /// Live receivers for a provider.
    pub fn receiver_count(&self, provider_id: &Ulid) -> usize {
        self.channels
            .get(provider_id)
            .map_or(0, |sender| sender.receiver_count())
    }

    /// Publish a committed event. Drops the provider's channel if nobody is left to hear it.
    pub fn send(&self, provider_id: Ulid, event: &Event) {
        let delivered = match self.channels.get(&provider_id) {
            Some(sender) => sender.send(event.clone()).is_ok(),
            None => return,
        };
        if !delivered {
            self.channels
                .remove_if(&provider_id, |_, sender| sender.receiver_count() == 0);
        }
    }

    /// Close a provider's channel; current receivers see the stream end.
    pub fn remove(&self, provider_id: &Ulid) {
        self.channels.remove(provider_id);
    }
}

/// Receiver that skips blocked-slot events.
pub struct AppointmentFeed {
    rx: broadcast::Receiver<Event>,
}

impl AppointmentFeed {
    pub async fn recv(&mut self) -> Result<Event, RecvError> {
        loop {
            let event = self.rx.recv().await?;
            if event.is_appointment() {
                return Ok(event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AppointmentStatus, HOUR, Span};

    fn unblocked(provider_id: Ulid) -> Event {
        Event::SlotUnblocked {
            id: Ulid::new(),
            provider_id,
        }
    }

    #[tokio::test]
    async fn subscribe_and_receive() {
        let hub = NotifyHub::new();
        let pid = Ulid::new();
        let mut rx = hub.subscribe(pid);

        let event = unblocked(pid);
        hub.send(pid, &event);
        assert_eq!(rx.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn other_provider_not_received() {
        let hub = NotifyHub::new();
        let mine = Ulid::new();
        let other = Ulid::new();
        let mut rx = hub.subscribe(mine);

        hub.send(other, &unblocked(other));
        assert!(matches!(rx.try_recv(), Err(broadcast::error::TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn idle_channel_is_pruned() {
        let hub = NotifyHub::new();
        let pid = Ulid::new();
        hub.send(pid, &unblocked(pid));
        assert_eq!(hub.receiver_count(&pid), 0);

        let rx = hub.subscribe(pid);
        let rx2 = hub.subscribe(pid);
        assert_eq!(hub.receiver_count(&pid), 2);
        drop(rx);
        drop(rx2);

        hub.send(pid, &unblocked(pid));
        assert!(hub.channels.get(&pid).is_none());
    }

    #[tokio::test]
    async fn appointment_feed_skips_slot_events() {
        let hub = NotifyHub::new();
        let pid = Ulid::new();
        let mut feed = hub.subscribe_appointments(pid);

        hub.send(
            pid,
            &Event::SlotBlocked {
                id: Ulid::new(),
                provider_id: pid,
                span: Span::new(9 * HOUR, 10 * HOUR),
                reason: None,
            },
        );
        let changed = Event::AppointmentStatusChanged {
            id: Ulid::new(),
            provider_id: pid,
            status: AppointmentStatus::NoShow,
        };
        hub.send(pid, &changed);

        assert_eq!(feed.recv().await.unwrap(), changed);
    }

    #[tokio::test]
    async fn remove_closes_stream() {
        let hub = NotifyHub::new();
        let pid = Ulid::new();
        let mut rx = hub.subscribe(pid);
        hub.remove(&pid);
        assert!(matches!(rx.recv().await, Err(RecvError::Closed)));
    }
}
