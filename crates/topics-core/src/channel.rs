use thiserror::Error;
use tokio::sync::{broadcast, mpsc};

use crate::types::{TopicsCommand, TopicsEvent};

/// Broadcast event stream type used by frontend subscribers.
pub type EventStream = broadcast::Receiver<TopicsEvent>;

/// Errors returned by channel operations.
#[derive(Debug, Error)]
pub enum TopicsChannelError {
    /// The command receiver side is closed.
    #[error("command channel is closed")]
    CommandChannelClosed,
}

/// Command/event channel pair shared by the controller loop and frontends.
#[derive(Clone, Debug)]
pub struct TopicsChannels {
    command_tx: mpsc::Sender<TopicsCommand>,
    event_tx: broadcast::Sender<TopicsEvent>,
}

impl TopicsChannels {
    /// Create a new channel set and return it with the command receiver.
    pub fn new(command_buffer: usize, event_buffer: usize) -> (Self, mpsc::Receiver<TopicsCommand>) {
        let (command_tx, command_rx) = mpsc::channel(command_buffer.max(1));
        let (event_tx, _) = broadcast::channel(event_buffer.max(1));

        (
            Self {
                command_tx,
                event_tx,
            },
            command_rx,
        )
    }

    /// Clone the event sender, for handing to the controller.
    pub fn event_sender(&self) -> broadcast::Sender<TopicsEvent> {
        self.event_tx.clone()
    }

    /// Subscribe to emitted events.
    pub fn subscribe(&self) -> EventStream {
        self.event_tx.subscribe()
    }

    /// Queue one command for the controller loop.
    pub async fn send_command(&self, command: TopicsCommand) -> Result<(), TopicsChannelError> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| TopicsChannelError::CommandChannelClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TopicRef, TopicsSnapshot};

    #[tokio::test]
    async fn sends_commands_to_receiver() {
        let (channels, mut rx) = TopicsChannels::new(8, 8);
        channels
            .send_command(TopicsCommand::Delete {
                id: TopicRef::Remote(4),
                confirmed: true,
            })
            .await
            .expect("command send should work");

        let cmd = rx.recv().await.expect("receiver should have a command");
        assert_eq!(
            cmd,
            TopicsCommand::Delete {
                id: TopicRef::Remote(4),
                confirmed: true
            }
        );
    }

    #[tokio::test]
    async fn fans_out_events_to_subscribers() {
        let (channels, _rx) = TopicsChannels::new(4, 16);
        let mut a = channels.subscribe();
        let mut b = channels.subscribe();

        let _ = channels
            .event_sender()
            .send(TopicsEvent::Snapshot(TopicsSnapshot::default()));

        let event_a = a.recv().await.expect("subscriber a should receive event");
        let event_b = b.recv().await.expect("subscriber b should receive event");
        assert_eq!(event_a, event_b);
    }

    #[tokio::test]
    async fn reports_closed_command_channel() {
        let (channels, rx) = TopicsChannels::new(1, 1);
        drop(rx);
        let err = channels
            .send_command(TopicsCommand::Refresh)
            .await
            .expect_err("receiver is gone");
        assert!(matches!(err, TopicsChannelError::CommandChannelClosed));
    }
}
