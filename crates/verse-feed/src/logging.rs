use tokio::sync::broadcast;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use verse_proto::protocol::Broadcast;

/// A tracing layer that forwards warnings and errors to feed clients as
/// `Broadcast::Log` messages.
pub struct BroadcastLayer {
    sender: broadcast::Sender<Broadcast>,
}

impl BroadcastLayer {
    pub fn new(sender: broadcast::Sender<Broadcast>) -> Self {
        Self { sender }
    }
}

impl<S> tracing_subscriber::Layer<S> for BroadcastLayer
where
    S: tracing::Subscriber,
{
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        // Only WARN and ERROR, to keep the channel quiet
        let level = event.metadata().level();
        if !matches!(*level, tracing::Level::WARN | tracing::Level::ERROR) {
            return;
        }

        let mut message = format!("{} [{}] ", chrono::Local::now().format("%H:%M:%S"), level);
        let mut visitor = MessageVisitor(&mut message);
        event.record(&mut visitor);

        // No receivers is fine
        let _ = self.sender.send(Broadcast::Log { message });
    }
}

struct MessageVisitor<'a>(&'a mut String);

impl tracing::field::Visit for MessageVisitor<'_> {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0.push_str(&format!("{:?}", value));
        } else {
            self.0.push_str(&format!(" {}={:?}", field.name(), value));
        }
    }
}

/// Install the global subscriber: an append-only log file, the broadcast
/// layer, and a `RUST_LOG` filter defaulting to `info,verse_feed=debug`.
pub fn init(broadcast_tx: broadcast::Sender<Broadcast>) -> anyhow::Result<std::path::PathBuf> {
    let data_dir = verse_proto::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = verse_proto::platform::log_path();

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(BroadcastLayer::new(broadcast_tx))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,verse_feed=debug")),
        )
        .init();

    Ok(log_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::layer::SubscriberExt;

    #[test]
    fn test_forwards_only_warnings_and_errors() {
        let (tx, mut rx) = broadcast::channel(8);
        let subscriber = tracing_subscriber::registry().with(BroadcastLayer::new(tx));
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("quiet");
            tracing::warn!(slot = 4, "remote degraded");
        });

        match rx.try_recv() {
            Ok(Broadcast::Log { message }) => {
                assert!(message.contains("[WARN]"));
                assert!(message.contains("remote degraded"));
                assert!(message.contains("slot=4"));
            }
            other => panic!("expected a log broadcast, got {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }
}
