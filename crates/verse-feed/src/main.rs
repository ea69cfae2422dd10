use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{info, warn};
use verse_feed::core::{FeedCore, FeedEvent};
use verse_feed::http::{self, HttpState};
use verse_feed::{logging, SourceRouter};
use verse_proto::config::Config;
use verse_proto::local::LocalCorpus;
use verse_proto::protocol::Broadcast;
use verse_proto::remote::RemoteCorpus;
use verse_proto::CorpusSource;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Broadcast channel first so the logging layer can use it
    let (broadcast_tx, _) = broadcast::channel::<Broadcast>(256);

    let log_path = logging::init(broadcast_tx.clone())?;
    info!("Log file: {:?}", log_path);

    let config = Config::load()?;
    info!("Config loaded from: {:?}", Config::config_path());

    let local: Arc<dyn CorpusSource> = match LocalCorpus::load(&config.local.corpus_path) {
        Ok(corpus) => Arc::new(corpus),
        Err(e) => {
            warn!(
                "Local corpus unavailable at {}: {:#}; starting empty",
                config.local.corpus_path.display(),
                e
            );
            Arc::new(LocalCorpus::new(Vec::new()))
        }
    };

    let remote: Option<Arc<dyn CorpusSource>> = if config.remote.enabled {
        match RemoteCorpus::new(&config.remote) {
            Ok(corpus) => Some(Arc::new(corpus)),
            Err(e) => {
                warn!("Remote corpus disabled: {:#}", e);
                None
            }
        }
    } else {
        None
    };

    let router = Arc::new(SourceRouter::new(
        local,
        remote,
        config.remote.degraded_after,
        config.remote.degraded_cooldown(),
    ));

    // Event channel: all external inputs funnel into FeedCore
    let (event_tx, event_rx) = tokio::sync::mpsc::channel::<FeedEvent>(256);

    let feed_core = FeedCore::new(
        config.feed.clone(),
        router,
        broadcast_tx.clone(),
        event_tx.clone(),
    );

    if config.http.enabled {
        let _http_handle = http::start_server(
            config.http.bind_address.clone(),
            config.http.port,
            HttpState::new(feed_core.snapshot(), event_tx.clone(), feed_core.router()),
        );
    }

    info!("Feed initialised, running event loop");
    feed_core.run(event_rx).await?;

    Ok(())
}
