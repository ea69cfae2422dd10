//! Source-switch coordinator.
//!
//! A session is one pool plus one slot array bound to a source mode. Switching
//! mode drops the whole session and starts a fresh one at cursor 0 under a
//! new generation; nothing carries over. Fetches are tagged with the
//! generation they were issued under so late results can be recognised.

use tracing::info;
use verse_proto::config::FeedConfig;
use verse_proto::protocol::SourceMode;

use crate::controller::WindowController;

#[derive(Debug)]
pub struct FeedSession {
    generation: u64,
    mode: SourceMode,
    controller: WindowController,
}

impl FeedSession {
    fn new(generation: u64, mode: SourceMode, config: FeedConfig) -> Self {
        Self {
            generation,
            mode,
            controller: WindowController::new(config),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn mode(&self) -> SourceMode {
        self.mode
    }

    pub fn controller(&self) -> &WindowController {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut WindowController {
        &mut self.controller
    }
}

#[derive(Debug)]
pub struct SourceSwitch {
    config: FeedConfig,
    session: FeedSession,
}

impl SourceSwitch {
    pub fn new(config: FeedConfig, mode: SourceMode) -> Self {
        let session = FeedSession::new(1, mode, config.clone());
        Self { config, session }
    }

    pub fn session(&self) -> &FeedSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut FeedSession {
        &mut self.session
    }

    pub fn generation(&self) -> u64 {
        self.session.generation
    }

    pub fn mode(&self) -> SourceMode {
        self.session.mode
    }

    /// Replace the session with an empty one for `mode`. Returns the new
    /// generation, or `None` if `mode` is already active.
    pub fn switch_to(&mut self, mode: SourceMode) -> Option<u64> {
        if mode == self.session.mode {
            return None;
        }
        let generation = self.session.generation + 1;
        info!(
            "[switch] {} -> {} (generation {})",
            self.session.mode, mode, generation
        );
        self.session = FeedSession::new(generation, mode, self.config.clone());
        Some(generation)
    }

    /// Whether a result issued under `generation` still belongs here.
    pub fn accepts(&self, generation: u64) -> bool {
        generation == self.session.generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use verse_proto::{Item, ItemId};

    fn config() -> FeedConfig {
        FeedConfig {
            capacity: 100,
            evict_distance: 12,
            ..FeedConfig::default()
        }
    }

    #[test]
    fn test_switch_discards_pool_slots_and_cursor() {
        let mut switch = SourceSwitch::new(config(), SourceMode::Local);
        let first = switch.generation();
        {
            let c = switch.session_mut().controller_mut();
            c.accept_batch(
                (0..20)
                    .map(|i| Item::new(ItemId::Local(i), format!("Poem {}", i), "Anon", ""))
                    .collect(),
            );
            c.move_to(40).unwrap();
            assert!(c.slots().filled_count() > 0);
        }

        let next = switch.switch_to(SourceMode::Hybrid).unwrap();
        assert!(next > first);
        assert_eq!(switch.mode(), SourceMode::Hybrid);
        let c = switch.session().controller();
        assert_eq!(c.cursor(), 0);
        assert!(c.pool().is_empty());
        assert_eq!(c.slots().filled_count(), 0);
        assert_eq!(c.slots().loading_count(), 0);
    }

    #[test]
    fn test_stale_generation_rejected() {
        let mut switch = SourceSwitch::new(config(), SourceMode::Hybrid);
        let old = switch.generation();
        assert!(switch.accepts(old));
        switch.switch_to(SourceMode::Remote);
        assert!(!switch.accepts(old));
        assert!(switch.accepts(switch.generation()));
    }

    #[test]
    fn test_same_mode_is_noop() {
        let mut switch = SourceSwitch::new(config(), SourceMode::Local);
        switch.session_mut().controller_mut().move_to(5).unwrap();
        assert_eq!(switch.switch_to(SourceMode::Local), None);
        assert_eq!(switch.session().controller().cursor(), 5);
    }
}
