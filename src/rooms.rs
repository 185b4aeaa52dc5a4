//! Independent sessions keyed by room name.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use image::RgbImage;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::frame::{decode_frame, Frame};
use crate::pipeline::{FrameOutcome, Session, SessionState};
use crate::segmentation::SegmentationModel;

/// Builds the segmentation model for a newly created room.
pub type ModelFactory =
    Box<dyn Fn() -> anyhow::Result<Option<Box<dyn SegmentationModel>>> + Send + Sync>;

/// Registry of per-room sessions.
///
/// Each room has its own lock, so different rooms process frames
/// concurrently while frames for one room are serialized.
pub struct SessionRegistry {
    config: PipelineConfig,
    factory: ModelFactory,
    rooms: Mutex<HashMap<String, Arc<Mutex<Session>>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // Fusion is published in one assignment, so background, ink and canvas
    // stay consistent with each other after a panic.
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SessionRegistry {
    pub fn new<F>(config: PipelineConfig, factory: F) -> Self
    where
        F: Fn() -> anyhow::Result<Option<Box<dyn SegmentationModel>>> + Send + Sync + 'static,
    {
        Self {
            config,
            factory: Box::new(factory),
            rooms: Mutex::new(HashMap::new()),
        }
    }

    fn get(&self, room: &str) -> Option<Arc<Mutex<Session>>> {
        lock(&self.rooms).get(room).cloned()
    }

    fn get_or_create(&self, room: &str) -> Result<Arc<Mutex<Session>>, PipelineError> {
        if let Some(session) = self.get(room) {
            return Ok(session);
        }

        // Model loading can be slow; keep the registry unlocked meanwhile.
        let model = (self.factory)().map_err(PipelineError::processing)?;
        let session = Arc::new(Mutex::new(Session::new(self.config.clone(), model)));

        let mut rooms = lock(&self.rooms);
        let entry = rooms.entry(room.to_string()).or_insert_with(|| {
            tracing::info!(room, "created session");
            session
        });
        Ok(Arc::clone(entry))
    }

    /// Submit a decoded frame to `room`, creating the room on first use.
    pub fn submit(&self, room: &str, frame: Frame) -> Result<FrameOutcome, PipelineError> {
        let session = self.get_or_create(room)?;
        let _span = tracing::debug_span!("room", room).entered();
        let outcome = lock(&session).submit_frame(frame);
        outcome
    }

    /// Decode and submit. A decode failure does not create the room.
    pub fn submit_encoded(&self, room: &str, bytes: &[u8]) -> Result<FrameOutcome, PipelineError> {
        let frame = decode_frame(bytes)?;
        self.submit(room, frame)
    }

    /// `None` for an unknown room or one without a canvas yet.
    pub fn current_canvas(&self, room: &str) -> Option<Arc<RgbImage>> {
        let session = self.get(room)?;
        let canvas = lock(&session).current_canvas();
        canvas
    }

    pub fn state(&self, room: &str) -> Option<SessionState> {
        let session = self.get(room)?;
        let state = lock(&session).state();
        Some(state)
    }

    /// Reset a room's session. Unknown rooms are a no-op.
    pub fn reset(&self, room: &str) {
        if let Some(session) = self.get(room) {
            lock(&session).reset();
        }
    }

    /// Drop a room entirely. Returns whether it existed.
    pub fn remove(&self, room: &str) -> bool {
        let removed = lock(&self.rooms).remove(room).is_some();
        if removed {
            tracing::info!(room, "removed session");
        }
        removed
    }

    /// Room names, sorted.
    pub fn rooms(&self) -> Vec<String> {
        let mut names: Vec<String> = lock(&self.rooms).keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn registry() -> SessionRegistry {
        SessionRegistry::new(PipelineConfig::default(), || Ok(None))
    }

    fn white() -> Frame {
        RgbImage::from_pixel(160, 120, Rgb([255, 255, 255]))
    }

    #[test]
    fn rooms_are_created_lazily_and_independently() {
        let registry = registry();
        assert!(registry.rooms().is_empty());
        assert_eq!(registry.state("a"), None);

        let outcome = registry.submit("a", white()).unwrap();
        assert!(matches!(outcome, FrameOutcome::ReferenceEstablished { .. }));
        assert_eq!(registry.state("a"), Some(SessionState::ReferenceSet));

        registry.submit("b", white()).unwrap();
        registry.reset("a");
        assert_eq!(registry.state("a"), Some(SessionState::Empty));
        assert_eq!(registry.state("b"), Some(SessionState::ReferenceSet));
        assert_eq!(registry.rooms(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn unknown_rooms_are_harmless() {
        let registry = registry();
        registry.reset("nowhere");
        assert!(registry.current_canvas("nowhere").is_none());
        assert!(!registry.remove("nowhere"));
        assert!(registry.rooms().is_empty());
    }

    #[test]
    fn remove_forgets_the_room() {
        let registry = registry();
        registry.submit("a", white()).unwrap();
        assert!(registry.remove("a"));
        assert_eq!(registry.state("a"), None);
    }

    #[test]
    fn failed_model_load_does_not_create_room() {
        let registry = SessionRegistry::new(PipelineConfig::default(), || {
            Err(anyhow::anyhow!("model file missing"))
        });
        let err = registry.submit("a", white()).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::ProcessingFailure(ref msg) if msg.contains("missing")
        ));
        assert!(registry.rooms().is_empty());
    }

    #[test]
    fn undecodable_bytes_do_not_create_room() {
        let registry = registry();
        let err = registry.submit_encoded("a", b"garbage").unwrap_err();
        assert!(matches!(err, PipelineError::DecodeFailure(_)));
        assert!(registry.rooms().is_empty());
    }

    #[test]
    fn rooms_accept_frames_from_many_threads() {
        let registry = registry();
        std::thread::scope(|scope| {
            for room in ["r0", "r1", "r2", "r3"] {
                let registry = &registry;
                scope.spawn(move || {
                    registry.submit(room, white()).unwrap();
                    registry.submit(room, white()).unwrap();
                });
            }
        });
        assert_eq!(registry.rooms().len(), 4);
        for room in registry.rooms() {
            assert_eq!(registry.state(&room), Some(SessionState::ReferenceSet));
        }
    }

    /// Panics inside the model on its first call, then reports nobody.
    struct PanicsOnce {
        calls: usize,
    }

    impl SegmentationModel for PanicsOnce {
        fn detect(
            &mut self,
            _frame: &RgbImage,
            _min_confidence: f32,
        ) -> anyhow::Result<Vec<crate::segmentation::Segment>> {
            self.calls += 1;
            if self.calls == 1 {
                panic!("inference crashed");
            }
            Ok(Vec::new())
        }

        fn name(&self) -> &'static str {
            "panics-once"
        }

        fn input_size(&self) -> (u32, u32) {
            (0, 0)
        }
    }

    #[test]
    fn room_survives_a_panicking_frame() {
        let registry = SessionRegistry::new(PipelineConfig::default(), || {
            Ok(Some(Box::new(PanicsOnce { calls: 0 }) as Box<dyn SegmentationModel>))
        });
        registry.submit("a", white()).unwrap();

        let crashed = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            registry.submit("a", white())
        }));
        assert!(crashed.is_err());

        assert_eq!(registry.state("a"), Some(SessionState::ReferenceSet));
        assert!(registry.current_canvas("a").is_none());
        assert!(matches!(
            registry.submit("a", white()).unwrap(),
            FrameOutcome::NoPerson {
                person_pixels: 0,
                ..
            }
        ));
    }
}
