use std::sync::Arc;

use tokio::sync::mpsc;

use crate::{
    db::RecommendationStore,
    error::{AppError, AppResult},
    models::{
        Mode, RecommendationEvent, RecommendationPayload, RecommendationStatus, Strategy,
    },
    services::{
        behavior_index::BehaviorIndex,
        classifier::{classify, StartupClassification},
        metrics::{LastRecommendation, LastRecommendationSlot},
        narration::{apply_reason, Augmenter, NarrationRequest},
        providers::Channel,
        scoring::{Scorer, SequenceScorer, SocialScorer},
    },
};

pub const DEFAULT_TOP_K: usize = 10;
pub const DEFAULT_THRESHOLD: u32 = 5;

/// Events buffered between a run and its consumer
const EVENT_BUFFER: usize = 32;

/// How narration is produced for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NarrationMode {
    /// One timeout-bounded call, no reasoning or text events
    Atomic,
    /// Deltas are forwarded as `reasoning` and `text` events
    #[default]
    Streaming,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecommendationOptions {
    pub top_k: usize,
    pub threshold: u32,
    pub mode: Mode,
    pub use_narration: bool,
    pub narration: NarrationMode,
}

impl Default for RecommendationOptions {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            threshold: DEFAULT_THRESHOLD,
            mode: Mode::Auto,
            use_narration: true,
            narration: NarrationMode::Streaming,
        }
    }
}

/// Selects a strategy, scores candidates and narrates them
#[derive(Clone)]
pub struct Recommender {
    store: Arc<dyn RecommendationStore>,
    behavior: BehaviorIndex,
    sequence: Arc<dyn Scorer>,
    social: Arc<dyn Scorer>,
    augmenter: Augmenter,
    slot: LastRecommendationSlot,
}

impl Recommender {
    pub fn new(
        store: Arc<dyn RecommendationStore>,
        augmenter: Augmenter,
        slot: LastRecommendationSlot,
    ) -> Self {
        Self {
            behavior: BehaviorIndex::new(store.clone()),
            sequence: Arc::new(SequenceScorer::new(store.clone())),
            social: Arc::new(SocialScorer::new(store.clone())),
            store,
            augmenter,
            slot,
        }
    }

    fn scorer(&self, strategy: Strategy) -> &dyn Scorer {
        match strategy {
            Strategy::Sequence => self.sequence.as_ref(),
            Strategy::Social => self.social.as_ref(),
        }
    }

    /// Validates the request and prepares a run
    ///
    /// Unknown users are rejected here, before any event is produced.
    pub async fn start(
        &self,
        user_id: &str,
        options: RecommendationOptions,
    ) -> AppResult<RecommendationRun> {
        if options.top_k == 0 {
            return Err(AppError::InvalidInput("top_k must be at least 1".to_string()));
        }
        if self.store.user(user_id).await?.is_none() {
            return Err(AppError::NotFound(format!("User {} not found", user_id)));
        }

        Ok(RecommendationRun {
            recommender: self.clone(),
            user_id: user_id.to_string(),
            options,
        })
    }

    /// Starts a run on its own task and returns its event stream
    ///
    /// The receiver closes without a `Done` event if the run failed.
    pub async fn stream(
        &self,
        user_id: &str,
        options: RecommendationOptions,
    ) -> AppResult<mpsc::Receiver<RecommendationEvent>> {
        let run = self.start(user_id, options).await?;
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);

        tokio::spawn(async move {
            let user_id = run.user_id.clone();
            if let Err(e) = run.run(tx).await {
                tracing::error!(user_id = %user_id, error = %e, "Recommendation run failed");
            }
        });

        Ok(rx)
    }

    /// Runs to completion and returns the final payload
    pub async fn recommend(
        &self,
        user_id: &str,
        options: RecommendationOptions,
    ) -> AppResult<RecommendationPayload> {
        let run = self.start(user_id, options).await?;
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);

        let (result, events) = tokio::join!(run.run(tx), collect(rx));
        result?;

        final_payload(events)
            .ok_or_else(|| AppError::Internal("Recommendation produced no payload".to_string()))
    }
}

/// Drains a run's events in delivery order
pub async fn collect(mut rx: mpsc::Receiver<RecommendationEvent>) -> Vec<RecommendationEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

/// The update payload if one was emitted, otherwise the initial one
pub fn final_payload(events: Vec<RecommendationEvent>) -> Option<RecommendationPayload> {
    events.into_iter().fold(None, |last, event| match event {
        RecommendationEvent::Initial(payload) | RecommendationEvent::Update(payload) => {
            Some(payload)
        }
        _ => last,
    })
}

enum Phase {
    Classifying,
    Scoring(StartupClassification, Strategy),
    EmitInitial(RecommendationPayload),
    Narrating(RecommendationPayload),
    EmitUpdate(RecommendationPayload),
    Done,
}

/// One validated recommendation request
pub struct RecommendationRun {
    recommender: Recommender,
    user_id: String,
    options: RecommendationOptions,
}

impl RecommendationRun {
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Drives the run to `Done`, sending every event in protocol order
    ///
    /// If the receiver goes away the run stops, either at the next send or
    /// while waiting on the oracle, and the narration stream is dropped.
    pub async fn run(self, events: mpsc::Sender<RecommendationEvent>) -> AppResult<()> {
        let mut phase = Phase::Classifying;

        loop {
            phase = match phase {
                Phase::Classifying => {
                    let classification = classify(
                        &self.recommender.behavior,
                        &self.user_id,
                        self.options.threshold,
                    )
                    .await?;
                    let strategy = self.options.mode.resolve(classification.startup_type);
                    Phase::Scoring(classification, strategy)
                }
                Phase::Scoring(classification, strategy) => {
                    let items = self
                        .recommender
                        .scorer(strategy)
                        .score(&self.user_id, self.options.top_k)
                        .await?;
                    let status = if !self.options.use_narration || items.is_empty() {
                        RecommendationStatus::Completed
                    } else {
                        RecommendationStatus::Calculating
                    };

                    tracing::info!(
                        user_id = %self.user_id,
                        startup_type = %classification.startup_type,
                        behavior_count = classification.behavior_count,
                        strategy = %strategy,
                        candidates = items.len(),
                        "Candidates scored"
                    );

                    Phase::EmitInitial(RecommendationPayload {
                        user_id: self.user_id.clone(),
                        startup_type: classification.startup_type,
                        behavior_count: classification.behavior_count,
                        strategy,
                        items,
                        summary: strategy.summary().to_string(),
                        status,
                    })
                }
                Phase::EmitInitial(payload) => {
                    let completed = payload.status == RecommendationStatus::Completed;
                    if completed {
                        self.remember(&payload).await;
                    }
                    let next = if completed {
                        Phase::Done
                    } else {
                        Phase::Narrating(payload.clone())
                    };
                    if !self.emit(&events, RecommendationEvent::Initial(payload)).await {
                        return Ok(());
                    }
                    next
                }
                Phase::Narrating(mut payload) => {
                    let request =
                        NarrationRequest::for_candidates(&self.user_id, payload.strategy, &payload.items);

                    let reason = match self.options.narration {
                        NarrationMode::Atomic => {
                            tokio::select! {
                                reason = self.recommender.augmenter.justify(&request) => reason,
                                _ = events.closed() => {
                                    self.disconnected("narrating");
                                    return Ok(());
                                }
                            }
                        }
                        NarrationMode::Streaming => {
                            let mut narration = tokio::select! {
                                narration = self.recommender.augmenter.narrate(&request) => narration,
                                _ = events.closed() => {
                                    self.disconnected("narrating");
                                    return Ok(());
                                }
                            };
                            // A pending delta must not outlive the caller
                            loop {
                                let delta = tokio::select! {
                                    delta = narration.next() => delta,
                                    _ = events.closed() => {
                                    self.disconnected("narrating");
                                    return Ok(());
                                }
                                };
                                let Some(delta) = delta else {
                                    break;
                                };
                                let event = match delta.channel {
                                    Channel::Reasoning => RecommendationEvent::Reasoning(delta.content),
                                    Channel::Text => RecommendationEvent::Text(delta.content),
                                };
                                if !self.emit(&events, event).await {
                                    return Ok(());
                                }
                            }
                            narration.finish()
                        }
                    };

                    apply_reason(&mut payload.items, &reason);
                    payload.status = RecommendationStatus::Completed;
                    Phase::EmitUpdate(payload)
                }
                Phase::EmitUpdate(payload) => {
                    self.remember(&payload).await;
                    if !self.emit(&events, RecommendationEvent::Update(payload)).await {
                        return Ok(());
                    }
                    Phase::Done
                }
                Phase::Done => {
                    self.emit(&events, RecommendationEvent::Done).await;
                    tracing::debug!(user_id = %self.user_id, "Recommendation run done");
                    return Ok(());
                }
            };
        }
    }

    /// Sends one event; `false` once the caller is gone
    async fn emit(
        &self,
        events: &mpsc::Sender<RecommendationEvent>,
        event: RecommendationEvent,
    ) -> bool {
        let name = event.name();
        match events.send(event).await {
            Ok(()) => true,
            Err(_) => {
                self.disconnected(name);
                false
            }
        }
    }

    fn disconnected(&self, stage: &str) {
        tracing::info!(
            user_id = %self.user_id,
            stage = stage,
            "Caller disconnected, stopping recommendation run"
        );
    }

    async fn remember(&self, payload: &RecommendationPayload) {
        self.recommender
            .slot
            .store(LastRecommendation {
                user_id: payload.user_id.clone(),
                strategy: payload.strategy,
                items: payload.items.clone(),
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use futures::{stream, StreamExt};
    use tokio::sync::oneshot;

    use crate::db::{MemoryStore, Snapshot};
    use crate::models::{EdgeKind, Interaction, Item, SocialEdge, StartupType, User};
    use crate::services::providers::{
        DeltaStream, MockNarrationOracle, NarrationDelta, NarrationOracle, OracleError,
    };

    fn store() -> Arc<dyn RecommendationStore> {
        let mut interactions: Vec<Interaction> = ["a", "b", "a", "b", "a", "b", "a"]
            .iter()
            .enumerate()
            .map(|(ts, item)| Interaction::new("hot", *item, ts as i64))
            .collect();
        interactions.extend((0..3).map(|ts| Interaction::new("cold", "c", 100 + ts)));

        Arc::new(MemoryStore::from_snapshot(Snapshot {
            users: vec![
                User::new("hot", "Hot User"),
                User::new("cold", "Cold User"),
                User::new("idle", "Idle User"),
            ],
            items: vec![
                Item::new("a", "Keyboard", &["Electronics", "Keyboards"]),
                Item::new("b", "Mouse", &["Electronics", "Mice"]),
                Item::new("c", "Headphones", &["Electronics", "Audio"]),
                Item::new("d", "Mouse Pad", &["Electronics", "Mice"]),
                Item::new("e", "Keycaps", &["Electronics", "Keyboards"]),
            ],
            interactions,
            social_edges: vec![SocialEdge::new("cold", "hot", 0.5, EdgeKind::Follow)],
        }))
    }

    fn scripted_oracle() -> MockNarrationOracle {
        let mut oracle = MockNarrationOracle::new();
        oracle.expect_name().return_const("scripted");
        oracle
            .expect_complete()
            .returning(|_, _| Ok("Picked for you".to_string()));
        oracle.expect_stream().returning(|_, _| {
            Ok(stream::iter(vec![
                Ok(NarrationDelta::reasoning("considering")),
                Ok(NarrationDelta::text("Picked ")),
                Ok(NarrationDelta::text("for you")),
            ])
            .boxed())
        });
        oracle
    }

    /// Oracle that never answers within the test timeouts
    struct StalledOracle;

    #[async_trait::async_trait]
    impl NarrationOracle for StalledOracle {
        async fn complete(&self, _: &str, _: &str) -> Result<String, OracleError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("late".to_string())
        }

        async fn stream(&self, _: &str, _: &str) -> Result<DeltaStream, OracleError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(stream::empty().boxed())
        }

        fn name(&self) -> &'static str {
            "stalled"
        }
    }

    fn recommender_with(oracle: impl NarrationOracle + 'static) -> Recommender {
        let augmenter = Augmenter::new(
            Arc::new(oracle),
            Duration::from_millis(50),
            Duration::from_millis(50),
        );
        Recommender::new(store(), augmenter, LastRecommendationSlot::new())
    }

    async fn events_for(
        recommender: &Recommender,
        user_id: &str,
        options: RecommendationOptions,
    ) -> Vec<RecommendationEvent> {
        let rx = recommender.stream(user_id, options).await.unwrap();
        collect(rx).await
    }

    fn names(events: &[RecommendationEvent]) -> Vec<&'static str> {
        events.iter().map(|e| e.name()).collect()
    }

    fn payload(event: &RecommendationEvent) -> &RecommendationPayload {
        match event {
            RecommendationEvent::Initial(p) | RecommendationEvent::Update(p) => p,
            other => panic!("expected a payload event, got {}", other.name()),
        }
    }

    #[tokio::test]
    async fn test_cold_user_is_served_by_social() {
        let recommender = recommender_with(scripted_oracle());
        let options = RecommendationOptions {
            use_narration: false,
            ..Default::default()
        };
        let result = recommender.recommend("cold", options).await.unwrap();
        assert_eq!(result.startup_type, StartupType::Cold);
        assert_eq!(result.behavior_count, 3);
        assert_eq!(result.strategy, Strategy::Social);
        assert!(result.items.iter().all(|c| c.source == Strategy::Social));
    }

    #[tokio::test]
    async fn test_mode_override_wins() {
        let recommender = recommender_with(scripted_oracle());

        let social = RecommendationOptions {
            mode: Mode::Social,
            use_narration: false,
            ..Default::default()
        };
        let result = recommender.recommend("hot", social).await.unwrap();
        assert_eq!(result.startup_type, StartupType::Hot);
        assert_eq!(result.strategy, Strategy::Social);

        let sequence = RecommendationOptions {
            mode: Mode::Sequence,
            use_narration: false,
            ..Default::default()
        };
        let result = recommender.recommend("hot", sequence).await.unwrap();
        assert_eq!(result.strategy, Strategy::Sequence);
        assert_eq!(result.summary, Strategy::Sequence.summary());
    }

    #[tokio::test]
    async fn test_top_k_three_with_two_eligible() {
        let store: Arc<dyn RecommendationStore> = Arc::new(MemoryStore::from_snapshot(Snapshot {
            users: vec![User::new("u1", "")],
            items: vec![
                Item::new("a", "A", &["X"]),
                Item::new("b", "B", &["X"]),
                Item::new("c", "C", &["Y"]),
                Item::new("d", "D", &["Y"]),
            ],
            interactions: (0..6)
                .map(|ts| Interaction::new("u1", ["a", "b"][ts as usize % 2], ts))
                .collect(),
            ..Snapshot::default()
        }));
        let augmenter = Augmenter::new(
            Arc::new(scripted_oracle()),
            Duration::from_millis(50),
            Duration::from_millis(50),
        );
        let recommender = Recommender::new(store, augmenter, LastRecommendationSlot::new());
        let options = RecommendationOptions {
            top_k: 3,
            ..Default::default()
        };

        let result = recommender.recommend("u1", options).await.unwrap();
        assert_eq!(result.strategy, Strategy::Sequence);
        let ids: Vec<&str> = result.items.iter().map(|c| c.item_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "d"]);
        assert_eq!(result.status, RecommendationStatus::Completed);
    }

    #[tokio::test]
    async fn test_rejects_unknown_user_and_zero_top_k() {
        let recommender = recommender_with(scripted_oracle());
        let err = recommender
            .stream("ghost", RecommendationOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let options = RecommendationOptions {
            top_k: 0,
            ..Default::default()
        };
        let err = recommender.recommend("hot", options).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_narration_disabled_emits_initial_then_done() {
        let recommender = recommender_with(scripted_oracle());
        let options = RecommendationOptions {
            use_narration: false,
            ..Default::default()
        };
        let events = events_for(&recommender, "hot", options).await;
        assert_eq!(names(&events), vec!["initial", "done"]);
        assert_eq!(payload(&events[0]).status, RecommendationStatus::Completed);
    }

    #[tokio::test]
    async fn test_streaming_protocol_order_and_concatenation() {
        let recommender = recommender_with(scripted_oracle());
        let events = events_for(&recommender, "hot", RecommendationOptions::default()).await;
        assert_eq!(
            names(&events),
            vec!["initial", "reasoning", "text", "text", "update", "done"]
        );
        assert_eq!(payload(&events[0]).status, RecommendationStatus::Calculating);

        let streamed: String = events
            .iter()
            .filter_map(|e| match e {
                RecommendationEvent::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect();
        let update = payload(&events[4]);
        assert_eq!(update.status, RecommendationStatus::Completed);
        assert!(!update.items.is_empty());
        assert!(update.items.iter().all(|c| c.reason == streamed));
        // Scores and order are untouched by narration
        let initial_ids: Vec<&str> =
            payload(&events[0]).items.iter().map(|c| c.item_id.as_str()).collect();
        let update_ids: Vec<&str> = update.items.iter().map(|c| c.item_id.as_str()).collect();
        assert_eq!(initial_ids, update_ids);
    }

    #[tokio::test]
    async fn test_atomic_narration_applies_one_reason() {
        let recommender = recommender_with(scripted_oracle());
        let options = RecommendationOptions {
            narration: NarrationMode::Atomic,
            ..Default::default()
        };
        let events = events_for(&recommender, "cold", options).await;
        assert_eq!(names(&events), vec!["initial", "update", "done"]);
        assert!(payload(&events[1])
            .items
            .iter()
            .all(|c| c.reason == "Picked for you"));
    }

    #[tokio::test]
    async fn test_oracle_timeout_falls_back_to_first_reason() {
        for narration in [NarrationMode::Atomic, NarrationMode::Streaming] {
            let recommender = recommender_with(StalledOracle);
            let options = RecommendationOptions {
                narration,
                ..Default::default()
            };
            let events = events_for(&recommender, "hot", options).await;
            assert_eq!(names(&events), vec!["initial", "update", "done"]);

            let fallback = payload(&events[0]).items[0].reason.clone();
            let update = payload(&events[1]);
            assert_eq!(update.status, RecommendationStatus::Completed);
            assert!(update.items.iter().all(|c| c.reason == fallback));
        }
    }

    #[tokio::test]
    async fn test_unavailable_oracle_falls_back() {
        let mut oracle = MockNarrationOracle::new();
        oracle.expect_name().return_const("off");
        oracle
            .expect_stream()
            .returning(|_, _| Err(OracleError::Unavailable));
        let recommender = recommender_with(oracle);
        let result = recommender
            .recommend(
                "hot",
                RecommendationOptions {
                    narration: NarrationMode::Streaming,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(result
            .items
            .iter()
            .all(|c| c.reason == Strategy::Sequence.default_reason()));
    }

    #[tokio::test]
    async fn test_empty_candidates_complete_without_narration() {
        let augmenter = Augmenter::new(
            Arc::new(scripted_oracle()),
            Duration::from_millis(50),
            Duration::from_millis(50),
        );
        let store: Arc<dyn RecommendationStore> = Arc::new(MemoryStore::from_snapshot(Snapshot {
            users: vec![User::new("idle", "")],
            ..Snapshot::default()
        }));
        let recommender = Recommender::new(store, augmenter, LastRecommendationSlot::new());
        let events = events_for(&recommender, "idle", RecommendationOptions::default()).await;
        assert_eq!(names(&events), vec!["initial", "done"]);
        let initial = payload(&events[0]);
        assert!(initial.items.is_empty());
        assert_eq!(initial.status, RecommendationStatus::Completed);
    }

    #[tokio::test]
    async fn test_run_writes_last_recommendation_slot() {
        let slot = LastRecommendationSlot::new();
        let augmenter = Augmenter::new(
            Arc::new(scripted_oracle()),
            Duration::from_millis(50),
            Duration::from_millis(50),
        );
        let recommender = Recommender::new(store(), augmenter, slot.clone());
        let result = recommender
            .recommend("hot", RecommendationOptions::default())
            .await
            .unwrap();

        let last = slot.get().await.unwrap();
        assert_eq!(last.user_id, "hot");
        assert_eq!(last.items, result.items);
    }

    #[tokio::test]
    async fn test_dropped_receiver_stops_run() {
        let recommender = recommender_with(scripted_oracle());
        let run = recommender
            .start("hot", RecommendationOptions::default())
            .await
            .unwrap();
        assert_eq!(run.user_id(), "hot");

        let (tx, mut rx) = mpsc::channel(1);
        let handle = tokio::spawn(run.run(tx));
        let first = rx.recv().await.unwrap();
        assert_eq!(first.name(), "initial");
        drop(rx);

        assert!(handle.await.unwrap().is_ok());
    }

    /// Signals when the oracle stream holding it is dropped
    struct ReleaseGuard(Option<oneshot::Sender<()>>);

    impl Drop for ReleaseGuard {
        fn drop(&mut self) {
            if let Some(tx) = self.0.take() {
                let _ = tx.send(());
            }
        }
    }

    /// Oracle that sends one text delta and then hangs
    struct HangingOracle {
        released: std::sync::Mutex<Option<oneshot::Sender<()>>>,
    }

    #[async_trait::async_trait]
    impl NarrationOracle for HangingOracle {
        async fn complete(&self, _: &str, _: &str) -> Result<String, OracleError> {
            Err(OracleError::Unavailable)
        }

        async fn stream(&self, _: &str, _: &str) -> Result<DeltaStream, OracleError> {
            let guard = ReleaseGuard(self.released.lock().unwrap().take());
            let hang = stream::pending::<Result<NarrationDelta, OracleError>>().map(move |delta| {
                let _held = &guard;
                delta
            });
            Ok(stream::iter(vec![Ok(NarrationDelta::text("Picked "))])
                .chain(hang)
                .boxed())
        }

        fn name(&self) -> &'static str {
            "hanging"
        }
    }

    #[tokio::test]
    async fn test_disconnect_releases_pending_narration() {
        let (released_tx, released_rx) = oneshot::channel();
        let oracle = HangingOracle {
            released: std::sync::Mutex::new(Some(released_tx)),
        };
        let augmenter = Augmenter::new(
            Arc::new(oracle),
            Duration::from_secs(1),
            Duration::from_secs(30),
        );
        let recommender = Recommender::new(store(), augmenter, LastRecommendationSlot::new());
        let run = recommender
            .start("hot", RecommendationOptions::default())
            .await
            .unwrap();

        let (tx, mut rx) = mpsc::channel(1);
        let handle = tokio::spawn(run.run(tx));
        assert_eq!(rx.recv().await.unwrap().name(), "initial");
        assert_eq!(rx.recv().await.unwrap().name(), "text");
        drop(rx);

        let released = tokio::time::timeout(Duration::from_millis(500), released_rx).await;
        assert!(released.is_ok(), "narration stream still held after disconnect");
        let finished = tokio::time::timeout(Duration::from_millis(500), handle).await;
        assert!(finished.unwrap().unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_final_payload_prefers_update() {
        let recommender = recommender_with(scripted_oracle());
        let events = events_for(&recommender, "hot", RecommendationOptions::default()).await;
        let update = payload(&events[4]).clone();
        assert_eq!(final_payload(events), Some(update));
        assert!(final_payload(vec![RecommendationEvent::Done]).is_none());
    }
}
