//! Fetch/synthesize/present orchestration with state machine.
//!
//! IDLE → LOADING → TEXT_READY → COMPLETE, or → FAILED
//!
//! Readings are published as soon as the text arrives; the audio clip is
//! attached in a second publish once synthesis and encoding finish. Only
//! the most recent invocation may publish, and a superseded invocation
//! releases whatever clip it produced.

use std::sync::{Mutex, MutexGuard};

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::audio::{
    decode_base64, encode_wav, WavInfo, TTS_BITS_PER_SAMPLE, TTS_CHANNELS, TTS_SAMPLE_RATE,
};
use crate::config::{Config, DisplayConfig, VoicesConfig};
use crate::gemini::{FetchError, ReadingsSource, SpeechSynthesizer, VoiceBinding};
use crate::model::LiturgicalDay;
use crate::script::build_script;
use crate::store::{AudioHandle, AudioStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Loading,
    /// Text published, audio still pending.
    TextReady,
    Complete,
    Failed,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::Loading => write!(f, "LOADING"),
            Self::TextReady => write!(f, "TEXT_READY"),
            Self::Complete => write!(f, "COMPLETE"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// Everything the presentation layer observes.
#[derive(Debug, Clone, Serialize)]
pub struct DisplayState {
    pub phase: Phase,
    pub readings: Option<LiturgicalDay>,
    pub loading: bool,
    pub error: Option<String>,
    pub title: String,
}

impl DisplayState {
    fn idle(title: &str) -> Self {
        Self {
            phase: Phase::Idle,
            readings: None,
            loading: false,
            error: None,
            title: title.to_string(),
        }
    }
}

#[derive(Debug, Error)]
enum PresentError {
    #[error("text fetch failed: {0}")]
    TextFetchFailed(#[from] FetchError),
    #[error("orchestration failed: {0}")]
    OrchestrationFailed(String),
}

struct Session {
    /// Bumped by every invocation and by teardown.
    generation: u64,
    owned: Option<AudioHandle>,
}

pub struct Orchestrator<R, S> {
    readings: R,
    speech: S,
    store: AudioStore,
    voices: VoicesConfig,
    bindings: Vec<VoiceBinding>,
    display: DisplayConfig,
    session: Mutex<Session>,
    state: watch::Sender<DisplayState>,
}

impl<R, S> Orchestrator<R, S> {
    fn lock_session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn store(&self) -> &AudioStore {
        &self.store
    }

    /// Snapshot of the published state.
    pub fn state(&self) -> DisplayState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<DisplayState> {
        self.state.subscribe()
    }

    /// End the session: release the owned clip and invalidate any pass
    /// still in flight. Safe to call more than once.
    pub fn teardown(&self) {
        let mut session = self.lock_session();
        session.generation += 1;
        if let Some(handle) = session.owned.take() {
            self.store.release(&handle);
            info!("Session closed, released audio clip {}", handle.id);
        }
        self.state
            .send_replace(DisplayState::idle(&self.display.title_prefix));
    }

    /// Apply `update` to the published state if `generation` is still current.
    fn publish(&self, generation: u64, update: impl FnOnce(&mut DisplayState)) -> bool {
        let session = self.lock_session();
        if session.generation != generation {
            debug!("Invocation {generation} superseded, not publishing");
            return false;
        }
        self.state.send_modify(update);
        true
    }
}

impl<R, S> Drop for Orchestrator<R, S> {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl<R: ReadingsSource, S: SpeechSynthesizer> Orchestrator<R, S> {
    pub fn new(readings: R, speech: S, store: AudioStore, config: &Config) -> Self {
        let (state, _) = watch::channel(DisplayState::idle(&config.display.title_prefix));
        Self {
            readings,
            speech,
            store,
            voices: config.voices.clone(),
            bindings: config.voices.bindings(),
            display: config.display.clone(),
            session: Mutex::new(Session {
                generation: 0,
                owned: None,
            }),
            state,
        }
    }

    /// Fetch, narrate and publish the readings for `date`.
    ///
    /// Never fails: outcomes are observed through [`Orchestrator::state`].
    pub async fn present(&self, date: NaiveDate) {
        let generation = self.begin();

        let previous = self.state.borrow().phase;
        self.publish(generation, |s| {
            s.phase = Phase::Loading;
            s.readings = None;
            s.error = None;
            s.loading = true;
        });
        info!("State: {previous} → LOADING ({date})");

        if let Err(e) = self.run(generation, date).await {
            warn!("Presenting {date} failed: {e}");
            let published = self.publish(generation, |s| {
                s.phase = Phase::Failed;
                s.readings = None;
                s.loading = false;
                s.error = Some(self.display.error_message.clone());
                s.title = self.display.error_title.clone();
            });
            if published {
                info!("State: → FAILED");
            }
        }
    }

    /// Start a new invocation: take a generation and drop the previous clip.
    fn begin(&self) -> u64 {
        let mut session = self.lock_session();
        session.generation += 1;
        if let Some(handle) = session.owned.take() {
            self.store.release(&handle);
            debug!("Released previous audio clip {}", handle.id);
        }
        session.generation
    }

    async fn run(&self, generation: u64, date: NaiveDate) -> Result<(), PresentError> {
        let mut day = self.readings.fetch(date).await?;

        let title = format!("{} | {}", self.display.title_prefix, day.label);
        let text_only = day.clone();
        if self.publish(generation, |s| {
            s.phase = Phase::TextReady;
            s.readings = Some(text_only);
            s.title = title;
        }) {
            info!("State: LOADING → TEXT_READY ({})", day.label);
        }

        let script = build_script(&day, &self.voices);
        debug!("Narration script: {} chars", script.len());

        let handle = match self.speech.synthesize(&script, &self.bindings).await {
            Some(b64) => self.encode_audio(b64).await?,
            None => {
                warn!("Audio unavailable, presenting text only");
                None
            }
        };

        let mut session = self.lock_session();
        if session.generation != generation {
            if let Some(surplus) = &handle {
                self.store.release(surplus);
                debug!("Invocation {generation} superseded, released surplus clip {}", surplus.id);
            }
            return Ok(());
        }

        if let Some(stale) = session.owned.take() {
            self.store.release(&stale);
        }
        session.owned = handle.clone();
        day.audio = handle;
        let with_audio = day.audio.is_some();
        self.state.send_modify(|s| {
            s.phase = Phase::Complete;
            s.readings = Some(day);
            s.loading = false;
            s.error = None;
        });
        drop(session);

        info!("State: TEXT_READY → COMPLETE (audio: {})", if with_audio { "yes" } else { "no" });
        Ok(())
    }

    /// Decode and wrap synthesized PCM. Malformed audio yields `None`.
    async fn encode_audio(&self, b64: String) -> Result<Option<AudioHandle>, PresentError> {
        let encoded = tokio::task::spawn_blocking(move || {
            let pcm = decode_base64(&b64)?;
            encode_wav(&pcm, TTS_SAMPLE_RATE, TTS_CHANNELS, TTS_BITS_PER_SAMPLE)
        })
        .await
        .map_err(|e| PresentError::OrchestrationFailed(format!("audio encoding task failed: {e}")))?;

        let wav = match encoded {
            Ok(wav) => wav,
            Err(e) => {
                warn!("Discarding synthesized audio: {e}");
                return Ok(None);
            }
        };

        match WavInfo::parse(&wav) {
            Ok(info) => info!(
                "Encoded {:.1}s of narration ({} Hz, {} ch, {}-bit, {} bytes)",
                info.duration_secs(),
                info.sample_rate,
                info.channels,
                info.bits_per_sample,
                wav.len()
            ),
            Err(e) => debug!("Encoded {} bytes (container not re-readable: {e})", wav.len()),
        }
        Ok(Some(self.store.create(wav)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use chrono::{Datelike, Weekday};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tokio::sync::Notify;

    #[derive(Default)]
    struct FakeReadings {
        fail: AtomicBool,
        blank_psalm: bool,
    }

    impl ReadingsSource for FakeReadings {
        async fn fetch(&self, date: NaiveDate) -> Result<LiturgicalDay, FetchError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(FetchError::EmptyResponse);
            }
            let mut day = if date.weekday() == Weekday::Sun {
                fixtures::sunday()
            } else {
                fixtures::weekday()
            };
            day.date = date;
            if self.blank_psalm {
                day.psalm.text.clear();
            }
            Ok(day)
        }
    }

    #[derive(Default)]
    struct FakeSpeech {
        audio: Option<String>,
        scripts: Mutex<Vec<String>>,
        /// The first call parks here until notified.
        hold_first: Mutex<Option<Arc<Notify>>>,
        entered: Arc<Notify>,
    }

    impl FakeSpeech {
        fn with_audio(audio: &str) -> Self {
            Self {
                audio: Some(audio.to_string()),
                ..Self::default()
            }
        }

        fn holding_first(self, release: Arc<Notify>) -> Self {
            *self.hold_first.lock().unwrap() = Some(release);
            self
        }
    }

    impl SpeechSynthesizer for FakeSpeech {
        async fn synthesize(&self, script: &str, voices: &[VoiceBinding]) -> Option<String> {
            assert_eq!(voices.len(), 2);
            self.scripts.lock().unwrap().push(script.to_string());
            let hold = self.hold_first.lock().unwrap().take();
            if let Some(release) = hold {
                self.entered.notify_one();
                release.notified().await;
            }
            self.audio.clone()
        }
    }

    fn pcm_b64() -> String {
        STANDARD.encode([0u8, 1, 2, 3, 4, 5, 6, 7])
    }

    fn wednesday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, 16).unwrap()
    }

    fn sunday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 11, 30).unwrap()
    }

    fn orchestrator(readings: FakeReadings, speech: FakeSpeech) -> Orchestrator<FakeReadings, FakeSpeech> {
        Orchestrator::new(readings, speech, AudioStore::new(), &Config::default())
    }

    #[tokio::test]
    async fn starts_idle() {
        let orch = orchestrator(FakeReadings::default(), FakeSpeech::default());
        let state = orch.state();
        assert_eq!(state.phase, Phase::Idle);
        assert!(state.readings.is_none());
        assert_eq!(state.title, "Evangelio del día");
    }

    #[tokio::test]
    async fn text_and_audio_complete() {
        let orch = orchestrator(FakeReadings::default(), FakeSpeech::with_audio(&pcm_b64()));
        orch.present(wednesday()).await;

        let state = orch.state();
        assert_eq!(state.phase, Phase::Complete);
        assert!(!state.loading);
        assert!(state.error.is_none());
        assert_eq!(
            state.title,
            "Evangelio del día | Miércoles de la XV Semana del Tiempo Ordinario"
        );

        let day = state.readings.unwrap();
        assert_eq!(day.date, wednesday());
        let handle = day.audio.unwrap();
        let wav = orch.store().get(handle.id).unwrap();
        assert_eq!(wav.len(), 44 + 8);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[44..], &[0, 1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(orch.store().live_count(), 1);
    }

    #[tokio::test]
    async fn missing_audio_keeps_text() {
        let orch = orchestrator(FakeReadings::default(), FakeSpeech::default());
        orch.present(wednesday()).await;

        let state = orch.state();
        assert_eq!(state.phase, Phase::Complete);
        assert!(state.error.is_none());
        let day = state.readings.unwrap();
        assert!(day.audio.is_none());
        assert_eq!(orch.store().live_count(), 0);
    }

    #[tokio::test]
    async fn malformed_audio_is_not_fatal() {
        let orch = orchestrator(FakeReadings::default(), FakeSpeech::with_audio("%%% not base64"));
        orch.present(wednesday()).await;

        let state = orch.state();
        assert_eq!(state.phase, Phase::Complete);
        assert!(state.readings.unwrap().audio.is_none());
        assert_eq!(orch.store().totals(), (0, 0));
    }

    #[tokio::test]
    async fn text_failure_releases_previous_clip() {
        let orch = orchestrator(FakeReadings::default(), FakeSpeech::with_audio(&pcm_b64()));
        orch.present(wednesday()).await;
        let first = orch.state().readings.unwrap().audio.unwrap();

        orch.readings.fail.store(true, Ordering::SeqCst);
        orch.present(sunday()).await;

        let state = orch.state();
        assert_eq!(state.phase, Phase::Failed);
        assert!(state.readings.is_none());
        assert!(!state.loading);
        assert!(state.error.unwrap().starts_with("No se pudieron obtener las lecturas"));
        assert_eq!(state.title, "Error | Evangelio del día");

        assert!(orch.store().get(first.id).is_none());
        assert_eq!(orch.store().totals(), (1, 1));
    }

    #[tokio::test]
    async fn sequential_presents_keep_one_clip() {
        let orch = orchestrator(FakeReadings::default(), FakeSpeech::with_audio(&pcm_b64()));
        orch.present(wednesday()).await;
        orch.present(sunday()).await;

        assert_eq!(orch.store().live_count(), 1);
        assert_eq!(orch.store().totals(), (2, 1));
        let day = orch.state().readings.unwrap();
        assert_eq!(day.date, sunday());
        assert!(orch.store().get(day.audio.unwrap().id).is_some());
    }

    #[tokio::test]
    async fn text_is_published_before_audio() {
        let release = Arc::new(Notify::new());
        let speech = FakeSpeech::with_audio(&pcm_b64()).holding_first(release.clone());
        let entered = speech.entered.clone();
        let orch = Arc::new(orchestrator(FakeReadings::default(), speech));

        let pass = tokio::spawn({
            let orch = orch.clone();
            async move { orch.present(sunday()).await }
        });
        entered.notified().await;

        let state = orch.state();
        assert_eq!(state.phase, Phase::TextReady);
        assert!(state.loading);
        let day = state.readings.unwrap();
        assert_eq!(day.label, "I Domingo de Adviento");
        assert!(day.audio.is_none());

        release.notify_one();
        pass.await.unwrap();
        assert_eq!(orch.state().phase, Phase::Complete);
        assert!(orch.state().readings.unwrap().audio.is_some());
    }

    #[tokio::test]
    async fn overlapping_presents_leave_one_live_clip() {
        let release = Arc::new(Notify::new());
        let speech = FakeSpeech::with_audio(&pcm_b64()).holding_first(release.clone());
        let entered = speech.entered.clone();
        let orch = Arc::new(orchestrator(FakeReadings::default(), speech));

        let first = tokio::spawn({
            let orch = orch.clone();
            async move { orch.present(wednesday()).await }
        });
        entered.notified().await;

        orch.present(sunday()).await;
        assert_eq!(orch.state().phase, Phase::Complete);

        // The older pass finishes last and must not overwrite or leak.
        release.notify_one();
        first.await.unwrap();

        let state = orch.state();
        assert_eq!(state.phase, Phase::Complete);
        let day = state.readings.unwrap();
        assert_eq!(day.date, sunday());
        let handle = day.audio.unwrap();
        assert!(orch.store().get(handle.id).is_some());
        assert_eq!(orch.store().live_count(), 1);
        assert_eq!(orch.store().totals(), (2, 1));
    }

    #[tokio::test]
    async fn teardown_releases_once() {
        let orch = orchestrator(FakeReadings::default(), FakeSpeech::with_audio(&pcm_b64()));
        orch.present(wednesday()).await;

        orch.teardown();
        orch.teardown();

        assert_eq!(orch.store().live_count(), 0);
        assert_eq!(orch.store().totals(), (1, 1));
        assert_eq!(orch.state().phase, Phase::Idle);
    }

    #[tokio::test]
    async fn teardown_discards_in_flight_audio() {
        let release = Arc::new(Notify::new());
        let speech = FakeSpeech::with_audio(&pcm_b64()).holding_first(release.clone());
        let entered = speech.entered.clone();
        let orch = Arc::new(orchestrator(FakeReadings::default(), speech));

        let pass = tokio::spawn({
            let orch = orch.clone();
            async move { orch.present(wednesday()).await }
        });
        entered.notified().await;
        orch.teardown();
        release.notify_one();
        pass.await.unwrap();

        assert_eq!(orch.store().live_count(), 0);
        assert_eq!(orch.store().totals(), (1, 1));
        assert_eq!(orch.state().phase, Phase::Idle);
    }

    #[tokio::test]
    async fn dropping_the_orchestrator_releases_its_clip() {
        let store = AudioStore::new();
        let orch = Orchestrator::new(
            FakeReadings::default(),
            FakeSpeech::with_audio(&pcm_b64()),
            store.clone(),
            &Config::default(),
        );
        orch.present(wednesday()).await;
        assert_eq!(store.live_count(), 1);

        drop(orch);
        assert_eq!(store.live_count(), 0);
        assert_eq!(store.totals(), (1, 1));
    }

    #[tokio::test]
    async fn narration_uses_both_speakers() {
        let orch = orchestrator(FakeReadings::default(), FakeSpeech::default());
        orch.present(sunday()).await;

        let scripts = orch.speech.scripts.lock().unwrap();
        assert_eq!(scripts.len(), 1);
        assert!(scripts[0].starts_with("Narrador: Lecturas para I Domingo de Adviento."));
        assert!(scripts[0].contains("Narrador: Segunda Lectura."));
        assert!(scripts[0].contains("LectorEvangelio: Evangelio."));
    }

    #[tokio::test]
    async fn empty_psalm_is_presented_without_its_block() {
        let readings = FakeReadings {
            blank_psalm: true,
            ..FakeReadings::default()
        };
        let orch = orchestrator(readings, FakeSpeech::with_audio(&pcm_b64()));
        orch.present(wednesday()).await;

        let state = orch.state();
        assert_eq!(state.phase, Phase::Complete);
        let day = state.readings.unwrap();
        assert!(day.psalm.is_empty());
        assert!(day.audio.is_some());

        let scripts = orch.speech.scripts.lock().unwrap();
        let blocks: Vec<_> = scripts[0].split("\n\n").filter(|b| !b.is_empty()).collect();
        assert_eq!(blocks.len(), 3);
        assert!(blocks[1].starts_with("Narrador: Primera Lectura."));
        assert!(blocks[2].starts_with("LectorEvangelio: Evangelio."));
        assert!(!scripts[0].contains("Salmo Responsorial"));
    }

    #[tokio::test]
    async fn wav_uses_the_tts_format() {
        let orch = orchestrator(FakeReadings::default(), FakeSpeech::with_audio(&pcm_b64()));
        orch.present(wednesday()).await;

        let handle = orch.state().readings.unwrap().audio.unwrap();
        let info = WavInfo::parse(&orch.store().get(handle.id).unwrap()).unwrap();
        assert_eq!(info.sample_rate, 24000);
        assert_eq!(info.channels, 1);
        assert_eq!(info.bits_per_sample, 16);
        assert_eq!(info.frames, 4);
    }

    #[tokio::test]
    async fn failed_text_skips_synthesis() {
        let readings = FakeReadings::default();
        readings.fail.store(true, Ordering::SeqCst);
        let orch = orchestrator(readings, FakeSpeech::with_audio(&pcm_b64()));
        orch.present(wednesday()).await;

        assert_eq!(orch.state().phase, Phase::Failed);
        assert!(orch.speech.scripts.lock().unwrap().is_empty());
        assert_eq!(orch.store().totals(), (0, 0));
    }

    #[tokio::test]
    async fn subscribers_see_the_final_state() {
        let orch = orchestrator(FakeReadings::default(), FakeSpeech::default());
        let mut rx = orch.subscribe();
        orch.present(wednesday()).await;

        assert!(rx.has_changed().unwrap());
        let state = rx.borrow_and_update().clone();
        assert_eq!(state.phase, Phase::Complete);
    }
}
