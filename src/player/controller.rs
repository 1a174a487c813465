//! The playback controller: one shared state machine driving one live audio
//! output across song switches, play/pause, seeks and natural end-of-track.
//!
//! Invariants:
//! - at most one live output resource exists at any time; a new session fully
//!   retires the previous resource (pause, detach pump, release) before the
//!   new one is bound;
//! - every command that must not overlap an in-flight start request (pause,
//!   seek, load, cleanup) awaits the single-slot pending-play handle before
//!   touching the output;
//! - output failures are converted into snapshot state, never surfaced as
//!   errors to the UI.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

use crate::model::{PlayerSnapshot, Playlist, Song};

use super::output::{AudioOutput, AudioOutputFactory, OutputError, OutputEvent};

/// An in-flight start request. Shared so any number of conflicting commands
/// can await its settlement without consuming it.
type PendingPlay = Shared<BoxFuture<'static, Result<(), OutputError>>>;

/// One bound output resource plus its event pump. The pump is aborted before
/// the output is abandoned, so late events from a retired resource can never
/// touch the state of its successor.
struct Session {
    output: Arc<dyn AudioOutput>,
    pump: Option<JoinHandle<()>>,
}

#[derive(Clone)]
pub struct PlayerController {
    factory: Arc<dyn AudioOutputFactory>,
    state: Arc<Mutex<PlayerSnapshot>>,
    session: Arc<Mutex<Option<Session>>>,
    pending_play: Arc<Mutex<Option<PendingPlay>>>,
    /// Bumped on every session retirement; end-of-track chains check it so a
    /// stale `Ended` cannot advance a session it no longer belongs to.
    generation: Arc<AtomicU64>,
}

impl PlayerController {
    pub fn new(factory: Arc<dyn AudioOutputFactory>) -> Self {
        Self {
            factory,
            state: Arc::new(Mutex::new(PlayerSnapshot::default())),
            session: Arc::new(Mutex::new(None)),
            pending_play: Arc::new(Mutex::new(None)),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Read-only snapshot of the player state, cloned for rendering.
    pub async fn snapshot(&self) -> PlayerSnapshot {
        self.state.lock().await.clone()
    }

    /// Construct a fresh output resource with its event pump attached, apply
    /// the stored volume and clear any error. Re-invocation retires the
    /// previous resource first, so listeners never accumulate.
    pub async fn initialize(&self) {
        tracing::debug!("initializing playback output");
        self.retire_session().await;

        let output = self.factory.create();
        let volume = self.state.lock().await.volume;
        output.set_volume(volume);

        let generation = self.generation.load(Ordering::SeqCst);
        let pump = output.take_events().map(|events| self.spawn_pump(events, generation));

        *self.session.lock().await = Some(Session { output, pump });
        self.state.lock().await.has_error = false;
    }

    /// Bind a new song (and optionally the playlist it came from), retiring
    /// the previous session. Resolves once the song is ready to play or has
    /// failed to load. A call while another load is in flight is dropped.
    pub async fn load_song(&self, song: Option<Song>, playlist: Option<Playlist>) {
        {
            let mut state = self.state.lock().await;
            if state.is_loading {
                tracing::debug!("load already in flight, dropping request");
                return;
            }
            state.is_loading = true;
        }

        // Never tear down a resource while its start request is pending.
        self.await_pending_play().await;
        self.retire_session().await;

        // The error flag is cleared only after retirement: a superseded start
        // settling with a failure writes its error before the generation
        // bump, never after this reset.
        {
            let mut state = self.state.lock().await;
            state.progress = 0.0;
            state.duration = 0.0;
            state.current_song = song.clone();
            state.current_playlist = playlist;
            state.is_playing = false;
            state.has_error = false;
        }

        if let Some(song) = song {
            tracing::info!(song_id = %song.id, title = %song.title, "loading song");

            let output = self.factory.create();
            let volume = self.state.lock().await.volume;
            output.set_volume(volume);

            let generation = self.generation.load(Ordering::SeqCst);
            let pump = output.take_events().map(|events| self.spawn_pump(events, generation));

            match output.load(&song.audio_url).await {
                Ok(()) => {
                    *self.session.lock().await = Some(Session { output, pump });
                }
                Err(e) => {
                    tracing::warn!(song_id = %song.id, error = %e, "failed to load song");
                    if let Some(pump) = pump {
                        pump.abort();
                    }
                    output.release();
                    self.state.lock().await.has_error = true;
                }
            }
        }

        self.state.lock().await.is_loading = false;
    }

    /// Pause if playing, start if paused. No-op without a song, while a load
    /// is in flight, or in error state.
    pub async fn toggle_playback(&self) {
        let (has_song, is_loading, has_error, is_playing) = {
            let state = self.state.lock().await;
            (
                state.current_song.is_some(),
                state.is_loading,
                state.has_error,
                state.is_playing,
            )
        };
        if !has_song || is_loading || has_error {
            return;
        }

        if is_playing {
            // Settle any in-flight start before pausing; pausing a resource
            // mid-start is exactly the race this controller exists to prevent.
            self.await_pending_play().await;
            if let Some(output) = self.current_output().await {
                output.pause();
            }
            self.state.lock().await.is_playing = false;
            tracing::debug!("playback paused");
            return;
        }

        let Some(output) = self.current_output().await else {
            return;
        };
        self.state.lock().await.is_loading = true;

        if let Err(e) = output.resume_channel().await {
            tracing::error!(error = %e, "failed to resume output channel");
            let mut state = self.state.lock().await;
            state.has_error = true;
            state.is_loading = false;
            return;
        }

        let generation = self.generation.load(Ordering::SeqCst);
        let play_output = output.clone();
        let pending: PendingPlay = async move { play_output.play().await }.boxed().shared();
        *self.pending_play.lock().await = Some(pending.clone());

        // The request is issued; mark playing now and revert on failure so a
        // concurrent pause can see the in-flight start and wait on it.
        {
            let mut state = self.state.lock().await;
            state.is_playing = true;
            state.is_loading = false;
        }

        let result = pending.await;

        // A load or cleanup parked on this same handle may have retired the
        // session already; its successor's state is not ours to write.
        if self.generation.load(Ordering::SeqCst) != generation {
            tracing::debug!("start request outlived its session, discarding result");
            return;
        }
        *self.pending_play.lock().await = None;

        match result {
            Ok(()) => tracing::debug!("playback started"),
            Err(OutputError::Blocked) => {
                // Autoplay policy, not a fault; the user retriggers play.
                tracing::debug!("start request blocked pending user interaction");
                self.state.lock().await.is_playing = false;
            }
            Err(e) => {
                tracing::error!(error = %e, "start request failed");
                let mut state = self.state.lock().await;
                state.has_error = true;
                state.is_playing = false;
            }
        }
    }

    /// Seek to `seconds`, clamped to `[0, duration]` once the duration is
    /// known. No-op without a resource, while loading, or in error state.
    pub async fn seek(&self, seconds: f64) {
        {
            let state = self.state.lock().await;
            if state.is_loading || state.has_error {
                return;
            }
        }

        // Seeking a resource that has not finished starting is undefined
        // behavior in most media backends.
        self.await_pending_play().await;

        // A load or cleanup parked on the same handle may have swapped the
        // session while we were parked; re-check the guards and take the
        // output only now.
        let generation = self.generation.load(Ordering::SeqCst);
        {
            let state = self.state.lock().await;
            if state.is_loading || state.has_error {
                return;
            }
        }
        let Some(output) = self.current_output().await else {
            return;
        };

        let target = {
            let state = self.state.lock().await;
            if state.duration > 0.0 {
                seconds.clamp(0.0, state.duration)
            } else {
                seconds.max(0.0)
            }
        };
        output.set_position(target);
        let mut state = self.state.lock().await;
        if self.generation.load(Ordering::SeqCst) == generation {
            state.progress = target;
        }
    }

    /// Store the volume (clamped to `[0, 1]`) and apply it to the live
    /// output, if any. Always safe.
    pub async fn set_volume(&self, volume: f32) {
        let volume = volume.clamp(0.0, 1.0);
        self.state.lock().await.volume = volume;
        if let Some(output) = self.current_output().await {
            output.set_volume(volume);
        }
    }

    /// Release everything and reset to initial state (stored volume
    /// survives). Safe before `initialize` and safe to repeat.
    pub async fn cleanup(&self) {
        tracing::debug!("tearing down playback");
        self.await_pending_play().await;
        self.retire_session().await;

        let mut state = self.state.lock().await;
        let volume = state.volume;
        *state = PlayerSnapshot {
            volume,
            ..PlayerSnapshot::default()
        };
    }

    /// Advance to the successor of the current song within the bound
    /// playlist. Invoked from the event pump on natural end-of-track.
    async fn play_next_song(&self, generation: u64) {
        if self.generation.load(Ordering::SeqCst) != generation {
            // The session that ended has already been superseded.
            return;
        }

        let (current, playlist) = {
            let state = self.state.lock().await;
            (state.current_song.clone(), state.current_playlist.clone())
        };
        let (Some(current), Some(playlist)) = (current, playlist) else {
            return;
        };
        let Some(next) = playlist.song_after(&current.id).cloned() else {
            tracing::debug!(song_id = %current.id, "end of playlist, stopping");
            return;
        };

        tracing::info!(song_id = %next.id, title = %next.title, "advancing to next song");
        self.load_song(Some(next), Some(playlist)).await;
        // A failed load sets the error flag and the toggle guard drops this.
        self.toggle_playback().await;
    }

    async fn await_pending_play(&self) {
        let pending = self.pending_play.lock().await.clone();
        if let Some(pending) = pending {
            let _ = pending.await;
        }
    }

    async fn current_output(&self) -> Option<Arc<dyn AudioOutput>> {
        self.session.lock().await.as_ref().map(|s| s.output.clone())
    }

    /// Detach the pump, then pause and release the output. The generation
    /// bump invalidates any end-of-track chain the old pump already spawned.
    async fn retire_session(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let retired = self.session.lock().await.take();
        if let Some(session) = retired {
            if let Some(pump) = session.pump {
                pump.abort();
            }
            session.output.pause();
            session.output.release();
        }
    }

    /// Route all output events through one handler set, attached and
    /// detached as a unit with the session.
    fn spawn_pump(
        &self,
        mut events: mpsc::UnboundedReceiver<OutputEvent>,
        generation: u64,
    ) -> JoinHandle<()> {
        let controller = self.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    OutputEvent::Position(seconds) => {
                        controller.state.lock().await.progress = seconds;
                    }
                    OutputEvent::Duration(seconds) => {
                        controller.state.lock().await.duration = seconds;
                    }
                    OutputEvent::Ended => {
                        tracing::debug!("track reached its natural end");
                        controller.state.lock().await.is_playing = false;
                        // Chaining loads a new song, which retires this very
                        // pump; run it on its own task so the abort cannot
                        // cancel the chain mid-flight.
                        let chained = controller.clone();
                        tokio::spawn(async move {
                            chained.play_next_song(generation).await;
                        });
                    }
                    OutputEvent::Error(message) => {
                        tracing::warn!(error = %message, "output reported a playback error");
                        let mut state = controller.state.lock().await;
                        state.has_error = true;
                        state.is_playing = false;
                        state.is_loading = false;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Playlist;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::time::Duration;
    use tokio::sync::Notify;

    #[derive(Clone)]
    struct MockBehavior {
        fail_load: bool,
        play_result: Result<(), OutputError>,
        play_gate: Option<Arc<Notify>>,
        load_gate: Option<Arc<Notify>>,
    }

    impl Default for MockBehavior {
        fn default() -> Self {
            Self {
                fail_load: false,
                play_result: Ok(()),
                play_gate: None,
                load_gate: None,
            }
        }
    }

    struct MockOutput {
        behavior: Arc<StdMutex<MockBehavior>>,
        live: Arc<AtomicUsize>,
        released: AtomicBool,
        volume: StdMutex<f32>,
        position: StdMutex<f64>,
        ops: StdMutex<Vec<String>>,
        events_tx: mpsc::UnboundedSender<OutputEvent>,
        events_rx: StdMutex<Option<mpsc::UnboundedReceiver<OutputEvent>>>,
    }

    impl MockOutput {
        fn new(behavior: Arc<StdMutex<MockBehavior>>, live: Arc<AtomicUsize>) -> Self {
            let (events_tx, events_rx) = mpsc::unbounded_channel();
            Self {
                behavior,
                live,
                released: AtomicBool::new(false),
                volume: StdMutex::new(0.0),
                position: StdMutex::new(0.0),
                ops: StdMutex::new(Vec::new()),
                events_tx,
                events_rx: StdMutex::new(Some(events_rx)),
            }
        }

        fn emit(&self, event: OutputEvent) {
            let _ = self.events_tx.send(event);
        }

        fn log(&self, op: &str) {
            self.ops.lock().unwrap().push(op.to_string());
        }

        fn ops(&self) -> Vec<String> {
            self.ops.lock().unwrap().clone()
        }

        fn volume(&self) -> f32 {
            *self.volume.lock().unwrap()
        }

        fn position(&self) -> f64 {
            *self.position.lock().unwrap()
        }

        fn released(&self) -> bool {
            self.released.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl AudioOutput for MockOutput {
        async fn load(&self, url: &str) -> Result<(), OutputError> {
            self.log(&format!("load:{url}"));
            let (gate, fail) = {
                let behavior = self.behavior.lock().unwrap();
                (behavior.load_gate.clone(), behavior.fail_load)
            };
            if let Some(gate) = gate {
                gate.notified().await;
            }
            if fail {
                Err(OutputError::Load(format!("unsupported source: {url}")))
            } else {
                Ok(())
            }
        }

        async fn play(&self) -> Result<(), OutputError> {
            self.log("play:start");
            let (gate, result) = {
                let behavior = self.behavior.lock().unwrap();
                (behavior.play_gate.clone(), behavior.play_result.clone())
            };
            if let Some(gate) = gate {
                gate.notified().await;
            }
            self.log("play:settle");
            result
        }

        async fn resume_channel(&self) -> Result<(), OutputError> {
            Ok(())
        }

        fn pause(&self) {
            self.log("pause");
        }

        fn set_volume(&self, volume: f32) {
            *self.volume.lock().unwrap() = volume;
        }

        fn set_position(&self, seconds: f64) {
            *self.position.lock().unwrap() = seconds;
        }

        fn release(&self) {
            self.log("release");
            if !self.released.swap(true, Ordering::SeqCst) {
                self.live.fetch_sub(1, Ordering::SeqCst);
            }
        }

        fn take_events(&self) -> Option<mpsc::UnboundedReceiver<OutputEvent>> {
            self.events_rx.lock().unwrap().take()
        }
    }

    struct MockFactory {
        behavior: Arc<StdMutex<MockBehavior>>,
        live: Arc<AtomicUsize>,
        max_live: AtomicUsize,
        created: AtomicUsize,
        outputs: StdMutex<Vec<Arc<MockOutput>>>,
    }

    impl MockFactory {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                behavior: Arc::new(StdMutex::new(MockBehavior::default())),
                live: Arc::new(AtomicUsize::new(0)),
                max_live: AtomicUsize::new(0),
                created: AtomicUsize::new(0),
                outputs: StdMutex::new(Vec::new()),
            })
        }

        fn last_output(&self) -> Arc<MockOutput> {
            self.outputs.lock().unwrap().last().expect("no output created").clone()
        }

        fn output(&self, index: usize) -> Arc<MockOutput> {
            self.outputs.lock().unwrap()[index].clone()
        }

        fn created(&self) -> usize {
            self.created.load(Ordering::SeqCst)
        }

        fn live(&self) -> usize {
            self.live.load(Ordering::SeqCst)
        }

        fn max_live(&self) -> usize {
            self.max_live.load(Ordering::SeqCst)
        }

        fn set_fail_load(&self, fail: bool) {
            self.behavior.lock().unwrap().fail_load = fail;
        }

        fn set_play_result(&self, result: Result<(), OutputError>) {
            self.behavior.lock().unwrap().play_result = result;
        }

        fn set_play_gate(&self, gate: Option<Arc<Notify>>) {
            self.behavior.lock().unwrap().play_gate = gate;
        }

        fn set_load_gate(&self, gate: Option<Arc<Notify>>) {
            self.behavior.lock().unwrap().load_gate = gate;
        }
    }

    impl AudioOutputFactory for MockFactory {
        fn create(&self) -> Arc<dyn AudioOutput> {
            let output = Arc::new(MockOutput::new(self.behavior.clone(), self.live.clone()));
            self.created.fetch_add(1, Ordering::SeqCst);
            let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_live.fetch_max(live, Ordering::SeqCst);
            self.outputs.lock().unwrap().push(output.clone());
            output
        }
    }

    fn song(id: &str) -> Song {
        Song {
            id: id.to_string(),
            title: format!("Song {id}"),
            artist: "Artist".to_string(),
            cover_url: String::new(),
            audio_url: format!("{id}.mp3"),
            category: "counting".to_string(),
            age_range: "3-5".to_string(),
            user_id: None,
            created_at: None,
        }
    }

    fn playlist(ids: &[&str]) -> Playlist {
        Playlist {
            id: "p1".to_string(),
            name: "Numbers".to_string(),
            description: String::new(),
            cover_url: String::new(),
            category: "counting".to_string(),
            created_by: "teacher".to_string(),
            user_id: None,
            created_at: None,
            songs: ids.iter().map(|id| song(id)).collect(),
        }
    }

    fn setup() -> (PlayerController, Arc<MockFactory>) {
        let factory = MockFactory::new();
        (PlayerController::new(factory.clone()), factory)
    }

    async fn wait_for(
        controller: &PlayerController,
        predicate: impl Fn(&PlayerSnapshot) -> bool,
    ) -> PlayerSnapshot {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let snapshot = controller.snapshot().await;
                if predicate(&snapshot) {
                    return snapshot;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time")
    }

    #[tokio::test]
    async fn repeated_loads_keep_one_live_resource() {
        let (controller, factory) = setup();
        for id in ["a", "b", "c"] {
            controller.load_song(Some(song(id)), None).await;
        }
        assert_eq!(factory.created(), 3);
        assert_eq!(factory.live(), 1);
        assert_eq!(factory.max_live(), 1);
        // Earlier resources were paused before release.
        let first = factory.output(0);
        assert!(first.released());
        assert!(first.ops().contains(&"pause".to_string()));
    }

    #[tokio::test]
    async fn repeated_initialize_never_accumulates_resources() {
        let (controller, factory) = setup();
        controller.initialize().await;
        controller.initialize().await;
        controller.initialize().await;
        assert_eq!(factory.created(), 3);
        assert_eq!(factory.live(), 1);
        assert_eq!(factory.max_live(), 1);
    }

    #[tokio::test]
    async fn pause_issued_mid_start_settles_to_paused() {
        let (controller, factory) = setup();
        controller.load_song(Some(song("a")), None).await;

        let gate = Arc::new(Notify::new());
        factory.set_play_gate(Some(gate.clone()));

        let starter = controller.clone();
        let start = tokio::spawn(async move { starter.toggle_playback().await });
        wait_for(&controller, |s| s.is_playing).await;

        let pauser = controller.clone();
        let pause = tokio::spawn(async move { pauser.toggle_playback().await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        // The pause is parked on the pending start; the output has not been
        // paused mid-start.
        let output = factory.last_output();
        assert!(!output.ops().contains(&"pause".to_string()));

        gate.notify_one();
        start.await.unwrap();
        pause.await.unwrap();

        let snapshot = controller.snapshot().await;
        assert!(!snapshot.is_playing);
        assert!(!snapshot.has_error);

        // The start request settled before the pause reached the output.
        let ops = output.ops();
        let settle = ops.iter().position(|op| op == "play:settle").unwrap();
        let pause_at = ops.iter().position(|op| op == "pause").unwrap();
        assert!(settle < pause_at, "pause must wait for the start to settle: {ops:?}");
    }

    #[tokio::test]
    async fn seek_is_ignored_while_loading() {
        let (controller, factory) = setup();
        let gate = Arc::new(Notify::new());
        factory.set_load_gate(Some(gate.clone()));

        let loader = controller.clone();
        let load = tokio::spawn(async move { loader.load_song(Some(song("a")), None).await });
        wait_for(&controller, |s| s.is_loading).await;

        controller.seek(42.0).await;
        assert_eq!(controller.snapshot().await.progress, 0.0);

        // A second load while one is in flight is dropped, not queued.
        controller.load_song(Some(song("b")), None).await;
        assert_eq!(factory.created(), 1);

        gate.notify_one();
        load.await.unwrap();
        let snapshot = controller.snapshot().await;
        assert_eq!(snapshot.current_song.as_ref().map(|s| s.id.as_str()), Some("a"));
        assert!(!snapshot.is_loading);
    }

    #[tokio::test]
    async fn natural_end_chains_to_the_next_song() {
        let (controller, factory) = setup();
        let list = playlist(&["a", "b", "c"]);
        controller.load_song(Some(list.songs[1].clone()), Some(list.clone())).await;
        controller.toggle_playback().await;
        assert!(controller.snapshot().await.is_playing);

        factory.last_output().emit(OutputEvent::Ended);

        let snapshot = wait_for(&controller, |s| {
            s.current_song.as_ref().map(|song| song.id.as_str()) == Some("c") && s.is_playing
        })
        .await;
        assert!(!snapshot.has_error);
        assert_eq!(factory.live(), 1);
    }

    #[tokio::test]
    async fn natural_end_of_last_song_stops() {
        let (controller, factory) = setup();
        let list = playlist(&["a", "b", "c"]);
        controller.load_song(Some(list.songs[2].clone()), Some(list.clone())).await;
        controller.toggle_playback().await;

        factory.last_output().emit(OutputEvent::Position(31.5));
        factory.last_output().emit(OutputEvent::Ended);

        let snapshot = wait_for(&controller, |s| !s.is_playing).await;
        // No wraparound: still on the last song, progress untouched.
        assert_eq!(snapshot.current_song.as_ref().map(|s| s.id.as_str()), Some("c"));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(factory.created(), 1);
        assert_eq!(controller.snapshot().await.progress, 31.5);
    }

    #[tokio::test]
    async fn natural_end_without_playlist_stops() {
        let (controller, factory) = setup();
        controller.load_song(Some(song("solo")), None).await;
        controller.toggle_playback().await;

        factory.last_output().emit(OutputEvent::Ended);
        wait_for(&controller, |s| !s.is_playing).await;

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(factory.created(), 1);
    }

    #[tokio::test]
    async fn volume_clamps_and_applies_to_live_output() {
        let (controller, factory) = setup();
        controller.load_song(Some(song("a")), None).await;

        controller.set_volume(0.3).await;
        controller.set_volume(0.3).await;
        assert_eq!(controller.snapshot().await.volume, 0.3);
        assert_eq!(factory.last_output().volume(), 0.3);

        controller.set_volume(-1.0).await;
        assert_eq!(controller.snapshot().await.volume, 0.0);
        controller.set_volume(2.0).await;
        assert_eq!(controller.snapshot().await.volume, 1.0);
        assert_eq!(factory.last_output().volume(), 1.0);
    }

    #[tokio::test]
    async fn failed_load_does_not_poison_the_next_one() {
        let (controller, factory) = setup();
        factory.set_fail_load(true);
        controller.load_song(Some(song("x")), None).await;

        let snapshot = controller.snapshot().await;
        assert!(snapshot.has_error);
        assert!(!snapshot.is_loading);
        // The failed song stays visible; no resource stays bound.
        assert_eq!(snapshot.current_song.as_ref().map(|s| s.id.as_str()), Some("x"));
        assert_eq!(factory.live(), 0);

        factory.set_fail_load(false);
        controller.load_song(Some(song("y")), None).await;
        let snapshot = controller.snapshot().await;
        assert!(!snapshot.has_error);
        assert_eq!(snapshot.current_song.as_ref().map(|s| s.id.as_str()), Some("y"));
        assert_eq!(factory.live(), 1);
    }

    #[tokio::test]
    async fn blocked_start_is_not_an_error() {
        let (controller, factory) = setup();
        controller.load_song(Some(song("a")), None).await;
        factory.set_play_result(Err(OutputError::Blocked));

        controller.toggle_playback().await;

        let snapshot = controller.snapshot().await;
        assert!(!snapshot.is_playing);
        assert!(!snapshot.has_error);
        assert!(!snapshot.is_loading);

        // An explicit retrigger works once the platform allows it.
        factory.set_play_result(Ok(()));
        controller.toggle_playback().await;
        assert!(controller.snapshot().await.is_playing);
    }

    #[tokio::test]
    async fn failed_start_enters_error_state() {
        let (controller, factory) = setup();
        controller.load_song(Some(song("a")), None).await;
        factory.set_play_result(Err(OutputError::Playback("device gone".to_string())));

        controller.toggle_playback().await;

        let snapshot = controller.snapshot().await;
        assert!(snapshot.has_error);
        assert!(!snapshot.is_playing);

        // Guarded commands are dropped in error state.
        controller.toggle_playback().await;
        controller.seek(10.0).await;
        assert_eq!(controller.snapshot().await.progress, 0.0);
    }

    #[tokio::test]
    async fn output_error_event_routes_into_state() {
        let (controller, factory) = setup();
        controller.load_song(Some(song("a")), None).await;
        controller.toggle_playback().await;

        factory.last_output().emit(OutputEvent::Error("decode failure".to_string()));

        let snapshot = wait_for(&controller, |s| s.has_error).await;
        assert!(!snapshot.is_playing);
        assert!(!snapshot.is_loading);
    }

    #[tokio::test]
    async fn telemetry_events_update_the_snapshot() {
        let (controller, factory) = setup();
        controller.load_song(Some(song("a")), None).await;

        let output = factory.last_output();
        output.emit(OutputEvent::Duration(180.0));
        output.emit(OutputEvent::Position(12.25));

        let snapshot = wait_for(&controller, |s| s.duration == 180.0 && s.progress == 12.25).await;
        assert!(!snapshot.has_error);
    }

    #[tokio::test]
    async fn seek_clamps_to_known_duration() {
        let (controller, factory) = setup();
        controller.load_song(Some(song("a")), None).await;
        factory.last_output().emit(OutputEvent::Duration(180.0));
        wait_for(&controller, |s| s.duration == 180.0).await;

        controller.seek(10_000.0).await;
        assert_eq!(controller.snapshot().await.progress, 180.0);
        assert_eq!(factory.last_output().position(), 180.0);

        controller.seek(-5.0).await;
        assert_eq!(controller.snapshot().await.progress, 0.0);
    }

    #[tokio::test]
    async fn cleanup_is_safe_before_initialize_and_twice() {
        let (controller, factory) = setup();
        controller.cleanup().await;
        controller.cleanup().await;
        assert_eq!(factory.created(), 0);

        controller.initialize().await;
        controller.load_song(Some(song("a")), None).await;
        controller.set_volume(0.8).await;
        controller.cleanup().await;
        controller.cleanup().await;

        let snapshot = controller.snapshot().await;
        assert!(snapshot.current_song.is_none());
        assert!(!snapshot.is_playing);
        assert_eq!(snapshot.progress, 0.0);
        assert_eq!(snapshot.volume, 0.8);
        assert_eq!(factory.live(), 0);
    }

    #[tokio::test]
    async fn superseded_start_failure_cannot_poison_the_next_session() {
        let (controller, factory) = setup();
        controller.load_song(Some(song("a")), None).await;

        let gate = Arc::new(Notify::new());
        factory.set_play_gate(Some(gate.clone()));
        factory.set_play_result(Err(OutputError::Playback("device gone".to_string())));

        let starter = controller.clone();
        let start = tokio::spawn(async move { starter.toggle_playback().await });
        wait_for(&controller, |s| s.is_playing).await;

        // The user switches songs while a's start request is still in
        // flight; the load parks on the pending handle.
        factory.set_play_result(Ok(()));
        let loader = controller.clone();
        let load = tokio::spawn(async move { loader.load_song(Some(song("b")), None).await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        gate.notify_one();
        start.await.unwrap();
        load.await.unwrap();

        let snapshot = controller.snapshot().await;
        assert_eq!(snapshot.current_song.as_ref().map(|s| s.id.as_str()), Some("b"));
        assert!(!snapshot.has_error, "a's late failure must not poison b's session");
        assert!(!snapshot.is_loading);
        assert_eq!(factory.live(), 1);

        // The new session is fully usable.
        factory.set_play_gate(None);
        controller.toggle_playback().await;
        assert!(controller.snapshot().await.is_playing);
    }

    #[tokio::test]
    async fn cleanup_during_a_pending_start_leaves_a_clean_slate() {
        let (controller, factory) = setup();
        controller.load_song(Some(song("a")), None).await;

        let gate = Arc::new(Notify::new());
        factory.set_play_gate(Some(gate.clone()));
        factory.set_play_result(Err(OutputError::Playback("device gone".to_string())));

        let starter = controller.clone();
        let start = tokio::spawn(async move { starter.toggle_playback().await });
        wait_for(&controller, |s| s.is_playing).await;

        let cleaner = controller.clone();
        let cleanup = tokio::spawn(async move { cleaner.cleanup().await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        gate.notify_one();
        start.await.unwrap();
        cleanup.await.unwrap();

        let snapshot = controller.snapshot().await;
        assert!(snapshot.current_song.is_none());
        assert!(!snapshot.has_error, "a start failing after cleanup must not resurface");
        assert!(!snapshot.is_playing);
        assert_eq!(factory.live(), 0);
    }

    #[tokio::test]
    async fn seek_parked_on_a_pending_start_cannot_touch_the_new_session() {
        let (controller, factory) = setup();
        controller.load_song(Some(song("a")), None).await;
        let old_output = factory.last_output();

        let play_gate = Arc::new(Notify::new());
        factory.set_play_gate(Some(play_gate.clone()));

        let starter = controller.clone();
        let start = tokio::spawn(async move { starter.toggle_playback().await });
        wait_for(&controller, |s| s.is_playing).await;

        // The seek parks on the in-flight start request.
        let seeker = controller.clone();
        let seek = tokio::spawn(async move { seeker.seek(42.0).await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        // So does a new load; its loading flag is already up by the time the
        // start settles, which is what the parked seek must observe.
        let load_gate = Arc::new(Notify::new());
        factory.set_load_gate(Some(load_gate.clone()));
        let loader = controller.clone();
        let load = tokio::spawn(async move { loader.load_song(Some(song("b")), None).await });
        wait_for(&controller, |s| s.is_loading).await;

        play_gate.notify_one();
        start.await.unwrap();
        seek.await.unwrap();

        // The parked seek backed off instead of positioning the retired
        // output or scribbling over the new session's progress.
        assert_eq!(old_output.position(), 0.0);

        load_gate.notify_one();
        load.await.unwrap();

        let snapshot = controller.snapshot().await;
        assert_eq!(snapshot.current_song.as_ref().map(|s| s.id.as_str()), Some("b"));
        assert_eq!(snapshot.progress, 0.0);
        assert!(!snapshot.is_loading);
    }

    #[tokio::test]
    async fn stale_end_of_track_cannot_advance_a_new_session() {
        let (controller, factory) = setup();
        let list = playlist(&["a", "b", "c"]);
        controller.load_song(Some(list.songs[0].clone()), Some(list.clone())).await;
        controller.toggle_playback().await;
        let old_output = factory.last_output();

        // The user switches songs; the old session is retired.
        controller.load_song(Some(list.songs[2].clone()), Some(list.clone())).await;

        // A late end event from the retired output must not chain to "b".
        old_output.emit(OutputEvent::Ended);
        tokio::time::sleep(Duration::from_millis(30)).await;

        let snapshot = controller.snapshot().await;
        assert_eq!(snapshot.current_song.as_ref().map(|s| s.id.as_str()), Some("c"));
        assert!(!snapshot.is_playing);
    }
}
