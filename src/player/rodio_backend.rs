//! Rodio-backed output resource.
//!
//! `rodio::OutputStream` is not `Send`, so each output parks the stream on a
//! dedicated thread that stays alive until the resource is released; only the
//! `Sink` (which is `Send + Sync`) crosses into async land.

use std::io::Cursor;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc as std_mpsc;
use std::time::Duration;

use async_trait::async_trait;
use rodio::source::Source;
use rodio::{Decoder, OutputStream, Sink};
use tokio::sync::mpsc;

use super::output::{AudioOutput, AudioOutputFactory, OutputError, OutputEvent};

const POSITION_TICK: Duration = Duration::from_millis(250);

pub struct RodioOutputFactory {
    http: reqwest::Client,
}

impl RodioOutputFactory {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

impl AudioOutputFactory for RodioOutputFactory {
    fn create(&self) -> Arc<dyn AudioOutput> {
        Arc::new(RodioOutput::new(self.http.clone()))
    }
}

struct RodioOutput {
    http: reqwest::Client,
    sink: StdMutex<Option<Arc<Sink>>>,
    /// Stops both the stream-owning thread and the position ticker.
    shutdown: Arc<AtomicBool>,
    volume: StdMutex<f32>,
    events_tx: mpsc::UnboundedSender<OutputEvent>,
    events_rx: StdMutex<Option<mpsc::UnboundedReceiver<OutputEvent>>>,
}

impl RodioOutput {
    fn new(http: reqwest::Client) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            http,
            sink: StdMutex::new(None),
            shutdown: Arc::new(AtomicBool::new(false)),
            volume: StdMutex::new(1.0),
            events_tx,
            events_rx: StdMutex::new(Some(events_rx)),
        }
    }

    fn current_sink(&self) -> Option<Arc<Sink>> {
        self.sink.lock().expect("sink lock poisoned").clone()
    }

    async fn fetch_source(&self, url: &str) -> Result<Vec<u8>, OutputError> {
        if is_remote(url) {
            let response = self
                .http
                .get(url)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| OutputError::Load(format!("{url}: {e}")))?;
            let bytes = response
                .bytes()
                .await
                .map_err(|e| OutputError::Load(format!("{url}: {e}")))?;
            Ok(bytes.to_vec())
        } else {
            tokio::fs::read(url)
                .await
                .map_err(|e| OutputError::Load(format!("{url}: {e}")))
        }
    }

    /// Open the audio device on its own thread and hand the sink back.
    async fn open_sink(&self) -> Result<Arc<Sink>, OutputError> {
        let (tx, rx) = std_mpsc::channel::<Result<Arc<Sink>, String>>();
        let shutdown = self.shutdown.clone();

        std::thread::Builder::new()
            .name("tunebox-audio".to_string())
            .spawn(move || {
                let (stream, handle) = match OutputStream::try_default() {
                    Ok(pair) => pair,
                    Err(e) => {
                        let _ = tx.send(Err(format!("no audio device: {e}")));
                        return;
                    }
                };
                let sink = match Sink::try_new(&handle) {
                    Ok(sink) => Arc::new(sink),
                    Err(e) => {
                        let _ = tx.send(Err(format!("failed to open audio sink: {e}")));
                        return;
                    }
                };
                let _ = tx.send(Ok(sink.clone()));

                // The stream must outlive the sink; park here until release.
                let _stream = stream;
                while !shutdown.load(Ordering::Relaxed) {
                    std::thread::sleep(Duration::from_millis(100));
                }
                sink.stop();
            })
            .map_err(|e| OutputError::Load(format!("failed to spawn audio thread: {e}")))?;

        let opened = tokio::task::spawn_blocking(move || rx.recv())
            .await
            .map_err(|e| OutputError::Load(format!("audio thread startup failed: {e}")))?
            .map_err(|e| OutputError::Load(format!("audio thread exited early: {e}")))?;
        opened.map_err(OutputError::Load)
    }

    /// Report the playback position until the source drains, then signal the
    /// natural end exactly once.
    fn spawn_ticker(&self, sink: Arc<Sink>) {
        let events = self.events_tx.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(POSITION_TICK);
            loop {
                interval.tick().await;
                if shutdown.load(Ordering::Relaxed) {
                    break;
                }
                if sink.empty() {
                    let _ = events.send(OutputEvent::Ended);
                    break;
                }
                if !sink.is_paused() {
                    let _ = events.send(OutputEvent::Position(sink.get_pos().as_secs_f64()));
                }
            }
        });
    }
}

#[async_trait]
impl AudioOutput for RodioOutput {
    async fn load(&self, url: &str) -> Result<(), OutputError> {
        let bytes = self.fetch_source(url).await?;
        let decoder = Decoder::new(Cursor::new(bytes))
            .map_err(|e| OutputError::Load(format!("failed to decode {url}: {e}")))?;
        let duration = decoder.total_duration();

        let sink = self.open_sink().await?;
        sink.pause();
        sink.set_volume(*self.volume.lock().expect("volume lock poisoned"));
        sink.append(decoder);

        if let Some(duration) = duration {
            let _ = self.events_tx.send(OutputEvent::Duration(duration.as_secs_f64()));
        } else {
            tracing::debug!(url, "source duration unknown");
        }

        self.spawn_ticker(sink.clone());
        *self.sink.lock().expect("sink lock poisoned") = Some(sink);
        Ok(())
    }

    async fn play(&self) -> Result<(), OutputError> {
        match self.current_sink() {
            Some(sink) => {
                sink.play();
                Ok(())
            }
            None => Err(OutputError::Playback("no source bound".to_string())),
        }
    }

    async fn resume_channel(&self) -> Result<(), OutputError> {
        // The device channel never suspends on a native backend.
        Ok(())
    }

    fn pause(&self) {
        if let Some(sink) = self.current_sink() {
            sink.pause();
        }
    }

    fn set_volume(&self, volume: f32) {
        *self.volume.lock().expect("volume lock poisoned") = volume;
        if let Some(sink) = self.current_sink() {
            sink.set_volume(volume);
        }
    }

    fn set_position(&self, seconds: f64) {
        if let Some(sink) = self.current_sink() {
            if let Err(e) = sink.try_seek(Duration::from_secs_f64(seconds.max(0.0))) {
                tracing::debug!(error = %e, "seek not supported for this source");
            }
        }
    }

    fn release(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(sink) = self.sink.lock().expect("sink lock poisoned").take() {
            sink.stop();
        }
    }

    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<OutputEvent>> {
        self.events_rx.lock().expect("events lock poisoned").take()
    }
}

fn is_remote(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}
