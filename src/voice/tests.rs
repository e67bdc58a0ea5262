use super::*;
use crate::audio::{AudioDevice, AudioInput, MockAudio};
use crate::config::VoiceConfig;
use crate::error::{AudioError, BackendError};
use crate::stt::{MockStt, SpeechToText};
use crate::tts::{MockTts, Synthesized, TextToSpeech};
use crate::wake::WakeWordModel;
use crossbeam_channel::{bounded, Receiver, Sender};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

const WAKE_LEVEL: i16 = 1234;
const SPEECH_LEVEL: i16 = 3000;

/// Sound card fed from a script of per-chunk levels.
#[derive(Clone, Default)]
struct ScriptedDevice {
    levels: Arc<Mutex<VecDeque<i16>>>,
    idle_level: i16,
    playing: Arc<AtomicBool>,
    heard_while_playing: Arc<AtomicBool>,
    played: Arc<Mutex<Vec<usize>>>,
    discards: Arc<AtomicUsize>,
    reads: Arc<AtomicUsize>,
}

impl ScriptedDevice {
    fn with_idle_level(idle_level: i16) -> Self {
        Self {
            idle_level,
            ..Self::default()
        }
    }

    fn script(&self, levels: &[i16]) {
        self.levels.lock().unwrap().extend(levels.iter().copied());
    }
}

impl AudioDevice for ScriptedDevice {
    fn name(&self) -> &str {
        "scripted"
    }

    fn open_input(&self, _sample_rate: u32) -> Result<Box<dyn AudioInput>, AudioError> {
        Ok(Box::new(self.clone()))
    }

    fn play(&self, samples: &[i16], _sample_rate: u32) -> Result<(), AudioError> {
        self.playing.store(true, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));
        self.played.lock().unwrap().push(samples.len());
        self.playing.store(false, Ordering::SeqCst);
        Ok(())
    }
}

impl AudioInput for ScriptedDevice {
    fn read_chunk(&mut self, samples: usize) -> Result<Vec<i16>, AudioError> {
        thread::sleep(Duration::from_millis(5));
        if self.playing.load(Ordering::SeqCst) {
            self.heard_while_playing.store(true, Ordering::SeqCst);
        }
        self.reads.fetch_add(1, Ordering::SeqCst);
        let level = self.levels.lock().unwrap().pop_front().unwrap_or(self.idle_level);
        Ok(vec![level; samples])
    }

    fn discard(&mut self, _samples: usize) -> Result<(), AudioError> {
        self.discards.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Fires on chunks carrying the wake marker level.
struct MarkerWake;

impl WakeWordModel for MarkerWake {
    fn score(&mut self, chunk: &[i16]) -> Result<f32, BackendError> {
        Ok(if chunk.first() == Some(&WAKE_LEVEL) { 0.95 } else { 0.0 })
    }

    fn name(&self) -> &str {
        "marker"
    }
}

#[derive(Clone)]
struct CountingStt {
    calls: Arc<AtomicUsize>,
    finished: Arc<AtomicUsize>,
    fail: Arc<AtomicBool>,
    hold: Arc<Mutex<Option<Receiver<()>>>>,
    text: &'static str,
}

impl CountingStt {
    fn new(text: &'static str) -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            finished: Arc::new(AtomicUsize::new(0)),
            fail: Arc::new(AtomicBool::new(false)),
            hold: Arc::new(Mutex::new(None)),
            text,
        }
    }

    /// The first call blocks until the returned sender fires.
    fn held(text: &'static str) -> (Self, Sender<()>) {
        let (release, gate) = bounded(1);
        let stt = Self::new(text);
        *stt.hold.lock().unwrap() = Some(gate);
        (stt, release)
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }
}

impl SpeechToText for CountingStt {
    fn transcribe(&self, samples: &[i16], _sample_rate: u32) -> Result<String, BackendError> {
        assert!(!samples.is_empty());
        self.calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.hold.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.recv_timeout(Duration::from_secs(5));
        }
        self.finished.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(BackendError::request("whisper", "connection refused"));
        }
        Ok(self.text.to_string())
    }

    fn name(&self) -> &'static str {
        "counting"
    }
}

/// Holds the first synthesis until released, then records every text.
struct GatedTts {
    gate: Mutex<Option<Receiver<()>>>,
    spoken: Arc<Mutex<Vec<String>>>,
}

impl GatedTts {
    fn new() -> (Self, Sender<()>, Arc<Mutex<Vec<String>>>) {
        let (release, gate) = bounded(1);
        let spoken = Arc::new(Mutex::new(Vec::new()));
        let tts = Self {
            gate: Mutex::new(Some(gate)),
            spoken: Arc::clone(&spoken),
        };
        (tts, release, spoken)
    }
}

impl TextToSpeech for GatedTts {
    fn synthesize(&self, text: &str) -> Result<Synthesized, BackendError> {
        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.recv_timeout(Duration::from_secs(5));
        }
        self.spoken.lock().unwrap().push(text.to_string());
        Ok(Synthesized {
            samples: vec![500; 1600],
            sample_rate: 16_000,
        })
    }

    fn name(&self) -> &'static str {
        "gated"
    }
}

struct Reply(&'static str);

impl Responder for Reply {
    fn respond(&self, _transcript: &str) -> Option<String> {
        Some(self.0.to_string())
    }
}

fn fast_config() -> VoiceConfig {
    VoiceConfig {
        assistant_limit: Duration::from_secs(3),
        notes_limit: Duration::from_secs(60),
        silence_duration: Duration::from_millis(320),
        min_command: Duration::from_millis(500),
        cooldown: Duration::from_millis(150),
        capture_flush: Duration::from_millis(100),
        playback_flush: Duration::from_millis(200),
        playback_settle: Duration::from_millis(10),
        mock_listen_delay: Duration::from_millis(20),
        mock_think_delay: Duration::from_millis(20),
        ..VoiceConfig::default()
    }
}

fn backends(device: Arc<dyn AudioDevice>) -> VoiceBackends {
    VoiceBackends {
        device,
        wake: None,
        stt: None,
        tts: None,
        responder: Box::new(TranscriptOnly),
        notifier: None,
    }
}

fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(5));
    }
}

fn command_levels() -> Vec<i16> {
    let mut levels = vec![WAKE_LEVEL];
    levels.extend([SPEECH_LEVEL; 6]);
    levels
}

#[test]
fn wake_word_runs_a_full_cycle() {
    let device = ScriptedDevice::default();
    let stt = CountingStt::new("Hey Jarvis, turn on the lights");
    let coordinator = VoiceCoordinator::start(
        fast_config(),
        VoiceBackends {
            wake: Some(Box::new(MarkerWake)),
            stt: Some(Box::new(stt.clone())),
            ..backends(Arc::new(device.clone()))
        },
    );
    assert!(coordinator.status().capabilities.wake_word);

    device.script(&command_levels());
    wait_until("transcript", || {
        coordinator.state().last_transcript.as_deref() == Some("turn on the lights")
    });
    wait_until("idle", || coordinator.state().state == VoicePhase::Idle);
    assert_eq!(stt.calls(), 1);

    // Wake listening resumes after the cooldown and flushes first.
    wait_until("flush", || device.discards.load(Ordering::SeqCst) > 0);
    coordinator.shutdown();
}

#[test]
fn cooldown_delays_the_next_wake_trigger() {
    let device = ScriptedDevice::default();
    let stt = CountingStt::new("what time is it");
    let config = VoiceConfig {
        cooldown: Duration::from_millis(800),
        ..fast_config()
    };
    let coordinator = VoiceCoordinator::start(
        config,
        VoiceBackends {
            wake: Some(Box::new(MarkerWake)),
            stt: Some(Box::new(stt.clone())),
            ..backends(Arc::new(device.clone()))
        },
    );

    device.script(&command_levels());
    wait_until("first cycle", || stt.calls() == 1);
    wait_until("idle", || coordinator.state().state == VoicePhase::Idle);
    let reads_after_cycle = device.reads.load(Ordering::SeqCst);

    device.script(&command_levels());
    thread::sleep(Duration::from_millis(300));
    assert_eq!(device.reads.load(Ordering::SeqCst), reads_after_cycle);
    assert_eq!(stt.calls(), 1);

    wait_until("second cycle", || stt.calls() == 2);
    coordinator.shutdown();
}

#[test]
fn reply_playback_never_overlaps_the_microphone() {
    let device = ScriptedDevice::default();
    let coordinator = VoiceCoordinator::start(
        fast_config(),
        VoiceBackends {
            wake: Some(Box::new(MarkerWake)),
            stt: Some(Box::new(CountingStt::new("play some music"))),
            tts: Some(Box::new(MockTts)),
            responder: Box::new(Reply("sure")),
            ..backends(Arc::new(device.clone()))
        },
    );

    device.script(&command_levels());
    wait_until("reply played", || !device.played.lock().unwrap().is_empty());
    wait_until("idle", || coordinator.state().state == VoicePhase::Idle);
    thread::sleep(Duration::from_millis(400));
    assert!(!device.heard_while_playing.load(Ordering::SeqCst));
    assert_eq!(
        coordinator.state().last_transcript.as_deref(),
        Some("play some music")
    );
    coordinator.shutdown();
}

#[test]
fn second_request_conflicts_while_listening() {
    let device = ScriptedDevice::with_idle_level(SPEECH_LEVEL);
    let coordinator = VoiceCoordinator::start(
        fast_config(),
        VoiceBackends {
            stt: Some(Box::new(CountingStt::new("meeting notes"))),
            ..backends(Arc::new(device))
        },
    );

    coordinator.listen(RecordingMode::Notes).unwrap();
    assert_eq!(coordinator.state().state, VoicePhase::Listening);
    assert_eq!(
        coordinator.listen(RecordingMode::Assistant),
        Err(VoiceError::Busy(VoicePhase::Listening))
    );
    assert_eq!(
        coordinator.mock_wake("show news"),
        Err(VoiceError::Busy(VoicePhase::Listening))
    );
    assert_eq!(
        VoiceError::Busy(VoicePhase::Listening).to_string(),
        "voice coordinator busy (listening)"
    );

    assert!(coordinator.cancel());
    let state = coordinator.state();
    assert_eq!(state.state, VoicePhase::Idle);
    assert_eq!(state.last_transcript, None);
    assert!(!coordinator.cancel());
    coordinator.shutdown();
}

#[test]
fn stop_recording_finishes_notes_capture() {
    let device = ScriptedDevice::with_idle_level(SPEECH_LEVEL);
    let stt = CountingStt::new("buy milk and eggs");
    let coordinator = VoiceCoordinator::start(
        fast_config(),
        VoiceBackends {
            stt: Some(Box::new(stt.clone())),
            ..backends(Arc::new(device))
        },
    );

    assert!(!coordinator.stop_recording());
    coordinator.listen(RecordingMode::Notes).unwrap();
    thread::sleep(Duration::from_millis(100));
    assert!(coordinator.stop_recording());
    wait_until("transcript", || {
        coordinator.state().last_transcript.as_deref() == Some("buy milk and eggs")
    });
    wait_until("idle", || coordinator.state().state == VoicePhase::Idle);
    assert_eq!(stt.calls(), 1);
    coordinator.shutdown();
}

#[test]
fn cancel_during_transcription_discards_the_result() {
    let device = ScriptedDevice::with_idle_level(SPEECH_LEVEL);
    let (stt, release) = CountingStt::held("stale words");
    let coordinator = VoiceCoordinator::start(
        fast_config(),
        VoiceBackends {
            stt: Some(Box::new(stt.clone())),
            ..backends(Arc::new(device.clone()))
        },
    );

    coordinator.listen(RecordingMode::Notes).unwrap();
    wait_until("enough audio", || device.reads.load(Ordering::SeqCst) >= 6);
    assert!(coordinator.stop_recording());
    wait_until("transcription started", || stt.calls() == 1);
    assert_eq!(coordinator.state().state, VoicePhase::Thinking);

    assert!(coordinator.cancel());
    let state = coordinator.state();
    assert_eq!(state.state, VoicePhase::Idle);
    assert_eq!(state.last_transcript, None);

    // The stale call is still blocked; a new request is accepted anyway.
    assert_eq!(stt.finished(), 0);
    coordinator.listen(RecordingMode::Notes).unwrap();
    assert_eq!(coordinator.state().state, VoicePhase::Listening);

    release.send(()).unwrap();
    wait_until("stale call returned", || stt.finished() == 1);
    thread::sleep(Duration::from_millis(100));
    let state = coordinator.state();
    assert_eq!(state.state, VoicePhase::Listening);
    assert_eq!(state.last_transcript, None);
    assert_eq!(state.error, None);

    assert!(coordinator.cancel());
    wait_until("idle", || coordinator.state().state == VoicePhase::Idle);
    coordinator.shutdown();
}

#[test]
fn short_capture_skips_transcription() {
    let device = ScriptedDevice::default();
    let stt = CountingStt::new("unused");
    let config = VoiceConfig {
        min_command: Duration::from_secs(2),
        ..fast_config()
    };
    let coordinator = VoiceCoordinator::start(
        config,
        VoiceBackends {
            stt: Some(Box::new(stt.clone())),
            ..backends(Arc::new(device.clone()))
        },
    );

    device.script(&[SPEECH_LEVEL]);
    coordinator.listen(RecordingMode::Assistant).unwrap();
    wait_until("idle", || coordinator.state().state == VoicePhase::Idle);
    thread::sleep(Duration::from_millis(50));
    assert_eq!(stt.calls(), 0);
    assert_eq!(coordinator.state().last_transcript, None);
    coordinator.shutdown();
}

#[test]
fn transcription_failure_enters_error_until_next_request() {
    let device = ScriptedDevice::default();
    let stt = CountingStt::new("status report");
    stt.fail.store(true, Ordering::SeqCst);
    let coordinator = VoiceCoordinator::start(
        fast_config(),
        VoiceBackends {
            stt: Some(Box::new(stt.clone())),
            ..backends(Arc::new(device.clone()))
        },
    );

    device.script(&[SPEECH_LEVEL; 6]);
    coordinator.listen(RecordingMode::Assistant).unwrap();
    wait_until("error", || coordinator.state().state == VoicePhase::Error);
    let error = coordinator.state().error.unwrap_or_default();
    assert!(error.contains("connection refused"), "{error}");

    stt.fail.store(false, Ordering::SeqCst);
    device.script(&[SPEECH_LEVEL; 6]);
    coordinator.listen(RecordingMode::Assistant).unwrap();
    assert_eq!(coordinator.state().error, None);
    wait_until("transcript", || {
        coordinator.state().last_transcript.as_deref() == Some("status report")
    });
    coordinator.shutdown();
}

#[test]
fn missing_speech_backend_is_reported_as_error() {
    let device = ScriptedDevice::with_idle_level(SPEECH_LEVEL);
    let coordinator = VoiceCoordinator::start(fast_config(), backends(Arc::new(device)));
    assert!(!coordinator.status().capabilities.stt);

    coordinator.listen(RecordingMode::Assistant).unwrap();
    thread::sleep(Duration::from_millis(50));
    coordinator.stop_recording();
    wait_until("error", || coordinator.state().state == VoicePhase::Error);
    assert_eq!(
        coordinator.state().error.as_deref(),
        Some("speech-to-text not configured")
    );
    coordinator.shutdown();
}

#[test]
fn announcements_play_by_priority() {
    let (tts, release, spoken) = GatedTts::new();
    let device = ScriptedDevice::default();
    let config = VoiceConfig {
        speak_queue: 2,
        ..fast_config()
    };
    let coordinator = VoiceCoordinator::start(
        config,
        VoiceBackends {
            tts: Some(Box::new(tts)),
            ..backends(Arc::new(device.clone()))
        },
    );

    coordinator.speak("first", 0).unwrap();
    wait_until("synthesis", || coordinator.state().state == VoicePhase::Thinking);
    coordinator.speak("low", 0).unwrap();
    coordinator.speak("high", 5).unwrap();
    assert_eq!(coordinator.speak("overflow", 9), Err(VoiceError::QueueFull));

    release.send(()).unwrap();
    wait_until("queue drained", || spoken.lock().unwrap().len() == 3);
    wait_until("playback", || device.played.lock().unwrap().len() == 3);
    assert_eq!(*spoken.lock().unwrap(), ["first", "high", "low"]);
    wait_until("idle", || coordinator.state().state == VoicePhase::Idle);
    coordinator.shutdown();
}

#[test]
fn speak_validates_text_and_backend() {
    let coordinator = VoiceCoordinator::start(fast_config(), backends(Arc::new(MockAudio::default())));
    assert_eq!(
        coordinator.speak("hello", 0),
        Err(VoiceError::Unavailable("text-to-speech"))
    );
    coordinator.shutdown();

    let coordinator = VoiceCoordinator::start(
        fast_config(),
        VoiceBackends {
            tts: Some(Box::new(MockTts)),
            ..backends(Arc::new(MockAudio::default()))
        },
    );
    assert!(matches!(coordinator.speak("   ", 0), Err(VoiceError::InvalidInput(_))));
    let long = "a".repeat(5_001);
    assert!(matches!(coordinator.speak(&long, 0), Err(VoiceError::InvalidInput(_))));
    let padded = format!("{} ", "a".repeat(5_000));
    assert!(matches!(coordinator.speak(&padded, 0), Err(VoiceError::InvalidInput(_))));
    assert!(coordinator.speak(&"a".repeat(5_000), 0).is_ok());
    coordinator.shutdown();
}

#[test]
fn mock_audio_listen_uses_canned_transcript() {
    let coordinator = VoiceCoordinator::start(
        fast_config(),
        VoiceBackends {
            stt: Some(Box::new(MockStt::replying("ignored"))),
            ..backends(Arc::new(MockAudio::default()))
        },
    );
    assert!(coordinator.is_mock());
    assert!(!coordinator.status().capabilities.wake_word);

    coordinator.listen(RecordingMode::Assistant).unwrap();
    wait_until("transcript", || {
        coordinator.state().last_transcript.as_deref() == Some(MOCK_LISTEN_TRANSCRIPT)
    });
    wait_until("idle", || coordinator.state().state == VoicePhase::Idle);

    assert_eq!(
        coordinator.mock_wake("show news"),
        Ok(Some("show news".to_string()))
    );
    assert_eq!(coordinator.state().state, VoicePhase::Idle);
    coordinator.clear_transcript();
    assert_eq!(coordinator.state().last_transcript, None);
    coordinator.shutdown();
}

#[test]
fn disabled_voice_rejects_new_work() {
    let coordinator = VoiceCoordinator::start(
        fast_config(),
        VoiceBackends {
            tts: Some(Box::new(MockTts)),
            ..backends(Arc::new(MockAudio::default()))
        },
    );
    let status = coordinator.set_enabled(false);
    assert!(!status.voice.enabled);
    assert_eq!(coordinator.listen(RecordingMode::Assistant), Err(VoiceError::Disabled));
    assert_eq!(coordinator.mock_wake("show news"), Err(VoiceError::Disabled));
    assert_eq!(coordinator.speak("hello", 0), Err(VoiceError::Disabled));

    assert!(coordinator.set_enabled(true).voice.enabled);
    assert_eq!(coordinator.mock_wake("show news"), Ok(Some("show news".into())));
    coordinator.shutdown();
}

#[test]
fn volume_is_bounded() {
    let coordinator = VoiceCoordinator::start(fast_config(), backends(Arc::new(MockAudio::default())));
    assert_eq!(coordinator.volume(), 80);
    assert_eq!(coordinator.set_volume(40), Ok(40));
    assert_eq!(coordinator.volume(), 40);
    assert!(matches!(coordinator.set_volume(101), Err(VoiceError::InvalidInput(_))));
    assert_eq!(coordinator.state().tts_volume, 40);
    coordinator.shutdown();
}

#[test]
fn pause_and_resume_gate_wake_listening() {
    let device = ScriptedDevice::default();
    let stt = CountingStt::new("next slide please");
    let coordinator = VoiceCoordinator::start(
        fast_config(),
        VoiceBackends {
            wake: Some(Box::new(MarkerWake)),
            stt: Some(Box::new(stt.clone())),
            ..backends(Arc::new(device.clone()))
        },
    );

    coordinator.pause();
    thread::sleep(Duration::from_millis(150));
    let reads = device.reads.load(Ordering::SeqCst);
    device.script(&command_levels());
    thread::sleep(Duration::from_millis(200));
    assert_eq!(device.reads.load(Ordering::SeqCst), reads);

    coordinator.resume();
    wait_until("cycle after resume", || stt.calls() == 1);
    coordinator.shutdown();
}
