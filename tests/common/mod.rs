//! Shared test utilities: scripted engines and multipart helpers

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use elise_gateway::engines::AudioInput;
use elise_gateway::pipeline::OrchestratorBuilder;
use elise_gateway::{
    CancelFlag, Engines, Error, GenerationEngine, GenerationRequest, IntentMatcher, Orchestrator,
    Result, SynthesisEngine, TaskMode, TranscriptionEngine,
};

/// Bytes returned by the scripted synthesis engine
pub const FAKE_MP3: &[u8] = b"ID3\x04\x00fake-mp3-frames";

/// Minimal WAV upload (valid header, silent)
#[must_use]
pub fn wav_bytes() -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 16_000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).expect("wav writer");
        for _ in 0..1_600 {
            writer.write_sample(0_i16).expect("wav sample");
        }
        writer.finalize().expect("wav finalize");
    }
    cursor.into_inner()
}

/// Ordered record of engine calls across all engines
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<&'static str>>>);

impl CallLog {
    fn push(&self, entry: &'static str) {
        self.0.lock().expect("call log").push(entry);
    }

    #[must_use]
    pub fn entries(&self) -> Vec<&'static str> {
        self.0.lock().expect("call log").clone()
    }
}

/// Counts calls and detects two calls being in flight at once
#[derive(Default)]
pub struct CallMeter {
    calls: AtomicUsize,
    busy: AtomicBool,
    overlapped: AtomicBool,
}

impl CallMeter {
    async fn enter(&self, delay: Duration) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.busy.swap(true, Ordering::SeqCst) {
            self.overlapped.store(true, Ordering::SeqCst);
        }
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.busy.store(false, Ordering::SeqCst);
    }

    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Whether two calls ever ran concurrently
    #[must_use]
    pub fn overlapped(&self) -> bool {
        self.overlapped.load(Ordering::SeqCst)
    }
}

/// Scripted speech-to-text engine
pub struct MockTranscriber {
    pub meter: CallMeter,
    transcript: Mutex<String>,
    fail: AtomicBool,
    delay: Mutex<Duration>,
    cancel_during: Mutex<Option<CancelFlag>>,
    seen_paths: Mutex<Vec<(PathBuf, bool)>>,
    log: CallLog,
}

impl MockTranscriber {
    fn new(transcript: &str, log: CallLog) -> Self {
        Self {
            meter: CallMeter::default(),
            transcript: Mutex::new(transcript.to_string()),
            fail: AtomicBool::new(false),
            delay: Mutex::new(Duration::ZERO),
            cancel_during: Mutex::new(None),
            seen_paths: Mutex::new(Vec::new()),
            log,
        }
    }

    pub fn set_transcript(&self, transcript: &str) {
        *self.transcript.lock().expect("transcript") = transcript.to_string();
    }

    pub fn fail(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().expect("delay") = delay;
    }

    /// Raise `flag` while the transcription call is in flight
    pub fn cancel_during(&self, flag: CancelFlag) {
        *self.cancel_during.lock().expect("cancel") = Some(flag);
    }

    /// Scratch paths handed to the engine, and whether each existed at call time
    #[must_use]
    pub fn seen_paths(&self) -> Vec<(PathBuf, bool)> {
        self.seen_paths.lock().expect("paths").clone()
    }
}

#[async_trait]
impl TranscriptionEngine for MockTranscriber {
    async fn transcribe(&self, audio: AudioInput<'_>, _language: &str, _task: TaskMode) -> Result<String> {
        self.log.push("transcribe");
        self.seen_paths
            .lock()
            .expect("paths")
            .push((audio.path.to_path_buf(), audio.path.is_file()));

        let delay = *self.delay.lock().expect("delay");
        self.meter.enter(delay).await;

        if let Some(flag) = self.cancel_during.lock().expect("cancel").as_ref() {
            flag.cancel();
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Transcription("model crashed".to_string()));
        }
        Ok(self.transcript.lock().expect("transcript").clone())
    }

    fn name(&self) -> &'static str {
        "mock-stt"
    }
}

/// Scripted generation engine
pub struct MockGenerator {
    pub meter: CallMeter,
    reply: Mutex<String>,
    fail: AtomicBool,
    delay: Mutex<Duration>,
    cancel_during: Mutex<Option<CancelFlag>>,
    prompts: Mutex<Vec<String>>,
    log: CallLog,
}

impl MockGenerator {
    fn new(log: CallLog) -> Self {
        Self {
            meter: CallMeter::default(),
            reply: Mutex::new("Il est midi.".to_string()),
            fail: AtomicBool::new(false),
            delay: Mutex::new(Duration::ZERO),
            cancel_during: Mutex::new(None),
            prompts: Mutex::new(Vec::new()),
            log,
        }
    }

    pub fn set_reply(&self, reply: &str) {
        *self.reply.lock().expect("reply") = reply.to_string();
    }

    pub fn fail(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().expect("delay") = delay;
    }

    /// Raise `flag` while the generation call is in flight
    pub fn cancel_during(&self, flag: CancelFlag) {
        *self.cancel_during.lock().expect("cancel") = Some(flag);
    }

    #[must_use]
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("prompts").clone()
    }
}

#[async_trait]
impl GenerationEngine for MockGenerator {
    async fn complete(&self, request: &GenerationRequest) -> Result<String> {
        self.log.push("generate");
        self.prompts.lock().expect("prompts").push(request.prompt.clone());

        let delay = *self.delay.lock().expect("delay");
        self.meter.enter(delay).await;

        if let Some(flag) = self.cancel_during.lock().expect("cancel").as_ref() {
            flag.cancel();
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Generation("llama server unreachable".to_string()));
        }
        Ok(self.reply.lock().expect("reply").clone())
    }

    fn name(&self) -> &'static str {
        "mock-llm"
    }
}

/// Scripted synthesis engine
pub struct MockSynthesizer {
    pub meter: CallMeter,
    fail: AtomicBool,
    silent: AtomicBool,
    delay: Mutex<Duration>,
    texts: Mutex<Vec<String>>,
    log: CallLog,
}

impl MockSynthesizer {
    fn new(log: CallLog) -> Self {
        Self {
            meter: CallMeter::default(),
            fail: AtomicBool::new(false),
            silent: AtomicBool::new(false),
            delay: Mutex::new(Duration::ZERO),
            texts: Mutex::new(Vec::new()),
            log,
        }
    }

    pub fn fail(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    /// Return zero bytes instead of audio
    pub fn go_silent(&self) {
        self.silent.store(true, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().expect("delay") = delay;
    }

    /// Texts the engine was asked to speak
    #[must_use]
    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().expect("texts").clone()
    }
}

#[async_trait]
impl SynthesisEngine for MockSynthesizer {
    async fn synthesize(&self, text: &str, _voice: &str) -> Result<Vec<u8>> {
        self.log.push("synthesize");
        self.texts.lock().expect("texts").push(text.to_string());

        let delay = *self.delay.lock().expect("delay");
        self.meter.enter(delay).await;

        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Synthesis("voice service down".to_string()));
        }
        if self.silent.load(Ordering::SeqCst) {
            return Ok(Vec::new());
        }
        Ok(FAKE_MP3.to_vec())
    }

    fn name(&self) -> &'static str {
        "mock-tts"
    }
}

/// Three scripted engines sharing one call log
pub struct Harness {
    pub stt: Arc<MockTranscriber>,
    pub llm: Arc<MockGenerator>,
    pub tts: Arc<MockSynthesizer>,
    pub log: CallLog,
}

impl Harness {
    /// Engines whose transcription returns `transcript`
    #[must_use]
    pub fn new(transcript: &str) -> Self {
        let log = CallLog::default();
        Self {
            stt: Arc::new(MockTranscriber::new(transcript, log.clone())),
            llm: Arc::new(MockGenerator::new(log.clone())),
            tts: Arc::new(MockSynthesizer::new(log.clone())),
            log,
        }
    }

    #[must_use]
    pub fn engines(&self) -> Engines {
        Engines {
            transcription: self.stt.clone(),
            generation: self.llm.clone(),
            synthesis: self.tts.clone(),
        }
    }

    /// Builder over the built-in command phrases
    #[must_use]
    pub fn builder(&self) -> OrchestratorBuilder {
        let matcher = IntentMatcher::builtin().expect("builtin phrases are valid");
        Orchestrator::builder(self.engines(), Arc::new(matcher))
    }

    #[must_use]
    pub fn orchestrator(&self) -> Orchestrator {
        self.builder().build()
    }

    /// Total calls across the three engines
    #[must_use]
    pub fn total_calls(&self) -> usize {
        self.stt.meter.calls() + self.llm.meter.calls() + self.tts.meter.calls()
    }
}

/// Boundary used by [`multipart_body`]
pub const BOUNDARY: &str = "elise-test-boundary";

/// Encode one file part as a `multipart/form-data` body
#[must_use]
pub fn multipart_body(field: &str, file_name: &str, content_type: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\n")
            .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

/// `Content-Type` header value matching [`multipart_body`]
#[must_use]
pub fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={BOUNDARY}")
}
