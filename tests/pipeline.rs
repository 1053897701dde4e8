//! Orchestrator integration tests against scripted engines

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use elise_gateway::config::PipelineConfig;
use elise_gateway::persona::DEFAULT_FALLBACK_REPLY;
use elise_gateway::pipeline::Stage;
use elise_gateway::{
    AudioBuffer, AudioFormat, CancelFlag, CommandAction, PersonaTemplate, ResponseEnvelope,
    StageError,
};

mod common;
use common::{FAKE_MP3, Harness, wav_bytes};

fn recording() -> Option<AudioBuffer> {
    Some(AudioBuffer::from_upload(
        Bytes::from(wav_bytes()),
        Some("audio/wav"),
        Some("recording.wav"),
    ))
}

fn expect_action(envelope: &ResponseEnvelope) -> CommandAction {
    match envelope {
        ResponseEnvelope::Action(action) => *action,
        ResponseEnvelope::Audio(_) => panic!("expected an action, got audio"),
    }
}

fn expect_audio(envelope: &ResponseEnvelope) -> &AudioBuffer {
    match envelope {
        ResponseEnvelope::Audio(audio) => audio,
        ResponseEnvelope::Action(action) => panic!("expected audio, got {action:?}"),
    }
}

#[tokio::test]
async fn test_start_phrase_short_circuits() {
    let harness = Harness::new("Bonjour danse");
    let orchestrator = harness.orchestrator();

    let outcome = orchestrator
        .handle(recording(), &CancelFlag::new())
        .await
        .unwrap();

    assert_eq!(expect_action(&outcome.envelope), CommandAction::Dance);
    assert_eq!(harness.stt.meter.calls(), 1);
    assert_eq!(harness.llm.meter.calls(), 0);
    assert_eq!(harness.tts.meter.calls(), 0);
    assert!(outcome.timings.transcription.is_some());
    assert!(outcome.timings.generation.is_none());
    assert!(outcome.timings.synthesis.is_none());
}

#[tokio::test]
async fn test_stop_phrase_short_circuits() {
    let harness = Harness::new("  Arrête de danser, s'il te plaît. ");
    let orchestrator = harness.orchestrator();

    let outcome = orchestrator
        .handle(recording(), &CancelFlag::new())
        .await
        .unwrap();

    assert_eq!(expect_action(&outcome.envelope), CommandAction::StopDance);
    assert_eq!(harness.log.entries(), vec!["transcribe"]);
}

#[tokio::test]
async fn test_stop_wins_when_both_sets_match() {
    let harness = Harness::new("bonjour danse... non, arrête de danser");
    let outcome = harness
        .orchestrator()
        .handle(recording(), &CancelFlag::new())
        .await
        .unwrap();

    assert_eq!(expect_action(&outcome.envelope), CommandAction::StopDance);
}

#[tokio::test]
async fn test_question_runs_full_pipeline() {
    let harness = Harness::new("Quelle heure est-il ?");
    harness.llm.set_reply("  Il est midi.  ");
    let orchestrator = harness.orchestrator();

    let outcome = orchestrator
        .handle(recording(), &CancelFlag::new())
        .await
        .unwrap();

    let audio = expect_audio(&outcome.envelope);
    assert_eq!(audio.format(), AudioFormat::Mp3);
    assert_eq!(audio.as_bytes(), FAKE_MP3);

    assert_eq!(harness.log.entries(), vec!["transcribe", "generate", "synthesize"]);
    assert_eq!(harness.tts.texts(), vec!["Il est midi.".to_string()]);

    let prompts = harness.llm.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("Question: quelle heure est-il ?"));
    assert!(prompts[0].ends_with("### Réponse: "));

    assert!(outcome.timings.generation.is_some());
    assert!(outcome.timings.synthesis.is_some());
    assert!(outcome.timings.total >= outcome.timings.transcription.unwrap_or_default());
}

#[tokio::test]
async fn test_custom_persona_reaches_prompt() {
    let harness = Harness::new("raconte une blague");
    let orchestrator = harness
        .builder()
        .persona(PersonaTemplate::new("Tu es Zoé.", "Oups."))
        .build();

    orchestrator
        .handle(recording(), &CancelFlag::new())
        .await
        .unwrap();

    assert!(harness.llm.prompts()[0].starts_with("### Tu es Zoé. Question:"));
}

#[tokio::test]
async fn test_generation_failure_speaks_fallback() {
    let harness = Harness::new("quelle heure est-il");
    harness.llm.fail();

    let outcome = harness
        .orchestrator()
        .handle(recording(), &CancelFlag::new())
        .await
        .unwrap();

    expect_audio(&outcome.envelope);
    assert_eq!(harness.tts.texts(), vec![DEFAULT_FALLBACK_REPLY.to_string()]);
}

#[tokio::test]
async fn test_empty_generation_speaks_fallback() {
    let harness = Harness::new("quelle heure est-il");
    harness.llm.set_reply("   \n ");

    harness
        .orchestrator()
        .handle(recording(), &CancelFlag::new())
        .await
        .unwrap();

    assert_eq!(harness.tts.texts(), vec![DEFAULT_FALLBACK_REPLY.to_string()]);
}

#[tokio::test]
async fn test_synthesis_failure_is_error() {
    let harness = Harness::new("quelle heure est-il");
    harness.tts.fail();

    let err = harness
        .orchestrator()
        .handle(recording(), &CancelFlag::new())
        .await
        .unwrap_err();

    assert!(matches!(err, StageError::Synthesis(_)));
    assert_eq!(err.stage(), Some(Stage::Synthesis));
    assert_eq!(err.to_string(), "synthesis failed: voice service down");
}

#[tokio::test]
async fn test_silent_synthesis_is_error() {
    let harness = Harness::new("quelle heure est-il");
    harness.tts.go_silent();

    let err = harness
        .orchestrator()
        .handle(recording(), &CancelFlag::new())
        .await
        .unwrap_err();

    assert!(matches!(err, StageError::Synthesis(_)));
}

#[tokio::test]
async fn test_transcription_failure_is_error() {
    let harness = Harness::new("bonjour danse");
    harness.stt.fail();

    let err = harness
        .orchestrator()
        .handle(recording(), &CancelFlag::new())
        .await
        .unwrap_err();

    assert!(matches!(err, StageError::Transcription(_)));
    assert_eq!(err.to_string(), "transcription failed: model crashed");
    assert_eq!(harness.llm.meter.calls(), 0);
    assert_eq!(harness.tts.meter.calls(), 0);
}

#[tokio::test]
async fn test_missing_audio_invokes_no_engine() {
    let harness = Harness::new("bonjour danse");

    let err = harness
        .orchestrator()
        .handle(None, &CancelFlag::new())
        .await
        .unwrap_err();

    assert!(err.is_input());
    assert_eq!(harness.total_calls(), 0);
}

#[tokio::test]
async fn test_empty_audio_invokes_no_engine() {
    let harness = Harness::new("bonjour danse");
    let empty = AudioBuffer::from_upload(Bytes::new(), Some("audio/wav"), Some("recording.wav"));

    let err = harness
        .orchestrator()
        .handle(Some(empty), &CancelFlag::new())
        .await
        .unwrap_err();

    assert!(err.is_input());
    assert_eq!(harness.total_calls(), 0);
}

#[tokio::test]
async fn test_empty_transcript_goes_to_generation() {
    let harness = Harness::new("   ");

    let outcome = harness
        .orchestrator()
        .handle(recording(), &CancelFlag::new())
        .await
        .unwrap();

    expect_audio(&outcome.envelope);
    assert_eq!(harness.llm.meter.calls(), 1);
}

#[tokio::test]
async fn test_scratch_file_is_unique_and_removed() {
    let root = tempfile::tempdir().unwrap();
    let harness = Harness::new("quelle heure est-il");
    let orchestrator = harness
        .builder()
        .scratch_root(root.path().to_path_buf())
        .build();

    for _ in 0..2 {
        orchestrator
            .handle(recording(), &CancelFlag::new())
            .await
            .unwrap();
    }

    let seen = harness.stt.seen_paths();
    assert_eq!(seen.len(), 2);
    assert!(seen.iter().all(|(_, existed)| *existed));
    assert_ne!(seen[0].0, seen[1].0);
    assert!(seen.iter().all(|(path, _)| path.starts_with(root.path())));
    assert!(seen.iter().all(|(path, _)| !path.exists()));

    let leftovers = std::fs::read_dir(root.path()).unwrap().count();
    assert_eq!(leftovers, 0);
}

#[tokio::test]
async fn test_scratch_removed_on_failure() {
    let root = tempfile::tempdir().unwrap();
    let harness = Harness::new("quelle heure est-il");
    harness.stt.fail();
    let orchestrator = harness
        .builder()
        .scratch_root(root.path().to_path_buf())
        .build();

    assert!(orchestrator.handle(recording(), &CancelFlag::new()).await.is_err());
    assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_serialized_engines_never_overlap() {
    let harness = Harness::new("quelle heure est-il");
    harness.stt.set_delay(Duration::from_millis(20));
    harness.llm.set_delay(Duration::from_millis(20));
    harness.tts.set_delay(Duration::from_millis(20));
    let orchestrator = Arc::new(harness.orchestrator());
    assert!(orchestrator.transcription().is_serialized());

    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                orchestrator
                    .handle(recording(), &CancelFlag::new())
                    .await
                    .map(|outcome| outcome.request_id)
            })
        })
        .collect();

    let mut ids = Vec::new();
    for task in tasks {
        ids.push(task.await.unwrap().unwrap());
    }
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 4);

    assert_eq!(harness.stt.meter.calls(), 4);
    assert!(!harness.stt.meter.overlapped());
    assert!(!harness.llm.meter.overlapped());
    assert!(!harness.tts.meter.overlapped());
}

#[tokio::test]
async fn test_unserialized_engines_may_overlap() {
    let harness = Harness::new("quelle heure est-il");
    harness.stt.set_delay(Duration::from_millis(50));
    let orchestrator = Arc::new(
        harness
            .builder()
            .pipeline_config(PipelineConfig {
                serialize_engines: false,
                ..PipelineConfig::default()
            })
            .build(),
    );
    assert!(!orchestrator.transcription().is_serialized());

    let a = orchestrator.clone();
    let b = orchestrator.clone();
    let cancel = CancelFlag::new();
    let (ra, rb) = tokio::join!(
        a.handle(recording(), &cancel),
        b.handle(recording(), &cancel)
    );

    assert!(ra.is_ok() && rb.is_ok());
    assert!(harness.stt.meter.overlapped());
}

#[tokio::test]
async fn test_transcription_timeout() {
    let harness = Harness::new("bonjour danse");
    harness.stt.set_delay(Duration::from_millis(500));
    let orchestrator = harness
        .builder()
        .pipeline_config(PipelineConfig {
            transcription_timeout: Some(Duration::from_millis(20)),
            ..PipelineConfig::default()
        })
        .build();

    let err = orchestrator
        .handle(recording(), &CancelFlag::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        StageError::Timeout {
            stage: Stage::Transcription,
            ..
        }
    ));
    assert_eq!(harness.llm.meter.calls(), 0);
}

#[tokio::test]
async fn test_generation_timeout_speaks_fallback() {
    let harness = Harness::new("quelle heure est-il");
    harness.llm.set_delay(Duration::from_millis(500));
    let orchestrator = harness
        .builder()
        .pipeline_config(PipelineConfig {
            generation_timeout: Some(Duration::from_millis(20)),
            ..PipelineConfig::default()
        })
        .build();

    let outcome = orchestrator
        .handle(recording(), &CancelFlag::new())
        .await
        .unwrap();

    expect_audio(&outcome.envelope);
    assert_eq!(harness.tts.texts(), vec![DEFAULT_FALLBACK_REPLY.to_string()]);
}

#[tokio::test]
async fn test_synthesis_timeout() {
    let harness = Harness::new("quelle heure est-il");
    harness.tts.set_delay(Duration::from_millis(500));
    let orchestrator = harness
        .builder()
        .pipeline_config(PipelineConfig {
            synthesis_timeout: Some(Duration::from_millis(20)),
            ..PipelineConfig::default()
        })
        .build();

    let err = orchestrator
        .handle(recording(), &CancelFlag::new())
        .await
        .unwrap_err();

    assert_eq!(err.stage(), Some(Stage::Synthesis));
    assert!(matches!(err, StageError::Timeout { .. }));
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let harness = Harness::new("quelle heure est-il");
    let cancel = CancelFlag::new();
    cancel.cancel();

    let err = harness
        .orchestrator()
        .handle(recording(), &cancel)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        StageError::Cancelled {
            stage: Stage::Transcription
        }
    ));
    assert_eq!(harness.total_calls(), 0);
}

#[tokio::test]
async fn test_cancel_during_transcription_stops_before_generation() {
    let harness = Harness::new("quelle heure est-il");
    let cancel = CancelFlag::new();
    harness.stt.cancel_during(cancel.clone());

    let err = harness
        .orchestrator()
        .handle(recording(), &cancel)
        .await
        .unwrap_err();

    // The in-flight transcription finished; nothing after it started
    assert_eq!(harness.stt.meter.calls(), 1);
    assert!(matches!(
        err,
        StageError::Cancelled {
            stage: Stage::Generation
        }
    ));
    assert_eq!(harness.llm.meter.calls(), 0);
    assert_eq!(harness.tts.meter.calls(), 0);
}

#[tokio::test]
async fn test_cancel_during_generation_stops_before_synthesis() {
    let harness = Harness::new("quelle heure est-il");
    let cancel = CancelFlag::new();
    harness.llm.cancel_during(cancel.clone());

    let err = harness
        .orchestrator()
        .handle(recording(), &cancel)
        .await
        .unwrap_err();

    assert_eq!(harness.llm.meter.calls(), 1);
    assert!(matches!(
        err,
        StageError::Cancelled {
            stage: Stage::Synthesis
        }
    ));
    assert_eq!(harness.tts.meter.calls(), 0);
}

#[tokio::test]
async fn test_request_cancelled_while_queued_skips_transcription() {
    let harness = Harness::new("quelle heure est-il");
    harness.stt.set_delay(Duration::from_millis(200));
    let orchestrator = Arc::new(harness.orchestrator());

    let first = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.handle(recording(), &CancelFlag::new()).await })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;

    let cancel = CancelFlag::new();
    let second = {
        let orchestrator = orchestrator.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { orchestrator.handle(recording(), &cancel).await })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;

    // The second request is waiting on the transcription guard
    assert_eq!(harness.stt.meter.calls(), 1);
    cancel.cancel();

    assert!(first.await.unwrap().is_ok());
    let err = second.await.unwrap().unwrap_err();
    assert!(matches!(
        err,
        StageError::Cancelled {
            stage: Stage::Transcription
        }
    ));
    assert_eq!(harness.stt.meter.calls(), 1);
}

#[tokio::test]
async fn test_request_cancelled_while_queued_skips_generation() {
    let harness = Harness::new("quelle heure est-il");
    harness.llm.set_delay(Duration::from_millis(200));
    let orchestrator = Arc::new(harness.orchestrator());

    let first = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.handle(recording(), &CancelFlag::new()).await })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;

    let cancel = CancelFlag::new();
    let second = {
        let orchestrator = orchestrator.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { orchestrator.handle(recording(), &cancel).await })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;

    // Both transcribed; the second is waiting on the generation guard
    assert_eq!(harness.stt.meter.calls(), 2);
    assert_eq!(harness.llm.meter.calls(), 1);
    cancel.cancel();

    assert!(first.await.unwrap().is_ok());
    let err = second.await.unwrap().unwrap_err();
    assert!(matches!(
        err,
        StageError::Cancelled {
            stage: Stage::Generation
        }
    ));
    assert_eq!(harness.llm.meter.calls(), 1);
    assert_eq!(harness.tts.meter.calls(), 1);
}

#[tokio::test]
async fn test_cancel_after_transcription_still_short_circuits() {
    let harness = Harness::new("bonjour danse");
    let cancel = CancelFlag::new();
    harness.stt.cancel_during(cancel.clone());

    // A recognized command needs no further stage, so it still completes
    let outcome = harness
        .orchestrator()
        .handle(recording(), &cancel)
        .await
        .unwrap();

    assert_eq!(expect_action(&outcome.envelope), CommandAction::Dance);
}

#[tokio::test]
async fn test_disconnect_guard_cancels_on_drop() {
    let cancel = CancelFlag::new();
    {
        let _guard = cancel.cancel_on_drop();
    }
    assert!(cancel.is_cancelled());

    let cancel = CancelFlag::new();
    cancel.cancel_on_drop().disarm();
    assert!(!cancel.is_cancelled());
}
