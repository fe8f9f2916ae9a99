//! End-to-end mediator sessions over scripted and bundled endpoints.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use voxbridge::device::{DeviceEndpoint, MockCaptureDevice, MockPlaybackDevice};
use voxbridge::forward::{
    MemoryStore, ProgressUpdate, SessionStatus, Speaker, StoreForwarder, TranscriptForwarder,
};
use voxbridge::{
    AudioChunk, FlowKind, ScriptedEndpoint, StreamEndpoint, StreamEvent, StreamMediator,
    VoxbridgeError,
};

const GRACE: Duration = Duration::from_millis(50);

fn mediator(endpoints: Vec<Arc<dyn StreamEndpoint>>) -> StreamMediator {
    StreamMediator::new(endpoints).with_grace_period(GRACE)
}

/// Polls until `condition` holds or the deadline passes.
async fn wait_for(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached within deadline"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn fan_out_reaches_every_other_endpoint() {
    let a = Arc::new(
        ScriptedEndpoint::new("a").with_script(vec![StreamEvent::output_transcript("a", "hi")]),
    );
    let b = Arc::new(ScriptedEndpoint::new("b"));
    let c = Arc::new(ScriptedEndpoint::new("c"));

    let mediator = mediator(vec![a.clone(), b.clone(), c.clone()]);
    let stop = mediator.stop_signal();
    let session = tokio::spawn(mediator.run());

    wait_for(|| b.delivered().len() == 1 && c.delivered().len() == 1).await;
    stop.set();
    timeout(Duration::from_secs(2), session)
        .await
        .expect("session should end after cancellation")
        .unwrap()
        .unwrap();

    // B and C each received the exact event; A never hears its own echo.
    for receiver in [&b, &c] {
        let delivered = receiver.delivered();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].originator, "a");
        assert_eq!(delivered[0].output_transcription.as_deref(), Some("hi"));
    }
    assert!(a.delivered().is_empty());

    for endpoint in [&a, &b, &c] {
        assert_eq!(endpoint.close_count(), 1);
        assert_eq!(endpoint.initialize_count(), 1);
    }
}

#[tokio::test]
async fn end_session_from_any_endpoint_stops_everyone() {
    let a = Arc::new(ScriptedEndpoint::new("a"));
    let b = Arc::new(ScriptedEndpoint::new("b").with_script(vec![StreamEvent::end_session("b")]));
    let c = Arc::new(ScriptedEndpoint::new("c"));

    timeout(
        Duration::from_secs(2),
        mediator(vec![a.clone(), b.clone(), c.clone()]).run(),
    )
    .await
    .expect("end_session should terminate the session")
    .unwrap();

    for endpoint in [&a, &b, &c] {
        assert!(endpoint.channels().is_stopping(), "stop signal must be set");
        assert_eq!(endpoint.close_count(), 1, "close exactly once");
    }
}

#[tokio::test]
async fn end_session_is_not_fanned_out() {
    let a = Arc::new(ScriptedEndpoint::new("a"));
    let b = Arc::new(ScriptedEndpoint::new("b").with_script(vec![StreamEvent::end_session("b")]));

    timeout(
        Duration::from_secs(2),
        mediator(vec![a.clone(), b.clone()]).run(),
    )
    .await
    .expect("session should end")
    .unwrap();

    assert!(
        a.delivered().is_empty(),
        "the end_session control event terminates routing instead of being delivered"
    );
}

#[tokio::test]
async fn production_failure_tears_down_and_surfaces() {
    let a = Arc::new(ScriptedEndpoint::new("a"));
    let b = Arc::new(ScriptedEndpoint::new("b").with_production_failure("socket torn"));
    let c = Arc::new(ScriptedEndpoint::new("c"));

    let error = timeout(
        Duration::from_secs(2),
        mediator(vec![a.clone(), b.clone(), c.clone()]).run(),
    )
    .await
    .expect("failed session should still return")
    .unwrap_err();

    match error {
        VoxbridgeError::FlowFailure {
            endpoint,
            flow,
            message,
        } => {
            assert_eq!(endpoint, "b");
            assert_eq!(flow, FlowKind::Production);
            assert!(message.contains("socket torn"));
        }
        other => panic!("expected FlowFailure, got: {other}"),
    }

    for endpoint in [&a, &b, &c] {
        assert_eq!(endpoint.close_count(), 1, "teardown runs on the error path");
    }
}

#[tokio::test]
async fn delivery_failure_tears_down_and_surfaces() {
    let a = Arc::new(
        ScriptedEndpoint::new("a").with_script(vec![StreamEvent::output_transcript("a", "x")]),
    );
    let b = Arc::new(ScriptedEndpoint::new("b").with_delivery_failure("disk full"));

    let error = timeout(
        Duration::from_secs(2),
        mediator(vec![a.clone(), b.clone()]).run(),
    )
    .await
    .expect("failed session should still return")
    .unwrap_err();

    match error {
        VoxbridgeError::FlowFailure { endpoint, flow, .. } => {
            assert_eq!(endpoint, "b");
            assert_eq!(flow, FlowKind::Delivery);
        }
        other => panic!("expected FlowFailure, got: {other}"),
    }
    assert_eq!(a.close_count(), 1);
    assert_eq!(b.close_count(), 1);
}

#[tokio::test]
async fn close_failure_does_not_block_sibling_teardown() {
    let a = Arc::new(ScriptedEndpoint::new("a").with_close_failure("leak"));
    let b = Arc::new(ScriptedEndpoint::new("b").with_script(vec![StreamEvent::end_session("b")]));
    let c = Arc::new(ScriptedEndpoint::new("c"));

    timeout(
        Duration::from_secs(2),
        mediator(vec![a.clone(), b.clone(), c.clone()]).run(),
    )
    .await
    .expect("session should end")
    .expect("a close failure is swallowed, not surfaced");

    for endpoint in [&a, &b, &c] {
        assert_eq!(endpoint.close_count(), 1);
    }
}

#[tokio::test]
async fn per_producer_order_is_preserved_through_fan_out() {
    let a = Arc::new(ScriptedEndpoint::new("a").with_script(vec![
        StreamEvent::output_transcript("a", "first"),
        StreamEvent::output_transcript("a", "second"),
        StreamEvent::output_transcript("a", "third"),
    ]));
    let b = Arc::new(ScriptedEndpoint::new("b"));

    let mediator = mediator(vec![a.clone(), b.clone()]);
    let stop = mediator.stop_signal();
    let session = tokio::spawn(mediator.run());

    wait_for(|| b.delivered().len() == 3).await;
    stop.set();
    timeout(Duration::from_secs(2), session)
        .await
        .expect("session should end")
        .unwrap()
        .unwrap();

    let texts: Vec<_> = b
        .delivered()
        .iter()
        .map(|event| event.output_transcription.clone().unwrap())
        .collect();
    assert_eq!(texts, ["first", "second", "third"]);
}

#[tokio::test]
async fn pending_deliveries_drain_during_grace_period() {
    // C has produced two events by the time B raises end_session; A's pending
    // deliveries drain inside the grace period.
    let a = Arc::new(ScriptedEndpoint::new("a"));
    let b = Arc::new(
        ScriptedEndpoint::new("b")
            .with_pacing(Duration::from_millis(40))
            .with_script(vec![StreamEvent::end_session("b")]),
    );
    let c = Arc::new(ScriptedEndpoint::new("c").with_script(vec![
        StreamEvent::output_transcript("c", "one"),
        StreamEvent::output_transcript("c", "two"),
    ]));

    timeout(
        Duration::from_secs(2),
        mediator(vec![a.clone(), b.clone(), c.clone()]).run(),
    )
    .await
    .expect("session should end")
    .unwrap();

    assert_eq!(a.delivered().len(), 2, "pending deliveries drained");
    for endpoint in [&a, &b, &c] {
        assert_eq!(endpoint.close_count(), 1);
    }
}

#[tokio::test]
async fn external_cancellation_closes_everyone_and_returns_ok() {
    let a = Arc::new(ScriptedEndpoint::new("a"));
    let b = Arc::new(
        ScriptedEndpoint::new("b").with_script(vec![StreamEvent::output_transcript("b", "talk")]),
    );
    let c = Arc::new(ScriptedEndpoint::new("c"));

    let mediator = mediator(vec![a.clone(), b.clone(), c.clone()]);
    let stop = mediator.stop_signal();
    let session = tokio::spawn(mediator.run());

    wait_for(|| a.delivered().len() == 1 && c.delivered().len() == 1).await;
    stop.set();

    timeout(Duration::from_secs(2), session)
        .await
        .expect("cancelled session should return within the grace period")
        .unwrap()
        .expect("external cancellation is a clean completion, not a failure");

    for endpoint in [&a, &b, &c] {
        assert!(endpoint.channels().is_stopping());
        assert_eq!(endpoint.close_count(), 1);
    }
}

#[tokio::test]
async fn end_of_source_shuts_the_whole_session_down() {
    // A source that closes normally is converted into the uniform shutdown
    // path, not an error.
    let a = Arc::new(ScriptedEndpoint::new("a").with_end_of_source());
    let b = Arc::new(ScriptedEndpoint::new("b"));

    timeout(
        Duration::from_secs(2),
        mediator(vec![a.clone(), b.clone()]).run(),
    )
    .await
    .expect("session should end")
    .unwrap();

    assert_eq!(a.close_count(), 1);
    assert_eq!(b.close_count(), 1);
}

#[tokio::test]
async fn full_stack_session_with_bundled_endpoints() {
    // A scripted voice session speaks, the device endpoint plays the audio,
    // the transcript forwarder renders it, and the store records progress.
    let voice = Arc::new(
        ScriptedEndpoint::new("voice_session")
            .with_script(vec![
                StreamEvent::input_transcript("voice_session", "what time is it"),
                StreamEvent::audio("voice_session", AudioChunk::pcm(vec![3, 3, 3])),
                StreamEvent::output_transcript("voice_session", "it is noon"),
            ])
            .with_end_of_source(),
    );

    let playback = MockPlaybackDevice::new();
    let played = playback.written();
    let speakermic = Arc::new(DeviceEndpoint::new(
        "speakermic",
        Box::new(MockCaptureDevice::new(Vec::new()).endless()),
        Box::new(playback),
    ));

    let (transcript_tx, mut transcript_rx) = mpsc::channel(16);
    let transcripts = Arc::new(TranscriptForwarder::new(transcript_tx));

    let store = Arc::new(MemoryStore::new());
    let persistence = Arc::new(StoreForwarder::new("session-7", store.clone()));

    timeout(
        Duration::from_secs(5),
        mediator(vec![voice, speakermic, transcripts, persistence]).run(),
    )
    .await
    .expect("session should end when the voice source closes")
    .unwrap();

    // Audio reached the playback device.
    let played = played
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .clone();
    assert_eq!(played, vec![vec![3, 3, 3]]);

    // Transcripts reached the live consumer, both sides attributed.
    let first = transcript_rx.recv().await.unwrap();
    assert_eq!(first.speaker, Speaker::Human);
    assert_eq!(first.text, "what time is it");
    let second = transcript_rx.recv().await.unwrap();
    assert_eq!(second.speaker, Speaker::Assistant);
    assert_eq!(second.text, "it is noon");

    // The store saw the whole lifecycle and both transcript updates.
    assert_eq!(
        store.statuses(),
        vec![
            ("session-7".to_string(), SessionStatus::InProgress),
            ("session-7".to_string(), SessionStatus::Finished),
        ]
    );
    let updates = store.updates();
    assert_eq!(updates.len(), 2);
    assert_eq!(
        updates[0].1,
        ProgressUpdate::InputTranscript {
            value: "what time is it".to_string()
        }
    );
    assert_eq!(
        updates[1].1,
        ProgressUpdate::OutputTranscript {
            value: "it is noon".to_string()
        }
    );
}
