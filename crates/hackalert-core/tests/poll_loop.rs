mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{entry, instant_gate, sheet_of, MemorySource, RecordingSink};
use hackalert_core::{
    MessageStyle, Notification, PollLoop, PollState, SheetWatcher, TickError, TickOutcome,
};
use tokio::sync::Notify;

const INTERVAL: Duration = Duration::from_secs(10);

fn entries(count: usize) -> Vec<[String; 7]> {
    (1..=count)
        .map(|n| entry("3/1/2025 10:00:00", &format!("Hack {n}"), "20/04/2025"))
        .collect()
}

async fn poller(
    source: Arc<MemorySource>,
    sink: Arc<RecordingSink>,
    style: MessageStyle,
) -> PollLoop {
    let watcher = SheetWatcher::initialize(source, instant_gate())
        .await
        .expect("initialize");
    PollLoop::new(watcher, sink, style, INTERVAL)
}

#[tokio::test]
async fn dispatches_rows_in_sheet_order() {
    let source = Arc::new(MemorySource::new(sheet_of(&entries(3))));
    let sink = Arc::new(RecordingSink::new());
    let poll = poller(source, sink.clone(), MessageStyle::Text).await;

    let outcome = poll.tick().await.expect("tick");

    assert_eq!(outcome, TickOutcome::Completed { delivered: 3 });
    let texts = sink.sent_texts();
    assert_eq!(texts.len(), 3);
    for (n, text) in texts.iter().enumerate() {
        assert!(text.contains(&format!("🏆 Hack {}", n + 1)), "{text}");
    }
    assert_eq!(poll.state(), PollState::Idle);
}

#[tokio::test]
async fn nothing_is_resent_on_the_next_tick() {
    let source = Arc::new(MemorySource::new(sheet_of(&entries(2))));
    let sink = Arc::new(RecordingSink::new());
    let poll = poller(source, sink.clone(), MessageStyle::Text).await;

    poll.tick().await.expect("first tick");
    let second = poll.tick().await.expect("second tick");

    assert_eq!(second, TickOutcome::Completed { delivered: 0 });
    assert_eq!(sink.sent().len(), 2);
}

#[tokio::test]
async fn firing_during_a_scan_is_a_no_op() {
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let source = Arc::new(MemorySource::held(
        sheet_of(&entries(1)),
        entered.clone(),
        release.clone(),
    ));
    let sink = Arc::new(RecordingSink::new());
    let poll = Arc::new(poller(source.clone(), sink.clone(), MessageStyle::Text).await);

    let first = tokio::spawn({
        let poll = Arc::clone(&poll);
        async move { poll.tick().await }
    });
    entered.notified().await;

    assert_eq!(poll.state(), PollState::Scanning);
    let second = poll.tick().await.expect("second tick");
    assert_eq!(second, TickOutcome::Busy);
    assert_eq!(source.load_count(), 1);

    release.notify_one();
    let first = first.await.expect("join").expect("first tick");
    assert_eq!(first, TickOutcome::Completed { delivered: 1 });
    assert_eq!(poll.state(), PollState::Idle);
    assert_eq!(sink.sent().len(), 1);
}

#[tokio::test]
async fn dispatch_failure_abandons_the_rest_of_the_batch() {
    let source = Arc::new(MemorySource::new(sheet_of(&entries(3))));
    let sink = Arc::new(RecordingSink::failing_on(1));
    let poll = poller(source, sink.clone(), MessageStyle::Text).await;

    let err = poll.tick().await.expect_err("second send fails");
    match err {
        TickError::Dispatch {
            row_index,
            delivered,
            accepted,
            ..
        } => {
            assert_eq!(row_index, 2);
            assert_eq!(delivered, 1);
            assert_eq!(accepted, 3);
        }
    }
    assert_eq!(sink.sent().len(), 1);
    assert_eq!(poll.state(), PollState::Idle);

    // The watermark already moved: the abandoned rows are not retried.
    let next = poll.tick().await.expect("next tick");
    assert_eq!(next, TickOutcome::Completed { delivered: 0 });
    assert_eq!(sink.sent().len(), 1);
}

#[tokio::test]
async fn embed_style_sends_embeds() {
    let source = Arc::new(MemorySource::new(sheet_of(&entries(1))));
    let sink = Arc::new(RecordingSink::new());
    let poll = poller(source, sink.clone(), MessageStyle::Embed).await;

    poll.tick().await.expect("tick");

    match sink.sent().as_slice() {
        [Notification::Embed(embed)] => {
            assert!(embed.fields.iter().any(|field| field.value == "Hack 1"));
        }
        other => panic!("expected one embed, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn run_polls_on_the_interval_until_shutdown() {
    let source = Arc::new(MemorySource::new(sheet_of(&entries(2))));
    let sink = Arc::new(RecordingSink::new());
    let poll = Arc::new(poller(source.clone(), sink.clone(), MessageStyle::Text).await);

    poll.clone()
        .run(tokio::time::sleep(Duration::from_secs(35)))
        .await;
    tokio::task::yield_now().await;

    assert_eq!(source.load_count(), 3);
    assert_eq!(sink.sent().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn shutdown_waits_for_the_scan_in_progress() {
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let source = Arc::new(MemorySource::held(
        sheet_of(&entries(2)),
        entered.clone(),
        release.clone(),
    ));
    let sink = Arc::new(RecordingSink::new());
    let poll = Arc::new(poller(source, sink.clone(), MessageStyle::Text).await);

    let (stop, stopped) = tokio::sync::oneshot::channel::<()>();
    let running = tokio::spawn(poll.clone().run(async move {
        let _ = stopped.await;
    }));

    entered.notified().await;
    stop.send(()).expect("poll loop is listening");
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert!(!running.is_finished(), "run returned with a scan still in flight");

    release.notify_one();
    running.await.expect("join");
    assert_eq!(sink.sent().len(), 2);
    assert_eq!(poll.state(), PollState::Idle);
}
