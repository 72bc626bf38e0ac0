//! Animation timeline ordering and teardown.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use conquest_reconcile::{AnimationTask, TaskCancelled, TaskSequencer};
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_test::{assert_pending, assert_ready_eq};

type Spans = Arc<Mutex<Vec<(&'static str, Instant, Instant)>>>;

fn timed(spans: &Spans, label: &'static str, work: u64, planned: u64) -> AnimationTask {
    let spans = Arc::clone(spans);
    AnimationTask::new(label, Duration::from_millis(planned), move || async move {
        let start = Instant::now();
        tokio::time::sleep(Duration::from_millis(work)).await;
        spans.lock().unwrap().push((label, start, Instant::now()));
        anyhow::Ok(())
    })
}

#[tokio::test(start_paused = true)]
async fn tasks_run_in_order_without_overlap() {
    let sequencer = TaskSequencer::spawn();
    let spans: Spans = Arc::default();

    let handles = vec![
        sequencer.enqueue(timed(&spans, "t1", 50, 200)),
        sequencer.enqueue(timed(&spans, "t2", 300, 100)),
        sequencer.enqueue(timed(&spans, "t3", 0, 0)),
        sequencer.enqueue(timed(&spans, "t4", 10, 500)),
    ];
    for handle in handles {
        handle.await.unwrap();
    }

    let spans = spans.lock().unwrap();
    let labels: Vec<_> = spans.iter().map(|(label, _, _)| *label).collect();
    assert_eq!(labels, vec!["t1", "t2", "t3", "t4"]);

    // t1 occupies its planned 200ms even though its effect took 50ms
    assert!(spans[1].1 - spans[0].1 >= Duration::from_millis(200));
    for pair in spans.windows(2) {
        assert!(pair[1].1 >= pair[0].2, "{} overlapped {}", pair[1].0, pair[0].0);
    }
}

#[tokio::test(start_paused = true)]
async fn handle_stays_pending_until_planned_duration() {
    let sequencer = TaskSequencer::spawn();
    let mut handle = tokio_test::task::spawn(
        sequencer.enqueue(AnimationTask::pause(Duration::from_millis(100))),
    );

    assert_pending!(handle.poll());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_pending!(handle.poll());
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_ready_eq!(handle.poll(), Ok(()));
}

#[tokio::test(start_paused = true)]
async fn producers_get_independent_handles() {
    let sequencer = TaskSequencer::spawn();
    let other = sequencer.clone();

    let first = sequencer.enqueue(AnimationTask::pause(Duration::from_millis(300)));
    let second = other.enqueue(AnimationTask::pause(Duration::from_millis(300)));

    let start = Instant::now();
    first.await.unwrap();
    assert!(start.elapsed() >= Duration::from_millis(300));
    assert!(start.elapsed() < Duration::from_millis(600));

    second.await.unwrap();
    assert!(start.elapsed() >= Duration::from_millis(600));
}

#[tokio::test(start_paused = true)]
async fn clear_drops_pending_tasks_and_keeps_running_one() {
    let sequencer = TaskSequencer::spawn();
    let (started_tx, started_rx) = oneshot::channel();
    let ran = Arc::new(Mutex::new(Vec::new()));

    let log = Arc::clone(&ran);
    let running = sequencer.enqueue(AnimationTask::new(
        "running",
        Duration::from_millis(500),
        move || async move {
            let _ = started_tx.send(());
            log.lock().unwrap().push("running");
            anyhow::Ok(())
        },
    ));
    let pending: Vec<_> = ["a", "b"]
        .into_iter()
        .map(|label| {
            let log = Arc::clone(&ran);
            sequencer.enqueue(AnimationTask::new(label, Duration::ZERO, move || async move {
                log.lock().unwrap().push(label);
                anyhow::Ok(())
            }))
        })
        .collect();

    started_rx.await.unwrap();
    sequencer.clear();

    assert_eq!(running.await, Ok(()));
    for handle in pending {
        assert_eq!(handle.await, Err(TaskCancelled));
    }

    // The timeline is still usable after a clear.
    let log = Arc::clone(&ran);
    sequencer
        .enqueue(AnimationTask::new("later", Duration::ZERO, move || async move {
            log.lock().unwrap().push("later");
            anyhow::Ok(())
        }))
        .await
        .unwrap();

    assert_eq!(*ran.lock().unwrap(), vec!["running", "later"]);
}
