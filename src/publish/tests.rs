use super::*;
use crate::test_helpers::{Call, FakeApi, api_error, job, test_config};
use crate::types::{ContentStatus, JobStatus, Platform, RenderStatus};
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::time::sleep;
use tokio_stream::StreamExt;

use JobStatus::{Failed, Published, Publishing, Retrying};
use Platform::{Instagram, Tiktok, Youtube};

fn setup() -> (PublishOrchestrator, Arc<FakeApi>, broadcast::Sender<Event>) {
    let api = FakeApi::new();
    let (tx, _) = broadcast::channel(256);
    (PublishOrchestrator::new(api.clone(), tx.clone()), api, tx)
}

fn set(platforms: &[Platform]) -> PlatformSet {
    PlatformSet::new(platforms.iter().copied()).unwrap()
}

fn all_connected() -> ConnectedPlatforms {
    [Instagram, Youtube, Tiktok].into_iter().collect()
}

fn drain(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn notifications(events: &[Event]) -> Vec<(NotificationLevel, String)> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::Notification { level, message } => Some((*level, message.clone())),
            _ => None,
        })
        .collect()
}

fn fetches(api: &FakeApi) -> usize {
    api.status_fetches.load(Ordering::SeqCst)
}

fn content() -> ContentItemId {
    ContentItemId::new("content-1")
}

// --- orchestrator ---

#[tokio::test]
async fn test_publish_requires_connected_platforms() {
    let (orchestrator, api, _tx) = setup();
    let mut rx = orchestrator.subscribe();
    let connected: ConnectedPlatforms = [Instagram].into_iter().collect();

    let err = orchestrator
        .publish_now(&content(), &set(&[Instagram, Tiktok]), &connected)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::PlatformNotConnected { platform: Tiktok }
    ));
    assert!(api.calls.lock().await.is_empty());
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn test_publish_now_notifies_and_invalidates() {
    let (orchestrator, api, _tx) = setup();
    let mut rx = orchestrator.subscribe();

    let jobs = orchestrator
        .publish_now(&content(), &set(&[Instagram]), &all_connected())
        .await
        .unwrap();
    assert_eq!(jobs, vec![JobId("job-instagram".into())]);

    let events = drain(&mut rx);
    assert_eq!(
        events[0],
        Event::JobsInvalidated {
            content_item_id: content()
        }
    );
    assert_eq!(
        notifications(&events),
        vec![(NotificationLevel::Success, "Publishing to instagram...".into())]
    );

    orchestrator
        .publish_now(&content(), &set(&[Instagram, Youtube]), &all_connected())
        .await
        .unwrap();
    assert_eq!(
        notifications(&drain(&mut rx)),
        vec![(NotificationLevel::Success, "Publishing to 2 platforms...".into())]
    );
    assert_eq!(api.calls.lock().await.len(), 2);
}

#[tokio::test]
async fn test_publish_failure_messages() {
    let (orchestrator, api, _tx) = setup();
    let mut rx = orchestrator.subscribe();

    api.fail_next_mutation(api_error(
        400,
        "VALIDATION_ERROR",
        "Content item is still generating",
    ))
    .await;
    assert!(
        orchestrator
            .publish_now(&content(), &set(&[Youtube]), &all_connected())
            .await
            .is_err()
    );

    api.fail_next_mutation(api_error(500, "INTERNAL_ERROR", ""))
        .await;
    assert!(
        orchestrator
            .publish_now(&content(), &set(&[Youtube]), &all_connected())
            .await
            .is_err()
    );

    let events = drain(&mut rx);
    assert!(
        !events
            .iter()
            .any(|e| matches!(e, Event::JobsInvalidated { .. }))
    );
    assert_eq!(
        notifications(&events),
        vec![
            (
                NotificationLevel::Error,
                "Content item is still generating".into()
            ),
            (NotificationLevel::Error, "Failed to publish".into()),
        ]
    );
}

#[tokio::test]
async fn test_schedule_requires_lead_time() {
    let (orchestrator, api, _tx) = setup();
    let request = ScheduleRequest {
        scheduled_at: Utc::now() + chrono::Duration::minutes(2),
        platforms: set(&[Instagram]),
    };

    let err = orchestrator
        .schedule(&content(), request, &all_connected())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert!(api.calls.lock().await.is_empty());
}

#[tokio::test]
async fn test_schedule_and_cancel() {
    let (orchestrator, api, _tx) = setup();
    let mut rx = orchestrator.subscribe();
    let at = Utc::now() + chrono::Duration::hours(3);

    let result = orchestrator
        .schedule(
            &content(),
            ScheduleRequest {
                scheduled_at: at,
                platforms: set(&[Instagram, Youtube]),
            },
            &all_connected(),
        )
        .await
        .unwrap();
    assert_eq!(result.job_ids.len(), 2);
    assert_eq!(result.scheduled_at, at);

    orchestrator.cancel_schedule(&content()).await.unwrap();

    assert_eq!(
        *api.calls.lock().await,
        vec![
            Call::Schedule(content(), at, vec![Instagram, Youtube]),
            Call::CancelSchedule(content()),
        ]
    );
    let events = drain(&mut rx);
    assert_eq!(
        notifications(&events),
        vec![
            (
                NotificationLevel::Success,
                format!("Scheduled for {}", format_schedule_time(&at))
            ),
            (NotificationLevel::Success, "Schedule cancelled".into()),
        ]
    );
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, Event::JobsInvalidated { .. }))
            .count(),
        2
    );
}

#[tokio::test]
async fn test_schedule_and_cancel_fallback_messages() {
    let (orchestrator, api, _tx) = setup();
    let mut rx = orchestrator.subscribe();

    api.fail_next_mutation(api_error(500, "INTERNAL_ERROR", ""))
        .await;
    let request = ScheduleRequest {
        scheduled_at: Utc::now() + chrono::Duration::days(1),
        platforms: set(&[Tiktok]),
    };
    assert!(
        orchestrator
            .schedule(&content(), request, &all_connected())
            .await
            .is_err()
    );

    api.fail_next_mutation(api_error(404, "NOT_FOUND", ""))
        .await;
    assert!(orchestrator.cancel_schedule(&content()).await.is_err());

    assert_eq!(
        notifications(&drain(&mut rx)),
        vec![
            (NotificationLevel::Error, "Failed to schedule content".into()),
            (NotificationLevel::Error, "Failed to cancel schedule".into()),
        ]
    );
}

#[tokio::test]
async fn test_retry_platforms_messages() {
    let (orchestrator, api, _tx) = setup();
    let mut rx = orchestrator.subscribe();

    orchestrator
        .retry_platforms(&content(), &set(&[Youtube]))
        .await
        .unwrap();
    api.fail_next_mutation(api_error(502, "BAD_GATEWAY", ""))
        .await;
    assert!(
        orchestrator
            .retry_platforms(&content(), &set(&[Youtube, Tiktok]))
            .await
            .is_err()
    );

    assert_eq!(
        notifications(&drain(&mut rx)),
        vec![
            (NotificationLevel::Success, "Retrying youtube...".into()),
            (NotificationLevel::Error, "Failed to retry publish".into()),
        ]
    );
}

#[test]
fn test_format_schedule_time() {
    let at: DateTime<Utc> = "2026-12-01T09:30:00Z".parse().unwrap();
    assert_eq!(format_schedule_time(&at), "Dec 1, 2026, 9:30 AM UTC");
    let at: DateTime<Utc> = "2026-07-14T18:05:00Z".parse().unwrap();
    assert_eq!(format_schedule_time(&at), "Jul 14, 2026, 6:05 PM UTC");
}

// --- poller ---

#[tokio::test(start_paused = true)]
async fn test_publish_poll_settle_and_retry_failed_only() {
    let (orchestrator, api, tx) = setup();
    api.script_status(vec![
        Ok(vec![job(Instagram, Published), job(Youtube, Publishing)]),
        Ok(vec![job(Instagram, Published), job(Youtube, Failed)]),
        Ok(vec![job(Instagram, Published), job(Youtube, Retrying)]),
        Ok(vec![job(Instagram, Published), job(Youtube, Published)]),
    ])
    .await;

    let targets = set(&[Instagram, Youtube]);
    orchestrator
        .publish_now(&content(), &targets, &all_connected())
        .await
        .unwrap();

    let poller = JobStatusPoller::for_jobs(api.clone(), content(), &test_config(), &tx, true);
    sleep(Duration::from_millis(1)).await;
    assert_eq!(fetches(&api), 1);
    assert_eq!(poller.state(), PollState::Polling);

    sleep(Duration::from_millis(3000)).await;
    assert_eq!(fetches(&api), 2);
    assert_eq!(poller.state(), PollState::Settled);
    assert_eq!(poller.failed_platforms(), vec![Youtube]);

    sleep(Duration::from_secs(30)).await;
    assert_eq!(fetches(&api), 2, "no fetches once settled");

    let retried = poller.retry_failed(&orchestrator).await.unwrap();
    assert_eq!(retried, vec![JobId("job-youtube".into())]);
    assert_eq!(
        *api.calls.lock().await,
        vec![
            Call::Publish(content(), vec![Instagram, Youtube]),
            Call::Publish(content(), vec![Youtube]),
        ]
    );

    sleep(Duration::from_millis(1)).await;
    assert_eq!(fetches(&api), 3, "invalidation re-arms polling");
    assert_eq!(poller.state(), PollState::Polling);

    sleep(Duration::from_millis(3000)).await;
    assert_eq!(fetches(&api), 4);
    assert_eq!(poller.state(), PollState::Settled);
    assert!(poller.failed_platforms().is_empty());

    sleep(Duration::from_secs(30)).await;
    assert_eq!(fetches(&api), 4);
}

#[tokio::test(start_paused = true)]
async fn test_retry_failed_without_failures_sends_nothing() {
    let (orchestrator, api, tx) = setup();
    api.script_status(vec![Ok(vec![job(Instagram, Published)])])
        .await;

    let poller = JobStatusPoller::for_jobs(api.clone(), content(), &test_config(), &tx, true);
    sleep(Duration::from_millis(1)).await;

    assert!(poller.retry_failed(&orchestrator).await.unwrap().is_empty());
    assert!(api.calls.lock().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_disabled_poller_never_fetches() {
    let (_orchestrator, api, tx) = setup();
    api.script_status(vec![Ok(vec![job(Tiktok, Publishing)])])
        .await;

    let poller = JobStatusPoller::for_jobs(api.clone(), content(), &test_config(), &tx, false);
    sleep(Duration::from_secs(10)).await;
    poller.refresh();
    tx.send(Event::JobsInvalidated {
        content_item_id: content(),
    })
    .unwrap();
    sleep(Duration::from_secs(10)).await;
    assert_eq!(fetches(&api), 0);
    assert_eq!(poller.state(), PollState::Idle);

    poller.set_enabled(true);
    sleep(Duration::from_millis(1)).await;
    assert_eq!(fetches(&api), 1);
    sleep(Duration::from_millis(3000)).await;
    assert_eq!(fetches(&api), 2);

    poller.set_enabled(false);
    sleep(Duration::from_millis(1)).await;
    assert_eq!(poller.state(), PollState::Idle);
    sleep(Duration::from_secs(30)).await;
    assert_eq!(fetches(&api), 2);
}

#[tokio::test(start_paused = true)]
async fn test_empty_job_set_is_idle() {
    let (_orchestrator, api, tx) = setup();
    api.script_status(vec![Ok(Vec::new())]).await;

    let poller = JobStatusPoller::for_jobs(api.clone(), content(), &test_config(), &tx, true);
    sleep(Duration::from_secs(10)).await;
    assert_eq!(fetches(&api), 1);
    assert_eq!(poller.state(), PollState::Idle);
    assert_eq!(poller.latest(), Some(Vec::new()));
}

#[tokio::test(start_paused = true)]
async fn test_fetch_failure_keeps_snapshot_and_polling() {
    let (_orchestrator, api, tx) = setup();
    let mut rx = tx.subscribe();
    let active = vec![job(Youtube, Publishing)];
    api.script_status(vec![
        Ok(active.clone()),
        Err(api_error(503, "UNAVAILABLE", "")),
        Err(api_error(503, "UNAVAILABLE", "")),
        Err(api_error(503, "UNAVAILABLE", "")),
        Ok(vec![job(Youtube, Published)]),
    ])
    .await;

    let poller = JobStatusPoller::for_jobs(api.clone(), content(), &test_config(), &tx, true);
    sleep(Duration::from_millis(3100)).await;
    assert_eq!(fetches(&api), 4, "initial fetch plus three attempts");
    assert_eq!(poller.latest(), Some(active));
    assert_eq!(poller.state(), PollState::Polling);

    sleep(Duration::from_millis(3100)).await;
    assert_eq!(fetches(&api), 5);
    assert_eq!(poller.state(), PollState::Settled);

    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(
        e,
        Event::PollFailed { content_item_id, .. } if *content_item_id == content()
    )));
    assert!(
        events
            .iter()
            .any(|e| matches!(e, Event::PollingSettled { .. }))
    );
}

#[tokio::test(start_paused = true)]
async fn test_fetch_failure_without_active_work_stops() {
    let (_orchestrator, api, tx) = setup();
    api.script_status(vec![Err(api_error(404, "NOT_FOUND", "Content item not found"))])
        .await;

    let poller = JobStatusPoller::for_jobs(api.clone(), content(), &test_config(), &tx, true);
    sleep(Duration::from_secs(30)).await;
    assert_eq!(fetches(&api), 1, "non-retryable errors are not retried");
    assert_eq!(poller.state(), PollState::Idle);
    assert!(poller.latest().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_invalidation_for_other_content_is_ignored() {
    let (_orchestrator, api, tx) = setup();
    api.script_status(vec![Ok(vec![job(Instagram, Published)])])
        .await;

    let _poller = JobStatusPoller::for_jobs(api.clone(), content(), &test_config(), &tx, true);
    sleep(Duration::from_millis(1)).await;
    assert_eq!(fetches(&api), 1);

    tx.send(Event::JobsInvalidated {
        content_item_id: ContentItemId::new("someone-else"),
    })
    .unwrap();
    sleep(Duration::from_millis(1)).await;
    assert_eq!(fetches(&api), 1);

    tx.send(Event::JobsInvalidated {
        content_item_id: content(),
    })
    .unwrap();
    sleep(Duration::from_millis(1)).await;
    assert_eq!(fetches(&api), 2);
}

#[tokio::test(start_paused = true)]
async fn test_drop_and_shutdown_stop_polling() {
    let (_orchestrator, api, tx) = setup();
    api.script_status(vec![Ok(vec![job(Youtube, Publishing)])])
        .await;

    let poller = JobStatusPoller::for_jobs(api.clone(), content(), &test_config(), &tx, true);
    sleep(Duration::from_millis(1)).await;
    drop(poller);
    sleep(Duration::from_secs(30)).await;
    assert_eq!(fetches(&api), 1);

    let poller = JobStatusPoller::for_jobs(api.clone(), content(), &test_config(), &tx, true);
    sleep(Duration::from_millis(1)).await;
    poller.shutdown().await;
    sleep(Duration::from_secs(30)).await;
    assert_eq!(fetches(&api), 2);
}

#[tokio::test(start_paused = true)]
async fn test_updates_stream_yields_snapshots() {
    let (_orchestrator, api, tx) = setup();
    let first = vec![job(Instagram, Publishing)];
    let second = vec![job(Instagram, Published)];
    api.script_status(vec![Ok(first.clone()), Ok(second.clone())])
        .await;

    let poller = JobStatusPoller::for_jobs(api.clone(), content(), &test_config(), &tx, true);
    let mut updates = Box::pin(poller.updates());

    let got = updates.next().await.unwrap();
    assert_eq!(got, first);
    let got = updates.next().await.unwrap();
    assert_eq!(got, second);
}

#[tokio::test(start_paused = true)]
async fn test_render_poller_stops_when_rendered() {
    let (_orchestrator, api, tx) = setup();
    let generating = RenderStatus {
        status: ContentStatus::Generating,
        generated_media_url: None,
    };
    api.script_render(vec![
        Ok(generating.clone()),
        Ok(generating),
        Ok(RenderStatus {
            status: ContentStatus::Draft,
            generated_media_url: Some("https://cdn.test/reel.mp4".into()),
        }),
    ])
    .await;

    let poller =
        RenderStatusPoller::for_render(api.clone(), content(), &test_config(), &tx, true);
    sleep(Duration::from_secs(20)).await;

    assert_eq!(api.render_fetches.load(Ordering::SeqCst), 3);
    assert_eq!(poller.state(), PollState::Settled);
    assert_eq!(
        poller.latest().unwrap().generated_media_url.as_deref(),
        Some("https://cdn.test/reel.mp4")
    );
}

#[tokio::test(start_paused = true)]
async fn test_render_poller_keeps_polling_through_scheduled() {
    let (_orchestrator, api, tx) = setup();
    let scheduled = RenderStatus {
        status: ContentStatus::Scheduled,
        generated_media_url: Some("https://cdn.test/reel.mp4".into()),
    };
    api.script_render(vec![
        Ok(scheduled.clone()),
        Ok(scheduled),
        Ok(RenderStatus {
            status: ContentStatus::Failed,
            generated_media_url: None,
        }),
    ])
    .await;

    let poller =
        RenderStatusPoller::for_render(api.clone(), content(), &test_config(), &tx, true);
    sleep(Duration::from_secs(20)).await;

    assert_eq!(api.render_fetches.load(Ordering::SeqCst), 3);
    assert_eq!(poller.state(), PollState::Settled);
    assert_eq!(poller.latest().unwrap().status, ContentStatus::Failed);
}
