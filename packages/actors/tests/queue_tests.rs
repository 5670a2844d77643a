mod common;

use std::collections::HashSet;
use std::error::Error;
use std::time::Duration;

use chrono::Utc;
use dispatch_core::{HandlerError, Job, JobEvent, JobStatus, QueueError, RetryPolicy};

use common::{fast_config, noop_handler, spawn_queue};

#[tokio::test]
async fn test_dequeue_is_fifo() -> Result<(), Box<dyn Error>> {
    let (queue, _store) = spawn_queue(fast_config()).await?;
    queue.register_handler(noop_handler("echo"));

    let mut enqueued = Vec::new();
    for n in 0..5 {
        enqueued.push(queue.enqueue("echo", serde_json::json!({ "n": n })).await?);
    }

    let mut claimed = Vec::new();
    while let Some(job) = queue.dequeue_next("worker-1").await? {
        assert_eq!(job.attempts, 1);
        assert_eq!(job.status.owner(), Some("worker-1"));
        claimed.push(job.id);
    }

    assert_eq!(claimed, enqueued);
    Ok(())
}

#[tokio::test]
async fn test_enqueue_rejects_unknown_job_type() -> Result<(), Box<dyn Error>> {
    let (queue, store) = spawn_queue(fast_config()).await?;

    let result = queue.enqueue("networks_export", serde_json::json!({})).await;
    assert_eq!(
        result,
        Err(QueueError::UnknownJobType("networks_export".into()))
    );
    assert_eq!(store.active_count().await, 0);
    Ok(())
}

#[tokio::test]
async fn test_always_failing_job_runs_max_retries_plus_one() -> Result<(), Box<dyn Error>> {
    let (queue, store) = spawn_queue(fast_config().with_max_retries(2)).await?;
    queue.register_handler(noop_handler("flaky"));
    let mut events = queue.subscribe_events();

    let job_id = queue.enqueue("flaky", serde_json::Value::Null).await?;

    let mut runs = 0;
    while let Some(job) = queue.dequeue_next("worker-1").await? {
        runs += 1;
        queue
            .mark_failed(job.id, "worker-1", HandlerError::failed("boom"))
            .await?;
    }

    assert_eq!(runs, 3);
    let job = queue.get(job_id).await?.ok_or("job missing")?;
    assert_eq!(job.attempts, 3);
    assert!(matches!(job.status, JobStatus::Failed { .. }));
    assert_eq!(job.last_error.as_deref(), Some("boom"));
    assert!(queue.dequeue_next("worker-1").await?.is_none());

    let archived = store.archived().await;
    assert_eq!(archived.len(), 1);
    assert_eq!(archived[0].id, job_id);

    let mut limit_hit = false;
    while let Ok(event) = events.try_recv() {
        limit_hit |= event.is_retry_limit_exceeded();
    }
    assert!(limit_hit);

    let stats = queue.stats().await?;
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.retried, 2);
    Ok(())
}

#[tokio::test]
async fn test_backoff_hides_job_until_delay_passes() -> Result<(), Box<dyn Error>> {
    let config = fast_config().with_retry(RetryPolicy::fixed(Duration::from_secs(60)));
    let (queue, _store) = spawn_queue(config).await?;
    queue.register_handler(noop_handler("slow_retry"));

    let job_id = queue.enqueue("slow_retry", serde_json::Value::Null).await?;
    let job = queue.dequeue_next("worker-1").await?.ok_or("nothing claimed")?;
    queue
        .mark_failed(job.id, "worker-1", HandlerError::failed("try later"))
        .await?;

    assert!(queue.dequeue_next("worker-1").await?.is_none());

    let job = queue.get(job_id).await?.ok_or("job missing")?;
    assert_eq!(job.status, JobStatus::Pending);
    assert!(job.available_at > Utc::now() + chrono::Duration::seconds(50));
    Ok(())
}

#[tokio::test]
async fn test_retry_keeps_place_in_line() -> Result<(), Box<dyn Error>> {
    let (queue, _store) = spawn_queue(fast_config()).await?;
    queue.register_handler(noop_handler("echo"));

    let first = queue.enqueue("echo", serde_json::Value::Null).await?;
    let second = queue.enqueue("echo", serde_json::Value::Null).await?;

    let job = queue.dequeue_next("worker-1").await?.ok_or("nothing claimed")?;
    assert_eq!(job.id, first);
    queue
        .mark_failed(first, "worker-1", HandlerError::failed("again"))
        .await?;

    let job = queue.dequeue_next("worker-1").await?.ok_or("nothing claimed")?;
    assert_eq!(job.id, first);
    assert_eq!(job.attempts, 2);
    let job = queue.dequeue_next("worker-1").await?.ok_or("nothing claimed")?;
    assert_eq!(job.id, second);
    Ok(())
}

#[tokio::test]
async fn test_only_owner_can_complete() -> Result<(), Box<dyn Error>> {
    let (queue, _store) = spawn_queue(fast_config()).await?;
    queue.register_handler(noop_handler("echo"));

    let job_id = queue.enqueue("echo", serde_json::Value::Null).await?;
    queue.dequeue_next("worker-1").await?.ok_or("nothing claimed")?;

    let stolen = queue.mark_succeeded(job_id, "worker-2").await;
    assert!(matches!(stolen, Err(QueueError::NotOwner { .. })));

    queue.mark_succeeded(job_id, "worker-1").await?;
    assert_eq!(
        queue.mark_succeeded(job_id, "worker-1").await,
        Err(QueueError::NotRunning(job_id))
    );

    let missing = Job::new("echo", serde_json::Value::Null).id;
    assert_eq!(
        queue
            .mark_failed(missing, "worker-1", HandlerError::failed("x"))
            .await,
        Err(QueueError::JobNotFound(missing))
    );

    let job = queue.get(job_id).await?.ok_or("job missing")?;
    assert!(matches!(job.status, JobStatus::Succeeded { .. }));
    assert_eq!(job.attempts, 1);
    Ok(())
}

#[tokio::test]
async fn test_sweep_reclaims_expired_lease() -> Result<(), Box<dyn Error>> {
    let config = fast_config().with_timeout_secs(0).with_lease_grace_secs(0);
    let (queue, _store) = spawn_queue(config).await?;
    queue.register_handler(noop_handler("stuck"));
    let mut events = queue.subscribe_events();

    let job_id = queue.enqueue("stuck", serde_json::Value::Null).await?;
    queue.dequeue_next("worker-1").await?.ok_or("nothing claimed")?;
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(queue.sweep().await?, 1);

    let job = queue.get(job_id).await?.ok_or("job missing")?;
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.attempts, 1);
    assert_eq!(job.last_error.as_deref(), Some("lease expired"));

    let mut reclaimed = false;
    while let Ok(event) = events.try_recv() {
        reclaimed |= matches!(event, JobEvent::JobReclaimed { job_id: id, .. } if id == job_id);
    }
    assert!(reclaimed);

    // The late report from the original owner is refused.
    assert_eq!(
        queue.mark_succeeded(job_id, "worker-1").await,
        Err(QueueError::NotRunning(job_id))
    );
    Ok(())
}

#[tokio::test]
async fn test_release_worker_requeues_its_jobs() -> Result<(), Box<dyn Error>> {
    let (queue, _store) = spawn_queue(fast_config()).await?;
    queue.register_handler(noop_handler("echo"));

    let lost = queue.enqueue("echo", serde_json::Value::Null).await?;
    let kept = queue.enqueue("echo", serde_json::Value::Null).await?;
    queue.dequeue_next("worker-1").await?;
    queue.dequeue_next("worker-2").await?;

    assert_eq!(queue.release_worker("worker-1", "crashed").await?, 1);

    let job = queue.get(lost).await?.ok_or("job missing")?;
    assert_eq!(job.status, JobStatus::Pending);
    assert!(job.last_error.is_some_and(|e| e.contains("crashed")));

    let job = queue.get(kept).await?.ok_or("job missing")?;
    assert_eq!(job.status.owner(), Some("worker-2"));
    Ok(())
}

#[tokio::test]
async fn test_unfinished_jobs_recovered_on_start() -> Result<(), Box<dyn Error>> {
    let store = actors::InMemoryJobStore::new();

    let pending = Job::new("echo", serde_json::Value::Null);
    let mut running = Job::new("echo", serde_json::Value::Null);
    running.attempts = 1;
    running.status = JobStatus::Running {
        started_at: Utc::now(),
        worker_id: "worker-gone".into(),
        lease_expires_at: Utc::now() + chrono::Duration::seconds(300),
    };
    store.seed(pending.clone()).await;
    store.seed(running.clone()).await;

    let queue = actors::JobQueue::spawn(fast_config(), store).await?;

    let job = queue.get(running.id).await?.ok_or("job missing")?;
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.attempts, 1);

    let stats = queue.stats().await?;
    assert_eq!(stats.pending, 2);
    assert_eq!(stats.running, 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_dequeue_never_double_claims() -> Result<(), Box<dyn Error>> {
    let (queue, _store) = spawn_queue(fast_config()).await?;
    queue.register_handler(noop_handler("echo"));

    let mut enqueued = HashSet::new();
    for n in 0..200 {
        enqueued.insert(queue.enqueue("echo", serde_json::json!({ "n": n })).await?);
    }

    let mut tasks = Vec::new();
    for w in 0..16 {
        let queue = queue.clone();
        tasks.push(tokio::spawn(async move {
            let worker_id = format!("worker-{}", w);
            let mut claimed = Vec::new();
            while let Some(job) = queue.dequeue_next(&worker_id).await? {
                assert_eq!(job.status.owner(), Some(worker_id.as_str()));
                queue.mark_succeeded(job.id, &worker_id).await?;
                claimed.push(job.id);
            }
            Ok::<_, QueueError>(claimed)
        }));
    }

    let mut seen = HashSet::new();
    for task in tasks {
        for job_id in task.await?? {
            assert!(seen.insert(job_id), "job {} claimed twice", job_id);
        }
    }

    assert_eq!(seen, enqueued);
    let stats = queue.stats().await?;
    assert_eq!(stats.succeeded, 200);
    assert_eq!(stats.active(), 0);
    Ok(())
}
