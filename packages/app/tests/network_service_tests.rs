mod common;

use std::error::Error;
use std::time::Duration;

use app::realtime::{connect, disconnect, format_sse_event};
use app::{CountSummary, COUNT_TOPIC, PER_PAGE};
use dispatch_core::{NetworkParams, NetworkState, Topic, TopicMessage};
use tokio::sync::mpsc;
use uuid::Uuid;

use common::{fast_config, start_app, MemoryNetworks};

async fn next_count(rx: &mut mpsc::Receiver<TopicMessage>) -> Result<CountSummary, Box<dyn Error>> {
    let message = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await?
        .ok_or("connection closed")?;
    Ok(serde_json::from_value(message.payload)?)
}

#[tokio::test]
async fn test_count_reaches_current_subscribers_only() -> Result<(), Box<dyn Error>> {
    let app = start_app(fast_config(), MemoryNetworks::new()).await?;
    for i in 0..4 {
        app.networks
            .create(NetworkParams::new(format!("Net {}", i), "active"))
            .await?;
    }

    let mut a = connect(&app.hub, COUNT_TOPIC).await;
    let mut b = connect(&app.hub, COUNT_TOPIC).await;

    app.networks.create(NetworkParams::new("Fifth", "active")).await?;
    assert_eq!(next_count(&mut a.messages).await?, CountSummary { count: 5 });
    assert_eq!(next_count(&mut b.messages).await?, CountSummary { count: 5 });

    assert!(app.hub.unsubscribe(&a.token).await);
    app.networks.create(NetworkParams::new("Sixth", "active")).await?;
    assert_eq!(next_count(&mut b.messages).await?, CountSummary { count: 6 });
    assert!(a.messages.try_recv().is_err());

    assert!(disconnect(&app.hub, b).await);
    assert_eq!(app.hub.subscriber_count(&Topic::new(COUNT_TOPIC)).await, 0);

    app.shutdown(true).await?;
    Ok(())
}

#[tokio::test]
async fn test_update_broadcasts_and_delete_does_not() -> Result<(), Box<dyn Error>> {
    let app = start_app(fast_config(), MemoryNetworks::new()).await?;
    let alpha = app.networks.create(NetworkParams::new("Alpha", "active")).await?;
    let beta = app.networks.create(NetworkParams::new("Beta", "active")).await?;

    let mut conn = connect(&app.hub, COUNT_TOPIC).await;

    let updated = app
        .networks
        .update(
            alpha.id,
            NetworkParams {
                state: Some("inactive".into()),
                ..Default::default()
            },
        )
        .await?;
    assert_eq!(updated.state, NetworkState::Inactive);
    assert_eq!(next_count(&mut conn.messages).await?, CountSummary { count: 2 });

    app.networks.delete(beta.id).await?;
    assert!(conn.messages.try_recv().is_err());
    assert!(app.networks.get(beta.id).await.err().ok_or("deleted network found")?.is_not_found());

    app.shutdown(true).await?;
    Ok(())
}

#[tokio::test]
async fn test_invalid_params_report_fields_without_broadcast() -> Result<(), Box<dyn Error>> {
    let app = start_app(fast_config(), MemoryNetworks::new()).await?;
    let mut conn = connect(&app.hub, COUNT_TOPIC).await;

    let err = app
        .networks
        .create(NetworkParams::new("Broken", "paused"))
        .await
        .err()
        .ok_or("invalid state accepted")?;
    let fields = err.field_errors();
    assert_eq!(fields.len(), 1);
    assert_eq!(fields[0].field, "state");
    assert_eq!(err.to_string(), "Validation failed: State is not included in the list");

    let missing = app
        .networks
        .update(Uuid::new_v4(), NetworkParams::default())
        .await
        .err()
        .ok_or("update of unknown network succeeded")?;
    assert!(missing.is_not_found());
    assert!(conn.messages.try_recv().is_err());

    app.shutdown(true).await?;
    Ok(())
}

#[tokio::test]
async fn test_list_pages_in_creation_order() -> Result<(), Box<dyn Error>> {
    let app = start_app(fast_config(), MemoryNetworks::new()).await?;
    for i in 0..12 {
        app.networks
            .create(NetworkParams::new(format!("Net {:02}", i), "active"))
            .await?;
    }

    let first = app.networks.list(None).await?;
    assert_eq!(first.len(), PER_PAGE);
    assert_eq!(first[0].name, "Net 00");
    assert_eq!(app.networks.list(Some(0)).await?, first);

    let second = app.networks.list(Some(2)).await?;
    let names: Vec<&str> = second.iter().map(|n| n.name.as_str()).collect();
    assert_eq!(names, vec!["Net 10", "Net 11"]);
    assert!(app.networks.list(Some(3)).await?.is_empty());

    app.shutdown(true).await?;
    Ok(())
}

#[tokio::test]
async fn test_count_frames_render_as_sse() -> Result<(), Box<dyn Error>> {
    let app = start_app(fast_config(), MemoryNetworks::new()).await?;
    let mut conn = connect(&app.hub, COUNT_TOPIC).await;

    app.networks.create(NetworkParams::new("Alpha", "active")).await?;
    let message = tokio::time::timeout(Duration::from_secs(1), conn.messages.recv())
        .await?
        .ok_or("connection closed")?;
    assert_eq!(
        format_sse_event(&message),
        "event: networks_count_channel\ndata: {\"count\":1}\n\n"
    );

    // A client that went away is dropped on the next broadcast.
    drop(conn);
    app.networks.create(NetworkParams::new("Beta", "active")).await?;
    assert_eq!(app.hub.subscriber_count(&Topic::new(COUNT_TOPIC)).await, 0);

    app.shutdown(true).await?;
    Ok(())
}
