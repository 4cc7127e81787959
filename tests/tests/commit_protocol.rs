use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};
use converge_core::{DataStore, ItemVersion};
use converge_proto::{Operation, ProviderId, VectorClock};
use converge_storage_memory::{FieldValue, Item, MemoryEngine};

fn ts(day: u32, hour: u32) -> DateTime<Utc> { Utc.with_ymd_and_hms(2021, 7, day, hour, 0, 0).unwrap() }

fn book(title: &str, pages: i64) -> Item {
    Item::new("item1".into(), "books".into())
        .with_field("title", FieldValue::String(title.to_string()))
        .with_field("pages", FieldValue::Integer(pages))
        .with_field("published", FieldValue::DateTime(ts(1, 0)))
}

#[tokio::test]
async fn first_commit_creates_change_and_version() -> Result<()> {
    let engine = MemoryEngine::new("provider-a");
    let provider = ProviderId::from("provider-a");

    let change = engine.commit_item_change(Operation::Insert, &"books".into(), &"item1".into(), &book("owls", 250), Some(ts(27, 10)), None).await?;

    assert_eq!(change.operation, Operation::Insert);
    assert_eq!(change.date_created, ts(27, 10));
    assert_eq!(change.change_vector_clock_item.provider_id, provider);
    assert_eq!(change.change_vector_clock_item.timestamp, ts(27, 10));
    // The creating change is its own insert point.
    assert_eq!(change.insert_vector_clock_item, change.change_vector_clock_item);
    assert!(!change.should_ignore);
    assert!(change.is_applied);
    assert_eq!(change.vector_clock.get_item(&provider).timestamp, ts(27, 10));

    let version = engine.get_item_version(&"item1".into()).await?;
    assert_eq!(version.current_item_change().map(|c| &c.id), Some(&change.id));
    assert_eq!(version.vector_clock(), &change.vector_clock);

    // The payload written through the change log deserializes back to the item.
    let restored = engine.serializer().deserialize_item(&change.serialization_result)?;
    assert_eq!(restored, book("owls", 250));
    Ok(())
}

#[tokio::test]
async fn later_commits_supersede_the_version_and_carry_the_insert_point() -> Result<()> {
    let engine = MemoryEngine::new("provider-a");
    let provider = ProviderId::from("provider-a");

    let insert = engine.commit_item_change(Operation::Insert, &"books".into(), &"item1".into(), &book("owls", 250), Some(ts(27, 10)), None).await?;
    let first_version = engine.get_item_version(&"item1".into()).await?;

    let update = engine.commit_item_change(Operation::Update, &"books".into(), &"item1".into(), &book("owls", 260), Some(ts(28, 9)), None).await?;

    assert_ne!(update.id, insert.id);
    assert_eq!(update.change_vector_clock_item.timestamp, ts(28, 9));
    assert_eq!(update.insert_vector_clock_item, insert.change_vector_clock_item);
    assert_eq!(update.vector_clock.get_item(&provider).timestamp, ts(28, 9));

    let version = engine.get_item_version(&"item1".into()).await?;
    assert_eq!(version.current_item_change().map(|c| &c.id), Some(&update.id));
    // The version keeps its original creation date as it is superseded.
    assert_eq!(version.date_created(), first_version.date_created());

    let changes = engine.item_changes().await?;
    assert_eq!(changes.len(), 2);
    assert_eq!(changes[0].id, insert.id);
    assert_eq!(changes[1].id, update.id);
    Ok(())
}

#[tokio::test]
async fn unknown_items_get_a_synthesized_empty_version() -> Result<()> {
    let engine = MemoryEngine::new("provider-a");
    let provider = ProviderId::from("provider-a");

    let local: ItemVersion = engine.get_local_version(&"never-seen".into()).await?;
    assert!(local.current_item_change().is_none());
    assert!(local.vector_clock().get_item(&provider).is_epoch());
    Ok(())
}

#[tokio::test]
async fn first_seen_providers_feed_the_local_clock() -> Result<()> {
    let engine = MemoryEngine::new("provider-a");
    let provider = ProviderId::from("provider-a");

    assert_eq!(engine.local_vector_clock(), VectorClock::create_empty(["provider-a"]));

    engine.commit_item_change(Operation::Insert, &"books".into(), &"item1".into(), &book("owls", 250), Some(ts(27, 10)), None).await?;
    engine.commit_item_change(Operation::Update, &"books".into(), &"item1".into(), &book("owls", 260), Some(ts(28, 9)), None).await?;

    // Only the creating change registers the provider.
    assert_eq!(engine.local_vector_clock().get_item(&provider).timestamp, ts(27, 10));
    Ok(())
}
