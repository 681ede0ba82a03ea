use chrono::{TimeZone, Utc};
use morningbyte::article::{Article, NO_IMAGE};
use morningbyte::store::ArticleStore;

fn article(n: usize) -> Article {
    Article {
        title: format!("Story {}", n),
        summary: format!("Summary {}", n),
        url: format!("https://example.com/{}", n),
        image_url: NO_IMAGE.to_string(),
        source: "Tech Wire".to_string(),
        published_at: Utc.with_ymd_and_hms(2024, 5, 6, 10, 0, 0).unwrap(),
        created_at: Utc.with_ymd_and_hms(2024, 5, 6, 12, 0, 0).unwrap(),
    }
}

async fn temp_store() -> (tempfile::TempDir, ArticleStore) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("digest.db");
    let store = ArticleStore::connect(&path.to_string_lossy())
        .await
        .expect("connect store");
    (dir, store)
}

#[tokio::test]
async fn save_and_load_round_trip() {
    let (_dir, store) = temp_store().await;

    let batch = vec![article(1), article(2), article(3)];
    let inserted = store.save(&batch).await.expect("save");
    assert_eq!(inserted, 3);

    let loaded = store.load_all().await.expect("load");
    assert_eq!(loaded, batch);
}

#[tokio::test]
async fn save_empty_batch_is_a_no_op() {
    let (_dir, store) = temp_store().await;

    store.save(&[article(1)]).await.expect("seed");
    let inserted = store.save(&[]).await.expect("empty save");

    assert_eq!(inserted, 0);
    // Prior state untouched.
    assert_eq!(store.load_all().await.expect("load").len(), 1);
}

#[tokio::test]
async fn clear_removes_everything_and_reports_count() {
    let (_dir, store) = temp_store().await;

    store.save(&[article(1), article(2)]).await.expect("save");
    let removed = store.clear().await.expect("clear");

    assert_eq!(removed, 2);
    assert!(store.load_all().await.expect("load").is_empty());
}

#[tokio::test]
async fn clear_then_insert_keeps_only_the_latest_batch() {
    let (_dir, store) = temp_store().await;

    store.save(&[article(1), article(2)]).await.expect("first run");

    // Next run: clear then save, never upsert.
    store.clear().await.expect("clear");
    let fresh = vec![article(10), article(11), article(12)];
    store.save(&fresh).await.expect("second run");

    let loaded = store.load_all().await.expect("load");
    assert_eq!(loaded, fresh);
}

#[tokio::test]
async fn connect_creates_parent_directories() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("nested/data/digest.db");

    let store = ArticleStore::connect(&path.to_string_lossy())
        .await
        .expect("connect with missing parents");
    assert!(store.load_all().await.expect("load").is_empty());
}

#[tokio::test]
async fn unreachable_database_reports_an_error() {
    // A directory path can never become a database file.
    let dir = tempfile::tempdir().expect("tempdir");
    let result = ArticleStore::connect(&dir.path().to_string_lossy()).await;
    assert!(result.is_err());
}
