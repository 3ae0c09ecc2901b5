use crate::db::*;
use crate::metadata::CheckpointMetadata;
use serde_json::json;
use tempfile::NamedTempFile;
use uuid::Uuid;

fn new_checkpoint(uuid: Uuid, bucket: &str) -> NewCheckpoint {
    NewCheckpoint {
        uuid,
        experiment_config: json!({
            "checkpoint_storage": {"type": "s3", "bucket": bucket, "prefix": "exp"},
        }),
    }
}

#[tokio::test]
async fn test_insert_and_get_checkpoint() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();
    let id = Uuid::new_v4();

    db.insert_checkpoint(&new_checkpoint(id, "bucket-a"))
        .await
        .unwrap();

    let row = db.get_checkpoint(id).await.unwrap().unwrap();
    assert_eq!(row.uuid, id.to_string());
    assert!(row.created_at > 0);

    let config: serde_json::Value = serde_json::from_str(&row.experiment_config).unwrap();
    assert_eq!(config["checkpoint_storage"]["bucket"], "bucket-a");

    db.close().await;
}

#[tokio::test]
async fn test_insert_replaces_existing_config() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();
    let id = Uuid::new_v4();

    db.insert_checkpoint(&new_checkpoint(id, "old")).await.unwrap();
    db.insert_checkpoint(&new_checkpoint(id, "new")).await.unwrap();

    let config = db.experiment_config(id).await.unwrap().unwrap();
    assert_eq!(config["checkpoint_storage"]["bucket"], "new");

    db.close().await;
}

#[tokio::test]
async fn test_missing_checkpoint_is_none() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    assert!(db.get_checkpoint(Uuid::new_v4()).await.unwrap().is_none());
    assert!(
        db.experiment_config(Uuid::new_v4())
            .await
            .unwrap()
            .is_none()
    );

    db.close().await;
}

#[tokio::test]
async fn test_delete_checkpoint() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();
    let id = Uuid::new_v4();

    db.insert_checkpoint(&new_checkpoint(id, "b")).await.unwrap();

    assert!(db.delete_checkpoint(id).await.unwrap());
    assert!(!db.delete_checkpoint(id).await.unwrap());
    assert!(db.get_checkpoint(id).await.unwrap().is_none());

    db.close().await;
}
