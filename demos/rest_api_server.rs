//! REST API server example
//!
//! Serves checkpoint archives from S3 (or an S3-compatible store such as
//! MinIO) using a local SQLite metadata database.
//!
//! Configuration is read from the JSON file named by `CHECKPOINT_STREAM_CONFIG`
//! when set, otherwise defaults are used. Credentials come from the usual AWS
//! environment (env vars, profile, instance role).
//!
//! Register a checkpoint and download it:
//!
//! ```text
//! cargo run --example rest_api_server -- register 7a3b6a0e-5d6c-4f7e-9f1a-2b3c4d5e6f70 my-bucket experiments
//! cargo run --example rest_api_server
//! curl -o ckpt.tar.gz http://localhost:8080/checkpoints/7a3b6a0e-5d6c-4f7e-9f1a-2b3c4d5e6f70/tgz
//! ```

use checkpoint_stream::db::NewCheckpoint;
use checkpoint_stream::{AwsSessionFactory, CheckpointArchiver, Config, Database, run_with_shutdown};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,checkpoint_stream=debug,tower_http=debug"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = match std::env::var("CHECKPOINT_STREAM_CONFIG") {
        Ok(path) => serde_json::from_str::<Config>(&std::fs::read_to_string(path)?)?,
        Err(_) => Config::default(),
    };
    config.validate()?;

    let db = Database::new(&config.persistence.database_path).await?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    if let [cmd, id, bucket, rest @ ..] = args.as_slice() {
        if cmd != "register" {
            return Err(format!("unknown command {cmd}").into());
        }
        let mut storage = serde_json::json!({"type": "s3", "bucket": bucket});
        if let Some(prefix) = rest.first() {
            storage["prefix"] = prefix.clone().into();
        }
        db.insert_checkpoint(&NewCheckpoint {
            uuid: id.parse()?,
            experiment_config: serde_json::json!({ "checkpoint_storage": storage }),
        })
        .await?;
        println!("Registered checkpoint {id} in s3://{bucket}");
        return Ok(());
    }

    let config = Arc::new(config);
    let sessions = AwsSessionFactory::new(&config.storage);
    let archiver = Arc::new(CheckpointArchiver::new(
        Arc::new(db),
        Arc::new(sessions),
        config.clone(),
    ));

    let base = format!("http://{}", config.api.bind_address);
    println!("Starting checkpoint-stream REST API server");
    println!("Swagger UI: {base}/swagger-ui");
    println!();
    println!("Example commands:");
    println!("  curl -o ckpt.tar.gz {base}/checkpoints/<uuid>/tgz");
    println!("  curl -o ckpt.zip {base}/checkpoints/<uuid>/zip");
    println!();

    run_with_shutdown(archiver, config).await?;
    Ok(())
}
