use std::path::PathBuf;

use clap::Parser;
use kratix_worker::{upsert_work, write_status, Args, Command, StatusWriteRequest, UpsertRequest};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let client = kube::Client::try_default().await?;

    match args.command {
        Command::WorkWriter(a) => {
            upsert_work(
                client,
                UpsertRequest {
                    root_directory: &PathBuf::from(a.root),
                    promise_name: &a.promise_name,
                    resource_name: a.resource_name.as_deref(),
                    namespace: a.namespace.as_deref(),
                    system_namespace: &a.system_namespace,
                },
            )
            .await?;
        }
        Command::StatusWriter(a) => {
            write_status(
                client,
                StatusWriteRequest {
                    status_file: &PathBuf::from(a.status_file),
                    group: &a.group,
                    version: &a.version,
                    kind: &a.kind,
                    plural: &a.plural,
                    namespace: &a.namespace,
                    name: &a.name,
                },
            )
            .await?;
        }
    }

    Ok(())
}
