//! CLI surface for the work-creator image. The same binary serves both the
//! `work-writer` init container and the `status-writer` main container; which
//! one runs is selected by subcommand in the pod spec.

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "kratix-worker")]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build a Work from `<root>/input`, `<root>/metadata`, `<root>/kratix-system`
    /// and upsert it against the API server.
    WorkWriter(WorkWriterArgs),

    /// Patch the triggering object's status from `<root>/metadata/status.yaml`.
    StatusWriter(StatusWriterArgs),
}

#[derive(Parser, Debug)]
pub struct WorkWriterArgs {
    /// Root of the pod's shared `input`/`metadata`/`kratix-system` volumes.
    #[arg(long, default_value = "/work-creator-files")]
    pub root: String,

    #[arg(long)]
    pub promise_name: String,

    /// Present only for resource-request pipelines.
    #[arg(long)]
    pub resource_name: Option<String>,

    /// Resource-request namespace; blank for promise-level pipelines.
    #[arg(long)]
    pub namespace: Option<String>,

    #[arg(long, default_value = "kratix-platform-system")]
    pub system_namespace: String,
}

#[derive(Parser, Debug)]
pub struct StatusWriterArgs {
    #[arg(long, default_value = "/work-creator-files/metadata/status.yaml")]
    pub status_file: String,

    #[arg(long)]
    pub group: String,
    #[arg(long)]
    pub version: String,
    #[arg(long)]
    pub kind: String,
    #[arg(long)]
    pub plural: String,
    #[arg(long)]
    pub namespace: String,
    #[arg(long)]
    pub name: String,
}
