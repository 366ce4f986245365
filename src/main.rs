//! `kratix-controller`: installs Promises, boots per-Promise resource-request
//! controllers, and serves the admission webhook.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use futures::StreamExt;
use kube::runtime::controller::Controller;
use kube::runtime::watcher;
use kube::{Api, CustomResourceExt};
use kratix_controller::{CliOverrides, DynamicControllerRegistry, EffectiveConfig, PromiseControllerContext};
use kratix_types::Promise;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "kratix-controller", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[arg(long)]
    namespace: Option<String>,
    #[arg(long)]
    webhook_port: Option<u16>,
    #[arg(long)]
    health_port: Option<u16>,
    #[arg(long)]
    work_creator_image: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the manager (default if no subcommand is given).
    Serve,
    /// Diagnostic commands that don't need a cluster.
    Crd {
        #[command(subcommand)]
        action: CrdAction,
    },
}

#[derive(Subcommand)]
enum CrdAction {
    /// Print the generated Promise/Work CRD YAML to stdout.
    Dump,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .compact()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Command::Crd { action: CrdAction::Dump }) => {
            dump_crds();
            return;
        }
        Some(Command::Serve) | None => {}
    }

    let overrides = CliOverrides {
        namespace: cli.namespace,
        webhook_port: cli.webhook_port,
        health_port: cli.health_port,
        work_creator_image: cli.work_creator_image,
    };
    let config = match EffectiveConfig::build(overrides) {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "invalid configuration");
            std::process::exit(1);
        }
    };

    let client = match kube::Client::try_default().await {
        Ok(client) => client,
        Err(err) => {
            error!(error = %err, "failed to build kubernetes client");
            std::process::exit(1);
        }
    };

    let registry = Arc::new(DynamicControllerRegistry::new());
    let ctx = Arc::new(PromiseControllerContext {
        client: client.clone(),
        registry: registry.clone(),
        system_namespace: config.system_namespace.value.clone(),
        work_creator_image: config.work_creator_image.value.clone(),
        default_requeue: config.default_requeue.value,
    });

    let promises: Api<Promise> = Api::namespaced(client.clone(), &config.system_namespace.value);
    let controller = Controller::new(promises, watcher::Config::default())
        .run(kratix_controller::promise_controller::reconcile, kratix_controller::promise_controller::error_policy, ctx)
        .for_each(|result| async move {
            if let Err(err) = result {
                error!(error = %err, "promise reconcile failed");
            }
        });

    let webhook_addr = format!("0.0.0.0:{}", config.webhook_port.value);
    let webhook_router = kratix_controller::webhook::router(client.clone());
    let webhook_server = async {
        let listener = tokio::net::TcpListener::bind(&webhook_addr).await.expect("bind webhook listener");
        info!(addr = %webhook_addr, "serving admission webhook");
        axum::serve(listener, webhook_router).await.expect("webhook server failed");
    };

    tokio::select! {
        _ = controller => {}
        _ = webhook_server => {}
        _ = registry.wait_for_restart() => {
            info!("registry requested a restart to drop a deleted promise's controller");
            std::process::exit(0);
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }
}

fn dump_crds() {
    let promise_crd = Promise::crd();
    println!("{}", serde_yaml::to_string(&promise_crd).expect("serialize Promise CRD"));
    println!("---");
    let work_crd = kratix_types::Work::crd();
    println!("{}", serde_yaml::to_string(&work_crd).expect("serialize Work CRD"));
}
