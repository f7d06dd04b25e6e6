mod errors;
mod mcp;
mod relay;
use errors::Error;
use mcp::HalpServer;
use relay::KubeCluster;
use relay::Relay;

use clap::Parser;
use halp_api as api;
use log;
use rmcp::transport::io::stdio;

#[derive(Parser, Debug)]
#[command(name = "halpmcp", version, about = "MCP server relaying halp messages through Kubernetes")]
struct Args {

    /// Namespace the message ConfigMap is created in
    #[arg(long, env = "HALP_NAMESPACE", default_value = api::NAMESPACE)]
    namespace: String,

    /// How many times a failing Kubernetes call is retried
    #[arg(long, env = "HALP_MAX_RETRIES", default_value_t = api::retry::DEFAULT_MAX_RETRIES)]
    max_retries: u32,
}

async fn run(args: Args) -> Result<(), Error> {
    let kube_client = api::client().await?;
    let token = api::cancel_on_shutdown()?;
    let relay = Relay::new(
	KubeCluster::new(kube_client),
	&args.namespace,
	api::RetryPolicy::new(args.max_retries).with_shutdown(token.clone()),
    );
    let server = HalpServer::new(relay);

    // stdout belongs to the protocol, logs go to stderr
    server.run(stdio(), token).await
}

/*
 * Program design:
 *
 *  1. Expose the `halp` tool and prompt over stdio
 *  2. For every tool call, create and delete the message ConfigMap
 *  3. Report failures back to the caller instead of crashing
 */
#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    log::info!("starting {} for namespace {}", mcp::SERVER_NAME, args.namespace);

    if let Err(err) = run(args).await {
	log::error!("{} failed: {}", mcp::SERVER_NAME, err);
	std::process::exit(1);
    }
}
