mod errors;
mod notifier;
mod watcher;
use errors::Error;
use notifier::CommandNotifier;
use watcher::ConfigMapWatcher;

use clap::Parser;
use halp_api as api;
use k8s_openapi::api::core::v1::ConfigMap as KubeConfigMap;
use kube::Api as KubeApi;
use log;

#[derive(Parser, Debug)]
#[command(name = "halpd", version, about = "Runs the halp notifier for every halp message ConfigMap")]
struct Args {

    /// Namespace to watch for message ConfigMaps
    #[arg(long, env = "HALP_NAMESPACE", default_value = api::NAMESPACE)]
    namespace: String,

    /// Program invoked as `<notifier> -m <message>`
    #[arg(long, env = "HALP_NOTIFIER", default_value = notifier::DEFAULT_PROGRAM)]
    notifier: String,

    /// ConfigMaps whose name lacks this substring are ignored
    #[arg(long, env = "HALP_MARKER", default_value = api::MARKER)]
    marker: String,

    /// How many times a failing notifier run is retried
    #[arg(long, env = "HALP_MAX_RETRIES", default_value_t = api::retry::DEFAULT_MAX_RETRIES)]
    max_retries: u32,
}

async fn run(args: Args) -> Result<(), Error> {
    let kube_client = api::client().await?;
    let configmaps: KubeApi<KubeConfigMap> = KubeApi::namespaced(kube_client, &args.namespace);

    let notifier = CommandNotifier::new(&args.notifier);
    log::info!("watching {} for configmaps named like *{}*, notifier {}", args.namespace, args.marker, notifier.program());

    let token = api::cancel_on_shutdown()?;
    let watcher = ConfigMapWatcher::new(
	notifier,
	&args.marker,
	api::RetryPolicy::new(args.max_retries).with_shutdown(token.clone()),
    );

    watcher.run(configmaps, token).await
}

/*
 * Program design:
 *
 *  1. List and watch ConfigMaps in the halp namespace
 *  2. Every added ConfigMap named like a halp message pages a human
 *  3. SIGINT/SIGTERM stop the watch
 */
#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    log::info!("starting halpd");

    if let Err(err) = run(args).await {
	log::error!("Error running halpd: {}", err);
	std::process::exit(1);
    }
}
