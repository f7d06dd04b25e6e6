use kube::Client as KubeClient;
use kube::Config as KubeConfig;
use kube::config::KubeConfigOptions;
use kube::config::KubeconfigError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {

    #[error("failed to create kubernetes config: {0}")]
    Kubeconfig(#[from] KubeconfigError),

    #[error("failed to create kubernetes client: {0}")]
    Kube(#[from] kube::Error),
}

/*
 * Build a client out of the local kubeconfig ($KUBECONFIG, or
 * ~/.kube/config), using its current context. There is deliberately no
 * in-cluster fallback.
 */
pub async fn client() -> Result<KubeClient, ClientError> {
    let config = KubeConfig::from_kubeconfig(&KubeConfigOptions::default()).await?;
    let client = KubeClient::try_from(config)?;

    Ok(client)
}
