use crate::errors::Error;
use halp_api as api;
use halp_api::halpmessage;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap as KubeConfigMap;
use k8s_openapi::api::core::v1::Namespace as KubeNamespace;
use kube::Api as KubeApi;
use kube::Client as KubeClient;
use kube::Error as KubeError;
use kube::api::DeleteParams as KubeDeleteParams;
use kube::api::PostParams as KubePostParams;
use log;
use tokio::sync::Mutex;

/*
 * The handful of Kubernetes calls the relay depends on.
 */
#[async_trait]
pub trait Cluster: Send + Sync {

    async fn namespace_exists(&self, name: &str) -> Result<bool, KubeError>;

    async fn create_namespace(&self, name: &str) -> Result<(), KubeError>;

    async fn create_config_map(&self, namespace: &str, cm: &KubeConfigMap) -> Result<KubeConfigMap, KubeError>;

    async fn delete_config_map(&self, namespace: &str, name: &str) -> Result<(), KubeError>;
}

#[derive(Clone)]
pub struct KubeCluster {
    kube_client: KubeClient,
}

impl KubeCluster {
    pub fn new(kube_client: KubeClient) -> Self {
	Self{
	    kube_client: kube_client,
	}
    }
}

#[async_trait]
impl Cluster for KubeCluster {

    async fn namespace_exists(&self, name: &str) -> Result<bool, KubeError> {
	let namespaces: KubeApi<KubeNamespace> = KubeApi::all(self.kube_client.clone());

	// get_opt() maps a 404 to None, every other failure is an error
	Ok(namespaces.get_opt(name).await?.is_some())
    }

    async fn create_namespace(&self, name: &str) -> Result<(), KubeError> {
	let namespaces: KubeApi<KubeNamespace> = KubeApi::all(self.kube_client.clone());
	namespaces.create(&KubePostParams::default(), &halpmessage::new_namespace(name)).await?;

	Ok(())
    }

    async fn create_config_map(&self, namespace: &str, cm: &KubeConfigMap) -> Result<KubeConfigMap, KubeError> {
	let configmaps: KubeApi<KubeConfigMap> = KubeApi::namespaced(self.kube_client.clone(), namespace);

	configmaps.create(&KubePostParams::default(), cm).await
    }

    async fn delete_config_map(&self, namespace: &str, name: &str) -> Result<(), KubeError> {
	let configmaps: KubeApi<KubeConfigMap> = KubeApi::namespaced(self.kube_client.clone(), namespace);
	configmaps.delete(name, &KubeDeleteParams::default()).await?;

	Ok(())
    }
}

fn has_code(err: &KubeError, code: u16) -> bool {
    match err {
	KubeError::Api(resp) => resp.code == code,
	_ => false,
    }
}

pub fn is_not_found(err: &KubeError) -> bool {
    has_code(err, 404)
}

pub fn is_already_exists(err: &KubeError) -> bool {
    has_code(err, 409)
}

/*
 * Relay carries a message through the cluster: it makes sure the namespace
 * is there, then creates the message ConfigMap and deletes it right away.
 * Whoever watches the namespace sees the creation.
 *
 * Only one message is in flight per Relay, since they all share the same
 * ConfigMap name.
 */
pub struct Relay<C> {
    cluster: C,
    namespace: String,
    retry: api::RetryPolicy,
    in_flight: Mutex<()>,
}

impl<C: Cluster> Relay<C> {

    pub fn new(cluster: C, namespace: &str, retry: api::RetryPolicy) -> Self {
	Self{
	    cluster: cluster,
	    namespace: namespace.to_string(),
	    retry: retry,
	    in_flight: Mutex::new(()),
	}
    }

    pub fn namespace(&self) -> &str {
	self.namespace.as_str()
    }

    /*
     * Create the namespace only when it cannot be found. Somebody else
     * creating it in between is fine too.
     */
    pub async fn ensure_namespace(&self) -> Result<(), KubeError> {
	let ns = self.namespace.as_str();

	let exists = self.retry.run("namespace lookup", || self.cluster.namespace_exists(ns)).await?;
	if exists {
	    log::debug!("Namespace {} already exists", ns);
	    return Ok(());
	}

	self.retry.run("namespace creation", || async move {
	    match self.cluster.create_namespace(ns).await {
		Err(err) if is_already_exists(&err) => {
		    log::debug!("Namespace {} was created concurrently", ns);
		    Ok(())
		},
		other => other,
	    }
	}).await?;
	log::info!("Created namespace: {}", ns);

	Ok(())
    }

    /*
     * A 404 means the ConfigMap is gone already.
     */
    async fn delete_message(&self) -> Result<(), KubeError> {
	match self.cluster.delete_config_map(&self.namespace, api::CONFIGMAP_NAME).await {
	    Err(err) if is_not_found(&err) => Ok(()),
	    other => other,
	}
    }

    /*
     * Create the message ConfigMap. A conflict after a failed attempt means
     * that attempt went through and only its answer got lost. A conflict on
     * the very first attempt is a leftover of an earlier send that never got
     * to delete it: that one is removed and the creation repeated.
     */
    async fn create_message(&self, configmap: &KubeConfigMap) -> Result<KubeConfigMap, KubeError> {
	let ns = self.namespace.as_str();
	let mut attempts = 0;

	self.retry.run("configmap creation", || {
	    attempts += 1;
	    let first = attempts == 1;

	    async move {
		match self.cluster.create_config_map(ns, configmap).await {
		    Err(err) if is_already_exists(&err) && !first => {
			log::debug!("ConfigMap {} was created by an earlier attempt", api::CONFIGMAP_NAME);
			Ok(configmap.clone())
		    },
		    Err(err) if is_already_exists(&err) => {
			log::warn!("Removing leftover ConfigMap: {} in namespace: {}", api::CONFIGMAP_NAME, ns);
			self.delete_message().await?;
			self.cluster.create_config_map(ns, configmap).await
		    },
		    other => other,
		}
	    }
	}).await
    }

    /*
     * Returns the ConfigMap as it was created, before deleting it.
     */
    pub async fn send(&self, message: &str) -> Result<KubeConfigMap, Error> {
	let _in_flight = self.in_flight.lock().await;
	let ns = self.namespace.as_str();

	self.ensure_namespace().await?;

	let configmap = halpmessage::new(api::CONFIGMAP_NAME, ns, message);
	let created = self.create_message(&configmap).await?;
	log::info!("Created ConfigMap: {} in namespace: {}", api::CONFIGMAP_NAME, ns);

	// an earlier attempt may have gone through with its answer lost
	self.retry.run("configmap deletion", || self.delete_message()).await?;
	log::info!("Deleted ConfigMap: {} in namespace: {}", api::CONFIGMAP_NAME, ns);

	Ok(created)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use super::fake::*;

    fn relay(cluster: FakeCluster, retries: u32) -> Relay<FakeCluster> {
	Relay::new(cluster, api::NAMESPACE, api::RetryPolicy::immediate(retries))
    }

    #[tokio::test]
    async fn send_creates_then_deletes() {
	let relay = relay(FakeCluster::with_namespace("halpmcp"), 0);

	let created = relay.send("server down").await.unwrap();

	assert_eq!(created.metadata.name.as_deref(), Some("halp-message-config-map"));
	assert_eq!(created.metadata.namespace.as_deref(), Some("halpmcp"));
	assert_eq!(
	    created.data.unwrap().get("halpMessage").map(String::as_str),
	    Some("server down"),
	);
	assert_eq!(relay.cluster.calls(), vec![
	    Call::GetNamespace(String::from("halpmcp")),
	    Call::CreateConfigMap(String::from("halpmcp"), String::from("halp-message-config-map"), String::from("server down")),
	    Call::DeleteConfigMap(String::from("halpmcp"), String::from("halp-message-config-map")),
	]);
    }

    #[tokio::test]
    async fn existing_namespace_is_not_created() {
	let relay = relay(FakeCluster::with_namespace("halpmcp"), 0);

	relay.send("one").await.unwrap();
	relay.send("two").await.unwrap();

	let creations = relay.cluster.calls().into_iter()
	    .filter(|call| matches!(call, Call::CreateNamespace(_)))
	    .count();
	assert_eq!(creations, 0);
    }

    #[tokio::test]
    async fn missing_namespace_is_created_once() {
	let relay = relay(FakeCluster::default(), 0);

	relay.send("first").await.unwrap();
	relay.send("second").await.unwrap();

	let calls = relay.cluster.calls();
	assert_eq!(calls[0], Call::GetNamespace(String::from("halpmcp")));
	assert_eq!(calls[1], Call::CreateNamespace(String::from("halpmcp")));
	assert_eq!(
	    calls.iter().filter(|call| matches!(call, Call::CreateNamespace(_))).count(),
	    1,
	);
    }

    #[tokio::test]
    async fn namespace_created_concurrently_is_fine() {
	let cluster = FakeCluster{
	    namespace_conflict: true,
	    ..FakeCluster::default()
	};
	let relay = relay(cluster, 2);

	relay.send("racing").await.unwrap();

	let calls = relay.cluster.calls();
	assert_eq!(calls.iter().filter(|call| matches!(call, Call::CreateNamespace(_))).count(), 1);
	assert!(calls.iter().any(|call| matches!(call, Call::DeleteConfigMap(_, _))));
    }

    #[tokio::test]
    async fn transient_create_failure_is_retried() {
	let cluster = FakeCluster::with_namespace("halpmcp");
	*cluster.fail_create.lock().unwrap() = 2;
	let relay = relay(cluster, 3);

	relay.send("flaky").await.unwrap();

	let calls = relay.cluster.calls();
	assert_eq!(calls.iter().filter(|call| matches!(call, Call::CreateConfigMap(..))).count(), 3);
	assert_eq!(calls.iter().filter(|call| matches!(call, Call::DeleteConfigMap(..))).count(), 1);
    }

    #[tokio::test]
    async fn delete_failure_does_not_recreate() {
	let cluster = FakeCluster::with_namespace("halpmcp");
	*cluster.fail_delete.lock().unwrap() = 1;
	let relay = relay(cluster, 1);

	relay.send("delete twice").await.unwrap();

	let calls = relay.cluster.calls();
	assert_eq!(calls.iter().filter(|call| matches!(call, Call::CreateConfigMap(..))).count(), 1);
	assert_eq!(calls.iter().filter(|call| matches!(call, Call::DeleteConfigMap(..))).count(), 2);
    }

    #[tokio::test]
    async fn exhausted_retries_surface_the_error() {
	let cluster = FakeCluster::with_namespace("halpmcp");
	*cluster.fail_create.lock().unwrap() = 5;
	let relay = relay(cluster, 1);

	let err = relay.send("doomed").await.unwrap_err();

	assert!(matches!(err, Error::Kube(KubeError::Api(ref resp)) if resp.code == 500));
	assert!(!relay.cluster.calls().iter().any(|call| matches!(call, Call::DeleteConfigMap(..))));
    }

    #[tokio::test]
    async fn lost_create_reply_still_deletes() {
	let cluster = FakeCluster::with_namespace("halpmcp");
	*cluster.lose_create_reply.lock().unwrap() = 1;
	let relay = relay(cluster, 3);

	let created = relay.send("server down").await.unwrap();

	assert_eq!(created.data.unwrap().get("halpMessage").map(String::as_str), Some("server down"));
	assert!(relay.cluster.stored().is_empty());
	assert_eq!(relay.cluster.calls()[1..], [
	    Call::CreateConfigMap(String::from("halpmcp"), String::from("halp-message-config-map"), String::from("server down")),
	    Call::CreateConfigMap(String::from("halpmcp"), String::from("halp-message-config-map"), String::from("server down")),
	    Call::DeleteConfigMap(String::from("halpmcp"), String::from("halp-message-config-map")),
	]);

	relay.send("still down").await.unwrap();
	assert!(relay.cluster.stored().is_empty());
    }

    #[tokio::test]
    async fn leftover_configmap_is_replaced() {
	let cluster = FakeCluster::with_namespace("halpmcp");
	cluster.configmaps.lock().unwrap().insert(String::from("halp-message-config-map"));
	let relay = relay(cluster, 0);

	relay.send("fresh").await.unwrap();

	assert!(relay.cluster.stored().is_empty());
	assert_eq!(relay.cluster.calls()[1..], [
	    Call::CreateConfigMap(String::from("halpmcp"), String::from("halp-message-config-map"), String::from("fresh")),
	    Call::DeleteConfigMap(String::from("halpmcp"), String::from("halp-message-config-map")),
	    Call::CreateConfigMap(String::from("halpmcp"), String::from("halp-message-config-map"), String::from("fresh")),
	    Call::DeleteConfigMap(String::from("halpmcp"), String::from("halp-message-config-map")),
	]);
    }

    #[tokio::test]
    async fn failed_delete_does_not_block_later_sends() {
	let cluster = FakeCluster::with_namespace("halpmcp");
	*cluster.fail_delete.lock().unwrap() = 2;
	let relay = relay(cluster, 1);

	assert!(relay.send("first").await.is_err());
	assert_eq!(relay.cluster.stored().len(), 1);

	relay.send("second").await.unwrap();
	assert!(relay.cluster.stored().is_empty());
    }

    #[tokio::test]
    async fn namespace_lookup_failure_aborts() {
	let cluster = FakeCluster::default();
	*cluster.fail_lookup.lock().unwrap() = 1;
	let relay = relay(cluster, 0);

	assert!(relay.send("nope").await.is_err());
	assert_eq!(relay.cluster.calls(), vec![Call::GetNamespace(String::from("halpmcp"))]);
    }

    #[test]
    fn error_classification() {
	assert!(is_not_found(&api_error(404, "NotFound")));
	assert!(is_already_exists(&api_error(409, "AlreadyExists")));
	assert!(!is_not_found(&api_error(500, "InternalError")));
    }
}
