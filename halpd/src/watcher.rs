use crate::errors::Error;
use crate::notifier::Notifier;
use halp_api as api;
use halp_api::DecodeError;
use halp_api::HalpMessage;

use futures::Stream;
use futures::StreamExt;
use k8s_openapi::api::core::v1::ConfigMap as KubeConfigMap;
use kube::Api as KubeApi;
use kube::ResourceExt;
use kube::runtime::WatchStreamExt;
use kube::runtime::reflector as kube_reflector;
use kube::runtime::reflector::Store as KubeStore;
use kube::runtime::watcher as kube_watcher;
use kube::runtime::watcher::Config as KubeWatcherConfig;
use kube::runtime::watcher::Event as KubeEvent;
use log;
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;

/*
 * What became of an added ConfigMap.
 */
#[derive(Debug, PartialEq, Eq)]
pub enum Delivery {
    Notified(HalpMessage),
    Skipped(DecodeError),
}

/*
 * AddTracker turns the watcher's apply/delete events back into "added"
 * notifications: an object counts as added the first time its UID shows
 * up. Objects re-listed after a reconnect are not added again, and the ones
 * that vanished while we were away are forgotten.
 */
#[derive(Debug, Default)]
pub struct AddTracker {
    known: HashSet<String>,
    relisting: Option<HashSet<String>>,
    synced: bool,
}

fn object_key(cm: &KubeConfigMap) -> String {
    match cm.uid() {
	Some(uid) => uid,
	None => format!("{}/{}", cm.namespace().unwrap_or_default(), cm.name_any()),
    }
}

impl AddTracker {

    /*
     * Returns the event's object when it was just added.
     */
    pub fn observe<'a>(&mut self, event: &'a KubeEvent<KubeConfigMap>) -> Option<&'a KubeConfigMap> {
	match event {
	    KubeEvent::Init => {
		self.relisting = Some(HashSet::new());
		None
	    },
	    KubeEvent::InitApply(cm) => {
		let key = object_key(cm);
		if let Some(seen) = self.relisting.as_mut() {
		    seen.insert(key.clone());
		}
		tern(self.known.insert(key), Some(cm), None)
	    },
	    KubeEvent::InitDone => {
		if let Some(seen) = self.relisting.take() {
		    self.known = seen;
		}
		self.synced = true;
		None
	    },
	    KubeEvent::Apply(cm) => tern(self.known.insert(object_key(cm)), Some(cm), None),
	    KubeEvent::Delete(cm) => {
		self.known.remove(&object_key(cm));
		None
	    },
	}
    }

    /*
     * Whether a complete list has been seen at least once.
     */
    pub fn is_synced(&self) -> bool {
	self.synced
    }
}

fn tern<T>(expr: bool, when_true: T, when_false: T) -> T {
    if expr {
	when_true
    } else {
	when_false
    }
}

/*
 * ConfigMapWatcher watches ConfigMaps in one namespace and runs the
 * notifier for every added ConfigMap carrying a halp message.
 */
pub struct ConfigMapWatcher<N> {
    notifier: N,
    marker: String,
    retry: api::RetryPolicy,
}

impl<N: Notifier> ConfigMapWatcher<N> {

    pub fn new(notifier: N, marker: &str, retry: api::RetryPolicy) -> Self {
	Self{
	    notifier: notifier,
	    marker: marker.to_string(),
	    retry: retry,
	}
    }

    /*
     * Handle one added ConfigMap. Anything that is not a halp message is
     * skipped; a notifier that keeps failing after the retries is an error.
     */
    pub async fn on_add(&self, cm: &KubeConfigMap) -> Result<Delivery, Error> {
	let msg = match HalpMessage::decode(cm, &self.marker) {
	    Ok(msg) => msg,
	    Err(err @ DecodeError::Irrelevant{ .. }) => {
		log::info!("{}, skipping.", err);
		return Ok(Delivery::Skipped(err));
	    },
	    Err(err) => {
		log::warn!("Skipping malformed configmap: {}", err);
		return Ok(Delivery::Skipped(err));
	    }
	};

	log::info!("ConfigMap data: {}", msg.message);
	self.retry.run("halp notification", || self.notifier.notify(&msg.message)).await?;

	Ok(Delivery::Notified(msg))
    }

    /*
     * The event loop. Runs until the token is cancelled; returns
     * Error::CacheSync when that happens before the first complete list.
     */
    pub async fn watch<S>(&self, events: S, store: KubeStore<KubeConfigMap>, token: CancellationToken) -> Result<(), Error>
    where
	S: Stream<Item = Result<KubeEvent<KubeConfigMap>, kube_watcher::Error>>,
    {
	let mut events = std::pin::pin!(events);
	let mut tracker = AddTracker::default();

	loop {
	    let event = tokio::select! {
		biased;

		_ = token.cancelled() => break,
		event = events.next() => event,
	    };

	    let event = match event {
		Some(Ok(event)) => event,
		Some(Err(err)) => {
		    log::warn!("ConfigMap watch failed, backing off: {}", err);
		    continue;
		},
		None => return Err(Error::Other(String::from("ConfigMap watch stream ended"))),
	    };

	    let was_synced = tracker.is_synced();
	    let added = tracker.observe(&event);
	    if !was_synced && tracker.is_synced() {
		log::info!("ConfigMap watcher synced and ready, {} configmaps cached", store.state().len());
	    }

	    if let Some(cm) = added {
		if let Err(err) = self.on_add(cm).await {
		    log::error!("Unable to deliver halp message from {}: {}", cm.name_any(), err);
		}
	    }
	}

	log::info!("Stopping ConfigMap watcher");
	if !tracker.is_synced() {
	    return Err(Error::CacheSync);
	}

	Ok(())
    }

    /*
     * List and watch ConfigMaps through a reflector, reconnecting with the
     * default backoff whenever the watch breaks.
     */
    pub async fn run(&self, configmap_api: KubeApi<KubeConfigMap>, token: CancellationToken) -> Result<(), Error> {
	log::info!("Starting ConfigMap watcher");

	let (reader, writer) = kube_reflector::store();
	let events = kube_reflector::reflector(
	    writer,
	    kube_watcher(configmap_api, KubeWatcherConfig::default()),
	).default_backoff();

	self.watch(events, reader, token).await
    }
}
