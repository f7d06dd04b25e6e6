use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::api::core::v1::Namespace;
use kube::api::ObjectMeta;
use std::collections::BTreeMap;
use thiserror::Error;

/* The namespace every halp message travels through */
pub const NAMESPACE: &str = "halpmcp";

/* The one and only ConfigMap name used as message envelope */
pub const CONFIGMAP_NAME: &str = "halp-message-config-map";

/* The ConfigMap's data key holding the message text */
pub const MESSAGE_KEY: &str = "halpMessage";

/*
 * Substring an observed ConfigMap name must contain to be considered a
 * halp message. Creating a namespace also creates the cluster root CA
 * ConfigMap (kube-root-ca.crt) in it, which must not page anybody.
 */
pub const MARKER: &str = "halp";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DecodeError {

    #[error("configmap has no name")]
    Unnamed,

    #[error("irrelevant configmap {name}")]
    Irrelevant { name: String },
}

/*
 * HalpMessage is the typed view of a ConfigMap carrying a halp message.
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HalpMessage {
    pub name: String,
    pub namespace: Option<String>,
    pub message: String,
}

impl HalpMessage {

    /*
     * Decode an observed ConfigMap. Anything whose name does not contain
     * `marker` is reported as DecodeError::Irrelevant, so the caller can skip
     * it without any side effect. A missing `halpMessage` is an empty
     * message, the notification still goes out.
     */
    pub fn decode(cm: &ConfigMap, marker: &str) -> Result<HalpMessage, DecodeError> {
	let name = match &cm.metadata.name {
	    Some(name) => name.clone(),
	    None => return Err(DecodeError::Unnamed),
	};

	if !is_relevant(&name, marker) {
	    return Err(DecodeError::Irrelevant{ name });
	}

	let message = cm.data.as_ref()
	    .and_then(|data| data.get(MESSAGE_KEY))
	    .cloned()
	    .unwrap_or_default();

	Ok(HalpMessage{
	    name: name,
	    namespace: cm.metadata.namespace.clone(),
	    message: message,
	})
    }
}

pub fn is_relevant(name: &str, marker: &str) -> bool {
    name.contains(marker)
}

/*
 * Returns the message envelope: a ConfigMap named `name` in `namespace`
 * holding `message` under MESSAGE_KEY.
 */
pub fn new(name: &str, namespace: &str, message: &str) -> ConfigMap {
    let mut metadata = ObjectMeta::default();
    metadata.name = Some(name.to_string());
    metadata.namespace = Some(namespace.to_string());

    let mut data = BTreeMap::new();
    data.insert(String::from(MESSAGE_KEY), message.to_string());

    ConfigMap{
	metadata: metadata,
	data: Some(data),
	..ConfigMap::default()
    }
}

pub fn new_namespace(name: &str) -> Namespace {
    let mut metadata = ObjectMeta::default();
    metadata.name = Some(name.to_string());

    Namespace{
	metadata: metadata,
	..Namespace::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configmap(name: Option<&str>, data: Option<Vec<(&str, &str)>>) -> ConfigMap {
	let mut cm = ConfigMap::default();
	cm.metadata.name = name.map(String::from);
	cm.metadata.namespace = Some(String::from(NAMESPACE));
	cm.data = data.map(|kv| {
	    kv.into_iter()
		.map(|(k, v)| (k.to_string(), v.to_string()))
		.collect()
	});
	cm
    }

    #[test]
    fn new_builds_the_envelope() {
	let cm = new(CONFIGMAP_NAME, NAMESPACE, "server down");

	assert_eq!(cm.metadata.name.as_deref(), Some("halp-message-config-map"));
	assert_eq!(cm.metadata.namespace.as_deref(), Some("halpmcp"));
	let data = cm.data.unwrap();
	assert_eq!(data.len(), 1);
	assert_eq!(data.get("halpMessage").map(String::as_str), Some("server down"));
    }

    #[test]
    fn decode_extracts_the_message() {
	let cm = new(CONFIGMAP_NAME, NAMESPACE, "server down");
	let msg = HalpMessage::decode(&cm, MARKER).unwrap();

	assert_eq!(msg.name, CONFIGMAP_NAME);
	assert_eq!(msg.namespace.as_deref(), Some(NAMESPACE));
	assert_eq!(msg.message, "server down");
    }

    #[test]
    fn decode_skips_root_ca() {
	let cm = configmap(Some("kube-root-ca.crt"), Some(vec![("ca.crt", "-----BEGIN CERTIFICATE-----")]));

	assert_eq!(
	    HalpMessage::decode(&cm, MARKER),
	    Err(DecodeError::Irrelevant{ name: String::from("kube-root-ca.crt") }),
	);
    }

    #[test]
    fn decode_without_message_key() {
	let cm = configmap(Some("halp-other"), Some(vec![("something", "else")]));
	let msg = HalpMessage::decode(&cm, MARKER).unwrap();
	assert_eq!(msg.name, "halp-other");
	assert_eq!(msg.message, "");

	let cm = configmap(Some("halp-empty"), None);
	assert_eq!(HalpMessage::decode(&cm, MARKER).unwrap().message, "");
    }

    #[test]
    fn decode_without_name() {
	let cm = configmap(None, Some(vec![(MESSAGE_KEY, "hi")]));
	assert_eq!(HalpMessage::decode(&cm, MARKER), Err(DecodeError::Unnamed));
    }

    #[test]
    fn marker_is_a_substring_match() {
	assert!(is_relevant("halp-message-config-map", MARKER));
	assert!(is_relevant("my-halp", MARKER));
	assert!(!is_relevant("kube-root-ca.crt", MARKER));
	assert!(!is_relevant("HALP", MARKER));
    }
}
