/*
 * halp/api - the objects and plumbing shared by the halp tool server
 * (halpmcp) and the halp watcher (halpd).
 */

pub mod halpmessage;
pub use halpmessage::HalpMessage;
pub use halpmessage::DecodeError;
pub use halpmessage::CONFIGMAP_NAME;
pub use halpmessage::MARKER;
pub use halpmessage::MESSAGE_KEY;
pub use halpmessage::NAMESPACE;

pub mod client;
pub use client::client;
pub use client::ClientError;

pub mod retry;
pub use retry::RetryPolicy;

pub mod signal;
pub use signal::cancel_on_shutdown;
