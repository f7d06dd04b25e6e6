use halp_api::ClientError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {

    /* encapsulate a kube-rust error */
    #[error("kube error: {0}")]
    Kube(#[from] kube::Error),

    #[error("{0}")]
    Client(#[from] ClientError),

    /* signal handler setup */
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /* the MCP session could not be set up or broke down */
    #[error("mcp error: {0}")]
    Mcp(String),
}
