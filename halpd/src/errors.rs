use halp_api::ClientError;
use std::process::ExitStatus;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {

    #[error("{0}")]
    Client(#[from] ClientError),

    /* notifier spawn or signal handler setup */
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("notifier `{program}` exited with {status}")]
    Notifier { program: String, status: ExitStatus },

    #[error("failed to wait for caches to sync")]
    CacheSync,

    #[error("`{0}`")]
    Other(String),
}
