use crate::errors::Error;

use async_trait::async_trait;
use log;
use tokio::process::Command;

pub const DEFAULT_PROGRAM: &str = "halp";

#[async_trait]
pub trait Notifier: Send + Sync {

    async fn notify(&self, message: &str) -> Result<(), Error>;
}

/*
 * CommandNotifier pages a human by running `<program> -m <message>` and
 * waiting for it to exit. Only a zero exit code counts as delivered.
 */
#[derive(Debug, Clone)]
pub struct CommandNotifier {
    program: String,
}

impl CommandNotifier {

    pub fn new(program: &str) -> Self {
	Self{
	    program: program.to_string(),
	}
    }

    pub fn program(&self) -> &str {
	self.program.as_str()
    }
}

impl Default for CommandNotifier {
    fn default() -> Self {
	Self::new(DEFAULT_PROGRAM)
    }
}

#[async_trait]
impl Notifier for CommandNotifier {

    async fn notify(&self, message: &str) -> Result<(), Error> {
	log::debug!("running {} -m {:?}", self.program, message);

	let status = Command::new(&self.program)
	    .arg("-m")
	    .arg(message)
	    .status()
	    .await?;

	if !status.success() {
	    return Err(Error::Notifier{
		program: self.program.clone(),
		status: status,
	    });
	}

	Ok(())
    }
}
