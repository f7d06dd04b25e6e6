use log;
use tokio::signal::unix::signal;
use tokio::signal::unix::SignalKind;
use tokio_util::sync::CancellationToken;

/*
 * Installs the SIGINT and SIGTERM handlers and spawns the task listening on
 * them: the returned token is cancelled once the process is asked to
 * terminate. Failing to install a handler is an error for the caller, never
 * a shutdown request.
 */
pub fn cancel_on_shutdown() -> std::io::Result<CancellationToken> {
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;

    let token = CancellationToken::new();
    let cancel = token.clone();

    tokio::spawn(async move {
	let name = tokio::select! {
	    _ = interrupt.recv() => "SIGINT",
	    _ = terminate.recv() => "SIGTERM",
	};
	log::info!("Received {}, shutting down...", name);
	cancel.cancel();
    });

    Ok(token)
}
