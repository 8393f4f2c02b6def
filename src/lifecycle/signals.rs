//! OS signal handling for the binary.
//!
//! # Design Decisions
//! - Uses Tokio's signal handling on a small private runtime, so the caller stays synchronous
//! - SIGINT and SIGTERM both request a stop

/// Block until Ctrl-C (or SIGTERM on Unix) is received.
///
/// Must not be called from inside an async runtime.
pub fn wait_for_shutdown_signal() -> std::io::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
    runtime.block_on(async {
        #[cfg(unix)]
        {
            let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
            tokio::select! {
                result = tokio::signal::ctrl_c() => result?,
                _ = terminate.recv() => {}
            }
        }
        #[cfg(not(unix))]
        tokio::signal::ctrl_c().await?;

        tracing::info!("Shutdown signal received");
        Ok(())
    })
}
