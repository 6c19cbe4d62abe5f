// Ctrl+C handling for the download pipeline.
//
// The first Ctrl+C fires the shared [`PipelineCancellationToken`]: the lister
// stops paginating after its current page and closes the work queue, and the
// download workers stop picking up keys and discard any temp files they own,
// so the run ends with a consistent partial tree (see `pipeline.rs`). A
// second Ctrl+C aborts the process immediately for users who do not want to
// wait for in-flight transfers to drain.

use s3fetch_rs::PipelineCancellationToken;
use tokio::task::JoinHandle;
use tokio::{select, signal};
use tracing::{debug, error, warn};

// Matches the CLI's partial/total-failure exit code; the run was cut short.
const FORCED_ABORT_EXIT_CODE: i32 = 1;

pub fn spawn_ctrl_c_handler(cancellation_token: PipelineCancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        select! {
            _ = cancellation_token.cancelled() => {
                debug!("pipeline already cancelled, ctrl-c handler exiting.");
                return;
            }
            result = signal::ctrl_c() => {
                match result {
                    Ok(()) => {
                        warn!(
                            "ctrl-c received, draining in-flight downloads; \
                             press ctrl-c again to abort immediately."
                        );
                        cancellation_token.cancel();
                    }
                    Err(e) => {
                        error!("failed to listen for ctrl-c signal: {e}");
                        return;
                    }
                }
            }
        }

        // The token is fired and the pipeline is draining. A second ctrl-c
        // means the user will not wait; temp files are left for the next run
        // to replace.
        if signal::ctrl_c().await.is_ok() {
            error!("second ctrl-c received, aborting without draining.");
            std::process::exit(FORCED_ABORT_EXIT_CODE);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use once_cell::sync::Lazy;
    use s3fetch_rs::create_pipeline_cancellation_token;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Semaphore;

    // Signal-delivery tests must not overlap; SIGINT is process-wide.
    static SIGNAL_TEST_LOCK: Lazy<Arc<Semaphore>> = Lazy::new(|| Arc::new(Semaphore::new(1)));

    const WAIT_FOR_HANDLER_START_MILLIS: u64 = 100;

    #[tokio::test]
    #[cfg(target_family = "unix")]
    async fn first_sigint_fires_cancellation_token() {
        init_dummy_tracing_subscriber();

        let _lock = SIGNAL_TEST_LOCK.clone().acquire_owned().await.unwrap();

        let cancellation_token = create_pipeline_cancellation_token();

        let join_handle = spawn_ctrl_c_handler(cancellation_token.clone());
        tokio::time::sleep(Duration::from_millis(WAIT_FOR_HANDLER_START_MILLIS)).await;

        send_sigint_to_self();

        // The handler stays alive after the first signal (it is waiting for
        // a possible second ctrl-c), so poll for the cancellation effect
        // instead of joining.
        for _ in 0..50 {
            if cancellation_token.is_cancelled() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(cancellation_token.is_cancelled());

        join_handle.abort();
        let _ = join_handle.await;
    }

    #[tokio::test]
    async fn handler_exits_when_pipeline_is_cancelled_elsewhere() {
        init_dummy_tracing_subscriber();

        let _lock = SIGNAL_TEST_LOCK.clone().acquire_owned().await.unwrap();

        let cancellation_token = create_pipeline_cancellation_token();

        let join_handle = spawn_ctrl_c_handler(cancellation_token.clone());
        cancellation_token.cancel();

        // Cancellation from the pipeline side (e.g. a fatal worker fault)
        // releases the handler without any signal arriving.
        join_handle.await.unwrap();

        assert!(cancellation_token.is_cancelled());
    }

    #[cfg(target_family = "unix")]
    fn send_sigint_to_self() {
        nix::sys::signal::kill(nix::unistd::Pid::this(), nix::sys::signal::Signal::SIGINT).unwrap();
    }

    fn init_dummy_tracing_subscriber() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("dummy=trace")
            .try_init();
    }
}
