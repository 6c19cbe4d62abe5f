use crate::config::Config;
use crate::storage::Storage;
use crate::types::token::PipelineCancellationToken;

/// Shared context handed to each pipeline component.
///
/// Carries the configuration, a storage copy (sharing the underlying client
/// and transfer permit pool), and the cancellation token. The channels
/// connecting the stages are owned by the components themselves: the lister
/// holds the work-queue sender, each download worker holds the work-queue
/// receiver and the completion-queue sender, and the completion collector
/// holds the completion-queue receiver.
pub struct Stage {
    pub config: Config,
    pub target: Storage,
    pub cancellation_token: PipelineCancellationToken,
}

impl Stage {
    pub fn new(
        config: Config,
        target: Storage,
        cancellation_token: PipelineCancellationToken,
    ) -> Self {
        Self {
            config,
            target,
            cancellation_token,
        }
    }
}
