use std::sync::Arc;

use slog::Logger;

use crate::clock::Clock;
use crate::config::Config;
use crate::notification::Notifier;

/// Everything the service needs from the outside world.
#[derive(Clone)]
pub struct Environment {
    pub logger: Arc<Logger>,
    pub clock: Arc<Clock>,
    pub notifier: Arc<Notifier>,
    pub config: Config,
}

impl Environment {
    pub fn new(logger: Arc<Logger>, clock: Arc<Clock>, notifier: Arc<Notifier>, config: Config) -> Self {
        Self {
            logger,
            clock,
            notifier,
            config,
        }
    }
}
