//! Graceful shutdown with signal handling

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Shutdown signal broadcaster
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    sender: Arc<broadcast::Sender<()>>,
    triggered: Arc<AtomicBool>,
}

impl ShutdownSignal {
    /// Create a new shutdown signal
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1);
        Self {
            sender: Arc::new(sender),
            triggered: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Subscribe to shutdown notifications
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.sender.subscribe()
    }

    /// Trigger shutdown
    pub fn trigger(&self) {
        if self.triggered.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.sender.send(());
        tracing::info!("Shutdown signal triggered");
    }

    /// Check if shutdown was triggered
    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Resolve once shutdown is triggered, including before the call
    pub async fn wait(&self) {
        let mut rx = self.subscribe();
        if self.is_triggered() {
            return;
        }
        let _ = rx.recv().await;
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Callback run on a user signal
pub type SignalHook = Arc<dyn Fn() + Send + Sync>;

/// Signal handler for OS signals
///
/// SIGTERM and SIGINT trigger shutdown. SIGUSR1 dumps diagnostics and
/// SIGUSR2 is delegated to the host; neither stops the handler.
pub struct SignalHandler {
    signal: ShutdownSignal,
    on_diagnostics: Option<SignalHook>,
    on_user: Option<SignalHook>,
}

impl fmt::Debug for SignalHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalHandler")
            .field("signal", &self.signal)
            .field("on_diagnostics", &self.on_diagnostics.is_some())
            .field("on_user", &self.on_user.is_some())
            .finish()
    }
}

impl SignalHandler {
    /// Create a new signal handler
    pub fn new(signal: ShutdownSignal) -> Self {
        Self {
            signal,
            on_diagnostics: None,
            on_user: None,
        }
    }

    /// Hook run on SIGUSR1
    pub fn on_diagnostics(mut self, hook: SignalHook) -> Self {
        self.on_diagnostics = Some(hook);
        self
    }

    /// Hook run on SIGUSR2
    pub fn on_user(mut self, hook: SignalHook) -> Self {
        self.on_user = Some(hook);
        self
    }

    /// Listen for OS signals until shutdown
    pub async fn run(self) {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            let streams = (
                signal(SignalKind::terminate()),
                signal(SignalKind::interrupt()),
                signal(SignalKind::user_defined1()),
                signal(SignalKind::user_defined2()),
            );
            let (mut sigterm, mut sigint, mut sigusr1, mut sigusr2) = match streams {
                (Ok(term), Ok(int), Ok(usr1), Ok(usr2)) => (term, int, usr1, usr2),
                _ => {
                    tracing::error!("Failed to set up signal handlers");
                    return;
                }
            };

            loop {
                tokio::select! {
                    _ = sigterm.recv() => {
                        tracing::info!("Received SIGTERM");
                        self.signal.trigger();
                        break;
                    }
                    _ = sigint.recv() => {
                        tracing::info!("Received SIGINT");
                        self.signal.trigger();
                        break;
                    }
                    _ = sigusr1.recv() => {
                        tracing::info!("Received SIGUSR1, dumping diagnostics");
                        match &self.on_diagnostics {
                            Some(hook) => hook(),
                            None => tracing::info!(
                                shutdown_triggered = self.signal.is_triggered(),
                                "Diagnostics"
                            ),
                        }
                    }
                    _ = sigusr2.recv() => {
                        tracing::info!("Received SIGUSR2");
                        if let Some(hook) = &self.on_user {
                            hook();
                        }
                    }
                    _ = self.signal.wait() => break,
                }
            }
        }

        #[cfg(not(unix))]
        {
            tokio::select! {
                result = tokio::signal::ctrl_c() => match result {
                    Ok(()) => {
                        tracing::info!("Received Ctrl+C");
                        self.signal.trigger();
                    }
                    Err(err) => {
                        tracing::error!("Failed to listen for Ctrl+C: {}", err);
                    }
                },
                _ = self.signal.wait() => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_shutdown_signal_new() {
        let signal = ShutdownSignal::new();
        assert!(!signal.is_triggered());
    }

    #[tokio::test]
    async fn test_shutdown_signal_multiple_subscribers() {
        let signal = ShutdownSignal::new();
        let mut rx1 = signal.subscribe();
        let mut rx2 = signal.subscribe();

        signal.trigger();

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
        assert!(signal.is_triggered());
    }

    #[tokio::test]
    async fn test_wait_after_trigger_returns() {
        let signal = ShutdownSignal::new();
        signal.trigger();

        tokio::time::timeout(Duration::from_secs(1), signal.wait())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_handler_exits_on_trigger() {
        let signal = ShutdownSignal::new();
        let handle = tokio::spawn(SignalHandler::new(signal.clone()).run());

        signal.trigger();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
