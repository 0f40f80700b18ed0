//! Async runtime manager and interrupt handling
//!
//! The training loop itself is synchronous; the runtime only serves storage
//! I/O at the checkpoint boundary and the Ctrl+C listener.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Builder, Runtime};
use tracing::{info, warn};

use crate::{Error, Result};

/// Flag raised by an external interrupt, polled between epochs
#[derive(Debug, Clone, Default)]
pub struct InterruptFlag(Arc<AtomicBool>);

impl InterruptFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Owns the Tokio runtime used by the harness
pub struct RuntimeManager {
    runtime: Option<Runtime>,
    interrupt: InterruptFlag,
}

impl RuntimeManager {
    /// Create a runtime with the given number of I/O threads
    pub fn new(io_threads: usize) -> Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(io_threads.max(1))
            .enable_all()
            .thread_name("cxr-train-io")
            .build()
            .map_err(|e| Error::Internal {
                message: format!("Failed to build Tokio runtime: {}", e),
            })?;

        Ok(Self {
            runtime: Some(runtime),
            interrupt: InterruptFlag::new(),
        })
    }

    fn runtime(&self) -> &Runtime {
        // Only taken in Drop
        self.runtime.as_ref().expect("Runtime should exist")
    }

    /// Get the runtime handle
    pub fn handle(&self) -> tokio::runtime::Handle {
        self.runtime().handle().clone()
    }

    /// Block on a future until completion
    pub fn block_on<F: std::future::Future>(&self, future: F) -> F::Output {
        self.runtime().block_on(future)
    }

    /// Interrupt flag shared with the training loop
    pub fn interrupt_flag(&self) -> InterruptFlag {
        self.interrupt.clone()
    }

    /// Raise the interrupt flag on Ctrl+C
    pub fn install_interrupt_handler(&self) {
        let flag = self.interrupt.clone();
        self.runtime().spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    warn!("Received Ctrl+C, stopping after the current epoch");
                    flag.raise();
                }
                Err(e) => warn!(error = %e, "Failed to install Ctrl+C handler"),
            }
        });
    }
}

impl Drop for RuntimeManager {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_timeout(Duration::from_secs(5));
            info!("Runtime manager shut down");
        }
    }
}
