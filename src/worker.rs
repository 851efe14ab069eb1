//! Background recalculation worker.
//!
//! Front ends store an edited value, then send its period here instead of
//! recalculating inline. The worker recomputes the period's consumption
//! and the balance cascade in order, one period at a time, and pushes the
//! refreshed values back for display.

use std::collections::BTreeMap;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::calculation::Calculator;
use crate::error::{FinTableError, Result};
use crate::models::Period;

/// Values refreshed by one recalculation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Refresh {
    /// The edited period.
    pub period: Period,
    /// Its recomputed consumption.
    pub consumption: i64,
    /// Every balance touched by the cascade.
    pub balances: BTreeMap<Period, i64>,
}

/// Handle used to enqueue edited periods. Cheap to clone; the worker stops
/// once every clone is dropped.
#[derive(Debug, Clone)]
pub struct RecalcSender {
    /// Channel into the worker loop.
    tx: mpsc::UnboundedSender<Period>,
}

impl RecalcSender {
    /// Enqueues a period without waiting for the recalculation.
    ///
    /// # Errors
    ///
    /// Returns [`FinTableError::WorkerStopped`] if the worker task has
    /// exited.
    #[inline]
    pub fn send(&self, period: Period) -> Result<()> {
        self.tx
            .send(period)
            .map_err(|_closed| FinTableError::WorkerStopped)
    }
}

/// Spawns the worker on the current tokio runtime.
///
/// Returns the sender for edited periods, the receiver of refreshed values
/// and the task handle. A failed recalculation is logged and skipped. The
/// refresh receiver may be dropped; results are then discarded.
#[must_use]
pub fn spawn(
    calculator: Calculator,
) -> (RecalcSender, mpsc::UnboundedReceiver<Refresh>, JoinHandle<()>) {
    let (tx, mut periods) = mpsc::unbounded_channel::<Period>();
    let (refresh_tx, refresh_rx) = mpsc::unbounded_channel();

    let handle = tokio::spawn(async move {
        while let Some(period) = periods.recv().await {
            match calculator.recalculate(period) {
                Ok((consumption, balances)) => {
                    let refresh = Refresh {
                        period,
                        consumption,
                        balances,
                    };
                    if refresh_tx.send(refresh).is_err() {
                        tracing::debug!(%period, "refresh receiver dropped");
                    }
                }
                Err(err) => tracing::error!(%period, error = %err, "recalculation failed"),
            }
        }
        tracing::debug!("recalculation worker stopped");
    });

    (RecalcSender { tx }, refresh_rx, handle)
}
