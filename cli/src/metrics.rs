//! # Prometheus Metrics
//!
//! Per-run counters for a distribution batch, fed from the distributor's
//! event stream. A one-shot CLI has nothing to scrape, so the registry is
//! written to a file in the text exposition format at the end of the run
//! (`--metrics-file`), ready for a node-exporter textfile collector.
//!
//! All metrics live in a dedicated [`prometheus::Registry`] under the
//! `dropship` prefix.

use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder};

use dropship_protocol::dispatch::{BatchEvent, BatchStatus, Outcome, Stage};

/// Metric handles for one batch run.
pub struct BatchMetrics {
    registry: Registry,
    pub recipients: IntGauge,
    pub submitted_total: IntCounter,
    pub succeeded_total: IntCounter,
    pub failed_total: IntCounter,
    pub unknown_total: IntCounter,
    pub skipped_total: IntCounter,
    pub resource_cost_total: IntCounter,
    pub reconnects_total: IntCounter,
    /// Signing to verdict, per recipient.
    pub transfer_latency_seconds: Histogram,
    started: HashMap<usize, Instant>,
}

fn counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounter, prometheus::Error> {
    let c = IntCounter::new(name, help)?;
    registry.register(Box::new(c.clone()))?;
    Ok(c)
}

impl BatchMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("dropship".into()), None)?;

        let recipients = IntGauge::new("batch_recipients", "Recipients in the current batch")?;
        registry.register(Box::new(recipients.clone()))?;

        let transfer_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "transfer_latency_seconds",
                "Time from signing to a final verdict, per recipient",
            )
            .buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]),
        )?;
        registry.register(Box::new(transfer_latency_seconds.clone()))?;

        Ok(Self {
            submitted_total: counter(
                &registry,
                "transactions_submitted_total",
                "Transactions accepted by the node",
            )?,
            succeeded_total: counter(
                &registry,
                "transfers_succeeded_total",
                "Transfers finalized successfully",
            )?,
            failed_total: counter(&registry, "transfers_failed_total", "Transfers that failed")?,
            unknown_total: counter(
                &registry,
                "transfers_unknown_total",
                "Transfers whose outcome could not be determined",
            )?,
            skipped_total: counter(
                &registry,
                "transfers_skipped_total",
                "Recipients never started because the batch was cancelled",
            )?,
            resource_cost_total: counter(
                &registry,
                "resource_cost_total",
                "Resource units consumed by finalized transactions",
            )?,
            reconnects_total: counter(
                &registry,
                "node_reconnects_total",
                "Times the node connection was dropped and re-dialed",
            )?,
            registry,
            recipients,
            transfer_latency_seconds,
            started: HashMap::new(),
        })
    }

    pub fn observe(&mut self, event: &BatchEvent) {
        match event {
            BatchEvent::Status {
                index,
                status: BatchStatus::Signing,
                ..
            } => {
                self.started.insert(*index, Instant::now());
            }
            BatchEvent::Status { .. } => {}
            BatchEvent::Result(result) => {
                let refused = matches!(
                    result.outcome,
                    Outcome::Failed {
                        stage: Stage::Broadcast
                    }
                );
                if result.hash.is_some() && !refused {
                    self.submitted_total.inc();
                }
                match &result.outcome {
                    Outcome::Succeeded => self.succeeded_total.inc(),
                    Outcome::Failed { .. } => self.failed_total.inc(),
                    Outcome::Unknown { .. } => self.unknown_total.inc(),
                    Outcome::Skipped => self.skipped_total.inc(),
                }
                if let Some(cost) = result.resource_cost {
                    self.resource_cost_total.inc_by(cost);
                }
                if let Some(start) = self.started.remove(&result.index) {
                    self.transfer_latency_seconds
                        .observe(start.elapsed().as_secs_f64());
                }
            }
        }
    }

    /// Text exposition format.
    pub fn encode(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).context("prometheus output is not utf-8")
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.encode()?)
            .with_context(|| format!("failed to write metrics to {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dropship_protocol::crypto::Address;
    use dropship_protocol::dispatch::TransactionResult;

    fn result(index: usize, outcome: Outcome, cost: Option<u64>) -> TransactionResult {
        let mut r = TransactionResult::skipped(index, Address::from_bytes([index as u8 + 1; 20]));
        r.outcome = outcome;
        r.resource_cost = cost;
        r
    }

    #[test]
    fn outcomes_are_counted() {
        let mut m = BatchMetrics::new().unwrap();
        m.observe(&BatchEvent::Result(result(0, Outcome::Succeeded, Some(21_000))));
        m.observe(&BatchEvent::Result(result(
            1,
            Outcome::Failed {
                stage: Stage::Broadcast,
            },
            None,
        )));
        m.observe(&BatchEvent::Result(result(
            2,
            Outcome::Unknown {
                reason: "cancelled".into(),
            },
            None,
        )));
        m.observe(&BatchEvent::Result(result(3, Outcome::Skipped, None)));

        assert_eq!(m.succeeded_total.get(), 1);
        assert_eq!(m.failed_total.get(), 1);
        assert_eq!(m.unknown_total.get(), 1);
        assert_eq!(m.skipped_total.get(), 1);
        assert_eq!(m.resource_cost_total.get(), 21_000);
    }

    #[test]
    fn latency_is_measured_from_signing() {
        let mut m = BatchMetrics::new().unwrap();
        let recipient = Address::from_bytes([1; 20]);
        m.observe(&BatchEvent::Status {
            index: 0,
            recipient,
            status: BatchStatus::Signing,
        });
        m.observe(&BatchEvent::Result(result(0, Outcome::Succeeded, Some(1))));
        assert_eq!(m.transfer_latency_seconds.get_sample_count(), 1);
    }

    #[test]
    fn encoding_uses_prefix() {
        let m = BatchMetrics::new().unwrap();
        m.reconnects_total.inc_by(2);
        let text = m.encode().unwrap();
        assert!(text.contains("dropship_node_reconnects_total 2"));
        assert!(text.contains("dropship_transfers_succeeded_total 0"));
    }

    #[test]
    fn metrics_file_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dropship.prom");
        BatchMetrics::new().unwrap().write_to(&path).unwrap();
        assert!(std::fs::read_to_string(&path)
            .unwrap()
            .contains("dropship_batch_recipients"));
    }
}
