use crate::aggregate::{aggregate, ProbeReport, SuiteReport};
use crate::classifier::{MarkerBank, OutcomeCategory, OutcomeClassifier};
use crate::protocol::{control_probe, generate_probes, Protocol, TemplateBanks};
use crate::target::{execute_probe, Target};
use crate::{ProbeKind, SuiteConfig, SuiteResult};
use colored::*;
use futures::{stream, StreamExt};
use std::io::{self, Write};
use std::sync::Arc;

/// Orchestrates one suite run: generate, execute, classify, aggregate.
pub struct Runner {
    concurrency: usize,
}

impl Runner {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }

    /// Runs the full suite against `target` and returns the final report.
    ///
    /// Only malformed generation inputs error out (before any backend call);
    /// per-probe execution failures are classified as outcomes and the run
    /// completes. Probes execute independently up to the concurrency limit,
    /// and the report is restored to generation ordinal order afterwards.
    #[allow(clippy::too_many_arguments)]
    pub async fn run(
        &self,
        target: Arc<dyn Target>,
        hypothesis: &str,
        protocol: Protocol,
        count: usize,
        include_control: bool,
        banks: &TemplateBanks,
        markers: &MarkerBank,
        config: &SuiteConfig,
    ) -> SuiteResult<SuiteReport> {
        let mut probes = generate_probes(hypothesis, protocol, count, banks)?;
        if include_control {
            probes.push(control_probe(hypothesis, protocol, banks));
        }
        println!(
            "Generated {} probes under protocol: {}. Executing with concurrency: {}",
            probes.len(),
            protocol.to_string().cyan(),
            self.concurrency
        );

        let timeout_ms = config.timeout_ms;
        let mut executed = stream::iter(probes)
            .map(|probe| {
                let target = Arc::clone(&target);
                async move {
                    let execution = execute_probe(target.as_ref(), &probe.text, timeout_ms).await;
                    (probe, execution)
                }
            })
            .buffer_unordered(self.concurrency)
            .collect::<Vec<_>>()
            .await;

        // Collection order follows completion; restore generation order
        // (experimental by ordinal, control last) before classifying.
        executed.sort_by_key(|(probe, _)| (probe.kind == ProbeKind::Control, probe.ordinal));

        let classifier = OutcomeClassifier::new(markers.clone(), timeout_ms);
        let reports: Vec<ProbeReport> = executed
            .into_iter()
            .map(|(probe, execution)| {
                let outcome = classifier.classify(&probe, &execution);
                match outcome.category {
                    OutcomeCategory::ConstraintViolation => {
                        println!("\n[{}] {}", "VIOLATION".red().bold(), probe.id)
                    }
                    OutcomeCategory::InfrastructureFailure => println!(
                        "\n[{}] {}: {}",
                        "INFRA".yellow(),
                        probe.id,
                        execution.backend_error.as_deref().unwrap_or("timed out")
                    ),
                    OutcomeCategory::SafetyHalt => {
                        println!("\n[{}] {}", "HALT".green(), probe.id)
                    }
                    _ => {
                        print!(".");
                        io::stdout().flush().ok();
                    }
                }
                ProbeReport {
                    probe,
                    execution,
                    outcome,
                }
            })
            .collect();

        println!("\n{}", "Suite complete.".bold().white());

        let (control, experimental): (Vec<_>, Vec<_>) = reports
            .into_iter()
            .partition(|r| r.probe.kind == ProbeKind::Control);

        Ok(aggregate(hypothesis, protocol, experimental, control, config))
    }
}
