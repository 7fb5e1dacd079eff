//! Interface de terminal do visitflow: spinners e saída colorida.
//!
//! Usa as crates `indicatif` para spinners de progresso e `console` para
//! estilização com cores. O [`PollProgress`] acompanha visualmente uma
//! sessão de polling no terminal.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use visitflow::error::WorkflowError;
use visitflow::job::{DelaySource, JobId, JobState, PollAttempt};
use visitflow::poller::PollOutcome;
use visitflow::transcript::TranscriptArtifact;
use visitflow::workflow::WorkflowState;

/// Indicador visual de progresso para uma sessão de polling no terminal.
///
/// Exibe um spinner animado com a fase estimada e mensagens coloridas para
/// sucesso (verde), falha (vermelho) e timeout (amarelo).
pub struct PollProgress {
    // Barra de progresso/spinner do indicatif.
    pb: ProgressBar,
    green: Style,
    red: Style,
    yellow: Style,
}

impl PollProgress {
    /// Inicia o spinner para o job informado.
    pub fn start(job: &JobId) -> Self {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg} [{elapsed}]")
                .expect("invalid template"),
        );
        pb.set_message(format!("Waiting for transcription of {job}"));
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
        }
    }

    /// Atualiza a mensagem com a fase estimada e a próxima verificação.
    pub fn attempt(&self, attempt: &PollAttempt, job_state: JobState, phase: &str) {
        let source = match attempt.delay_source {
            DelaySource::ServerHint => " (server hint)",
            DelaySource::Computed => "",
        };
        self.pb.set_message(format!(
            "Transcript {phase}… [{job_state}] next check in {:.1}s{source}",
            attempt.delay_ms as f64 / 1000.0
        ));
    }

    /// Finaliza o spinner e exibe o resultado da sessão.
    pub fn finish(&self, outcome: &PollOutcome) {
        self.pb.finish_and_clear();
        match outcome {
            PollOutcome::Succeeded(artifact) => {
                let note = if artifact.enriched {
                    " (dialogue structured)"
                } else {
                    ""
                };
                println!(
                    "  {} Transcription complete{note}",
                    self.green.apply_to("✓")
                );
            }
            PollOutcome::Failed(err) => {
                println!("  {} {}", self.red.apply_to("✗"), err.user_message());
            }
            PollOutcome::TimedOut { .. } => {
                let err = outcome.clone().into_result().err();
                if let Some(err) = err {
                    println!("  {} {}", self.yellow.apply_to("⏱"), err.user_message());
                }
            }
        }
    }

    /// Encerra o spinner quando o usuário interrompe a espera.
    pub fn cancelled(&self) {
        self.pb.finish_and_clear();
        println!(
            "  {} Stopped waiting. The job keeps running on the server; use `visitflow watch` to resume.",
            self.yellow.apply_to("↻")
        );
    }
}

/// Imprime o texto final da transcrição.
pub fn print_artifact(artifact: &TranscriptArtifact, json: bool) {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(artifact).unwrap_or_default()
        );
        return;
    }
    println!();
    println!("{}", Style::new().bold().apply_to("─── Transcript ───"));
    match &artifact.structured_dialogue {
        Some(turns) => {
            let role = Style::new().cyan().bold();
            for turn in turns {
                println!("{} {}", role.apply_to(format!("{}:", turn.speaker_role)), turn.utterance);
            }
        }
        None => println!("{}", artifact.text),
    }
}

/// Imprime os passos disponíveis de uma visita.
pub fn print_steps(state: &WorkflowState, json: bool) {
    if json {
        println!("{}", serde_json::to_string_pretty(state).unwrap_or_default());
        return;
    }
    let dim = Style::new().dim();
    let inferred = if state.workflow_type_inferred {
        " (inferred)"
    } else {
        ""
    };
    println!();
    println!(
        "{}",
        Style::new()
            .bold()
            .apply_to(format!("─── Visit {} ───", state.visit_id))
    );
    println!("  workflow: {}{}", state.workflow_type, dim.apply_to(inferred));
    if let Some(status) = &state.current_status {
        println!("  status:   {status}");
    }
    if state.available_steps.is_empty() {
        println!("  {}", dim.apply_to("no steps available right now"));
    }
    for step in &state.available_steps {
        println!(
            "  {} {} {}",
            Style::new().green().apply_to("•"),
            step.label(),
            dim.apply_to(format!("({step})"))
        );
    }
}

pub fn print_workflow_error(err: &WorkflowError) {
    eprintln!("  {} {}", Style::new().red().bold().apply_to("✗"), err.user_message());
}
