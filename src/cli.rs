//! Interface de linha de comando do visitflow baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (submit, watch, steps)
//! e flags globais (--config, --base-url, --deadline-secs, --json, --verbose).

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// visitflow: acompanha transcrições de consultas e os passos de workflow da visita.
#[derive(Debug, Parser)]
#[command(name = "visitflow", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Caminho alternativo para o arquivo de configuração.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// URL base do backend (sobrescreve arquivo e ambiente).
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Prazo total da sessão de polling, em segundos.
    #[arg(long, global = true)]
    pub deadline_secs: Option<u64>,

    /// Imprime resultados como JSON.
    #[arg(long, global = true, default_value_t = false)]
    pub json: bool,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Envia uma gravação para transcrição e aguarda o resultado.
    Submit {
        /// Identificador do paciente.
        #[arg(long)]
        subject: String,

        /// Identificador da visita.
        #[arg(long)]
        visit: String,

        /// Arquivo de áudio da consulta.
        file: PathBuf,

        /// Retorna logo após o envio, sem acompanhar o job.
        #[arg(long, default_value_t = false)]
        no_wait: bool,
    },

    /// Acompanha um job já enviado até um estado terminal.
    Watch {
        #[arg(long)]
        subject: String,

        #[arg(long)]
        visit: String,
    },

    /// Lista os passos de workflow permitidos para uma visita.
    Steps {
        /// Identificador da visita.
        visit: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_parses_submit_subcommand() {
        let cli = Cli::parse_from([
            "visitflow",
            "submit",
            "--subject",
            "p-1",
            "--visit",
            "v-2",
            "consult.wav",
        ]);
        match cli.command {
            Command::Submit {
                subject,
                visit,
                file,
                no_wait,
            } => {
                assert_eq!(subject, "p-1");
                assert_eq!(visit, "v-2");
                assert_eq!(file, PathBuf::from("consult.wav"));
                assert!(!no_wait);
            }
            _ => panic!("expected Submit command"),
        }
    }

    #[test]
    fn cli_parses_global_flags() {
        let cli = Cli::parse_from([
            "visitflow",
            "--base-url",
            "http://clinic.test",
            "--deadline-secs",
            "90",
            "--json",
            "--verbose",
            "steps",
            "v-9",
        ]);
        assert!(cli.verbose);
        assert!(cli.json);
        assert_eq!(cli.base_url.as_deref(), Some("http://clinic.test"));
        assert_eq!(cli.deadline_secs, Some(90));
        assert!(matches!(cli.command, Command::Steps { ref visit } if visit == "v-9"));
    }

    #[test]
    fn cli_requires_identity_for_watch() {
        assert!(Cli::try_parse_from(["visitflow", "watch", "--subject", "p-1"]).is_err());
    }

    #[test]
    fn cli_verify() {
        Cli::command().debug_assert();
    }
}
