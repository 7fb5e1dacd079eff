//! Configuração do visitflow carregada a partir de `visitflow.toml`.
//!
//! A struct [`AppConfig`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! A variável de ambiente `VISITFLOW_BASE_URL` tem precedência sobre o arquivo.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::AppError;
use crate::job::BackoffPolicy;

/// Nome do arquivo de configuração procurado no diretório atual.
pub const CONFIG_FILE: &str = "visitflow.toml";

/// Variável de ambiente que sobrescreve `base_url`.
pub const BASE_URL_ENV: &str = "VISITFLOW_BASE_URL";

/// Configuração de nível superior carregada de `visitflow.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// URL base do backend de notas e workflow.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Timeout de conexão por requisição, em segundos.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Timeout total por requisição, em segundos. Não confundir com o prazo
    /// da sessão de polling.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Parâmetros de polling (tabela `[poll]`).
    #[serde(default)]
    pub poll: PollConfig,
}

/// Backoff e prazo das sessões de polling.
#[derive(Debug, Clone, Deserialize)]
pub struct PollConfig {
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_growth_factor")]
    pub growth_factor: f64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Prazo total da sessão, fixado no início e nunca estendido.
    #[serde(default = "default_deadline_ms")]
    pub deadline_ms: u64,
}

// Valor padrão da URL base: backend local de desenvolvimento.
fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    120
}

// Valor padrão para o atraso base: 1500ms.
fn default_base_delay_ms() -> u64 {
    1500
}

fn default_growth_factor() -> f64 {
    1.6
}

fn default_max_delay_ms() -> u64 {
    15_000
}

// 25 minutos: latência de geração no pior caso mais uma folga.
fn default_deadline_ms() -> u64 {
    1_500_000
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            growth_factor: default_growth_factor(),
            max_delay_ms: default_max_delay_ms(),
            deadline_ms: default_deadline_ms(),
        }
    }
}

impl PollConfig {
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy {
            base_delay_ms: self.base_delay_ms,
            growth_factor: self.growth_factor,
            max_delay_ms: self.max_delay_ms,
        }
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            poll: PollConfig::default(),
        }
    }
}

impl AppConfig {
    /// Carrega a configuração de `visitflow.toml` no diretório atual.
    /// Usa valores padrão se o arquivo não existir.
    pub fn load() -> Result<Self, AppError> {
        Self::load_from(Path::new(CONFIG_FILE))
    }

    /// Carrega a configuração de um caminho explícito. Um arquivo ausente
    /// resulta nos valores padrão.
    pub fn load_from(path: &Path) -> Result<Self, AppError> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str::<AppConfig>(&contents)?
        } else {
            Self::default()
        };

        // Variável de ambiente tem precedência sobre o arquivo de configuração.
        config.apply_base_url_override(std::env::var(BASE_URL_ENV).ok());
        config.validate()?;
        Ok(config)
    }

    /// Aplica uma URL base vinda do ambiente ou da CLI, ignorando valores vazios.
    pub fn apply_base_url_override(&mut self, value: Option<String>) {
        if let Some(url) = value
            && !url.trim().is_empty()
        {
            self.base_url = url.trim().to_string();
        }
    }

    /// Rejeita combinações que tornariam o polling sem sentido.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.base_url.trim().is_empty() {
            return Err(AppError::Config("base_url must not be empty".into()));
        }
        let poll = &self.poll;
        if !poll.growth_factor.is_finite() || poll.growth_factor < 1.0 {
            return Err(AppError::Config(format!(
                "poll.growth_factor must be >= 1.0, got {}",
                poll.growth_factor
            )));
        }
        if poll.max_delay_ms < poll.base_delay_ms {
            return Err(AppError::Config(
                "poll.max_delay_ms must not be smaller than poll.base_delay_ms".into(),
            ));
        }
        if poll.deadline_ms == 0 {
            return Err(AppError::Config("poll.deadline_ms must be positive".into()));
        }
        Ok(())
    }
}
