//! Tipos de erro para o cliente HTTP do backend de notas clínicas.
//!
//! Define [`ApiError`] com variantes para falhas de transporte, respostas
//! não-2xx e corpos malformados. Usa `thiserror` para derivar `Display` e
//! `Error` a partir dos atributos `#[error(...)]`.

use thiserror::Error;

/// Erros que podem ocorrer em uma única chamada ao backend.
///
/// As variantes cobrem os três cenários de falha de uma requisição:
/// - [`Transport`](ApiError::Transport): nenhuma resposta recebida
/// - [`Server`](ApiError::Server): o servidor respondeu com status não-2xx
/// - [`Parse`](ApiError::Parse): status de sucesso, mas corpo ilegível
#[derive(Debug, Error)]
pub enum ApiError {
    /// Falha de rede subjacente (DNS, conexão recusada, timeout da requisição).
    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Resposta não-2xx. `message` preserva literalmente o texto enviado
    /// pelo servidor (campo `message` ou o corpo bruto).
    #[error("server returned status {status}: {message}")]
    Server { status: u16, message: String },

    /// Corpo malformado em uma resposta de sucesso.
    #[error("failed to parse response: {0}")]
    Parse(String),

    /// URL base inválida na configuração.
    #[error("invalid base URL {0:?}")]
    InvalidUrl(String),
}

impl ApiError {
    /// Código HTTP associado ao erro, quando houver resposta.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Server { status, .. } => Some(*status),
            ApiError::Transport(e) => e.status().map(|s| s.as_u16()),
            ApiError::Parse(_) | ApiError::InvalidUrl(_) => None,
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_error_display() {
        let err = ApiError::Server {
            status: 500,
            message: "upstream exploded".into(),
        };
        assert_eq!(
            err.to_string(),
            "server returned status 500: upstream exploded"
        );
        assert_eq!(err.status(), Some(500));
    }

    #[test]
    fn parse_error_from_serde() {
        let serde_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err = ApiError::from(serde_err);
        assert!(matches!(err, ApiError::Parse(_)));
        assert!(err.to_string().starts_with("failed to parse response:"));
        assert_eq!(err.status(), None);
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ApiError>();
    }
}
