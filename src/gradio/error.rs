//! Tipos de erro para o cliente Gradio.
//!
//! Define [`GradioError`] com variantes para falhas HTTP, exceções levantadas
//! pela própria aplicação remota e respostas fora do protocolo esperado.
//! Usa `thiserror` para derivar `Display` e `Error`.

use thiserror::Error;

/// Prefixo usado pelo Gradio quando a aplicação remota levanta uma exceção.
///
/// O classificador de falhas em [`crate::retry`] procura este texto na
/// mensagem de erro para decidir se deve reconectar.
pub const UPSTREAM_EXCEPTION: &str = "The upstream Gradio app has raised an exception";

/// Erros que podem ocorrer ao interagir com um Space Gradio.
#[derive(Debug, Error)]
pub enum GradioError {
    /// A aplicação remota emitiu `event: error` no stream de resultado.
    /// `detail` é o conteúdo do campo `data` quando o Space expõe erros
    /// (`show_error=True`), ou `None` caso contrário.
    #[error(
        "{}: {}",
        UPSTREAM_EXCEPTION,
        .detail.as_deref().unwrap_or("no details (show_error is disabled on the app)")
    )]
    Upstream { detail: Option<String> },

    /// Resposta HTTP fora da faixa 2xx.
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// Resposta recebida mas que não segue o protocolo esperado.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Falha ao ler um arquivo local para upload ou gravar um download.
    #[error("file error: {0}")]
    Io(#[from] std::io::Error),

    /// Falha de rede subjacente (DNS, conexão recusada, timeout).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}
