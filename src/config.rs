//! Configuração carregada a partir de `trellis.toml`.
//!
//! A struct [`TrellisConfig`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam os defaults do Space TRELLIS.
//! A variável de ambiente `HF_TOKEN` tem precedência sobre o arquivo.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::batch::PacingConfig;
use crate::pipeline::{ExtractionSettings, GenerationSettings};
use crate::processor::ProcessorSettings;
use crate::retry::RetryPolicy;

/// Nome do arquivo procurado no diretório atual.
pub const CONFIG_FILE: &str = "trellis.toml";

/// Configuração de nível superior carregada de `trellis.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct TrellisConfig {
    /// Token de acesso ao Hugging Face.
    #[serde(default)]
    pub hf_token: String,

    /// Space (`dono/nome`) ou URL direta da aplicação Gradio.
    #[serde(default = "default_space")]
    pub space: String,

    /// Diretório onde salvar os modelos `.glb`; ausente = não baixar.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,

    /// Limite por requisição HTTP, em segundos; ausente = sem limite.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,

    /// Arquivo de log (rotacionado diariamente).
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,

    /// Nível de log padrão quando `RUST_LOG` não está definido.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default)]
    pub pacing: PacingConfig,

    #[serde(default)]
    pub generation: GenerationSettings,

    #[serde(default)]
    pub extraction: ExtractionSettings,
}

// Space padrão.
fn default_space() -> String {
    "lukketsvane/TRELLIS".to_string()
}

fn default_log_file() -> PathBuf {
    PathBuf::from("trellis_debug.log")
}

fn default_log_level() -> String {
    "debug".to_string()
}

impl Default for TrellisConfig {
    fn default() -> Self {
        Self {
            hf_token: String::new(),
            space: default_space(),
            output_dir: None,
            request_timeout_secs: None,
            log_file: default_log_file(),
            log_level: default_log_level(),
            retry: RetryPolicy::default(),
            pacing: PacingConfig::default(),
            generation: GenerationSettings::default(),
            extraction: ExtractionSettings::default(),
        }
    }
}

impl TrellisConfig {
    /// Carrega a configuração de `path`, ou de `trellis.toml` no diretório
    /// atual. Um caminho explícito inexistente é erro; o arquivo padrão
    /// ausente resulta nos valores padrão.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(CONFIG_FILE).exists() => Self::from_file(Path::new(CONFIG_FILE))?,
            None => Self::default(),
        };

        // Variável de ambiente tem precedência sobre o arquivo para o token.
        if let Ok(token) = std::env::var("HF_TOKEN")
            && !token.is_empty()
        {
            config.hf_token = token;
        }

        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str::<TrellisConfig>(&contents)
            .with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Token para o cabeçalho `Authorization`, se configurado.
    pub fn token(&self) -> Option<String> {
        let token = self.hf_token.trim();
        (!token.is_empty()).then(|| token.to_string())
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    pub fn processor_settings(&self) -> ProcessorSettings {
        ProcessorSettings {
            retry: self.retry.clone(),
            generation: self.generation.clone(),
            extraction: self.extraction.clone(),
            step_pause_secs: self.pacing.step_pause_secs,
            output_dir: self.output_dir.clone(),
        }
    }
}
