//! Interface de linha de comando baseada em clap.
//!
//! Sem argumentos, processa o diretório atual (equivalente a `run .`).
//! As flags globais sobrescrevem os valores de `trellis.toml`.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Converte em lote as imagens de um diretório em modelos 3D via TRELLIS.
#[derive(Debug, Parser)]
#[command(name = "trellis-batch", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Arquivo de configuração (padrão: ./trellis.toml se existir).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Space do Hugging Face (`dono/nome`) ou URL da aplicação Gradio.
    #[arg(long, global = true)]
    pub space: Option<String>,

    /// Número máximo de tentativas por chamada remota.
    #[arg(long, global = true)]
    pub max_retries: Option<u32>,

    /// Salva o modelo `.glb` extraído de cada imagem neste diretório.
    #[arg(long, global = true)]
    pub output_dir: Option<PathBuf>,

    /// Grava o relatório final em JSON neste caminho.
    #[arg(long, global = true)]
    pub report: Option<PathBuf>,

    /// Arquivo de log.
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Nível de log (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Processa todas as imagens do diretório.
    Run {
        /// Diretório de entrada (padrão: diretório atual).
        dir: Option<PathBuf>,
    },

    /// Lista as imagens que seriam processadas, sem conectar ao Space.
    Scan {
        /// Diretório de entrada (padrão: diretório atual).
        dir: Option<PathBuf>,
    },
}

impl Cli {
    /// Subcomando efetivo; `run` no diretório atual quando omitido.
    pub fn effective_command(&self) -> Command {
        match &self.command {
            Some(Command::Run { dir }) => Command::Run { dir: dir.clone() },
            Some(Command::Scan { dir }) => Command::Scan { dir: dir.clone() },
            None => Command::Run { dir: None },
        }
    }
}

impl Command {
    /// Diretório de entrada, resolvido para o diretório atual quando omitido.
    pub fn input_dir(&self) -> std::io::Result<PathBuf> {
        let dir = match self {
            Command::Run { dir } | Command::Scan { dir } => dir.clone(),
        };
        match dir {
            Some(dir) => Ok(dir),
            None => std::env::current_dir(),
        }
    }
}
