//! Tipos de dados para a API HTTP de um Space Gradio.
//!
//! Cobre os parâmetros nomeados de uma chamada ([`Params`]), as respostas
//! JSON dos endpoints `/call`, `/config` e do Hub, e o parsing do stream
//! de eventos (SSE) que carrega o resultado de cada chamada.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::GradioError;

/// Valor de um parâmetro: JSON literal ou um arquivo local que precisa
/// ser enviado ao Space antes da chamada.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Json(Value),
    File(PathBuf),
}

/// Parâmetros nomeados de uma chamada, na ordem declarada pelo endpoint.
///
/// O Gradio recebe os dados posicionalmente, então a ordem de inserção
/// é a ordem enviada.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    entries: Vec<(String, ParamValue)>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adiciona um parâmetro JSON.
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.entries.push((name.to_string(), ParamValue::Json(value.into())));
        self
    }

    /// Adiciona um parâmetro de arquivo local.
    pub fn with_file(mut self, name: &str, path: impl Into<PathBuf>) -> Self {
        self.entries.push((name.to_string(), ParamValue::File(path.into())));
        self
    }

    #[allow(dead_code)]
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    #[allow(dead_code)]
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Referência a um arquivo já presente no servidor Gradio.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileData {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orig_name: Option<String>,
    #[serde(default = "FileMeta::gradio")]
    pub meta: FileMeta,
}

/// Marcador de tipo exigido pelo Gradio ≥ 4 para objetos de arquivo.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileMeta {
    #[serde(rename = "_type")]
    pub kind: String,
}

impl FileMeta {
    pub fn gradio() -> Self {
        Self {
            kind: "gradio.FileData".to_string(),
        }
    }
}

impl FileData {
    /// Referência a um arquivo enviado via `/upload`.
    pub fn uploaded(server_path: String, local: &Path) -> Self {
        Self {
            path: server_path,
            url: None,
            orig_name: local
                .file_name()
                .map(|n| n.to_string_lossy().into_owned()),
            meta: FileMeta::gradio(),
        }
    }
}

/// Corpo do `POST /call/{endpoint}`.
#[derive(Debug, Serialize)]
pub struct CallRequest {
    pub data: Vec<Value>,
}

/// Resposta do `POST /call/{endpoint}`.
#[derive(Debug, Deserialize)]
pub struct CallResponse {
    pub event_id: String,
}

/// Resposta do Hub em `/api/spaces/{id}/host`.
#[derive(Debug, Deserialize)]
pub struct SpaceHost {
    pub host: String,
}

/// Subconjunto relevante do `/config` da aplicação.
#[derive(Debug, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub api_prefix: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

/// Extrai o resultado de um stream SSE do endpoint `/call/{endpoint}/{id}`.
///
/// Eventos `heartbeat` e `generating` são ignorados; o primeiro `complete`
/// ou `error` encerra o parsing.
pub fn parse_event_stream(body: &str) -> Result<Value, GradioError> {
    let mut event: Option<&str> = None;
    let mut data = String::new();

    // A blank line terminates each event; make sure the last one is flushed.
    for line in body.lines().chain(std::iter::once("")) {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            if let Some(name) = event.take() {
                if let Some(result) = finish_event(name, &data)? {
                    return Ok(result);
                }
            }
            data.clear();
            continue;
        }

        if let Some(rest) = line.strip_prefix("event:") {
            event = Some(rest.trim());
        } else if let Some(rest) = line.strip_prefix("data:") {
            if !data.is_empty() {
                data.push('\n');
            }
            data.push_str(rest.trim_start());
        }
    }

    Err(GradioError::Protocol(
        "event stream ended without a complete or error event".to_string(),
    ))
}

fn finish_event(name: &str, data: &str) -> Result<Option<Value>, GradioError> {
    match name {
        "complete" => serde_json::from_str(data)
            .map(Some)
            .map_err(|e| GradioError::Protocol(format!("invalid result payload: {e}"))),
        "error" => {
            let trimmed = data.trim();
            let detail = match serde_json::from_str::<Value>(trimmed) {
                _ if trimmed.is_empty() => None,
                Ok(Value::Null) => None,
                Ok(Value::String(s)) => Some(s),
                Ok(other) => Some(other.to_string()),
                Err(_) => Some(trimmed.to_string()),
            };
            Err(GradioError::Upstream { detail })
        }
        _ => Ok(None),
    }
}

/// Procura a primeira referência de arquivo em um resultado de chamada.
///
/// Retorna a URL quando presente; caso contrário o `path` no servidor.
pub fn find_file_ref(result: &Value) -> Option<FileRef> {
    match result {
        Value::Object(map) => {
            if let Some(Value::String(url)) = map.get("url") {
                return Some(FileRef::Url(url.clone()));
            }
            if let Some(Value::String(path)) = map.get("path") {
                return Some(FileRef::ServerPath(path.clone()));
            }
            map.values().find_map(find_file_ref)
        }
        Value::Array(items) => items.iter().find_map(find_file_ref),
        _ => None,
    }
}

/// Onde buscar um arquivo produzido pelo Space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileRef {
    Url(String),
    ServerPath(String),
}
