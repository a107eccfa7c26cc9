//! Interface de terminal: contagem regressiva das esperas longas.
//!
//! Usa `indicatif` para o spinner e `console` para as cores. O spinner
//! é desenhado na saída de erro e fica oculto quando ela não é um terminal.

use std::time::Duration;

use console::{Style, Term};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::pacing::WaitReason;

/// Spinner mostrando o tempo restante de uma espera.
pub struct Countdown {
    // Spinner do indicatif (oculto fora de um terminal).
    pb: ProgressBar,
    reason: WaitReason,
    // Estilo amarelo para o motivo da espera.
    yellow: Style,
}

impl Countdown {
    /// Inicia o spinner para uma espera de `total`.
    pub fn start(reason: WaitReason, total: Duration) -> Self {
        let pb = if Term::stderr().is_term() {
            ProgressBar::with_draw_target(None, ProgressDrawTarget::stderr())
        } else {
            ProgressBar::hidden()
        };
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            pb.set_style(style);
        }
        pb.enable_steady_tick(Duration::from_millis(100));

        let countdown = Self {
            pb,
            reason,
            yellow: Style::new().yellow(),
        };
        countdown.update(total);
        countdown
    }

    /// Atualiza o tempo restante exibido.
    pub fn update(&self, remaining: Duration) {
        self.pb.set_message(format!(
            "{} {:.0}s remaining",
            self.yellow.apply_to(format!("Waiting ({})", self.reason)),
            remaining.as_secs_f64().ceil()
        ));
    }

    /// Remove o spinner do terminal.
    pub fn finish(&self) {
        self.pb.finish_and_clear();
    }
}
