use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;

use crate::{config::AppConfig, session::Session};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    /// Una única sesión; el mutex serializa las acciones del usuario.
    pub session: Arc<tokio::sync::Mutex<Session>>,
    pub status: Arc<Mutex<Status>>,
    pub shutdown_sender: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

impl AppState {
    pub fn new(config: AppConfig, session: Session, shutdown_tx: Option<oneshot::Sender<()>>) -> Self {
        Self {
            config,
            session: Arc::new(tokio::sync::Mutex::new(session)),
            status: Arc::new(Mutex::new(Status {
                is_busy: false,
                message: "Servidor listo.".to_string(),
                progress: 0.0,
            })),
            shutdown_sender: Arc::new(Mutex::new(shutdown_tx)),
        }
    }

    /// Actualiza el estado visible desde el frontend.
    pub fn set_status(&self, is_busy: bool, message: impl Into<String>, progress: f32) {
        if let Ok(mut status) = self.status.lock() {
            status.is_busy = is_busy;
            status.message = message.into();
            status.progress = progress;
        }
    }
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct Status {
    pub is_busy: bool,
    pub message: String,
    pub progress: f32, // Valor entre 0.0 y 1.0
}
