use std::{collections::HashMap, net::SocketAddr, sync::Arc, time::Duration};

use {
    axum::{
        Router,
        extract::{Query, State},
        http::StatusCode,
        routing::get,
    },
    tokio::{
        sync::{Mutex, oneshot},
        task::JoinHandle,
    },
    tracing::{debug, info, warn},
    xurl_common::AuthError,
};

pub const CALLBACK_PATH: &str = "/callback";

type CallbackResult = Result<String, AuthError>;

#[derive(Clone)]
struct CallbackState {
    expected_state: Arc<str>,
    tx: Arc<Mutex<Option<oneshot::Sender<CallbackResult>>>>,
}

/// Single-use local receiver for the OAuth2 redirect.
///
/// The server runs on its own task from [`CallbackServer::bind`] until
/// [`CallbackServer::wait`] returns, whichever way it returns.
pub struct CallbackServer {
    addr: SocketAddr,
    rx: oneshot::Receiver<CallbackResult>,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl CallbackServer {
    /// Bind `127.0.0.1:port` and start serving `/callback`. The handler
    /// accepts only requests carrying `expected_state`.
    pub async fn bind(port: u16, expected_state: &str) -> Result<Self, AuthError> {
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
            .await
            .map_err(|e| AuthError::Listener(format!("failed to bind port {port}: {e}")))?;
        let addr = listener
            .local_addr()
            .map_err(|e| AuthError::Listener(e.to_string()))?;

        let (tx, rx) = oneshot::channel();
        let (shutdown, shutdown_rx) = oneshot::channel::<()>();
        let state = CallbackState {
            expected_state: Arc::from(expected_state),
            tx: Arc::new(Mutex::new(Some(tx))),
        };
        let app = Router::new()
            .route(CALLBACK_PATH, get(handle_callback))
            .with_state(state);

        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            if let Err(e) = serve.await {
                warn!(error = %e, "oauth callback server error");
            }
        });

        debug!(%addr, "oauth callback server listening");
        Ok(Self {
            addr,
            rx,
            shutdown,
            task,
        })
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Wait for the redirect and return the authorization code.
    ///
    /// The server is shut down and joined before this returns.
    pub async fn wait(self, timeout: Duration) -> Result<String, AuthError> {
        let Self {
            rx, shutdown, task, ..
        } = self;

        let outcome = tokio::time::timeout(timeout, rx).await;

        let _ = shutdown.send(());
        let _ = task.await;
        debug!("oauth callback server stopped");

        match outcome {
            Err(_) => Err(AuthError::Timeout),
            Ok(Err(_)) => Err(AuthError::Listener("callback channel closed".into())),
            Ok(Ok(result)) => result,
        }
    }
}

async fn handle_callback(
    State(state): State<CallbackState>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, String) {
    let code = params.get("code").cloned().unwrap_or_default();
    let received_state = params.get("state").map(String::as_str).unwrap_or_default();

    let result = if received_state != &*state.expected_state {
        Err(AuthError::InvalidState)
    } else if code.is_empty() {
        Err(AuthError::InvalidCode)
    } else {
        Ok(code)
    };

    let response = match &result {
        Ok(_) => (
            StatusCode::OK,
            "Authentication successful! You can close this window.".to_string(),
        ),
        Err(e) => (StatusCode::BAD_REQUEST, format!("Error: {e}")),
    };

    if let Some(tx) = state.tx.lock().await.take() {
        info!(ok = result.is_ok(), "oauth callback received");
        let _ = tx.send(result);
    }
    response
}
