//! シグナル処理とプラットフォーム情報

use tokio::signal;
use tokio::sync::oneshot;
use tracing::{info, warn};

use geoproc_common::Result;

/// シャットダウンシグナル受信器
pub struct ShutdownReceiver {
    rx: oneshot::Receiver<()>,
}

impl ShutdownReceiver {
    /// シグナルを待機
    pub async fn wait(self) {
        let _ = self.rx.await;
    }
}

/// Ctrl+C / SIGTERM ハンドラーのセットアップ
pub fn setup_shutdown_handler() -> Result<ShutdownReceiver> {
    let (tx, rx) = oneshot::channel();

    #[cfg(unix)]
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    tokio::spawn(async move {
        #[cfg(unix)]
        let terminate = async {
            sigterm.recv().await;
            info!("Received SIGTERM signal");
        };
        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            result = signal::ctrl_c() => match result {
                Ok(()) => info!("Received Ctrl+C signal"),
                Err(err) => {
                    warn!("Unable to listen for shutdown signal: {}", err);
                    return;
                }
            },
            _ = terminate => {}
        }

        let _ = tx.send(());
    });

    Ok(ShutdownReceiver { rx })
}

/// 利用可能なCPU数
pub fn cpu_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
