use crate::session::{render, SessionOptions};
use crate::{Engine, Error, RenderRequest, RenderResult, Result};
use log::{debug, info};
use std::sync::mpsc::{self, Sender};
use std::thread;
use tokio::sync::oneshot;

enum Command {
    Render(Box<RenderRequest>, oneshot::Sender<Result<RenderResult>>),
    Close(oneshot::Sender<()>),
}

/// A render queue backed by a dedicated worker thread.
///
/// The worker thread owns the engine and runs one session at a time, in the
/// order jobs were submitted. Handles are cheap to clone and can be used from
/// plain threads (`render_blocking`) or async tasks (`render`).
#[derive(Clone)]
pub struct RenderWorker {
    cmd_tx: Sender<Command>,
}

impl RenderWorker {
    /// Spawn the worker thread and build the engine on it with `factory`.
    ///
    /// The engine never leaves the worker thread, so it does not need to be
    /// `Send`. Returns the factory's error if the engine cannot be created.
    pub fn spawn<E, F>(factory: F, options: SessionOptions) -> Result<Self>
    where
        E: Engine + 'static,
        F: FnOnce() -> Result<E> + Send + 'static,
    {
        let (cmd_tx, cmd_rx) = mpsc::channel::<Command>();
        let (init_tx, init_rx) = mpsc::channel::<Result<()>>();

        thread::Builder::new()
            .name("render-worker".into())
            .spawn(move || {
                let engine = match factory() {
                    Ok(e) => e,
                    Err(err) => {
                        let _ = init_tx.send(Err(err));
                        return;
                    }
                };
                let _ = init_tx.send(Ok(()));

                let mut served: u64 = 0;
                while let Ok(cmd) = cmd_rx.recv() {
                    match cmd {
                        Command::Render(request, resp) => {
                            served += 1;
                            debug!("Worker starting render {} for {}", served, request.url);
                            let res = render(&engine, &request, &options);
                            let _ = resp.send(res);
                        }
                        Command::Close(resp) => {
                            let _ = resp.send(());
                            break;
                        }
                    }
                }
                info!("Render worker stopped after {} renders", served);
            })
            .map_err(|e| Error::InitializationError(format!("Failed to spawn render worker: {}", e)))?;

        init_rx
            .recv()
            .map_err(|e| Error::InitializationError(format!("Worker init canceled: {}", e)))??;

        Ok(Self { cmd_tx })
    }

    fn submit(&self, request: RenderRequest) -> Result<oneshot::Receiver<Result<RenderResult>>> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Render(Box::new(request), tx))
            .map_err(|_| Error::Other("Render worker has stopped".into()))?;
        Ok(rx)
    }

    /// Render from a synchronous context, waiting for the worker's reply.
    ///
    /// Must not be called from inside an async runtime.
    pub fn render_blocking(&self, request: RenderRequest) -> Result<RenderResult> {
        self.submit(request)?
            .blocking_recv()
            .map_err(|e| Error::Other(format!("Render canceled: {}", e)))?
    }

    /// Render from an async task
    pub async fn render(&self, request: RenderRequest) -> Result<RenderResult> {
        self.submit(request)?
            .await
            .map_err(|e| Error::Other(format!("Render canceled: {}", e)))?
    }

    /// Stop the worker once the jobs queued before this call have run
    pub async fn close(self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Close(tx))
            .map_err(|_| Error::Other("Render worker has stopped".into()))?;
        rx.await
            .map_err(|e| Error::Other(format!("Close canceled: {}", e)))
    }
}
