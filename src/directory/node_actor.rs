//! Per-Node connection actor: a single task owns the control `TcpStream`
//! full-duplex and serialises request/response pairs over it, replacing a
//! "mutex around an fd" pattern that would deadlock the moment a
//! fire-and-forget frame left a waiting reader stuck behind it.

use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::wire::{read_frame, write_frame, Frame};

enum Work {
    /// A request that expects exactly one reply frame.
    Call { frame: Frame, reply: oneshot::Sender<Result<Frame>> },
    /// A request with no reply at all (`INTERNAL_SET_OWNER`, the
    /// move-variant `INTERNAL_SET_FOLDER`) — written and forgotten.
    Fire { frame: Frame },
}

/// Handle used by the Directory to talk to one Node's control connection.
#[derive(Clone)]
pub struct NodeActorHandle {
    sender: mpsc::Sender<Work>,
}

impl NodeActorHandle {
    /// Sends `frame` and awaits the Node's single reply, in strict
    /// request/response lock-step (spec §4.2).
    pub async fn dispatch(&self, frame: Frame) -> Result<Frame> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(Work::Call { frame, reply: tx })
            .await
            .map_err(|_| Error::internal("node control actor is gone"))?;
        rx.await.map_err(|_| Error::internal("node control actor dropped the reply"))?
    }

    /// Sends `frame` without waiting for, or expecting, a reply
    /// (`INTERNAL_SET_OWNER` and the move-variant `INTERNAL_SET_FOLDER`,
    /// per spec §4.2).
    pub async fn notify(&self, frame: Frame) -> Result<()> {
        self.sender.send(Work::Fire { frame }).await.map_err(|_| Error::internal("node control actor is gone"))
    }
}

/// Runs the actor loop for one Node's control connection until the socket
/// fails or the handle is dropped.
pub fn spawn(mut stream: TcpStream) -> (NodeActorHandle, JoinHandle<()>) {
    let (sender, mut receiver) = mpsc::channel::<Work>(32);
    let handle = tokio::spawn(async move {
        while let Some(work) = receiver.recv().await {
            match work {
                Work::Call { frame, reply } => {
                    let result = async {
                        write_frame(&mut stream, &frame).await.map_err(|e| Error::internal(e.to_string()))?;
                        read_frame(&mut stream).await.map_err(|e| Error::internal(e.to_string()))
                    }
                    .await;
                    let is_err = result.is_err();
                    let _ = reply.send(result);
                    if is_err {
                        break;
                    }
                }
                Work::Fire { frame } => {
                    if write_frame(&mut stream, &frame).await.is_err() {
                        break;
                    }
                }
            }
        }
    });
    (NodeActorHandle { sender }, handle)
}
