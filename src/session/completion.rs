// SPDX-License-Identifier: GPL-3.0-only

//! Completion future handed out for each recording

use super::types::CaptureResult;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;

const LOST_COMPLETION: &str = "recording completion was lost";

/// Resolves once with the outcome of a recording
///
/// Returned by [`CaptureSessionManager::start_recording`](super::CaptureSessionManager::start_recording).
/// The session delivers exactly one [`CaptureResult`] per recording, whether
/// the clip was stopped, failed in the backend or was torn down.
#[must_use = "the recording outcome is only observable through its completion"]
#[derive(Debug)]
pub struct RecordingCompletion {
    receiver: oneshot::Receiver<CaptureResult>,
    delivered: bool,
}

impl RecordingCompletion {
    pub(crate) fn new(receiver: oneshot::Receiver<CaptureResult>) -> Self {
        Self {
            receiver,
            delivered: false,
        }
    }

    /// Take the outcome if it already arrived
    ///
    /// Returns `None` while the recording is running and after the outcome
    /// was taken once.
    pub fn try_result(&mut self) -> Option<CaptureResult> {
        if self.delivered {
            return None;
        }
        let result = match self.receiver.try_recv() {
            Ok(result) => result,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Closed) => CaptureResult::failed(LOST_COMPLETION),
        };
        self.delivered = true;
        Some(result)
    }
}

impl Future for RecordingCompletion {
    type Output = CaptureResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let result = match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Pending => return Poll::Pending,
            Poll::Ready(Ok(result)) => result,
            Poll::Ready(Err(_)) => CaptureResult::failed(LOST_COMPLETION),
        };
        self.delivered = true;
        Poll::Ready(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_resolves_with_sent_result() {
        let (tx, rx) = oneshot::channel();
        let completion = RecordingCompletion::new(rx);
        tx.send(CaptureResult::VideoSaved {
            path: PathBuf::from("/tmp/clip.mjpeg"),
        })
        .unwrap();

        assert_eq!(
            completion.await,
            CaptureResult::VideoSaved {
                path: PathBuf::from("/tmp/clip.mjpeg")
            }
        );
    }

    #[tokio::test]
    async fn test_dropped_sender_fails() {
        let (tx, rx) = oneshot::channel::<CaptureResult>();
        drop(tx);
        assert_eq!(
            RecordingCompletion::new(rx).await,
            CaptureResult::failed(LOST_COMPLETION)
        );
    }

    #[test]
    fn test_try_result_delivers_once() {
        let (tx, rx) = oneshot::channel();
        let mut completion = RecordingCompletion::new(rx);
        assert_eq!(completion.try_result(), None);

        tx.send(CaptureResult::failed("sensor unplugged")).unwrap();
        assert_eq!(
            completion.try_result(),
            Some(CaptureResult::failed("sensor unplugged"))
        );
        assert_eq!(completion.try_result(), None);
    }
}
