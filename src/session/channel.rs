//! Bounded channel helpers that keep polling the cancel token while blocked.

use std::sync::mpsc::{Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::time::Duration;

use crate::foundation::cancel::CancelToken;
use crate::foundation::error::{StitchError, StitchResult};

const POLL: Duration = Duration::from_millis(10);

/// Send `msg`, waiting for capacity.
///
/// Fails with [`StitchError::Cancelled`] once the token trips or the receiver is gone (a
/// receiver only disappears when its stage stopped early).
pub(crate) fn send_cancellable<T>(
    tx: &SyncSender<T>,
    mut msg: T,
    cancel: &CancelToken,
) -> StitchResult<()> {
    loop {
        cancel.check()?;
        match tx.try_send(msg) {
            Ok(()) => return Ok(()),
            Err(TrySendError::Full(back)) => {
                msg = back;
                std::thread::sleep(POLL / 4);
            }
            Err(TrySendError::Disconnected(_)) => return Err(StitchError::Cancelled),
        }
    }
}

/// Receive the next message; `Ok(None)` once every sender hung up.
pub(crate) fn recv_cancellable<T>(
    rx: &Receiver<T>,
    cancel: &CancelToken,
) -> StitchResult<Option<T>> {
    loop {
        cancel.check()?;
        match rx.recv_timeout(POLL) {
            Ok(msg) => return Ok(Some(msg)),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => return Ok(None),
        }
    }
}

/// Channel receiver viewed as a frame iterator, so the synchronizer can pull from reader threads.
pub(crate) struct ChannelFrames<T> {
    rx: Receiver<StitchResult<T>>,
    cancel: CancelToken,
}

impl<T> ChannelFrames<T> {
    pub(crate) fn new(rx: Receiver<StitchResult<T>>, cancel: CancelToken) -> Self {
        Self { rx, cancel }
    }
}

impl<T> Iterator for ChannelFrames<T> {
    type Item = StitchResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        match recv_cancellable(&self.rx, &self.cancel) {
            Ok(item) => item,
            Err(e) => Some(Err(e)),
        }
    }
}
