//! Job progress as a `Stream` of snapshots.
//!
//! A [`JobStream`] yields the job's current record straight away and then
//! one snapshot per observed change. Rapid updates may be coalesced (a watch
//! channel only keeps the latest value), but the terminal snapshot is never
//! skipped: the stream ends right after yielding it.

use crate::job::ConversionJob;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tokio_stream::Stream;

/// Snapshots of one job, ending after `completed` or `failed`.
pub struct JobStream {
    inner: WatchStream<ConversionJob>,
    finished: bool,
}

impl JobStream {
    pub(crate) fn new(rx: watch::Receiver<ConversionJob>) -> Self {
        Self {
            inner: WatchStream::new(rx),
            finished: false,
        }
    }
}

impl Stream for JobStream {
    type Item = ConversionJob;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }
        match Pin::new(&mut self.inner).poll_next(cx) {
            Poll::Ready(Some(job)) => {
                if job.is_terminal() {
                    self.finished = true;
                }
                Poll::Ready(Some(job))
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobHandle, JobId, JobStatus};
    use std::path::Path;
    use tokio_test::{assert_pending, assert_ready, task};

    #[test]
    fn yields_changes_then_ends_at_terminal_state() {
        let job = ConversionJob::new(JobId::from_raw(1), "uploads/1-a.pdf", "a.pdf");
        let (handle, rx) = JobHandle::new(job);
        let mut stream = task::spawn(JobStream::new(rx));

        let first = assert_ready!(stream.poll_next()).unwrap();
        assert_eq!(first.status, JobStatus::Processing);
        assert_pending!(stream.poll_next());

        handle.set_progress(50.0);
        assert!(stream.is_woken());
        let mid = assert_ready!(stream.poll_next()).unwrap();
        assert_eq!(mid.progress, 50.0);

        handle.complete(Path::new("out/1/audiobook.wav"));
        let last = assert_ready!(stream.poll_next()).unwrap();
        assert_eq!(last.status, JobStatus::Completed);
        assert!(assert_ready!(stream.poll_next()).is_none());
    }

    #[test]
    fn already_finished_job_yields_once() {
        let job = ConversionJob::new(JobId::from_raw(2), "b.epub", "b.epub");
        let (handle, rx) = JobHandle::new(job);
        handle.fail("Text extraction failed");
        let mut stream = task::spawn(JobStream::new(rx));

        let only = assert_ready!(stream.poll_next()).unwrap();
        assert_eq!(only.status, JobStatus::Failed);
        assert!(assert_ready!(stream.poll_next()).is_none());
    }
}
