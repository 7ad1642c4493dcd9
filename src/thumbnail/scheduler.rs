/// Request scheduler
///
/// Per row: unrequested → pending → (dispatched → completed) | dropped.
/// Pending requests form a stack: the newest scroll position is served
/// first, and rows that scrolled out of view by admission time are dropped
/// without generating anything. All methods run on the coordinator.
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use super::generator::PreviewGenerator;
use super::pool::{Completion, WorkerPool};
use super::{ThumbnailEvent, ThumbnailRequest, Visibility};

pub struct Scheduler {
    pending: Vec<ThumbnailRequest>,
    pool: WorkerPool,
    generator: Arc<PreviewGenerator>,
    visibility: Arc<dyn Visibility>,
    events: UnboundedSender<ThumbnailEvent>,
}

impl Scheduler {
    pub fn new(
        pool: WorkerPool,
        generator: Arc<PreviewGenerator>,
        visibility: Arc<dyn Visibility>,
        events: UnboundedSender<ThumbnailEvent>,
    ) -> Self {
        Self {
            pending: Vec::new(),
            pool,
            generator,
            visibility,
            events,
        }
    }

    #[cfg(test)]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn in_flight(&self) -> usize {
        self.pool.in_flight()
    }

    /// Queue a request and admit whatever fits
    pub fn request(&mut self, request: ThumbnailRequest) {
        self.pending.push(request);
        self.admit();
    }

    /// Move pending requests to the pool, newest first, while slots are free
    pub fn admit(&mut self) {
        while self.pool.has_capacity() {
            let Some(request) = self.pending.pop() else {
                break;
            };

            if !self.visibility.is_row_visible(request.row_id) {
                debug!("Dropping thumbnail request for hidden row {}", request.row_id.0);
                self.emit(ThumbnailEvent::Dropped {
                    row_id: request.row_id,
                });
                continue;
            }

            self.dispatch(request);
        }
    }

    /// A worker finished: free its slot, deliver the result, pull more work
    pub fn on_completed(&mut self, completion: Completion) {
        self.pool.release();
        self.emit(ThumbnailEvent::Ready {
            row_id: completion.row_id,
            image: completion.image,
        });
        self.admit();
    }

    /// Forget every pending request. In-flight jobs still complete and are
    /// delivered under their original row ids.
    pub fn cancel_all_pending(&mut self) {
        if !self.pending.is_empty() {
            debug!("Cancelling {} pending thumbnail requests", self.pending.len());
        }
        self.pending.clear();
    }

    /// The cache lookup runs inside the pooled job as well, so hits and
    /// misses are accounted the same way and the coordinator never reads disk.
    fn dispatch(&mut self, request: ThumbnailRequest) {
        let ThumbnailRequest {
            row_id,
            source_path,
            media_kind,
        } = request;
        let generator = self.generator.clone();

        let started = self.pool.submit(row_id, move || {
            generator.load_or_generate(&source_path, media_kind)
        });
        debug_assert!(started, "dispatch without a free slot");
    }

    fn emit(&self, event: ThumbnailEvent) {
        // The display surface may have shut down first
        let _ = self.events.send(event);
    }
}
