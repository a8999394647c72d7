//! Progress-callback trait for per-page conversion events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`]. Pages are
//! recognised one after another, so events for one document arrive in page
//! order.
//!
//! # Example
//!
//! ```rust
//! use edgequake_ocr2doc::{ConversionConfig, ConversionProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct BlockCounter(AtomicUsize);
//!
//! impl ConversionProgressCallback for BlockCounter {
//!     fn on_page_complete(&self, _page: usize, _total: usize, blocks: usize) {
//!         self.0.fetch_add(blocks, Ordering::SeqCst);
//!     }
//! }
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(Arc::new(BlockCounter(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the conversion pipeline as it processes each page.
///
/// All methods have no-op defaults. Page numbers are 1-indexed.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once per document before the first page is recognised.
    fn on_conversion_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called just before the recognition request for a page.
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called when a page has been recognised and split into blocks.
    fn on_page_complete(&self, page_num: usize, total_pages: usize, block_count: usize) {
        let _ = (page_num, total_pages, block_count);
    }

    /// Called when a page fails. The document is abandoned after this.
    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        let _ = (page_num, total_pages, error);
    }

    /// Called once per document after the last page, successful or not.
    fn on_conversion_complete(&self, total_pages: usize, success_count: usize) {
        let _ = (total_pages, success_count);
    }
}

/// A no-op implementation, used when no callback is configured.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl ConversionProgressCallback for Recorder {
        fn on_conversion_start(&self, total_pages: usize) {
            self.events.lock().unwrap().push(format!("start {total_pages}"));
        }

        fn on_page_complete(&self, page_num: usize, _total_pages: usize, block_count: usize) {
            self.events
                .lock()
                .unwrap()
                .push(format!("page {page_num}: {block_count}"));
        }

        fn on_page_error(&self, page_num: usize, _total_pages: usize, error: &str) {
            self.events.lock().unwrap().push(format!("error {page_num}: {error}"));
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_conversion_start(5);
        cb.on_page_start(1, 5);
        cb.on_page_complete(1, 5, 7);
        cb.on_page_error(2, 5, "timeout");
        cb.on_conversion_complete(5, 1);
    }

    #[test]
    fn overridden_methods_receive_events_and_defaults_stay_silent() {
        let rec = Recorder::default();
        rec.on_conversion_start(2);
        rec.on_page_start(1, 2);
        rec.on_page_complete(1, 2, 4);
        rec.on_page_error(2, 2, "engine closed");
        rec.on_conversion_complete(2, 1);
        assert_eq!(
            *rec.events.lock().unwrap(),
            ["start 2", "page 1: 4", "error 2: engine closed"]
        );
    }
}
