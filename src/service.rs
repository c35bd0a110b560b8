//! Worker-pool dispatch for decode requests.
//!
//! The cascade is CPU bound and may sit inside a model engine for a while,
//! so requests run on a dedicated rayon pool instead of the caller's thread.
//! Each submission gets its own reply channel; the pipeline itself is shared
//! read-only.

use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::Duration;

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, error};

use crate::error::{ConfigError, DecodeError};
use crate::models::DecodeResult;
use crate::pipeline::Pipeline;

/// Runs a shared [`Pipeline`] on its own thread pool.
pub struct DecodeService {
    pipeline: Arc<Pipeline>,
    pool: ThreadPool,
}

impl DecodeService {
    /// Start a pool with `workers` threads, or one per core when `None`.
    pub fn new(pipeline: Pipeline, workers: Option<usize>) -> Result<Self, ConfigError> {
        let mut builder = ThreadPoolBuilder::new()
            .thread_name(|i| format!("qrde-worker-{i}"))
            .panic_handler(|_| error!("decode worker panicked outside a detector call"));
        if let Some(n) = workers {
            builder = builder.num_threads(n);
        }
        let pool = builder.build()?;
        debug!(workers = pool.current_num_threads(), "decode pool started");
        Ok(Self {
            pipeline: Arc::new(pipeline),
            pool,
        })
    }

    /// The pipeline requests run through.
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Number of worker threads.
    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Queue one encoded image. The returned ticket yields the outcome.
    pub fn submit(&self, bytes: Vec<u8>) -> DecodeTicket {
        let (tx, rx) = mpsc::channel();
        let pipeline = Arc::clone(&self.pipeline);
        self.pool.spawn(move || {
            // The receiver may have given up waiting; that is not an error here.
            let _ = tx.send(pipeline.run_bytes(&bytes));
        });
        DecodeTicket { rx }
    }

    /// Decode a batch in parallel. Results keep the input order.
    pub fn decode_batch(&self, uploads: &[Vec<u8>]) -> Vec<Result<DecodeResult, DecodeError>> {
        let pipeline = &self.pipeline;
        self.pool.install(|| {
            uploads
                .par_iter()
                .map(|bytes| pipeline.run_bytes(bytes))
                .collect()
        })
    }
}

/// Pending result of [`DecodeService::submit`].
#[derive(Debug)]
pub struct DecodeTicket {
    rx: Receiver<Result<DecodeResult, DecodeError>>,
}

impl DecodeTicket {
    /// Block until the request finishes.
    pub fn wait(self) -> Result<DecodeResult, DecodeError> {
        self.rx.recv().map_err(|_| DecodeError::WorkerGone)?
    }

    /// Block for at most `after`. The job keeps running in the pool if the
    /// deadline passes; its result is discarded.
    pub fn wait_timeout(self, after: Duration) -> Result<DecodeResult, DecodeError> {
        match self.rx.recv_timeout(after) {
            Ok(outcome) => outcome,
            Err(RecvTimeoutError::Timeout) => Err(DecodeError::TimedOut { after }),
            Err(RecvTimeoutError::Disconnected) => Err(DecodeError::WorkerGone),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::QrBackend;
    use crate::error::BackendError;
    use crate::models::Image;
    use crate::pipeline::DecodeAttempt;
    use image::{DynamicImage, GrayImage, ImageFormat};
    use std::io::Cursor;
    use std::thread;

    struct Echo;

    impl QrBackend for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn detect_and_decode(&self, image: &Image) -> Result<Vec<String>, BackendError> {
            Ok(vec![format!("{}x{}", image.width(), image.height())])
        }
    }

    struct Slow;

    impl QrBackend for Slow {
        fn name(&self) -> &str {
            "slow"
        }

        fn detect_and_decode(&self, _image: &Image) -> Result<Vec<String>, BackendError> {
            thread::sleep(Duration::from_millis(300));
            Ok(Vec::new())
        }
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageLuma8(GrayImage::new(width, height))
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    fn service(backend: Arc<dyn QrBackend>) -> DecodeService {
        let pipeline = Pipeline::builder()
            .stage(DecodeAttempt::new("direct", backend))
            .build()
            .unwrap();
        DecodeService::new(pipeline, Some(2)).unwrap()
    }

    #[test]
    fn test_submit_and_wait() {
        let svc = service(Arc::new(Echo));
        assert_eq!(svc.workers(), 2);
        let result = svc.submit(png(7, 5)).wait().unwrap();
        assert_eq!(result.texts, vec!["7x5"]);
        assert_eq!(result.stage(), Some("direct"));
    }

    #[test]
    fn test_rejected_input_travels_back() {
        let svc = service(Arc::new(Echo));
        let outcome = svc.submit(b"not an image".to_vec()).wait();
        assert!(matches!(outcome, Err(DecodeError::InputRejected { .. })));
    }

    #[test]
    fn test_wait_timeout_elapses() {
        let svc = service(Arc::new(Slow));
        let after = Duration::from_millis(10);
        let outcome = svc.submit(png(4, 4)).wait_timeout(after);
        assert_eq!(outcome, Err(DecodeError::TimedOut { after }));
    }

    #[test]
    fn test_batch_keeps_order() {
        let svc = service(Arc::new(Echo));
        let uploads = vec![png(3, 3), Vec::new(), png(9, 2)];
        let results = svc.decode_batch(&uploads);
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().texts, vec!["3x3"]);
        assert!(results[1].is_err());
        assert_eq!(results[2].as_ref().unwrap().texts, vec!["9x2"]);
    }
}
