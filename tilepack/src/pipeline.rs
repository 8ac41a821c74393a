//! The bounded producer, workers and consumer that turn a bounding box into saved tiles.
//!
//! One blocking producer enumerates tiles into the job queue, `workers` tasks
//! fetch them into the result queue, and a single consumer saves the results.
//! Both queues are bounded, so a slow origin or a slow destination stalls
//! the producer instead of buffering the whole run in memory.

use std::sync::Arc;
use std::time::{Duration, Instant};

use flume::{Receiver, Sender};
use tilejson::Bounds;
use tilepack_tile_utils::{BoundsError, TileCoord, generate_tiles, tile_ranges};
use tokio::task::{JoinHandle, spawn_blocking};
use tracing::{debug, info, trace, warn};

use crate::TilepackResult;
use crate::config::{BuildPlan, DEFAULT_WORKERS};
use crate::fetch::{ReqwestClient, RetryPolicy, RetryingFetcher, TileHttpClient, UrlTemplate};
use crate::output::{TileOutputter, open_outputter};

/// Capacity of the job and result queues.
pub const QUEUE_CAPACITY: usize = 2000;

/// Progress is logged every time this many tiles have been saved.
pub const SAVE_LOG_INTERVAL: u32 = 10_000;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TileRequest {
    pub tile: TileCoord,
    pub url: String,
    pub gzip: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TileResponse {
    pub tile: TileCoord,
    pub data: Vec<u8>,
    /// Time spent fetching, retries included.
    pub elapsed: Duration,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PipelineOptions {
    pub workers: usize,
    pub queue_capacity: usize,
    pub gzip: bool,
    pub retry: RetryPolicy,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            queue_capacity: QUEUE_CAPACITY,
            gzip: false,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineSummary {
    /// Tiles handed to the workers.
    pub requested: u64,
    pub saved: u64,
    /// Tiles that could not be fetched.
    pub dropped: u64,
}

pub struct Pipeline<C> {
    fetcher: Arc<RetryingFetcher<C>>,
    template: UrlTemplate,
    options: PipelineOptions,
}

impl<C: TileHttpClient + 'static> Pipeline<C> {
    pub fn new(client: C, template: UrlTemplate, options: PipelineOptions) -> Self {
        Self {
            fetcher: Arc::new(RetryingFetcher::new(client, options.retry)),
            template,
            options,
        }
    }

    /// Fetches every tile of `bounds` at `zooms` and saves it into `outputter`.
    ///
    /// Tiles that cannot be fetched are logged and counted as dropped. A storage
    /// error stops the whole run and is returned once every task has exited.
    pub async fn run<O: TileOutputter + 'static>(
        &self,
        bounds: &Bounds,
        zooms: &[u8],
        mut outputter: O,
    ) -> TilepackResult<PipelineSummary> {
        let total: u64 = tile_ranges(bounds, zooms)?.iter().map(|r| r.size()).sum();
        let workers = self.options.workers.max(1);
        info!("Requesting {total} tiles with {workers} workers");

        outputter.create_output().await?;

        let (job_tx, job_rx) = flume::bounded(self.options.queue_capacity);
        let (result_tx, result_rx) = flume::bounded(self.options.queue_capacity);

        let consumer = tokio::spawn(consume(result_rx, outputter));
        let worker_handles: Vec<_> = (0..workers)
            .map(|id| {
                tokio::spawn(fetch_worker(
                    id,
                    Arc::clone(&self.fetcher),
                    job_rx.clone(),
                    result_tx.clone(),
                ))
            })
            .collect();
        // Only the workers may keep the queues open.
        drop(job_rx);
        drop(result_tx);

        let producer = spawn_producer(
            *bounds,
            zooms.to_vec(),
            self.template.clone(),
            self.options.gzip,
            job_tx,
        );

        let produced = producer.await?;
        info!("Job queue closed");

        let mut dropped = 0;
        for handle in worker_handles {
            dropped += handle.await?;
        }
        info!("Finished making tile requests");

        let saved = consumer.await??;
        info!("Finished processing tiles");

        Ok(PipelineSummary {
            requested: produced?,
            saved,
            dropped,
        })
    }
}

enum ProduceError {
    Bounds(BoundsError),
    Closed,
}

impl From<BoundsError> for ProduceError {
    fn from(e: BoundsError) -> Self {
        Self::Bounds(e)
    }
}

/// Enumerates the tiles on a blocking thread, waiting whenever the job queue is full.
///
/// Dropping `jobs` when done closes the queue. If every worker is gone the
/// producer stops early and reports the number of tiles it managed to queue.
pub(crate) fn spawn_producer(
    bounds: Bounds,
    zooms: Vec<u8>,
    template: UrlTemplate,
    gzip: bool,
    jobs: Sender<TileRequest>,
) -> JoinHandle<Result<u64, BoundsError>> {
    spawn_blocking(move || {
        let mut requested = 0;
        let result: Result<(), ProduceError> = generate_tiles(&bounds, &zooms, |tile| {
            let url = template.render(tile);
            jobs.send(TileRequest { tile, url, gzip })
                .map_err(|_| ProduceError::Closed)?;
            requested += 1;
            Ok(())
        });
        match result {
            Ok(()) => Ok(requested),
            Err(ProduceError::Closed) => {
                debug!("Job queue has no workers left, stopped after {requested} tiles");
                Ok(requested)
            }
            Err(ProduceError::Bounds(e)) => Err(e),
        }
    })
}

async fn fetch_worker<C: TileHttpClient>(
    id: usize,
    fetcher: Arc<RetryingFetcher<C>>,
    jobs: Receiver<TileRequest>,
    results: Sender<TileResponse>,
) -> u64 {
    let mut dropped = 0;
    while let Ok(request) = jobs.recv_async().await {
        let start = Instant::now();
        match fetcher.fetch(&request.url, request.gzip).await {
            Ok(data) => {
                let response = TileResponse {
                    tile: request.tile,
                    data,
                    elapsed: start.elapsed(),
                };
                if results.send_async(response).await.is_err() {
                    debug!("Worker {id} stopping, the result queue is closed");
                    break;
                }
            }
            Err(e) => {
                warn!("Skipping {}: {e}", request.tile);
                dropped += 1;
            }
        }
    }
    dropped
}

async fn consume<O: TileOutputter>(
    results: Receiver<TileResponse>,
    mut outputter: O,
) -> TilepackResult<u64> {
    let mut saved = 0_u64;
    let mut start = Instant::now();
    while let Ok(response) = results.recv_async().await {
        if let Err(e) = outputter.save(response.tile, &response.data).await {
            // closing the queue makes the workers and then the producer stop
            drop(results);
            if let Err(close_err) = outputter.close().await {
                warn!("Unable to close the output after a failed save: {close_err}");
            }
            return Err(e);
        }
        trace!("Saved {} fetched in {:?}", response.tile, response.elapsed);
        saved += 1;

        if saved % u64::from(SAVE_LOG_INTERVAL) == 0 {
            let rate = f64::from(SAVE_LOG_INTERVAL) / start.elapsed().as_secs_f64();
            info!("Saved {}k tiles ({rate:.1} tiles per second)", saved / 1000);
            start = Instant::now();
        }
    }
    info!("Saved {saved} tiles");
    outputter.close().await?;
    Ok(saved)
}

/// Runs a whole build: HTTP client, destination and pipeline.
pub async fn build(plan: &BuildPlan) -> TilepackResult<PipelineSummary> {
    let client = ReqwestClient::new(plan.timeout)?;
    let outputter = open_outputter(plan).await?;
    info!("Created {:?} output at {}", plan.mode, plan.output.display());

    let options = PipelineOptions {
        workers: plan.workers,
        gzip: plan.gzip,
        ..PipelineOptions::default()
    };
    let pipeline = Pipeline::new(client, plan.url.clone(), options);
    pipeline.run(&plan.bounds, &plan.zooms, outputter).await
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tilepack_tile_utils::TileIter;

    use super::*;
    use crate::TilepackError;
    use crate::fetch::tests::ScriptedClient;

    #[derive(Clone, Default)]
    struct MemoryOutputter {
        tiles: Arc<Mutex<Vec<(TileCoord, Vec<u8>)>>>,
        created: Arc<Mutex<bool>>,
        closed: Arc<Mutex<bool>>,
        fail_after: Option<usize>,
    }

    #[async_trait]
    impl TileOutputter for MemoryOutputter {
        async fn create_output(&mut self) -> TilepackResult<()> {
            *self.created.lock().unwrap() = true;
            Ok(())
        }

        async fn save(&mut self, tile: TileCoord, data: &[u8]) -> TilepackResult<()> {
            let mut tiles = self.tiles.lock().unwrap();
            if self.fail_after == Some(tiles.len()) {
                return Err(TilepackError::Io(std::io::Error::other("disk full")));
            }
            tiles.push((tile, data.to_vec()));
            Ok(())
        }

        async fn close(&mut self) -> TilepackResult<()> {
            *self.closed.lock().unwrap() = true;
            Ok(())
        }
    }

    fn template() -> UrlTemplate {
        UrlTemplate::new("http://tiles/{z}/{x}/{y}").unwrap()
    }

    fn options(workers: usize) -> PipelineOptions {
        PipelineOptions {
            workers,
            queue_capacity: 4,
            gzip: false,
            retry: RetryPolicy::immediate(3),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn producer_blocks_on_a_full_queue() {
        let (tx, rx) = flume::bounded(3);
        let producer = spawn_producer(Bounds::MAX, vec![0, 1, 2], template(), false, tx);

        while rx.len() < 3 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(rx.len(), 3);
        assert!(!producer.is_finished());

        let mut received = Vec::new();
        while let Ok(request) = rx.recv_async().await {
            received.push(request);
        }
        assert_eq!(producer.await.unwrap().unwrap(), 21);
        assert_eq!(received.len(), 21);
        assert_eq!(
            received[0],
            TileRequest {
                tile: TileCoord { z: 0, x: 0, y: 0 },
                url: "http://tiles/0/0/0".to_string(),
                gzip: false,
            }
        );
    }

    #[tokio::test]
    async fn producer_stops_without_workers() {
        let (tx, rx) = flume::bounded(2);
        drop(rx);
        let producer = spawn_producer(Bounds::MAX, vec![3], template(), false, tx);
        assert_eq!(producer.await.unwrap().unwrap(), 0);
    }

    #[tokio::test]
    async fn every_tile_is_saved_once() {
        let client = Arc::new(ScriptedClient::new(&[503, 500]));
        let out = MemoryOutputter::default();
        let pipeline = Pipeline::new(Arc::clone(&client), template(), options(3));
        let summary = pipeline.run(&Bounds::MAX, &[0, 1, 2], out.clone()).await.unwrap();

        assert_eq!(
            summary,
            PipelineSummary {
                requested: 21,
                saved: 21,
                dropped: 0,
            }
        );
        assert_eq!(client.calls(), 23);
        assert!(*out.created.lock().unwrap());
        assert!(*out.closed.lock().unwrap());

        let mut saved = out.tiles.lock().unwrap().clone();
        saved.sort_by_key(|(tile, _)| *tile);
        let mut expected: Vec<_> = TileIter::new(&Bounds::MAX, &[0, 1, 2])
            .unwrap()
            .map(|tile| (tile, format!("body of http://tiles/{tile}").into_bytes()))
            .collect();
        expected.sort_by_key(|(tile, _)| *tile);
        assert_eq!(saved, expected);
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn failed_tiles_are_dropped() {
        let client = Arc::new(ScriptedClient::new(&[404, 500, 500, 500]));
        let out = MemoryOutputter::default();
        let pipeline = Pipeline::new(client, template(), options(1));
        let summary = pipeline.run(&Bounds::MAX, &[0, 1], out.clone()).await.unwrap();
        assert_eq!(
            summary,
            PipelineSummary {
                requested: 5,
                saved: 3,
                dropped: 2,
            }
        );
        assert_eq!(out.tiles.lock().unwrap().len(), 3);
        assert!(logs_contain("Skipping 0/0/0"));
    }

    #[tokio::test]
    async fn storage_errors_stop_the_run() {
        let client = Arc::new(ScriptedClient::new(&[]));
        let out = MemoryOutputter {
            fail_after: Some(5),
            ..MemoryOutputter::default()
        };
        let pipeline = Pipeline::new(client, template(), options(2));
        let err = pipeline
            .run(&Bounds::MAX, &[0, 1, 2, 3, 4, 5], out.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, TilepackError::Io(_)));
        assert_eq!(out.tiles.lock().unwrap().len(), 5);
        assert!(*out.closed.lock().unwrap());
    }

    #[tokio::test]
    async fn invalid_zoom_is_rejected_up_front() {
        let client = Arc::new(ScriptedClient::new(&[]));
        let out = MemoryOutputter::default();
        let pipeline = Pipeline::new(Arc::clone(&client), template(), options(1));
        let err = pipeline.run(&Bounds::MAX, &[31], out.clone()).await.unwrap_err();
        assert!(matches!(err, TilepackError::Bounds(BoundsError::InvalidZoom(31))));
        assert!(!*out.created.lock().unwrap());
        assert_eq!(client.calls(), 0);
    }
}
