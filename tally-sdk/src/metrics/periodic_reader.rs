use std::{
    env, fmt, mem,
    sync::{
        mpsc::{self, Receiver, Sender},
        Arc, Mutex, Weak,
    },
    thread,
    time::{Duration, Instant},
};

use futures_util::future::{self, Either};

use crate::{
    error::{SdkError, SdkResult},
    metrics::{exporter::PushMetricExporter, reader::SdkProducer, MetricError, MetricResult},
    tally_debug, tally_error, tally_info, tally_warn,
};

use super::{
    data::MetricBatch, instrument::InstrumentKind, reader::MetricReader, Pipeline, Temporality,
};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

const METRIC_EXPORT_INTERVAL_NAME: &str = "OTEL_METRIC_EXPORT_INTERVAL";
const METRIC_EXPORT_TIMEOUT_NAME: &str = "OTEL_METRIC_EXPORT_TIMEOUT";

/// Configuration options for [PeriodicReader].
///
/// A periodic reader is a [MetricReader] that collects and exports metric data
/// to the exporter at a defined interval.
///
/// By default, the returned [MetricReader] will collect and export data every
/// 60 seconds, and will wait at most 30 seconds for each export to complete.
/// Both defaults can be overridden through the `OTEL_METRIC_EXPORT_INTERVAL`
/// and `OTEL_METRIC_EXPORT_TIMEOUT` environment variables (milliseconds), and
/// builder calls take precedence over the environment.
///
/// The [collect] method of the returned [MetricReader] continues to gather and
/// return metric data to the user. It will not automatically send that data to
/// the exporter outside of the predefined interval.
///
/// [collect]: MetricReader::collect
#[derive(Debug)]
pub struct PeriodicReaderBuilder<E> {
    interval: Duration,
    timeout: Duration,
    exporter: E,
}

impl<E> PeriodicReaderBuilder<E>
where
    E: PushMetricExporter,
{
    fn new(exporter: E) -> Self {
        PeriodicReaderBuilder {
            interval: duration_from_env(METRIC_EXPORT_INTERVAL_NAME).unwrap_or(DEFAULT_INTERVAL),
            timeout: duration_from_env(METRIC_EXPORT_TIMEOUT_NAME).unwrap_or(DEFAULT_TIMEOUT),
            exporter,
        }
    }

    /// Configures the intervening time between exports for a [PeriodicReader].
    ///
    /// This option overrides any value set for the `OTEL_METRIC_EXPORT_INTERVAL`
    /// environment variable.
    ///
    /// If this option is not used or `interval` is equal to zero, 60 seconds is
    /// used as the default.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        if !interval.is_zero() {
            self.interval = interval;
        }
        self
    }

    /// Configures the time the reader waits for one export to complete before
    /// abandoning it.
    ///
    /// This option overrides any value set for the `OTEL_METRIC_EXPORT_TIMEOUT`
    /// environment variable.
    ///
    /// If this option is not used or `timeout` is equal to zero, 30 seconds is used
    /// as the default.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        if !timeout.is_zero() {
            self.timeout = timeout;
        }
        self
    }

    /// Create a [PeriodicReader] with the given config.
    pub fn build(self) -> PeriodicReader {
        PeriodicReader::new(self.exporter, self.interval, self.timeout)
    }
}

/// Milliseconds from the environment. Zero and unparsable values count as
/// unset.
fn duration_from_env(name: &str) -> Option<Duration> {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|millis| *millis > 0)
        .map(Duration::from_millis)
}

/// A [MetricReader] that continuously collects and exports metric data at a set
/// interval.
///
/// The reader is idle until a meter provider registers it. Registration starts
/// a dedicated worker thread that exports on a fixed schedule aligned to the
/// registration time. Exports never run concurrently: when one overruns the
/// interval, the ticks it missed are skipped rather than queued. Each export
/// is abandoned once it exceeds the configured timeout.
///
/// Export failures are logged and never stop the schedule. Delta state is
/// committed at collection time, so a failed export loses that interval's
/// delta instead of reporting it twice.
///
/// Shutdown performs a final collect and export, then shuts the exporter
/// down.
///
/// # Example
///
/// ```no_run
/// use tally_sdk::metrics::PeriodicReader;
/// # fn example<E>(get_exporter: impl Fn() -> E)
/// # where
/// #     E: tally_sdk::metrics::PushMetricExporter,
/// # {
///
/// let exporter = get_exporter(); // set up a push exporter
///
/// let reader = PeriodicReader::builder(exporter).build();
/// # drop(reader);
/// # }
/// ```
#[derive(Clone)]
pub struct PeriodicReader {
    inner: Arc<PeriodicReaderInner>,
}

impl PeriodicReader {
    /// Configuration options for a periodic reader
    pub fn builder<E>(exporter: E) -> PeriodicReaderBuilder<E>
    where
        E: PushMetricExporter,
    {
        PeriodicReaderBuilder::new(exporter)
    }

    fn new<E>(exporter: E, interval: Duration, timeout: Duration) -> Self
    where
        E: PushMetricExporter,
    {
        PeriodicReader {
            inner: Arc::new(PeriodicReaderInner {
                exporter: Arc::new(exporter),
                interval,
                timeout,
                producer: Mutex::new(None),
                state: Mutex::new(ReaderState::Idle),
            }),
        }
    }

    /// Starts the worker thread. Called once, on registration.
    fn start(&self) -> MetricResult<Sender<Message>> {
        let (message_sender, message_receiver): (Sender<Message>, Receiver<Message>) =
            mpsc::channel();
        let reader = self.clone();

        thread::Builder::new()
            .name("Tally.Metrics.PeriodicReader".to_string())
            .spawn(move || reader.run(message_receiver))
            .map_err(|e| MetricError::Other(format!("failed to spawn reader thread: {e}")))?;

        Ok(message_sender)
    }

    fn run(&self, message_receiver: Receiver<Message>) {
        let interval = self.inner.interval;
        let timeout = self.inner.timeout;
        let mut next_tick = Instant::now() + interval;
        tally_info!(
            name: "PeriodicReader.ThreadStarted",
            interval_in_millisecs = interval.as_millis(),
            export_timeout_in_millisecs = timeout.as_millis()
        );

        loop {
            let remaining = next_tick.saturating_duration_since(Instant::now());
            match message_receiver.recv_timeout(remaining) {
                Ok(Message::Flush(response_sender)) => {
                    // Out of band: the timer schedule is left untouched.
                    tally_debug!(name: "PeriodicReader.ExportingDueToFlush");
                    let _ = response_sender.send(self.inner.collect_and_export());
                }
                Ok(Message::Shutdown(response_sender)) => {
                    // Perform final export and break out of loop and exit the thread
                    tally_debug!(name: "PeriodicReader.ExportingDueToShutdown");
                    let _ = response_sender.send(self.inner.collect_and_export());
                    break;
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    tally_debug!(name: "PeriodicReader.ExportingDueToTimer");
                    // failures are already logged
                    let _ = self.inner.collect_and_export();

                    let (next, skipped) = next_deadline(next_tick, interval, Instant::now());
                    if skipped > 0 {
                        tally_warn!(
                            name: "PeriodicReader.TicksSkipped",
                            message = "Export took longer than the interval, missed ticks are skipped.",
                            skipped_ticks = skipped
                        );
                    }
                    next_tick = next;
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    // Every sender is gone. Break out and exit the thread.
                    break;
                }
            }
        }

        tally_info!(name: "PeriodicReader.ThreadStopped");
    }
}

/// The first tick boundary after `now`, and how many boundaries were passed
/// over without an export.
///
/// Boundaries stay aligned to the schedule set by the first deadline.
fn next_deadline(previous: Instant, interval: Duration, now: Instant) -> (Instant, u32) {
    let overrun = now.saturating_duration_since(previous);
    let skipped = u32::try_from(overrun.as_nanos() / interval.as_nanos().max(1)).unwrap_or(u32::MAX);
    let next = interval
        .checked_mul(skipped.saturating_add(1))
        .and_then(|offset| previous.checked_add(offset))
        .unwrap_or(now + interval);
    (next, skipped)
}

impl fmt::Debug for PeriodicReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeriodicReader")
            .field("interval", &self.inner.interval)
            .field("timeout", &self.inner.timeout)
            .finish()
    }
}

struct PeriodicReaderInner {
    exporter: Arc<dyn PushMetricExporter>,
    interval: Duration,
    timeout: Duration,
    producer: Mutex<Option<Weak<dyn SdkProducer>>>,
    state: Mutex<ReaderState>,
}

/// IDLE until registered, RUNNING while the worker thread is alive, STOPPED
/// after shutdown. There is no way back from STOPPED.
#[derive(Debug)]
enum ReaderState {
    Idle,
    Running(Sender<Message>),
    Stopped,
}

#[derive(Debug)]
enum Message {
    Flush(Sender<SdkResult>),
    Shutdown(Sender<SdkResult>),
}

impl PeriodicReaderInner {
    fn produce(&self, batch: &mut MetricBatch) -> MetricResult<()> {
        let producer = self.producer.lock()?;
        if let Some(p) = producer.as_ref() {
            p.upgrade()
                .ok_or_else(|| MetricError::Other("pipeline is dropped".into()))?
                .produce(batch)?;
            Ok(())
        } else {
            Err(MetricError::Other("pipeline is not registered".into()))
        }
    }

    fn collect(&self, batch: &mut MetricBatch) -> MetricResult<()> {
        if matches!(*self.state.lock()?, ReaderState::Stopped) {
            return Err(MetricError::Other("reader is shut down".into()));
        }
        self.produce(batch)
    }

    fn collect_and_export(&self) -> SdkResult {
        let mut batch = MetricBatch::default();
        if let Err(e) = self.produce(&mut batch) {
            tally_warn!(
                name: "PeriodicReader.CollectFailed",
                error = format!("{:?}", e)
            );
            return Err(SdkError::InternalFailure(e.to_string()));
        }

        if batch.is_empty() {
            tally_debug!(name: "PeriodicReader.NoMetricsCollected");
            return Ok(());
        }

        // The export future is dropped if the timer wins.
        let export = self.exporter.export(&batch);
        let timer = futures_timer::Delay::new(self.timeout);
        let outcome = futures_executor::block_on(future::select(export, timer));
        match outcome {
            Either::Left((Ok(()), _)) => Ok(()),
            Either::Left((Err(e), _)) => {
                tally_warn!(
                    name: "PeriodicReader.ExportFailed",
                    error = format!("{:?}", e)
                );
                Err(e)
            }
            Either::Right(_) => {
                tally_warn!(
                    name: "PeriodicReader.ExportTimedOut",
                    timeout_in_millisecs = self.timeout.as_millis()
                );
                Err(SdkError::Timeout(self.timeout))
            }
        }
    }

    fn force_flush(&self) -> SdkResult {
        let (response_tx, response_rx) = mpsc::channel();
        match &*self.state.lock()? {
            ReaderState::Running(sender) => sender
                .send(Message::Flush(response_tx))
                .map_err(|e| SdkError::InternalFailure(e.to_string()))?,
            ReaderState::Idle => {
                return Err(SdkError::InternalFailure(
                    "reader is not registered with a provider".into(),
                ))
            }
            ReaderState::Stopped => return Err(SdkError::AlreadyShutdown),
        }

        response_rx
            .recv()
            .map_err(|_| SdkError::InternalFailure("reader thread is gone".into()))?
    }

    fn shutdown_with_timeout(&self, timeout: Duration) -> SdkResult {
        let deadline = Instant::now() + timeout;
        let previous = mem::replace(&mut *self.state.lock()?, ReaderState::Stopped);

        let flush_result = match previous {
            ReaderState::Stopped => return Err(SdkError::AlreadyShutdown),
            // Never registered, nothing to flush.
            ReaderState::Idle => Ok(()),
            ReaderState::Running(sender) => {
                let (response_tx, response_rx) = mpsc::channel();
                sender
                    .send(Message::Shutdown(response_tx))
                    .map_err(|e| SdkError::InternalFailure(e.to_string()))
                    .and_then(|_| {
                        match response_rx.recv_timeout(timeout) {
                            Ok(result) => result,
                            Err(mpsc::RecvTimeoutError::Timeout) => {
                                tally_warn!(
                                    name: "PeriodicReader.ShutdownTimedOut",
                                    timeout_in_millisecs = timeout.as_millis()
                                );
                                Err(SdkError::Timeout(timeout))
                            }
                            Err(mpsc::RecvTimeoutError::Disconnected) => Err(
                                SdkError::InternalFailure("reader thread is gone".into()),
                            ),
                        }
                    })
            }
        };

        // The exporter is released even when the final flush failed.
        let exporter_result = self
            .exporter
            .shutdown_with_timeout(deadline.saturating_duration_since(Instant::now()));
        if let Err(e) = &exporter_result {
            tally_warn!(
                name: "PeriodicReader.ExporterShutdownFailed",
                error = format!("{:?}", e)
            );
        }

        flush_result.and(exporter_result)
    }
}

impl MetricReader for PeriodicReader {
    fn register_pipeline(&self, pipeline: Weak<Pipeline>) {
        let Ok(mut state) = self.inner.state.lock() else {
            return;
        };
        if !matches!(*state, ReaderState::Idle) {
            tally_warn!(
                name: "PeriodicReader.DuplicateRegistration",
                message = "The reader is already registered or shut down. Registering a reader multiple times is not allowed."
            );
            return;
        }

        if let Ok(mut producer) = self.inner.producer.lock() {
            *producer = Some(pipeline);
        }

        match self.start() {
            Ok(sender) => *state = ReaderState::Running(sender),
            Err(e) => {
                tally_error!(
                    name: "PeriodicReader.ThreadStartFailed",
                    error = format!("{:?}", e)
                );
            }
        }
    }

    fn collect(&self, batch: &mut MetricBatch) -> MetricResult<()> {
        self.inner.collect(batch)
    }

    fn force_flush(&self) -> SdkResult {
        self.inner.force_flush()
    }

    fn shutdown_with_timeout(&self, timeout: Duration) -> SdkResult {
        self.inner.shutdown_with_timeout(timeout)
    }

    /// Delegates to the exporter.
    fn temporality(&self, kind: InstrumentKind) -> Temporality {
        self.inner.exporter.temporality(kind)
    }
}
