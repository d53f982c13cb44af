use core::fmt;
use std::{
    sync::{Arc, Mutex},
    time::{Duration, Instant, SystemTime},
};

use crate::{
    error::{SdkError, SdkResult},
    metrics::{
        data::{Metric, MetricBatch, ScopeMetrics},
        instrument::{InstrumentDescriptor, InstrumentationScope},
        internal::{ComputeAggregation, Number, RunningTotal, Sum},
        reader::{MetricReader, SdkProducer},
        MetricError, MetricResult,
    },
    tally_debug, tally_warn,
};

/// Connects all of the instruments created by a meter provider to a [MetricReader].
///
/// This is the object that will be registered when a meter provider is
/// created. It owns the reader's aggregation state: one aggregator per
/// instrument, created when the instrument is registered and dropped when
/// the reader shuts down.
#[doc(hidden)]
pub struct Pipeline {
    reader: Box<dyn MetricReader>,
    inner: Mutex<PipelineInner>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Pipeline")
    }
}

#[derive(Default)]
struct PipelineInner {
    // Vec keeps export order identical to registration order.
    aggregations: Vec<(InstrumentationScope, Vec<InstrumentSync>)>,
    is_shutdown: bool,
}

struct InstrumentSync {
    descriptor: InstrumentDescriptor,
    comp_agg: Arc<dyn ComputeAggregation>,
}

impl Pipeline {
    /// Creates the reader's aggregator for a new instrument.
    ///
    /// The temporality is resolved from the reader once, by instrument kind.
    fn add_sum<T: Number>(
        &self,
        scope: &InstrumentationScope,
        descriptor: &InstrumentDescriptor,
        total: &Arc<RunningTotal<T>>,
    ) {
        let temporality = self.reader.temporality(descriptor.kind);
        let comp_agg: Arc<dyn ComputeAggregation> = Arc::new(Sum::new(
            total.clone(),
            temporality,
            descriptor.kind.is_monotonic(),
        ));

        let _ = self.inner.lock().map(|mut inner| {
            if inner.is_shutdown {
                return;
            }
            tally_debug!(
                name: "Pipeline.InstrumentAdded",
                instrument_name = descriptor.name.as_ref(),
                temporality = format!("{:?}", temporality),
            );
            let i_sync = InstrumentSync {
                descriptor: descriptor.clone(),
                comp_agg,
            };
            match inner.aggregations.iter_mut().find(|(s, _)| s == scope) {
                Some((_, instruments)) => instruments.push(i_sync),
                None => inner.aggregations.push((scope.clone(), vec![i_sync])),
            }
        });
    }

    /// Send accumulated telemetry
    fn force_flush(&self) -> SdkResult {
        self.reader.force_flush()
    }

    /// Shut down the reader, then release the aggregation state.
    fn shutdown_with_timeout(&self, timeout: Duration) -> SdkResult {
        // The reader's final export goes through `produce`, so the lock must
        // not be held while the reader shuts down.
        let result = self.reader.shutdown_with_timeout(timeout);
        if let Ok(mut inner) = self.inner.lock() {
            inner.is_shutdown = true;
            inner.aggregations.clear();
        }
        result
    }
}

impl SdkProducer for Pipeline {
    /// Returns aggregated metrics from a single collection.
    fn produce(&self, batch: &mut MetricBatch) -> MetricResult<()> {
        let inner = self.inner.lock()?;
        if inner.is_shutdown {
            return Err(MetricError::Other("pipeline is shut down".into()));
        }

        let now = SystemTime::now();
        batch.scope_metrics.clear();
        batch.scope_metrics.reserve(inner.aggregations.len());
        for (scope, instruments) in inner.aggregations.iter() {
            let mut metrics = Vec::with_capacity(instruments.len());
            for inst in instruments {
                // One broken aggregation must not hide the rest of the batch.
                let data = match inst.comp_agg.call(now) {
                    Ok(data) => data,
                    Err(e) => {
                        tally_warn!(
                            name: "Pipeline.AggregationFailed",
                            instrument_name = inst.descriptor.name.as_ref(),
                            error = format!("{:?}", e)
                        );
                        continue;
                    }
                };
                metrics.push(Metric {
                    name: inst.descriptor.name.clone(),
                    description: inst.descriptor.description.clone(),
                    unit: inst.descriptor.unit.clone(),
                    data,
                });
            }
            batch.scope_metrics.push(ScopeMetrics {
                scope: scope.clone(),
                metrics,
            });
        }

        Ok(())
    }
}

/// Every [Pipeline] of a meter provider, one per reader.
#[derive(Debug)]
pub(crate) struct Pipelines(pub(crate) Vec<Arc<Pipeline>>);

impl Pipelines {
    pub(crate) fn new(readers: Vec<Box<dyn MetricReader>>) -> Self {
        let mut pipes = Vec::with_capacity(readers.len());
        for reader in readers {
            let p = Arc::new(Pipeline {
                reader,
                inner: Mutex::new(PipelineInner::default()),
            });
            p.reader.register_pipeline(Arc::downgrade(&p));
            pipes.push(p);
        }

        Pipelines(pipes)
    }

    /// Makes a new instrument visible to every reader.
    pub(crate) fn add_sum<T: Number>(
        &self,
        scope: &InstrumentationScope,
        descriptor: &InstrumentDescriptor,
        total: &Arc<RunningTotal<T>>,
    ) {
        for pipe in &self.0 {
            pipe.add_sum(scope, descriptor, total);
        }
    }

    /// Force flush all pipelines
    pub(crate) fn force_flush(&self) -> SdkResult {
        let mut errs = vec![];
        for pipeline in &self.0 {
            if let Err(err) = pipeline.force_flush() {
                errs.push(err);
            }
        }
        combine(errs)
    }

    /// Shut down all pipelines, sharing one deadline.
    ///
    /// Every pipeline is shut down even if an earlier one fails.
    pub(crate) fn shutdown_with_timeout(&self, timeout: Duration) -> SdkResult {
        let deadline = Instant::now() + timeout;
        let mut errs = vec![];
        for pipeline in &self.0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if let Err(err) = pipeline.shutdown_with_timeout(remaining) {
                errs.push(err);
            }
        }
        combine(errs)
    }
}

fn combine(mut errs: Vec<SdkError>) -> SdkResult {
    match errs.len() {
        0 => Ok(()),
        1 => Err(errs.remove(0)),
        _ => Err(SdkError::InternalFailure(format!("{errs:?}"))),
    }
}
