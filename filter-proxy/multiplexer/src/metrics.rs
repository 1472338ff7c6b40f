use crate::Status;
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{
        counter::Counter,
        family::Family,
        histogram::{exponential_buckets, Histogram},
    },
    registry::{Registry, Unit},
};
use tokio::time;

#[derive(Clone, Debug)]
pub struct StreamMetrics {
    started: Family<ModeLabels, Counter>,
    closed: Family<StatusLabels, Counter>,
    duration: Family<ModeLabels, Histogram>,
    decisions: Family<DecisionLabels, Counter>,
}

/// Records the lifecycle of a single stream.
#[derive(Debug)]
pub(crate) struct StreamObserver {
    start: time::Instant,
    mode: &'static str,
    metrics: StreamMetrics,
}

/// The outcome of filtering an object, as recorded by metrics.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Outcome {
    Kept,
    Replaced,
    Dropped,

    /// A watch event reporting the deletion of an object that no longer matches the filter.
    SyntheticDelete,
}

#[derive(Clone, Hash, PartialEq, Eq, EncodeLabelSet, Debug)]
struct ModeLabels {
    mode: &'static str,
}

#[derive(Clone, Hash, PartialEq, Eq, EncodeLabelSet, Debug)]
struct StatusLabels {
    mode: &'static str,
    status: &'static str,
}

#[derive(Clone, Hash, PartialEq, Eq, EncodeLabelSet, Debug)]
struct DecisionLabels {
    filter: String,
    decision: &'static str,
}

// === impl StreamMetrics ===

impl StreamMetrics {
    pub fn register(reg: &mut Registry) -> Self {
        let started = Family::<ModeLabels, Counter>::default();
        reg.register(
            "streams_started",
            "Total number of response streams started",
            started.clone(),
        );

        let closed = Family::<StatusLabels, Counter>::default();
        reg.register(
            "streams_closed",
            "Total number of response streams completed, by terminal status",
            closed.clone(),
        );

        let duration = Family::<ModeLabels, Histogram>::new_with_constructor(|| {
            // Watches are typically held open for several minutes.
            Histogram::new(exponential_buckets(0.01, 10.0, 6))
        });
        reg.register_with_unit(
            "stream_duration",
            "Histogram of the lifetime of response streams",
            Unit::Seconds,
            duration.clone(),
        );

        let decisions = Family::<DecisionLabels, Counter>::default();
        reg.register(
            "object_decisions",
            "Total number of objects inspected by object filters, by outcome",
            decisions.clone(),
        );

        Self {
            started,
            closed,
            duration,
            decisions,
        }
    }

    pub(crate) fn start(&self, mode: &'static str) -> StreamObserver {
        self.started.get_or_create(&ModeLabels { mode }).inc();
        StreamObserver {
            start: time::Instant::now(),
            mode,
            metrics: self.clone(),
        }
    }

    pub(crate) fn decision(&self, filter: &str, outcome: Outcome) {
        self.decisions
            .get_or_create(&DecisionLabels {
                filter: filter.to_string(),
                decision: outcome.as_str(),
            })
            .inc();
    }
}

// === impl StreamObserver ===

impl StreamObserver {
    pub(crate) fn end(self, status: &Status) {
        let Self {
            start,
            mode,
            metrics,
        } = self;
        metrics
            .duration
            .get_or_create(&ModeLabels { mode })
            .observe(start.elapsed().as_secs_f64());
        metrics
            .closed
            .get_or_create(&StatusLabels {
                mode,
                status: status.as_str(),
            })
            .inc();
    }
}

// === impl Outcome ===

impl Outcome {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Kept => "kept",
            Self::Replaced => "replaced",
            Self::Dropped => "dropped",
            Self::SyntheticDelete => "synthetic_delete",
        }
    }
}
