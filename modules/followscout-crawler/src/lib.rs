pub mod cache;
pub mod criteria;
pub mod dispatch;
pub mod frontier;
pub mod pipeline;
pub mod queue;
pub mod resolver;
pub mod retry;
pub mod sink;
pub mod stats;
pub mod traits;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use cache::CrawlCache;
pub use criteria::{CriteriaEngine, Evaluation, Filter};
pub use frontier::FrontierState;
pub use pipeline::{Pipeline, PipelineDeps, PipelineError};
pub use queue::{InvestigationQueue, PushOutcome};
pub use retry::{CallError, RetryPolicy};
pub use sink::{JsonlSink, LogSink, ResultSink, SinkFanout};
pub use stats::{CrawlStats, StatsSnapshot};
pub use traits::{Direction, GraphSource, NeighborPage};
