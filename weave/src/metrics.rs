//! Metrics definitions for weave components.

use std::sync::Once;

use metrics::describe_counter;

static REGISTER: Once = Once::new();

/// Label for the outcome of a pool task.
pub const OUTCOME_LABEL: &str = "outcome";

/// Label for the pipeline stage emitting an item.
pub const STAGE_LABEL: &str = "stage";

/// Label for the combinator relaying an item.
pub const COMBINATOR_LABEL: &str = "combinator";

// Pool metrics

/// Counter for tasks executed by worker pools, labeled by outcome.
pub const WEAVE_POOL_TASKS_TOTAL: &str = "weave_pool_tasks_total";

/// Counter for tasks accepted by worker pool dispatchers.
pub const WEAVE_POOL_SUBMISSIONS_TOTAL: &str = "weave_pool_submissions_total";

// Pipeline metrics

/// Counter for items emitted by pipeline stages, labeled by stage.
pub const WEAVE_PIPELINE_ITEMS_TOTAL: &str = "weave_pipeline_items_total";

// Combinator metrics

/// Counter for items relayed by combinators, labeled by combinator.
pub const WEAVE_COMBINATOR_ITEMS_TOTAL: &str = "weave_combinator_items_total";

/// Registers descriptions for every weave metric.
///
/// Safe to call many times; descriptions are only registered once per process.
pub fn register_metrics() {
    REGISTER.call_once(|| {
        describe_counter!(
            WEAVE_POOL_TASKS_TOTAL,
            "Total number of tasks executed by worker pools, labeled by outcome"
        );
        describe_counter!(
            WEAVE_POOL_SUBMISSIONS_TOTAL,
            "Total number of tasks handed off to worker pool dispatchers"
        );
        describe_counter!(
            WEAVE_PIPELINE_ITEMS_TOTAL,
            "Total number of items emitted by pipeline stages, labeled by stage"
        );
        describe_counter!(
            WEAVE_COMBINATOR_ITEMS_TOTAL,
            "Total number of items relayed by stream combinators, labeled by combinator"
        );
    });
}
