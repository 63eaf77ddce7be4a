//! Generation cache with a single-writer claim per entity and window, plus
//! the dashboard computations that sit next to it.

pub mod advisory;
pub mod claim;
pub mod credit;
pub mod generator;
pub mod indicator;
pub mod persister;
pub mod portfolio;
pub mod prompt;
pub mod takeaways;

#[cfg(test)]
mod tests;

pub use advisory::{
    build_advisory_payload, summarize_portfolio, AdvisoryHandler, AdvisoryReply,
    ADVISORY_PROMPT_VERSION,
};
pub use claim::{ClaimArbiter, ClaimOutcome};
pub use credit::credit_stress;
pub use generator::{parse_structured, InsightGenerator};
pub use indicator::{IndicatorInsightHandler, InsightResponse, INDICATOR_PROMPT_VERSION};
pub use persister::ResultPersister;
pub use portfolio::{group_portfolio, GroupId, GroupedPortfolio, PortfolioGroup};
pub use takeaways::{parse_bullets, TakeawaysGenerator};
