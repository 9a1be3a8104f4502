pub mod feed_index;
pub mod report;
pub mod subscription;

pub use feed_index::FeedIndex;
pub use report::{RunReport, TopicOutcome};
pub use subscription::{Subscription, SubscriptionKeys};
