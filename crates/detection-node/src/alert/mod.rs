pub mod dispatcher;
pub mod evaluator;
pub mod notify;
pub mod snapshot;
pub mod store;

pub use dispatcher::{AlertDispatcher, AlertWork, ALERT_QUEUE_DEPTH};
pub use evaluator::AlertEvaluator;
pub use notify::{EmailChannel, WebhookChannel};
pub use snapshot::FsSnapshotStore;
pub use store::{MemoryAlertStore, PgAlertStore};
