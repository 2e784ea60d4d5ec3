pub mod broadcast;
pub mod frame_queue;
pub mod worker;

pub use broadcast::ResultBroadcaster;
pub use frame_queue::FrameQueue;
pub use worker::InferenceWorker;
