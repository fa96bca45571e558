//! 消费子系统（consumer）
//!
//! - `EventHandler`：调用方提供的事件处理逻辑；
//! - `ConsumerId`：每个服务实例唯一的消费者标识；
//! - `Coordinator`：消费组的建组、认领、确认与失败记账。
//!
mod coordinator;
mod handler;
mod identity;

pub use coordinator::Coordinator;
pub use handler::{EventHandler, HandledEventType};
pub use identity::ConsumerId;
