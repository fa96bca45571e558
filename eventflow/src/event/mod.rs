//! 事件信封与计数模型
//!
//! 定义传输单元 `Event`、开放载荷取值 `PropertyValue`、存储位点 `EntryId`，
//! 以及服务实例级计数器 `Metrics` 与其快照。

mod entry_id;
#[allow(clippy::module_inception)]
mod event;
mod metrics;
mod property;

pub use entry_id::EntryId;
pub use event::Event;
pub use metrics::{Metrics, MetricsSnapshot};
pub use property::PropertyValue;
