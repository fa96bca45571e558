//! 时间窗口聚合（aggregate）
//!
//! - `AggregateWindow`：固定粒度窗口及其指标累计；
//! - `WindowStore`：可插拔窗口存储，内置 `InMemoryWindowStore`；
//! - `EventAggregator`：事件到窗口/指标的折叠逻辑；
//! - `AggregatingHandler`：以处理器形式接入消费循环。
//!
mod aggregator;
mod store;
mod window;

pub use aggregator::{AggregatingHandler, EventAggregator};
pub use store::{InMemoryWindowStore, WindowStore};
pub use window::{AggregateWindow, MetricAggregate};
