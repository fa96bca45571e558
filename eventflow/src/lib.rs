//! 事件流处理与时间窗口聚合引擎（eventflow）
//!
//! 接收应用事件，经日志存储持久化排序，以至少一次语义投递给竞争消费者，
//! 并提供：
//! - 消费组协调（`consumer`）：建组、认领、确认与失败重投；
//! - 检查点与回放（`checkpoint`）：用于恢复与回填；
//! - 熔断（`breaker`）：持续消费失败时快速失败；
//! - 时间窗口聚合（`aggregate`）：按固定粒度累计计数与求和；
//! - 服务门面（`service`）：对外统一入口。
//!
//! 本 crate 只依赖日志存储端口（`store::LogStore`），内置的内存实现用于测试与本地开发，
//! 生产环境可对接任意具备消费组语义的追加日志服务。
//!
//! 典型用法：
//! 1. 选择 `LogStore` 实现并构建 `EventStreamService`；
//! 2. 生产方调用 `publish_event`；
//! 3. 每个实例在独立任务中运行 `consume_events`，处理器必须幂等；
//! 4. 需要时创建检查点，并在恢复/回填时 `replay_from_checkpoint`。
//!
pub mod aggregate;
pub mod breaker;
pub mod checkpoint;
pub mod config;
pub mod consumer;
pub mod error;
pub mod event;
pub mod publisher;
pub mod service;
pub mod store;

pub use error::{StreamError, StreamResult};
pub use service::{EventStreamService, StreamInfo};
