//! 事件处理器（EventHandler）
//!
//! 定义消费某类/多类/全部事件的处理逻辑与元信息（名称、订阅类型）。
//! 引擎提供至少一次投递，处理器必须幂等。
//!
use crate::event::Event;
use async_trait::async_trait;

#[derive(Clone, Debug)]
pub enum HandledEventType {
    One(String),
    Many(Vec<String>),
    /// 订阅配置中列出的全部类型
    All,
}

impl HandledEventType {
    /// 解析为具体的事件类型列表，`All` 使用 `subscriptions`
    pub fn resolve(&self, subscriptions: &[String]) -> Vec<String> {
        match self {
            Self::One(t) => vec![t.clone()],
            Self::Many(ts) => ts.clone(),
            Self::All => subscriptions.to_vec(),
        }
    }
}

/// 事件处理器：处理一条事件
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// 处理器名称（用于日志与错误定位）
    fn handler_name(&self) -> &str;

    /// 返回该处理器订阅的事件类型
    fn handled_event_type(&self) -> HandledEventType {
        HandledEventType::All
    }

    /// 处理事件
    async fn handle(&self, event: &Event) -> anyhow::Result<()>;
}
