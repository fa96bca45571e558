//! 熔断器（CircuitBreaker）
//!
//! 消费失败持续发生时快速失败，冷却后以半开状态试探恢复：
//! - Closed：正常消费，连续失败达到阈值后熔断；
//! - Open：拒绝认领新批次，冷却结束后由 `allow` 转入半开；
//! - HalfOpen：放行下一次处理，成功则闭合，失败则重新熔断并重新计时。
//!
//! 熔断器不感知流与消费组，可在任意消费循环间复用；状态由单个互斥锁保护。
//!
use crate::config::BreakerConfig;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
            }),
        }
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// 是否允许继续消费；冷却结束时在此处转入半开
    pub fn allow(&self) -> bool {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let cooled = inner
                    .opened_at
                    .is_none_or(|at| at.elapsed() >= self.config.cooldown);
                if cooled {
                    inner.state = CircuitState::HalfOpen;
                    tracing::info!("circuit breaker half-open, probing next batch");
                }
                cooled
            }
        }
    }

    /// 记录一次成功；熔断期间到达的成功不改变状态，只能经冷却后的半开试探闭合
    pub fn record_success(&self) {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => inner.consecutive_failures = 0,
            CircuitState::HalfOpen => {
                inner.consecutive_failures = 0;
                inner.state = CircuitState::Closed;
                inner.opened_at = None;
                tracing::info!("circuit breaker closed after successful probe");
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        match inner.state {
            CircuitState::HalfOpen => {
                Self::trip(&mut inner);
                tracing::warn!("circuit breaker reopened after failed probe");
            }
            CircuitState::Closed if inner.consecutive_failures >= self.config.threshold => {
                Self::trip(&mut inner);
                tracing::warn!(
                    failures = inner.consecutive_failures,
                    threshold = self.config.threshold,
                    "circuit breaker opened"
                );
            }
            // 已熔断时保持原计时，避免持续失败无限推迟恢复
            _ => {}
        }
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// 当前连续失败次数
    pub fn failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    fn trip(inner: &mut BreakerState) {
        inner.state = CircuitState::Open;
        inner.opened_at = Some(Instant::now());
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
