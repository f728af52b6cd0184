//! # 尾沿节流模块
//!
//! ## 设计思路
//!
//! 拖拽 / 缩放每秒可能触发上百次状态更新，而光栅化相对昂贵。
//! 这里提供一个与业务无关的尾沿节流原语：
//!
//! - 距上次发射已超过间隔：立即发射（前沿）
//! - 仍在间隔内：只记住“最新一份”待发射值，并在间隔结束时补发一次（尾沿）
//!
//! 这样突发结束后，最后一次状态一定会被发射，不会停留在中途的旧帧。
//!
//! ## 实现思路
//!
//! 节流器本身不持有定时器，也不读系统时间：时间由调用方通过 `Clock` 注入，
//! 尾沿到期由调用方按 `next_deadline()` 驱动 `poll()`。
//! 测试可以用手动时钟得到完全确定的结果。

use std::time::{Duration, Instant};

/// 时间来源。
pub trait Clock {
    fn now(&self) -> Instant;
}

/// 读取 `Instant::now()` 的默认时钟。
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

fn throttle_remaining(elapsed: Duration, min_interval: Duration) -> Option<Duration> {
    if elapsed >= min_interval {
        None
    } else {
        Some(min_interval - elapsed)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum ThrottleDecision {
    EmitNow,
    Defer {
        remaining: Duration,
        schedule_trailing: bool,
    },
}

/// `elapsed` 为 `None` 表示从未发射过。
pub fn decide_throttle_action(
    elapsed: Option<Duration>,
    min_interval: Duration,
    trailing_scheduled: bool,
) -> ThrottleDecision {
    let Some(elapsed) = elapsed else {
        return ThrottleDecision::EmitNow;
    };

    match throttle_remaining(elapsed, min_interval) {
        Some(remaining) => ThrottleDecision::Defer {
            remaining,
            schedule_trailing: !trailing_scheduled,
        },
        None => ThrottleDecision::EmitNow,
    }
}

/// 尾沿节流状态机，`T` 为待发射的值，只保留最新一份。
#[derive(Debug)]
pub struct TrailingThrottle<T> {
    interval: Duration,
    last_emit_at: Option<Instant>,
    pending: Option<T>,
    deadline: Option<Instant>,
}

impl<T> TrailingThrottle<T> {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_emit_at: None,
            pending: None,
            deadline: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
        if let (Some(last), Some(_)) = (self.last_emit_at, self.deadline) {
            self.deadline = Some(last + interval);
        }
    }

    /// 提交一个新值；返回 `Some` 表示应立即发射。
    pub fn submit(&mut self, now: Instant, value: T) -> Option<T> {
        let elapsed = self
            .last_emit_at
            .map(|last| now.saturating_duration_since(last));

        match decide_throttle_action(elapsed, self.interval, self.deadline.is_some()) {
            ThrottleDecision::EmitNow => {
                self.last_emit_at = Some(now);
                self.pending = None;
                self.deadline = None;
                Some(value)
            }
            ThrottleDecision::Defer {
                remaining,
                schedule_trailing,
            } => {
                if schedule_trailing {
                    self.deadline = Some(now + remaining);
                }
                self.pending = Some(value);
                log::trace!(
                    "⏱️ 节流：{}ms 后尾沿补发",
                    remaining.as_millis()
                );
                None
            }
        }
    }

    /// 尾沿到期时取出待发射值。
    pub fn poll(&mut self, now: Instant) -> Option<T> {
        let deadline = self.deadline?;
        if now < deadline {
            return None;
        }
        self.take_pending(now)
    }

    /// 忽略间隔，立即取出待发射值（例如宿主即将持久化）。
    pub fn flush(&mut self, now: Instant) -> Option<T> {
        self.take_pending(now)
    }

    /// 丢弃待发射值，不影响下一次前沿判断。
    pub fn cancel(&mut self) -> Option<T> {
        self.deadline = None;
        self.pending.take()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    fn take_pending(&mut self, now: Instant) -> Option<T> {
        self.deadline = None;
        let value = self.pending.take()?;
        self.last_emit_at = Some(now);
        Some(value)
    }
}

/// 函数式封装：给定间隔与发射函数，保证突发结束后的最后一次调用一定发生。
pub struct Throttled<T, F>
where
    F: FnMut(T),
{
    throttle: TrailingThrottle<T>,
    sink: F,
}

impl<T, F> Throttled<T, F>
where
    F: FnMut(T),
{
    pub fn new(interval: Duration, sink: F) -> Self {
        Self {
            throttle: TrailingThrottle::new(interval),
            sink,
        }
    }

    pub fn call(&mut self, now: Instant, value: T) {
        if let Some(value) = self.throttle.submit(now, value) {
            (self.sink)(value);
        }
    }

    /// 返回本次是否发射。
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.throttle.poll(now) {
            Some(value) => {
                (self.sink)(value);
                true
            }
            None => false,
        }
    }

    pub fn flush(&mut self, now: Instant) -> bool {
        match self.throttle.flush(now) {
            Some(value) => {
                (self.sink)(value);
                true
            }
            None => false,
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.throttle.next_deadline()
    }
}
