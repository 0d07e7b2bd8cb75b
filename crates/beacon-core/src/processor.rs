use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};
use std::any::Any;
use std::borrow::Cow;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};

use crate::cancel::DelayedCancel;
use crate::error::{BeaconError, Result, codes};
use crate::queue::{PendingQueue, QueuePolicy};

/// 终止负载：成功值或失败原因，恰好写入一次。
///
/// # 契约说明（What）
/// - `Success(T)`：业务结果，多路派发时按 `T: Clone` 逐订阅者复制；
/// - `Failure(Arc<BeaconError>)`：业务级失败原因，所有订阅者共享同一错误对象；
/// - 一旦写入单元，变体与内容永不改变（写一次语义）。
#[derive(Clone, Debug)]
pub enum TerminalSignal<T> {
    /// 成功终止，携带业务值。
    Success(T),
    /// 失败终止，携带共享的失败原因。
    Failure(Arc<BeaconError>),
}

impl<T> TerminalSignal<T> {
    /// 是否为成功终止。
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// 借用成功值（若为成功终止）。
    pub fn success(&self) -> Option<&T> {
        match self {
            Self::Success(value) => Some(value),
            Self::Failure(_) => None,
        }
    }

    /// 借用失败原因（若为失败终止）。
    pub fn failure(&self) -> Option<&Arc<BeaconError>> {
        match self {
            Self::Success(_) => None,
            Self::Failure(cause) => Some(cause),
        }
    }
}

/// 终止观察者：订阅方提供的一对消费式回调。
///
/// # 设计背景（Why）
/// - 每个订阅者恰好收到一次终止通知，因此回调以 `Box<Self>` 消费自身，类型层面杜绝二次投递；
/// - 回调返回 [`Result`]，失败会被派发循环聚合上报而不是中断其余订阅者的通知；
///   panic 同样会被捕获并纳入聚合（见 [`BroadcastOnce`] 的派发契约）。
///
/// # 契约说明（What）
/// - **前置条件**：实现必须 `Send`，回调可能在生产者线程或任何迟到订阅线程上执行；
/// - **后置条件**：`on_success` 与 `on_error` 互斥，至多其中一个被调用一次。
pub trait TerminalObserver<T>: Send {
    /// 成功终止回调。
    fn on_success(self: Box<Self>, value: T) -> Result<()>;

    /// 失败终止回调。
    fn on_error(self: Box<Self>, cause: Arc<BeaconError>) -> Result<()>;
}

/// 将一对闭包适配为 [`TerminalObserver`]，便于测试与轻量调用方。
pub struct FnObserver<S, E> {
    on_success: S,
    on_error: E,
}

impl<S, E> FnObserver<S, E> {
    /// 由成功/失败闭包构造观察者。
    pub fn new(on_success: S, on_error: E) -> Self {
        Self {
            on_success,
            on_error,
        }
    }
}

impl<T, S, E> TerminalObserver<T> for FnObserver<S, E>
where
    S: FnOnce(T) -> Result<()> + Send,
    E: FnOnce(Arc<BeaconError>) -> Result<()> + Send,
{
    fn on_success(self: Box<Self>, value: T) -> Result<()> {
        (self.on_success)(value)
    }

    fn on_error(self: Box<Self>, cause: Arc<BeaconError>) -> Result<()> {
        (self.on_error)(cause)
    }
}

/// 订阅回执：取消令牌与本次订阅触发的派发结果。
///
/// # 契约说明（What）
/// - `cancel`：幂等取消，首次调用返回 `true`；在句柄已被派发或已被拒绝后取消均为无操作；
/// - `was_rejected`：容量策略拒绝本次订阅时为 `true`，此时拒绝错误已同步送达 `on_error`；
/// - `drain_failure`：迟到订阅触发的派发若存在回调失败，聚合错误在此暴露，绝不静默丢弃。
#[derive(Debug)]
pub struct Subscription {
    cancel: DelayedCancel,
    rejected: bool,
    drain_failure: Option<BeaconError>,
}

impl Subscription {
    fn new(cancel: DelayedCancel, rejected: bool, drain_failure: Option<BeaconError>) -> Self {
        Self {
            cancel,
            rejected,
            drain_failure,
        }
    }

    /// 取消本次订阅。返回 `true` 表示首次触发取消。
    ///
    /// 取消只负责把句柄从待通知队列摘除；与派发的竞争由队列的原子取出裁决——
    /// 摘除与派发恰好一方胜出，互斥且都不重复。
    pub fn cancel(&self) -> bool {
        self.cancel.cancel()
    }

    /// 查询令牌是否已被取消。
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// 本次订阅是否被容量策略拒绝。
    pub fn was_rejected(&self) -> bool {
        self.rejected
    }

    /// 借用本次订阅触发派发时产生的聚合失败（若有）。
    pub fn drain_failure(&self) -> Option<&BeaconError> {
        self.drain_failure.as_ref()
    }

    /// 取走聚合失败，便于调用方转交上层错误处理。
    pub fn take_drain_failure(&mut self) -> Option<BeaconError> {
        self.drain_failure.take()
    }
}

/// `BroadcastOnce` 是单值广播终止原语：同时扮演生产者（一次写入）与多播源（任意订阅）。
///
/// # 设计背景（Why）
/// - 任意数量的生产者与消费者线程可以在无外部锁的情况下并发调用写入与订阅；
/// - 原语必须保证：每订阅者至多一次终止通知、终止与新订阅竞速时不丢通知、
///   取消非阻塞且不留悬挂引用、订阅回调失败不破坏内部状态也不被吞掉。
///
/// # 逻辑解析（How）
/// - 终止单元使用 [`OnceLock`]：`set` 的成败即“谁赢得唯一一次写入”的裁决，
///   成功即建立对所有后续读取的 happens-before 边；
/// - 待通知订阅者存放于 FIFO 队列（见 [`QueuePolicy`]），终止线程与迟到订阅线程
///   都通过同一条“排空并通知”路径派发，从不绕过队列直接通知，以保证老订阅者
///   先于新订阅者收到通知；
/// - 排空路径不持有任何跨回调的锁：两个派发循环并发时各自原子地取走条目，
///   每个句柄恰好交给其中一个循环。跨循环的全局 FIFO 顺序不做承诺（与单循环内
///   的 FIFO 承诺相对），这是对免锁派发的既定放宽。
///
/// # 契约说明（What）
/// - `subscribe`：任何时刻可调用，终止之后的迟到订阅同样恰好收到一次通知；
/// - `complete_value` / `complete_error`：写一次，首个调用胜出，其余静默忽略；
/// - 生命周期：创建后永不“关闭”，最后一个引用释放时随所有权一起回收。
///
/// # 设计取舍与风险（Trade-offs）
/// - 同一派发循环内顺序通知意味着慢回调会延迟同循环中靠后的订阅者，
///   这是“简单顺序派发”换取“无锁扇出”的既定代价；生产者的写入本身永不被回调阻塞。
pub struct BroadcastOnce<T> {
    /// 写一次的终止单元；空即“未终止”哨兵。
    terminal: OnceLock<TerminalSignal<T>>,
    /// 待通知订阅者队列；取消动作经由 `Weak` 回指，不延长原语生命周期。
    pending: Arc<PendingQueue<Box<dyn TerminalObserver<T>>>>,
    /// 订阅身份分配器，id 仅用于队列内的幂等摘除。
    next_id: AtomicU64,
}

impl<T> BroadcastOnce<T> {
    /// 创建无界队列的广播原语。
    pub fn new() -> Self {
        Self::with_policy(QueuePolicy::Unbounded)
    }

    /// 按容量策略创建广播原语。
    pub fn with_policy(policy: QueuePolicy) -> Self {
        Self {
            terminal: OnceLock::new(),
            pending: Arc::new(PendingQueue::new(policy)),
            next_id: AtomicU64::new(0),
        }
    }

    /// 是否已写入终止负载。
    pub fn is_terminated(&self) -> bool {
        self.terminal.get().is_some()
    }

    /// 当前待通知订阅者数量，仅用于诊断与测试。
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

impl<T: Clone + 'static> BroadcastOnce<T> {
    /// 注册终止观察者，返回绑定取消令牌的订阅回执。
    ///
    /// # 执行步骤（How）
    /// 1. 先构造取消令牌：调用方在任何通知可能发生之前就持有取消能力，
    ///    同步取消的消费者不会与派发竞速（延迟绑定见 [`DelayedCancel`]）；
    /// 2. 尝试入队；容量策略拒绝时同步向该观察者投递一次
    ///    [`codes::SUBSCRIPTION_REJECTED`] 错误，句柄不入队；
    /// 3. 入队成功后复读终止单元：若已终止，走统一的排空路径派发
    ///    （绝不内联通知新句柄，保证与先到订阅者的 FIFO 相对顺序）；
    ///    若未终止，绑定“从队列摘除自身”的取消动作。
    ///
    /// # 契约说明（What）
    /// - **后置条件**：除被取消先于派发的情形外，观察者最终恰好收到一次终止通知；
    ///   取消与派发的竞争由队列原子取出裁决，两种结局互斥且均合法。
    pub fn subscribe<O>(&self, observer: O) -> Subscription
    where
        O: TerminalObserver<T> + 'static,
    {
        let token = DelayedCancel::new();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        match self.pending.offer(id, Box::new(observer)) {
            Err(observer) => {
                tracing::debug!(
                    code = codes::SUBSCRIPTION_REJECTED,
                    "待通知队列已达容量上限，同步拒绝新订阅"
                );
                let cause = Arc::new(BeaconError::new(
                    codes::SUBSCRIPTION_REJECTED,
                    "待通知队列已达容量上限，订阅被拒绝",
                ));
                let mut failures = FailureAccumulator::default();
                deliver(observer, &TerminalSignal::Failure(cause), &mut failures);
                Subscription::new(token, true, failures.finish())
            }
            Ok(()) => match self.terminal.get() {
                Some(signal) => {
                    let drain_failure = self.drain(signal);
                    Subscription::new(token, false, drain_failure)
                }
                None => {
                    let queue = Arc::downgrade(&self.pending);
                    token.bind(Box::new(move || {
                        if let Some(queue) = queue.upgrade() {
                            queue.remove(id);
                        }
                    }));
                    Subscription::new(token, false, None)
                }
            },
        }
    }

    /// 闭包便捷订阅：等价于 `subscribe(FnObserver::new(on_success, on_error))`。
    pub fn subscribe_fn<S, E>(&self, on_success: S, on_error: E) -> Subscription
    where
        S: FnOnce(T) -> Result<()> + Send + 'static,
        E: FnOnce(Arc<BeaconError>) -> Result<()> + Send + 'static,
    {
        self.subscribe(FnObserver::new(on_success, on_error))
    }

    /// 以成功值终止。写一次：首个终止调用胜出，其余静默忽略。
    ///
    /// 返回 `Err` 仅代表派发阶段存在订阅回调失败（聚合后上抛），
    /// 写入本身永不失败、永不阻塞。
    pub fn complete_value(&self, value: T) -> Result<()> {
        self.terminate(TerminalSignal::Success(value))
    }

    /// 以失败原因终止。失败原因是业务级结果，按成功值同样的路径派发给所有订阅者。
    pub fn complete_error(&self, cause: BeaconError) -> Result<()> {
        self.terminate(TerminalSignal::Failure(Arc::new(cause)))
    }

    /// 读取终止负载的副本（未终止时为 `None`）。
    pub fn terminal(&self) -> Option<TerminalSignal<T>> {
        self.terminal.get().cloned()
    }

    fn terminate(&self, signal: TerminalSignal<T>) -> Result<()> {
        // `OnceLock::set` 即写一次裁决：败者的负载在此原地丢弃，不发生任何克隆。
        if self.terminal.set(signal).is_err() {
            return Ok(());
        }
        // 胜出后单元永不回退为空，复读必然命中刚写入的负载。
        let Some(signal) = self.terminal.get() else {
            return Ok(());
        };
        match self.drain(signal) {
            Some(failure) => Err(failure),
            None => Ok(()),
        }
    }

    /// 排空并通知：反复取出队首句柄并投递终止通知，直到队列为空。
    ///
    /// 回调失败（`Err` 返回或 panic）不允许中断循环；全部失败按
    /// “首个为主因、其余被抑制”聚合，循环结束后一次性上抛给触发方。
    fn drain(&self, signal: &TerminalSignal<T>) -> Option<BeaconError> {
        let mut failures = FailureAccumulator::default();
        while let Some(observer) = self.pending.poll() {
            deliver(observer, signal, &mut failures);
        }
        failures.finish()
    }
}

impl<T> Default for BroadcastOnce<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for BroadcastOnce<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BroadcastOnce")
            .field("terminated", &self.is_terminated())
            .field("pending", &self.pending.len())
            .finish()
    }
}

/// 向单个观察者投递终止通知，隔离其失败。
///
/// panic 经 `catch_unwind` 捕获并转写为 [`codes::CALLBACK_PANICKED`] 错误，
/// 与 `Err` 返回走同一聚合通道；队列与终止单元对回调失败保持免疫。
fn deliver<T: Clone>(
    observer: Box<dyn TerminalObserver<T>>,
    signal: &TerminalSignal<T>,
    failures: &mut FailureAccumulator,
) {
    let outcome = match signal {
        TerminalSignal::Success(value) => {
            let value = value.clone();
            panic::catch_unwind(AssertUnwindSafe(move || observer.on_success(value)))
        }
        TerminalSignal::Failure(cause) => {
            let cause = Arc::clone(cause);
            panic::catch_unwind(AssertUnwindSafe(move || observer.on_error(cause)))
        }
    };
    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(failure)) => failures.record(failure),
        Err(payload) => failures.record(panic_failure(payload)),
    }
}

fn panic_failure(payload: Box<dyn Any + Send>) -> BeaconError {
    let detail: Cow<'static, str> = if let Some(text) = payload.downcast_ref::<&'static str>() {
        Cow::Borrowed(*text)
    } else if let Some(text) = payload.downcast_ref::<String>() {
        Cow::Owned(text.clone())
    } else {
        Cow::Borrowed("非字符串 panic 负载")
    };
    BeaconError::new(
        codes::CALLBACK_PANICKED,
        format!("订阅回调 panic: {detail}"),
    )
}

/// 派发循环的失败累加器：记录顺序即“主因在前、其余被抑制”的聚合顺序。
#[derive(Default)]
struct FailureAccumulator {
    failures: Vec<BeaconError>,
}

impl FailureAccumulator {
    fn record(&mut self, failure: BeaconError) {
        tracing::warn!(
            code = failure.code(),
            error = %failure,
            "订阅回调在终止派发中失败，继续通知其余订阅者"
        );
        self.failures.push(failure);
    }

    fn finish(mut self) -> Option<BeaconError> {
        if self.failures.is_empty() {
            return None;
        }
        let rest = self.failures.split_off(1);
        let first = self.failures.pop()?;
        let mut aggregate = BeaconError::new(
            codes::DELIVERY_FAILED,
            "终止派发已覆盖全部待通知订阅者，但存在回调失败",
        )
        .with_cause(first);
        for extra in rest {
            aggregate.push_suppressed(extra);
        }
        Some(aggregate)
    }
}
