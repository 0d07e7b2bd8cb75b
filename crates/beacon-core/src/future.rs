use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll, Waker};
use std::sync::Arc;

use spin::Mutex;

use crate::error::BeaconError;
use crate::processor::{BroadcastOnce, Subscription};

/// Future 与观察者共享的结果槽：结果与 waker 共用一把自旋锁，临界区为字段交换级别。
struct FutureSlot<T> {
    state: Mutex<SlotState<T>>,
}

struct SlotState<T> {
    outcome: Option<Result<T, Arc<BeaconError>>>,
    waker: Option<Waker>,
}

impl<T> FutureSlot<T> {
    fn empty() -> Self {
        Self {
            state: Mutex::new(SlotState {
                outcome: None,
                waker: None,
            }),
        }
    }

    /// 写入结果并唤醒等待方。waker 在锁外触发，避免持锁执行外部代码。
    fn resolve(&self, outcome: Result<T, Arc<BeaconError>>) {
        let waker = {
            let mut guard = self.state.lock();
            guard.outcome = Some(outcome);
            guard.waker.take()
        };
        if let Some(waker) = waker {
            waker.wake();
        }
    }
}

/// `TerminalFuture` 把一次订阅桥接为标准库 [`Future`]。
///
/// # 设计背景（Why）
/// - 广播原语对协作方呈现为“类 Future 的单结果容器”，异步调用方自然期望 `await` 语法；
/// - 桥接只是订阅契约的包装：注册一个向共享槽写结果并唤醒 waker 的观察者，
///   不引入任何新的并发语义。
///
/// # 契约说明（What）
/// - 输出为 `Result<T, Arc<BeaconError>>`，与终止负载一一对应；
/// - 对已终止原语的桥接立即就绪（迟到订阅语义）；
/// - **Drop 语义**：未完成时丢弃 Future 会取消底层订阅，不留悬挂句柄；
/// - 结果就绪并交付后不得再次 `poll`（标准 Future 契约）。
pub struct TerminalFuture<T> {
    slot: Arc<FutureSlot<T>>,
    subscription: Subscription,
}

impl<T> TerminalFuture<T> {
    /// 访问底层订阅回执（例如检查迟到派发的聚合失败）。
    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }
}

impl<T> Future for TerminalFuture<T> {
    type Output = Result<T, Arc<BeaconError>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut guard = self.slot.state.lock();
        if let Some(outcome) = guard.outcome.take() {
            return Poll::Ready(outcome);
        }
        guard.waker = Some(cx.waker().clone());
        Poll::Pending
    }
}

impl<T> Drop for TerminalFuture<T> {
    fn drop(&mut self) {
        // 幂等取消：已派发或已取消时为无操作。
        self.subscription.cancel();
    }
}

impl<T> BroadcastOnce<T>
where
    T: Clone + Send + 'static,
{
    /// 注册一个 waker 支撑的订阅并返回可 `await` 的 Future。
    pub fn subscribe_future(&self) -> TerminalFuture<T> {
        let slot = Arc::new(FutureSlot::empty());
        let on_success = {
            let slot = Arc::clone(&slot);
            move |value: T| {
                slot.resolve(Ok(value));
                Ok(())
            }
        };
        let on_error = {
            let slot = Arc::clone(&slot);
            move |cause: Arc<BeaconError>| {
                slot.resolve(Err(cause));
                Ok(())
            }
        };
        let subscription = self.subscribe_fn(on_success, on_error);
        TerminalFuture { slot, subscription }
    }
}
