use core::num::NonZeroUsize;
use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use spin::Mutex;

/// 待通知队列的容量策略，属于部署层面的可配置项。
///
/// # 设计背景（Why）
/// - 广播原语在概念上是无界的，但实际部署可能需要为待通知订阅者设置上限，
///   防止失控的订阅方耗尽内存；
/// - 策略随配置下发，因此提供 serde 序列化能力，与框架其余配置面保持一致。
///
/// # 契约说明（What）
/// - `Unbounded`：默认值，队列永不拒绝；
/// - `Bounded { capacity }`：队列长度达到 `capacity` 时拒绝新订阅，容量使用
///   [`NonZeroUsize`] 在类型层面排除零容量配置。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum QueuePolicy {
    /// 无界队列：任何订阅都会被接纳。
    #[default]
    Unbounded,
    /// 有界队列：长度到达上限后拒绝新订阅。
    Bounded {
        /// 待通知订阅者数量上限。
        capacity: NonZeroUsize,
    },
}

impl QueuePolicy {
    /// 构造有界策略的便捷入口。
    pub fn bounded(capacity: NonZeroUsize) -> Self {
        Self::Bounded { capacity }
    }

    /// 判断在当前长度下是否还能接纳一个新条目。
    fn admits(&self, len: usize) -> bool {
        match self {
            Self::Unbounded => true,
            Self::Bounded { capacity } => len < capacity.get(),
        }
    }
}

/// 线程安全的 FIFO 待通知队列，支持按身份幂等摘除。
///
/// # 设计背景（Why）
/// - 订阅者在终止之前暂存于此；终止线程与“迟到订阅发现已终止”的线程都会以
///   `poll` 竞争条目，每个条目恰好被其中一个派发循环取走；
/// - 正确性只依赖三点：并发 `offer`/`poll`/`remove` 的线程安全、FIFO 的出队顺序、
///   按 id 摘除的幂等性——不要求免锁实现，粗粒度互斥即可（临界区为队列操作本身，
///   绝不跨越任何订阅回调）。
///
/// # 契约说明（What）
/// - 条目以单调递增的 `u64` id 标识身份；同一 id 至多入队一次；
/// - `remove` 摘除已被 `poll` 取走或已被摘除的 id 是无操作，返回 `false`；
/// - `offer` 在容量策略拒绝时原样退还条目，调用方据此同步报告拒绝错误。
pub(crate) struct PendingQueue<E> {
    policy: QueuePolicy,
    entries: Mutex<VecDeque<(u64, E)>>,
}

impl<E> PendingQueue<E> {
    pub(crate) fn new(policy: QueuePolicy) -> Self {
        Self {
            policy,
            entries: Mutex::new(VecDeque::new()),
        }
    }

    /// 尝试入队；容量耗尽时通过 `Err` 退还条目所有权。
    pub(crate) fn offer(&self, id: u64, entry: E) -> Result<(), E> {
        let mut guard = self.entries.lock();
        if !self.policy.admits(guard.len()) {
            return Err(entry);
        }
        guard.push_back((id, entry));
        Ok(())
    }

    /// 按 FIFO 顺序取走下一个条目。
    pub(crate) fn poll(&self) -> Option<E> {
        self.entries.lock().pop_front().map(|(_, entry)| entry)
    }

    /// 按身份摘除条目。幂等：目标不存在时返回 `false`。
    pub(crate) fn remove(&self, id: u64) -> bool {
        let mut guard = self.entries.lock();
        match guard.iter().position(|(entry_id, _)| *entry_id == id) {
            Some(index) => {
                guard.remove(index);
                true
            }
            None => false,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }
}
