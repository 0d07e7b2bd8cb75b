use spin::Mutex;

/// 取消动作：由订阅路径在入队完成后绑定，负责把订阅者句柄从待通知队列中摘除。
pub(crate) type CancelAction = Box<dyn FnOnce() + Send>;

/// 延迟绑定的内部状态：取消标记与尚未执行的取消动作共用一把自旋锁保护。
#[derive(Default)]
struct DelayedCancelState {
    cancelled: bool,
    action: Option<CancelAction>,
}

/// `DelayedCancel` 是“先发放、后绑定”的取消令牌。
///
/// # 设计背景（Why）
/// - 订阅方必须在任何通知可能发生之前就持有取消能力，否则同步取消的消费者会与派发竞速、
///   留下无法回收的队列引用；
/// - 令牌创建与动作绑定因此被拆成两步：`subscribe` 先构造令牌交给调用方，入队成功后再通过
///   [`bind`](Self::bind) 安装真正的摘除动作。
///
/// # 逻辑解析（How）
/// - `cancel` 在首次调用时置位取消标记并取走已绑定的动作，在锁外执行，保证回调不会在持锁
///   状态下运行；
/// - `bind` 发现令牌已被提前取消时立即执行动作，补上“先取消、后绑定”窗口内错过的摘除；
/// - 两条路径都只持锁做字段交换，临界区为 O(1)。
///
/// # 契约说明（What）
/// - **前置条件**：每个令牌至多绑定一个动作；
/// - **后置条件**：无论调用顺序如何，动作至多执行一次；`cancel` 首次调用返回 `true`，
///   后续调用返回 `false`，与取消动作是否真正摘除了句柄无关（句柄可能已被派发取走，
///   此时摘除为无操作）；
/// - **线程安全**：所有方法可被任意线程并发调用，互不阻塞 OS 调度。
///
/// # 设计取舍与风险（Trade-offs）
/// - 自旋锁足以覆盖字段交换级别的临界区；若未来动作本身变重，应保持“锁外执行”的纪律不变。
#[derive(Default)]
pub struct DelayedCancel {
    state: Mutex<DelayedCancelState>,
}

impl DelayedCancel {
    /// 创建处于“未取消、未绑定”状态的令牌。
    pub fn new() -> Self {
        Self::default()
    }

    /// 查询当前是否已被标记取消。
    pub fn is_cancelled(&self) -> bool {
        self.state.lock().cancelled
    }

    /// 将令牌标记为取消，并执行已绑定的摘除动作（若有）。
    ///
    /// 返回 `true` 表示本次调用首次触发取消；返回 `false` 表示之前已被取消。
    /// 重复调用与在句柄派发之后调用均为安全的无操作。
    pub fn cancel(&self) -> bool {
        let action = {
            let mut guard = self.state.lock();
            if guard.cancelled {
                return false;
            }
            guard.cancelled = true;
            guard.action.take()
        };
        if let Some(run) = action {
            run();
        }
        true
    }

    /// 绑定取消动作。若令牌已被提前取消，动作立即在当前线程执行。
    ///
    /// # 契约说明（What）
    /// - **前置条件**：同一令牌不得绑定第二个动作；调试构建下重复绑定触发断言。
    pub(crate) fn bind(&self, action: CancelAction) {
        let run_now = {
            let mut guard = self.state.lock();
            if guard.cancelled {
                Some(action)
            } else {
                debug_assert!(guard.action.is_none(), "取消动作只允许绑定一次");
                guard.action = Some(action);
                None
            }
        };
        if let Some(run) = run_now {
            run();
        }
    }
}

impl core::fmt::Debug for DelayedCancel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let guard = self.state.lock();
        f.debug_struct("DelayedCancel")
            .field("cancelled", &guard.cancelled)
            .field("bound", &guard.action.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn cancel_after_bind_runs_action_exactly_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        let token = DelayedCancel::new();
        let hits = Arc::clone(&counter);
        token.bind(Box::new(move || {
            hits.fetch_add(1, Ordering::SeqCst);
        }));

        assert!(token.cancel(), "首次取消应返回 true");
        assert!(!token.cancel(), "重复取消应返回 false，幂等语义");
        assert_eq!(counter.load(Ordering::SeqCst), 1, "动作必须恰好执行一次");
        assert!(token.is_cancelled());
    }

    #[test]
    fn cancel_before_bind_fires_action_at_bind_time() {
        let counter = Arc::new(AtomicUsize::new(0));
        let token = DelayedCancel::new();
        assert!(token.cancel(), "先于绑定的取消应当成功");

        let hits = Arc::clone(&counter);
        token.bind(Box::new(move || {
            hits.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(
            counter.load(Ordering::SeqCst),
            1,
            "绑定时必须补执行先前错过的取消动作"
        );
    }

    #[test]
    fn uncancelled_token_never_runs_action() {
        let counter = Arc::new(AtomicUsize::new(0));
        let token = DelayedCancel::new();
        let hits = Arc::clone(&counter);
        token.bind(Box::new(move || {
            hits.fetch_add(1, Ordering::SeqCst);
        }));
        assert!(!token.is_cancelled());
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
