use core::fmt;
use std::borrow::Cow;
use std::error::Error;

/// `ErrorCause` 封装底层原因，保持 `Send + Sync` 以方便跨线程传递。
pub type ErrorCause = Box<dyn Error + Send + Sync + 'static>;

/// `Result` 为本 crate 统一的返回值别名，默认错误类型为 [`BeaconError`]。
///
/// # 设计意图（Why）
/// - 终止派发、订阅拒绝等失败路径共享同一个错误封装模型，便于日志与指标聚合时直接识别错误域；
/// - 避免在各处重复书写 `Result<_, BeaconError>` 样板代码。
///
/// # 契约说明（What）
/// - 与标准库 `Result` 行为完全一致，可直接与 `?` 运算符、模式匹配协同工作；
/// - 若调用方需要返回自定义错误，可在第二个泛型参数中显式指定。
pub type Result<T, E = BeaconError> = core::result::Result<T, E>;

/// `BeaconError` 是广播原语跨线程共享的稳定错误域。
///
/// # 设计背景（Why）
/// - 订阅回调失败、队列容量拒绝等故障需要合流为统一的错误码，以便日志、指标与告警系统执行精确治理；
/// - 派发循环要求“首个失败为主因、其余作为被抑制的次要原因”，因此在单一原因链之外额外维护
///   `suppressed` 列表，保证任何一个订阅者的失败都不会被静默吞掉。
///
/// # 逻辑解析（How）
/// - 结构体以 Builder 风格方法叠加上下文信息（底层原因、被抑制的次要失败），并通过 `source()`
///   暴露完整链路；
/// - 错误码 `code` 始终为 `'static` 字符串，承载稳定语义；`message` 面向排障人员。
///
/// # 契约说明（What）
/// - **前置条件**：调用方必须使用 [`codes`] 模块或遵循 `<域>.<语义>` 约定的自定义码值；
/// - **返回值**：构造函数返回拥有所有权的 `BeaconError`，可安全跨线程移动（`Send + Sync + 'static`）；
/// - **后置条件**：除非显式调用 `with_*` 方法，错误不会包含额外上下文。
///
/// # 设计取舍与风险（Trade-offs）
/// - 采用 `Cow` 保存消息，静态文案零分配，动态描述仅一次堆分配；
/// - `suppressed` 列表仅在派发聚合场景填充，普通错误保持空向量，无额外开销。
#[derive(Debug)]
pub struct BeaconError {
    code: &'static str,
    message: Cow<'static, str>,
    cause: Option<ErrorCause>,
    suppressed: Vec<BeaconError>,
}

impl BeaconError {
    /// 使用稳定错误码与消息构造错误。
    ///
    /// # 契约说明（What）
    /// - `code`：遵循 `<领域>.<语义>` 约定的稳定错误码；
    /// - `message`：面向排障人员的自然语言描述，可为 `&'static str` 或堆分配字符串；
    /// - **后置条件**：返回的错误不含底层原因与被抑制失败，需要时通过 Builder 方法补充。
    pub fn new(code: &'static str, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code,
            message: message.into(),
            cause: None,
            suppressed: Vec::new(),
        }
    }

    /// 附带一个底层原因，形成错误链。
    pub fn with_cause(mut self, cause: impl Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// 附带一个被抑制的次要失败并返回新错误。
    ///
    /// # 设计意图（Why）
    /// - 派发循环不允许单个订阅者的失败中断对其余订阅者的通知，因此首个失败作为主因
    ///   （见 [`with_cause`](Self::with_cause)），后续失败经由本方法附加，保证全部失败可追溯。
    pub fn with_suppressed(mut self, failure: BeaconError) -> Self {
        self.suppressed.push(failure);
        self
    }

    /// 就地追加被抑制的次要失败。
    pub fn push_suppressed(&mut self, failure: BeaconError) {
        self.suppressed.push(failure);
    }

    /// 获取稳定错误码，供日志聚合或自动化策略使用。
    pub fn code(&self) -> &'static str {
        self.code
    }

    /// 获取人类可读的错误描述。
    pub fn message(&self) -> &str {
        &self.message
    }

    /// 获取可选的底层原因。
    pub fn cause(&self) -> Option<&ErrorCause> {
        self.cause.as_ref()
    }

    /// 遍历被抑制的次要失败，按记录顺序返回。
    pub fn suppressed(&self) -> &[BeaconError] {
        &self.suppressed
    }
}

impl fmt::Display for BeaconError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if !self.suppressed.is_empty() {
            write!(f, " (+{} suppressed)", self.suppressed.len())?;
        }
        Ok(())
    }
}

impl Error for BeaconError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause
            .as_ref()
            .map(|cause| cause.as_ref() as &(dyn Error + 'static))
    }
}

/// 广播原语的稳定错误码集合。
///
/// # 设计背景（Why）
/// - 错误码遵循 `<领域>.<语义>` 命名约定，方便在跨组件日志中检索与聚合；
/// - 容量拒绝、回调 panic、派发聚合是本原语仅有的三类自身故障，其余“失败”都属于
///   业务层的终止负载，按成功值同样的路径派发。
///
/// # 契约说明（What）
/// - **使用前提**：错误码应封装进 [`BeaconError`] 并在日志、度量中携带完整上下文；
/// - **返回承诺**：调用方收到这些错误码后，可据此触发补救措施（扩容队列、隔离失败订阅者等）。
pub mod codes {
    /// 待通知队列已达容量上限，新订阅被拒绝。仅同步报告给该订阅者本身，不影响生产者。
    pub const SUBSCRIPTION_REJECTED: &str = "broadcast.subscription_rejected";
    /// 订阅回调在派发过程中 panic，负载文本已尽力恢复。
    pub const CALLBACK_PANICKED: &str = "broadcast.callback_panicked";
    /// 派发聚合错误：一个或多个订阅回调失败，首个失败为 `cause`，其余在 `suppressed` 中。
    pub const DELIVERY_FAILED: &str = "broadcast.delivery_failed";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_carries_code_message_and_chain() {
        let inner = BeaconError::new(codes::CALLBACK_PANICKED, "订阅者 B 崩溃");
        let aggregate = BeaconError::new(codes::DELIVERY_FAILED, "派发完成但存在失败")
            .with_cause(inner)
            .with_suppressed(BeaconError::new(codes::CALLBACK_PANICKED, "订阅者 D 崩溃"));

        assert_eq!(aggregate.code(), codes::DELIVERY_FAILED);
        assert!(aggregate.cause().is_some(), "主因必须保留在错误链上");
        assert_eq!(aggregate.suppressed().len(), 1, "次要失败必须可枚举");
        assert!(
            aggregate.to_string().contains("+1 suppressed"),
            "Display 输出应提示被抑制失败的数量"
        );
    }

    #[test]
    fn source_exposes_underlying_cause() {
        let err = BeaconError::new(codes::DELIVERY_FAILED, "聚合失败")
            .with_cause(BeaconError::new(codes::CALLBACK_PANICKED, "根因"));
        let source = std::error::Error::source(&err).expect("source 必须返回底层原因");
        assert!(source.to_string().contains("根因"));
    }
}
