#![deny(unsafe_code)]
#![doc = "beacon-core: 单值广播终止原语——一次写入、多路订阅、免锁扇出的并发契约核心。"]
#![doc = ""]
#![doc = "== 核心保证 =="]
#![doc = "1. 写一次：任意线程并发终止时恰好一个调用胜出，其余静默忽略；"]
#![doc = "2. 恰好一次：每个未被取消的订阅者（无论先于还是晚于终止注册）恰好收到一次终止通知；"]
#![doc = "3. 非阻塞取消：取消只做队列摘除，幂等且不留悬挂引用；"]
#![doc = "4. 失败隔离：订阅回调的失败（`Err` 或 panic）不中断对其余订阅者的派发，"]
#![doc = "   按“首个为主因、其余被抑制”聚合后上抛给触发派发的调用方。"]
#![doc = ""]
#![doc = "== 非目标 =="]
#![doc = "值变换组合（map/flatMap）、多值流背压、重试与超时策略均由上层组合实现，"]
#![doc = "本 crate 只提供竞态安全的扇出原语。"]

pub mod cancel;
pub mod error;
pub mod future;
pub mod processor;
mod queue;
pub mod score;

pub use cancel::DelayedCancel;
pub use error::{BeaconError, ErrorCause, Result, codes};
pub use future::TerminalFuture;
pub use processor::{BroadcastOnce, FnObserver, Subscription, TerminalObserver, TerminalSignal};
pub use queue::QueuePolicy;
pub use score::{ScoreSource, normalized_score};
