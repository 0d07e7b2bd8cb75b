#![cfg(any(loom, beacon_loom))]
//! 广播终止原语核心竞态的 Loom 模型。
//!
//! # 教案级导览
//!
//! - **核心目标 (Why)**：穷举三类关键竞态的全部调度交错——终止写入的写一次裁决、
//!   取消与派发对同一句柄的互斥、以及“订阅与终止竞速不丢通知”。
//! - **设计手法 (Why)**：与生产代码同构的极简影子状态机（生产实现的终止单元是
//!   `OnceLock`、队列受互斥锁保护，二者 Loom 无法直接建模），以原子操作重建
//!   同等的同步拓扑后交由 `loom::model` 穷举。
//! - **边界 (What)**：模型只验证同步骨架；回调聚合等单线程逻辑由常规测试覆盖。

use loom::{
    model,
    sync::{
        Arc,
        atomic::{AtomicU8, AtomicUsize, Ordering},
    },
    thread,
};

const EMPTY: u8 = 0;
const WRITING: u8 = 1;
const SET: u8 = 2;

/// 写一次终止单元的影子：CAS 声明所有权，负载写入后以 Release 发布。
struct TerminalCellModel {
    flag: AtomicU8,
    slot: AtomicUsize,
}

impl TerminalCellModel {
    fn new() -> Self {
        Self {
            flag: AtomicU8::new(EMPTY),
            slot: AtomicUsize::new(0),
        }
    }

    fn try_write(&self, payload: usize) -> bool {
        if self
            .flag
            .compare_exchange(EMPTY, WRITING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        self.slot.store(payload, Ordering::Relaxed);
        self.flag.store(SET, Ordering::Release);
        true
    }

    fn read(&self) -> Option<usize> {
        if self.flag.load(Ordering::Acquire) == SET {
            Some(self.slot.load(Ordering::Relaxed))
        } else {
            None
        }
    }
}

/// ## 模型一：并发终止的写一次裁决
///
/// - **Why**：两个生产者同时写入时，必须恰好一个胜出，且胜者的负载对后续读取可见。
/// - **How**：两个线程分别尝试写入 11 与 22，Loom 穷举交错后断言恰好一方成功，
///   主线程读到的负载与胜者一致。
#[test]
fn terminal_write_once_has_exactly_one_winner() {
    model(|| {
        let cell = Arc::new(TerminalCellModel::new());

        let first = {
            let cell = Arc::clone(&cell);
            thread::spawn(move || cell.try_write(11))
        };
        let second = {
            let cell = Arc::clone(&cell);
            thread::spawn(move || cell.try_write(22))
        };

        let first_won = first.join().expect("写入线程不应 panic");
        let second_won = second.join().expect("写入线程不应 panic");
        assert!(
            first_won ^ second_won,
            "写一次语义：两个写入者必须恰好一方胜出"
        );

        let payload = cell.read().expect("竞争结束后负载必须可见");
        let expected = if first_won { 11 } else { 22 };
        assert_eq!(payload, expected, "可见负载必须来自胜出写入者");
    });
}

const QUEUED: u8 = 0;
const REMOVED: u8 = 1;
const DELIVERED: u8 = 2;

/// ## 模型二：取消与派发对同一句柄的互斥
///
/// - **Why**：取消的摘除与派发的取出竞争同一队列条目时，恰好一方胜出，
///   既不双重通知也不残留句柄。
/// - **How**：以三态原子模拟条目占位（在队 / 已摘除 / 已派发），
///   两个线程分别尝试 `QUEUED -> REMOVED` 与 `QUEUED -> DELIVERED` 的比较交换。
#[test]
fn cancel_and_drain_settle_exclusively() {
    model(|| {
        let entry = Arc::new(AtomicU8::new(QUEUED));

        let canceller = {
            let entry = Arc::clone(&entry);
            thread::spawn(move || {
                entry
                    .compare_exchange(QUEUED, REMOVED, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
            })
        };
        let drainer = {
            let entry = Arc::clone(&entry);
            thread::spawn(move || {
                entry
                    .compare_exchange(QUEUED, DELIVERED, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
            })
        };

        let removed = canceller.join().expect("取消线程不应 panic");
        let delivered = drainer.join().expect("派发线程不应 panic");
        assert!(removed ^ delivered, "摘除与派发必须恰好一方胜出");
        assert_ne!(
            entry.load(Ordering::Acquire),
            QUEUED,
            "竞争结束后条目不得仍处于在队状态"
        );
    });
}

/// ## 模型三：订阅与终止竞速不丢通知
///
/// - **Why**：原语的核心保证之一——终止与新订阅竞速时通知不得丢失：
///   订阅方入队后复读终止标记，发现已终止时自行触发排空。
/// - **How**：`present` 模拟句柄在队占位，`terminal` 模拟终止标记；
///   两条路径均以 SeqCst 总序建模（生产实现中该次序由队列互斥锁的
///   synchronizes-with 边提供）：若终止方的排空先于入队而扑空，
///   订阅方必然在复读时观察到终止标记并接手派发。
#[test]
fn subscribe_terminate_race_never_loses_delivery() {
    model(|| {
        let present = Arc::new(AtomicU8::new(0));
        let terminal = Arc::new(AtomicU8::new(0));
        let delivered = Arc::new(AtomicUsize::new(0));

        let drain = |present: &AtomicU8, delivered: &AtomicUsize| {
            if present
                .compare_exchange(1, 2, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                delivered.fetch_add(1, Ordering::SeqCst);
            }
        };

        let subscriber = {
            let present = Arc::clone(&present);
            let terminal = Arc::clone(&terminal);
            let delivered = Arc::clone(&delivered);
            thread::spawn(move || {
                present.store(1, Ordering::SeqCst);
                if terminal.load(Ordering::SeqCst) == 1 {
                    drain(&present, &delivered);
                }
            })
        };
        let terminator = {
            let present = Arc::clone(&present);
            let terminal = Arc::clone(&terminal);
            let delivered = Arc::clone(&delivered);
            thread::spawn(move || {
                terminal.store(1, Ordering::SeqCst);
                drain(&present, &delivered);
            })
        };

        subscriber.join().expect("订阅线程不应 panic");
        terminator.join().expect("终止线程不应 panic");
        assert_eq!(
            delivered.load(Ordering::SeqCst),
            1,
            "任意交错下句柄必须恰好被派发一次，绝不丢失"
        );
    });
}
