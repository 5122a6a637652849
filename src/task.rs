//! 后台任务与 "先等旧任务" 串行化闸门.

use std::thread::{self, JoinHandle};

/// 一个已在后台线程上运行的任务.
pub struct BackgroundTask<T> {
    handle: JoinHandle<T>,
}

impl<T: Send + 'static> BackgroundTask<T> {
    /// 在新线程上启动任务.
    pub fn spawn<F>(f: F) -> Self
    where
        F: FnOnce() -> T + Send + 'static,
    {
        Self {
            handle: thread::spawn(f),
        }
    }

    /// 阻塞等待任务结束并取出结果.
    ///
    /// 任务线程 panic 时, panic 在此处重新抛出.
    pub fn wait(self) -> T {
        self.handle.join().expect("后台任务 panic")
    }

    /// 任务是否已经结束 (不阻塞)?
    #[inline]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// 同一时刻最多容纳一个在途任务的串行化闸门.
///
/// 提交新任务前必须等待旧任务结束并取走其结果;
/// 在途任务从不被取消. 这保证了任务效果按提交顺序生效,
/// 代价是提交方可能被旧任务阻塞.
pub struct TaskGate<T> {
    pending: Option<BackgroundTask<T>>,
}

impl<T> Default for TaskGate<T> {
    fn default() -> Self {
        Self { pending: None }
    }
}

impl<T: Send + 'static> TaskGate<T> {
    /// 创建空闸门.
    pub fn new() -> Self {
        Self { pending: None }
    }

    /// 提交一个新任务.
    ///
    /// 若有在途任务, 先阻塞等待其结束并返回其结果 (`Some`);
    /// 随后才启动新任务. 无在途任务时返回 `None`.
    pub fn submit<F>(&mut self, f: F) -> Option<T>
    where
        F: FnOnce() -> T + Send + 'static,
    {
        let prior = self.pending.take().map(BackgroundTask::wait);
        self.pending = Some(BackgroundTask::spawn(f));
        prior
    }

    /// 等待在途任务 (若有) 结束并取出结果, 闸门随之清空.
    pub fn drain(&mut self) -> Option<T> {
        self.pending.take().map(BackgroundTask::wait)
    }

    /// 是否有在途任务?
    #[inline]
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }
}
