//! 在共享线程池上并发执行一组任务，并在全部完成、全部句柄释放或被中断时返回
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, LazyLock, Mutex};

use crossbeam_channel::{Receiver, Sender, TryRecvError, bounded, select, unbounded};
use log::{debug, error};
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::error::ImageResult;

static POOL: LazyLock<Arc<ThreadPool>> = LazyLock::new(|| {
    let pool = ThreadPoolBuilder::new()
        .num_threads(num_cpus::get())
        .thread_name(|i| format!("imsim-extract-{}", i))
        .build()
        .expect("failed to build thread pool");
    Arc::new(pool)
});

/// 进程内共享的特征提取线程池
pub fn shared_executor() -> Arc<dyn TaskExecutor> {
    POOL.clone()
}

/// 任务执行器，执行器可以延后执行或直接丢弃任务
pub trait TaskExecutor: Send + Sync {
    fn execute(&self, task: Box<dyn FnOnce() + Send + 'static>);
}

impl TaskExecutor for ThreadPool {
    fn execute(&self, task: Box<dyn FnOnce() + Send + 'static>) {
        self.spawn(task);
    }
}

/// 中断信号，一旦触发便保持触发状态
#[derive(Debug)]
pub struct Interrupt {
    tx: Mutex<Option<Sender<()>>>,
    rx: Receiver<()>,
}

impl Interrupt {
    pub fn new() -> Self {
        let (tx, rx) = bounded(0);
        Self { tx: Mutex::new(Some(tx)), rx }
    }

    pub fn interrupt(&self) {
        // 关闭发送端，等待中的 select 会立即返回
        if let Ok(mut tx) = self.tx.lock() {
            tx.take();
        }
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self.rx.try_recv(), Err(TryRecvError::Disconnected))
    }
}

impl Default for Interrupt {
    fn default() -> Self {
        Self::new()
    }
}

type Outcome<T> = (String, std::thread::Result<ImageResult<T>>);

/// 一组并发任务，结果通过 channel 汇总
pub struct TaskGroup<T> {
    executor: Arc<dyn TaskExecutor>,
    tx: Sender<Outcome<T>>,
    rx: Receiver<Outcome<T>>,
    spawned: usize,
}

impl<T: Send + 'static> TaskGroup<T> {
    pub fn new(executor: Arc<dyn TaskExecutor>) -> Self {
        let (tx, rx) = unbounded();
        Self { executor, tx, rx, spawned: 0 }
    }

    /// 提交任务，任务中的 panic 会被捕获并作为失败处理
    pub fn spawn<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: FnOnce() -> ImageResult<T> + Send + 'static,
    {
        let name = name.into();
        let tx = self.tx.clone();
        self.spawned += 1;
        self.executor.execute(Box::new(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(f));
            let _ = tx.send((name, outcome));
        }));
    }

    /// 等待任务结果，返回成功的部分
    ///
    /// 以下任一情况发生时停止等待：
    /// - 收到了全部任务的结果
    /// - 所有任务都已结束或被执行器丢弃
    /// - 中断信号被触发，此时不会取消仍在运行的任务
    pub fn join(self, interrupt: &Interrupt) -> Vec<T> {
        let Self { tx, rx, spawned, .. } = self;
        drop(tx);

        let mut results = vec![];
        let mut received = 0;
        while received < spawned {
            select! {
                recv(rx) -> outcome => match outcome {
                    Ok(outcome) => {
                        received += 1;
                        collect(outcome, &mut results);
                    }
                    Err(_) => {
                        debug!("任务句柄已全部释放，收到 {}/{} 个结果", received, spawned);
                        break;
                    }
                },
                recv(interrupt.rx) -> _ => {
                    debug!("等待任务时被中断，收到 {}/{} 个结果", received, spawned);
                    break;
                }
            }
        }
        // 保留中断前已经送达的结果
        for outcome in rx.try_iter() {
            collect(outcome, &mut results);
        }
        results
    }
}

fn collect<T>((name, outcome): Outcome<T>, results: &mut Vec<T>) {
    match outcome {
        Ok(Ok(value)) => results.push(value),
        Ok(Err(e)) => error!("任务 {} 失败: {}", name, e),
        Err(payload) => error!("任务 {} panic: {}", name, panic_message(&*payload)),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown"
    }
}
