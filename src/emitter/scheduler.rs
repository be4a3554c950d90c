//! Отложенное выполнение обработчиков.
//!
//! `emit` никогда не вызывает обработчики сам: каждая порция работы
//! передаётся планировщику и выполняется позже, в порядке постановки.
//!
//! - [`TokioScheduler`] — очередь, которую разбирает отдельная задача Tokio;
//! - [`QueueScheduler`] — ручная очередь для детерминированных тестов.

use std::{
    any::Any,
    collections::VecDeque,
    panic::{self, AssertUnwindSafe},
};

use parking_lot::Mutex;
use tokio::{runtime::Handle, sync::mpsc};
use tracing::{error, warn};

/// Единица отложенной работы.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Планировщик отложенных задач.
pub trait Scheduler: Send + Sync {
    /// Ставит задачу в очередь. Никогда не выполняет её синхронно.
    fn schedule(
        &self,
        task: Task,
    );
}

/// Выполняет задачу, изолируя панику.
pub(crate) fn run_isolated(task: Task) {
    if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(task)) {
        error!(reason = panic_message(&*panic), "Deferred task panicked");
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic payload>"
    }
}

/// Планировщик поверх Tokio: неограниченная FIFO-очередь, которую
/// последовательно разбирает одна фоновая задача.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    tx: mpsc::UnboundedSender<Task>,
}

impl TokioScheduler {
    /// Создаёт планировщик в текущем рантайме Tokio.
    ///
    /// Как и `tokio::spawn`, должен вызываться внутри рантайма.
    pub fn new() -> Self {
        Self::with_handle(&Handle::current())
    }

    /// Создаёт планировщик, разбирающий очередь в указанном рантайме.
    pub fn with_handle(handle: &Handle) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Task>();
        handle.spawn(async move {
            while let Some(task) = rx.recv().await {
                run_isolated(task);
            }
        });
        Self { tx }
    }
}

impl Default for TokioScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(
        &self,
        task: Task,
    ) {
        if self.tx.send(task).is_err() {
            warn!("Scheduler queue is closed, dropping deferred task");
        }
    }
}

/// Ручная очередь задач: ничего не выполняется до вызова
/// [`QueueScheduler::run_pending`].
#[derive(Default)]
pub struct QueueScheduler {
    queue: Mutex<VecDeque<Task>>,
}

impl QueueScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Количество задач в очереди.
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Выполняет задачи, пока очередь не опустеет, включая задачи,
    /// поставленные во время разбора. Возвращает число выполненных задач.
    pub fn run_pending(&self) -> usize {
        let mut executed = 0;
        loop {
            // Лок отпускается до запуска: задача может планировать новые.
            let next = self.queue.lock().pop_front();
            match next {
                Some(task) => {
                    run_isolated(task);
                    executed += 1;
                }
                None => break executed,
            }
        }
    }
}

impl Scheduler for QueueScheduler {
    fn schedule(
        &self,
        task: Task,
    ) {
        self.queue.lock().push_back(task);
    }
}
