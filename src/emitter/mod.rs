//! Эмиттер событий с glob-шаблонами.
//!
//! - `pattern`: компиляция и сопоставление glob-шаблонов.
//! - `listener`: обработчики, сравнимые по идентичности.
//! - `scheduler`: отложенное выполнение рассылки.
//! - `emitter`: реестр шаблонов и сама рассылка.

#[allow(clippy::module_inception)]
mod emitter;
pub mod listener;
pub mod pattern;
pub mod scheduler;

pub use emitter::PatternEmitter;
pub use listener::Listener;
pub use pattern::ChannelPattern;
pub use scheduler::{QueueScheduler, Scheduler, Task, TokioScheduler};
