//! Маршрутизатор каналов поверх pub/sub транспорта.
//!
//! - `command`: теги команд подписки транспорта.
//! - `payload`: полезная нагрузка сообщений и разбор JSON.
//! - `router`: подписки с подсчётом слушателей и рассылка входящих
//!   сообщений через [`crate::emitter::PatternEmitter`].

pub mod command;
pub mod payload;
#[allow(clippy::module_inception)]
mod router;

pub use command::SubscriptionCommand;
pub use payload::Payload;
pub use router::{ChannelListener, ChannelRouter};
