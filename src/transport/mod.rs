//! Транспорт pub/sub, поверх которого работает маршрутизатор.
//!
//! - `Transport`: команды подписки, публикация и поток уведомлений.
//! - `memory`: внутрипроцессная реализация с семантикой Redis pub/sub.

pub mod memory;

pub use memory::MemoryTransport;
use tokio::sync::broadcast;

use crate::{router::SubscriptionCommand, Payload, TransportError};

/// Уведомление от транспорта.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Транспорт подключён и готов к работе.
    Ready,
    /// Сообщение по точной подписке.
    Message { channel: String, payload: Payload },
    /// Сообщение по подписке на шаблон.
    PMessage {
        pattern: String,
        channel: String,
        payload: Payload,
    },
}

pub trait Transport: Send + Sync + 'static {
    /// Готов ли транспорт прямо сейчас.
    fn is_ready(&self) -> bool;

    /// Публикует сообщение. Возвращает число доставок.
    fn publish(
        &self,
        channel: &str,
        payload: Payload,
    ) -> Result<usize, TransportError>;

    /// Выполняет команду подписки для списка каналов или шаблонов.
    fn execute(
        &self,
        command: SubscriptionCommand,
        targets: &[String],
    ) -> Result<(), TransportError>;

    /// Новый приёмник уведомлений. Получает только события,
    /// отправленные после вызова.
    fn events(&self) -> broadcast::Receiver<TransportEvent>;
}
