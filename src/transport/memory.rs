use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::debug;

use super::{Transport, TransportEvent};
use crate::{emitter::ChannelPattern, router::SubscriptionCommand, Payload, TransportError};

/// Внутрипроцессный pub/sub транспорт.
///
/// Поддерживает:
/// - точные подписки по имени канала;
/// - подписки по glob-шаблонам;
/// - семантику Redis: `UNSUBSCRIBE`/`PUNSUBSCRIBE` без аргументов снимают
///   все подписки своего вида;
/// - журнал выполненных команд и счётчик публикаций.
pub struct MemoryTransport {
    channels: DashSet<String>,
    patterns: DashMap<String, ChannelPattern>,
    events: Mutex<Option<broadcast::Sender<TransportEvent>>>,
    ready: AtomicBool,
    commands: Mutex<Vec<(SubscriptionCommand, Vec<String>)>>,
    publish_count: AtomicUsize,
}

impl MemoryTransport {
    /// Создаёт готовый к работе транспорт с буфером уведомлений `capacity`.
    pub fn new(capacity: usize) -> Self {
        let transport = Self::pending(capacity);
        transport.ready.store(true, Ordering::SeqCst);
        transport
    }

    /// Создаёт транспорт, который станет готов после [`Self::connect`].
    pub fn pending(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            channels: DashSet::new(),
            patterns: DashMap::new(),
            events: Mutex::new(Some(tx)),
            ready: AtomicBool::new(false),
            commands: Mutex::new(Vec::new()),
            publish_count: AtomicUsize::new(0),
        }
    }

    /// Переводит транспорт в состояние готовности и рассылает `Ready`.
    /// Повторный вызов ничего не делает.
    pub fn connect(&self) {
        if self
            .ready
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            debug!("Memory transport connected");
            self.send(TransportEvent::Ready);
        }
    }

    /// Закрывает поток уведомлений; все приёмники получат `Closed`.
    pub fn close(&self) {
        if self.events.lock().take().is_some() {
            self.ready.store(false, Ordering::SeqCst);
            debug!("Memory transport closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.events.lock().is_none()
    }

    /// Активные точные подписки (в порядке сортировки).
    pub fn subscribed_channels(&self) -> Vec<String> {
        let mut v: Vec<String> = self.channels.iter().map(|c| c.key().clone()).collect();
        v.sort();
        v
    }

    /// Активные подписки на шаблоны (в порядке сортировки).
    pub fn subscribed_patterns(&self) -> Vec<String> {
        let mut v: Vec<String> = self.patterns.iter().map(|e| e.key().clone()).collect();
        v.sort();
        v
    }

    /// Общее количество принятых вызовов `publish`.
    pub fn publish_count(&self) -> usize {
        self.publish_count.load(Ordering::Relaxed)
    }

    /// Журнал выполненных команд подписки.
    pub fn commands(&self) -> Vec<(SubscriptionCommand, Vec<String>)> {
        self.commands.lock().clone()
    }

    fn send(
        &self,
        event: TransportEvent,
    ) -> bool {
        match self.events.lock().as_ref() {
            // Err означает лишь отсутствие приёмников.
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.is_closed() {
            Err(TransportError::Closed)
        } else {
            Ok(())
        }
    }
}

impl Transport for MemoryTransport {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Публикация работает в два этапа:
    /// 1. доставка по точной подписке (если есть);
    /// 2. по одной доставке на каждый подходящий шаблон.
    fn publish(
        &self,
        channel: &str,
        payload: Payload,
    ) -> Result<usize, TransportError> {
        self.ensure_open()?;
        if !self.is_ready() {
            return Err(TransportError::NotReady);
        }
        self.publish_count.fetch_add(1, Ordering::Relaxed);

        let mut delivered = 0;
        if self.channels.contains(channel) {
            let event = TransportEvent::Message {
                channel: channel.to_string(),
                payload: payload.clone(),
            };
            if self.send(event) {
                delivered += 1;
            }
        }

        let matched: Vec<String> = self
            .patterns
            .iter()
            .filter(|e| e.value().is_match(channel))
            .map(|e| e.key().clone())
            .collect();
        for pattern in matched {
            let event = TransportEvent::PMessage {
                pattern,
                channel: channel.to_string(),
                payload: payload.clone(),
            };
            if self.send(event) {
                delivered += 1;
            }
        }
        Ok(delivered)
    }

    fn execute(
        &self,
        command: SubscriptionCommand,
        targets: &[String],
    ) -> Result<(), TransportError> {
        self.ensure_open()?;
        match command {
            SubscriptionCommand::Subscribe => {
                for t in targets {
                    self.channels.insert(t.clone());
                }
            }
            SubscriptionCommand::PSubscribe => {
                let mut compiled = Vec::with_capacity(targets.len());
                for t in targets {
                    let p = ChannelPattern::new(t).map_err(|e| TransportError::Rejected {
                        command: command.to_string(),
                        reason: e.to_string(),
                    })?;
                    compiled.push(p);
                }
                for p in compiled {
                    self.patterns.insert(p.as_str().to_string(), p);
                }
            }
            SubscriptionCommand::Unsubscribe if targets.is_empty() => self.channels.clear(),
            SubscriptionCommand::Unsubscribe => {
                for t in targets {
                    self.channels.remove(t);
                }
            }
            SubscriptionCommand::PUnsubscribe if targets.is_empty() => self.patterns.clear(),
            SubscriptionCommand::PUnsubscribe => {
                for t in targets {
                    self.patterns.remove(t);
                }
            }
        }
        debug!(%command, ?targets, "Transport command executed");
        self.commands.lock().push((command, targets.to_vec()));
        Ok(())
    }

    fn events(&self) -> broadcast::Receiver<TransportEvent> {
        match self.events.lock().as_ref() {
            Some(tx) => tx.subscribe(),
            None => {
                // Закрытый транспорт: приёмник сразу вернёт `Closed`.
                let (tx, rx) = broadcast::channel(1);
                drop(tx);
                rx
            }
        }
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new(1024)
    }
}
