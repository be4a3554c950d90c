use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use parking_lot::Mutex;
use tokio::{
    sync::{broadcast, watch},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use super::{Payload, SubscriptionCommand};
use crate::{
    config::RouterConfig,
    emitter::{Listener, PatternEmitter, Scheduler, Task},
    transport::{Transport, TransportEvent},
    RouterResult,
};

/// Обработчик сообщений канала: получает имя конкретного канала и нагрузку.
pub type ChannelListener = Listener<Payload>;

/// Маршрутизатор каналов.
///
/// Держит на транспорте только те подписки, у которых есть хотя бы один
/// локальный слушатель: подписка выполняется при регистрации, отписка выполняется,
/// когда снят последний слушатель канала или шаблона.
///
/// Входящие сообщения (и точные, и по шаблону) рассылаются по имени
/// конкретного канала через [`PatternEmitter`], так что слушатель шаблона
/// `news.*` получит сообщение канала `news.today`.
pub struct ChannelRouter<T: Transport> {
    transport: Arc<T>,
    config: RouterConfig,
    emitter: PatternEmitter<Payload>,
    scheduler: Arc<dyn Scheduler>,
    ready: AtomicBool,
    ready_tx: watch::Sender<bool>,
    ready_listeners: Mutex<Vec<Task>>,
    events: Mutex<Option<broadcast::Receiver<TransportEvent>>>,
}

impl<T: Transport> ChannelRouter<T> {
    /// Создаёт маршрутизатор.
    ///
    /// Приёмник уведомлений берётся сразу, поэтому сообщения, пришедшие
    /// до [`ChannelRouter::spawn`], не теряются (в пределах буфера
    /// транспорта).
    pub fn new(
        transport: Arc<T>,
        config: RouterConfig,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        let events = transport.events();
        let (ready_tx, _) = watch::channel(false);
        let router = Self {
            emitter: PatternEmitter::new(scheduler.clone()),
            transport,
            config,
            scheduler,
            ready: AtomicBool::new(false),
            ready_tx,
            ready_listeners: Mutex::new(Vec::new()),
            events: Mutex::new(Some(events)),
        };
        if router.transport.is_ready() {
            router.mark_ready();
        }
        router
    }

    /// Запускает задачу, которая читает уведомления транспорта и
    /// передаёт их в [`ChannelRouter::handle_event`].
    ///
    /// Возвращает `None` при повторном вызове. Задача завершается, когда
    /// транспорт закрывает поток или маршрутизатор удалён.
    pub fn spawn(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let mut rx = self.events.lock().take()?;
        let router = Arc::downgrade(self);

        Some(tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        let Some(router) = router.upgrade() else {
                            break;
                        };
                        if let Err(e) = router.handle_event(event) {
                            warn!(error = %e, "Failed to dispatch transport event");
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "Router lagged behind transport events");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("Transport event stream closed");
                        break;
                    }
                }
            }
        }))
    }

    /// Подписка на точные каналы. Если передан слушатель, он
    /// регистрируется на каждый канал; команда транспорту уходит в любом
    /// случае.
    pub fn subscribe<S: AsRef<str>>(
        &self,
        channels: &[S],
        listener: Option<&ChannelListener>,
    ) -> RouterResult<()> {
        self.sub(SubscriptionCommand::Subscribe, channels, listener)
    }

    /// Подписка на шаблоны, например `"news.*"` или `"a?c"`.
    pub fn psubscribe<S: AsRef<str>>(
        &self,
        patterns: &[S],
        listener: Option<&ChannelListener>,
    ) -> RouterResult<()> {
        self.sub(SubscriptionCommand::PSubscribe, patterns, listener)
    }

    /// Отписка от точных каналов.
    ///
    /// Со слушателем снимается только он, без него снимаются все слушатели канала.
    /// Команда транспорту уходит только для каналов, у которых не осталось
    /// слушателей; возвращается именно этот список.
    pub fn unsubscribe<S: AsRef<str>>(
        &self,
        channels: &[S],
        listener: Option<&ChannelListener>,
    ) -> RouterResult<Vec<String>> {
        self.unsub(SubscriptionCommand::Unsubscribe, channels, listener)
    }

    /// Отписка от шаблонов; правила те же, что у [`Self::unsubscribe`].
    pub fn punsubscribe<S: AsRef<str>>(
        &self,
        patterns: &[S],
        listener: Option<&ChannelListener>,
    ) -> RouterResult<Vec<String>> {
        self.unsub(SubscriptionCommand::PUnsubscribe, patterns, listener)
    }

    /// Только локальная регистрация, без команд транспорту.
    pub fn on<S: AsRef<str>>(
        &self,
        names: &[S],
        listener: &ChannelListener,
    ) -> RouterResult<()> {
        self.emitter.register_all(names, listener.clone())
    }

    /// Публикация через транспорт. Локальные слушатели получат сообщение
    /// только через обычный путь доставки транспорта.
    pub fn publish(
        &self,
        channel: &str,
        payload: impl Into<Payload>,
    ) -> RouterResult<usize> {
        Ok(self.transport.publish(channel, payload.into())?)
    }

    /// Обрабатывает одно уведомление транспорта. Возвращает число
    /// совпавших шаблонов.
    pub fn handle_event(
        &self,
        event: TransportEvent,
    ) -> RouterResult<usize> {
        match event {
            TransportEvent::Ready => {
                self.mark_ready();
                Ok(0)
            }
            TransportEvent::Message { channel, payload } => self.handle_message(&channel, payload),
            TransportEvent::PMessage {
                pattern,
                channel,
                payload,
            } => self.handle_pmessage(&pattern, &channel, payload),
        }
    }

    /// Входящее сообщение канала: при необходимости разбирает JSON и
    /// рассылает по имени канала.
    pub fn handle_message(
        &self,
        channel: &str,
        payload: Payload,
    ) -> RouterResult<usize> {
        if channel.is_empty() {
            return Ok(0);
        }
        let payload = if self.config.decode_json {
            payload.decode_json(channel)?
        } else {
            payload
        };
        Ok(self.emitter.emit(channel, payload))
    }

    /// Сообщение по шаблону. Шаблон транспорта не используется:
    /// сопоставление заново выполняет эмиттер по всем своим шаблонам.
    pub fn handle_pmessage(
        &self,
        _pattern: &str,
        channel: &str,
        payload: Payload,
    ) -> RouterResult<usize> {
        self.handle_message(channel, payload)
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Регистрирует одноразовый обработчик готовности.
    ///
    /// Возвращает `false`, если готовность уже наступила: уведомление
    /// однократное и повторно не рассылается.
    pub fn on_ready<F>(
        &self,
        f: F,
    ) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let mut listeners = self.ready_listeners.lock();
        if self.is_ready() {
            return false;
        }
        listeners.push(Box::new(f));
        true
    }

    /// Ожидает готовности транспорта; сразу завершается, если она уже
    /// наступила.
    pub async fn wait_ready(&self) {
        let mut rx = self.ready_tx.subscribe();
        // Отправитель живёт в `self`, поэтому ошибки здесь не бывает.
        let _ = rx.wait_for(|ready| *ready).await;
    }

    /// Количество слушателей ровно под этим каналом или шаблоном.
    pub fn listener_count(
        &self,
        name: &str,
    ) -> usize {
        self.emitter.listener_count(name)
    }

    /// Каналы и шаблоны, у которых есть слушатели.
    pub fn active(&self) -> Vec<String> {
        self.emitter.patterns()
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    fn mark_ready(&self) {
        if self
            .ready
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        self.ready_tx.send_replace(true);

        let listeners = std::mem::take(&mut *self.ready_listeners.lock());
        info!(listeners = listeners.len(), "Channel router ready");
        for task in listeners {
            self.scheduler.schedule(task);
        }
    }

    fn sub<S: AsRef<str>>(
        &self,
        command: SubscriptionCommand,
        targets: &[S],
        listener: Option<&ChannelListener>,
    ) -> RouterResult<()> {
        if targets.is_empty() {
            return Ok(());
        }
        if let Some(listener) = listener {
            self.emitter.register_all(targets, listener.clone())?;
        }

        let targets: Vec<String> = targets.iter().map(|t| t.as_ref().to_string()).collect();
        if let Err(e) = self.transport.execute(command, &targets) {
            // Транспорт не подписался: регистрации этого вызова откатываются.
            if let Some(listener) = listener {
                for target in &targets {
                    self.emitter.unregister_one(target, listener);
                }
            }
            warn!(%command, ?targets, error = %e, "Subscription rejected by transport");
            return Err(e.into());
        }
        debug!(%command, ?targets, "Subscribed");
        Ok(())
    }

    fn unsub<S: AsRef<str>>(
        &self,
        command: SubscriptionCommand,
        targets: &[S],
        listener: Option<&ChannelListener>,
    ) -> RouterResult<Vec<String>> {
        let mut batch = Vec::new();
        for target in targets {
            let target = target.as_ref();
            let now_empty = match listener {
                Some(listener) => self.emitter.unregister_one(target, listener),
                None => self.emitter.unregister_all(target),
            };
            if now_empty {
                batch.push(target.to_string());
            }
        }

        // Пустой батч не отправляется: команда без аргументов сняла бы
        // все подписки транспорта.
        if !batch.is_empty() {
            self.transport.execute(command, &batch)?;
            debug!(%command, targets = ?batch, "Unsubscribed");
        }
        Ok(batch)
    }
}
