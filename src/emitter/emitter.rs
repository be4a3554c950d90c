use std::{
    collections::HashMap,
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Weak},
};

use parking_lot::RwLock;
use tracing::{debug, error, trace};

use super::{scheduler::panic_message, ChannelPattern, Listener, Scheduler};
use crate::RouterResult;

/// Запись реестра: скомпилированный шаблон и обработчики в порядке
/// регистрации. Пустых записей в реестре не бывает.
struct Entry<A> {
    pattern: ChannelPattern,
    listeners: Vec<Listener<A>>,
}

type Registry<A> = RwLock<HashMap<String, Entry<A>>>;

/// Эмиттер событий с glob-сопоставлением.
///
/// Поддерживает:
/// - несколько обработчиков на один шаблон (вызываются в порядке регистрации);
/// - сопоставление имени события со всеми шаблонами реестра;
/// - отложенный вызов: на каждый совпавший шаблон в планировщик уходит
///   отдельная задача, `emit` возвращается до вызова обработчиков.
///
/// Совпадения вычисляются в момент `emit` под блокировкой реестра.
/// Список обработчиков шаблона фиксируется там же; при выполнении задачи
/// вызываются только те из них, что всё ещё зарегистрированы.
pub struct PatternEmitter<A> {
    registry: Arc<Registry<A>>,
    scheduler: Arc<dyn Scheduler>,
}

impl<A> PatternEmitter<A>
where
    A: Send + Sync + 'static,
{
    pub fn new(scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            registry: Arc::new(RwLock::new(HashMap::new())),
            scheduler,
        }
    }

    /// Добавляет обработчик в конец списка шаблона, создавая запись
    /// при первой регистрации. Возвращает хэндл для точечного снятия.
    pub fn register(
        &self,
        pattern: &str,
        listener: Listener<A>,
    ) -> RouterResult<Listener<A>> {
        self.register_all(&[pattern], listener.clone())?;
        Ok(listener)
    }

    /// Регистрирует один обработчик на несколько шаблонов.
    ///
    /// Все новые шаблоны компилируются до изменения реестра: при ошибке
    /// в любом из них реестр остаётся нетронутым.
    pub fn register_all<S: AsRef<str>>(
        &self,
        patterns: &[S],
        listener: Listener<A>,
    ) -> RouterResult<()> {
        let mut compiled = HashMap::new();
        {
            let registry = self.registry.read();
            for p in patterns {
                let p = p.as_ref();
                if !registry.contains_key(p) && !compiled.contains_key(p) {
                    compiled.insert(p, ChannelPattern::new(p)?);
                }
            }
        }

        let mut registry = self.registry.write();
        for p in patterns {
            let p = p.as_ref();
            match registry.get_mut(p) {
                Some(entry) => entry.listeners.push(listener.clone()),
                None => {
                    // Запись могла исчезнуть между блокировками.
                    let pattern = match compiled.remove(p) {
                        Some(c) => c,
                        None => ChannelPattern::new(p)?,
                    };
                    registry.insert(
                        p.to_string(),
                        Entry {
                            pattern,
                            listeners: vec![listener.clone()],
                        },
                    );
                }
            }
            debug!(pattern = p, "Listener registered");
        }
        Ok(())
    }

    /// Удаляет все обработчики шаблона. Возвращает `true`, если шаблона
    /// в реестре больше нет (всегда, после этого вызова).
    pub fn unregister_all(
        &self,
        pattern: &str,
    ) -> bool {
        let mut registry = self.registry.write();
        if let Some(entry) = registry.remove(pattern) {
            debug!(
                pattern,
                removed = entry.listeners.len(),
                "All listeners removed"
            );
        }
        !registry.contains_key(pattern)
    }

    /// Удаляет первое вхождение обработчика из списка шаблона.
    /// Возвращает `true`, если у шаблона больше нет обработчиков.
    pub fn unregister_one(
        &self,
        pattern: &str,
        listener: &Listener<A>,
    ) -> bool {
        let mut registry = self.registry.write();
        let Some(entry) = registry.get_mut(pattern) else {
            return true;
        };
        if let Some(pos) = entry.listeners.iter().position(|l| l == listener) {
            entry.listeners.remove(pos);
            debug!(pattern, "Listener removed");
        }
        if entry.listeners.is_empty() {
            registry.remove(pattern);
            return true;
        }
        false
    }

    /// Рассылает событие всем шаблонам, под которые подходит `event`.
    ///
    /// Возвращает количество совпавших шаблонов, то есть число задач,
    /// переданных планировщику. Ни один обработчик не вызывается до
    /// возврата из этого метода.
    pub fn emit(
        &self,
        event: &str,
        args: A,
    ) -> usize {
        let args = Arc::new(args);
        let event: Arc<str> = Arc::from(event);
        let registry = self.registry.read();

        let mut scheduled = 0;
        for (key, entry) in registry.iter() {
            if !entry.pattern.is_match(&event) {
                continue;
            }
            let snapshot = entry.listeners.clone();
            let key = key.clone();
            let live = Arc::downgrade(&self.registry);
            let event = Arc::clone(&event);
            let args = Arc::clone(&args);
            self.scheduler.schedule(Box::new(move || {
                dispatch(&live, &key, snapshot, &event, &args);
            }));
            scheduled += 1;
        }
        trace!(event = &*event, matched = scheduled, "Event emitted");
        scheduled
    }

    /// Количество обработчиков ровно под этим ключом шаблона.
    pub fn listener_count(
        &self,
        pattern: &str,
    ) -> usize {
        self.registry
            .read()
            .get(pattern)
            .map_or(0, |e| e.listeners.len())
    }

    pub fn has_listeners(
        &self,
        pattern: &str,
    ) -> bool {
        self.listener_count(pattern) > 0
    }

    /// Копия списка обработчиков шаблона в порядке регистрации.
    pub fn listeners(
        &self,
        pattern: &str,
    ) -> Vec<Listener<A>> {
        self.registry
            .read()
            .get(pattern)
            .map(|e| e.listeners.clone())
            .unwrap_or_default()
    }

    /// Все шаблоны, у которых есть хотя бы один обработчик.
    pub fn patterns(&self) -> Vec<String> {
        self.registry.read().keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.read().is_empty()
    }
}

/// Выполняет зафиксированный список обработчиков одного шаблона.
fn dispatch<A>(
    live: &Weak<Registry<A>>,
    pattern: &str,
    snapshot: Vec<Listener<A>>,
    event: &str,
    args: &A,
) {
    // Уже вызванные копии: один обработчик может стоять в списке несколько
    // раз, и каждая копия требует своей живой регистрации.
    let mut fired: Vec<Listener<A>> = Vec::new();
    for listener in snapshot {
        // Реестр удалён вместе с эмиттером: рассылать некому.
        let Some(registry) = live.upgrade() else {
            return;
        };
        let registered = registry.read().get(pattern).map_or(0, |e| {
            e.listeners.iter().filter(|l| **l == listener).count()
        });
        drop(registry);
        let consumed = fired.iter().filter(|l| **l == listener).count();
        if registered <= consumed {
            continue;
        }
        fired.push(listener.clone());

        let call = AssertUnwindSafe(|| listener.call(event, args));
        if let Err(panic) = panic::catch_unwind(call) {
            error!(
                pattern,
                event,
                reason = panic_message(&*panic),
                "Listener panicked"
            );
        }
    }
}

impl<A> fmt::Debug for PatternEmitter<A> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("PatternEmitter")
            .field("patterns", &self.registry.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;

    use super::*;
    use crate::{emitter::QueueScheduler, RouterError};

    type Log = Arc<Mutex<Vec<String>>>;

    fn setup() -> (PatternEmitter<String>, Arc<QueueScheduler>) {
        let sched = Arc::new(QueueScheduler::new());
        (PatternEmitter::new(sched.clone()), sched)
    }

    fn recorder(
        log: &Log,
        tag: &'static str,
    ) -> Listener<String> {
        let log = log.clone();
        Listener::new(move |event, arg: &String| log.lock().push(format!("{tag}:{event}:{arg}")))
    }

    /// Тест проверяет, что обычное имя события работает как литерал.
    #[test]
    fn test_plain_event() {
        let (ee, sched) = setup();
        let log = Log::default();
        ee.register("Gevent.foo", recorder(&log, "a")).unwrap();

        assert_eq!(ee.emit("Gevent.foo", "x".into()), 1);
        assert_eq!(ee.emit("Gevent.foo2", "x".into()), 0);
        sched.run_pending();

        assert_eq!(*log.lock(), vec!["a:Gevent.foo:x"]);
    }

    /// Тест проверяет, что `emit` возвращается раньше вызова обработчиков.
    #[test]
    fn test_emit_is_deferred() {
        let (ee, sched) = setup();
        let log = Log::default();
        ee.register("*", recorder(&log, "a")).unwrap();

        ee.emit("anything", "1".into());
        assert!(log.lock().is_empty());
        assert_eq!(sched.pending(), 1);

        sched.run_pending();
        assert_eq!(log.lock().len(), 1);
    }

    /// Тест проверяет порядок вызова обработчиков одного шаблона.
    #[test]
    fn test_registration_order_within_pattern() {
        let (ee, sched) = setup();
        let log = Log::default();
        for tag in ["first", "second", "third"] {
            ee.register("order.*", recorder(&log, tag)).unwrap();
        }

        ee.emit("order.x", "v".into());
        sched.run_pending();

        assert_eq!(
            *log.lock(),
            vec!["first:order.x:v", "second:order.x:v", "third:order.x:v"]
        );
    }

    /// Тест проверяет, что каждый совпавший шаблон — отдельная задача.
    #[test]
    fn test_each_matching_pattern_is_own_unit() {
        let (ee, sched) = setup();
        let log = Log::default();
        ee.register("Gevent.foo.*", recorder(&log, "glob")).unwrap();
        ee.register("Gevent.foo.bar", recorder(&log, "exact")).unwrap();
        ee.register("Gevent.baz", recorder(&log, "other")).unwrap();

        assert_eq!(ee.emit("Gevent.foo.bar", "p".into()), 2);
        assert_eq!(sched.pending(), 2);
        sched.run_pending();

        let mut got = log.lock().clone();
        got.sort();
        assert_eq!(got, vec!["exact:Gevent.foo.bar:p", "glob:Gevent.foo.bar:p"]);
    }

    /// Тест проверяет, что после `unregister_all` событие никого не находит.
    #[test]
    fn test_unregister_all() {
        let (ee, sched) = setup();
        let log = Log::default();
        ee.register("Gevent.blah", recorder(&log, "a")).unwrap();
        ee.register("Gevent.blah", recorder(&log, "b")).unwrap();

        ee.emit("Gevent.blah", "1".into());
        sched.run_pending();
        assert_eq!(log.lock().len(), 2);

        assert!(ee.unregister_all("Gevent.blah"));
        assert!(!ee.has_listeners("Gevent.blah"));
        assert_eq!(ee.emit("Gevent.blah", "2".into()), 0);
        sched.run_pending();
        assert_eq!(log.lock().len(), 2);
    }

    /// Тест проверяет точечное снятие обработчика и удаление пустой записи.
    #[test]
    fn test_unregister_one_reports_emptiness() {
        let (ee, _sched) = setup();
        let log = Log::default();
        let a = ee.register("chan", recorder(&log, "a")).unwrap();
        let b = ee.register("chan", recorder(&log, "b")).unwrap();

        assert!(!ee.unregister_one("chan", &a));
        assert_eq!(ee.listener_count("chan"), 1);
        assert_eq!(ee.listeners("chan"), vec![b.clone()]);

        assert!(ee.unregister_one("chan", &b));
        assert!(ee.patterns().is_empty());
        assert!(ee.is_empty());
    }

    /// Тест проверяет, что снятие чужого обработчика ничего не ломает.
    #[test]
    fn test_unregister_unknown_listener() {
        let (ee, _sched) = setup();
        let log = Log::default();
        ee.register("chan", recorder(&log, "a")).unwrap();
        let stranger = recorder(&log, "z");

        assert!(!ee.unregister_one("chan", &stranger));
        assert!(ee.unregister_one("nochan", &stranger));
        assert_eq!(ee.listener_count("chan"), 1);
    }

    /// Тест проверяет, что обработчик, снятый до своей очереди, не
    /// вызывается, а добавленный после `emit` не попадает в рассылку.
    #[test]
    fn test_snapshot_and_cancellation() {
        let (ee, sched) = setup();
        let log = Log::default();
        let a = ee.register("snap", recorder(&log, "a")).unwrap();
        ee.register("snap", recorder(&log, "b")).unwrap();

        ee.emit("snap", "1".into());
        ee.unregister_one("snap", &a);
        ee.register("snap", recorder(&log, "late")).unwrap();
        sched.run_pending();

        assert_eq!(*log.lock(), vec!["b:snap:1"]);
    }

    /// Тест проверяет, что снятие одной из двух копий обработчика до его
    /// очереди оставляет ровно один вызов.
    #[test]
    fn test_duplicate_listener_removed_once_fires_once() {
        let (ee, sched) = setup();
        let log = Log::default();
        let dup = recorder(&log, "dup");
        ee.register("dup", dup.clone()).unwrap();
        ee.register("dup", dup.clone()).unwrap();

        ee.emit("dup", "1".into());
        assert!(!ee.unregister_one("dup", &dup));
        assert_eq!(ee.listener_count("dup"), 1);
        sched.run_pending();
        assert_eq!(*log.lock(), vec!["dup:dup:1"]);

        ee.emit("dup", "2".into());
        ee.unregister_one("dup", &dup);
        sched.run_pending();
        assert_eq!(log.lock().len(), 1);
    }

    /// Тест проверяет, что обе копии обработчика срабатывают, пока обе
    /// зарегистрированы.
    #[test]
    fn test_duplicate_listener_fires_per_registration() {
        let (ee, sched) = setup();
        let log = Log::default();
        let dup = recorder(&log, "dup");
        ee.register_all(&["twice", "twice"], dup).unwrap();

        ee.emit("twice", "x".into());
        sched.run_pending();
        assert_eq!(log.lock().len(), 2);
    }

    /// Тест проверяет, что паника обработчика не мешает соседям.
    #[test]
    fn test_panicking_listener_is_isolated() {
        let (ee, sched) = setup();
        let hits = Arc::new(AtomicUsize::new(0));
        ee.register("p", Listener::new(|_, _: &String| panic!("listener failure")))
            .unwrap();
        let h = hits.clone();
        ee.register(
            "p",
            Listener::new(move |_, _: &String| {
                h.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap();

        ee.emit("p", String::new());
        sched.run_pending();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    /// Тест проверяет, что обработчик может менять реестр во время рассылки.
    #[test]
    fn test_listener_can_mutate_registry() {
        let sched = Arc::new(QueueScheduler::new());
        let ee = Arc::new(PatternEmitter::<String>::new(sched.clone()));
        let log = Log::default();

        let ee2 = ee.clone();
        let log2 = log.clone();
        ee.register(
            "m",
            Listener::new(move |_, _: &String| {
                let log3 = log2.clone();
                let added = Listener::new(move |_, _: &String| log3.lock().push("added".into()));
                ee2.register("m", added).unwrap();
            }),
        )
        .unwrap();

        ee.emit("m", String::new());
        sched.run_pending();
        assert!(log.lock().is_empty());
        assert_eq!(ee.listener_count("m"), 2);

        ee.emit("m", String::new());
        sched.run_pending();
        assert_eq!(*log.lock(), vec!["added"]);
    }

    /// Тест проверяет атомарность групповой регистрации.
    #[test]
    fn test_register_all_is_atomic_on_invalid_pattern() {
        let (ee, _sched) = setup();
        let log = Log::default();
        let err = ee
            .register_all(&["good", "[bad"], recorder(&log, "a"))
            .unwrap_err();

        assert!(matches!(err, RouterError::InvalidPattern { .. }));
        assert!(ee.is_empty());
    }

    /// Тест проверяет, что задачи после удаления эмиттера ничего не делают.
    #[test]
    fn test_dropped_emitter_skips_dispatch() {
        let (ee, sched) = setup();
        let log = Log::default();
        ee.register("gone", recorder(&log, "a")).unwrap();
        ee.emit("gone", "1".into());
        drop(ee);

        sched.run_pending();
        assert!(log.lock().is_empty());
    }
}
