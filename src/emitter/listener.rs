use std::{fmt, sync::Arc};

type Callback<A> = dyn Fn(&str, &A) + Send + Sync;

/// Обработчик события.
///
/// Клонирование дешёвое: копируется только `Arc`. Два `Listener` равны,
/// если указывают на один и тот же обработчик, поэтому один и тот же
/// обработчик можно зарегистрировать на несколько шаблонов и потом снять
/// его точечно.
pub struct Listener<A> {
    callback: Arc<Callback<A>>,
}

impl<A> Listener<A> {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&str, &A) + Send + Sync + 'static,
    {
        Self {
            callback: Arc::new(f),
        }
    }

    /// Вызывает обработчик с именем события и аргументами.
    #[inline]
    pub fn call(
        &self,
        event: &str,
        args: &A,
    ) {
        (self.callback)(event, args)
    }
}

impl<A> Clone for Listener<A> {
    fn clone(&self) -> Self {
        Self {
            callback: Arc::clone(&self.callback),
        }
    }
}

impl<A> PartialEq for Listener<A> {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        Arc::ptr_eq(&self.callback, &other.callback)
    }
}

impl<A> Eq for Listener<A> {}

impl<A> fmt::Debug for Listener<A> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Listener")
            .field("ptr", &Arc::as_ptr(&self.callback).cast::<()>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Тест проверяет, что клон равен оригиналу, а новый обработчик — нет.
    #[test]
    fn test_identity_by_pointer() {
        let a: Listener<u32> = Listener::new(|_, _| {});
        let b = a.clone();
        let c: Listener<u32> = Listener::new(|_, _| {});

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    /// Тест проверяет, что вызов передаёт имя события и аргументы.
    #[test]
    fn test_call_passes_event_and_args() {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let l: Listener<usize> = Listener::new(move |event, n| {
            assert_eq!(event, "kin");
            h.fetch_add(*n, Ordering::SeqCst);
        });

        l.call("kin", &3);
        l.call("kin", &4);
        assert_eq!(hits.load(Ordering::SeqCst), 7);
    }
}
