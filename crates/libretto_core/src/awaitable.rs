//! Single-resolution futures with cooperative abort.
//!
//! An [`Awaitable`] settles exactly once, either by [`resolve`](Awaitable::resolve) or by
//! [`abort`](Awaitable::abort). Both paths go through the same latch, so whichever comes
//! first wins and the other becomes a no-op. Listeners run synchronously, once, in
//! registration order. Awaitables are also plain futures and can be `.await`ed on a
//! single-threaded executor.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll, Waker};
use tracing::debug;

/// How an awaitable settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settled<T> {
    /// Resolved by the receiver of an external signal
    Resolved(T),
    /// Aborted; carries the fallback produced by the skip controller, if any
    Aborted(Option<T>),
}

impl<T> Settled<T> {
    /// Value carried by either settle path.
    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Resolved(value) => Some(value),
            Self::Aborted(value) => value.as_ref(),
        }
    }

    /// Consume into the carried value.
    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Resolved(value) => Some(value),
            Self::Aborted(value) => value,
        }
    }

    /// Whether this came from an abort.
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted(_))
    }
}

/// Runs an abort handler at most once.
///
/// # Examples
///
/// ```
/// use libretto_core::SkipController;
///
/// let mut skip = SkipController::new(|| "fallback");
/// assert_eq!(skip.abort(), Some("fallback"));
/// assert_eq!(skip.abort(), None);
/// assert!(skip.is_aborted());
/// ```
pub struct SkipController<T> {
    aborted: bool,
    handler: Option<Box<dyn FnOnce() -> T>>,
}

impl<T> SkipController<T> {
    /// Controller whose abort produces a fallback value.
    pub fn new(handler: impl FnOnce() -> T + 'static) -> Self {
        Self {
            aborted: false,
            handler: Some(Box::new(handler)),
        }
    }

    /// Controller without a fallback.
    pub fn noop() -> Self {
        Self {
            aborted: false,
            handler: None,
        }
    }

    /// Run the handler if this is the first abort.
    pub fn abort(&mut self) -> Option<T> {
        if self.aborted {
            return None;
        }
        self.aborted = true;
        self.handler.take().map(|handler| handler())
    }

    /// Whether abort has been requested.
    pub fn is_aborted(&self) -> bool {
        self.aborted
    }
}

impl<T> fmt::Debug for SkipController<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SkipController")
            .field("aborted", &self.aborted)
            .field("has_handler", &self.handler.is_some())
            .finish()
    }
}

type Listener<T> = Box<dyn FnOnce(&Settled<T>)>;

struct Inner<T, U> {
    latched: bool,
    state: Option<Settled<T>>,
    receiver: Rc<dyn Fn(U) -> T>,
    listeners: Vec<Listener<T>>,
    skip: Option<SkipController<T>>,
    wakers: Vec<Waker>,
}

/// Single-resolution future with cooperative abort.
///
/// `U` is what the external party sends; the receiver maps it to the value `T`
/// that listeners and awaiters observe.
///
/// # Examples
///
/// ```
/// use libretto_core::Awaitable;
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// let fired = Rc::new(Cell::new(0));
/// let done: Awaitable<u32> = Awaitable::new();
/// let counter = fired.clone();
/// done.on_settle(move |_| counter.set(counter.get() + 1));
///
/// assert!(done.resolve(7));
/// assert!(!done.resolve(8));
/// assert!(!done.abort());
/// assert_eq!(done.result(), Some(7));
/// assert_eq!(fired.get(), 1);
/// ```
pub struct Awaitable<T, U = T> {
    inner: Rc<RefCell<Inner<T, U>>>,
}

impl<T, U> Clone for Awaitable<T, U> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T, U> fmt::Debug for Awaitable<T, U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Awaitable")
            .field("latched", &inner.latched)
            .field("settled", &inner.state.is_some())
            .field("listeners", &inner.listeners.len())
            .finish()
    }
}

impl<T: Clone + 'static> Awaitable<T, T> {
    /// Awaitable whose receiver passes the resolved value through.
    pub fn new() -> Self {
        Self::with_receiver(|value| value)
    }
}

impl<T: Clone + 'static> Default for Awaitable<T, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + 'static, U: 'static> Awaitable<T, U> {
    /// Awaitable mapping external signals through `receiver`.
    pub fn with_receiver(receiver: impl Fn(U) -> T + 'static) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                latched: false,
                state: None,
                receiver: Rc::new(receiver),
                listeners: Vec::new(),
                skip: None,
                wakers: Vec::new(),
            })),
        }
    }

    /// Attach a skip controller, builder style.
    pub fn with_skip(self, skip: SkipController<T>) -> Self {
        self.set_skip_controller(skip);
        self
    }

    /// Replace the skip controller.
    pub fn set_skip_controller(&self, skip: SkipController<T>) {
        self.inner.borrow_mut().skip = Some(skip);
    }

    /// Settle with an external signal. Returns `false` if already settled.
    pub fn resolve(&self, value: U) -> bool {
        let receiver = {
            let mut inner = self.inner.borrow_mut();
            if inner.latched {
                debug!("Awaitable already settled; resolve ignored");
                return false;
            }
            inner.latched = true;
            Rc::clone(&inner.receiver)
        };
        let result = receiver(value);
        self.settle(Settled::Resolved(result));
        true
    }

    /// Abort through the skip controller. Returns `false` if already settled.
    pub fn abort(&self) -> bool {
        let skip = {
            let mut inner = self.inner.borrow_mut();
            if inner.latched {
                debug!("Awaitable already settled; abort ignored");
                return false;
            }
            inner.latched = true;
            inner.skip.take()
        };
        let fallback = skip.and_then(|mut skip| skip.abort());
        self.settle(Settled::Aborted(fallback));
        true
    }

    fn settle(&self, settled: Settled<T>) {
        let (listeners, wakers) = {
            let mut inner = self.inner.borrow_mut();
            inner.state = Some(settled.clone());
            (
                std::mem::take(&mut inner.listeners),
                std::mem::take(&mut inner.wakers),
            )
        };
        for listener in listeners {
            listener(&settled);
        }
        for waker in wakers {
            waker.wake();
        }
    }

    /// Run `f` once this awaitable settles, or immediately if it already has.
    pub fn on_settle(&self, f: impl FnOnce(&Settled<T>) + 'static) {
        let settled = self.inner.borrow().state.clone();
        match settled {
            Some(settled) => f(&settled),
            None => self.inner.borrow_mut().listeners.push(Box::new(f)),
        }
    }

    /// Whether either settle path has completed.
    pub fn is_settled(&self) -> bool {
        self.inner.borrow().state.is_some()
    }

    /// Whether this awaitable was resolved (not aborted).
    pub fn is_solved(&self) -> bool {
        matches!(self.inner.borrow().state, Some(Settled::Resolved(_)))
    }

    /// Whether this awaitable was aborted.
    pub fn is_aborted(&self) -> bool {
        matches!(self.inner.borrow().state, Some(Settled::Aborted(_)))
    }

    /// Value carried by the settled state.
    pub fn result(&self) -> Option<T> {
        self.inner
            .borrow()
            .state
            .as_ref()
            .and_then(|settled| settled.value().cloned())
    }

    /// Full settled state.
    pub fn settled(&self) -> Option<Settled<T>> {
        self.inner.borrow().state.clone()
    }

    /// Whether two handles point to the same awaitable.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Non-owning handle, used by combinators to avoid reference cycles.
    pub fn downgrade(&self) -> WeakAwaitable<T, U> {
        WeakAwaitable {
            inner: Rc::downgrade(&self.inner),
        }
    }
}

impl Awaitable<(), ()> {
    /// Resolves once every item has settled. Aborting it aborts every item.
    pub fn all<T: Clone + 'static, U: 'static>(items: &[Awaitable<T, U>]) -> Self {
        let combined = Self::new();
        if items.is_empty() {
            combined.resolve(());
            return combined;
        }
        let owned = items.to_vec();
        combined.set_skip_controller(SkipController::new(move || {
            for item in &owned {
                item.abort();
            }
        }));
        let remaining = Rc::new(Cell::new(items.len()));
        for item in items {
            let remaining = Rc::clone(&remaining);
            let target = combined.downgrade();
            item.on_settle(move |_| {
                remaining.set(remaining.get() - 1);
                if remaining.get() == 0 {
                    if let Some(target) = target.upgrade() {
                        target.resolve(());
                    }
                }
            });
        }
        combined
    }

    /// Resolves when the first item settles. The others keep running.
    pub fn any<T: Clone + 'static, U: 'static>(items: &[Awaitable<T, U>]) -> Self {
        let combined = Self::new();
        if items.is_empty() {
            combined.resolve(());
            return combined;
        }
        let owned = items.to_vec();
        combined.set_skip_controller(SkipController::new(move || {
            for item in &owned {
                item.abort();
            }
        }));
        for item in items {
            let target = combined.downgrade();
            item.on_settle(move |_| {
                if let Some(target) = target.upgrade() {
                    target.resolve(());
                }
            });
        }
        combined
    }
}

impl<T: Clone + 'static, U: 'static> Future for Awaitable<T, U> {
    type Output = Settled<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut inner = self.inner.borrow_mut();
        match &inner.state {
            Some(settled) => Poll::Ready(settled.clone()),
            None => {
                inner.wakers.push(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}

/// Non-owning awaitable handle.
pub struct WeakAwaitable<T, U = T> {
    inner: Weak<RefCell<Inner<T, U>>>,
}

impl<T, U> Clone for WeakAwaitable<T, U> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<T, U> WeakAwaitable<T, U> {
    /// Upgrade if the awaitable is still alive.
    pub fn upgrade(&self) -> Option<Awaitable<T, U>> {
        self.inner.upgrade().map(|inner| Awaitable { inner })
    }
}

/// Type-erased settle status, used to compose awaitables of different types.
pub trait Settle {
    /// Whether either settle path has completed.
    fn is_settled(&self) -> bool;
    /// Whether the abort path was taken.
    fn is_cancelled(&self) -> bool;
    /// Abort; returns `false` if already settled.
    fn cancel(&self) -> bool;
    /// Run `f` once settled, or immediately if already settled.
    fn when_settled(&self, f: Box<dyn FnOnce()>);
}

impl<T: Clone + 'static, U: 'static> Settle for Awaitable<T, U> {
    fn is_settled(&self) -> bool {
        Awaitable::is_settled(self)
    }

    fn is_cancelled(&self) -> bool {
        self.is_aborted()
    }

    fn cancel(&self) -> bool {
        self.abort()
    }

    fn when_settled(&self, f: Box<dyn FnOnce()>) {
        self.on_settle(move |_| f());
    }
}
