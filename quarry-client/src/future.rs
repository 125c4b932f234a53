//! Single-assignment result cell with continuations
//!
//! A `Promise` is the only writer of a result; any number of `JobFuture`
//! handles read it. Continuations registered before resolution run exactly
//! once when the value is set, those registered afterwards run immediately.
//! Every handle derived from one workflow shares a `CancellationToken`.

use std::fmt;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::error::{ClientError, Result};

type Continuation<T> = Box<dyn FnOnce(Result<T>) + Send>;

enum State<T> {
    Pending(Vec<Continuation<T>>),
    Ready(Result<T>),
}

struct Shared<T> {
    state: Mutex<State<T>>,
    ready: Condvar,
    notify: Notify,
}

impl<T: Clone + Send + 'static> Shared<T> {
    fn new() -> Self {
        Self {
            state: Mutex::new(State::Pending(Vec::new())),
            ready: Condvar::new(),
            notify: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores `result` and runs the pending continuations outside the lock.
    /// Returns false when the cell was already resolved.
    fn resolve(&self, result: Result<T>) -> bool {
        let continuations = {
            let mut state = self.lock();
            let pending = match &mut *state {
                State::Ready(_) => return false,
                State::Pending(pending) => std::mem::take(pending),
            };
            *state = State::Ready(result.clone());
            pending
        };

        self.ready.notify_all();
        self.notify.notify_waiters();

        for continuation in continuations {
            continuation(result.clone());
        }
        true
    }

    fn peek(&self) -> Option<Result<T>> {
        match &*self.lock() {
            State::Ready(result) => Some(result.clone()),
            State::Pending(_) => None,
        }
    }
}

/// Writing half of a `JobFuture`
///
/// Dropping a promise without calling `set_value` resolves its future with
/// `ClientError::Internal`.
pub struct Promise<T: Clone + Send + 'static> {
    shared: Option<Arc<Shared<T>>>,
    token: CancellationToken,
}

impl<T: Clone + Send + 'static> Promise<T> {
    /// Creates a connected promise/future pair with a fresh cancellation token
    pub fn channel() -> (Promise<T>, JobFuture<T>) {
        Self::channel_with_token(CancellationToken::new())
    }

    /// Creates a connected pair sharing an existing cancellation token
    pub fn channel_with_token(token: CancellationToken) -> (Promise<T>, JobFuture<T>) {
        let shared = Arc::new(Shared::new());
        let future = JobFuture {
            shared: Arc::clone(&shared),
            token: token.clone(),
        };
        (
            Promise {
                shared: Some(shared),
                token,
            },
            future,
        )
    }

    /// Token cancelled when any reader calls `JobFuture::cancel`
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Resolves the future
    pub fn set_value(mut self, result: Result<T>) {
        if let Some(shared) = self.shared.take() {
            shared.resolve(result);
        }
    }
}

impl<T: Clone + Send + 'static> Drop for Promise<T> {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.take() {
            shared.resolve(Err(ClientError::Internal(
                "promise dropped without a value".to_string(),
            )));
        }
    }
}

impl<T: Clone + Send + 'static> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("resolved", &self.shared.is_none())
            .finish()
    }
}

/// Handle to the eventual result of a workflow
pub struct JobFuture<T> {
    shared: Arc<Shared<T>>,
    token: CancellationToken,
}

impl<T> Clone for JobFuture<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            token: self.token.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> fmt::Debug for JobFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobFuture")
            .field("ready", &self.is_ready())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl<T: Clone + Send + 'static> JobFuture<T> {
    /// Creates an already-resolved future
    pub fn ready(result: Result<T>) -> Self {
        let (promise, future) = Promise::channel();
        promise.set_value(result);
        future
    }

    /// Registers a continuation.
    ///
    /// Runs `f` right away on the calling thread when the result is already
    /// set, otherwise exactly once on the thread that resolves the future.
    pub fn on_ready<F>(&self, f: F)
    where
        F: FnOnce(Result<T>) + Send + 'static,
    {
        let result = {
            let mut state = self.shared.lock();
            match &mut *state {
                State::Pending(pending) => {
                    pending.push(Box::new(f));
                    return;
                }
                State::Ready(result) => result.clone(),
            }
        };
        f(result);
    }

    /// Chains a continuation producing a new future.
    ///
    /// The returned future shares this future's cancellation token.
    pub fn then<U, F>(&self, f: F) -> JobFuture<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(Result<T>) -> Result<U> + Send + 'static,
    {
        let (promise, future) = Promise::channel_with_token(self.token.clone());
        self.on_ready(move |result| promise.set_value(f(result)));
        future
    }

    /// Waits for the result without blocking the runtime
    pub async fn get(&self) -> Result<T> {
        loop {
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a concurrent resolve is not missed
            notified.as_mut().enable();
            if let Some(result) = self.shared.peek() {
                return result;
            }
            notified.await;
        }
    }

    /// Blocks the current thread until the result is set.
    ///
    /// Must not be called from inside an async runtime worker.
    pub fn wait(&self) -> Result<T> {
        let mut state = self.shared.lock();
        loop {
            if let State::Ready(result) = &*state {
                return result.clone();
            }
            state = self
                .shared
                .ready
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Returns the result if already set
    pub fn try_get(&self) -> Option<Result<T>> {
        self.shared.peek()
    }

    pub fn is_ready(&self) -> bool {
        matches!(&*self.shared.lock(), State::Ready(_))
    }

    /// Asks the producing workflow to stop
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl<T: Clone + Send + 'static> IntoFuture for JobFuture<T> {
    type Output = Result<T>;
    type IntoFuture = Pin<Box<dyn Future<Output = Result<T>> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move { self.get().await })
    }
}
