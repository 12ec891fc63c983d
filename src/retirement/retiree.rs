use futures::future::{self, BoxFuture, FutureExt};
use tokio::sync::oneshot;

/// Future returned by [`Retiree::retire`]. The manager never awaits it while
/// holding its lock.
pub type RetireFuture = BoxFuture<'static, ()>;

/// The action to take once a message may be reported complete.
///
/// `retire` consumes the handle, so it can run at most once.
pub trait Retiree: Send + 'static {
    fn retire(self) -> RetireFuture;
}

impl<F> Retiree for F
where
    F: FnOnce() -> RetireFuture + Send + 'static,
{
    fn retire(self) -> RetireFuture {
        self()
    }
}

/// An already finished [`RetireFuture`], for synchronous retirees.
pub fn retired() -> RetireFuture {
    future::ready(()).boxed()
}

/// Retiree that wakes a caller waiting on the paired receiver.
#[derive(Debug)]
pub struct NotifyRetiree {
    sender: oneshot::Sender<()>,
}

impl NotifyRetiree {
    pub fn pair() -> (Self, oneshot::Receiver<()>) {
        let (sender, receiver) = oneshot::channel();
        (Self { sender }, receiver)
    }
}

impl Retiree for NotifyRetiree {
    fn retire(self) -> RetireFuture {
        // A dropped receiver means the caller went away; nothing left to notify.
        let _ = self.sender.send(());
        retired()
    }
}
