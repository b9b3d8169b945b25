//! Resource construction callbacks

use std::future::Future;

use async_trait::async_trait;

use crate::errors::BoxError;

/// Builds the resources a pool hands out.
///
/// The pool always calls `create` outside of its lock, so a slow factory
/// only delays the growth task, never other borrowers.
#[async_trait]
pub trait ResourceFactory<T>: Send + Sync + 'static {
    async fn create(&self) -> Result<T, BoxError>;
}

/// Adapter for a synchronous constructor closure
///
/// # Examples
///
/// ```
/// use esox_resourcepool::{FnFactory, ResourceFactory};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let factory = FnFactory::new(|| Ok::<_, std::io::Error>(String::from("channel")));
/// assert_eq!(factory.create().await.unwrap(), "channel");
/// # }
/// ```
pub struct FnFactory<F> {
    f: F,
}

impl<F> FnFactory<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<T, E, F> ResourceFactory<T> for FnFactory<F>
where
    F: Fn() -> Result<T, E> + Send + Sync + 'static,
    E: Into<BoxError> + 'static,
    T: Send + 'static,
{
    async fn create(&self) -> Result<T, BoxError> {
        (self.f)().map_err(Into::into)
    }
}

/// Adapter for an asynchronous constructor closure
pub struct AsyncFnFactory<F> {
    f: F,
}

impl<F> AsyncFnFactory<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<T, E, F, Fut> ResourceFactory<T> for AsyncFnFactory<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    E: Into<BoxError> + Send + 'static,
    T: Send + 'static,
{
    async fn create(&self) -> Result<T, BoxError> {
        (self.f)().await.map_err(Into::into)
    }
}
