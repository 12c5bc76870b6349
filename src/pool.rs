//! Fixed-size pool handing instances out to one caller at a time.

use crate::error::AppError;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use tokio::sync::{Semaphore, SemaphorePermit};

pub struct Pool<T> {
    idle: Mutex<VecDeque<T>>,
    permits: Semaphore,
    size: usize,
}

impl<T> Pool<T> {
    pub fn new(items: Vec<T>) -> Self {
        let size = items.len();
        Self {
            idle: Mutex::new(items.into()),
            permits: Semaphore::new(size),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Waits until an instance is free. Waiters are served in arrival order.
    pub async fn acquire(&self) -> Result<PoolGuard<'_, T>, AppError> {
        let permit = self.permits.acquire().await.map_err(|_| AppError::PoolClosed)?;
        // A permit is only ever outstanding while its item is checked out.
        let item = self.idle.lock().pop_front().ok_or(AppError::PoolClosed)?;
        Ok(PoolGuard {
            pool: self,
            item: Some(item),
            _permit: permit,
        })
    }

    /// Stops handing out instances and returns all of them for shutdown.
    pub fn into_items(self) -> Vec<T> {
        self.permits.close();
        self.idle.into_inner().into()
    }
}

pub struct PoolGuard<'a, T> {
    pool: &'a Pool<T>,
    item: Option<T>,
    _permit: SemaphorePermit<'a>,
}

impl<T> PoolGuard<'_, T> {
    pub fn release(self) {}
}

impl<T> Deref for PoolGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.item.as_ref().expect("pool item present until drop")
    }
}

impl<T> DerefMut for PoolGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.item.as_mut().expect("pool item present until drop")
    }
}

impl<T> Drop for PoolGuard<'_, T> {
    fn drop(&mut self) {
        // Item goes back before the permit is released by the field drop.
        if let Some(item) = self.item.take() {
            self.pool.idle.lock().push_back(item);
        }
    }
}
