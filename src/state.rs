use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use dashmap::DashMap;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::engine::optimizer::{NearestNeighborOptimizer, Optimizer};
use crate::error::AppError;
use crate::models::event::DispatchEvent;
use crate::models::exception::LogisticsException;
use crate::models::fleet::{Driver, Vehicle};
use crate::models::order::Order;
use crate::models::route::Route;
use crate::observability::metrics::Metrics;

const FIRST_REFERENCE_NUMBER: u64 = 10001;

pub struct AppState {
    pub orders: DashMap<Uuid, Order>,
    pub routes: DashMap<Uuid, Route>,
    pub drivers: DashMap<Uuid, Driver>,
    pub vehicles: DashMap<Uuid, Vehicle>,
    pub exceptions: DashMap<Uuid, LogisticsException>,
    pub(crate) tracking_index: DashMap<String, Uuid>,
    pub(crate) reference_index: DashMap<String, Uuid>,
    next_reference: AtomicU64,
    write_gate: Mutex<()>,
    pub optimizer: Arc<dyn Optimizer>,
    pub events_tx: broadcast::Sender<DispatchEvent>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(event_buffer_size: usize) -> Self {
        Self::with_optimizer(event_buffer_size, Arc::new(NearestNeighborOptimizer))
    }

    pub fn with_optimizer(event_buffer_size: usize, optimizer: Arc<dyn Optimizer>) -> Self {
        let (events_tx, _unused_rx) = broadcast::channel(event_buffer_size);

        Self {
            orders: DashMap::new(),
            routes: DashMap::new(),
            drivers: DashMap::new(),
            vehicles: DashMap::new(),
            exceptions: DashMap::new(),
            tracking_index: DashMap::new(),
            reference_index: DashMap::new(),
            next_reference: AtomicU64::new(FIRST_REFERENCE_NUMBER),
            write_gate: Mutex::new(()),
            optimizer,
            events_tx,
            metrics: Metrics::new(),
        }
    }

    /// Every mutation checks legality and applies its change while holding this
    /// guard, so at most one transition per entity wins. Never hold it across
    /// an `.await`.
    pub fn write_gate(&self) -> Result<MutexGuard<'_, ()>, AppError> {
        self.write_gate
            .lock()
            .map_err(|_| AppError::Internal("state write gate poisoned".to_string()))
    }

    pub fn publish(&self, event: DispatchEvent) {
        // No subscribers is fine.
        let _ = self.events_tx.send(event);
    }

    pub(crate) fn next_reference_code(&self) -> String {
        loop {
            let number = self.next_reference.fetch_add(1, Ordering::Relaxed);
            let code = format!("CF-{number}");
            if !self.reference_index.contains_key(&code) {
                return code;
            }
        }
    }

    pub fn order(&self, id: Uuid) -> Result<Order, AppError> {
        self.orders
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))
    }

    pub fn route(&self, id: Uuid) -> Result<Route, AppError> {
        self.routes
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("route {id} not found")))
    }

    pub fn order_by_token(&self, token: &str) -> Option<Order> {
        let id = *self.tracking_index.get(token)?.value();
        self.orders.get(&id).map(|entry| entry.value().clone())
    }
}
