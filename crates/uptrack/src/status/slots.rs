use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use crate::model::ServiceId;

/// One per-service cache cell; holding its lock serializes recompute and update
pub(crate) type Slot<T> = Arc<Mutex<Option<T>>>;

/// Map of per-service cache cells with get-or-create semantics
pub(crate) struct KeyedSlots<T> {
    slots: RwLock<HashMap<ServiceId, Slot<T>>>,
}

impl<T> KeyedSlots<T> {
    pub(crate) fn new() -> Self {
        Self { slots: RwLock::new(HashMap::new()) }
    }

    pub(crate) async fn get_or_create(&self, id: ServiceId) -> Slot<T> {
        if let Some(slot) = self.slots.read().await.get(&id) {
            return Arc::clone(slot);
        }
        let mut slots = self.slots.write().await;
        Arc::clone(slots.entry(id).or_insert_with(|| Arc::new(Mutex::new(None))))
    }

    pub(crate) async fn existing(&self, id: ServiceId) -> Option<Slot<T>> {
        self.slots.read().await.get(&id).cloned()
    }

    pub(crate) async fn clear(&self) {
        self.slots.write().await.clear();
    }
}
