use crate::domain::model::CommerceState;
use crate::domain::ports::Store;
use crate::utils::error::Result;
use tokio::sync::RwLock;

/// 記憶體中的 Store。atomic 在複本上執行，成功才替換。
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<CommerceState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: CommerceState) -> Self {
        Self {
            state: RwLock::new(state),
        }
    }

    pub async fn snapshot(&self) -> CommerceState {
        self.state.read().await.clone()
    }
}

impl Store for MemoryStore {
    async fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&CommerceState) -> Result<T> + Send,
        T: Send,
    {
        let state = self.state.read().await;
        f(&state)
    }

    async fn atomic<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut CommerceState) -> Result<T> + Send,
        T: Send,
    {
        // write lock 讓同時進行的交易依序執行
        let mut state = self.state.write().await;
        let mut draft = state.clone();
        let output = f(&mut draft)?;
        *state = draft;
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::Cart;
    use crate::utils::error::CommerceError;
    use std::sync::Arc;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_failed_atomic_leaves_state_untouched() {
        let store = MemoryStore::new();

        let result: Result<()> = store
            .atomic(|state| {
                let cart = Cart::new(Uuid::new_v4());
                state.carts.insert(cart.id, cart);
                Err(CommerceError::validation("rollback"))
            })
            .await;

        assert!(result.is_err());
        assert!(store.snapshot().await.carts.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_atomic_calls_are_serialised() {
        let store = Arc::new(MemoryStore::new());
        let org_id = Uuid::new_v4();

        let mut handles = Vec::new();
        for _ in 0..20 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .atomic(move |state| {
                        let cart = Cart::new(org_id);
                        state.carts.insert(cart.id, cart);
                        Ok(())
                    })
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let count = store.read(|state| Ok(state.carts.len())).await.unwrap();
        assert_eq!(count, 20);
    }
}
