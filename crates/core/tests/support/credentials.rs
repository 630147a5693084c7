use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use caresync_core::CredentialStore;
use caresync_domain::Result as DomainResult;

#[derive(Default)]
struct State {
    secrets: HashMap<String, String>,
    generated: u8,
    deleted: Vec<String>,
}

/// In-memory `CredentialStore` with deterministic key material.
#[derive(Default, Clone)]
pub struct MemoryCredentialStore {
    state: Arc<Mutex<State>>,
}

impl MemoryCredentialStore {
    pub fn set(&self, name: &str, value: &str) {
        self.state.lock().unwrap().secrets.insert(name.to_string(), value.to_string());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.state.lock().unwrap().secrets.contains_key(name)
    }

    pub fn deleted(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted.clone()
    }

    fn fresh_key(state: &mut State, byte_len: usize) -> String {
        state.generated = state.generated.wrapping_add(1);
        let seed = state.generated;
        (0..byte_len).map(|i| format!("{:02x}", (i as u8).wrapping_mul(7).wrapping_add(seed))).collect()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn get_secret(&self, name: &str) -> DomainResult<Option<String>> {
        Ok(self.state.lock().unwrap().secrets.get(name).cloned())
    }

    async fn get_or_create_key(&self, name: &str, byte_len: usize) -> DomainResult<String> {
        let mut state = self.state.lock().unwrap();
        if let Some(key) = state.secrets.get(name) {
            return Ok(key.clone());
        }
        let key = Self::fresh_key(&mut state, byte_len);
        state.secrets.insert(name.to_string(), key.clone());
        Ok(key)
    }

    async fn replace_key(&self, name: &str, byte_len: usize) -> DomainResult<String> {
        let mut state = self.state.lock().unwrap();
        let key = Self::fresh_key(&mut state, byte_len);
        state.secrets.insert(name.to_string(), key.clone());
        Ok(key)
    }

    async fn delete_secret(&self, name: &str) -> DomainResult<()> {
        let mut state = self.state.lock().unwrap();
        state.secrets.remove(name);
        state.deleted.push(name.to_string());
        Ok(())
    }
}
