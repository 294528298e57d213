use std::collections::BTreeMap;
use std::sync::Arc;

use crate::{chain_adapter::ChainAdapter, types::ChainId, Error};

/// Chain id to adapter mapping. Filled before start, read-only afterwards.
#[derive(Default, Clone)]
pub struct AdapterRegistry {
    adapters: BTreeMap<ChainId, Arc<dyn ChainAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, adapter: Arc<dyn ChainAdapter>) -> Result<(), Error> {
        let chain_id = adapter.chain_id().clone();
        if self.adapters.contains_key(&chain_id) {
            return Err(Error::AlreadyRegistered(chain_id));
        }
        self.adapters.insert(chain_id, adapter);
        Ok(())
    }

    pub fn contains(&self, chain_id: &ChainId) -> bool {
        self.adapters.contains_key(chain_id)
    }

    pub fn chain_ids(&self) -> impl Iterator<Item = &ChainId> {
        self.adapters.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ChainId, &Arc<dyn ChainAdapter>)> {
        self.adapters.iter()
    }

    pub(crate) fn len(&self) -> usize {
        self.adapters.len()
    }
}
