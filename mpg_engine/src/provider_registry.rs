use std::{collections::HashMap, sync::Arc};

use log::*;

use crate::{
    db_types::PaymentMethod,
    traits::{PaymentProvider, ProviderError},
};

/// Maps a payment method tag to the strategy that handles it. Built once at start-up and shared read-only.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<PaymentMethod, Arc<dyn PaymentProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `provider` under its own method tag, replacing any previous registration.
    pub fn with_provider<P: PaymentProvider + 'static>(self, provider: P) -> Self {
        self.with_shared_provider(Arc::new(provider))
    }

    pub fn with_shared_provider(mut self, provider: Arc<dyn PaymentProvider>) -> Self {
        let method = provider.method();
        if self.providers.insert(method, provider).is_some() {
            warn!("🏦️ A payment provider for {method} was already registered. It has been replaced.");
        } else {
            info!("🏦️ Payment provider registered for {method}");
        }
        self
    }

    pub fn get(&self, method: PaymentMethod) -> Result<Arc<dyn PaymentProvider>, ProviderError> {
        self.providers.get(&method).cloned().ok_or_else(|| ProviderError::Unsupported(method.to_string()))
    }

    pub fn contains(&self, method: PaymentMethod) -> bool {
        self.providers.contains_key(&method)
    }

    /// Registered methods, in a stable order.
    pub fn methods(&self) -> Vec<PaymentMethod> {
        PaymentMethod::ALL.into_iter().filter(|m| self.providers.contains_key(m)).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ProviderRegistry({:?})", self.methods())
    }
}
