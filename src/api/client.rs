use anyhow::{anyhow, Context, Result};
use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::sleep;
use std::time::Duration;
use tracing::debug;

use super::cache::ResponseCache;
use super::model::{NamedResource, Pokemon, ResourceList, Species};
use super::resource::Resource;
use crate::schema::SpeciesId;

pub const DEFAULT_BASE_URL: &str = "https://pokeapi.co/api/v2";
const USER_AGENT: &str = "pokedex-etl";

/// Fetches one JSON document by absolute URL
pub trait Transport {
    fn get_json(&self, url: &str) -> Result<Value>;
}

/// Blocking HTTP transport
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn get_json(&self, url: &str) -> Result<Value> {
        let response = self
            .client
            .get(url)
            .send()
            .with_context(|| format!("Request failed: {}", url))?
            .error_for_status()
            .with_context(|| format!("Bad status from {}", url))?;

        response
            .json()
            .with_context(|| format!("Failed to parse JSON from {}", url))
    }
}

/// Base URL the in-memory transport strips from incoming requests
pub const MEMORY_BASE_URL: &str = "memory://pokeapi";

/// In-memory transport serving documents keyed by resource path.
///
/// Clones share state, so a test can keep a handle to inspect the request log
/// after handing the transport to a client.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    documents: Arc<Mutex<HashMap<String, Value>>>,
    failures: Arc<Mutex<HashMap<String, u32>>>,
    requests: Arc<Mutex<Vec<String>>>,
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, resource: &Resource, document: Value) {
        locked(&self.documents).insert(resource.path(), document);
    }

    /// Make the next `times` requests for `resource` fail
    pub fn fail_next(&self, resource: &Resource, times: u32) {
        locked(&self.failures).insert(resource.path(), times);
    }

    /// Every request path received so far, in order
    pub fn requests(&self) -> Vec<String> {
        locked(&self.requests).clone()
    }

    pub fn request_count(&self, resource: &Resource) -> usize {
        let path = resource.path();
        locked(&self.requests).iter().filter(|p| **p == path).count()
    }
}

impl Transport for MemoryTransport {
    fn get_json(&self, url: &str) -> Result<Value> {
        let path = url
            .strip_prefix(MEMORY_BASE_URL)
            .map(|p| p.trim_start_matches('/'))
            .unwrap_or(url)
            .to_string();
        locked(&self.requests).push(path.clone());

        if let Some(remaining) = locked(&self.failures).get_mut(&path) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(anyhow!("Simulated failure for {}", path));
            }
        }

        locked(&self.documents)
            .get(&path)
            .cloned()
            .ok_or_else(|| anyhow!("404 Not Found: {}", path))
    }
}

/// Politeness and retry settings for remote requests
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Sleep before every network call
    pub request_delay: Duration,
    /// Sleep between failed attempts
    pub retry_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            request_delay: Duration::from_millis(100),
            retry_backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// No sleeping at all; for tests and in-memory fixtures
    pub fn immediate() -> Self {
        Self {
            request_delay: Duration::ZERO,
            retry_backoff: Duration::ZERO,
            ..Self::default()
        }
    }
}

/// PokéAPI client with rate limiting, retries and a per-run response cache
pub struct ApiClient<T: Transport = HttpTransport> {
    transport: T,
    base_url: String,
    policy: RetryPolicy,
    cache: ResponseCache,
}

impl ApiClient<HttpTransport> {
    pub fn http(base_url: impl Into<String>, policy: RetryPolicy) -> Result<Self> {
        Ok(Self::new(HttpTransport::new()?, base_url, policy))
    }
}

impl<T: Transport> ApiClient<T> {
    pub fn new(transport: T, base_url: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            transport,
            base_url: base_url.into(),
            policy,
            cache: ResponseCache::new(),
        }
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Fetch a document, from the cache when this run has already seen it
    pub fn fetch(&mut self, resource: &Resource) -> Result<Value> {
        let key = resource.path();
        if let Some(value) = self.cache.get(&key) {
            return Ok(value.clone());
        }

        let url = resource.url(&self.base_url);
        let value = self.fetch_with_retry(&url)?;
        self.cache.insert(key, value.clone());
        Ok(value)
    }

    fn fetch_with_retry(&self, url: &str) -> Result<Value> {
        let attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            if !self.policy.request_delay.is_zero() {
                sleep(self.policy.request_delay);
            }

            match self.transport.get_json(url) {
                Ok(value) => {
                    debug!(url, attempt, "fetched");
                    return Ok(value);
                }
                Err(e) if attempt < attempts => {
                    debug!(url, attempt, error = %e, "request failed, retrying");
                    if !self.policy.retry_backoff.is_zero() {
                        sleep(self.policy.retry_backoff);
                    }
                }
                Err(e) => {
                    return Err(e.context(format!("Giving up on {} after {} attempts", url, attempt)));
                }
            }
        }
    }

    /// Fetch a document and project it onto a typed model
    pub fn fetch_as<D: DeserializeOwned>(&mut self, resource: &Resource) -> Result<D> {
        let value = self.fetch(resource)?;
        serde_json::from_value(value)
            .with_context(|| format!("Unexpected document shape for {}", resource.path()))
    }

    /// Fetch every entry of a list resource, following `next` pages
    pub fn fetch_list(&mut self, resource: &Resource) -> Result<Vec<NamedResource>> {
        let mut entries = Vec::new();
        let mut next = Some(resource.clone());

        while let Some(page) = next.take() {
            let list: ResourceList = self.fetch_as(&page)?;
            entries.extend(list.results);
            next = list.next.map(Resource::Page);
        }

        Ok(entries)
    }

    /// Name of the default Pokémon form of a species, or the species name itself
    pub fn species_to_default_form(&mut self, species_name: &str) -> Result<String> {
        let species: Species = self.fetch_as(&Resource::species(species_name))?;
        Ok(species
            .default_variety()
            .unwrap_or(species_name)
            .to_string())
    }

    /// Numeric id of a species' default form
    pub fn species_name_to_id(&mut self, species_name: &str) -> Result<SpeciesId> {
        let form = self.species_to_default_form(species_name)?;
        let pokemon: Pokemon = self.fetch_as(&Resource::pokemon(&form))?;
        Ok(pokemon.id)
    }
}
