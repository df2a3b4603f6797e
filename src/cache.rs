use crate::clock::Clock;
use crate::config::CorsConfig;
use crate::headers::PreflightHeaders;
use crate::origin::Origin;
use crate::util::{equals_ignore_case, is_cache_exempt_method, split_tokens};
use log::debug;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::{Duration, Instant};
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub with_credentials: bool,
    pub origin: Origin,
    pub uri: String,
}

impl CacheKey {
    pub fn new(uri: &Url, origin: &Origin, with_credentials: bool) -> Self {
        Self {
            with_credentials,
            origin: origin.clone(),
            uri: uri.as_str().to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedToken {
    pub token: String,
    pub expires_at: Instant,
}

/// Methods and headers a server approved for one key.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub methods: Vec<CachedToken>,
    pub headers: Vec<CachedToken>,
}

impl CacheEntry {
    /// Drops every token whose expiry is at or before `now`.
    pub fn purge_expired(&mut self, now: Instant) {
        self.methods.retain(|cached| cached.expires_at > now);
        self.headers.retain(|cached| cached.expires_at > now);
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty() && self.headers.is_empty()
    }

    /// Whether `method` and every header in `headers` are still approved.
    pub fn check_request(&mut self, now: Instant, method: &str, headers: &PreflightHeaders) -> bool {
        self.purge_expired(now);

        if !is_cache_exempt_method(method)
            && !self.methods.iter().any(|cached| cached.token == method)
        {
            return false;
        }

        headers.iter().all(|header| {
            self.headers
                .iter()
                .any(|cached| equals_ignore_case(&cached.token, header))
        })
    }

    fn refresh_method(&mut self, method: &str, expires_at: Instant) {
        match self.methods.iter_mut().find(|cached| cached.token == method) {
            Some(cached) => cached.expires_at = expires_at,
            None => self.methods.push(CachedToken {
                token: method.to_owned(),
                expires_at,
            }),
        }
    }

    fn refresh_header(&mut self, header: &str, expires_at: Instant) {
        match self
            .headers
            .iter_mut()
            .find(|cached| equals_ignore_case(&cached.token, header))
        {
            Some(cached) => cached.expires_at = expires_at,
            None => self.headers.push(CachedToken {
                token: header.to_owned(),
                expires_at,
            }),
        }
    }
}

struct Slot {
    key: CacheKey,
    entry: CacheEntry,
    prev: Option<usize>,
    next: Option<usize>,
}

pub struct PreflightCache {
    capacity: usize,
    max_age_cap: u32,
    index: HashMap<CacheKey, usize>,
    slots: Vec<Option<Slot>>,
    free: Vec<usize>,
    /// Most recently used.
    head: Option<usize>,
    tail: Option<usize>,
    clock: Rc<dyn Clock>,
}

impl PreflightCache {
    pub fn new(config: &CorsConfig, clock: Rc<dyn Clock>) -> Self {
        let capacity = config.cache_capacity.max(1);
        Self {
            capacity,
            max_age_cap: config.max_age_cap,
            index: HashMap::with_capacity(capacity),
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            head: None,
            tail: None,
            clock,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    /// Keys from most to least recently used.
    pub fn keys(&self) -> impl Iterator<Item = &CacheKey> + '_ {
        let mut cursor = self.head;
        std::iter::from_fn(move || {
            let slot = self.slots[cursor?].as_ref()?;
            cursor = slot.next;
            Some(&slot.key)
        })
    }

    pub fn clear(&mut self) {
        self.index.clear();
        self.slots.clear();
        self.free.clear();
        self.head = None;
        self.tail = None;
    }

    /// Looks `key` up, promoting it to most recently used. With `create`, a
    /// missing key gets a fresh empty entry, evicting to stay within capacity.
    pub fn get_or_create(&mut self, key: &CacheKey, create: bool) -> Option<&mut CacheEntry> {
        if let Some(&slot) = self.index.get(key) {
            self.unlink(slot);
            self.push_front(slot);
            return self.slots[slot].as_mut().map(|slot| &mut slot.entry);
        }

        if !create {
            return None;
        }

        if self.index.len() >= self.capacity {
            self.purge_empty_entries();
            if self.index.len() >= self.capacity {
                self.evict_least_recent();
            }
        }

        let slot = self.allocate(key.clone());
        self.index.insert(key.clone(), slot);
        self.push_front(slot);
        debug_assert!(self.index.len() <= self.capacity);

        self.slots[slot].as_mut().map(|slot| &mut slot.entry)
    }

    /// Whether the cached answer for `key` still covers `method` and `headers`.
    pub fn check_request(&mut self, key: &CacheKey, method: &str, headers: &PreflightHeaders) -> bool {
        let now = self.now();
        self.get_or_create(key, false)
            .is_some_and(|entry| entry.check_request(now, method, headers))
    }

    /// Forgets both credentials modes for `(uri, origin)`.
    pub fn remove_entries(&mut self, uri: &Url, origin: &Origin) {
        for with_credentials in [true, false] {
            let key = CacheKey::new(uri, origin, with_credentials);
            if let Some(slot) = self.index.get(&key).copied() {
                self.remove_slot(slot);
            }
        }
    }

    /// Stores the approvals of a successful preflight. Nothing is recorded
    /// unless `max_age` is a plain decimal number above zero. Returns whether
    /// anything was stored.
    pub fn record_preflight_result(
        &mut self,
        uri: &Url,
        origin: &Origin,
        with_credentials: bool,
        methods_header: &str,
        headers_header: &str,
        max_age: &str,
    ) -> bool {
        let Some(age) = parse_max_age(max_age, self.max_age_cap) else {
            return false;
        };

        let expires_at = self.now() + Duration::from_secs(u64::from(age));
        let key = CacheKey::new(uri, origin, with_credentials);
        let Some(entry) = self.get_or_create(&key, true) else {
            return false;
        };

        for method in split_tokens(methods_header) {
            entry.refresh_method(method, expires_at);
        }
        for header in split_tokens(headers_header) {
            entry.refresh_header(header, expires_at);
        }

        debug!("cached preflight for {uri} from {origin:?} for {age}s");
        true
    }

    fn purge_empty_entries(&mut self) {
        let now = self.now();
        let mut empty = Vec::new();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if let Some(slot) = slot {
                slot.entry.purge_expired(now);
                if slot.entry.is_empty() {
                    empty.push(index);
                }
            }
        }
        for index in empty {
            self.remove_slot(index);
        }
    }

    fn evict_least_recent(&mut self) {
        if let Some(tail) = self.tail {
            if let Some(slot) = self.slots[tail].as_ref() {
                debug!("evicting preflight cache entry for {}", slot.key.uri);
            }
            self.remove_slot(tail);
        }
    }

    fn allocate(&mut self, key: CacheKey) -> usize {
        let slot = Slot {
            key,
            entry: CacheEntry::default(),
            prev: None,
            next: None,
        };
        match self.free.pop() {
            Some(index) => {
                self.slots[index] = Some(slot);
                index
            }
            None => {
                self.slots.push(Some(slot));
                self.slots.len() - 1
            }
        }
    }

    fn remove_slot(&mut self, index: usize) {
        self.unlink(index);
        if let Some(slot) = self.slots[index].take() {
            self.index.remove(&slot.key);
            self.free.push(index);
        }
    }

    fn unlink(&mut self, index: usize) {
        let Some((prev, next)) = self.slots[index].as_ref().map(|slot| (slot.prev, slot.next))
        else {
            return;
        };

        match prev {
            Some(prev) => self.link_mut(prev).next = next,
            None if self.head == Some(index) => self.head = next,
            None => {}
        }
        match next {
            Some(next) => self.link_mut(next).prev = prev,
            None if self.tail == Some(index) => self.tail = prev,
            None => {}
        }

        let slot = self.link_mut(index);
        slot.prev = None;
        slot.next = None;
    }

    fn push_front(&mut self, index: usize) {
        let old_head = self.head;
        {
            let slot = self.link_mut(index);
            slot.prev = None;
            slot.next = old_head;
        }
        if let Some(old_head) = old_head {
            self.link_mut(old_head).prev = Some(index);
        }
        self.head = Some(index);
        if self.tail.is_none() {
            self.tail = Some(index);
        }
    }

    fn link_mut(&mut self, index: usize) -> &mut Slot {
        match self.slots[index].as_mut() {
            Some(slot) => slot,
            None => unreachable!("linked slot {index} is vacant"),
        }
    }
}

/// Strict `delta-seconds`: ASCII digits only, capped at `cap`. Zero, empty or
/// anything else yields `None`.
pub fn parse_max_age(value: &str, cap: u32) -> Option<u32> {
    let mut age: u32 = 0;
    for byte in value.bytes() {
        if !byte.is_ascii_digit() {
            return None;
        }
        age = age
            .saturating_mul(10)
            .saturating_add(u32::from(byte - b'0'))
            .min(cap);
    }
    (age > 0).then_some(age)
}

#[cfg(test)]
#[path = "cache_test.rs"]
mod cache_test;
