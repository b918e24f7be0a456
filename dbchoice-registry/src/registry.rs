//! The choice registry: default registration, cache-through reads, and enum memoization.

use crate::enums::ChoiceEnum;
use dbchoice_core::{
    generate_cache_key, normalize_defaults, Choice, ChoiceFilters, DbChoiceResult, DefaultChoice,
    DerivedEnum, IdentifierWarning, RawChoice, RegistryConfig,
};
use dbchoice_storage::{CacheBackend, ChoiceStore};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Outcome of a successful `register_defaults` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationReport {
    pub group_name: String,
    pub registered: usize,
    /// Names that are not valid enum member identifiers. The choices were
    /// still registered.
    pub warnings: Vec<IdentifierWarning>,
}

/// Process-wide mapping from group name to its ordered `(value, label)` list.
///
/// Reads go through the cache backend and fall back to the store; the store
/// is queried only by [`get_choices`](Self::get_choices). Derived enums are
/// memoized under the same cache key as the list they were built from.
///
/// Construct one per process and share it through `Arc`. In-memory state is
/// behind `std::sync::RwLock`s that are never held across an `.await`.
pub struct ChoiceRegistry<S: ?Sized, C: ?Sized> {
    store: Arc<S>,
    cache: Arc<C>,
    config: RegistryConfig,
    defaults: RwLock<BTreeMap<String, Vec<DefaultChoice>>>,
    memo: RwLock<EnumMemo>,
}

/// Memoized enums plus invalidation generations.
///
/// A derivation that started before an invalidation of its key must not be
/// memoized; comparing generations taken before and after detects that.
#[derive(Default)]
struct EnumMemo {
    enums: HashMap<String, Arc<DerivedEnum>>,
    generations: HashMap<String, u64>,
    /// Bumped by `reset`, which invalidates every key at once.
    epoch: u64,
}

impl EnumMemo {
    fn generation(&self, key: &str) -> u64 {
        self.epoch + self.generations.get(key).copied().unwrap_or(0)
    }

    fn invalidate(&mut self, key: &str) {
        self.enums.remove(key);
        *self.generations.entry(key.to_string()).or_insert(0) += 1;
    }
}

// Nothing that can panic runs while these guards are held, so a poisoned
// lock still holds consistent state.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<S, C> ChoiceRegistry<S, C>
where
    S: ChoiceStore + ?Sized,
    C: CacheBackend + ?Sized,
{
    /// Create a registry after validating `config`.
    pub fn new(store: Arc<S>, cache: Arc<C>, config: RegistryConfig) -> DbChoiceResult<Self> {
        config.validate()?;
        Ok(Self {
            store,
            cache,
            config,
            defaults: RwLock::new(BTreeMap::new()),
            memo: RwLock::new(EnumMemo::default()),
        })
    }

    /// Create a registry with the default configuration.
    pub fn with_defaults(store: Arc<S>, cache: Arc<C>) -> Self {
        Self {
            store,
            cache,
            config: RegistryConfig::default(),
            defaults: RwLock::new(BTreeMap::new()),
            memo: RwLock::new(EnumMemo::default()),
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn cache(&self) -> &Arc<C> {
        &self.cache
    }

    /// The cache key addressing `group_name` narrowed by `filters`.
    pub fn cache_key(&self, group_name: &str, filters: &ChoiceFilters) -> String {
        generate_cache_key(&self.config.cache_namespace, group_name, filters)
    }

    // ========================================================================
    // REGISTRATION
    // ========================================================================

    /// Register the default `(name, value, label)` triples of `group_name`,
    /// replacing any earlier registration of that group.
    ///
    /// Parts may be strings or integers and are stored as strings. Wrong
    /// arity, unsupported part types, and duplicate names or values fail the
    /// whole call. Names that are not valid identifiers are logged and
    /// reported but still registered.
    pub fn register_defaults<I>(&self, group_name: &str, choices: I) -> DbChoiceResult<RegistrationReport>
    where
        I: IntoIterator,
        I::Item: Into<RawChoice>,
    {
        let normalized = normalize_defaults(group_name, choices)?;
        Ok(self.store_defaults(group_name, normalized.choices, normalized.warnings))
    }

    /// Register the members of a [`ChoiceEnum`] as defaults.
    ///
    /// Each member contributes `(member name, value, label)`; members without
    /// an explicit label use their name. The group defaults to the enum's
    /// type name.
    pub fn register_enum<E: ChoiceEnum>(&self, group_name: Option<&str>) -> DbChoiceResult<RegistrationReport> {
        let group_name = group_name.unwrap_or_else(|| E::type_name());
        let choices: Vec<RawChoice> = E::members()
            .into_iter()
            .map(|member| member.into_raw())
            .collect();
        self.register_defaults(group_name, choices)
    }

    /// Register every group of a TOML defaults document.
    ///
    /// Each top-level key names a group whose value is an array of
    /// `[name, value, label]` arrays. Nothing is registered unless every
    /// group validates.
    pub fn register_from_toml(&self, document: &str) -> DbChoiceResult<Vec<RegistrationReport>> {
        let groups = crate::defaults_file::parse_defaults(document)?;

        let mut normalized = Vec::with_capacity(groups.len());
        for (group_name, choices) in groups {
            let batch = normalize_defaults(&group_name, choices)?;
            normalized.push((group_name, batch));
        }

        Ok(normalized
            .into_iter()
            .map(|(group_name, batch)| self.store_defaults(&group_name, batch.choices, batch.warnings))
            .collect())
    }

    fn store_defaults(
        &self,
        group_name: &str,
        choices: Vec<DefaultChoice>,
        warnings: Vec<IdentifierWarning>,
    ) -> RegistrationReport {
        for warning in &warnings {
            tracing::warn!(
                group_name = %warning.group_name,
                index = warning.index,
                name = %warning.name,
                "{}",
                warning
            );
        }

        let registered = choices.len();
        write(&self.defaults).insert(group_name.to_string(), choices);
        tracing::debug!(group_name = %group_name, registered, "registered default choices");

        RegistrationReport {
            group_name: group_name.to_string(),
            registered,
            warnings,
        }
    }

    /// Names of all registered groups, sorted.
    pub fn registered_groups(&self) -> Vec<String> {
        read(&self.defaults).keys().cloned().collect()
    }

    /// The normalized defaults registered for `group_name`.
    pub fn registered_defaults(&self, group_name: &str) -> Option<Vec<DefaultChoice>> {
        read(&self.defaults).get(group_name).cloned()
    }

    pub(crate) fn defaults_snapshot(&self) -> BTreeMap<String, Vec<DefaultChoice>> {
        read(&self.defaults).clone()
    }

    /// Drop all registrations and memoized enums. Cache entries are left to
    /// expire or be invalidated.
    pub fn reset(&self) {
        write(&self.defaults).clear();
        let mut memo = write(&self.memo);
        memo.enums.clear();
        memo.epoch += 1;
    }

    // ========================================================================
    // READS
    // ========================================================================

    /// The `(value, label)` pairs of `group_name` in display order.
    ///
    /// Served from cache when present; otherwise the store is queried and the
    /// result cached for the configured TTL. An unknown group yields an empty
    /// list.
    pub async fn get_choices(&self, group_name: &str, filters: &ChoiceFilters) -> DbChoiceResult<Vec<Choice>> {
        let key = self.cache_key(group_name, filters);
        let generation = read(&self.memo).generation(&key);

        if let Some(choices) = self.cache.get(&key).await? {
            tracing::debug!(cache_key = %key, "choice cache hit");
            return Ok(choices);
        }
        tracing::debug!(cache_key = %key, "choice cache miss");

        let choices: Vec<Choice> = self
            .store
            .query(group_name, filters)
            .await?
            .iter()
            .map(|record| record.to_choice())
            .collect();

        // Rows read before an invalidation must not repopulate the cache.
        let still_current = read(&self.memo).generation(&key) == generation;
        if still_current {
            self.cache.set(&key, &choices, self.config.cache_ttl).await?;
        }
        Ok(choices)
    }

    /// Label of `value` in `group_name`, or `None` when the value is unknown.
    pub async fn get_label(
        &self,
        group_name: &str,
        value: &str,
        filters: &ChoiceFilters,
    ) -> DbChoiceResult<Option<String>> {
        Ok(self
            .get_choices(group_name, filters)
            .await?
            .into_iter()
            .find(|choice| choice.value == value)
            .map(|choice| choice.label))
    }

    /// The derived enum for `group_name` narrowed by `filters`.
    ///
    /// Repeated calls return the same `Arc` until the key is invalidated.
    /// Fails with `EmptyGroup` when the group has no choices.
    pub async fn get_enum(&self, group_name: &str, filters: &ChoiceFilters) -> DbChoiceResult<Arc<DerivedEnum>> {
        let key = self.cache_key(group_name, filters);
        let (memoized, generation) = {
            let memo = read(&self.memo);
            (memo.enums.get(&key).cloned(), memo.generation(&key))
        };
        if let Some(derived) = memoized {
            return Ok(derived);
        }

        let choices = self.get_choices(group_name, filters).await?;
        let derived = Arc::new(DerivedEnum::derive(
            group_name,
            &choices,
            &self.config.enum_guard_prefix,
        )?);

        let mut memo = write(&self.memo);
        if memo.generation(&key) != generation {
            tracing::debug!(cache_key = %key, "key invalidated during enum derivation, not memoizing");
            return Ok(derived);
        }
        // A concurrent caller may have won; keep whichever landed first.
        Ok(Arc::clone(memo.enums.entry(key).or_insert(derived)))
    }

    /// Whether a derived enum is memoized for this key.
    pub fn has_memoized_enum(&self, group_name: &str, filters: &ChoiceFilters) -> bool {
        read(&self.memo)
            .enums
            .contains_key(&self.cache_key(group_name, filters))
    }

    // ========================================================================
    // INVALIDATION
    // ========================================================================

    /// Purge the cached list and memoized enum for exactly this key.
    ///
    /// Entries cached under other filter combinations of the same group are
    /// not touched.
    pub async fn invalidate_cache(&self, group_name: &str, filters: &ChoiceFilters) -> DbChoiceResult<()> {
        let key = self.cache_key(group_name, filters);
        write(&self.memo).invalidate(&key);
        self.cache.delete(&key).await?;
        tracing::debug!(cache_key = %key, "invalidated choice cache");
        Ok(())
    }
}

impl<S: ?Sized, C: ?Sized> std::fmt::Debug for ChoiceRegistry<S, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChoiceRegistry")
            .field("config", &self.config)
            .field("groups", &read(&self.defaults).len())
            .field("memoized_enums", &read(&self.memo).enums.len())
            .finish()
    }
}
