//! Cross-provider identity reconciliation.
//!
//! Two-stage lookup: exact `(provider, raw id)` alias, then normalized name. This is the only place
//! where identity ambiguity can arise.

use crate::domain::entity::{Alias, CanonicalKey, Entity, Position, ProviderId};
use crate::error::CoreError;
use crate::policy::CrossReferenceEntry;
use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

const NAME_SUFFIXES: [&str; 6] = ["jr", "sr", "ii", "iii", "iv", "v"];

/// Case-fold, drop punctuation and generational suffixes, collapse whitespace.
pub fn normalize_name(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_lowercase().next().unwrap_or(c)
            } else if c == '\'' || c == '\u{2019}' {
                '\0'
            } else {
                ' '
            }
        })
        .filter(|c| *c != '\0')
        .collect();

    let mut tokens: Vec<&str> = cleaned.split_whitespace().collect();
    while tokens.len() > 1 {
        match tokens.last() {
            Some(last) if NAME_SUFFIXES.contains(last) => {
                tokens.pop();
            }
            _ => break,
        }
    }
    tokens.join(" ")
}

fn mint_key(normalized: &str, taken: &BTreeMap<CanonicalKey, Entity>) -> CanonicalKey {
    let base = normalized.replace(' ', "-");
    let mut key = CanonicalKey::new(base.clone());
    let mut n = 2;
    while taken.contains_key(&key) {
        key = CanonicalKey::new(format!("{base}-{n}"));
        n += 1;
    }
    key
}

#[derive(Debug, Default)]
struct Registry {
    entities: BTreeMap<CanonicalKey, Entity>,
    aliases: HashMap<Alias, CanonicalKey>,
    by_name: HashMap<String, Vec<CanonicalKey>>,
}

impl Registry {
    fn insert_entity(&mut self, entity: Entity) {
        let normalized = normalize_name(&entity.display_name);
        let keys = self.by_name.entry(normalized).or_default();
        if !keys.contains(&entity.key) {
            keys.push(entity.key.clone());
            keys.sort();
        }
        self.entities.insert(entity.key.clone(), entity);
    }

    fn bind_alias(&mut self, alias: Alias, key: &CanonicalKey) -> Result<(), CoreError> {
        if let Some(existing) = self.aliases.get(&alias) {
            if existing == key {
                return Ok(());
            }
            return Err(CoreError::AliasConflict {
                provider: alias.provider,
                raw_id: alias.raw_id,
                existing: existing.clone(),
                requested: key.clone(),
            });
        }
        if let Some(entity) = self.entities.get_mut(key) {
            entity.aliases.push(alias.clone());
        }
        self.aliases.insert(alias, key.clone());
        Ok(())
    }
}

/// Session-scoped alias table. Reads take a shared lock; only new-alias registration writes.
#[derive(Debug, Default)]
pub struct EntityResolver {
    registry: RwLock<Registry>,
}

impl EntityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the resolver from the static cross-reference table.
    pub fn with_cross_reference(entries: &[CrossReferenceEntry]) -> Result<Self, CoreError> {
        let resolver = Self::new();
        {
            let mut reg = resolver.write();
            for entry in entries {
                if reg.entities.contains_key(&entry.key) {
                    return Err(CoreError::Configuration(format!(
                        "cross-reference lists {} twice",
                        entry.key
                    )));
                }
                reg.insert_entity(Entity {
                    key: entry.key.clone(),
                    display_name: entry.name.clone(),
                    team: entry.team.clone(),
                    position: entry.position,
                    aliases: Vec::new(),
                });
                for (provider, raw_id) in &entry.aliases {
                    let alias = Alias {
                        provider: provider.clone(),
                        raw_id: raw_id.clone(),
                    };
                    reg.bind_alias(alias, &entry.key)
                        .map_err(|e| CoreError::Configuration(e.to_string()))?;
                }
            }
        }
        Ok(resolver)
    }

    fn read(&self) -> RwLockReadGuard<'_, Registry> {
        self.registry.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Registry> {
        self.registry.write().unwrap_or_else(|p| p.into_inner())
    }

    pub fn resolve(
        &self,
        provider: &ProviderId,
        raw_id: &str,
        raw_name: &str,
    ) -> Result<CanonicalKey, CoreError> {
        self.resolve_with_hint(provider, raw_id, raw_name, None)
    }

    /// Like [`resolve`](Self::resolve); a team hint may break a tie between same-named entities.
    pub fn resolve_with_hint(
        &self,
        provider: &ProviderId,
        raw_id: &str,
        raw_name: &str,
        team: Option<&str>,
    ) -> Result<CanonicalKey, CoreError> {
        let alias = Alias {
            provider: provider.clone(),
            raw_id: raw_id.trim().to_string(),
        };

        if let Some(key) = self.read().aliases.get(&alias) {
            return Ok(key.clone());
        }

        let normalized = normalize_name(raw_name);
        if normalized.is_empty() {
            return Err(CoreError::InvalidRequest(format!(
                "entity {provider}/{raw_id} has an empty name"
            )));
        }

        let mut reg = self.write();
        // Another writer may have registered the alias between the two locks.
        if let Some(key) = reg.aliases.get(&alias) {
            return Ok(key.clone());
        }

        let candidates = reg.by_name.get(&normalized).cloned().unwrap_or_default();
        let key = match candidates.len() {
            0 => {
                let key = mint_key(&normalized, &reg.entities);
                tracing::debug!(%provider, raw_id, %key, "minted canonical key");
                reg.insert_entity(Entity {
                    key: key.clone(),
                    display_name: raw_name.trim().to_string(),
                    team: team.map(str::to_string),
                    position: None,
                    aliases: Vec::new(),
                });
                key
            }
            1 => candidates[0].clone(),
            _ => {
                let by_team: Vec<&CanonicalKey> = match team {
                    Some(t) => candidates
                        .iter()
                        .filter(|k| {
                            reg.entities
                                .get(*k)
                                .and_then(|e| e.team.as_deref())
                                .is_some_and(|et| et.eq_ignore_ascii_case(t))
                        })
                        .collect(),
                    None => Vec::new(),
                };
                match by_team.as_slice() {
                    [only] => (*only).clone(),
                    _ => {
                        return Err(CoreError::AmbiguousEntity {
                            provider: provider.clone(),
                            raw_id: alias.raw_id,
                            raw_name: raw_name.to_string(),
                            candidates: candidates.clone(),
                        })
                    }
                }
            }
        };

        reg.bind_alias(alias, &key)?;
        Ok(key)
    }

    /// Re-points an alias explicitly. The only way to change an existing mapping.
    pub fn register_override(
        &self,
        provider: &ProviderId,
        raw_id: &str,
        key: &CanonicalKey,
    ) -> Result<(), CoreError> {
        let mut reg = self.write();
        if !reg.entities.contains_key(key) {
            return Err(CoreError::InvalidRequest(format!(
                "cannot override alias to unknown entity {key}"
            )));
        }
        let alias = Alias {
            provider: provider.clone(),
            raw_id: raw_id.trim().to_string(),
        };
        if let Some(previous) = reg.aliases.remove(&alias) {
            tracing::info!(%provider, raw_id, %previous, new = %key, "alias override");
        }
        reg.bind_alias(alias, key)
    }

    /// Fills team/position metadata the entity does not have yet.
    pub fn enrich(&self, key: &CanonicalKey, team: Option<&str>, position: Option<Position>) {
        let mut reg = self.write();
        if let Some(entity) = reg.entities.get_mut(key) {
            if entity.team.is_none() {
                entity.team = team.map(str::to_string);
            }
            if entity.position.is_none() {
                entity.position = position;
            }
        }
    }

    pub fn entity(&self, key: &CanonicalKey) -> Option<Entity> {
        self.read().entities.get(key).cloned()
    }

    pub fn alias_count(&self) -> usize {
        self.read().aliases.len()
    }
}
