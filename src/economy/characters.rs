//! Character lifecycle and bookkeeping: creation, confirmed deletion,
//! session logs, honor and read-only views.

use log::{debug, info, warn};

use crate::economy::engine::Economy;
use crate::economy::errors::EconomyError;
use crate::economy::ledger::{self, Bucket};
use crate::economy::locks;
use crate::economy::types::{normalize_character_name, CharacterRecord};
use crate::logutil::escape_log;

/// One line of an owner's roster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacterSummary {
    pub name: String,
    pub experience: u64,
    pub currency: i64,
    pub honor: u64,
}

impl From<&CharacterRecord> for CharacterSummary {
    fn from(c: &CharacterRecord) -> Self {
        Self {
            name: c.name.clone(),
            experience: c.experience,
            currency: c.currency,
            honor: c.honor,
        }
    }
}

fn owner_key(owner_id: &str) -> String {
    format!("owner:{}", owner_id)
}

impl Economy {
    fn characters_owned_by(&self, owner_id: &str) -> Result<Vec<CharacterRecord>, EconomyError> {
        let mut owned = Vec::new();
        for name in self.store.list_character_names() {
            match self.store.find_character(&name) {
                Ok(Some(c)) if c.owner_id == owner_id => owned.push(c),
                Ok(_) => {}
                Err(e @ (EconomyError::SchemaMismatch { .. } | EconomyError::Bincode(_))) => {
                    warn!("skipping unreadable character {}: {}", name, e)
                }
                Err(e) => return Err(e),
            }
        }
        Ok(owned)
    }

    pub async fn create_character(
        &self,
        owner_id: &str,
        owner_name: &str,
        name: &str,
    ) -> Result<CharacterRecord, EconomyError> {
        let normalized = normalize_character_name(name);
        if normalized.is_empty() {
            return Err(EconomyError::ParseError("character name is empty".into()));
        }
        let _guard = self
            .locks
            .lock_many(vec![owner_key(owner_id), locks::character_key(&normalized)])
            .await;

        if self.store.find_character(&normalized)?.is_some() {
            return Err(EconomyError::AlreadyExists(format!("character: {}", normalized)));
        }
        let owned = self.characters_owned_by(owner_id)?.len();
        if owned >= self.rules.max_characters_per_owner {
            return Err(EconomyError::LimitExceeded(format!(
                "{} already owns {} characters (maximum {})",
                owner_name, owned, self.rules.max_characters_per_owner
            )));
        }

        let character = CharacterRecord::new(&normalized, owner_id, owner_name);
        self.store.put_character(character.clone())?;
        info!("character {} created for {}", character.name, escape_log(owner_name));
        Ok(character)
    }

    /// Delete a character after the actor confirms. Only the owner or a
    /// superuser may ask; a "no" or no answer in time leaves it in place.
    pub async fn delete_character(&self, actor: &str, name: &str) -> Result<(), EconomyError> {
        let character = self.store.get_character(name)?;
        if character.owner_id != actor && !self.identity.is_superuser(actor) {
            return Err(EconomyError::Forbidden(format!("{} does not belong to you", character.name)));
        }

        let prompt = format!("Really delete {}? This cannot be undone.", character.name);
        let answer = self.identity.request_confirmation(actor, &prompt);
        match tokio::time::timeout(self.rules.confirmation_timeout, answer).await {
            Ok(Ok(true)) => {}
            Ok(Ok(false)) | Ok(Err(_)) => {
                return Err(EconomyError::Cancelled(format!("deletion of {} declined", character.name)))
            }
            Err(_) => {
                return Err(EconomyError::Cancelled(format!(
                    "deletion of {} not confirmed in time",
                    character.name
                )))
            }
        }

        let _guard = self.locks.lock(locks::character_key(&character.name)).await;
        let current = self.store.get_character(&character.name)?;
        if current.owner_id != actor && !self.identity.is_superuser(actor) {
            return Err(EconomyError::Forbidden(format!("{} does not belong to you", current.name)));
        }
        self.store.delete_character(&character.name)?;
        info!("character {} deleted by {}", character.name, escape_log(actor));
        Ok(())
    }

    /// Record a play session: experience gained plus net currency.
    pub async fn log_session(
        &self,
        name: &str,
        session_id: &str,
        experience: i64,
        earned: i64,
        expenses: i64,
    ) -> Result<CharacterRecord, EconomyError> {
        let _guard = self.locks.lock(locks::character_key(name)).await;
        let mut character = self.store.get_character(name)?;
        ledger::adjust(&mut character, &Bucket::Experience, experience);
        ledger::adjust(&mut character, &Bucket::Currency, earned.saturating_sub(expenses));
        info!(
            "session {} for {}: xp {:+}, earned {}, expenses {}",
            escape_log(session_id),
            character.name,
            experience,
            earned,
            expenses
        );
        self.store.put_character(character.clone())?;
        Ok(character)
    }

    pub async fn award_honor(&self, actor: &str, name: &str, amount: u64) -> Result<CharacterRecord, EconomyError> {
        if !self.identity.can_award_honor(actor) {
            return Err(EconomyError::Forbidden("not authorized to award honor".into()));
        }
        if amount == 0 {
            return Err(EconomyError::LimitExceeded("honor award must be positive".into()));
        }
        let _guard = self.locks.lock(locks::character_key(name)).await;
        let mut character = self.store.get_character(name)?;
        character.honor = character.honor.saturating_add(amount);
        info!("{} awarded {} honor to {}", escape_log(actor), amount, character.name);
        self.store.put_character(character.clone())?;
        Ok(character)
    }

    /// Trade honor for experience at the configured rate.
    pub async fn consume_honor(&self, name: &str, amount: u64) -> Result<CharacterRecord, EconomyError> {
        if amount == 0 {
            return Err(EconomyError::LimitExceeded("honor to consume must be positive".into()));
        }
        let _guard = self.locks.lock(locks::character_key(name)).await;
        let mut character = self.store.get_character(name)?;
        if character.honor < amount {
            return Err(EconomyError::insufficient("honor", amount as i64, character.honor as i64));
        }
        character.honor -= amount;
        let gained = amount.saturating_mul(self.rules.honor_xp_rate);
        ledger::adjust(&mut character, &Bucket::Experience, gained.min(i64::MAX as u64) as i64);
        info!("{} consumed {} honor for {} xp", character.name, amount, gained);
        self.store.put_character(character.clone())?;
        Ok(character)
    }

    pub fn owner_stats(&self, owner_id: &str) -> Result<Vec<CharacterSummary>, EconomyError> {
        Ok(self
            .characters_owned_by(owner_id)?
            .iter()
            .map(CharacterSummary::from)
            .collect())
    }

    /// A character's full record, shown only to its owner or a superuser.
    pub fn inventory(&self, actor: &str, name: &str) -> Result<CharacterRecord, EconomyError> {
        let character = self.store.get_character(name)?;
        if character.owner_id != actor && !self.identity.is_superuser(actor) {
            return Err(EconomyError::Forbidden(format!("{} does not belong to you", character.name)));
        }
        Ok(character)
    }

    /// Drop non-positive item entries left behind by older data. Only
    /// records that actually change are written.
    pub async fn cleanup_inventories(&self) -> usize {
        let mut cleaned = 0;
        for name in self.store.list_character_names() {
            let _guard = self.locks.lock(locks::character_key(&name)).await;
            let mut character = match self.store.find_character(&name) {
                Ok(Some(c)) => c,
                Ok(None) => continue,
                Err(e) => {
                    warn!("skipping unreadable character {}: {}", name, e);
                    continue;
                }
            };
            if !ledger::prune_empty(&mut character) {
                continue;
            }
            match self.store.put_character(character) {
                Ok(()) => cleaned += 1,
                Err(e) => warn!("could not clean inventory for {}: {}", name, e),
            }
        }
        debug!("inventory cleanup: {} records changed", cleaned);
        cleaned
    }
}
