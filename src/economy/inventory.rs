//! Moving stacks between a character's sections and donating items for
//! points.

use log::info;

use crate::economy::catalog::DEFAULT_ITEM_VALUE;
use crate::economy::engine::Economy;
use crate::economy::errors::EconomyError;
use crate::economy::ledger::{self, Bucket};
use crate::economy::locks;
use crate::economy::storage::StoreBatch;
use crate::economy::types::{CharacterRecord, DonationRecord, Section};

fn parse_section(token: &str) -> Result<Section, EconomyError> {
    Section::from_token(token).ok_or_else(|| {
        EconomyError::ParseError(format!(
            "unknown section '{}' (use items, inventory or stash)",
            token.trim()
        ))
    })
}

/// Result of a donation.
#[derive(Debug, Clone, PartialEq)]
pub struct DonationReceipt {
    pub item: String,
    pub amount: u32,
    pub value: f64,
    pub total_value: f64,
}

impl Economy {
    /// Move `amount` of an item from one section to another. The item is
    /// matched case-insensitively in the source section and keeps its
    /// stored spelling.
    pub async fn move_item(
        &self,
        name: &str,
        from: &str,
        to: &str,
        item: &str,
        amount: u32,
    ) -> Result<CharacterRecord, EconomyError> {
        let from = parse_section(from)?;
        let to = parse_section(to)?;
        if amount == 0 {
            return Err(EconomyError::LimitExceeded("amount to move must be positive".into()));
        }

        let _guard = self.locks.lock(locks::character_key(name)).await;
        let mut character = self.store.get_character(name)?;
        let stored = ledger::find_in_section(&character, from, item)
            .ok_or_else(|| EconomyError::NotFound(format!("{} in {} of {}", item.trim(), from, character.name)))?;
        let source = Bucket::Stored(from, stored.clone());
        ledger::require(&character, &source, amount as i64)?;
        if from == to {
            return Ok(character);
        }
        ledger::adjust(&mut character, &source, -(amount as i64));
        ledger::adjust(&mut character, &Bucket::Stored(to, stored.clone()), amount as i64);
        character.touch();
        info!("{} moved {} {} from {} to {}", character.name, amount, stored, from, to);
        self.store.put_character(character.clone())?;
        Ok(character)
    }

    /// Give items away for points. Only the `items` section can be donated
    /// from; items missing from the value table count [`DEFAULT_ITEM_VALUE`]
    /// each. The character and the donation tally are committed together.
    pub async fn donate(&self, name: &str, item: &str, amount: u32) -> Result<DonationReceipt, EconomyError> {
        if amount == 0 {
            return Err(EconomyError::LimitExceeded("amount to donate must be positive".into()));
        }
        let _guard = self.locks.lock(locks::character_key(name)).await;
        let mut character = self.store.get_character(name)?;
        let stored = ledger::find_in_section(&character, Section::Items, item)
            .ok_or_else(|| EconomyError::NotFound(format!("{} in items of {}", item.trim(), character.name)))?;
        let bucket = Bucket::Item(stored.clone());
        ledger::require(&character, &bucket, amount as i64)?;

        let unit = self.catalog.item_value(&stored).unwrap_or(DEFAULT_ITEM_VALUE);
        let value = unit * amount as f64;
        let mut donations = self
            .store
            .find_donations(&character.name)?
            .unwrap_or_else(|| DonationRecord::new(&character.name));
        donations.record(&stored, amount, value);
        let total_value = donations.total_value;

        ledger::adjust(&mut character, &bucket, -(amount as i64));
        character.touch();
        let mut batch = StoreBatch::new();
        batch.put_character(character.clone())?;
        batch.put_donations(donations)?;
        self.store.commit(batch)?;
        info!("{} donated {} {} worth {:.3} points", character.name, amount, stored, value);
        Ok(DonationReceipt {
            item: stored,
            amount,
            value,
            total_value,
        })
    }

    /// Donation tally of a character; empty when nothing was donated yet.
    pub fn donations(&self, name: &str) -> Result<DonationRecord, EconomyError> {
        let character = self.store.get_character(name)?;
        Ok(self
            .store
            .find_donations(&character.name)?
            .unwrap_or_else(|| DonationRecord::new(&character.name)))
    }
}
