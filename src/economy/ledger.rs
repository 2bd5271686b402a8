/// Inventory ledger: the only place character quantities change.
///
/// Functions here mutate an in-memory [`CharacterRecord`]; persisting the
/// net result is the caller's job, once per logical operation.
use crate::economy::errors::EconomyError;
use crate::economy::types::{CharacterRecord, ItemStack, Section, TradeResource};

/// Quantity bucket a ledger adjustment applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bucket {
    Currency,
    Experience,
    /// An item in the working `items` section.
    Item(String),
    /// An item in a specific section.
    Stored(Section, String),
}

impl From<&TradeResource> for Bucket {
    fn from(resource: &TradeResource) -> Self {
        match resource {
            TradeResource::Currency => Bucket::Currency,
            TradeResource::Item(name) => Bucket::Item(name.clone()),
        }
    }
}

/// Apply `delta` to one bucket.
///
/// Currency and experience clamp at zero instead of going negative. Items are
/// created on first credit and removed as soon as their count drops to zero
/// or below, so the map never holds empty entries.
pub fn adjust(character: &mut CharacterRecord, bucket: &Bucket, delta: i64) {
    match bucket {
        Bucket::Currency => {
            character.currency = character.currency.saturating_add(delta).max(0);
        }
        Bucket::Experience => {
            let next = (character.experience as i64).saturating_add(delta);
            character.experience = next.max(0) as u64;
        }
        Bucket::Item(name) => adjust_item(&mut character.items, name, delta),
        Bucket::Stored(section, name) => adjust_item(character.section_mut(*section), name, delta),
    }
}

fn adjust_item(items: &mut Vec<ItemStack>, name: &str, delta: i64) {
    match items.iter().position(|s| s.item == name) {
        Some(index) => {
            let next = items[index].quantity as i64 + delta;
            if next <= 0 {
                items.remove(index);
            } else {
                items[index].quantity = next.min(u32::MAX as i64) as u32;
            }
        }
        None if delta > 0 => {
            items.push(ItemStack::new(name, delta.min(u32::MAX as i64) as u32));
        }
        None => {}
    }
}

/// Quantity currently held in a bucket.
pub fn balance(character: &CharacterRecord, bucket: &Bucket) -> i64 {
    match bucket {
        Bucket::Currency => character.currency,
        Bucket::Experience => character.experience as i64,
        Bucket::Item(name) => character.item_quantity(name) as i64,
        Bucket::Stored(section, name) => character
            .section(*section)
            .iter()
            .find(|s| s.item == *name)
            .map(|s| s.quantity as i64)
            .unwrap_or(0),
    }
}

pub fn holds(character: &CharacterRecord, bucket: &Bucket, amount: i64) -> bool {
    balance(character, bucket) >= amount
}

/// Like [`holds`] but produces the shortfall error callers report.
pub fn require(character: &CharacterRecord, bucket: &Bucket, amount: i64) -> Result<(), EconomyError> {
    let available = balance(character, bucket);
    if available < amount {
        return Err(EconomyError::insufficient(bucket_label(bucket), amount, available));
    }
    Ok(())
}

/// Move `amount` of a bucket between two in-memory records.
pub fn transfer(
    from: &mut CharacterRecord,
    to: &mut CharacterRecord,
    bucket: &Bucket,
    amount: i64,
) -> Result<(), EconomyError> {
    require(from, bucket, amount)?;
    adjust(from, bucket, -amount);
    adjust(to, bucket, amount);
    Ok(())
}

pub fn bucket_label(bucket: &Bucket) -> String {
    match bucket {
        Bucket::Currency => "currency".to_string(),
        Bucket::Experience => "experience".to_string(),
        Bucket::Item(name) => name.clone(),
        Bucket::Stored(section, name) => format!("{} in {}", name, section),
    }
}

/// Resolve a possibly-wildcarded item token against a character's items.
///
/// `*` is stripped and the remainder matched case-insensitively. A leading
/// `*` matches a suffix (and wins over a trailing one), a trailing `*` a
/// prefix, and an inner `*` a substring.
/// The first hit in acquisition order wins. Without a hit, or without a `*`,
/// the token comes back unchanged.
pub fn resolve_wildcard(character: &CharacterRecord, token: &str) -> String {
    if !token.contains('*') {
        return token.to_string();
    }
    let trimmed = token.trim();
    let base = trimmed.replace('*', "").trim().to_lowercase();
    let leading = trimmed.starts_with('*');
    let trailing = trimmed.ends_with('*');

    character
        .items
        .iter()
        .map(|stack| stack.item.as_str())
        .find(|item| {
            let lowered = item.to_lowercase();
            if leading {
                lowered.ends_with(&base)
            } else if trailing {
                lowered.starts_with(&base)
            } else {
                lowered.contains(&base)
            }
        })
        .map(str::to_string)
        .unwrap_or_else(|| token.to_string())
}

/// Exact stored spelling of `name` within a section, matched case-insensitively.
pub fn find_in_section(character: &CharacterRecord, section: Section, name: &str) -> Option<String> {
    let wanted = name.trim().to_lowercase();
    character
        .section(section)
        .iter()
        .find(|s| s.item.to_lowercase() == wanted)
        .map(|s| s.item.clone())
}

/// Drop any non-positive item entries from every section. Returns true when
/// something was removed.
pub fn prune_empty(character: &mut CharacterRecord) -> bool {
    let mut removed = false;
    for section in Section::ALL {
        let items = character.section_mut(section);
        let before = items.len();
        items.retain(|s| s.quantity > 0);
        removed |= before != items.len();
    }
    removed
}
