use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use log::{debug, warn};
use serde::de::DeserializeOwned;
use sled::IVec;

use crate::economy::errors::EconomyError;
use crate::economy::types::{
    normalize_character_name, CharacterRecord, DonationRecord, ProjectRecord, TradeProposal,
    CHARACTER_SCHEMA_VERSION, DONATION_SCHEMA_VERSION, PROJECT_SCHEMA_VERSION, TRADE_SCHEMA_VERSION,
};

const TREE_PRIMARY: &str = "economy";

const CHARACTER_PREFIX: &str = "characters:";
const PROJECT_PREFIX: &str = "projects:";
const TRADE_PREFIX: &str = "trades:";
const DONATION_PREFIX: &str = "donations:";

/// Helper builder so tests can easily create throwaway stores with custom paths.
pub struct EconomyStoreBuilder {
    path: PathBuf,
    temporary: bool,
}

impl EconomyStoreBuilder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            temporary: false,
        }
    }

    /// Remove the database files when the store is dropped.
    pub fn temporary(mut self) -> Self {
        self.temporary = true;
        self
    }

    pub fn open(self) -> Result<EconomyStore, EconomyError> {
        EconomyStore::open_with_options(self.path, self.temporary)
    }
}

/// A set of record writes applied as one atomic sled batch.
#[derive(Default)]
pub struct StoreBatch {
    batch: sled::Batch,
    characters: Vec<String>,
    removed_characters: Vec<String>,
}

impl StoreBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_character(&mut self, mut character: CharacterRecord) -> Result<(), EconomyError> {
        character.schema_version = CHARACTER_SCHEMA_VERSION;
        character.touch();
        let key = EconomyStore::character_key(&character.name);
        self.batch.insert(key, EconomyStore::serialize(&character)?);
        self.characters.push(character.name);
        Ok(())
    }

    pub fn remove_character(&mut self, name: &str) {
        let name = normalize_character_name(name);
        self.batch.remove(EconomyStore::character_key(&name));
        self.removed_characters.push(name);
    }

    pub fn put_project(&mut self, mut project: ProjectRecord) -> Result<(), EconomyError> {
        project.schema_version = PROJECT_SCHEMA_VERSION;
        let key = EconomyStore::project_key(project.id);
        self.batch.insert(key, EconomyStore::serialize(&project)?);
        Ok(())
    }

    pub fn put_trade(&mut self, mut trade: TradeProposal) -> Result<(), EconomyError> {
        trade.schema_version = TRADE_SCHEMA_VERSION;
        let key = EconomyStore::trade_key(&trade.id);
        self.batch.insert(key, EconomyStore::serialize(&trade)?);
        Ok(())
    }

    pub fn remove_trade(&mut self, id: &str) {
        self.batch.remove(EconomyStore::trade_key(id));
    }

    pub fn put_donations(&mut self, mut donations: DonationRecord) -> Result<(), EconomyError> {
        donations.schema_version = DONATION_SCHEMA_VERSION;
        let key = EconomyStore::donation_key(&donations.character);
        self.batch.insert(key, EconomyStore::serialize(&donations)?);
        Ok(())
    }
}

/// Sled-backed persistence for characters, projects and trade proposals.
///
/// Each record lives under its own key so a single write is atomic. Writes
/// spanning several records go through [`StoreBatch`] and
/// [`EconomyStore::commit`]. Known character names are indexed in memory so
/// sweeps never need to scan the keyspace.
pub struct EconomyStore {
    _db: sled::Db,
    primary: sled::Tree,
    character_index: RwLock<BTreeSet<String>>,
}

impl EconomyStore {
    /// Open (or create) the store rooted at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, EconomyError> {
        Self::open_with_options(path, false)
    }

    fn open_with_options<P: AsRef<Path>>(path: P, temporary: bool) -> Result<Self, EconomyError> {
        let path_ref = path.as_ref();
        std::fs::create_dir_all(path_ref)?;
        let db = sled::Config::new()
            .path(path_ref)
            .temporary(temporary)
            .open()?;
        let primary = db.open_tree(TREE_PRIMARY)?;

        let mut index = BTreeSet::new();
        for entry in primary.scan_prefix(CHARACTER_PREFIX.as_bytes()) {
            let (key, _) = entry?;
            let text = String::from_utf8_lossy(&key);
            if let Some(name) = text.strip_prefix(CHARACTER_PREFIX) {
                index.insert(name.to_string());
            }
        }
        debug!("economy store opened at {} ({} characters)", path_ref.display(), index.len());

        Ok(Self {
            _db: db,
            primary,
            character_index: RwLock::new(index),
        })
    }

    fn character_key(name: &str) -> Vec<u8> {
        format!("{}{}", CHARACTER_PREFIX, normalize_character_name(name)).into_bytes()
    }

    fn project_key(id: u64) -> Vec<u8> {
        format!("{}{:020}", PROJECT_PREFIX, id).into_bytes()
    }

    fn trade_key(id: &str) -> Vec<u8> {
        format!("{}{}", TRADE_PREFIX, id).into_bytes()
    }

    fn donation_key(character: &str) -> Vec<u8> {
        format!("{}{}", DONATION_PREFIX, normalize_character_name(character)).into_bytes()
    }

    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, EconomyError> {
        Ok(bincode::serialize(value)?)
    }

    fn deserialize<T: DeserializeOwned>(bytes: IVec) -> Result<T, EconomyError> {
        Ok(bincode::deserialize::<T>(&bytes)?)
    }

    /// Decode a record and verify its schema version.
    fn decode<T: DeserializeOwned>(
        bytes: IVec,
        entity: &'static str,
        expected: u8,
        version: fn(&T) -> u8,
    ) -> Result<T, EconomyError> {
        let record: T = Self::deserialize(bytes)?;
        Self::check_version(entity, expected, version(&record))?;
        Ok(record)
    }

    /// Every readable record under `prefix`, in key order. Records that fail
    /// to decode or carry another schema version are logged and skipped.
    fn scan_records<T: DeserializeOwned>(
        &self,
        prefix: &str,
        entity: &'static str,
        expected: u8,
        version: fn(&T) -> u8,
    ) -> Result<Vec<T>, EconomyError> {
        let mut records = Vec::new();
        for entry in self.primary.scan_prefix(prefix.as_bytes()) {
            let (key, value) = entry?;
            match Self::decode(value, entity, expected, version) {
                Ok(record) => records.push(record),
                Err(e) => warn!("skipping unreadable {} {}: {}", entity, String::from_utf8_lossy(&key), e),
            }
        }
        Ok(records)
    }

    fn check_version(entity: &'static str, expected: u8, found: u8) -> Result<(), EconomyError> {
        if expected != found {
            return Err(EconomyError::SchemaMismatch {
                entity,
                expected,
                found,
            });
        }
        Ok(())
    }

    fn index_write(&self) -> Result<std::sync::RwLockWriteGuard<'_, BTreeSet<String>>, EconomyError> {
        self.character_index
            .write()
            .map_err(|_| EconomyError::Internal("character index poisoned".into()))
    }

    // ------------------------------------------------------------------
    // Characters
    // ------------------------------------------------------------------

    /// Insert or update a character record.
    pub fn put_character(&self, character: CharacterRecord) -> Result<(), EconomyError> {
        let mut batch = StoreBatch::new();
        batch.put_character(character)?;
        self.commit(batch)
    }

    /// Fetch a character by (any spelling of) its name.
    pub fn get_character(&self, name: &str) -> Result<CharacterRecord, EconomyError> {
        self.find_character(name)?
            .ok_or_else(|| EconomyError::NotFound(format!("character: {}", normalize_character_name(name))))
    }

    pub fn find_character(&self, name: &str) -> Result<Option<CharacterRecord>, EconomyError> {
        let Some(bytes) = self.primary.get(Self::character_key(name))? else {
            return Ok(None);
        };
        Self::decode(bytes, "character", CHARACTER_SCHEMA_VERSION, |c: &CharacterRecord| c.schema_version).map(Some)
    }

    pub fn character_exists(&self, name: &str) -> bool {
        self.character_index
            .read()
            .map(|index| index.contains(&normalize_character_name(name)))
            .unwrap_or(false)
    }

    pub fn delete_character(&self, name: &str) -> Result<(), EconomyError> {
        let mut batch = StoreBatch::new();
        batch.remove_character(name);
        self.commit(batch)
    }

    /// Names of every stored character, in key order.
    pub fn list_character_names(&self) -> Vec<String> {
        self.character_index
            .read()
            .map(|index| index.iter().cloned().collect())
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------
    // Projects
    // ------------------------------------------------------------------

    pub fn put_project(&self, project: ProjectRecord) -> Result<(), EconomyError> {
        let mut batch = StoreBatch::new();
        batch.put_project(project)?;
        self.commit(batch)
    }

    pub fn get_project(&self, id: u64) -> Result<ProjectRecord, EconomyError> {
        self.find_project(id)?
            .ok_or_else(|| EconomyError::NotFound(format!("project: {}", id)))
    }

    pub fn find_project(&self, id: u64) -> Result<Option<ProjectRecord>, EconomyError> {
        let Some(bytes) = self.primary.get(Self::project_key(id))? else {
            return Ok(None);
        };
        Self::decode(bytes, "project", PROJECT_SCHEMA_VERSION, |p: &ProjectRecord| p.schema_version).map(Some)
    }

    /// All readable projects in id order.
    pub fn list_projects(&self) -> Result<Vec<ProjectRecord>, EconomyError> {
        self.scan_records(PROJECT_PREFIX, "project", PROJECT_SCHEMA_VERSION, |p: &ProjectRecord| {
            p.schema_version
        })
    }

    /// Next project id: one past the largest stored id.
    pub fn next_project_id(&self) -> Result<u64, EconomyError> {
        let Some((key, _)) = self.primary.scan_prefix(PROJECT_PREFIX.as_bytes()).next_back().transpose()? else {
            return Ok(1);
        };
        let text = String::from_utf8_lossy(&key);
        let id = text
            .strip_prefix(PROJECT_PREFIX)
            .and_then(|digits| digits.parse::<u64>().ok())
            .ok_or_else(|| EconomyError::Internal(format!("malformed project key {}", text)))?;
        Ok(id + 1)
    }

    // ------------------------------------------------------------------
    // Trades
    // ------------------------------------------------------------------

    pub fn put_trade(&self, trade: TradeProposal) -> Result<(), EconomyError> {
        let mut batch = StoreBatch::new();
        batch.put_trade(trade)?;
        self.commit(batch)
    }

    pub fn find_trade(&self, id: &str) -> Result<Option<TradeProposal>, EconomyError> {
        let Some(bytes) = self.primary.get(Self::trade_key(id))? else {
            return Ok(None);
        };
        Self::decode(bytes, "trade", TRADE_SCHEMA_VERSION, |t: &TradeProposal| t.schema_version).map(Some)
    }

    /// All readable proposals ordered by creation time.
    pub fn list_trades(&self) -> Result<Vec<TradeProposal>, EconomyError> {
        let mut trades =
            self.scan_records(TRADE_PREFIX, "trade", TRADE_SCHEMA_VERSION, |t: &TradeProposal| t.schema_version)?;
        trades.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(trades)
    }

    // ------------------------------------------------------------------
    // Donations
    // ------------------------------------------------------------------

    pub fn find_donations(&self, character: &str) -> Result<Option<DonationRecord>, EconomyError> {
        let Some(bytes) = self.primary.get(Self::donation_key(character))? else {
            return Ok(None);
        };
        Self::decode(bytes, "donations", DONATION_SCHEMA_VERSION, |d: &DonationRecord| d.schema_version).map(Some)
    }

    /// Write raw bytes under a record key, bypassing encoding.
    #[cfg(test)]
    pub(crate) fn insert_raw(&self, key: &str, bytes: &[u8]) -> Result<(), EconomyError> {
        self.primary.insert(key.as_bytes(), bytes)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Batches
    // ------------------------------------------------------------------

    pub fn flush(&self) -> Result<(), EconomyError> {
        self.primary.flush()?;
        Ok(())
    }

    /// Apply every write in `batch` atomically, then flush.
    pub fn commit(&self, batch: StoreBatch) -> Result<(), EconomyError> {
        let StoreBatch {
            batch,
            characters,
            removed_characters,
        } = batch;
        self.primary.apply_batch(batch)?;
        self.primary.flush()?;

        if !characters.is_empty() || !removed_characters.is_empty() {
            let mut index = self.index_write()?;
            for name in removed_characters {
                index.remove(&name);
            }
            for name in characters {
                index.insert(name);
            }
        }
        Ok(())
    }
}
