//! Test utilities & fixtures shared by the integration tests.

use std::sync::{Arc, Mutex};

use guildledger::economy::{
    adjust, Bucket, Catalog, Economy, EconomyStoreBuilder, GameEvent, IdentityPort, Notifier, Rules,
};
use tempfile::TempDir;
use tokio::sync::oneshot;

pub const RECIPES: &str = r#"{
    "Carpentry": {
        "Plank": {
            "components": {"Log": 2},
            "time": 30,
            "outputs": [{"item": "Plank", "quantity": 3}]
        },
        "Wooden Mallet": {
            "components": {"Plank": 2},
            "requires": "* Knife",
            "time": 40,
            "outputs": [{"item": "Wooden Mallet", "quantity": 1}]
        },
        "Kindling": {
            "components": ["* Log"],
            "outputs": [{"item": "Kindling", "quantity": 2}],
            "disassemble": 0
        }
    }
}"#;

pub const SCAVENGE: &str = r#"{
    "wood": {"Log": {"weight": 5}, "Stick": {"weight": 2}},
    "stone": {"Flint": {"weight": 3}, "Granite": {"weight": 1}}
}"#;

pub const PROJECTS: &str = r#"{
    "project_types": {
        "bridge": {
            "name": "River Bridge",
            "phases": [
                {"phase": "Foundation", "required": {"Stone": 5}},
                {"phase": "Deck", "required": {"Plank": 4, "labor": 6}}
            ],
            "reward": "Safe crossing"
        }
    }
}"#;

pub const VALUES: &str = r#"{"Log": 0.5, "Plank": 2}"#;

/// How the recording port answers confirmation prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(dead_code)]
pub enum Answer {
    Yes,
    No,
    Never,
}

/// Notifier and identity port that records everything it sees.
pub struct RecordingPort {
    events: Mutex<Vec<GameEvent>>,
    answer: Mutex<Answer>,
    unanswered: Mutex<Vec<oneshot::Sender<bool>>>,
    superusers: Vec<String>,
    honor_admins: Vec<String>,
}

#[allow(dead_code)]
impl RecordingPort {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            answer: Mutex::new(Answer::Yes),
            unanswered: Mutex::new(Vec::new()),
            superusers: vec!["gm".to_string()],
            honor_admins: vec!["judge".to_string()],
        }
    }

    pub fn answer_with(&self, answer: Answer) {
        *self.answer.lock().expect("answer lock") = answer;
    }

    pub fn events(&self) -> Vec<GameEvent> {
        self.events.lock().expect("events lock").clone()
    }

    pub fn pending_confirmations(&self) -> usize {
        self.unanswered.lock().expect("pending lock").len()
    }

    /// Answer every prompt held back by [`Answer::Never`].
    pub fn answer_pending(&self, yes: bool) {
        for tx in self.unanswered.lock().expect("pending lock").drain(..) {
            let _ = tx.send(yes);
        }
    }

    pub fn clear(&self) {
        self.events.lock().expect("events lock").clear();
    }
}

impl Notifier for RecordingPort {
    fn notify(&self, event: &GameEvent) {
        self.events.lock().expect("events lock").push(event.clone());
    }
}

impl IdentityPort for RecordingPort {
    fn is_superuser(&self, identity: &str) -> bool {
        self.superusers.iter().any(|s| s == identity)
    }

    fn can_award_honor(&self, identity: &str) -> bool {
        self.is_superuser(identity) || self.honor_admins.iter().any(|s| s == identity)
    }

    fn request_confirmation(&self, _identity: &str, _prompt: &str) -> oneshot::Receiver<bool> {
        let (tx, rx) = oneshot::channel();
        match *self.answer.lock().expect("answer lock") {
            Answer::Yes => {
                let _ = tx.send(true);
            }
            Answer::No => {
                let _ = tx.send(false);
            }
            Answer::Never => self.unanswered.lock().expect("pending lock").push(tx),
        }
        rx
    }
}

#[allow(dead_code)]
pub struct Fixture {
    pub dir: TempDir,
    pub economy: Economy,
    pub port: Arc<RecordingPort>,
}

#[allow(dead_code)]
pub fn fixture() -> Fixture {
    fixture_with(Rules::default())
}

pub fn fixture_with(rules: Rules) -> Fixture {
    let dir = TempDir::new().expect("tempdir");
    let (economy, port) = open_economy(&dir, rules);
    Fixture { dir, economy, port }
}

/// Open (or reopen) an economy over the store in `dir`.
pub fn open_economy(dir: &TempDir, rules: Rules) -> (Economy, Arc<RecordingPort>) {
    let store = EconomyStoreBuilder::new(dir.path().join("db")).open().expect("store");
    let catalog = Catalog::from_json(RECIPES, SCAVENGE, PROJECTS)
        .and_then(|c| c.with_values(VALUES))
        .expect("catalog");
    let port = Arc::new(RecordingPort::new());
    let economy = Economy::new(Arc::new(store), Arc::new(catalog), port.clone(), port.clone()).with_rules(rules);
    (economy, port)
}

/// Put items straight into a character's inventory.
#[allow(dead_code)]
pub fn give(economy: &Economy, name: &str, item: &str, qty: i64) {
    let mut c = economy.store().get_character(name).expect("character");
    adjust(&mut c, &Bucket::Item(item.to_string()), qty);
    economy.store().put_character(c).expect("put");
}

#[allow(dead_code)]
pub fn give_currency(economy: &Economy, name: &str, amount: i64) {
    let mut c = economy.store().get_character(name).expect("character");
    adjust(&mut c, &Bucket::Currency, amount);
    economy.store().put_character(c).expect("put");
}
