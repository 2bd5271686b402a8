//! Trade proposals between characters.
//!
//! A proposal only records terms; nothing is held in escrow. Acceptance
//! re-checks both sides and settles them in a single atomic batch.

use chrono::{DateTime, Utc};
use log::{debug, info};
use uuid::Uuid;

use crate::economy::engine::Economy;
use crate::economy::errors::EconomyError;
use crate::economy::ledger::{self, Bucket};
use crate::economy::locks;
use crate::economy::port::GameEvent;
use crate::economy::storage::StoreBatch;
use crate::economy::types::{
    normalize_character_name, TradeProposal, TradeResource, TradeStatus, TRADE_SCHEMA_VERSION,
};

/// Parsed `<offer words> <n> <request words> <m>` terms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeTerms {
    pub offer: TradeResource,
    pub offer_amount: u32,
    pub request: TradeResource,
    pub request_amount: u32,
}

fn is_amount(token: &str) -> bool {
    !token.is_empty() && token.chars().all(|c| c.is_ascii_digit())
}

/// Split tokens at the first purely numeric one: words before it name the
/// resource, the number is the amount, and the rest is returned.
fn take_resource<'a, 'b>(tokens: &'b [&'a str], side: &str) -> Result<(String, u32, &'b [&'a str]), EconomyError> {
    let idx = tokens
        .iter()
        .position(|t| is_amount(t))
        .ok_or_else(|| EconomyError::ParseError(format!("{} amount missing", side)))?;
    if idx == 0 {
        return Err(EconomyError::ParseError(format!("{} item missing", side)));
    }
    let amount = tokens[idx]
        .parse::<u32>()
        .map_err(|_| EconomyError::ParseError(format!("{} amount too large", side)))?;
    Ok((tokens[..idx].join(" "), amount, &tokens[idx + 1..]))
}

fn is_experience(name: &str) -> bool {
    matches!(name.trim().to_lowercase().as_str(), "exp" | "experience")
}

/// Parse free-text trade terms, e.g. `Mulberry Log 2 currency 1`.
pub fn parse_trade_args(args: &str) -> Result<TradeTerms, EconomyError> {
    let tokens: Vec<&str> = args.split_whitespace().collect();
    let (offer, offer_amount, rest) = take_resource(&tokens, "offered")?;
    let (request, request_amount, _) = take_resource(rest, "requested")?;

    if offer_amount == 0 || request_amount == 0 {
        return Err(EconomyError::LimitExceeded("trade amounts must be positive".into()));
    }
    if is_experience(&offer) || is_experience(&request) {
        return Err(EconomyError::Forbidden("experience cannot be traded".into()));
    }
    Ok(TradeTerms {
        offer: TradeResource::from_token(&offer),
        offer_amount,
        request: TradeResource::from_token(&request),
        request_amount,
    })
}

fn new_trade_id(owner_id: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", owner_id, &suffix[..6])
}

impl Economy {
    pub async fn propose_trade(&self, owner_id: &str, character: &str, args: &str) -> Result<TradeProposal, EconomyError> {
        let terms = parse_trade_args(args)?;
        let _guard = self
            .locks
            .lock_many(vec![locks::TRADES_KEY.to_string(), locks::character_key(character)])
            .await;

        let proposer = self.store.get_character(character)?;
        ledger::require(&proposer, &Bucket::from(&terms.offer), terms.offer_amount as i64)?;

        let mut id = new_trade_id(owner_id);
        while self.store.find_trade(&id)?.is_some() {
            id = new_trade_id(owner_id);
        }
        let trade = TradeProposal {
            id,
            owner_id: owner_id.to_string(),
            character: proposer.name.clone(),
            offer: terms.offer,
            offer_amount: terms.offer_amount,
            request: terms.request,
            request_amount: terms.request_amount,
            status: TradeStatus::Open,
            created_at: Utc::now(),
            closed_at: None,
            schema_version: TRADE_SCHEMA_VERSION,
        };
        self.store.put_trade(trade.clone())?;
        info!(
            "trade {} proposed: {} offers {} {} for {} {}",
            trade.id, trade.character, trade.offer_amount, trade.offer, trade.request_amount, trade.request
        );
        Ok(trade)
    }

    pub async fn accept_trade(&self, acceptor: &str, trade_id: &str) -> Result<TradeProposal, EconomyError> {
        let not_found = || EconomyError::NotFound(format!("open trade: {}", trade_id));
        let peeked = self
            .store
            .find_trade(trade_id)?
            .filter(TradeProposal::is_open)
            .ok_or_else(not_found)?;
        if normalize_character_name(acceptor) == peeked.character {
            return Err(EconomyError::Forbidden("a character cannot accept its own trade".into()));
        }

        let _guard = self
            .locks
            .lock_many(vec![
                locks::TRADES_KEY.to_string(),
                locks::character_key(&peeked.character),
                locks::character_key(acceptor),
            ])
            .await;

        let mut trade = self
            .store
            .find_trade(trade_id)?
            .filter(TradeProposal::is_open)
            .ok_or_else(not_found)?;
        let mut proposer = self.store.get_character(&trade.character)?;
        let mut taker = self.store.get_character(acceptor)?;

        let offer = Bucket::from(&trade.offer);
        let request = Bucket::from(&trade.request);
        ledger::require(&taker, &request, trade.request_amount as i64)?;
        ledger::require(&proposer, &offer, trade.offer_amount as i64)?;

        ledger::transfer(&mut proposer, &mut taker, &offer, trade.offer_amount as i64)?;
        ledger::transfer(&mut taker, &mut proposer, &request, trade.request_amount as i64)?;
        trade.close(Utc::now());

        let event = GameEvent::TradeSettled {
            trade_id: trade.id.clone(),
            proposer: proposer.name.clone(),
            acceptor: taker.name.clone(),
        };
        let mut batch = StoreBatch::new();
        batch.put_character(proposer)?;
        batch.put_character(taker)?;
        batch.put_trade(trade.clone())?;
        self.store.commit(batch)?;

        info!("{}", event);
        self.announce(&[event]);
        Ok(trade)
    }

    /// Open proposals, oldest first.
    pub fn list_trades(&self) -> Result<Vec<TradeProposal>, EconomyError> {
        Ok(self
            .store
            .list_trades()?
            .into_iter()
            .filter(TradeProposal::is_open)
            .collect())
    }

    pub async fn expire_trades(&self) -> Result<usize, EconomyError> {
        self.expire_trades_at(Utc::now()).await
    }

    /// Close proposals older than the expiry window and prune every closed
    /// proposal from the book. Returns how many expired.
    pub async fn expire_trades_at(&self, now: DateTime<Utc>) -> Result<usize, EconomyError> {
        let _guard = self.locks.lock(locks::TRADES_KEY).await;
        let mut events = Vec::new();
        let mut batch = StoreBatch::new();
        let mut pruned = 0usize;

        for mut trade in self.store.list_trades()? {
            if trade.is_expired(now, self.rules.trade_expiry) {
                trade.close(now);
                events.push(GameEvent::TradeExpired {
                    trade_id: trade.id.clone(),
                    character: trade.character.clone(),
                });
            }
            if !trade.is_open() {
                batch.remove_trade(&trade.id);
                pruned += 1;
            }
        }
        if pruned > 0 {
            self.store.commit(batch)?;
        }
        debug!("trade sweep: expired={} pruned={}", events.len(), pruned);
        self.announce(&events);
        Ok(events.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_multiword_items() {
        let terms = parse_trade_args("Mulberry Log 2 Gold 1").expect("terms");
        assert_eq!(terms.offer, TradeResource::Item("Mulberry Log".into()));
        assert_eq!(terms.offer_amount, 2);
        assert_eq!(terms.request, TradeResource::Currency);
        assert_eq!(terms.request_amount, 1);
    }

    #[test]
    fn rejects_malformed_terms() {
        assert!(matches!(parse_trade_args("2 Gold 1"), Err(EconomyError::ParseError(_))));
        assert!(matches!(parse_trade_args("Log 2 Gold"), Err(EconomyError::ParseError(_))));
        assert!(matches!(parse_trade_args("Log 2 3"), Err(EconomyError::ParseError(_))));
        assert!(matches!(parse_trade_args(""), Err(EconomyError::ParseError(_))));
    }

    #[test]
    fn rejects_zero_amounts_and_experience() {
        assert!(matches!(parse_trade_args("Log 0 Gold 1"), Err(EconomyError::LimitExceeded(_))));
        assert!(matches!(parse_trade_args("exp 5 Gold 1"), Err(EconomyError::Forbidden(_))));
        assert!(matches!(parse_trade_args("Log 5 Experience 1"), Err(EconomyError::Forbidden(_))));
    }

    #[test]
    fn trade_ids_carry_owner_and_hex_suffix() {
        let id = new_trade_id("1234");
        let (owner, suffix) = id.split_once('-').expect("dash");
        assert_eq!(owner, "1234");
        assert_eq!(suffix.len(), 6);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn a_broken_record_does_not_stall_expiry() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let economy = crate::economy::engine::testing::economy(dir.path());
        let stale = TradeProposal {
            id: "u1-abc123".into(),
            owner_id: "u1".into(),
            character: "Taco".into(),
            offer: TradeResource::Item("Log".into()),
            offer_amount: 1,
            request: TradeResource::Currency,
            request_amount: 1,
            status: TradeStatus::Open,
            created_at: Utc::now() - chrono::Duration::days(30),
            closed_at: None,
            schema_version: TRADE_SCHEMA_VERSION,
        };
        economy.store.put_trade(stale).expect("put");
        economy.store.insert_raw("trades:zz-broken", &[0xff, 0x01]).expect("raw");

        assert_eq!(economy.expire_trades_at(Utc::now()).await.expect("sweep"), 1);
        assert!(economy.store.find_trade("u1-abc123").expect("find").is_none());
        assert!(economy.list_trades().expect("list").is_empty());
    }
}
