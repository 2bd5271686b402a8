//! Chat command surface: `!verb args` text in, reply text out.
//!
//! Parsing is separate from execution so the grammar can be tested without a
//! store. Every handler returns a fully rendered reply; recoverable errors
//! become a short "⚠️" line and never escape to the caller.

use log::{info, warn};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::economy::engine::Economy;
use crate::economy::errors::EconomyError;
use crate::economy::projects::ProjectView;
use crate::economy::types::{ActiveTask, CharacterRecord, ItemStack, ProjectStatus, TradeProposal};
use crate::logutil::escape_log;

/// Who sent a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invoker {
    pub id: String,
    pub name: String,
}

impl Invoker {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EconomyCommand {
    CreateCharacter(String),                     // !life Taco
    DeleteCharacter(String),                     // !death Taco
    Scavenge(String, Option<String>),            // !scavenge Taco [wood]
    Craft(String, String),                       // !craft Taco Wooden Mallet
    Disassemble(String, String),                 // !disassemble Taco Wooden Mallet
    ProposeTrade(String, String),                // !trade proposal Taco Log 2 currency 1
    AcceptTrade(String, String),                 // !trade accept Burrito <id>
    ListTrades,                                  // !trade list
    StartProject(String),                        // !start_project bridge
    Contribute(String, u64, String, u32),        // !contribute Taco 1 Stone 5
    Labor(String, u64, u32),                     // !work_on_project Taco 1 4
    CheckProject(u64),                           // !check_project 1
    ProjectStatus(u64),                          // !project 1
    ListProjects,                                // !list_projects
    AwardHonor(u64, String),                     // !honor 3 Taco
    ConsumeHonor(u64, String),                   // !honor consume 2 Taco
    Session(String, String, i64, i64, i64),      // !session s12 Taco 300 50 10
    Stats,                                       // !stats
    Inventory(String),                           // !inventory Taco
    MoveItem(String, String, String, String, u32), // !move_item Taco items stash Oak Log 3
    Donate(String, String, u32),                 // !donate Taco Oak Log 2
    Donations(String),                           // !donations Taco
    Help,                                        // !help
}

fn usage(text: &str) -> EconomyError {
    EconomyError::ParseError(format!("usage: {}", text))
}

fn number<T: std::str::FromStr>(token: &str, what: &str) -> Result<T, EconomyError> {
    token
        .parse::<T>()
        .map_err(|_| EconomyError::ParseError(format!("{} must be a number, got '{}'", what, token)))
}

/// Parse one line of chat input.
pub fn parse_command(input: &str) -> Result<EconomyCommand, EconomyError> {
    let trimmed = input.trim();
    let body = trimmed
        .strip_prefix('!')
        .ok_or_else(|| EconomyError::ParseError("commands start with '!'".into()))?;
    let parts: Vec<&str> = body.split_whitespace().collect();
    let Some(verb) = parts.first() else {
        return Err(EconomyError::ParseError("empty command".into()));
    };
    let args = &parts[1..];

    match verb.to_lowercase().as_str() {
        "life" | "start-character" => match args {
            [] => Err(usage("!life <character>")),
            _ => Ok(EconomyCommand::CreateCharacter(args.join(" "))),
        },
        "death" | "delete-character" => match args {
            [] => Err(usage("!death <character>")),
            _ => Ok(EconomyCommand::DeleteCharacter(args.join(" "))),
        },
        "scavenge" => match args {
            [character] => Ok(EconomyCommand::Scavenge(character.to_string(), None)),
            [character, group] => Ok(EconomyCommand::Scavenge(character.to_string(), Some(group.to_string()))),
            _ => Err(usage("!scavenge <character> [resource group]")),
        },
        "craft" => match args {
            [character, item @ ..] if !item.is_empty() => {
                Ok(EconomyCommand::Craft(character.to_string(), item.join(" ")))
            }
            _ => Err(usage("!craft <character> <item>")),
        },
        "disassemble" => match args {
            [character, item @ ..] if !item.is_empty() => {
                Ok(EconomyCommand::Disassemble(character.to_string(), item.join(" ")))
            }
            _ => Err(usage("!disassemble <character> <item>")),
        },
        "trade" => match args {
            [sub, character, terms @ ..] if sub.eq_ignore_ascii_case("proposal") && !terms.is_empty() => {
                Ok(EconomyCommand::ProposeTrade(character.to_string(), terms.join(" ")))
            }
            [sub, character, id] if sub.eq_ignore_ascii_case("accept") => {
                Ok(EconomyCommand::AcceptTrade(character.to_string(), id.to_string()))
            }
            [sub] if sub.eq_ignore_ascii_case("list") => Ok(EconomyCommand::ListTrades),
            _ => Err(usage(
                "!trade proposal <character> <offer> <n> <request> <m> | !trade accept <character> <id> | !trade list",
            )),
        },
        "start_project" | "start-project" => match args {
            [kind] => Ok(EconomyCommand::StartProject(kind.to_string())),
            _ => Err(usage("!start_project <type>")),
        },
        "contribute" => match args {
            [character, id, resource @ .., amount] if !resource.is_empty() => Ok(EconomyCommand::Contribute(
                character.to_string(),
                number(id, "project id")?,
                resource.join(" "),
                number(amount, "amount")?,
            )),
            _ => Err(usage("!contribute <character> <project id> <resource> <amount>")),
        },
        "work_on_project" | "labor" => match args {
            [character, id, hours] => Ok(EconomyCommand::Labor(
                character.to_string(),
                number(id, "project id")?,
                number(hours, "hours")?,
            )),
            _ => Err(usage("!work_on_project <character> <project id> <hours>")),
        },
        "check_project" | "check-project" => match args {
            [id] => Ok(EconomyCommand::CheckProject(number(id, "project id")?)),
            _ => Err(usage("!check_project <project id>")),
        },
        "project" | "project_status" => match args {
            [id] => Ok(EconomyCommand::ProjectStatus(number(id, "project id")?)),
            _ => Err(usage("!project <project id>")),
        },
        "list_projects" | "list-projects" => Ok(EconomyCommand::ListProjects),
        "honor" => match args {
            [sub, amount, character @ ..] if sub.eq_ignore_ascii_case("consume") && !character.is_empty() => {
                Ok(EconomyCommand::ConsumeHonor(number(amount, "honor")?, character.join(" ")))
            }
            [amount, character @ ..] if !character.is_empty() => {
                Ok(EconomyCommand::AwardHonor(number(amount, "honor")?, character.join(" ")))
            }
            _ => Err(usage("!honor <amount> <character> | !honor consume <amount> <character>")),
        },
        "session" => match args {
            [session, character, xp, earned, expenses] => Ok(EconomyCommand::Session(
                session.to_string(),
                character.to_string(),
                number(xp, "xp")?,
                number(earned, "earned")?,
                number(expenses, "expenses")?,
            )),
            _ => Err(usage("!session <session id> <character> <xp> <earned> <expenses>")),
        },
        "stats" => Ok(EconomyCommand::Stats),
        "inventory" | "inv" => match args {
            [] => Err(usage("!inventory <character>")),
            _ => Ok(EconomyCommand::Inventory(args.join(" "))),
        },
        "move_item" | "move-item" => match args {
            [character, from, to, item @ .., amount] if !item.is_empty() => Ok(EconomyCommand::MoveItem(
                character.to_string(),
                from.to_string(),
                to.to_string(),
                item.join(" "),
                number(amount, "amount")?,
            )),
            _ => Err(usage("!move_item <character> <from> <to> <item> <amount>")),
        },
        "donate" => match args {
            [character, item @ .., amount] if !item.is_empty() => Ok(EconomyCommand::Donate(
                character.to_string(),
                item.join(" "),
                number(amount, "amount")?,
            )),
            _ => Err(usage("!donate <character> <item> <amount>")),
        },
        "donations" => match args {
            [] => Err(usage("!donations <character>")),
            _ => Ok(EconomyCommand::Donations(args.join(" "))),
        },
        "help" | "commands" => Ok(EconomyCommand::Help),
        other => Err(EconomyError::ParseError(format!("unknown command '!{}'", other))),
    }
}

const HELP_TEXT: &str = "Commands: !life !death !scavenge !craft !disassemble !trade !start_project \
!contribute !work_on_project !check_project !project !list_projects !honor !session !stats !inventory \
!move_item !donate !donations";

fn render_task(task: &ActiveTask) -> String {
    match task.completes_at() {
        Some(at) => format!("{} (done {})", task.describe(), at.format("%Y-%m-%d %H:%M UTC")),
        None => task.describe(),
    }
}

fn render_project(view: &ProjectView) -> String {
    let mut out = format!("Project {} (ID {}): {}", view.name, view.id, view.status);
    if view.status == ProjectStatus::Completed {
        out.push_str(&format!("\nReward: {}", view.reward));
        return out;
    }
    if let Some(phase) = &view.phase {
        out.push_str(&format!("\nPhase: {}", phase));
    }
    for p in &view.progress {
        out.push_str(&format!("\n- {}: {}/{}", p.resource, p.contributed, p.required));
    }
    out
}

fn render_trade(trade: &TradeProposal) -> String {
    format!(
        "{}: {} offers {} {} for {} {}",
        trade.id, trade.character, trade.offer_amount, trade.offer, trade.request_amount, trade.request
    )
}

fn render_inventory(c: &CharacterRecord) -> String {
    let mut out = format!(
        "{} (owner {}) XP: {} Currency: {} Honor: {}\nBusy: {}",
        c.name,
        c.owner_name,
        c.experience,
        c.currency,
        c.honor,
        render_task(&c.task)
    );
    out.push_str(&format!("\nItems: {}", render_stacks(&c.items)));
    if !c.inventory.is_empty() {
        out.push_str(&format!("\nInventory: {}", render_stacks(&c.inventory)));
    }
    if !c.stash.is_empty() {
        out.push_str(&format!("\nStash: {}", render_stacks(&c.stash)));
    }
    out
}

fn render_stacks(stacks: &[ItemStack]) -> String {
    if stacks.is_empty() {
        return "none".to_string();
    }
    stacks
        .iter()
        .map(|s| format!("{} x{}", s.item, s.quantity))
        .collect::<Vec<_>>()
        .join(", ")
}

async fn run(economy: &Economy, invoker: &Invoker, command: EconomyCommand) -> Result<String, EconomyError> {
    Ok(match command {
        EconomyCommand::CreateCharacter(name) => {
            let c = economy.create_character(&invoker.id, &invoker.name, &name).await?;
            format!("✅ Character {} created and locked to {}.", c.name, invoker.name)
        }
        EconomyCommand::DeleteCharacter(name) => {
            economy.delete_character(&invoker.id, &name).await?;
            format!("💀 {} has been deleted.", name.trim())
        }
        EconomyCommand::Scavenge(character, group) => {
            let task = economy.start_scavenge(&character, group.as_deref()).await?;
            format!("🔍 {} is {}.", character, render_task(&task))
        }
        EconomyCommand::Craft(character, item) => {
            let task = economy.start_craft(&character, &item).await?;
            format!("🛠️ {} started {}.", character, render_task(&task))
        }
        EconomyCommand::Disassemble(character, item) => {
            let task = economy.start_disassemble(&character, &item).await?;
            format!("🔧 {} started {}.", character, render_task(&task))
        }
        EconomyCommand::ProposeTrade(character, terms) => {
            let trade = economy.propose_trade(&invoker.id, &character, &terms).await?;
            format!("📜 Trade proposal {} created. Accept with: !trade accept <character> {}", trade.id, trade.id)
        }
        EconomyCommand::AcceptTrade(character, id) => {
            let trade = economy.accept_trade(&character, &id).await?;
            format!("✅ Trade {} completed.", trade.id)
        }
        EconomyCommand::ListTrades => {
            let trades = economy.list_trades()?;
            if trades.is_empty() {
                "There are no open trades at the moment.".to_string()
            } else {
                trades.iter().map(render_trade).collect::<Vec<_>>().join("\n")
            }
        }
        EconomyCommand::StartProject(kind) => {
            let project = economy.start_project(&invoker.id, &kind).await?;
            format!("🏗️ Project {} started with ID {}.", project.name, project.id)
        }
        EconomyCommand::Contribute(character, id, resource, amount) => {
            let view = economy.contribute(&character, id, &resource, amount).await?;
            format!("✅ {} contributed {} {}.\n{}", character, amount, resource, render_project(&view))
        }
        EconomyCommand::Labor(character, id, hours) => {
            let task = economy.start_labor(&character, id, hours).await?;
            format!("🛠️ {} is {}.", character, render_task(&task))
        }
        EconomyCommand::CheckProject(id) => render_project(&economy.check_project(id).await?),
        EconomyCommand::ProjectStatus(id) => render_project(&economy.query_project(id)?),
        EconomyCommand::ListProjects => {
            let projects = economy.list_projects()?;
            if projects.is_empty() {
                "No active projects.".to_string()
            } else {
                projects
                    .iter()
                    .map(|p| format!("- {} (ID {}), Phase: {}", p.name, p.id, p.phase.as_deref().unwrap_or("-")))
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        }
        EconomyCommand::AwardHonor(amount, character) => {
            let c = economy.award_honor(&invoker.id, &character, amount).await?;
            format!("✅ Awarded {} Honor to {}. Total: {}", amount, c.name, c.honor)
        }
        EconomyCommand::ConsumeHonor(amount, character) => {
            let c = economy.consume_honor(&character, amount).await?;
            format!(
                "✅ {} consumed {} Honor and gained {} XP. Remaining Honor: {}",
                c.name,
                amount,
                amount.saturating_mul(economy.rules().honor_xp_rate),
                c.honor
            )
        }
        EconomyCommand::Session(session, character, xp, earned, expenses) => {
            let c = economy.log_session(&character, &session, xp, earned, expenses).await?;
            format!(
                "📜 Session {} recorded for {}: XP {} | Earned {} | Expenses {}\nTotals: XP {}, Currency {}",
                session, c.name, xp, earned, expenses, c.experience, c.currency
            )
        }
        EconomyCommand::Stats => {
            let roster = economy.owner_stats(&invoker.id)?;
            if roster.is_empty() {
                "You have no characters.".to_string()
            } else {
                roster
                    .iter()
                    .map(|c| format!("{}: XP {}, Currency {}, Honor {}", c.name, c.experience, c.currency, c.honor))
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        }
        EconomyCommand::Inventory(character) => render_inventory(&economy.inventory(&invoker.id, &character)?),
        EconomyCommand::MoveItem(character, from, to, item, amount) => {
            let c = economy.move_item(&character, &from, &to, &item, amount).await?;
            format!("📦 {} moved {} {} from {} to {}.", c.name, amount, item.trim(), from, to)
        }
        EconomyCommand::Donate(character, item, amount) => {
            let receipt = economy.donate(&character, &item, amount).await?;
            format!(
                "🎁 {} donated {} {} worth {:.3} points. Total donated: {:.3}",
                character, receipt.amount, receipt.item, receipt.value, receipt.total_value
            )
        }
        EconomyCommand::Donations(character) => {
            let tally = economy.donations(&character)?;
            if tally.items.is_empty() {
                format!("{} has not donated anything yet.", tally.character)
            } else {
                let items: Vec<String> = tally.items.iter().map(|(item, n)| format!("{} x{}", item, n)).collect();
                format!("{} donated {} (worth {:.3} points)", tally.character, items.join(", "), tally.total_value)
            }
        }
        EconomyCommand::Help => HELP_TEXT.to_string(),
    })
}

/// Parse and run one line, always producing a reply.
pub async fn execute(economy: &Economy, invoker: &Invoker, line: &str) -> String {
    let command = match parse_command(line) {
        Ok(command) => command,
        Err(e) => return format!("⚠️ {}", e),
    };
    info!("{} ({}) -> {}", escape_log(&invoker.name), invoker.id, escape_log(line.trim()));
    match run(economy, invoker, command).await {
        Ok(reply) => reply,
        Err(e) if e.is_fatal() => {
            warn!("command '{}' failed: {}", escape_log(line.trim()), e);
            "⚠️ Something went wrong; nothing was changed.".to_string()
        }
        Err(e) => format!("⚠️ {}", e),
    }
}

/// Run commands from `reader` one line at a time, in input order, handing
/// each reply to `reply`. Blank lines are skipped. Returns how many commands
/// ran before the reader was exhausted.
pub async fn execute_lines<R>(
    economy: &Economy,
    invoker: &Invoker,
    reader: R,
    mut reply: impl FnMut(String),
) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut executed = 0;
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        reply(execute(economy, invoker, &line).await);
        executed += 1;
    }
    Ok(executed)
}
