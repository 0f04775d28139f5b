use std::fmt::Write as _;

use anyhow::{anyhow, bail, Context, Result};
use client_core::{
    hints, GameSession, MiniGameSession, NoticeLevel, RoundPhase, RoundTransition, SessionError,
    SessionEvent,
};
use shared::{
    domain::{AlphaId, GameEvent, GameSnapshot},
    protocol::StaffKind,
};

pub const HELP: &str = "\
commands:
  state                          reload and show the desk
  next                           advance one week
  research <style> <weeks>       start alpha research (style RiskModel for risk research)
  hire <name> <skill> <salary>   hire a quant
  hire-infra <name> <skill>      hire an infrastructure specialist
  fire <quant|infra> <name>      let someone go
  upgrade <infra>                upgrade infrastructure, e.g. compute_level
  alloc <alpha_id>=<weight> ...  set target portfolio weights
  save [name] | load [name] | saves
  restart                        start a fresh game
  sharpe start | sharpe <guess>  guess-the-Sharpe mini-game
  trivia start | trivia <n>      market trivia, answer by option number
  mm start | mm <spread>         market-making, quote a half-spread
  close                          close the open mini-game
  event | choose <n> | ack       show, choose on, or acknowledge the current event
  help | quit";

#[derive(Debug, Clone, PartialEq)]
pub enum GameInput<T> {
    Start,
    Submit(T),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    State,
    Next,
    Research { style: String, weeks: u32 },
    Hire { name: String, skill: u32, salary: u64 },
    HireInfra { name: String, skill: u32 },
    Fire { kind: StaffKind, name: String },
    Upgrade(String),
    Alloc(Vec<(AlphaId, f64)>),
    Save(String),
    Load(String),
    Saves,
    Restart,
    Sharpe(GameInput<String>),
    /// Zero-based option index.
    Trivia(GameInput<usize>),
    Mm(GameInput<String>),
    Close,
    Event,
    /// Zero-based choice index.
    Choose(usize),
    Ack,
    Help,
    Quit,
}

pub fn parse_command(line: &str) -> Result<Command> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        bail!("empty command; type `help`");
    };
    let rest: Vec<&str> = words.collect();

    let command = match (head.to_ascii_lowercase().as_str(), rest.as_slice()) {
        ("state", []) => Command::State,
        ("next", []) => Command::Next,
        ("research", [style, weeks]) => Command::Research {
            style: style.to_string(),
            weeks: parse_number("weeks", weeks)?,
        },
        ("hire", [name, skill, salary]) => Command::Hire {
            name: name.to_string(),
            skill: parse_number("skill", skill)?,
            salary: parse_number("salary", salary)?,
        },
        ("hire-infra", [name, skill]) => Command::HireInfra {
            name: name.to_string(),
            skill: parse_number("skill", skill)?,
        },
        ("fire", [kind, name @ ..]) if !name.is_empty() => Command::Fire {
            kind: match kind.to_ascii_lowercase().as_str() {
                "quant" => StaffKind::Quant,
                "infra" => StaffKind::Infra,
                other => bail!("unknown staff type '{other}'; use quant or infra"),
            },
            name: name.join(" "),
        },
        ("upgrade", [infra]) => Command::Upgrade(infra.to_string()),
        ("alloc", pairs) if !pairs.is_empty() => Command::Alloc(
            pairs
                .iter()
                .map(|pair| parse_allocation(pair))
                .collect::<Result<_>>()?,
        ),
        ("save", name) => Command::Save(name.join(" ")),
        ("load", name) => Command::Load(name.join(" ")),
        ("saves", []) => Command::Saves,
        ("restart", []) => Command::Restart,
        ("sharpe", ["start"]) => Command::Sharpe(GameInput::Start),
        ("sharpe", [guess]) => Command::Sharpe(GameInput::Submit(guess.to_string())),
        ("trivia", ["start"]) => Command::Trivia(GameInput::Start),
        ("trivia", [option]) => Command::Trivia(GameInput::Submit(parse_ordinal(option)?)),
        ("mm", ["start"]) => Command::Mm(GameInput::Start),
        ("mm", [spread]) => Command::Mm(GameInput::Submit(spread.to_string())),
        ("close", []) => Command::Close,
        ("event", []) => Command::Event,
        ("choose", [choice]) => Command::Choose(parse_ordinal(choice)?),
        ("ack", []) => Command::Ack,
        ("help", _) => Command::Help,
        ("quit" | "exit", []) => Command::Quit,
        (other, _) => bail!("don't know how to '{other}' with those arguments; type `help`"),
    };
    Ok(command)
}

fn parse_number<T: std::str::FromStr>(field: &str, raw: &str) -> Result<T> {
    raw.parse()
        .map_err(|_| anyhow!("{field} must be a whole number, got '{raw}'"))
}

/// Players count options from 1.
fn parse_ordinal(raw: &str) -> Result<usize> {
    let n: usize = parse_number("option", raw)?;
    n.checked_sub(1)
        .ok_or_else(|| anyhow!("options are numbered from 1"))
}

fn parse_allocation(pair: &str) -> Result<(AlphaId, f64)> {
    let (id, weight) = pair
        .split_once('=')
        .ok_or_else(|| anyhow!("allocation '{pair}' must look like alpha_id=weight"))?;
    let weight: f64 = weight
        .parse()
        .with_context(|| format!("weight for '{id}' is not a number"))?;
    Ok((AlphaId::from(id), weight))
}

/// Errors the session already published as a notice.
pub fn already_noticed(err: &SessionError) -> bool {
    matches!(err, SessionError::Rejected(_) | SessionError::Dispatch(_))
}

pub async fn execute(session: &GameSession, command: Command) -> Result<()> {
    match command {
        Command::State => {
            let snapshot = session.load_state().await?;
            println!("{}", render_desk(&snapshot));
        }
        Command::Next => {
            let receipt = session.next_turn().await?;
            if let Some(snapshot) = receipt.snapshot {
                println!("{}", render_top_bar(&snapshot));
            }
        }
        Command::Research { style, weeks } => {
            if let Some(snapshot) = session.snapshot().await {
                println!(
                    "estimated duration: {} weeks with current team/infra",
                    hints::research_duration_estimate(&snapshot, weeks)
                );
            }
            session.start_research(&style, weeks).await?;
        }
        Command::Hire {
            name,
            skill,
            salary,
        } => {
            let hint = hints::salary_hint(skill, salary);
            if hint.below_minimum {
                println!(
                    "note: skill {skill} usually needs at least {}",
                    format_money(hint.minimum as f64)
                );
            }
            session.hire_quant(&name, skill, salary).await?;
        }
        Command::HireInfra { name, skill } => {
            session.hire_infra(&name, skill).await?;
        }
        Command::Fire { kind, name } => {
            session.fire_staff(kind, &name).await?;
        }
        Command::Upgrade(infra) => {
            session.upgrade_infra(&infra).await?;
        }
        Command::Alloc(weights) => {
            session.update_portfolio(weights).await?;
        }
        Command::Save(name) => {
            session.save_game(&name).await?;
        }
        Command::Load(name) => {
            let receipt = session.load_game(&name).await?;
            if let Some(snapshot) = receipt.snapshot {
                println!("{}", render_desk(&snapshot));
            }
        }
        Command::Saves => {
            let saves = session.list_saves().await?;
            if saves.is_empty() {
                println!("no saves yet");
            }
            for name in saves {
                println!("  {name}");
            }
        }
        Command::Restart => {
            session.restart_game().await?;
        }
        Command::Sharpe(input) => {
            match input {
                GameInput::Start => session.start_estimation().await?,
                GameInput::Submit(raw) => {
                    let transition = session.submit_estimation_guess(&raw).await?;
                    print_transition(&transition);
                }
            }
            print_mini_game(session).await;
        }
        Command::Trivia(input) => {
            match input {
                GameInput::Start => session.start_trivia().await?,
                GameInput::Submit(choice) => {
                    let transition = session.answer_trivia(choice).await?;
                    print_transition(&transition);
                }
            }
            print_mini_game(session).await;
        }
        Command::Mm(input) => {
            match input {
                GameInput::Start => session.start_market_making().await?,
                GameInput::Submit(raw) => {
                    let transition = session.submit_spread(&raw).await?;
                    print_transition(&transition);
                }
            }
            print_mini_game(session).await;
        }
        Command::Close => match session.close_mini_game().await? {
            Some(kind) => println!("closed {kind}"),
            None => println!("no mini-game open"),
        },
        Command::Event => match session.current_event().await {
            Some(event) => println!("{}", render_event(&event)),
            None => println!("no pending event"),
        },
        Command::Choose(index) => {
            if session.choose_event(index).await?.is_none() {
                println!("dismissed");
            }
        }
        Command::Ack => {
            session.acknowledge_event().await?;
        }
        Command::Help => println!("{HELP}"),
        Command::Quit => {}
    }
    Ok(())
}

async fn print_mini_game(session: &GameSession) {
    if let Some(view) = session.with_mini_game(|open| open.map(render_mini_game)).await {
        println!("{view}");
    }
}

fn print_transition(transition: &RoundTransition) {
    match transition {
        RoundTransition::Advanced { resolved, next } => {
            println!("round {resolved} resolved; on to round {next}")
        }
        RoundTransition::Finished { resolved, reward } => match reward {
            Some(reward) => println!("game over after round {resolved}: {reward}"),
            None => println!("game over after round {resolved}"),
        },
    }
}

/// One line per stream event worth printing.
pub fn describe_event(event: &SessionEvent) -> Option<String> {
    match event {
        SessionEvent::Notice(notice) => {
            let tag = match notice.level {
                NoticeLevel::Info => "info",
                NoticeLevel::Warning => "warn",
                NoticeLevel::Error => "error",
            };
            Some(format!(
                "[{} {tag}] {}",
                notice.at.format("%H:%M:%S"),
                notice.message
            ))
        }
        SessionEvent::EventShown(event) => Some(render_event(event)),
        SessionEvent::MiniGameStarted {
            kind, total_rounds, ..
        } => Some(match total_rounds {
            Some(total) => format!("{kind} started ({total} rounds)"),
            None => format!("{kind} started"),
        }),
        SessionEvent::MiniGameFinished { kind, score, .. } => {
            Some(format!("{kind} finished with score {score:.2}"))
        }
        SessionEvent::SnapshotReplaced { .. }
        | SessionEvent::RoundResolved { .. }
        | SessionEvent::MiniGameClosed(_)
        | SessionEvent::EventResolved { .. }
        | SessionEvent::SavesListed(_) => None,
    }
}

pub fn render_top_bar(snapshot: &GameSnapshot) -> String {
    let player = &snapshot.player;
    format!(
        "Y{} W{} | cash {} | AUM {} | sharpe {:.2} | level {} ({:.0}% xp) | drawdown {:.1}% | regime {}",
        snapshot.year,
        snapshot.week,
        format_money(player.cash),
        format_money(player.aum),
        player.rolling_sharpe,
        player.level,
        hints::xp_progress_pct(snapshot),
        player.current_drawdown * 100.0,
        snapshot.environment.regime,
    )
}

pub fn render_desk(snapshot: &GameSnapshot) -> String {
    let mut out = render_top_bar(snapshot);

    let _ = write!(out, "\nteam ({}", snapshot.team.len());
    match hints::average_happiness(snapshot) {
        Some(avg) => {
            let _ = writeln!(out, ", avg happiness {avg:.0}):");
        }
        None => out.push_str("):\n"),
    }
    for quant in &snapshot.team {
        let _ = writeln!(
            out,
            "  {:<14} skill {:>3.0}  happiness {:>3.0}",
            quant.name, quant.skill, quant.happiness
        );
    }
    for hire in &snapshot.pending_hires {
        let _ = writeln!(
            out,
            "  {:<14} onboarding ({} weeks)",
            hire.name,
            hire.onboarding_weeks.unwrap_or_default()
        );
    }

    out.push_str("infrastructure:");
    for (key, level) in &snapshot.infrastructure {
        let _ = write!(out, " {} {level};", hints::infra_display_name(key));
    }
    out.push('\n');

    out.push_str("alphas:\n");
    for alpha in snapshot.alphas.allocatable() {
        let _ = writeln!(
            out,
            "  {:<12} {:<10} exp {:>6.2}%  weight {:.2}",
            alpha.id,
            alpha.style,
            alpha.current_expected_return * 100.0,
            snapshot.portfolio.weight_of(&alpha.id)
        );
    }
    for alpha in &snapshot.alphas.stored_for_ensemble {
        let _ = writeln!(out, "  {:<12} {:<10} stored", alpha.id, alpha.style);
    }
    for alpha in &snapshot.alphas.in_research {
        let _ = writeln!(
            out,
            "  {:<12} {:<10} researching, {} weeks left",
            alpha.id, alpha.style, alpha.weeks_remaining
        );
    }

    if let Some(total) = hints::cumulative_pnl(&snapshot.player.pnl_history).last() {
        let _ = writeln!(out, "cumulative pnl: {}", format_money(*total));
    }
    for line in snapshot.message_log.iter().rev().take(5) {
        let _ = writeln!(out, "> {line}");
    }
    if !snapshot.events_queue.is_empty() {
        let _ = writeln!(out, "{} event(s) pending", snapshot.events_queue.len());
    }
    out.trim_end().to_string()
}

pub fn render_event(event: &GameEvent) -> String {
    let mut out = format!("== {} ==\n{}", event.title, event.description);
    if event.is_informational() {
        out.push_str("\n(ack to dismiss)");
    }
    for (n, choice) in event.choices.iter().enumerate() {
        let _ = write!(out, "\n  {}. {}", n + 1, choice.label);
    }
    out
}

/// Round phase as the desk presents it.
pub fn status_line(session: &MiniGameSession) -> String {
    let kind = session.kind();
    match session.phase() {
        RoundPhase::Active(round) => match session.total_rounds() {
            Some(total) => format!("{kind} round {round}/{total}"),
            None => format!("{kind} round {round}"),
        },
        RoundPhase::Awaiting(round) => format!("{kind} round {round}: waiting"),
        RoundPhase::Terminal => format!("{kind} finished"),
    }
}

pub fn render_mini_game(session: &MiniGameSession) -> String {
    let mut out = status_line(session);
    let _ = write!(out, " | score {:.2}", session.score());

    match session {
        MiniGameSession::Estimation(game) => {
            if let Some(last) = game.last_outcome() {
                let _ = write!(
                    out,
                    "\n  true sharpe {:.2}, error {:.2}, +{} points",
                    last.true_sharpe, last.error, last.points
                );
            }
            if game.phase() != RoundPhase::Terminal {
                let path = &game.round().cumulative;
                if let (Some(first), Some(last)) = (path.first(), path.last()) {
                    let _ = write!(
                        out,
                        "\n  path: {} points, {:+.2}% total return",
                        path.len(),
                        (last - first) * 100.0
                    );
                }
            }
            if game.is_terminal() {
                for (rank, entry) in game.extras().leaderboard.iter().enumerate() {
                    let _ = write!(
                        out,
                        "\n  {}. score {} | avg error {:.2} (Y{} W{})",
                        rank + 1,
                        entry.score,
                        entry.avg_error,
                        entry.year,
                        entry.week
                    );
                }
            }
        }
        MiniGameSession::Trivia(game) => {
            if let Some(last) = game.last_outcome() {
                let verdict = if last.correct { "correct" } else { "wrong" };
                let _ = write!(out, "\n  {verdict}; answer was {}", last.answer_index + 1);
            }
            if !game.is_terminal() {
                let question = game.round();
                let _ = write!(out, "\n  {}", question.prompt);
                for (n, option) in question.options.iter().enumerate() {
                    let _ = write!(out, "\n    {}. {option}", n + 1);
                }
            }
        }
        MiniGameSession::MarketMaking(game) => {
            let state = game.round();
            let _ = write!(
                out,
                "\n  mid {:.2} | inventory {} | cash {:.2} | pnl {:.2}",
                state.mid_price, state.inventory, state.cash, state.pnl
            );
            if let Some(quote) = game.extras().quotes.last() {
                let _ = write!(
                    out,
                    "\n  last quote {:.2} / {:.2}: bid {}, ask {}",
                    quote.bid,
                    quote.ask,
                    if quote.buy_filled { "filled" } else { "missed" },
                    if quote.sell_filled { "filled" } else { "missed" },
                );
            }
            if let Some(xp) = game.extras().xp_gain {
                let _ = write!(out, "\n  +{xp} xp");
            }
        }
    }
    out
}

/// `1234567.8` -> `$1,234,568`.
pub fn format_money(amount: f64) -> String {
    let rounded = amount.round() as i64;
    let digits = rounded.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, digit) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    if rounded < 0 {
        format!("-${grouped}")
    } else {
        format!("${grouped}")
    }
}

#[cfg(test)]
#[path = "tests/shell_tests.rs"]
mod tests;
