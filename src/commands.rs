//! Command palette
//!
//! A closed set of slash commands ([`PALETTE_COMMANDS`]) that insert blocks
//! or control execution. [`matches`] ranks candidates for a query; [`run`]
//! performs one. [`Palette`] is the interactive state (query, selection)
//! behind the insert popup.

use crate::graph::GraphSynchronizer;
use crate::registry::BlockKind;
use crate::telemetry::Scheduler;
use crate::types::Position;
use serde::Serialize;

/// What a palette command does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CommandAction {
    /// Add a block at the cursor
    Insert(BlockKind),
    /// Stop, reload every machine and clear telemetry
    Reset,
    /// Start free-running
    Run,
    /// Stop free-running
    Stop,
    /// Advance one step
    Step,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PaletteCommand {
    /// Typed after the slash, e.g. `/osc`
    pub prefix: &'static str,
    pub name: &'static str,
    pub action: CommandAction,
}

pub const PALETTE_COMMANDS: &[PaletteCommand] = &[
    PaletteCommand {
        prefix: "machine",
        name: "Insert Machine",
        action: CommandAction::Insert(BlockKind::Machine),
    },
    PaletteCommand {
        prefix: "pixel",
        name: "Insert Pixel Display",
        action: CommandAction::Insert(BlockKind::Pixel),
    },
    PaletteCommand {
        prefix: "tap",
        name: "Insert Tap",
        action: CommandAction::Insert(BlockKind::Tap),
    },
    PaletteCommand {
        prefix: "osc",
        name: "Insert Oscillator",
        action: CommandAction::Insert(BlockKind::Oscillator),
    },
    PaletteCommand {
        prefix: "clock",
        name: "Insert Clock",
        action: CommandAction::Insert(BlockKind::Clock),
    },
    PaletteCommand {
        prefix: "plot",
        name: "Insert Plotter",
        action: CommandAction::Insert(BlockKind::Plotter),
    },
    PaletteCommand {
        prefix: "midi-in",
        name: "Insert MIDI Input",
        action: CommandAction::Insert(BlockKind::MidiIn),
    },
    PaletteCommand {
        prefix: "midi-out",
        name: "Insert MIDI Output",
        action: CommandAction::Insert(BlockKind::MidiOut),
    },
    PaletteCommand {
        prefix: "view",
        name: "Insert Value Viewer",
        action: CommandAction::Insert(BlockKind::ValueView),
    },
    PaletteCommand {
        prefix: "reset",
        name: "Reset Machines",
        action: CommandAction::Reset,
    },
    PaletteCommand {
        prefix: "run",
        name: "Run",
        action: CommandAction::Run,
    },
    PaletteCommand {
        prefix: "stop",
        name: "Stop",
        action: CommandAction::Stop,
    },
    PaletteCommand {
        prefix: "step",
        name: "Step Once",
        action: CommandAction::Step,
    },
];

fn is_subsequence(needle: &str, haystack: &str) -> bool {
    let mut rest = haystack.chars();
    needle.chars().all(|c| rest.any(|h| h == c))
}

fn rank(command: &PaletteCommand, query: &str) -> Option<u8> {
    if command.prefix == query {
        Some(0)
    } else if command.prefix.starts_with(query) {
        Some(1)
    } else if is_subsequence(query, &command.name.to_lowercase())
        || is_subsequence(query, command.prefix)
    {
        Some(2)
    } else {
        None
    }
}

/// Commands matching `query`, best first.
///
/// A leading `/` and surrounding whitespace are ignored; matching is case
/// insensitive. An empty query matches nothing.
pub fn matches(query: &str) -> Vec<&'static PaletteCommand> {
    let query = query.trim().trim_start_matches('/').trim().to_lowercase();
    if query.is_empty() {
        return Vec::new();
    }

    let mut ranked: Vec<(u8, &'static PaletteCommand)> = PALETTE_COMMANDS
        .iter()
        .filter_map(|command| rank(command, &query).map(|score| (score, command)))
        .collect();
    // Stable: ties keep declaration order
    ranked.sort_by_key(|(score, _)| *score);
    ranked.into_iter().map(|(_, command)| command).collect()
}

/// Everything a command may act on
pub struct CommandContext<'a> {
    pub graph: &'a mut GraphSynchronizer,
    pub scheduler: &'a Scheduler,
}

/// Perform `command`; true when it was consumed
pub fn run(command: &PaletteCommand, position: Position, ctx: &mut CommandContext<'_>) -> bool {
    tracing::debug!("Running palette command /{}", command.prefix);

    match command.action {
        CommandAction::Insert(kind) => ctx.graph.add_node(kind, position).is_some(),
        CommandAction::Reset => {
            ctx.scheduler.stop();
            let reloaded = ctx.graph.reload_all();
            ctx.scheduler.poller().reset();
            tracing::info!("Reset {} machine(s)", reloaded);
            true
        }
        CommandAction::Run => {
            ctx.scheduler.start();
            true
        }
        CommandAction::Stop => {
            ctx.scheduler.stop();
            true
        }
        CommandAction::Step => {
            ctx.scheduler.step_once();
            true
        }
    }
}

/// Interactive palette state
#[derive(Debug, Clone, Default)]
pub struct Palette {
    visible: bool,
    query: String,
    selected: usize,
    matches: Vec<&'static PaletteCommand>,
}

impl Palette {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Show or hide (the `/` hotkey)
    pub fn toggle(&mut self) {
        self.visible = !self.visible;
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    /// Replace the query text; selection returns to the first match
    pub fn set_query(&mut self, query: impl Into<String>) {
        self.query = query.into();
        self.matches = matches(&self.query);
        self.selected = 0;
    }

    pub fn matches(&self) -> &[&'static PaletteCommand] {
        &self.matches
    }

    pub fn selected_index(&self) -> usize {
        self.selected
    }

    pub fn selected(&self) -> Option<&'static PaletteCommand> {
        self.matches.get(self.selected).copied()
    }

    pub fn select_next(&mut self) {
        self.selected = (self.selected + 1).min(self.matches.len().saturating_sub(1));
    }

    pub fn select_previous(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    /// Run the selected command; the palette closes when it was consumed
    pub fn confirm(&mut self, position: Position, ctx: &mut CommandContext<'_>) -> bool {
        let Some(command) = self.selected() else {
            return false;
        };

        let consumed = run(command, position, ctx);
        if consumed {
            self.hide();
        }
        consumed
    }

    /// Close and clear the query
    pub fn hide(&mut self) {
        self.visible = false;
        self.set_query("");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefixes(query: &str) -> Vec<&'static str> {
        matches(query).iter().map(|c| c.prefix).collect()
    }

    #[test]
    fn test_empty_query_matches_nothing() {
        assert!(matches("").is_empty());
        assert!(matches(" / ").is_empty());
    }

    #[test]
    fn test_exact_prefix_ranks_first() {
        let found = prefixes("/step");
        assert_eq!(found.first(), Some(&"step"));
    }

    #[test]
    fn test_prefix_before_subsequence() {
        let found = prefixes("st");
        assert_eq!(&found[..2], &["stop", "step"]);
        // "Reset Machines" only matches as a subsequence
        assert!(found.contains(&"reset"));
        assert!(found.iter().position(|p| *p == "reset") > Some(1));
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(prefixes("OSC").first(), Some(&"osc"));
    }

    #[test]
    fn test_no_match() {
        assert!(matches("zzz").is_empty());
    }

    #[test]
    fn test_selection_is_clamped() {
        let mut palette = Palette::new();
        palette.set_query("i");
        let len = palette.matches().len();
        assert!(len > 1);

        for _ in 0..len + 3 {
            palette.select_next();
        }
        assert_eq!(palette.selected_index(), len - 1);

        for _ in 0..len + 3 {
            palette.select_previous();
        }
        assert_eq!(palette.selected_index(), 0);
    }

    #[test]
    fn test_query_change_resets_selection() {
        let mut palette = Palette::new();
        palette.set_query("i");
        palette.select_next();
        assert_eq!(palette.selected_index(), 1);

        palette.set_query("in");
        assert_eq!(palette.selected_index(), 0);
    }

    #[test]
    fn test_selection_without_matches_stays_zero() {
        let mut palette = Palette::new();
        palette.select_next();
        palette.select_previous();
        assert_eq!(palette.selected_index(), 0);
        assert!(palette.selected().is_none());
    }

    #[test]
    fn test_hide_clears_query() {
        let mut palette = Palette::new();
        palette.toggle();
        palette.set_query("tap");
        palette.hide();
        assert!(!palette.is_visible());
        assert_eq!(palette.query(), "");
        assert!(palette.matches().is_empty());
    }
}
