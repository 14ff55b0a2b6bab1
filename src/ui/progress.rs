use crate::orchestrator::{OrchestratorState, RunOutcome, RunSummary, TickOutcome};
use crate::ui::icons::{BLOCKER, CHECK, CLOCK, CROSS, PAUSE, RUNNING, SEARCH, SPARKLE, STOP};
use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration;

/// Terminal UI for `loopsmith run`, rendered via `indicatif` progress bars.
///
/// Two bars are stacked vertically:
/// - Tick bar: spinner with the active task and its phase
/// - Stats bar: backlog counts and the iteration total
pub struct LoopUI {
    multi: MultiProgress,
    tick_bar: ProgressBar,
    stats_bar: ProgressBar,
    verbose: bool,
}

impl LoopUI {
    pub fn new(verbose: bool) -> Self {
        let multi = MultiProgress::new();

        let tick_style = ProgressStyle::default_spinner()
            .template("{prefix:.bold.dim} {spinner} {msg}")
            .expect("progress bar template is a valid static string");
        let tick_bar = multi.add(ProgressBar::new_spinner());
        tick_bar.set_style(tick_style);
        tick_bar.set_prefix(" Loop");
        tick_bar.enable_steady_tick(Duration::from_millis(100));

        let stats_style = ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} {msg}")
            .expect("progress bar template is a valid static string");
        let stats_bar = multi.add(ProgressBar::new(0));
        stats_bar.set_style(stats_style);
        stats_bar.set_prefix("Stats");

        Self {
            multi,
            tick_bar,
            stats_bar,
            verbose,
        }
    }

    /// Print a line via `MultiProgress`, falling back to `eprintln!` if the rich UI fails.
    fn print_line(&self, msg: impl AsRef<str>) {
        if self.multi.println(msg.as_ref()).is_err() {
            eprintln!("{}", msg.as_ref());
        }
    }

    pub fn print_header(&self, project: &str, state: &OrchestratorState) {
        self.print_line(format!("{}", style("═".repeat(70)).cyan()));
        self.print_line(format!(
            "{} {} {}",
            style("▶").green().bold(),
            style("loopsmith").bold(),
            style(project).yellow()
        ));
        self.print_line(format!("{}", style("═".repeat(70)).cyan()));
        if let Some(task) = &state.active_task {
            self.print_line(format!(
                "{}  {} ({})",
                style("Resuming:").dim(),
                task.title,
                task.phase
            ));
        }
        self.update_stats(state);
    }

    /// Reflect one tick outcome.
    pub fn on_tick(&self, outcome: &TickOutcome, state: &OrchestratorState) {
        let task_line = match &state.active_task {
            Some(task) => format!(
                "{} {}",
                style(task.phase).cyan(),
                style(&task.title).bold()
            ),
            None => style("idle").dim().to_string(),
        };
        self.tick_bar.set_message(format!(
            "{} {}",
            task_line,
            style(format!("({})", outcome.describe())).dim()
        ));

        match outcome {
            TickOutcome::Promoted { title, .. } => {
                self.print_line(format!("  {}Started {}", RUNNING, style(title).yellow()));
            }
            TickOutcome::Discovered { tier, added } => {
                self.print_line(format!(
                    "  {}Discovery ({}) added {} item(s)",
                    SEARCH,
                    tier,
                    style(added).cyan()
                ));
            }
            TickOutcome::Completed { title, .. } => {
                self.print_line(format!(
                    "  {}Completed {}",
                    SPARKLE,
                    style(title).green().bold()
                ));
            }
            TickOutcome::Blocked { title, reason, .. } => {
                self.print_line(format!(
                    "  {}Blocked {}: {}",
                    BLOCKER,
                    style(title).red().bold(),
                    reason
                ));
            }
            TickOutcome::Throttled { .. } => {
                self.print_line(format!("  {}{}", CLOCK, outcome.describe()));
            }
            TickOutcome::Advanced { .. } if self.verbose => {
                self.print_line(format!(
                    "    {} {}",
                    style("→").dim(),
                    style(outcome.describe()).dim()
                ));
            }
            _ => {}
        }
        self.update_stats(state);
    }

    fn update_stats(&self, state: &OrchestratorState) {
        let backlog = state.backlog.summary();
        self.stats_bar.set_message(format!(
            "backlog {} pending | {} done | {} blocked | {} iterations",
            style(backlog.pending).cyan(),
            style(backlog.done).green(),
            style(backlog.blocked).red(),
            state.breakers.iterations
        ));
    }

    pub fn finish(&self, summary: &RunSummary) {
        let icon = match &summary.outcome {
            RunOutcome::Paused { .. } => PAUSE,
            RunOutcome::Aborted { .. } => STOP,
            RunOutcome::TickLimit { .. } => CHECK,
        };
        self.tick_bar
            .finish_with_message(format!("{}{}", icon, summary.reason));
        self.stats_bar.finish();
    }

    pub fn fail(&self, msg: &str) {
        self.tick_bar
            .finish_with_message(format!("{}{}", CROSS, style(msg).red()));
        self.stats_bar.finish();
    }
}
