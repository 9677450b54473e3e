//! Stateful front door over roster, constraints, slots and the published
//! sheet.
//!
//! Every operation takes `&mut self`, so a status recompute and the
//! generate/adjust that follows it always see the same snapshot. Callers
//! that share an engine between tasks go through [`SharedEngine`].

use std::sync::Arc;

use chrono::{Local, NaiveDateTime};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::constraints::{Constraint, ConstraintKind, ConstraintStore};
use crate::display::{render_adjusted, render_allocation, render_participant_list, render_report, RenderContext, SheetKind};
use crate::error::{Result, TeeSheetError};
use crate::roster::{
    AddOutcome, ExtractedPlayer, ExtractionDelta, Guest, RemoveOutcome, Roster, StatusChanges, TimePreference,
};
use crate::schedule::blocks::build_blocks;
use crate::schedule::generate::generate_allocation;
use crate::schedule::republish::{adjust, move_player, swap_players, AdjustParams, Adjustment, ChangeReport};
use crate::schedule::slot_utils::{SlotConfig, SlotSet};
use crate::schedule::types::{Allocation, PlacementWarning, PublishedAllocation};

/// Everything that persists between runs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineState {
    pub roster: Roster,
    pub constraints: ConstraintStore,
    pub slots: SlotSet,
    pub published: Option<PublishedAllocation>,
}

impl EngineState {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            slots: SlotSet::new(config.slots.clone()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstraintOutcome {
    Added,
    Removed,
    /// Identical active constraint already stored
    AlreadyExists,
    /// Add: the named player is not on the roster. Remove: the subject has
    /// no matching active constraint.
    NotFound(String),
}

/// A rendered sheet plus what it took to produce it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sheet {
    pub rendered: String,
    /// False when the stored sheet was returned untouched
    pub changed: bool,
    pub warnings: Vec<PlacementWarning>,
}

/// Result of feeding extraction output to the engine
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshOutcome {
    pub changes: StatusChanges,
    /// Set when a published sheet had to be adjusted
    pub republished: Option<ChangeReport>,
    pub warnings: Vec<PlacementWarning>,
}

pub struct Engine {
    config: EngineConfig,
    state: EngineState,
    rng: ChaCha8Rng,
    clock: fn() -> NaiveDateTime,
}

fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let state = EngineState::new(&config);
        let (engine, _) = Self::resume(config, state);
        engine
    }

    /// Resumes from a stored snapshot.
    ///
    /// The configured slot sequence replaces the stored one (manual slot
    /// overrides are kept) and statuses are recomputed against the
    /// resulting capacity, so config edits take effect on the next run.
    pub fn resume(config: EngineConfig, mut state: EngineState) -> (Self, StatusChanges) {
        if state.slots.config != config.slots {
            match state.slots.configure(config.slots.clone()) {
                Ok(()) => info!(
                    start = %config.slots.start_time,
                    num_slots = config.slots.num_slots,
                    "Slot configuration changed since last run"
                ),
                Err(e) => warn!(error = %e, "Configured slots rejected; keeping stored sequence"),
            }
        }
        let rng = match config.random_seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        let mut engine = Self {
            config,
            state,
            rng,
            clock: local_now,
        };
        let changes = engine.recompute_statuses();
        (engine, changes)
    }

    /// Replaces the wall clock used for sheet timestamps
    pub fn with_clock(mut self, clock: fn() -> NaiveDateTime) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn into_state(self) -> EngineState {
        self.state
    }

    /// Spots available this week: slots × max group size
    pub fn capacity(&self) -> usize {
        self.state.slots.len() * self.config.max_group_size
    }

    pub fn recompute_statuses(&mut self) -> StatusChanges {
        let capacity = self.capacity();
        self.state.roster.recompute_statuses(capacity)
    }

    fn render_context(&self) -> RenderContext<'_> {
        RenderContext {
            title: &self.config.title,
            play_day: self.config.play_day,
            generated_at: (self.clock)(),
        }
    }

    // ---- roster ----

    pub fn add_participant(
        &mut self,
        name: &str,
        guests: Vec<Guest>,
        preference: Option<TimePreference>,
    ) -> Result<AddOutcome> {
        let capacity = self.capacity();
        self.state.roster.add_manually(name, guests, preference, capacity)
    }

    pub fn remove_participant(&mut self, name: &str) -> Result<RemoveOutcome> {
        if name.trim().is_empty() {
            return Err(TeeSheetError::MissingName);
        }
        let capacity = self.capacity();
        let outcome = self.state.roster.remove(name.trim(), capacity);
        if !outcome.removed {
            return Err(TeeSheetError::UnknownPlayer(name.trim().to_string()));
        }
        Ok(outcome)
    }

    pub fn add_guest(&mut self, host: &str, guest: &str) -> Result<StatusChanges> {
        let capacity = self.capacity();
        self.state.roster.add_guest(host.trim(), Guest::parse(guest), capacity)
    }

    pub fn remove_guest(&mut self, guest: &str, host: Option<&str>) -> Result<StatusChanges> {
        let capacity = self.capacity();
        self.state.roster.remove_guest(guest.trim(), host.map(str::trim), capacity)
    }

    pub fn set_time_preference(&mut self, name: &str, preference: Option<TimePreference>) -> Result<()> {
        self.state.roster.set_time_preference(name.trim(), preference)
    }

    pub fn clear_time_preferences(&mut self) {
        self.state.roster.clear_time_preferences();
    }

    /// Merges a full extraction, stores this week's detected pairings and
    /// nudges the published sheet if there is one.
    pub fn refresh_from_extraction(
        &mut self,
        players: Vec<ExtractedPlayer>,
        pairings: &[(String, String)],
    ) -> Result<RefreshOutcome> {
        let capacity = self.capacity();
        let changes =
            self.state
                .roster
                .replace_from_extraction(players, capacity, self.config.min_refresh_ratio)?;
        self.state.constraints.replace_weekly_pairings(pairings);
        let (republished, warnings) = self.auto_adjust();
        Ok(RefreshOutcome {
            changes,
            republished,
            warnings,
        })
    }

    /// Applies incremental extraction output, then nudges the published
    /// sheet
    pub fn apply_delta(&mut self, delta: ExtractionDelta) -> RefreshOutcome {
        let capacity = self.capacity();
        let changes = self.state.roster.apply_delta(delta, capacity);
        let (republished, warnings) = self.auto_adjust();
        RefreshOutcome {
            changes,
            republished,
            warnings,
        }
    }

    pub fn participant_list(&self) -> String {
        render_participant_list(&self.state.roster, self.capacity(), &self.config.title)
    }

    // ---- constraints ----

    fn check_names(&self, subject: &str, target: Option<&str>) -> Result<Option<String>> {
        if subject.is_empty() || target.is_some_and(str::is_empty) {
            return Err(TeeSheetError::MissingName);
        }
        if target.is_some_and(|t| t.eq_ignore_ascii_case(subject)) {
            return Err(TeeSheetError::SelfReference(subject.to_string()));
        }
        for name in std::iter::once(subject).chain(target) {
            if !self.state.roster.contains(name) {
                return Ok(Some(name.to_string()));
            }
        }
        Ok(None)
    }

    pub fn add_constraint(&mut self, kind: ConstraintKind, subject: &str, target: &str) -> Result<ConstraintOutcome> {
        let (subject, target) = (subject.trim(), target.trim());
        if let Some(missing) = self.check_names(subject, Some(target))? {
            return Ok(ConstraintOutcome::NotFound(missing));
        }
        if self.state.constraints.add(kind, subject, target) {
            Ok(ConstraintOutcome::Added)
        } else {
            Ok(ConstraintOutcome::AlreadyExists)
        }
    }

    /// With no target, removes every constraint of `kind` for the subject
    pub fn remove_constraint(
        &mut self,
        kind: ConstraintKind,
        subject: &str,
        target: Option<&str>,
    ) -> Result<ConstraintOutcome> {
        let subject = subject.trim();
        let target = target.map(str::trim);
        if subject.is_empty() || target.is_some_and(str::is_empty) {
            return Err(TeeSheetError::MissingName);
        }
        if self.state.constraints.remove(kind, subject, target) {
            Ok(ConstraintOutcome::Removed)
        } else {
            Ok(ConstraintOutcome::NotFound(subject.to_string()))
        }
    }

    pub fn constraints_for(&self, name: Option<&str>) -> Vec<&Constraint> {
        self.state.constraints.active(name)
    }

    // ---- slots ----

    pub fn configure_slots(&mut self, slots: SlotConfig) -> Result<StatusChanges> {
        self.state.slots.configure(slots)?;
        Ok(self.recompute_statuses())
    }

    pub fn add_slot(&mut self, time: &str) -> Result<StatusChanges> {
        if !self.state.slots.add(time)? {
            debug!(time, "Slot already available");
        }
        Ok(self.recompute_statuses())
    }

    pub fn remove_slot(&mut self, time: &str) -> Result<StatusChanges> {
        if !self.state.slots.remove(time)? {
            debug!(time, "Slot was not available");
        }
        Ok(self.recompute_statuses())
    }

    pub fn clear_slot_overrides(&mut self) -> StatusChanges {
        self.state.slots.clear_overrides();
        self.recompute_statuses()
    }

    pub fn slot_labels(&self) -> Vec<String> {
        self.state.slots.labels()
    }

    // ---- sheets ----

    /// Fresh allocation of the current playing roster; stores nothing.
    /// Statuses are current: every roster, slot and resume path recomputes.
    pub fn generate(&mut self) -> Result<Allocation> {
        let pairings = self.state.constraints.resolve_pairings();
        let avoidances = self.state.constraints.resolve_avoidances();
        let labels = self.state.slots.labels();
        generate_allocation(
            self.state.roster.playing(),
            &pairings,
            &avoidances,
            &self.config,
            &labels,
            &mut self.rng,
        )
    }

    /// Current sheet: the published one brought up to date, or a fresh one
    /// that becomes published.
    pub fn show(&mut self) -> Result<Sheet> {
        if self.state.published.is_none() {
            info!("No published sheet; generating and locking a fresh one");
            return self.publish();
        }
        let (report, warnings) = self.adjust_published();
        Ok(Sheet {
            rendered: self.published_text(),
            changed: report.is_some(),
            warnings,
        })
    }

    /// Generates a fresh sheet and locks it, replacing any published one
    pub fn publish(&mut self) -> Result<Sheet> {
        let allocation = self.generate()?;
        let now = (self.clock)();
        let rendered = render_allocation(
            &allocation,
            &RenderContext {
                generated_at: now,
                ..self.render_context()
            },
        );
        for warning in &allocation.warnings {
            warn!(%warning, "Published with an overridden constraint");
        }
        self.state.published = Some(PublishedAllocation {
            groups: allocation.groups,
            rendered: rendered.clone(),
            published_at: now,
        });
        info!("Tee sheet published");
        Ok(Sheet {
            rendered,
            changed: true,
            warnings: allocation.warnings,
        })
    }

    /// Throws the published sheet away and publishes a new draw
    pub fn randomize(&mut self) -> Result<Sheet> {
        self.state.published = None;
        info!("Randomizing tee sheet");
        self.publish()
    }

    /// Returns whether there was a published sheet to clear
    pub fn clear_published(&mut self) -> bool {
        self.state.published.take().is_some()
    }

    pub fn published(&self) -> Option<&PublishedAllocation> {
        self.state.published.as_ref()
    }

    fn published_text(&self) -> String {
        self.state
            .published
            .as_ref()
            .map(|p| p.rendered.clone())
            .unwrap_or_default()
    }

    fn auto_adjust(&mut self) -> (Option<ChangeReport>, Vec<PlacementWarning>) {
        if self.state.published.is_none() {
            return (None, Vec::new());
        }
        self.adjust_published()
    }

    /// Runs the diff against the playing roster and available tee times
    /// and stores the result. The report is `None` when nothing changed.
    fn adjust_published(&mut self) -> (Option<ChangeReport>, Vec<PlacementWarning>) {
        let Some(published) = self.state.published.as_ref() else {
            return (None, Vec::new());
        };
        let avoidances = self.state.constraints.resolve_avoidances();
        let current = build_blocks(self.state.roster.playing());
        let slots = self.state.slots.labels();
        let params = AdjustParams {
            avoidances: &avoidances,
            slots: &slots,
            max_group_size: self.config.max_group_size,
            min_group_size: self.config.min_group_size,
        };

        match adjust(&published.groups, &current, &params) {
            Adjustment::Unchanged => (None, Vec::new()),
            Adjustment::Changed {
                groups,
                report,
                warnings,
            } => {
                let now = (self.clock)();
                let rendered = render_report(
                    &groups,
                    &report,
                    &RenderContext {
                        generated_at: now,
                        ..self.render_context()
                    },
                );
                self.state.published = Some(PublishedAllocation {
                    groups,
                    rendered,
                    published_at: now,
                });
                (Some(report), warnings)
            }
        }
    }

    fn published_mut(&mut self) -> Result<&mut PublishedAllocation> {
        self.state
            .published
            .as_mut()
            .ok_or(TeeSheetError::NoPublishedAllocation)
    }

    fn rerender(&mut self, kind: SheetKind, changes: String) -> Result<String> {
        let ctx_title = self.config.title.clone();
        let play_day = self.config.play_day;
        let now = (self.clock)();
        let published = self.published_mut()?;
        published.rendered = render_adjusted(
            &published.groups,
            kind,
            &changes,
            &RenderContext {
                title: &ctx_title,
                play_day,
                generated_at: now,
            },
        );
        published.published_at = now;
        Ok(published.rendered.clone())
    }

    /// Swaps two players on the published sheet
    pub fn swap_players(&mut self, a: &str, b: &str) -> Result<String> {
        let published = self.published_mut()?;
        let (a, b) = swap_players(&mut published.groups, a.trim(), b.trim())?;
        self.rerender(SheetKind::Swapped, format!("Swapped {} and {}", a, b))
    }

    /// Moves a player into group `group_number` (1-based) on the published
    /// sheet
    pub fn move_player(&mut self, name: &str, group_number: usize) -> Result<String> {
        let published = self.published_mut()?;
        let name = move_player(&mut published.groups, name.trim(), group_number)?;
        self.rerender(
            SheetKind::Updated,
            format!("Moved {} to group {}", name, group_number),
        )
    }

    /// New week: participants, time preferences, slot overrides, the
    /// published sheet and weekly pairings go. Partner preferences,
    /// avoidances and the slot configuration stay.
    pub fn weekly_reset(&mut self) {
        self.state.roster.clear();
        self.state.slots.clear_overrides();
        self.state.published = None;
        self.state.constraints.clear_weekly_pairings();
        info!("Weekly reset complete");
    }
}

/// An [`Engine`] behind one async lock. Each call holds the lock for the
/// whole operation.
#[derive(Clone)]
pub struct SharedEngine {
    inner: Arc<Mutex<Engine>>,
}

impl SharedEngine {
    pub fn new(engine: Engine) -> Self {
        Self {
            inner: Arc::new(Mutex::new(engine)),
        }
    }

    /// Runs `op` with exclusive access to the engine
    pub async fn run<T>(&self, op: impl FnOnce(&mut Engine) -> T) -> T {
        let mut engine = self.inner.lock().await;
        op(&mut engine)
    }

    pub async fn snapshot(&self) -> EngineState {
        self.inner.lock().await.state().clone()
    }
}
