//! Slide deck cursor: index, primary/commentary sub-phase and the pause flag.
//!
//! Autoplay ticks and manual input go through the same forward step, so the
//! primary -> commentary -> next-slide rule has exactly one implementation.
//! Out-of-range moves are clamped, never errors.

use std::collections::BTreeSet;

use shared::analytics::Namespace;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlideKind {
    Entry,
    Loading,
    Welcome,
    TimeSpent,
    FavoriteChampions,
    BestMatch,
    Leaderboard,
    PlayStyle,
    Outro,
}

impl SlideKind {
    pub const STANDARD_DECK: [SlideKind; 9] = [
        SlideKind::Entry,
        SlideKind::Loading,
        SlideKind::Welcome,
        SlideKind::TimeSpent,
        SlideKind::FavoriteChampions,
        SlideKind::BestMatch,
        SlideKind::Leaderboard,
        SlideKind::PlayStyle,
        SlideKind::Outro,
    ];

    pub fn has_commentary(self) -> bool {
        matches!(
            self,
            SlideKind::FavoriteChampions | SlideKind::BestMatch | SlideKind::PlayStyle
        )
    }

    /// Entry and loading slides sit outside autoplay and back-navigation.
    pub fn is_boundary(self) -> bool {
        matches!(self, SlideKind::Entry | SlideKind::Loading)
    }

    /// The analytics namespace whose presence decides if the slide shows data.
    pub fn namespace(self) -> Option<Namespace> {
        match self {
            SlideKind::TimeSpent => Some(Namespace::TimeSpent),
            SlideKind::FavoriteChampions => Some(Namespace::FavoriteChampions),
            SlideKind::BestMatch => Some(Namespace::BestMatch),
            SlideKind::Leaderboard => Some(Namespace::Leaderboard),
            SlideKind::PlayStyle => Some(Namespace::PlayStyle),
            SlideKind::Entry | SlideKind::Loading | SlideKind::Welcome | SlideKind::Outro => None,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            SlideKind::Entry => "Enter your Riot ID",
            SlideKind::Loading => "Preparing your rewind",
            SlideKind::Welcome => "Welcome to your season",
            SlideKind::TimeSpent => "Time on the Rift",
            SlideKind::FavoriteChampions => "Your favorite champions",
            SlideKind::BestMatch => "Your best match",
            SlideKind::Leaderboard => "Among your friends",
            SlideKind::PlayStyle => "Your play style",
            SlideKind::Outro => "See you next season",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubPhase {
    #[default]
    Primary,
    Commentary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SlideCursor {
    pub index: usize,
    pub sub_phase: SubPhase,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeckTransition {
    Unchanged,
    /// primary -> commentary on the same slide
    Revealed,
    /// commentary -> primary on the same slide
    Concealed,
    Moved { from: usize, to: usize },
}

impl DeckTransition {
    pub fn changed(self) -> bool {
        self != DeckTransition::Unchanged
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeckLayout {
    slide_count: usize,
    first_content: usize,
    commentary: BTreeSet<usize>,
    kinds: Vec<SlideKind>,
}

impl DeckLayout {
    pub fn new(slides: &[SlideKind]) -> Self {
        let first_content = slides
            .iter()
            .position(|kind| !kind.is_boundary())
            .unwrap_or(slides.len().saturating_sub(1));
        let commentary = slides
            .iter()
            .enumerate()
            .filter(|(_, kind)| kind.has_commentary())
            .map(|(index, _)| index)
            .collect();
        Self {
            slide_count: slides.len().max(1),
            first_content,
            commentary,
            kinds: slides.to_vec(),
        }
    }

    pub fn standard() -> Self {
        Self::new(&SlideKind::STANDARD_DECK)
    }

    /// A layout without slide kinds: `slide_count` slides, content from `first_content`.
    pub fn custom(
        slide_count: usize,
        first_content: usize,
        commentary: impl IntoIterator<Item = usize>,
    ) -> Self {
        let slide_count = slide_count.max(1);
        Self {
            slide_count,
            first_content: first_content.min(slide_count - 1),
            commentary: commentary
                .into_iter()
                .filter(|index| *index < slide_count)
                .collect(),
            kinds: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.slide_count
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn first_content(&self) -> usize {
        self.first_content
    }

    pub fn last_index(&self) -> usize {
        self.slide_count - 1
    }

    pub fn loading_index(&self) -> usize {
        self.first_content.saturating_sub(1)
    }

    pub fn has_commentary(&self, index: usize) -> bool {
        self.commentary.contains(&index)
    }

    pub fn is_boundary(&self, index: usize) -> bool {
        index < self.first_content
    }

    pub fn kind(&self, index: usize) -> Option<SlideKind> {
        self.kinds.get(index).copied()
    }
}

impl Default for DeckLayout {
    fn default() -> Self {
        Self::standard()
    }
}

#[derive(Debug, Clone)]
pub struct DeckController {
    layout: DeckLayout,
    cursor: SlideCursor,
    paused: bool,
}

impl DeckController {
    pub fn new(layout: DeckLayout) -> Self {
        Self {
            layout,
            cursor: SlideCursor::default(),
            paused: false,
        }
    }

    pub fn layout(&self) -> &DeckLayout {
        &self.layout
    }

    pub fn cursor(&self) -> SlideCursor {
        self.cursor
    }

    pub fn current_kind(&self) -> Option<SlideKind> {
        self.layout.kind(self.cursor.index)
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Returns whether the flag actually changed.
    pub fn set_paused(&mut self, paused: bool) -> bool {
        let changed = self.paused != paused;
        self.paused = paused;
        changed
    }

    pub fn toggle_pause(&mut self) -> bool {
        self.paused = !self.paused;
        self.paused
    }

    /// True on the final slide once nothing is left to reveal.
    pub fn at_end(&self) -> bool {
        let index = self.cursor.index;
        index == self.layout.last_index()
            && !(self.layout.has_commentary(index) && self.cursor.sub_phase == SubPhase::Primary)
    }

    pub fn autoplay_eligible(&self) -> bool {
        !self.paused && !self.layout.is_boundary(self.cursor.index) && !self.at_end()
    }

    pub fn autoplay_tick(&mut self) -> DeckTransition {
        if !self.autoplay_eligible() {
            return DeckTransition::Unchanged;
        }
        let transition = self.step_forward();
        debug!(?transition, index = self.cursor.index, "deck: autoplay tick");
        transition
    }

    pub fn advance(&mut self) -> DeckTransition {
        if self.layout.is_boundary(self.cursor.index) {
            return DeckTransition::Unchanged;
        }
        let transition = self.step_forward();
        debug!(?transition, index = self.cursor.index, "deck: advanced");
        transition
    }

    pub fn retreat(&mut self) -> DeckTransition {
        let transition = if self.cursor.sub_phase == SubPhase::Commentary {
            self.cursor.sub_phase = SubPhase::Primary;
            DeckTransition::Concealed
        } else if self.cursor.index > self.layout.first_content() {
            self.move_to(self.cursor.index - 1)
        } else {
            DeckTransition::Unchanged
        };
        debug!(?transition, index = self.cursor.index, "deck: retreated");
        transition
    }

    pub fn show_entry(&mut self) -> DeckTransition {
        self.move_to(0)
    }

    pub fn show_loading(&mut self) -> DeckTransition {
        self.move_to(self.layout.loading_index())
    }

    pub fn begin_content(&mut self) -> DeckTransition {
        self.move_to(self.layout.first_content())
    }

    /// Back to the entry slide, unpaused.
    pub fn reset(&mut self) {
        self.cursor = SlideCursor::default();
        self.paused = false;
    }

    fn step_forward(&mut self) -> DeckTransition {
        let index = self.cursor.index;
        if self.layout.has_commentary(index) && self.cursor.sub_phase == SubPhase::Primary {
            self.cursor.sub_phase = SubPhase::Commentary;
            DeckTransition::Revealed
        } else if index < self.layout.last_index() {
            self.move_to(index + 1)
        } else {
            DeckTransition::Unchanged
        }
    }

    fn move_to(&mut self, index: usize) -> DeckTransition {
        let index = index.min(self.layout.last_index());
        let from = self.cursor.index;
        if from == index && self.cursor.sub_phase == SubPhase::Primary {
            return DeckTransition::Unchanged;
        }
        self.cursor = SlideCursor {
            index,
            sub_phase: SubPhase::Primary,
        };
        if from == index {
            DeckTransition::Concealed
        } else {
            DeckTransition::Moved { from, to: index }
        }
    }
}

#[cfg(test)]
#[path = "tests/deck_tests.rs"]
mod tests;
