/*
 *  display/scroller.rs
 *
 *  crtmirror - now playing, on glass
 *  (c) 2020-26 Stuart Hunter
 *
 *  Horizontal sweep for labels too long to fit
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use std::time::Duration;

use log::debug;

use crate::display::label::Label;

/// Tick period of the sweep.
pub const SCROLL_TICK: Duration = Duration::from_millis(10);

/// Pixels moved per tick.
pub const SCROLL_STEP: f32 = 2.0;

/// Longest text shown statically.
pub const CHAR_LIMIT: usize = 31;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LabelId {
    Title,
    Artist,
}

/// Everything on screen, owned by the renderer.
#[derive(Debug, Clone)]
pub struct DisplayState {
    pub title: Label,
    pub artist: Label,
    pub artwork: Option<image::RgbImage>,
    /// Bumped by every render; stale scroll tickets compare against it.
    pub generation: u64,
}

impl DisplayState {
    pub fn new(title: Label, artist: Label) -> Self {
        DisplayState { title, artist, artwork: None, generation: 0 }
    }

    pub fn label(&self, id: LabelId) -> &Label {
        match id {
            LabelId::Title => &self.title,
            LabelId::Artist => &self.artist,
        }
    }

    pub fn label_mut(&mut self, id: LabelId) -> &mut Label {
        match id {
            LabelId::Title => &mut self.title,
            LabelId::Artist => &mut self.artist,
        }
    }
}

/// Overflowing text is padded and tripled so the sweep appears to wrap.
pub fn scroll_text(text: &str) -> String {
    format!("  {}  ", text).repeat(3)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Ticket {
    label: LabelId,
    generation: u64,
}

/// Per-label sweep state machine driven by a fixed tick.
///
/// A label is `Scrolling` while it holds a ticket and `Idle` otherwise. Tickets
/// carry the render generation they were issued under and are dropped once
/// that generation is no longer current.
#[derive(Debug, Default)]
pub struct ScrollAnimator {
    tickets: Vec<Ticket>,
}

impl ScrollAnimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start sweeping `label` under `generation`, replacing any earlier ticket.
    pub fn start(&mut self, label: LabelId, generation: u64) {
        self.tickets.retain(|t| t.label != label);
        self.tickets.push(Ticket { label, generation });
    }

    pub fn stop(&mut self, label: LabelId) {
        self.tickets.retain(|t| t.label != label);
    }

    pub fn is_scrolling(&self, label: LabelId) -> bool {
        self.tickets.iter().any(|t| t.label == label)
    }

    /// Advance every live sweep one step. Returns the labels that moved.
    pub fn tick(&mut self, state: &mut DisplayState) -> Vec<LabelId> {
        let mut moved = Vec::new();

        self.tickets.retain(|ticket| {
            if ticket.generation != state.generation {
                debug!("Dropping stale {:?} scroll from generation {}", ticket.label, ticket.generation);
                return false;
            }

            let label = state.label_mut(ticket.label);
            let width = label.width();
            let s = &mut label.state;
            s.x_offset -= SCROLL_STEP;
            if s.x_offset < s.base_x - width / 3.0 {
                s.x_offset = s.base_x;
            }
            moved.push(ticket.label);

            if label.char_count() > CHAR_LIMIT {
                true
            } else {
                label.reset();
                false
            }
        });

        moved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_graphics::mono_font::iso_8859_1::FONT_10X20;
    use embedded_graphics::prelude::Point;

    fn state_with(title: &str) -> DisplayState {
        let mut title_label = Label::new(Point::new(320, 384), &FONT_10X20);
        title_label.set_text(title);
        DisplayState::new(title_label, Label::new(Point::new(320, 432), &FONT_10X20))
    }

    #[test]
    fn test_scroll_text_pads_and_triples() {
        assert_eq!(scroll_text("ab"), "  ab    ab    ab  ");
        assert_eq!(scroll_text(&"x".repeat(32)).chars().count(), 108);
    }

    #[test]
    fn test_sweep_snaps_back_after_a_third() {
        let text = scroll_text(&"x".repeat(32));
        let mut state = state_with(&text);
        let mut animator = ScrollAnimator::new();
        animator.start(LabelId::Title, state.generation);

        // 108 chars * 10px = 1080px, a third is 360px, 2px a tick
        for _ in 0..180 {
            assert_eq!(animator.tick(&mut state), vec![LabelId::Title]);
        }
        assert_eq!(state.title.state.x_offset, 320.0 - 360.0);

        animator.tick(&mut state);
        assert_eq!(state.title.state.x_offset, 320.0);
        assert!(animator.is_scrolling(LabelId::Title));
    }

    #[test]
    fn test_short_text_stops_after_one_tick() {
        let mut state = state_with("short");
        let mut animator = ScrollAnimator::new();
        animator.start(LabelId::Title, 0);

        assert_eq!(animator.tick(&mut state), vec![LabelId::Title]);
        assert_eq!(state.title.state.x_offset, 320.0);
        assert!(!animator.is_scrolling(LabelId::Title));
    }

    #[test]
    fn test_stale_generation_is_dropped() {
        let mut state = state_with(&scroll_text(&"y".repeat(40)));
        let mut animator = ScrollAnimator::new();
        animator.start(LabelId::Title, state.generation);

        state.generation += 1;
        assert!(animator.tick(&mut state).is_empty());
        assert!(!animator.is_scrolling(LabelId::Title));
        assert_eq!(state.title.state.x_offset, 320.0);
    }
}
