//! 🚦 The spool state machine, as a value.
//!
//! ```text
//!            Found                 EndOfObject / DecodeFailed
//!   Idle ───────────▶ Reading ─────────────────────────────▶ ObjectExhausted
//!    ▲ │ NothingNew     │ ▲ RecordRead                            │ PostProcessStarted
//!    │ └──┐             └─┘                                       ▼
//!    │    ▼                           PostProcessFailed ◀──── Draining
//!    └──────────────────────────────────────────────────────────┘ PostProcessFinished
//! ```
//!
//! `transition` is pure: current state + event in, next state + effect out. The driver in
//! [`super`] runs the effect (open a reader, run post-processing, end the cycle). Nothing in
//! here touches a store, which is the whole point: every edge is unit tested below with
//! plain values.
//!
//! `Reposition` is valid from anywhere. It is how a replayed or restarted cursor takes over.

use std::fmt;

use thiserror::Error;

use crate::cursor::{Cursor, Offset};
use crate::location::ObjectHandle;

/// 📍 A cursor without its sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    pub key: String,
    pub offset: Offset,
}

impl Position {
    pub fn new(key: impl Into<String>, offset: Offset) -> Self {
        Self {
            key: key.into(),
            offset,
        }
    }

    pub fn to_cursor(&self, sequence: u64) -> Cursor {
        Cursor::new(self.key.clone(), self.offset, sequence)
    }
}

impl From<&Cursor> for Position {
    fn from(cursor: &Cursor) -> Self {
        Self::new(cursor.key.clone(), cursor.offset)
    }
}

/// ✅/💀 How reading the object ended. Picks the post-processing action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectOutcome {
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpoolState {
    /// 💤 No object open. `last` is where the next listing resumes from.
    Idle { last: Option<Position> },
    /// 📖 Consuming `object`; `offset` is the byte of the next unread record.
    Reading { object: ObjectHandle, offset: u64 },
    /// 🏁 Fully read (or abandoned). Post-processing owed, deferred to the next cycle.
    ObjectExhausted {
        object: ObjectHandle,
        outcome: ObjectOutcome,
    },
    /// 🗑️ Post-processing in flight.
    Draining {
        object: ObjectHandle,
        outcome: ObjectOutcome,
    },
}

impl Default for SpoolState {
    fn default() -> Self {
        Self::Idle { last: None }
    }
}

impl SpoolState {
    /// 📍 The position this state reports to the outside world.
    pub fn position(&self) -> Option<Position> {
        match self {
            Self::Idle { last } => last.clone(),
            Self::Reading { object, offset } => {
                Some(Position::new(object.key.clone(), Offset::At(*offset)))
            }
            Self::ObjectExhausted { object, .. } | Self::Draining { object, .. } => {
                Some(Position::new(object.key.clone(), Offset::Sentinel))
            }
        }
    }

    /// 🧾 The object whose post-processing has not happened yet, if any.
    pub fn pending_obligation(&self) -> Option<&ObjectHandle> {
        match self {
            Self::ObjectExhausted { object, .. } | Self::Draining { object, .. } => Some(object),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Idle { .. } => "Idle",
            Self::Reading { .. } => "Reading",
            Self::ObjectExhausted { .. } => "ObjectExhausted",
            Self::Draining { .. } => "Draining",
        }
    }
}

impl fmt::Display for SpoolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.position() {
            Some(the_position) => write!(
                f,
                "{} at {}::{}",
                self.name(),
                the_position.key,
                the_position.offset
            ),
            None => write!(f, "{} at start of stream", self.name()),
        }
    }
}

/// 📨 Things that happen to the tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Found { object: ObjectHandle, offset: u64 },
    NothingNew,
    RecordRead { next_offset: u64 },
    EndOfObject,
    DecodeFailed,
    PostProcessStarted,
    PostProcessFinished,
    PostProcessFailed,
    Reposition(Option<Position>),
}

impl Event {
    fn name(&self) -> &'static str {
        match self {
            Self::Found { .. } => "Found",
            Self::NothingNew => "NothingNew",
            Self::RecordRead { .. } => "RecordRead",
            Self::EndOfObject => "EndOfObject",
            Self::DecodeFailed => "DecodeFailed",
            Self::PostProcessStarted => "PostProcessStarted",
            Self::PostProcessFinished => "PostProcessFinished",
            Self::PostProcessFailed => "PostProcessFailed",
            Self::Reposition(_) => "Reposition",
        }
    }
}

/// 🎬 What the driver must do after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    None,
    OpenReader { object: ObjectHandle, offset: u64 },
    CloseReader,
    PostProcess {
        object: ObjectHandle,
        outcome: ObjectOutcome,
    },
    EndCycle { close_reader: bool },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("🚦 no transition from {state} on {event}")]
pub struct InvalidTransition {
    pub state: &'static str,
    pub event: &'static str,
}

/// 🚦 The whole state machine.
pub fn transition(
    state: &SpoolState,
    event: Event,
) -> Result<(SpoolState, Effect), InvalidTransition> {
    use SpoolState::*;

    let the_invalid = InvalidTransition {
        state: state.name(),
        event: event.name(),
    };

    match (state, event) {
        (_, Event::Reposition(last)) => Ok((Idle { last }, Effect::CloseReader)),

        (Idle { .. }, Event::Found { object, offset }) => Ok((
            Reading {
                object: object.clone(),
                offset,
            },
            Effect::OpenReader { object, offset },
        )),
        (Idle { .. }, Event::NothingNew) => {
            Ok((state.clone(), Effect::EndCycle { close_reader: false }))
        }

        (Reading { object, .. }, Event::RecordRead { next_offset }) => Ok((
            Reading {
                object: object.clone(),
                offset: next_offset,
            },
            Effect::None,
        )),
        (Reading { object, .. }, Event::EndOfObject) => Ok((
            ObjectExhausted {
                object: object.clone(),
                outcome: ObjectOutcome::Succeeded,
            },
            Effect::EndCycle { close_reader: true },
        )),
        (Reading { object, .. }, Event::DecodeFailed) => Ok((
            ObjectExhausted {
                object: object.clone(),
                outcome: ObjectOutcome::Failed,
            },
            Effect::EndCycle { close_reader: true },
        )),

        (ObjectExhausted { object, outcome }, Event::PostProcessStarted) => Ok((
            Draining {
                object: object.clone(),
                outcome: *outcome,
            },
            Effect::PostProcess {
                object: object.clone(),
                outcome: *outcome,
            },
        )),

        (Draining { object, .. }, Event::PostProcessFinished) => Ok((
            Idle {
                last: Some(Position::new(object.key.clone(), Offset::Sentinel)),
            },
            Effect::None,
        )),
        (Draining { object, outcome }, Event::PostProcessFailed) => Ok((
            ObjectExhausted {
                object: object.clone(),
                outcome: *outcome,
            },
            Effect::EndCycle {
                close_reader: false,
            },
        )),

        _ => Err(the_invalid),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(key: &str) -> ObjectHandle {
        ObjectHandle::new(key, 12)
    }

    fn step(state: SpoolState, event: Event) -> (SpoolState, Effect) {
        transition(&state, event).expect("💀 transition should be valid in this test")
    }

    #[test]
    fn the_one_where_an_object_goes_all_the_way_round() {
        let (the_state, the_effect) = step(
            SpoolState::default(),
            Event::Found {
                object: file("file1.log"),
                offset: 0,
            },
        );
        assert_eq!(
            the_effect,
            Effect::OpenReader {
                object: file("file1.log"),
                offset: 0
            }
        );
        assert_eq!(
            the_state.position(),
            Some(Position::new("file1.log", Offset::At(0)))
        );

        let (the_state, the_effect) = step(the_state, Event::RecordRead { next_offset: 12 });
        assert_eq!(the_effect, Effect::None);
        assert_eq!(
            the_state.position(),
            Some(Position::new("file1.log", Offset::At(12)))
        );

        let (the_state, the_effect) = step(the_state, Event::EndOfObject);
        assert_eq!(the_effect, Effect::EndCycle { close_reader: true });
        assert_eq!(
            the_state.position(),
            Some(Position::new("file1.log", Offset::Sentinel))
        );
        assert_eq!(the_state.pending_obligation(), Some(&file("file1.log")));

        let (the_state, the_effect) = step(the_state, Event::PostProcessStarted);
        assert_eq!(
            the_effect,
            Effect::PostProcess {
                object: file("file1.log"),
                outcome: ObjectOutcome::Succeeded
            }
        );

        let (the_state, _) = step(the_state, Event::PostProcessFinished);
        assert_eq!(
            the_state,
            SpoolState::Idle {
                last: Some(Position::new("file1.log", Offset::Sentinel))
            }
        );
        assert!(the_state.pending_obligation().is_none());
    }

    #[test]
    fn the_one_where_a_decode_failure_still_owes_post_processing() {
        let the_reading = SpoolState::Reading {
            object: file("bad.log"),
            offset: 5,
        };
        let (the_state, _) = step(the_reading, Event::DecodeFailed);
        let (_, the_effect) = step(the_state, Event::PostProcessStarted);
        assert_eq!(
            the_effect,
            Effect::PostProcess {
                object: file("bad.log"),
                outcome: ObjectOutcome::Failed
            }
        );
    }

    #[test]
    fn the_one_where_a_failed_post_process_keeps_the_obligation() {
        let the_draining = SpoolState::Draining {
            object: file("file1.log"),
            outcome: ObjectOutcome::Succeeded,
        };
        let (the_state, the_effect) = step(the_draining, Event::PostProcessFailed);
        assert_eq!(the_effect, Effect::EndCycle { close_reader: false });
        assert_eq!(the_state.pending_obligation(), Some(&file("file1.log")));
    }

    #[test]
    fn the_one_where_nothing_new_changes_nothing() {
        let the_idle = SpoolState::Idle {
            last: Some(Position::new("file3.log", Offset::Sentinel)),
        };
        let (the_state, the_effect) = step(the_idle.clone(), Event::NothingNew);
        assert_eq!(the_state, the_idle);
        assert_eq!(the_effect, Effect::EndCycle { close_reader: false });
    }

    #[test]
    fn the_one_where_reposition_works_from_anywhere() {
        let the_target = Some(Position::new("file1.log", Offset::At(6)));
        for the_state in [
            SpoolState::default(),
            SpoolState::Reading {
                object: file("file2.log"),
                offset: 3,
            },
            SpoolState::ObjectExhausted {
                object: file("file2.log"),
                outcome: ObjectOutcome::Succeeded,
            },
        ] {
            let (the_next, the_effect) = step(the_state, Event::Reposition(the_target.clone()));
            assert_eq!(the_next.position(), the_target);
            assert_eq!(the_effect, Effect::CloseReader);
        }
    }

    #[test]
    fn the_one_where_nonsense_is_refused() {
        let the_error = transition(&SpoolState::default(), Event::EndOfObject).unwrap_err();
        assert_eq!(the_error.state, "Idle");
        assert_eq!(the_error.event, "EndOfObject");
        assert!(
            transition(
                &SpoolState::Reading {
                    object: file("a"),
                    offset: 0
                },
                Event::PostProcessStarted
            )
            .is_err()
        );
    }

    #[test]
    fn the_one_where_the_state_introduces_itself() {
        assert_eq!(SpoolState::default().to_string(), "Idle at start of stream");
        let the_exhausted = SpoolState::ObjectExhausted {
            object: file("file1.log"),
            outcome: ObjectOutcome::Succeeded,
        };
        assert_eq!(the_exhausted.to_string(), "ObjectExhausted at file1.log::-1");
    }
}
