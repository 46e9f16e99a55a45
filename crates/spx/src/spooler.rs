//! 🧵 The Spool Tracker — one object at a time, in key order, never losing its place.
//!
//! 🎬 COLD OPEN — INT. A PROCESS THAT WILL BE KILLED IN FOUR MINUTES
//!
//! It does not know about the kill yet. It is halfway through `file2.log`, byte 4096.
//! The runtime has the cursor `file2.log::4096::7` written to disk. When the new process
//! comes up with that cursor, it looks up `file2.log`, asks for `bytes=4096-`, and carries on
//! as if nothing happened. Nothing is skipped. Nothing is delivered twice past the cursor.
//!
//! 🧠 Knowledge graph:
//! - The state lives in [`state::SpoolState`]; every change goes through [`state::transition`].
//! - One produce cycle = drain any owed post-processing, then find/open/read until the batch
//!   is full, the budget runs out, the object ends, or nothing is left.
//! - A cycle ENDS when an object is exhausted. Its post-processing runs at the start of the
//!   next cycle, i.e. only after the caller came back for more, i.e. only after the last
//!   batch of that object was taken.
//! - Listing and opening are bounded by the remaining budget (`tokio::time::timeout`).
//!   Record reads are not: a half-read line cannot be un-read. Post-processing is not either.
//! - An incoming cursor that does not match where we are = replay or restart → reposition.

use std::time::Duration;

use tokio::time::{Instant, timeout};
use tracing::{debug, error, info, trace, warn};

pub mod state;

use crate::common::Record;
use crate::cursor::{Cursor, Offset};
use crate::decoders::{DecoderBackend, ObjectReader, ReadError, ReadOutcome, empty_body};
use crate::error::{SpoolError, StoreOperation};
use crate::lister::ObjectLister;
use crate::location::ObjectHandle;
use crate::post_process::{PostProcessAction, PostProcessor};
use crate::producer::{DecodeErrorPolicy, DecodeFailure, ProduceOutcome};
use crate::stores::ObjectStore;
use state::{Effect, Event, ObjectOutcome, Position, SpoolState, transition};

/// 🔧 Everything the tracker needs that is not the store itself.
#[derive(Debug, Clone)]
pub struct TrackerSettings {
    pub lister: ObjectLister,
    pub on_success: PostProcessAction,
    pub on_error: PostProcessAction,
    pub decoder: DecoderBackend,
    pub max_line_length: usize,
    pub decode_policy: DecodeErrorPolicy,
}

#[derive(Debug)]
pub struct SpoolTracker {
    lister: ObjectLister,
    post_processor: PostProcessor,
    on_success: PostProcessAction,
    on_error: PostProcessAction,
    decoder: DecoderBackend,
    max_line_length: usize,
    decode_policy: DecodeErrorPolicy,
    state: SpoolState,
    reader: Option<ObjectReader>,
}

/// 🪜 What the cycle loop does next, decided from the current state.
enum Step {
    Drain,
    Find(Option<Position>),
    Read,
}

/// ⏱️ Time left before `deadline`, or `None` once it has passed.
fn remaining(deadline: Instant) -> Option<Duration> {
    deadline
        .checked_duration_since(Instant::now())
        .filter(|d| !d.is_zero())
}

impl SpoolTracker {
    pub fn new(settings: TrackerSettings) -> Self {
        Self {
            post_processor: PostProcessor::new(settings.lister.location().clone()),
            lister: settings.lister,
            on_success: settings.on_success,
            on_error: settings.on_error,
            decoder: settings.decoder,
            max_line_length: settings.max_line_length,
            decode_policy: settings.decode_policy,
            state: SpoolState::default(),
            reader: None,
        }
    }

    pub fn state(&self) -> &SpoolState {
        &self.state
    }

    /// 🚦 Feed one event through the state machine and handle the reader side of the effect.
    fn advance(&mut self, event: Event) -> Effect {
        match transition(&self.state, event) {
            Ok((the_next, the_effect)) => {
                trace!("🚦 {} → {}", self.state, the_next);
                self.state = the_next;
                if matches!(
                    the_effect,
                    Effect::CloseReader
                        | Effect::OpenReader { .. }
                        | Effect::EndCycle { close_reader: true }
                ) {
                    self.reader = None;
                }
                the_effect
            }
            Err(the_invalid) => {
                error!("💀 {the_invalid}; staying in {}", self.state);
                Effect::None
            }
        }
    }

    /// 🔄 One produce cycle. See the module docs for when it stops.
    pub async fn cycle<S: ObjectStore + ?Sized>(
        &mut self,
        store: &S,
        incoming: Option<&Cursor>,
        max_records: usize,
        budget: Duration,
    ) -> Result<ProduceOutcome, SpoolError> {
        let the_deadline = Instant::now() + budget;
        let the_incoming_position = incoming.map(Position::from);
        if self.state.position() != the_incoming_position {
            self.reposition(store, the_incoming_position).await;
        }

        let mut the_outcome = ProduceOutcome::default();
        let mut the_records: Vec<Record> = Vec::new();

        loop {
            let the_step = match &self.state {
                SpoolState::ObjectExhausted { .. } | SpoolState::Draining { .. } => Step::Drain,
                SpoolState::Idle { last } => Step::Find(last.clone()),
                SpoolState::Reading { .. } => Step::Read,
            };

            match the_step {
                Step::Drain => self.drain(store, &mut the_outcome).await?,

                Step::Find(the_last) => {
                    let Some(the_remaining) = remaining(the_deadline) else {
                        debug!("⏱️ budget spent before listing");
                        break;
                    };
                    let the_listing =
                        timeout(the_remaining, self.find_next(store, the_last.as_ref())).await;
                    let the_found = match the_listing {
                        Ok(the_found) => the_found?,
                        Err(_) => {
                            debug!("⏱️ budget ran out while listing; returning what we have");
                            break;
                        }
                    };
                    match the_found {
                        Some((the_object, the_offset)) => {
                            debug!(
                                "📂 next object '{}' ({} bytes) from byte {the_offset}",
                                the_object.key, the_object.size
                            );
                            self.advance(Event::Found {
                                object: the_object,
                                offset: the_offset,
                            });
                        }
                        None => {
                            trace!("💤 no eligible objects after {:?}", the_last);
                            self.advance(Event::NothingNew);
                            the_outcome.drained = true;
                            break;
                        }
                    }
                }

                Step::Read => {
                    if the_records.len() >= max_records {
                        break;
                    }
                    let Some(the_remaining) = remaining(the_deadline) else {
                        debug!("⏱️ budget spent mid-object at {}", self.state);
                        break;
                    };
                    if self.reader.is_none() {
                        let SpoolState::Reading { object, offset } = self.state.clone() else {
                            break;
                        };
                        let the_opened =
                            timeout(the_remaining, self.open(store, &object, offset)).await;
                        match the_opened {
                            Ok(the_reader) => self.reader = Some(the_reader?),
                            Err(_) => {
                                debug!("⏱️ budget ran out while opening '{}'", object.key);
                                break;
                            }
                        }
                    }
                    let Some(the_reader) = self.reader.as_mut() else {
                        break;
                    };

                    let the_read = the_reader.read_next().await;
                    match the_read {
                        Ok(ReadOutcome::Record {
                            record,
                            next_offset,
                        }) => {
                            the_records.push(record);
                            self.advance(Event::RecordRead { next_offset });
                        }
                        Ok(ReadOutcome::EndOfObject) => {
                            debug!("🏁 end of object at {}", self.state);
                            self.advance(Event::EndOfObject);
                            break;
                        }
                        Err(ReadError::Decode { offset, message }) => {
                            let the_key = self.reading_key();
                            match self.decode_policy {
                                DecodeErrorPolicy::RouteObject => {
                                    warn!(
                                        "⚠️ decode failure in '{the_key}' at byte {offset}: {message}. \
                                         Abandoning the object; it will go through the error action."
                                    );
                                    the_outcome.failures.push(DecodeFailure {
                                        key: the_key,
                                        offset,
                                        message,
                                    });
                                    self.advance(Event::DecodeFailed);
                                    break;
                                }
                                DecodeErrorPolicy::Abort => {
                                    self.reader = None;
                                    return Err(SpoolError::Decode {
                                        key: the_key,
                                        offset,
                                        message,
                                    });
                                }
                            }
                        }
                        Err(ReadError::Io(the_io_error)) => {
                            self.reader = None;
                            let the_key = self.reading_key();
                            return Err(SpoolError::store(
                                StoreOperation::Get,
                                &self.lister.location().bucket,
                                &the_key,
                                anyhow::Error::new(the_io_error),
                            ));
                        }
                    }
                }
            }
        }

        the_outcome.cursor = self.emit_cursor(incoming);
        the_outcome.records = the_records.into();
        Ok(the_outcome)
    }

    fn reading_key(&self) -> String {
        self.state
            .position()
            .map(|p| p.key)
            .unwrap_or_default()
    }

    /// 🏷️ Same position as the incoming cursor → same token. Moved → sequence + 1.
    fn emit_cursor(&self, incoming: Option<&Cursor>) -> Option<String> {
        let the_position = self.state.position()?;
        let the_cursor = match incoming {
            Some(the_incoming) if Position::from(the_incoming) == the_position => {
                the_incoming.clone()
            }
            Some(the_incoming) => {
                // -- 🧱 the sequence never goes backwards; at the ceiling it stays put
                let the_next = the_incoming.sequence.checked_add(1).unwrap_or_else(|| {
                    warn!(
                        "⚠️ cursor sequence for '{}' is at u64::MAX; it will not increase any further",
                        the_position.key
                    );
                    u64::MAX
                });
                the_position.to_cursor(the_next)
            }
            None => the_position.to_cursor(1),
        };
        Some(the_cursor.encode())
    }

    /// 🗑️ Pay the post-processing debt for the exhausted object.
    async fn drain<S: ObjectStore + ?Sized>(
        &mut self,
        store: &S,
        outcome: &mut ProduceOutcome,
    ) -> Result<(), SpoolError> {
        if matches!(self.state, SpoolState::Draining { .. }) {
            // -- 🔁 a previous drain never reported back; start it over
            self.advance(Event::PostProcessFailed);
        }
        let Effect::PostProcess {
            object,
            outcome: the_result,
        } = self.advance(Event::PostProcessStarted)
        else {
            return Ok(());
        };

        let the_action = match the_result {
            ObjectOutcome::Succeeded => &self.on_success,
            ObjectOutcome::Failed => &self.on_error,
        };
        debug!("🗑️ post-processing '{}' ({the_action})", object.key);

        let the_applied = self.post_processor.apply(store, &object, the_action).await;
        match the_applied {
            Ok(()) => {
                self.advance(Event::PostProcessFinished);
                outcome.post_processed.push(object.key);
                Ok(())
            }
            Err(the_error) => {
                error!(
                    "💀 post-processing failed for '{}'; it stays owed until a later cycle succeeds",
                    object.key
                );
                self.advance(Event::PostProcessFailed);
                Err(the_error)
            }
        }
    }

    /// 🔭 The object to read next and where to start in it.
    async fn find_next<S: ObjectStore + ?Sized>(
        &self,
        store: &S,
        last: Option<&Position>,
    ) -> Result<Option<(ObjectHandle, u64)>, SpoolError> {
        if let Some(Position {
            key,
            offset: Offset::At(the_offset),
        }) = last
        {
            if let Some(the_object) = self.lister.lookup(store, key).await? {
                return Ok(Some((the_object, *the_offset)));
            }
            warn!(
                "⚠️ cursor points into '{key}' at byte {the_offset} but the object is gone; \
                 continuing with the next key"
            );
        }
        let the_resume_after = last.map(|p| p.key.as_str());
        Ok(self
            .lister
            .next_after(store, the_resume_after)
            .await?
            .map(|the_object| (the_object, 0)))
    }

    async fn open<S: ObjectStore + ?Sized>(
        &self,
        store: &S,
        object: &ObjectHandle,
        offset: u64,
    ) -> Result<ObjectReader, SpoolError> {
        let the_bucket = &self.lister.location().bucket;
        let the_body = if offset >= object.size {
            // -- 🕳️ nothing left to read; a ranged GET past the end would just 416 at us
            empty_body()
        } else {
            store
                .get(the_bucket, &object.key, offset)
                .await
                .map_err(|e| SpoolError::store(StoreOperation::Get, the_bucket, &object.key, e))?
        };
        Ok(self
            .decoder
            .open(object, the_body, offset, self.max_line_length))
    }

    /// 🔄 Throw away the open reader and stand where the cursor says.
    async fn reposition<S: ObjectStore + ?Sized>(&mut self, store: &S, target: Option<Position>) {
        if let Some(the_owed) = self.state.pending_obligation() {
            warn!(
                "⚠️ cursor moved away from '{}' before its post-processing ran; the object is left in place",
                the_owed.key
            );
        }
        info!(
            "🔄 repositioning from {} to {}",
            self.state,
            target
                .as_ref()
                .map(|p| format!("{}::{}", p.key, p.offset))
                .unwrap_or_else(|| "start of stream".to_string())
        );

        if let Some(Position {
            key,
            offset: Offset::Sentinel,
        }) = &target
            && self.on_success != PostProcessAction::None
        {
            match self.lister.lookup(store, key).await {
                Ok(Some(_)) => warn!(
                    "⚠️ '{key}' was fully read by an earlier run but is still at the source; \
                     its post-processing was never recorded. Leaving it for operator intervention."
                ),
                Ok(None) => {}
                Err(the_error) => debug!("🔍 could not check whether '{key}' still exists: {the_error}"),
            }
        }

        self.advance(Event::Reposition(target));
    }
}
