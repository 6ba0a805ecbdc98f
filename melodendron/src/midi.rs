// MIDI in and out: turning a Standard MIDI File into states and back.
//
// Ingest: the requested tracks are merged by absolute tick and reduced to
// note on/off messages (a note-on with velocity 0 counts as a note-off; at
// the same tick, note-offs come first). The merged stream is cut into states:
// a state opens on a note-on that arrives when every note of the current
// state has ended, so overlapping notes always share a state. Times inside a
// state are in beats from the state's start, rounded to 6 decimals.
//
// - on_duration: when the last note of the state ended
// - total_duration: from this state's start to the next state's start
// - off_duration: total_duration - on_duration (0 for the final state)
//
// After segmentation an enrichment pass adds dynamic, density and the
// file-level time and key signatures (see viewpoint.rs).
//
// Output: states are laid end to end, each `total_duration` beats long, and
// written as SMF format 1 with a tempo track and one note track.
//
// Uses the `midly` crate for both directions. Only metrical timing (ticks per
// beat) is supported.

use crate::error::{Error, Result};
use crate::state::{NoteEvent, State, Value};
use crate::viewpoint::{
    self, DENSITY, DYNAMIC, KEY_SIGNATURE, OFF_DURATION, ON_DURATION, PITCHES, TIME_SIGNATURE,
    TOTAL_DURATION,
};
use midly::{
    Format, Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind,
    num::{u4, u7, u15, u24, u28},
};
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use tracing::{debug, info};

/// Tempo used when the source has none: 120 BPM.
pub const DEFAULT_TEMPO_MICROS: u32 = 500_000;

/// Ticks per beat used when writing states that did not come from a file.
pub const DEFAULT_TICKS_PER_BEAT: u16 = 480;

/// Major and minor key names indexed by number of sharps + 7.
const MAJOR_KEYS: [&str; 15] = [
    "Cb", "Gb", "Db", "Ab", "Eb", "Bb", "F", "C", "G", "D", "A", "E", "B", "F#", "C#",
];
const MINOR_KEYS: [&str; 15] = [
    "Ab", "Eb", "Bb", "F", "C", "G", "D", "A", "E", "B", "F#", "C#", "G#", "D#", "A#",
];

/// A note on or off at an absolute tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteMessage {
    pub tick: u64,
    pub pitch: u8,
    pub velocity: u8,
    pub on: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackInfo {
    pub name: Option<String>,
    pub events: usize,
}

/// File-level facts gathered while parsing.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceInfo {
    pub ticks_per_beat: u16,
    /// First tempo found, in microseconds per beat.
    pub tempo_micros: Option<u32>,
    /// (numerator, denominator); 4/4 if the file has none.
    pub time_signature: (u8, u8),
    pub key_signature: Option<String>,
    pub tracks: Vec<TrackInfo>,
}

impl SourceInfo {
    pub fn tempo_bpm(&self) -> Option<f64> {
        self.tempo_micros.map(|us| 60_000_000.0 / us as f64)
    }
}

impl fmt::Display for SourceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tempo = match self.tempo_bpm() {
            Some(bpm) => format!("{bpm:.1} BPM"),
            None => "no tempo".to_string(),
        };
        write!(
            f,
            "{}/{}, {}, key {}, {} TPB",
            self.time_signature.0,
            self.time_signature.1,
            tempo,
            self.key_signature.as_deref().unwrap_or("none"),
            self.ticks_per_beat
        )?;
        for (i, track) in self.tracks.iter().enumerate() {
            write!(
                f,
                "\n  Track {}: {} ({} messages)",
                i,
                track.name.as_deref().unwrap_or("unnamed"),
                track.events
            )?;
        }
        Ok(())
    }
}

/// A parsed MIDI file, reduced to what ingestion needs.
#[derive(Debug, Clone)]
pub struct MidiSource {
    info: SourceInfo,
    tracks: Vec<Vec<NoteMessage>>,
}

impl MidiSource {
    /// Read and parse a MIDI file.
    pub fn open(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::parse(&bytes)
    }

    /// Parse an in-memory Standard MIDI File.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let smf = Smf::parse(bytes)?;
        let ticks_per_beat = match smf.header.timing {
            Timing::Metrical(tpb) if tpb.as_int() > 0 => tpb.as_int(),
            _ => return Err(Error::UnsupportedTiming),
        };

        let mut info = SourceInfo {
            ticks_per_beat,
            tempo_micros: None,
            time_signature: (4, 4),
            key_signature: None,
            tracks: Vec::with_capacity(smf.tracks.len()),
        };
        let mut time_signature = None;
        let mut tracks = Vec::with_capacity(smf.tracks.len());

        for track in &smf.tracks {
            let mut name = None;
            let mut notes = Vec::new();
            let mut tick: u64 = 0;
            for event in track {
                tick += event.delta.as_int() as u64;
                match event.kind {
                    TrackEventKind::Midi { message, .. } => {
                        if let Some(note) = note_message(tick, message) {
                            notes.push(note);
                        }
                    }
                    TrackEventKind::Meta(MetaMessage::TrackName(bytes)) if name.is_none() => {
                        name = Some(String::from_utf8_lossy(bytes).into_owned());
                    }
                    TrackEventKind::Meta(MetaMessage::Tempo(us)) if info.tempo_micros.is_none() => {
                        info.tempo_micros = Some(us.as_int());
                    }
                    TrackEventKind::Meta(MetaMessage::TimeSignature(numerator, pow, _, _))
                        if time_signature.is_none() =>
                    {
                        let denominator = 1u8.checked_shl(pow as u32).unwrap_or(0);
                        time_signature = Some((numerator, denominator));
                    }
                    TrackEventKind::Meta(MetaMessage::KeySignature(sharps, minor))
                        if info.key_signature.is_none() =>
                    {
                        info.key_signature = key_name(sharps, minor);
                    }
                    _ => {}
                }
            }
            info.tracks.push(TrackInfo {
                name,
                events: track.len(),
            });
            tracks.push(notes);
        }
        if let Some(ts) = time_signature {
            info.time_signature = ts;
        }

        debug!(tracks = tracks.len(), ticks_per_beat, "parsed MIDI file");
        Ok(MidiSource { info, tracks })
    }

    pub fn info(&self) -> &SourceInfo {
        &self.info
    }

    /// Merge the given tracks and cut them into enriched states.
    ///
    /// An empty `tracks` slice means every track.
    pub fn states(&self, tracks: &[usize]) -> Result<Vec<State>> {
        let selected: Vec<usize> = if tracks.is_empty() {
            (0..self.tracks.len()).collect()
        } else {
            tracks.to_vec()
        };
        let mut merged = Vec::new();
        for &index in &selected {
            let track = self.tracks.get(index).ok_or(Error::TrackOutOfRange {
                index,
                count: self.tracks.len(),
            })?;
            merged.extend_from_slice(track);
        }
        // Stable: same-tick messages keep their track order, offs first.
        merged.sort_by_key(|m| (m.tick, m.on));

        let mut states = segment(&merged, self.info.ticks_per_beat);
        enrich(&mut states, &self.info);
        info!(tracks = ?selected, states = states.len(), "built states from MIDI");
        Ok(states)
    }
}

fn note_message(tick: u64, message: MidiMessage) -> Option<NoteMessage> {
    match message {
        MidiMessage::NoteOn { key, vel } => Some(NoteMessage {
            tick,
            pitch: key.as_int(),
            velocity: vel.as_int(),
            on: vel.as_int() > 0,
        }),
        MidiMessage::NoteOff { key, .. } => Some(NoteMessage {
            tick,
            pitch: key.as_int(),
            velocity: 0,
            on: false,
        }),
        _ => None,
    }
}

fn key_name(sharps: i8, minor: bool) -> Option<String> {
    let index = usize::try_from(sharps as i16 + 7).ok()?;
    let table = if minor { &MINOR_KEYS } else { &MAJOR_KEYS };
    table.get(index).map(|k| if minor { format!("{k}m") } else { k.to_string() })
}

fn beats(ticks: u64, ticks_per_beat: u16) -> f64 {
    round6(ticks as f64 / ticks_per_beat as f64)
}

fn round6(x: f64) -> f64 {
    (x * 1e6).round() / 1e6
}

/// A state under construction, in absolute ticks.
struct OpenState {
    start: u64,
    notes: Vec<OpenNote>,
}

struct OpenNote {
    pitch: u8,
    velocity: u8,
    start: u64,
    end: Option<u64>,
}

impl OpenState {
    fn all_ended(&self) -> bool {
        self.notes.iter().all(|n| n.end.is_some())
    }

    /// Close any sounding notes at `tick`.
    fn release(&mut self, tick: u64) {
        for note in &mut self.notes {
            note.end.get_or_insert(tick);
        }
    }

    /// Finish the state; `next_start` is where the following state begins.
    fn finish(self, next_start: Option<u64>, ticks_per_beat: u16) -> State {
        let on_end = self
            .notes
            .iter()
            .map(|n| n.end.unwrap_or(n.start))
            .max()
            .unwrap_or(self.start);
        let on = beats(on_end - self.start, ticks_per_beat);
        let total = match next_start {
            Some(next) => beats(next - self.start, ticks_per_beat),
            None => on,
        };

        let mut state = State::new();
        let mut pitches = BTreeSet::new();
        for note in &self.notes {
            pitches.insert(note.pitch as i64);
            state.push_note(NoteEvent {
                pitch: note.pitch,
                velocity: note.velocity,
                start: beats(note.start - self.start, ticks_per_beat),
                end: beats(note.end.unwrap_or(note.start) - self.start, ticks_per_beat),
            });
        }
        state.set(PITCHES, Value::Set(pitches));
        state.set(ON_DURATION, on);
        state.set(OFF_DURATION, round6(total - on));
        state.set(TOTAL_DURATION, total);
        state
    }
}

/// Cut a time-ordered note stream into states with the core viewpoints.
pub fn segment(messages: &[NoteMessage], ticks_per_beat: u16) -> Vec<State> {
    let mut states = Vec::new();
    let mut current: Option<OpenState> = None;

    for message in messages {
        if message.on {
            if let Some(open) = current.take_if(|open| open.all_ended()) {
                states.push(open.finish(Some(message.tick), ticks_per_beat));
            }
            current
                .get_or_insert_with(|| OpenState {
                    start: message.tick,
                    notes: Vec::new(),
                })
                .notes
                .push(OpenNote {
                    pitch: message.pitch,
                    velocity: message.velocity,
                    start: message.tick,
                    end: None,
                });
        } else if let Some(open) = current.as_mut() {
            // Unmatched note-offs are dropped.
            if let Some(note) = open
                .notes
                .iter_mut()
                .find(|n| n.pitch == message.pitch && n.end.is_none())
            {
                note.end = Some(message.tick);
            }
        }
    }

    if let Some(mut open) = current {
        let last_tick = messages.last().map_or(open.start, |m| m.tick);
        open.release(last_tick);
        states.push(open.finish(None, ticks_per_beat));
    }
    states
}

/// Add the derived and file-level viewpoints to freshly segmented states.
pub fn enrich(states: &mut [State], info: &SourceInfo) {
    viewpoint::add_derived(states, DYNAMIC, viewpoint::dynamic);
    viewpoint::add_derived(states, DENSITY, viewpoint::density);
    let (numerator, denominator) = info.time_signature;
    let meter = Value::Text(format!("{numerator}/{denominator}"));
    viewpoint::add_constant(states, TIME_SIGNATURE, &meter);
    let key = info.key_signature.clone().unwrap_or_else(|| "none".to_string());
    viewpoint::add_constant(states, KEY_SIGNATURE, &Value::Text(key));
}

fn to_ticks(beats: f64, ticks_per_beat: u16) -> u64 {
    (beats.max(0.0) * ticks_per_beat as f64).round() as u64
}

/// Lay states end to end as an in-memory SMF.
///
/// Fails if a pitch, velocity, tempo, ticks-per-beat value or event gap
/// does not fit its MIDI field.
pub fn states_to_smf(
    states: &[State],
    ticks_per_beat: u16,
    tempo_micros: u32,
) -> Result<Smf<'static>> {
    let tpb = u15::try_from(ticks_per_beat)
        .filter(|t| t.as_int() > 0)
        .ok_or(Error::MidiRange {
            field: "ticks per beat",
            value: ticks_per_beat as u64,
        })?;
    let tempo = u24::try_from(tempo_micros).ok_or(Error::MidiRange {
        field: "tempo",
        value: tempo_micros as u64,
    })?;
    let mut smf = Smf::new(Header::new(Format::Parallel, Timing::Metrical(tpb)));

    let tempo_track: Track<'static> = vec![
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::Tempo(tempo)),
        },
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        },
    ];
    smf.tracks.push(tempo_track);

    // (absolute tick, message), each state's notes as on/off pairs.
    let mut timeline: Vec<(u64, MidiMessage)> = Vec::new();
    let mut cursor: u64 = 0;
    for state in states {
        let mut events: Vec<(u64, MidiMessage)> = Vec::with_capacity(state.notes().len() * 2);
        for note in state.notes() {
            let key = seven_bit("pitch", note.pitch)?;
            let vel = seven_bit("velocity", note.velocity.max(1))?;
            events.push((
                cursor + to_ticks(note.start, ticks_per_beat),
                MidiMessage::NoteOn { key, vel },
            ));
            events.push((
                cursor + to_ticks(note.end, ticks_per_beat),
                MidiMessage::NoteOff {
                    key,
                    vel: u7::new(0),
                },
            ));
        }
        events.sort_by_key(|(tick, _)| *tick);
        timeline.extend(events);

        let total = state
            .number(TOTAL_DURATION)
            .or_else(|| state.notes().iter().map(|n| n.end).reduce(f64::max))
            .unwrap_or(0.0);
        cursor += to_ticks(total, ticks_per_beat);
    }
    // A state whose notes outlast its total duration may overlap the next.
    timeline.sort_by_key(|(tick, _)| *tick);

    let mut track: Track<'static> = vec![TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::TrackName(b"melodendron")),
    }];
    let mut last_tick: u64 = 0;
    for (tick, message) in timeline {
        let gap = tick - last_tick;
        let delta = u32::try_from(gap)
            .ok()
            .and_then(u28::try_from)
            .ok_or(Error::MidiRange {
                field: "event gap",
                value: gap,
            })?;
        track.push(TrackEvent {
            delta,
            kind: TrackEventKind::Midi {
                channel: u4::new(0),
                message,
            },
        });
        last_tick = tick;
    }
    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
    smf.tracks.push(track);

    debug!(states = states.len(), ticks = cursor, "serialized states");
    Ok(smf)
}

fn seven_bit(field: &'static str, value: u8) -> Result<u7> {
    u7::try_from(value).ok_or(Error::MidiRange {
        field,
        value: value as u64,
    })
}

/// Encode states as Standard MIDI File bytes.
pub fn to_bytes(states: &[State], ticks_per_beat: u16, tempo_micros: u32) -> Result<Vec<u8>> {
    let smf = states_to_smf(states, ticks_per_beat, tempo_micros)?;
    let mut buf = Vec::new();
    smf.write_std(&mut buf)?;
    Ok(buf)
}

/// Write states to a MIDI file.
pub fn write_midi(
    states: &[State],
    ticks_per_beat: u16,
    tempo_micros: u32,
    path: &Path,
) -> Result<()> {
    let buf = to_bytes(states, ticks_per_beat, tempo_micros)?;
    std::fs::write(path, &buf)?;
    Ok(())
}
