// Summary statistics for state sequences.
//
// `SequenceSummary` describes an ingested sequence (how many states, how many
// notes per state). `PlagiarismSummary` measures how much of a generated
// sequence is copied verbatim from the training data: whenever two
// consecutive outputs are consecutive training positions, the generator
// reproduced a transition of the source. Long runs of such transitions mean
// long verbatim quotes.

use crate::state::State;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SequenceSummary {
    pub length: usize,
    pub max_notes: usize,
    pub mean_notes: f64,
    pub median_notes: f64,
}

impl SequenceSummary {
    pub fn of(states: &[State]) -> Self {
        let counts: Vec<usize> = states.iter().map(|s| s.notes().len()).collect();
        SequenceSummary {
            length: states.len(),
            max_notes: counts.iter().copied().max().unwrap_or(0),
            mean_notes: mean(&counts).unwrap_or(0.0),
            median_notes: median(&counts).unwrap_or(0.0),
        }
    }
}

impl fmt::Display for SequenceSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Sequence length: {}", self.length)?;
        writeln!(f, "Highest number of note events: {}", self.max_notes)?;
        writeln!(
            f,
            "Mean number of note events per state: {:.2}",
            self.mean_notes
        )?;
        write!(
            f,
            "Median number of note events per state: {:.2}",
            self.median_notes
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlagiarismSummary {
    /// Copied transitions divided by the sequence length.
    pub proportion: f64,
    /// Longest run of consecutive copied transitions.
    pub longest: usize,
    /// Mean length of the non-empty runs, if any.
    pub mean_run: Option<f64>,
    /// Median length of the non-empty runs, if any.
    pub median_run: Option<f64>,
}

impl PlagiarismSummary {
    /// Analyze a generated sequence. States without a position (never part
    /// of a model) break runs.
    pub fn of(states: &[State]) -> Self {
        let runs = copied_runs(states);
        let copied: usize = runs.iter().sum();
        PlagiarismSummary {
            proportion: if states.is_empty() {
                0.0
            } else {
                copied as f64 / states.len() as f64
            },
            longest: runs.iter().copied().max().unwrap_or(0),
            mean_run: mean(&runs),
            median_run: median(&runs),
        }
    }
}

impl fmt::Display for PlagiarismSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Plagiarism proportion: {:.2}%", self.proportion * 100.0)?;
        writeln!(f, "Longest plagiarism: {}", self.longest)?;
        match (self.mean_run, self.median_run) {
            (Some(mean), Some(median)) => {
                writeln!(f, "Mean plagiarism length: {mean:.2}")?;
                write!(f, "Median plagiarism length: {median:.2}")
            }
            _ => write!(f, "No copied transitions"),
        }
    }
}

/// Lengths of the maximal runs of copied transitions (all non-zero).
pub fn copied_runs(states: &[State]) -> Vec<usize> {
    let mut runs = Vec::new();
    let mut run = 0;
    for pair in states.windows(2) {
        let copied = matches!(
            (pair[0].position(), pair[1].position()),
            (Some(a), Some(b)) if b == a + 1
        );
        if copied {
            run += 1;
        } else if run > 0 {
            runs.push(run);
            run = 0;
        }
    }
    if run > 0 {
        runs.push(run);
    }
    runs
}

fn mean(values: &[usize]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<usize>() as f64 / values.len() as f64)
}

fn median(values: &[usize]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) as f64 / 2.0
    } else {
        sorted[mid] as f64
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Model;
    use crate::state::NoteEvent;

    /// Train a one-viewpoint model on `n` distinct states and return the
    /// stored states at the given positions.
    fn generated(n: usize, positions: &[usize]) -> Vec<State> {
        let training: Vec<State> = (0..n as i64).map(|i| State::new().with("v", i)).collect();
        let mut model = Model::new(["v"], 1).unwrap();
        model.ingest(&training, 1).unwrap();
        positions.iter().map(|&p| model.states()[p].clone()).collect()
    }

    #[test]
    fn runs_of_consecutive_positions() {
        // 3->4->5 is a run of 2, 8->9 a run of 1.
        let states = generated(12, &[0, 3, 4, 5, 1, 8, 9, 2]);
        assert_eq!(copied_runs(&states), vec![2, 1]);

        let summary = PlagiarismSummary::of(&states);
        assert_eq!(summary.longest, 2);
        assert!((summary.proportion - 3.0 / 8.0).abs() < 1e-12);
        assert_eq!(summary.mean_run, Some(1.5));
        assert_eq!(summary.median_run, Some(1.5));
    }

    #[test]
    fn trailing_run_is_counted() {
        let states = generated(6, &[5, 0, 1, 2]);
        assert_eq!(copied_runs(&states), vec![2]);
    }

    #[test]
    fn no_copies() {
        let states = generated(6, &[5, 4, 3, 2]);
        let summary = PlagiarismSummary::of(&states);
        assert_eq!(summary.proportion, 0.0);
        assert_eq!(summary.longest, 0);
        assert_eq!(summary.mean_run, None);
        assert!(summary.to_string().contains("No copied transitions"));
        assert_eq!(PlagiarismSummary::of(&[]).proportion, 0.0);
    }

    #[test]
    fn unpositioned_states_break_runs() {
        let states = vec![State::new(), State::new()];
        assert!(copied_runs(&states).is_empty());
    }

    #[test]
    fn sequence_summary_counts_notes() {
        let note = NoteEvent {
            pitch: 60,
            velocity: 64,
            start: 0.0,
            end: 1.0,
        };
        let mut states = vec![State::new(), State::new(), State::new()];
        states[0].push_note(note);
        for _ in 0..3 {
            states[1].push_note(note);
        }
        states[2].push_note(note);
        states[2].push_note(note);

        let summary = SequenceSummary::of(&states);
        assert_eq!(summary.length, 3);
        assert_eq!(summary.max_notes, 3);
        assert!((summary.mean_notes - 2.0).abs() < 1e-12);
        assert_eq!(summary.median_notes, 2.0);
        assert!(summary.to_string().starts_with("Sequence length: 3"));

        let empty = SequenceSummary::of(&[]);
        assert_eq!(empty.max_notes, 0);
    }
}
