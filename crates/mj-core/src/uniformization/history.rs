//! Realized CTMC paths.

use std::fmt;
use std::fmt::Write as _;

use serde::Serialize;

use crate::error::{check_len, check_state, MarkovError, Result};

/// The chain entered `state` at `time`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StateChange {
    pub time: f64,
    pub state: usize,
}

/// Piecewise-constant path on `[start_time, end_time]`.
///
/// Open until [`finalize`](Self::finalize) appends the ending event; all
/// path statistics require a finalized history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateHistory {
    dim: usize,
    /// First entry is the start, last the end once finalized.
    events: Vec<StateChange>,
    finalized: bool,
}

impl StateHistory {
    pub fn new(start_time: f64, start_state: usize, dim: usize) -> Result<Self> {
        check_state(start_state, dim)?;
        Ok(Self {
            dim,
            events: vec![StateChange {
                time: start_time,
                state: start_state,
            }],
            finalized: false,
        })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn start_time(&self) -> f64 {
        self.events[0].time
    }

    pub fn start_state(&self) -> usize {
        self.events[0].state
    }

    pub fn end_time(&self) -> Option<f64> {
        self.finalized.then(|| self.last().time)
    }

    /// State after the latest recorded event.
    pub fn current_state(&self) -> usize {
        self.last().state
    }

    fn last(&self) -> &StateChange {
        &self.events[self.events.len() - 1]
    }

    fn check_open(&self, time: f64) -> Result<()> {
        if self.finalized {
            return Err(MarkovError::HistoryFinalized);
        }
        let previous = self.last().time;
        if !(time >= previous) {
            return Err(MarkovError::ChangeOutOfOrder { time, previous });
        }
        Ok(())
    }

    /// Records a jump to `state` at `time`. Entering the current state is
    /// not a jump and records nothing.
    pub fn add_change(&mut self, time: f64, state: usize) -> Result<()> {
        self.check_open(time)?;
        check_state(state, self.dim)?;
        if state != self.current_state() {
            self.events.push(StateChange { time, state });
        }
        Ok(())
    }

    /// Closes the path at `end_time` in the current state.
    pub fn finalize(&mut self, end_time: f64) -> Result<()> {
        self.check_open(end_time)?;
        let state = self.current_state();
        self.events.push(StateChange {
            time: end_time,
            state,
        });
        self.finalized = true;
        Ok(())
    }

    fn require_finalized(&self) -> Result<()> {
        if self.finalized {
            Ok(())
        } else {
            Err(MarkovError::HistoryOpen)
        }
    }

    /// Recorded jumps, start and end events excluded.
    pub fn changes(&self) -> &[StateChange] {
        let end = if self.finalized {
            self.events.len() - 1
        } else {
            self.events.len()
        };
        &self.events[1..end]
    }

    /// `(from, to, time)` for each jump.
    pub fn jumps(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        let end = self.events.len() - usize::from(self.finalized);
        self.events[..end]
            .windows(2)
            .map(|w| (w[0].state, w[1].state, w[1].time))
    }

    pub fn number_of_jumps(&self) -> Result<usize> {
        self.require_finalized()?;
        Ok(self.changes().len())
    }

    pub fn jumps_between(&self, from: usize, to: usize) -> Result<usize> {
        self.require_finalized()?;
        check_state(from, self.dim)?;
        check_state(to, self.dim)?;
        Ok(self
            .jumps()
            .filter(|&(f, t, _)| f == from && t == to)
            .count())
    }

    /// Adds jump counts (`dim x dim`) and per-state waiting times (`dim`)
    /// into the caller's accumulators.
    pub fn accumulate_sufficient_statistics(
        &self,
        counts: &mut [f64],
        waiting_times: &mut [f64],
    ) -> Result<()> {
        self.require_finalized()?;
        check_len("jump counts", self.dim * self.dim, counts.len())?;
        check_len("waiting times", self.dim, waiting_times.len())?;
        for (from, to, _) in self.jumps() {
            counts[from * self.dim + to] += 1.0;
        }
        for w in self.events.windows(2) {
            waiting_times[w[0].state] += w[1].time - w[0].time;
        }
        Ok(())
    }

    /// `Σ_s waiting(s) · rewards[s]`.
    pub fn total_reward(&self, rewards: &[f64]) -> Result<f64> {
        self.require_finalized()?;
        check_len("reward rates", self.dim, rewards.len())?;
        Ok(self
            .events
            .windows(2)
            .map(|w| (w[1].time - w[0].time) * rewards[w[0].state])
            .sum())
    }

    /// Sum of `register[from, to]` over the recorded jumps.
    pub fn total_registered_jumps(&self, register: &[f64]) -> Result<f64> {
        self.require_finalized()?;
        check_len("registration", self.dim * self.dim, register.len())?;
        Ok(self
            .jumps()
            .map(|(from, to, _)| register[from * self.dim + to])
            .sum())
    }

    /// Compact tree annotation `{{site,time,from,to},...}`; `{}` with no jumps.
    pub fn annotation(&self, site: usize) -> Result<String> {
        self.require_finalized()?;
        let mut out = String::from("{");
        for (i, (from, to, time)) in self.jumps().enumerate() {
            if i > 0 {
                out.push(',');
            }
            let _ = write!(out, "{{{site},{time},{from},{to}}}");
        }
        out.push('}');
        Ok(out)
    }
}

impl fmt::Display for StateHistory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let start = &self.events[0];
        write!(f, "[{}@{}", start.state, start.time)?;
        for change in self.changes() {
            write!(f, " -> {}@{}", change.state, change.time)?;
        }
        match self.end_time() {
            Some(end) => write!(f, " | end {}]", end),
            None => write!(f, " ...]"),
        }
    }
}
