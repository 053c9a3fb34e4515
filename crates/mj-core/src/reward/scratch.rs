//! Per-thread working arrays for batched series evaluation.
//!
//! Read-only evaluation takes `&self`, so query-sized buffers cannot live in
//! the engine. Each worker thread keeps one set and grows it on demand.

use std::cell::RefCell;

#[derive(Debug, Default)]
pub(crate) struct Scratch {
    pub brackets: Vec<usize>,
    pub depth: Vec<usize>,
    pub lambda_t: Vec<f64>,
    pub premult: Vec<f64>,
    pub inc: Vec<f64>,
    pub weights: Vec<f64>,
}

impl Scratch {
    pub fn prepare(&mut self, queries: usize, dim2: usize) {
        if self.brackets.len() < queries {
            self.brackets.resize(queries, 0);
            self.depth.resize(queries, 0);
            self.lambda_t.resize(queries, 0.0);
            self.premult.resize(queries, 0.0);
        }
        if self.inc.len() != dim2 {
            self.inc = vec![0.0; dim2];
        }
    }
}

thread_local! {
    static SCRATCH: RefCell<Scratch> = RefCell::new(Scratch::default());
}

pub(crate) fn with_scratch<R>(f: impl FnOnce(&mut Scratch) -> R) -> R {
    SCRATCH.with(|cell| f(&mut cell.borrow_mut()))
}
