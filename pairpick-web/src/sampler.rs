//! Least-annotated-first example sampler
//!
//! Selection: attach each example's annotation count, shuffle the corpus,
//! stable-sort by ascending count, take the first. The shuffle must come
//! before the stable sort: it is what makes the choice among examples tied
//! at the minimum count uniform instead of following corpus order.
//!
//! The chosen example is returned with exactly two of its outputs, drawn
//! without replacement and in random order.

use std::sync::Arc;

use pairpick_common::{Error, Example, Result};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::corpus::{Corpus, MIN_OUTPUTS};
use crate::counts::{CountIndex, CountSource};

/// Samples the next example to present to a worker
#[derive(Clone)]
pub struct Sampler {
    corpus: Arc<Corpus>,
    counts: Arc<dyn CountSource>,
}

impl Sampler {
    pub fn new(corpus: Arc<Corpus>, counts: Arc<dyn CountSource>) -> Self {
        Self { corpus, counts }
    }

    /// Pick the next example using a fresh count index
    pub async fn sample(&self) -> Result<Example> {
        let counts = self.counts.count_index().await?;
        let mut rng = rand::thread_rng();
        pick_least_annotated(self.corpus.examples(), &counts, &mut rng)
    }
}

/// Choose a least-annotated example, ties broken uniformly at random
pub fn pick_least_annotated<R: Rng + ?Sized>(
    examples: &[Example],
    counts: &CountIndex,
    rng: &mut R,
) -> Result<Example> {
    let mut ranked: Vec<(usize, &Example)> = examples
        .iter()
        .map(|example| (counts.count(&example.id), example))
        .collect();

    ranked.shuffle(rng);
    // sort_by_key is stable: equal counts keep their shuffled order
    ranked.sort_by_key(|(count, _)| *count);

    let (_, chosen) = ranked
        .first()
        .ok_or_else(|| Error::Corpus("cannot sample from an empty corpus".to_string()))?;

    sample_pair(chosen, rng)
}

/// Copy of `example` carrying two of its outputs, drawn without replacement
pub fn sample_pair<R: Rng + ?Sized>(example: &Example, rng: &mut R) -> Result<Example> {
    if example.outputs.len() < MIN_OUTPUTS {
        return Err(Error::Corpus(format!(
            "example {:?} has {} output(s), at least {} required",
            example.id,
            example.outputs.len(),
            MIN_OUTPUTS
        )));
    }

    let mut outputs: Vec<_> = example
        .outputs
        .choose_multiple(rng, MIN_OUTPUTS)
        .cloned()
        .collect();
    // choose_multiple does not randomize order
    outputs.shuffle(rng);

    Ok(Example {
        id: example.id.clone(),
        prompt: example.prompt.clone(),
        outputs,
    })
}
